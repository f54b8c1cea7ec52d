//! Detection worker: frames in, zone reports out.

use anyhow::{Context, Result};

use crate::detect::{detect_intrusion, PersonDetector};
use crate::frame::{Frame, PerfInfo, ZoneReport};

use super::mailbox::{Receiver, Recv, Sender};
use super::shutdown::Shutdown;

/// Owns the detector for the lifetime of the pipeline.
///
/// Reports go to the display mailbox and, when telemetry is enabled, to the
/// publish mailbox. Both are overwritten, never queued. Dropping the worker
/// drops its senders, which closes both outbound mailboxes.
pub struct DetectionWorker {
    detector: Box<dyn PersonDetector>,
    frames: Receiver<Frame>,
    display: Sender<ZoneReport>,
    publish: Option<Sender<ZoneReport>>,
    shutdown: Shutdown,
    processed: u64,
}

impl DetectionWorker {
    pub fn new(
        detector: Box<dyn PersonDetector>,
        frames: Receiver<Frame>,
        display: Sender<ZoneReport>,
        publish: Option<Sender<ZoneReport>>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            detector,
            frames,
            display,
            publish,
            shutdown,
            processed: 0,
        }
    }

    pub fn run(mut self) -> Result<()> {
        log::debug!(
            "detection worker: started with {} backend",
            self.detector.name()
        );
        loop {
            let frame = match self.frames.take(&self.shutdown) {
                Recv::Value(frame) => frame,
                Recv::Stopped => {
                    log::info!("detection worker: received stop signal");
                    break;
                }
                Recv::Closed => {
                    log::debug!("detection worker: frame mailbox closed");
                    break;
                }
                Recv::Empty => continue,
            };

            let report = self.process(&frame)?;
            drop(frame);

            // Stop observed mid-inference: the report is stale by definition.
            if self.shutdown.is_triggered() {
                log::info!("detection worker: received stop signal");
                break;
            }
            self.deliver(report);
        }
        log::debug!(
            "detection worker: exiting after {} frames",
            self.processed
        );
        Ok(())
    }

    /// Run detection on one frame and build its report.
    pub fn process(&mut self, frame: &Frame) -> Result<ZoneReport> {
        let boxes = self
            .detector
            .detect_persons(&frame.image)
            .context("person detection failed")?;
        let alert = detect_intrusion(frame.bounds(), &boxes, frame.zone);
        let perf = PerfInfo::from_ms(self.detector.last_latency_ms());
        self.processed += 1;
        log::trace!(
            "frame {}: {} person(s), zone {}, alert {}",
            self.processed,
            boxes.len(),
            frame.zone,
            alert
        );
        Ok(ZoneReport::new(alert, perf))
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    fn deliver(&self, report: ZoneReport) {
        if self.display.replace(report).is_err() {
            log::trace!("detection worker: display mailbox has no receiver");
        }
        if let Some(publish) = &self.publish {
            if publish.replace(report).is_err() {
                log::trace!("detection worker: publish mailbox has no receiver");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectionBox, StubBackend};
    use crate::pipeline::mailbox::mailbox;
    use crate::zone::Rect;
    use anyhow::anyhow;
    use image::{Rgb, RgbImage};

    struct FailingDetector;

    impl PersonDetector for FailingDetector {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect_persons(&mut self, _image: &RgbImage) -> Result<Vec<DetectionBox>> {
            Err(anyhow!("inference device lost"))
        }

        fn last_latency_ms(&self) -> f64 {
            0.0
        }
    }

    fn frame_with_person(zone: Rect) -> Frame {
        let mut image = RgbImage::from_pixel(64, 48, Rgb([10, 10, 10]));
        for y in 10..20 {
            for x in 10..20 {
                image.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        Frame::new(image, zone)
    }

    #[test]
    fn reports_reach_display_and_publish_mailboxes() {
        let shutdown = Shutdown::new();
        let (frame_tx, frame_rx) = mailbox();
        let (display_tx, display_rx) = mailbox();
        let (publish_tx, publish_rx) = mailbox();
        let worker = DetectionWorker::new(
            Box::new(StubBackend::new(0.01)),
            frame_rx,
            display_tx,
            Some(publish_tx),
            shutdown.clone(),
        );
        let handle = std::thread::spawn(move || worker.run());

        frame_tx
            .put(frame_with_person(Rect::from_size(64, 48)), &shutdown)
            .expect("worker alive");
        let Recv::Value(report) = display_rx.take(&shutdown) else {
            panic!("expected a report");
        };
        assert!(report.alert);

        drop(frame_tx);
        handle.join().expect("join").expect("worker ok");
        assert_eq!(publish_rx.try_take(), Recv::Value(report));
        assert_eq!(display_rx.try_take(), Recv::Closed);
        assert_eq!(publish_rx.try_take(), Recv::Closed);
    }

    #[test]
    fn person_outside_zone_is_safe() -> Result<()> {
        let (_frame_tx, frame_rx) = mailbox();
        let (display_tx, _display_rx) = mailbox();
        let mut worker = DetectionWorker::new(
            Box::new(StubBackend::new(0.01)),
            frame_rx,
            display_tx,
            None,
            Shutdown::new(),
        );
        let report = worker.process(&frame_with_person(Rect::new(40, 30, 60, 45)))?;
        assert!(!report.alert);
        assert_eq!(worker.processed(), 1);
        Ok(())
    }

    #[test]
    fn detector_failure_is_fatal_and_closes_outputs() {
        let shutdown = Shutdown::new();
        let (frame_tx, frame_rx) = mailbox();
        let (display_tx, display_rx) = mailbox();
        let worker = DetectionWorker::new(
            Box::new(FailingDetector),
            frame_rx,
            display_tx,
            None,
            shutdown.clone(),
        );
        frame_tx
            .put(frame_with_person(Rect::from_size(64, 48)), &shutdown)
            .expect("worker alive");

        let err = worker.run().expect_err("detector failure");
        assert!(format!("{err:#}").contains("inference device lost"));
        assert_eq!(display_rx.try_take(), Recv::Closed);
        assert!(frame_tx.is_disconnected());
    }

    #[test]
    fn stop_before_take_processes_nothing() {
        let shutdown = Shutdown::new();
        let (frame_tx, frame_rx) = mailbox();
        let (display_tx, display_rx) = mailbox();
        frame_tx
            .put(frame_with_person(Rect::from_size(64, 48)), &shutdown)
            .expect("worker alive");
        shutdown.trigger();

        DetectionWorker::new(
            Box::new(StubBackend::new(0.01)),
            frame_rx,
            display_tx,
            None,
            shutdown,
        )
        .run()
        .expect("clean stop");
        assert_eq!(display_rx.try_take(), Recv::Closed);
    }
}
