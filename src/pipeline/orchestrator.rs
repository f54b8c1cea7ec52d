//! Capture and render loop.
//!
//! Runs on the calling thread. Spawns the detection worker (and the publish
//! throttler when a publisher is given), feeds frames, renders the latest
//! report and performs the shutdown sequence once any trigger fires.

use anyhow::{anyhow, Result};
use std::sync::mpsc;
use std::time::Duration;

use crate::detect::PersonDetector;
use crate::display::{Display, Overlay, UserCommand};
use crate::frame::{Frame, ZoneReport};
use crate::ingest::FrameSource;
use crate::transport::Publisher;
use crate::zone::ZoneGeometry;

use super::mailbox::{mailbox, Recv};
use super::shutdown::{Shutdown, ShutdownReason, Workers};
use super::throttle::PublishThrottler;
use super::worker::DetectionWorker;

/// How long to wait for a worker's error after its mailbox disconnected.
const WORKER_ERROR_GRACE: Duration = Duration::from_millis(500);

/// Runtime knobs for one pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    /// Initial zone baseline; operator selections replace it.
    pub geometry: ZoneGeometry,
    /// Interval between telemetry messages.
    pub publish_rate: Duration,
    /// Playback delay, also the command poll timeout.
    pub delay: Duration,
    pub topic: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            geometry: ZoneGeometry::default(),
            publish_rate: Duration::from_secs(1),
            delay: Duration::from_millis(5),
            topic: "machine/zone".to_string(),
        }
    }
}

/// Counters and outcome of a finished run.
#[derive(Debug)]
pub struct PipelineSummary {
    pub frames_captured: u64,
    /// Empty frames dropped before detection.
    pub frames_skipped: u64,
    /// Fresh reports picked up by the render loop.
    pub reports_displayed: u64,
    /// Zone baseline in force when the loop stopped.
    pub geometry: ZoneGeometry,
    pub reason: ShutdownReason,
}

/// Run the pipeline until quit, signal, end of stream or a fatal error.
///
/// Only setup failures return `Err`; runtime failures end up in
/// `PipelineSummary::reason`.
pub fn run_pipeline(
    settings: &PipelineSettings,
    source: &mut dyn FrameSource,
    detector: Box<dyn PersonDetector>,
    display: &mut dyn Display,
    publisher: Option<Box<dyn Publisher>>,
    signals: &mpsc::Receiver<()>,
) -> Result<PipelineSummary> {
    let shutdown = Shutdown::new();
    let (err_tx, err_rx) = mpsc::channel::<anyhow::Error>();
    let (frame_tx, frame_rx) = mailbox::<Frame>();
    let (display_tx, display_rx) = mailbox::<ZoneReport>();
    let mut workers = Workers::new(shutdown.clone());

    let publish_tx = match publisher {
        Some(publisher) => {
            let (publish_tx, publish_rx) = mailbox();
            let throttler = PublishThrottler::new(
                publisher,
                publish_rx,
                settings.topic.clone(),
                settings.publish_rate,
                shutdown.clone(),
            );
            workers.spawn("publish-throttler", err_tx.clone(), move || throttler.run())?;
            Some(publish_tx)
        }
        None => None,
    };
    let worker = DetectionWorker::new(
        detector,
        frame_rx,
        display_tx,
        publish_tx,
        shutdown.clone(),
    );
    workers.spawn("detection-worker", err_tx, move || worker.run())?;
    log::info!(
        "pipeline started: {} worker(s), source {}",
        workers.len(),
        source.describe()
    );

    let mut geometry = settings.geometry;
    let mut last_report: Option<ZoneReport> = None;
    let mut frames_captured = 0u64;
    let mut frames_skipped = 0u64;
    let mut reports_displayed = 0u64;

    let reason = loop {
        let image = match source.read_next() {
            Ok(Some(image)) => image,
            Ok(None) => break ShutdownReason::EndOfStream,
            Err(err) => {
                break ShutdownReason::Fatal(
                    err.context(format!("failed to read frame from {}", source.describe())),
                )
            }
        };
        if image.width() == 0 || image.height() == 0 {
            frames_skipped += 1;
            log::trace!("skipping empty frame");
            continue;
        }
        frames_captured += 1;

        let mut zone = geometry.zone_for(image.width(), image.height());
        match display.poll_command(settings.delay) {
            Some(UserCommand::Quit) => break ShutdownReason::Quit,
            Some(UserCommand::SelectRegion(region)) if !region.is_empty() => {
                geometry = ZoneGeometry::from_selection(region);
                zone = geometry.zone_for(image.width(), image.height());
                log::info!("restricted zone: {}", geometry);
            }
            Some(UserCommand::SelectRegion(region)) => {
                log::warn!("ignoring empty zone selection {}", region);
            }
            None => {}
        }

        if frame_tx
            .put(Frame::new(image.clone(), zone), &shutdown)
            .is_err()
        {
            // Stopped or disconnected: a worker is going down with an error.
            break worker_failure(&err_rx);
        }

        if signals.try_recv().is_ok() {
            break ShutdownReason::Signal;
        }
        if let Ok(err) = err_rx.try_recv() {
            break ShutdownReason::Fatal(err);
        }

        if let Recv::Value(report) = display_rx.try_take() {
            last_report = Some(report);
            reports_displayed += 1;
        }
        if let Err(err) = display.render(&image, &Overlay::new(zone, last_report)) {
            break ShutdownReason::Fatal(err.context("failed to render frame"));
        }
    };

    source.close();
    if shutdown.trigger() {
        log::info!("shutting down: {}", reason);
    }
    drop(frame_tx);
    let discarded = display_rx.drain();
    log::debug!("discarded {} unread report(s) during shutdown", discarded);
    let panicked = workers.join_all();
    if panicked > 0 {
        log::error!("{} worker(s) panicked during shutdown", panicked);
    }
    for err in err_rx.try_iter() {
        log::error!("additional pipeline error: {:#}", err);
    }

    log::info!(
        "pipeline stopped: {} frame(s) captured, {} skipped, {} report(s) displayed",
        frames_captured,
        frames_skipped,
        reports_displayed
    );
    Ok(PipelineSummary {
        frames_captured,
        frames_skipped,
        reports_displayed,
        geometry,
        reason,
    })
}

fn worker_failure(errors: &mpsc::Receiver<anyhow::Error>) -> ShutdownReason {
    match errors.recv_timeout(WORKER_ERROR_GRACE) {
        Ok(err) => ShutdownReason::Fatal(err),
        Err(_) => ShutdownReason::Fatal(anyhow!("detection worker exited unexpectedly")),
    }
}
