//! Rate-limited telemetry.
//!
//! Reports arrive at frame rate; the broker sees at most one message per
//! tick, carrying the latest report received since the previous tick.

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::frame::{SafetyMessage, ZoneReport};
use crate::transport::Publisher;

use super::mailbox::{Receiver, Recv};
use super::shutdown::Shutdown;

/// Floor applied to a zero publish rate.
const MIN_RATE: Duration = Duration::from_millis(1);

/// Latest-value sampler: `offer` overwrites, `tick` takes.
#[derive(Debug)]
pub struct Throttle<T> {
    pending: Option<T>,
    coalesced: u64,
}

impl<T> Default for Throttle<T> {
    fn default() -> Self {
        Self {
            pending: None,
            coalesced: 0,
        }
    }
}

impl<T> Throttle<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&mut self, value: T) {
        if self.pending.replace(value).is_some() {
            self.coalesced += 1;
        }
    }

    /// Value to publish at this tick, if any arrived since the last one.
    pub fn tick(&mut self) -> Option<T> {
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Values overwritten before they could be published.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }
}

/// Thread body that samples zone reports every `rate` and publishes them.
pub struct PublishThrottler {
    publisher: Box<dyn Publisher>,
    reports: Receiver<ZoneReport>,
    topic: String,
    rate: Duration,
    shutdown: Shutdown,
}

impl PublishThrottler {
    pub fn new(
        publisher: Box<dyn Publisher>,
        reports: Receiver<ZoneReport>,
        topic: impl Into<String>,
        rate: Duration,
        shutdown: Shutdown,
    ) -> Self {
        let rate = if rate.is_zero() {
            log::warn!("publish throttler: zero rate, using {:?}", MIN_RATE);
            MIN_RATE
        } else {
            rate
        };
        Self {
            publisher,
            reports,
            topic: topic.into(),
            rate,
            shutdown,
        }
    }

    /// Runs until stop or until the report mailbox closes. The pending report
    /// is not flushed on exit.
    pub fn run(mut self) -> Result<()> {
        let mut throttle = Throttle::new();
        let mut published = 0u64;
        let mut next_tick = Instant::now() + self.rate;

        loop {
            let now = Instant::now();
            if now >= next_tick {
                if self.shutdown.is_triggered() {
                    log::info!("publish throttler: received stop signal");
                    break;
                }
                if let Some(report) = throttle.tick() {
                    self.publish(report);
                    published += 1;
                }
                // Ticks missed while publishing are skipped, not replayed.
                next_tick = next_tick_after(next_tick, Instant::now(), self.rate);
                continue;
            }

            match self
                .reports
                .take_timeout(next_tick.saturating_duration_since(now), &self.shutdown)
            {
                Recv::Value(report) => throttle.offer(report),
                Recv::Empty => {}
                Recv::Stopped => {
                    log::info!("publish throttler: received stop signal");
                    break;
                }
                Recv::Closed => {
                    log::debug!("publish throttler: report mailbox closed");
                    break;
                }
            }
        }

        log::info!(
            "publish throttler: {} message(s) published, {} report(s) coalesced",
            published,
            throttle.coalesced()
        );
        if let Err(err) = self.publisher.disconnect() {
            log::warn!("publish throttler: disconnect failed: {:#}", err);
        }
        Ok(())
    }

    fn publish(&mut self, report: ZoneReport) {
        let payload = match serde_json::to_vec(&SafetyMessage::from(report)) {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("publish throttler: failed to encode report: {}", err);
                return;
            }
        };
        match self.publisher.publish(&self.topic, &payload) {
            Ok(()) => log::debug!("published {} to {}", report, self.topic),
            Err(err) => log::warn!("error publishing message to {}: {:#}", self.topic, err),
        }
    }
}

/// First grid point strictly after `now`, stepping from `tick` by `rate`.
fn next_tick_after(tick: Instant, now: Instant, rate: Duration) -> Instant {
    if now < tick {
        return tick;
    }
    let missed = now.duration_since(tick).as_nanos() / rate.as_nanos().max(1) + 1;
    let steps = u32::try_from(missed).unwrap_or(u32::MAX);
    tick.checked_add(rate.saturating_mul(steps))
        .unwrap_or_else(|| now + rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PerfInfo;

    fn report(alert: bool) -> ZoneReport {
        ZoneReport::new(alert, PerfInfo::default())
    }

    #[test]
    fn tick_publishes_latest_offer_once() {
        let mut throttle = Throttle::new();
        assert_eq!(throttle.tick(), None);

        throttle.offer(report(true));
        throttle.offer(report(false));
        throttle.offer(report(true));
        assert!(throttle.has_pending());
        assert_eq!(throttle.tick(), Some(report(true)));
        assert_eq!(throttle.coalesced(), 2);

        // Nothing new since the previous tick: skip.
        assert_eq!(throttle.tick(), None);
    }

    #[test]
    fn alternating_reports_sample_the_state_at_each_tick() {
        // One tick per 100 offers, as with 10 ms reports and a 1 s rate.
        let mut throttle = Throttle::new();
        let mut ticks = Vec::new();
        for n in 1..=300u32 {
            throttle.offer(report(n % 2 == 0));
            if n % 100 == 0 {
                ticks.push(throttle.tick());
            }
        }
        assert_eq!(ticks.len(), 3);
        assert!(ticks.iter().all(|t| *t == Some(report(true))));
        assert_eq!(throttle.coalesced(), 297);
    }

    #[test]
    fn missed_ticks_are_skipped_in_one_step() {
        let start = Instant::now();
        let rate = Duration::from_millis(100);
        assert_eq!(next_tick_after(start + rate, start, rate), start + rate);
        assert_eq!(next_tick_after(start, start, rate), start + rate);
        assert_eq!(
            next_tick_after(start, start + Duration::from_millis(350), rate),
            start + Duration::from_millis(400)
        );
        // A nanosecond grid far behind must not loop per missed tick.
        let behind = start + Duration::from_secs(5);
        let next = next_tick_after(start, behind, Duration::from_nanos(1));
        assert!(next > behind);
    }

    #[test]
    fn zero_rate_still_stops() {
        struct Silent;
        impl Publisher for Silent {
            fn publish(&mut self, _topic: &str, _payload: &[u8]) -> Result<()> {
                Ok(())
            }
        }

        let shutdown = Shutdown::new();
        let (tx, rx) = crate::pipeline::mailbox::mailbox();
        let throttler = PublishThrottler::new(
            Box::new(Silent),
            rx,
            "machine/zone",
            Duration::ZERO,
            shutdown.clone(),
        );
        assert_eq!(throttler.rate, MIN_RATE);

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = done_tx.send(throttler.run().is_ok());
        });
        tx.replace(report(true)).expect("throttler alive");
        std::thread::sleep(Duration::from_millis(20));
        shutdown.trigger();
        drop(tx);
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(2)), Ok(true));
    }
}
