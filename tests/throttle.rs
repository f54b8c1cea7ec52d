//! Publish throttler timing tests against a recording publisher.

use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use zone_notifier::pipeline::{mailbox, PublishThrottler, Shutdown};
use zone_notifier::{PerfInfo, Publisher, SafetyMessage, ZoneReport};

#[derive(Clone, Default)]
struct RecordingPublisher {
    sent: Arc<Mutex<Vec<(Instant, SafetyMessage)>>>,
    disconnects: Arc<Mutex<u32>>,
}

impl Publisher for RecordingPublisher {
    fn publish(&mut self, _topic: &str, payload: &[u8]) -> Result<()> {
        let message = serde_json::from_slice(payload)?;
        self.sent.lock().unwrap().push((Instant::now(), message));
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        *self.disconnects.lock().unwrap() += 1;
        Ok(())
    }
}

fn report(alert: bool) -> ZoneReport {
    ZoneReport::new(alert, PerfInfo::from_ms(3.0))
}

#[test]
fn alternating_reports_publish_at_most_once_per_tick() {
    let rate = Duration::from_millis(100);
    let shutdown = Shutdown::new();
    let publisher = RecordingPublisher::default();
    let (tx, rx) = mailbox();
    let throttler = PublishThrottler::new(
        Box::new(publisher.clone()),
        rx,
        "machine/zone",
        rate,
        shutdown.clone(),
    );
    let handle = std::thread::spawn(move || throttler.run());

    let started = Instant::now();
    let mut offered: Vec<(Instant, bool)> = Vec::new();
    let mut alert = false;
    while started.elapsed() < Duration::from_millis(550) {
        offered.push((Instant::now(), !alert));
        tx.replace(report(alert)).expect("throttler alive");
        alert = !alert;
        std::thread::sleep(Duration::from_millis(10));
    }
    drop(tx);
    handle.join().expect("join").expect("throttler ok");

    let sent = publisher.sent.lock().unwrap();
    // Five ticks fit in the window; allow one either way for scheduling.
    assert!(
        (4..=6).contains(&sent.len()),
        "unexpected publish count {}",
        sent.len()
    );
    for pair in sent.windows(2) {
        assert!(pair[1].0 - pair[0].0 >= rate - Duration::from_millis(20));
    }
    // Each publish carries the state at its tick: the last report offered
    // before it, or the one before that when the newest raced the tick.
    for (published_at, message) in sent.iter() {
        let before: Vec<_> = offered
            .iter()
            .filter(|(offered_at, _)| offered_at < published_at)
            .collect();
        let &(last_at, last_safe) = *before.last().expect("an offer precedes every publish");
        if message.safe != last_safe {
            assert!(*published_at - last_at < Duration::from_millis(5));
            assert_eq!(message.safe, before[before.len() - 2].1);
        }
    }
    assert_eq!(*publisher.disconnects.lock().unwrap(), 1);
}

#[test]
fn stop_before_the_first_tick_publishes_nothing() {
    let shutdown = Shutdown::new();
    let publisher = RecordingPublisher::default();
    let (tx, rx) = mailbox();
    let throttler = PublishThrottler::new(
        Box::new(publisher.clone()),
        rx,
        "machine/zone",
        Duration::from_secs(10),
        shutdown.clone(),
    );
    let handle = std::thread::spawn(move || throttler.run());

    tx.replace(report(true)).expect("throttler alive");
    std::thread::sleep(Duration::from_millis(60));
    shutdown.trigger();

    let started = Instant::now();
    handle.join().expect("join").expect("throttler ok");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(publisher.sent.lock().unwrap().is_empty());
    assert_eq!(*publisher.disconnects.lock().unwrap(), 1);
}

#[test]
fn quiet_ticks_are_skipped() {
    let shutdown = Shutdown::new();
    let publisher = RecordingPublisher::default();
    let (tx, rx) = mailbox();
    let throttler = PublishThrottler::new(
        Box::new(publisher.clone()),
        rx,
        "machine/zone",
        Duration::from_millis(30),
        shutdown.clone(),
    );
    let handle = std::thread::spawn(move || throttler.run());

    tx.replace(report(false)).expect("throttler alive");
    // Several ticks pass with no new report.
    std::thread::sleep(Duration::from_millis(200));
    drop(tx);
    handle.join().expect("join").expect("throttler ok");

    let sent = publisher.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.safe);
}
