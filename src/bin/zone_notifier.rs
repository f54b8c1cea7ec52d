//! zone_notifier - alert when people walk into a restricted zone.
//!
//! This binary:
//! 1. Loads and validates configuration (defaults, JSON file, flags, env)
//! 2. Builds the person detector and opens the frame source
//! 3. Optionally connects to the MQTT broker for zone telemetry
//! 4. Runs the capture/detect/render pipeline until quit, Ctrl-C or end of stream
//!
//! Operator commands on stdin: `q` quits, `zone X Y W H` moves the zone.

use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::sync::mpsc;
use std::time::Duration;

use zone_notifier::{
    build_detector, open_source, run_pipeline, Config, ConsoleDisplay, MqttPublisher, Publisher,
};

#[path = "../ui.rs"]
mod ui;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = <zone_notifier::Args as clap::Parser>::parse();
    let ui = ui::Ui::new(
        ui::UiMode::parse(&args.ui),
        std::io::stderr().is_terminal(),
        std::io::stdout().is_terminal(),
    );
    let config = Config::from_args(args)?;

    let detector = {
        let stage = ui.stage("Load detector");
        stage.done(build_detector(&config.detector)?)
    };

    let mut source = {
        let stage = ui.stage("Open frame source");
        stage.done(open_source(&config.input)?)
    };

    let mut settings = config.pipeline_settings();
    if let Some(fps) = source.fps_hint() {
        settings.delay = Duration::from_secs_f64(1.0 / fps);
        log::info!(
            "playback delay set to {:.2} ms from {:.2} fps",
            settings.delay.as_secs_f64() * 1000.0,
            fps
        );
    }

    let publisher: Option<Box<dyn Publisher>> = if config.publish {
        let stage = ui.stage("Connect to MQTT broker");
        let publisher: Box<dyn Publisher> =
            Box::new(MqttPublisher::connect(&config.mqtt, &config.topic)?);
        Some(stage.done(publisher))
    } else {
        None
    };

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    let mut display = ConsoleDisplay::new(config.snapshot_dir.clone())?;
    log::info!(
        "monitoring {} for people in zone {} (quit with 'q' or Ctrl-C)",
        source.describe(),
        settings.geometry
    );

    let summary = run_pipeline(
        &settings,
        source.as_mut(),
        detector,
        &mut display,
        publisher,
        &rx,
    )?;

    log::info!(
        "stopped ({}): {} frame(s), {} skipped, {} report(s); final zone {}",
        summary.reason,
        summary.frames_captured,
        summary.frames_skipped,
        summary.reports_displayed,
        summary.geometry
    );
    summary.reason.into_result()
}
