//! Live display and operator commands.
//!
//! The orchestrator hands every frame to a `Display` together with an
//! `Overlay`, and polls it for operator commands between frames.
//! `ConsoleDisplay` is the headless adapter: alert transitions go to the log,
//! commands are read line by line from stdin, and annotated snapshots can be
//! written to a directory whenever the alert state changes.

use anyhow::{anyhow, bail, Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use crate::frame::ZoneReport;
use crate::zone::Rect;

pub const ALERT_BANNER: &str = "HUMAN IN RESTRICTED ZONE: PAUSE THE MACHINE!";

const ZONE_SAFE: Rgb<u8> = Rgb([0, 255, 0]);
const ZONE_ALERT: Rgb<u8> = Rgb([255, 0, 0]);
const ZONE_BORDER: u32 = 2;

/// Operator input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserCommand {
    Quit,
    /// New restricted zone in frame coordinates.
    SelectRegion(Rect),
}

/// What gets drawn on top of a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Overlay {
    pub zone: Rect,
    /// Latest report; `None` until the worker produced one.
    pub report: Option<ZoneReport>,
}

impl Overlay {
    pub fn new(zone: Rect, report: Option<ZoneReport>) -> Self {
        Self { zone, report }
    }

    pub fn is_alert(&self) -> bool {
        self.report.is_some_and(|report| report.alert)
    }

    /// Text lines, top to bottom.
    pub fn lines(&self) -> Vec<String> {
        match self.report {
            Some(report) => {
                let mut lines = vec![report.perf.to_string(), report.to_string()];
                if report.alert {
                    lines.push(ALERT_BANNER.to_string());
                }
                lines
            }
            None => vec!["Waiting for detection results".to_string()],
        }
    }
}

pub trait Display {
    /// Show `image` with `overlay`.
    fn render(&mut self, image: &RgbImage, overlay: &Overlay) -> Result<()>;

    /// Wait up to `delay` for an operator command. Also paces playback.
    fn poll_command(&mut self, delay: Duration) -> Option<UserCommand>;
}

/// Parse one line of operator input.
///
/// - `q`, `quit`, `exit`, `esc`: quit
/// - `zone X Y W H` (or `c X Y W H`): select a new restricted zone
pub fn parse_command(line: &str) -> Result<Option<UserCommand>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    match verb.to_ascii_lowercase().as_str() {
        "q" | "quit" | "exit" | "esc" => Ok(Some(UserCommand::Quit)),
        "zone" | "c" => {
            let values = words
                .map(|word| {
                    word.parse::<i32>()
                        .with_context(|| format!("invalid zone value '{}'", word))
                })
                .collect::<Result<Vec<_>>>()?;
            let &[x, y, width, height] = values.as_slice() else {
                bail!("zone needs four values: X Y WIDTH HEIGHT");
            };
            if x < 0 || y < 0 || width <= 0 || height <= 0 {
                bail!("zone must have a non-negative origin and positive size");
            }
            Ok(Some(UserCommand::SelectRegion(Rect::new(
                x,
                y,
                x.saturating_add(width),
                y.saturating_add(height),
            ))))
        }
        other => Err(anyhow!("unknown command '{}'", other)),
    }
}

/// Draw the outline of `rect`, clipped to the image.
pub fn draw_zone(image: &mut RgbImage, rect: Rect, color: Rgb<u8>) {
    let clipped = rect.intersect(&Rect::from_size(image.width(), image.height()));
    if clipped.is_empty() {
        return;
    }
    let (x0, y0) = (clipped.min.x as u32, clipped.min.y as u32);
    let (x1, y1) = (clipped.max.x as u32, clipped.max.y as u32);
    for y in y0..y1 {
        for x in x0..x1 {
            let on_border = x < x0 + ZONE_BORDER
                || x + ZONE_BORDER >= x1
                || y < y0 + ZONE_BORDER
                || y + ZONE_BORDER >= y1;
            if on_border {
                image.put_pixel(x, y, color);
            }
        }
    }
}

/// Headless display: log output plus stdin commands.
pub struct ConsoleDisplay {
    commands: mpsc::Receiver<UserCommand>,
    snapshot_dir: Option<PathBuf>,
    last_alert: Option<bool>,
    rendered: u64,
}

impl ConsoleDisplay {
    /// Start reading operator commands from stdin.
    pub fn new(snapshot_dir: Option<PathBuf>) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("stdin-commands".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    match parse_command(&line) {
                        Ok(Some(command)) => {
                            if tx.send(command).is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => log::warn!("ignoring operator input: {:#}", err),
                    }
                }
            })
            .context("failed to spawn stdin command reader")?;
        Ok(Self::with_commands(rx, snapshot_dir))
    }

    /// Display fed from an existing command channel.
    pub fn with_commands(
        commands: mpsc::Receiver<UserCommand>,
        snapshot_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            commands,
            snapshot_dir,
            last_alert: None,
            rendered: 0,
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.rendered
    }

    fn save_snapshot(&self, image: &RgbImage, overlay: &Overlay) -> Result<()> {
        let Some(dir) = &self.snapshot_dir else {
            return Ok(());
        };
        let mut annotated = image.clone();
        let color = if overlay.is_alert() {
            ZONE_ALERT
        } else {
            ZONE_SAFE
        };
        draw_zone(&mut annotated, overlay.zone, color);
        let path = dir.join(format!("zone-{:06}.jpg", self.rendered));
        annotated
            .save_with_format(&path, ImageFormat::Jpeg)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        log::debug!("snapshot written to {}", path.display());
        Ok(())
    }
}

impl Display for ConsoleDisplay {
    fn render(&mut self, image: &RgbImage, overlay: &Overlay) -> Result<()> {
        self.rendered += 1;
        log::trace!("frame {}: {}", self.rendered, overlay.lines().join(" | "));

        let Some(report) = overlay.report else {
            return Ok(());
        };
        if self.last_alert == Some(report.alert) {
            return Ok(());
        }
        if report.alert {
            log::warn!("{} ({})", ALERT_BANNER, report.perf);
        } else if self.last_alert.is_some() {
            log::info!("restricted zone clear ({})", report.perf);
        } else {
            log::info!("restricted zone monitored: {}", report);
        }
        self.last_alert = Some(report.alert);
        self.save_snapshot(image, overlay)
    }

    fn poll_command(&mut self, delay: Duration) -> Option<UserCommand> {
        match self.commands.recv_timeout(delay) {
            Ok(command) => Some(command),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // stdin closed: keep pacing playback.
                std::thread::sleep(delay);
                None
            }
        }
    }
}
