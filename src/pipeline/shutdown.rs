//! Shutdown coordination for pipeline workers.
//!
//! `Shutdown` is the broadcast stop flag every blocking operation re-checks.
//! `Workers` owns the worker threads, forwards their errors to the
//! orchestrator and joins them once the stop has been broadcast.

use anyhow::{anyhow, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

/// Cloneable stop flag, fired at most once.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcast stop. Returns `true` only for the call that fired it.
    pub fn trigger(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Why the pipeline stopped.
#[derive(Debug)]
pub enum ShutdownReason {
    /// Operator asked to quit.
    Quit,
    /// SIGINT / SIGTERM.
    Signal,
    /// The frame source ran out of frames.
    EndOfStream,
    /// A capture, detection or display failure.
    Fatal(anyhow::Error),
}

impl ShutdownReason {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Graceful reasons become `Ok(())`; a fatal one becomes the exit error.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Fatal(err) => Err(err),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quit => write!(f, "operator quit"),
            Self::Signal => write!(f, "termination signal"),
            Self::EndOfStream => write!(f, "end of stream"),
            Self::Fatal(err) => write!(f, "fatal error: {err:#}"),
        }
    }
}

/// Named worker threads sharing one stop flag and one error channel.
pub struct Workers {
    shutdown: Shutdown,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl Workers {
    pub fn new(shutdown: Shutdown) -> Self {
        Self {
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Spawn a named worker. An `Err` returned by `work` is sent to `errors`
    /// and broadcasts stop to the rest of the pipeline.
    pub fn spawn<F>(&mut self, name: &str, errors: mpsc::Sender<anyhow::Error>, work: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let thread_name = name.to_string();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                if let Err(err) = work() {
                    log::error!("{} failed: {:#}", thread_name, err);
                    if errors.send(err).is_err() {
                        log::debug!("{}: error channel already closed", thread_name);
                    }
                    shutdown.trigger();
                }
            })
            .map_err(|err| anyhow!("failed to spawn {} thread: {}", name, err))?;
        self.handles.push((name.to_string(), handle));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Join every worker. Returns the number of workers that panicked.
    pub fn join_all(self) -> usize {
        let mut panicked = 0;
        for (name, handle) in self.handles {
            if handle.join().is_err() {
                log::error!("{} panicked", name);
                panicked += 1;
            } else {
                log::debug!("{} joined", name);
            }
        }
        panicked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_fires_once() {
        let shutdown = Shutdown::new();
        let other = shutdown.clone();
        assert!(!other.is_triggered());
        assert!(shutdown.trigger());
        assert!(!other.trigger());
        assert!(other.is_triggered());
    }

    #[test]
    fn worker_error_is_forwarded_and_stops_the_pipeline() {
        let shutdown = Shutdown::new();
        let (tx, rx) = mpsc::channel();
        let mut workers = Workers::new(shutdown.clone());
        workers
            .spawn("failing-worker", tx.clone(), || Err(anyhow!("camera unplugged")))
            .expect("spawn");
        workers.spawn("quiet-worker", tx, || Ok(())).expect("spawn");
        assert_eq!(workers.len(), 2);

        assert_eq!(workers.join_all(), 0);
        let err = rx.recv().expect("error forwarded");
        assert!(err.to_string().contains("camera unplugged"));
        assert!(rx.try_recv().is_err());
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn fatal_reason_becomes_exit_error() {
        assert!(ShutdownReason::EndOfStream.into_result().is_ok());
        assert!(ShutdownReason::Quit.into_result().is_ok());
        let reason = ShutdownReason::Fatal(anyhow!("detector crashed"));
        assert!(reason.is_fatal());
        assert_eq!(reason.to_string(), "fatal error: detector crashed");
        assert!(reason.into_result().is_err());
    }
}
