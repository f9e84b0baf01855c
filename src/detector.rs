//! Screen-share detection
//!
//! Polls the process table for known conference/recording processes and
//! reports transitions to the controller. Edge-triggered: the controller only
//! hears about changes, never the steady state.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, info};

use crate::config::DetectorConfig;
use crate::shared::ControlEvent;

/// Tracks the last reported value so only transitions are forwarded
#[derive(Debug, Default)]
struct EdgeTracker {
    last: bool,
}

impl EdgeTracker {
    /// Returns `Some(new_value)` on a transition, `None` otherwise
    fn update(&mut self, active: bool) -> Option<bool> {
        if active != self.last {
            self.last = active;
            Some(active)
        } else {
            None
        }
    }
}

/// True when any running process matches a configured name
fn is_sharing_active<I, S>(process_names: &[String], running: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let needles: Vec<String> = process_names.iter().map(|n| n.to_lowercase()).collect();
    running.into_iter().any(|name| {
        let name = name.as_ref().to_lowercase();
        needles.iter().any(|needle| name.contains(needle.as_str()))
    })
}

/// Spawn the detector worker thread
///
/// The thread exits when `shutdown_rx`'s sender side is dropped or a unit
/// message arrives on it.
pub fn spawn(
    config: DetectorConfig,
    events_tx: Sender<ControlEvent>,
    shutdown_rx: Receiver<()>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        info!(
            "Screen-share detector started (poll every {} ms, {} process names)",
            config.poll_interval_ms,
            config.process_names.len()
        );

        let interval = Duration::from_millis(config.poll_interval_ms.max(100));
        let mut system = System::new();
        let mut edge = EdgeTracker::default();

        loop {
            system.refresh_processes(ProcessesToUpdate::All, true);
            let active = is_sharing_active(
                &config.process_names,
                system
                    .processes()
                    .values()
                    .map(|p| p.name().to_string_lossy().into_owned()),
            );

            if let Some(transition) = edge.update(active) {
                debug!("Screen-share transition: {}", transition);
                if events_tx
                    .send(ControlEvent::ScreenShare(transition))
                    .is_err()
                {
                    break;
                }
            }

            match shutdown_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        info!("Screen-share detector exiting");
    })
}
