//! Application Coordinator
//!
//! Wires the controller, its input sources and its collaborators together:
//! channels first, worker threads second, the overlay window last (it owns
//! the main thread). On exit the session is torn down before the process
//! ends.

use anyhow::Result;
use crossbeam_channel::{bounded, unbounded, Sender};
use tracing::{info, warn};

use crate::audio::{self, AudioCapture};
use crate::config::{AppConfig, ConfigError};
use crate::controller::Controller;
use crate::detector;
use crate::hotkey::HotkeyManager;
use crate::overlay::OverlayManager;
use crate::session::{self, AUDIO_CHANNEL_CAPACITY};
use crate::shared::{ControlEvent, SessionCommand};
use crate::tray::TrayMenu;

/// Run the application until the overlay window closes or Quit is requested
pub fn run(config: AppConfig) -> Result<()> {
    let (events_tx, events_rx) = unbounded::<ControlEvent>();
    let (render_tx, render_rx) = unbounded();

    // Session subsystem; None when no API key is configured
    let mut capture = None;
    let mut session_worker = None;
    let session_tx =
        start_session_subsystem(&config, events_tx.clone(), &mut capture, &mut session_worker);

    let controller = Controller::new(&config.overlay, render_tx, session_tx);
    let snapshot = controller.snapshot_handle();
    let controller_handle = std::thread::spawn(move || controller.run(events_rx));

    let (detector_stop_tx, detector_stop_rx) = bounded(1);
    let detector_handle = detector::spawn(
        config.detector.clone(),
        events_tx.clone(),
        detector_stop_rx,
    );

    // Input sources live on the main thread and are polled from the overlay
    // frame callback; losing one of them degrades the app but does not kill it
    let hotkeys = match HotkeyManager::new(&config.hotkeys, events_tx.clone()) {
        Ok(manager) => Some(manager),
        Err(e) => {
            warn!("Global hotkeys unavailable: {:#}", e);
            None
        }
    };
    let tray = match TrayMenu::new(events_tx.clone(), snapshot) {
        Ok(tray) => Some(tray),
        Err(e) => {
            warn!("Status bar menu unavailable: {:#}", e);
            None
        }
    };

    let overlay = OverlayManager::new(&config.overlay, render_rx);
    overlay.run(move || {
        if let Some(hotkeys) = &hotkeys {
            hotkeys.poll_events();
        }
        if let Some(tray) = &tray {
            tray.poll_events();
            tray.sync();
        }
    });

    // Window closed; stop the session and the workers before exiting.
    // Joining the controller drops its session sender, which lets the session
    // worker close the connection and exit.
    let _ = events_tx.send(ControlEvent::Quit);
    drop(events_tx);
    drop(detector_stop_tx);
    let _ = controller_handle.join();
    let _ = detector_handle.join();
    drop(capture);
    if let Some(worker) = session_worker {
        let _ = worker.join();
    }

    info!("Shutdown complete");
    Ok(())
}

/// Spawn audio capture and the session worker when an API key is available
fn start_session_subsystem(
    config: &AppConfig,
    events_tx: Sender<ControlEvent>,
    capture_slot: &mut Option<AudioCapture>,
    worker_slot: &mut Option<std::thread::JoinHandle<()>>,
) -> Option<Sender<SessionCommand>> {
    match config.api.validate_key() {
        Err(ConfigError::MissingApiKey) => {
            warn!("No OpenAI API key configured; the session subsystem is disabled");
            return None;
        }
        Err(e) => {
            // Wrong-looking keys are still tried; the API has the last word
            warn!("{}", e);
        }
        Ok(()) => {}
    }

    let (audio_tx, audio_rx) = tokio::sync::mpsc::channel(AUDIO_CHANNEL_CAPACITY);
    match audio::start_capture(&config.audio, audio_tx) {
        Ok(capture) => {
            info!("Session audio source: '{}'", capture.device_name);
            *capture_slot = Some(capture);
        }
        Err(e) => {
            // The session can still connect; it just hears nothing
            warn!("Audio capture unavailable: {:#}", e);
        }
    }

    let (commands_tx, commands_rx) = unbounded();
    *worker_slot = Some(session::spawn(
        config.api.clone(),
        commands_rx,
        audio_rx,
        events_tx,
    ));

    Some(commands_tx)
}
