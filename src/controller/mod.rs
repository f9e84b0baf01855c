//! Overlay State Controller
//!
//! Single owner of the overlay's UI-facing state. Every external input —
//! hotkey press, menu click, screen-share detector report, session event —
//! arrives as a `ControlEvent` on one channel and is applied here, on one
//! thread. The controller's only outputs are idempotent `RenderCommand`s to
//! the overlay window and lifecycle `SessionCommand`s to the session worker.
//!
//! Effective visibility is always recomputed as
//! `user_visible && !(presentation_mode && screen_sharing)` rather than stored,
//! so the two contributing conditions cannot drift apart.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::OverlaySettings;
use crate::shared::{ControlEvent, RenderCommand, SessionCommand, SessionEvent, TranscriptDelta};

pub const OPACITY_MIN: f32 = 0.2;
pub const OPACITY_MAX: f32 = 1.0;
pub const OPACITY_STEP: f32 = 0.1;

pub const SCALE_MIN: f32 = 0.5;
pub const SCALE_MAX: f32 = 2.0;
pub const SCALE_STEP: f32 = 0.05;

/// Lifecycle of the Realtime API session as seen by the controller
///
/// `Starting` and `Running` are otherwise opaque; the worker owns the
/// connection. Failures land back in `Stopped` with `last_error` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Starting,
    Running,
}

/// The controller-owned state
#[derive(Debug, Clone)]
pub struct OverlayState {
    /// User has not hidden the overlay
    pub user_visible: bool,
    /// Overlay opacity, kept within [OPACITY_MIN, OPACITY_MAX]
    pub opacity: f32,
    /// Overlay scale, kept within [SCALE_MIN, SCALE_MAX]
    pub scale: f32,
    /// Hide the overlay while screen sharing is detected
    pub presentation_mode: bool,
    /// Last screen-share detector report
    pub screen_sharing: bool,
    /// Session lifecycle
    pub session: SessionState,
    /// Reason of the most recent session failure
    pub last_error: Option<String>,
}

impl OverlayState {
    /// Initial state from the overlay settings section
    pub fn from_settings(settings: &OverlaySettings) -> Self {
        Self {
            user_visible: true,
            opacity: settings.opacity.clamp(OPACITY_MIN, OPACITY_MAX),
            scale: settings.scale.clamp(SCALE_MIN, SCALE_MAX),
            presentation_mode: settings.presentation_mode,
            screen_sharing: false,
            session: SessionState::Stopped,
            last_error: None,
        }
    }

    /// The actual shown/hidden state, derived on every read
    pub fn effective_visibility(&self) -> bool {
        self.user_visible && !(self.presentation_mode && self.screen_sharing)
    }

    /// Whether a session is starting or running
    pub fn session_active(&self) -> bool {
        self.session != SessionState::Stopped
    }
}

/// Read-only snapshot published for the tray menu and diagnostics
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    pub effective_visible: bool,
    pub user_visible: bool,
    pub presentation_mode: bool,
    pub session_active: bool,
    pub opacity: f32,
    pub scale: f32,
    pub last_error: Option<String>,
}

/// Serializes all state-changing events into one consistent view
pub struct Controller {
    state: OverlayState,
    render_tx: Sender<RenderCommand>,
    /// None when the session subsystem was not started (missing API key)
    session_tx: Option<Sender<SessionCommand>>,
    snapshot: Arc<RwLock<StateSnapshot>>,
    running: bool,
}

impl Controller {
    pub fn new(
        settings: &OverlaySettings,
        render_tx: Sender<RenderCommand>,
        session_tx: Option<Sender<SessionCommand>>,
    ) -> Self {
        let state = OverlayState::from_settings(settings);
        let snapshot = Arc::new(RwLock::new(StateSnapshot::default()));
        let controller = Self {
            state,
            render_tx,
            session_tx,
            snapshot,
            running: true,
        };
        controller.publish_snapshot();
        controller
    }

    /// Handle for components that need to observe state (tray checkbox)
    pub fn snapshot_handle(&self) -> Arc<RwLock<StateSnapshot>> {
        self.snapshot.clone()
    }

    /// Consume events until `Quit` or channel disconnect
    pub fn run(mut self, events: Receiver<ControlEvent>) {
        info!("Controller loop started");
        while self.running {
            match events.recv() {
                Ok(event) => self.handle(event),
                Err(_) => break,
            }
        }
        let _ = self.render_tx.send(RenderCommand::Shutdown);
        info!("Controller loop exited");
    }

    /// Apply one event to the state and issue downstream commands
    pub fn handle(&mut self, event: ControlEvent) {
        debug!("Control event: {:?}", event);
        match event {
            ControlEvent::ToggleVisibility => self.toggle_visibility(),
            ControlEvent::IncreaseOpacity => self.adjust_opacity(OPACITY_STEP),
            ControlEvent::DecreaseOpacity => self.adjust_opacity(-OPACITY_STEP),
            ControlEvent::SetOpacity(value) => self.set_opacity(value),
            ControlEvent::IncreaseScale => self.adjust_scale(SCALE_STEP),
            ControlEvent::DecreaseScale => self.adjust_scale(-SCALE_STEP),
            ControlEvent::SetScale(value) => self.set_scale(value),
            ControlEvent::TogglePresentationMode => {
                self.set_presentation_mode(!self.state.presentation_mode)
            }
            ControlEvent::SetPresentationMode(enabled) => self.set_presentation_mode(enabled),
            ControlEvent::ScreenShare(active) => self.screen_share_detected(active),
            ControlEvent::StartSession => self.start_session(),
            ControlEvent::StopSession => self.stop_session(),
            ControlEvent::Session(session_event) => self.session_event(session_event),
            ControlEvent::Quit => self.quit(),
        }
        self.publish_snapshot();
    }

    /// Flip the user-hidden flag; always succeeds
    fn toggle_visibility(&mut self) {
        let before = self.state.effective_visibility();
        self.state.user_visible = !self.state.user_visible;
        info!(
            "Overlay visibility toggled to {}",
            if self.state.user_visible { "visible" } else { "hidden" }
        );
        self.sync_visibility(before);
    }

    fn adjust_opacity(&mut self, delta: f32) {
        let value = self.state.opacity + delta;
        self.set_opacity(value);
    }

    fn set_opacity(&mut self, value: f32) {
        let clamped = value.clamp(OPACITY_MIN, OPACITY_MAX);
        if (clamped - self.state.opacity).abs() > f32::EPSILON {
            self.state.opacity = clamped;
            info!("Opacity set to {:.0}%", clamped * 100.0);
            let _ = self.render_tx.send(RenderCommand::SetOpacity(clamped));
        }
    }

    fn adjust_scale(&mut self, delta: f32) {
        let value = self.state.scale + delta;
        self.set_scale(value);
    }

    fn set_scale(&mut self, value: f32) {
        let clamped = value.clamp(SCALE_MIN, SCALE_MAX);
        if (clamped - self.state.scale).abs() > f32::EPSILON {
            self.state.scale = clamped;
            info!("Scale set to {:.0}%", clamped * 100.0);
            let _ = self.render_tx.send(RenderCommand::SetScale(clamped));
        }
    }

    /// Update the presentation-mode flag and re-derive visibility immediately,
    /// without waiting for the next detector poll
    fn set_presentation_mode(&mut self, enabled: bool) {
        let before = self.state.effective_visibility();
        self.state.presentation_mode = enabled;
        info!(
            "Presentation mode {}",
            if enabled { "enabled" } else { "disabled" }
        );
        self.sync_visibility(before);
    }

    fn screen_share_detected(&mut self, active: bool) {
        let before = self.state.effective_visibility();
        self.state.screen_sharing = active;
        info!(
            "Screen sharing {}",
            if active { "detected" } else { "ended" }
        );
        self.sync_visibility(before);
    }

    /// Idempotent: only issues a `Start` command from `Stopped`
    fn start_session(&mut self) {
        match self.state.session {
            SessionState::Stopped => match &self.session_tx {
                Some(tx) => {
                    self.state.last_error = None;
                    self.state.session = SessionState::Starting;
                    let _ = self.render_tx.send(RenderCommand::Clear);
                    let _ = self
                        .render_tx
                        .send(RenderCommand::Notice("Starting session...".to_string()));
                    let _ = tx.send(SessionCommand::Start);
                    info!("Session start requested");
                }
                None => {
                    warn!("Session start requested but no API key is configured");
                    let _ = self.render_tx.send(RenderCommand::Notice(
                        "No OpenAI API key configured; session unavailable".to_string(),
                    ));
                }
            },
            SessionState::Starting | SessionState::Running => {
                debug!("Session already active, start ignored");
            }
        }
    }

    /// No-op from `Stopped`; otherwise asks the worker to tear down.
    /// Safe to call while a start is still in flight — the worker always
    /// answers with an eventual `Stopped`.
    fn stop_session(&mut self) {
        match self.state.session {
            SessionState::Stopped => {
                debug!("No active session to stop");
            }
            SessionState::Starting | SessionState::Running => {
                if let Some(tx) = &self.session_tx {
                    let _ = tx.send(SessionCommand::Stop);
                }
                info!("Session stop requested");
            }
        }
    }

    /// Apply a worker-reported lifecycle or transcript event
    fn session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Started => {
                self.state.session = SessionState::Running;
                info!("Session running");
            }
            SessionEvent::Stopped => {
                self.state.session = SessionState::Stopped;
                info!("Session stopped");
            }
            SessionEvent::Error(reason) => {
                // Relayed to the UI, never retried here; a retry is a fresh
                // user-initiated start_session()
                warn!("Session error: {}", reason);
                self.state.session = SessionState::Stopped;
                self.state.last_error = Some(reason.clone());
                let _ = self
                    .render_tx
                    .send(RenderCommand::Notice(format!("Session error: {reason}")));
            }
            SessionEvent::Transcript(delta) => match delta {
                TranscriptDelta::Delta(text) => {
                    let _ = self.render_tx.send(RenderCommand::AppendDelta(text));
                }
                TranscriptDelta::Completed => {
                    let _ = self.render_tx.send(RenderCommand::EndResponse);
                }
                TranscriptDelta::Notice(text) => {
                    let _ = self.render_tx.send(RenderCommand::Notice(text));
                }
            },
        }
    }

    /// Stop any active session, then end the loop
    fn quit(&mut self) {
        info!("Quit requested");
        self.stop_session();
        self.running = false;
    }

    /// Send `SetVisible` only when the derived value actually changed
    fn sync_visibility(&self, before: bool) {
        let after = self.state.effective_visibility();
        if before != after {
            let _ = self.render_tx.send(RenderCommand::SetVisible(after));
        }
    }

    fn publish_snapshot(&self) {
        let mut snapshot = self.snapshot.write();
        *snapshot = StateSnapshot {
            effective_visible: self.state.effective_visibility(),
            user_visible: self.state.user_visible,
            presentation_mode: self.state.presentation_mode,
            session_active: self.state.session_active(),
            opacity: self.state.opacity,
            scale: self.state.scale,
            last_error: self.state.last_error.clone(),
        };
    }

    #[cfg(test)]
    fn state(&self) -> &OverlayState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn test_controller() -> (
        Controller,
        Receiver<RenderCommand>,
        Receiver<SessionCommand>,
    ) {
        let (render_tx, render_rx) = unbounded();
        let (session_tx, session_rx) = unbounded();
        let controller = Controller::new(&OverlaySettings::default(), render_tx, Some(session_tx));
        (controller, render_rx, session_rx)
    }

    fn drain_render(rx: &Receiver<RenderCommand>) -> Vec<RenderCommand> {
        rx.try_iter().collect()
    }

    fn drain_session(rx: &Receiver<SessionCommand>) -> Vec<SessionCommand> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_opacity_clamps_saturating() {
        let (mut c, render_rx, _session_rx) = test_controller();

        for _ in 0..30 {
            c.handle(ControlEvent::IncreaseOpacity);
        }
        assert!((c.state().opacity - OPACITY_MAX).abs() < f32::EPSILON);

        for _ in 0..30 {
            c.handle(ControlEvent::DecreaseOpacity);
        }
        assert!((c.state().opacity - OPACITY_MIN).abs() < f32::EPSILON);

        // Mixed sequences never escape the bounds
        for i in 0..50 {
            if i % 3 == 0 {
                c.handle(ControlEvent::IncreaseOpacity);
            } else {
                c.handle(ControlEvent::DecreaseOpacity);
            }
            assert!(c.state().opacity >= OPACITY_MIN - f32::EPSILON);
            assert!(c.state().opacity <= OPACITY_MAX + f32::EPSILON);
        }

        drop(drain_render(&render_rx));
    }

    #[test]
    fn test_scale_clamps_saturating() {
        let (mut c, _render_rx, _session_rx) = test_controller();

        for _ in 0..100 {
            c.handle(ControlEvent::IncreaseScale);
        }
        assert!((c.state().scale - SCALE_MAX).abs() < f32::EPSILON);

        for _ in 0..100 {
            c.handle(ControlEvent::DecreaseScale);
        }
        assert!((c.state().scale - SCALE_MIN).abs() < f32::EPSILON);
    }

    #[test]
    fn test_set_opacity_out_of_bounds_is_clamped() {
        let (mut c, _render_rx, _session_rx) = test_controller();

        c.handle(ControlEvent::SetOpacity(7.0));
        assert!((c.state().opacity - OPACITY_MAX).abs() < f32::EPSILON);

        c.handle(ControlEvent::SetOpacity(-1.0));
        assert!((c.state().opacity - OPACITY_MIN).abs() < f32::EPSILON);
    }

    #[test]
    fn test_no_render_command_when_value_unchanged() {
        let (mut c, render_rx, _session_rx) = test_controller();

        // Already at the default maximum
        c.handle(ControlEvent::IncreaseOpacity);
        assert!(drain_render(&render_rx).is_empty());

        c.handle(ControlEvent::DecreaseOpacity);
        assert_eq!(
            drain_render(&render_rx),
            vec![RenderCommand::SetOpacity(OPACITY_MAX - OPACITY_STEP)]
        );
    }

    #[test]
    fn test_toggle_visibility_is_involution() {
        let (mut c, render_rx, _session_rx) = test_controller();
        let initial = c.state().user_visible;

        c.handle(ControlEvent::ToggleVisibility);
        assert_eq!(c.state().user_visible, !initial);
        c.handle(ControlEvent::ToggleVisibility);
        assert_eq!(c.state().user_visible, initial);

        assert_eq!(
            drain_render(&render_rx),
            vec![
                RenderCommand::SetVisible(!initial),
                RenderCommand::SetVisible(initial)
            ]
        );
    }

    #[test]
    fn test_effective_visibility_all_combinations() {
        for user_visible in [false, true] {
            for presentation_mode in [false, true] {
                for screen_sharing in [false, true] {
                    let state = OverlayState {
                        user_visible,
                        opacity: 1.0,
                        scale: 1.0,
                        presentation_mode,
                        screen_sharing,
                        session: SessionState::Stopped,
                        last_error: None,
                    };
                    assert_eq!(
                        state.effective_visibility(),
                        user_visible && !(presentation_mode && screen_sharing),
                        "combo: visible={user_visible} presentation={presentation_mode} sharing={screen_sharing}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_start_session_is_idempotent() {
        let (mut c, _render_rx, session_rx) = test_controller();

        c.handle(ControlEvent::StartSession);
        c.handle(ControlEvent::Session(SessionEvent::Started));
        c.handle(ControlEvent::StartSession);

        // Exactly one Start reached the worker
        assert_eq!(drain_session(&session_rx), vec![SessionCommand::Start]);
        assert_eq!(c.state().session, SessionState::Running);
    }

    #[test]
    fn test_start_session_while_starting_is_noop() {
        let (mut c, _render_rx, session_rx) = test_controller();

        c.handle(ControlEvent::StartSession);
        c.handle(ControlEvent::StartSession);

        assert_eq!(drain_session(&session_rx), vec![SessionCommand::Start]);
        assert_eq!(c.state().session, SessionState::Starting);
    }

    #[test]
    fn test_stop_session_from_stopped_is_noop() {
        let (mut c, _render_rx, session_rx) = test_controller();

        c.handle(ControlEvent::StopSession);

        assert!(drain_session(&session_rx).is_empty());
        assert_eq!(c.state().session, SessionState::Stopped);
    }

    #[test]
    fn test_stop_session_while_starting_reaches_worker() {
        let (mut c, _render_rx, session_rx) = test_controller();

        c.handle(ControlEvent::StartSession);
        c.handle(ControlEvent::StopSession);
        c.handle(ControlEvent::Session(SessionEvent::Stopped));

        assert_eq!(
            drain_session(&session_rx),
            vec![SessionCommand::Start, SessionCommand::Stop]
        );
        assert_eq!(c.state().session, SessionState::Stopped);
    }

    #[test]
    fn test_screen_share_with_presentation_mode_off() {
        let (mut c, render_rx, _session_rx) = test_controller();
        c.handle(ControlEvent::SetPresentationMode(false));
        drop(drain_render(&render_rx));

        c.handle(ControlEvent::ScreenShare(true));

        assert!(c.state().effective_visibility());
        assert!(drain_render(&render_rx).is_empty());
    }

    #[test]
    fn test_screen_share_with_presentation_mode_on() {
        let (mut c, render_rx, _session_rx) = test_controller();
        c.handle(ControlEvent::SetPresentationMode(true));
        drop(drain_render(&render_rx));

        c.handle(ControlEvent::ScreenShare(true));
        assert!(!c.state().effective_visibility());

        c.handle(ControlEvent::ScreenShare(false));
        assert!(c.state().effective_visibility());

        assert_eq!(
            drain_render(&render_rx),
            vec![
                RenderCommand::SetVisible(false),
                RenderCommand::SetVisible(true)
            ]
        );
    }

    #[test]
    fn test_enabling_presentation_mode_hides_immediately_while_sharing() {
        let (mut c, render_rx, _session_rx) = test_controller();
        c.handle(ControlEvent::SetPresentationMode(false));
        c.handle(ControlEvent::ScreenShare(true));
        drop(drain_render(&render_rx));

        // No waiting for the next detector poll
        c.handle(ControlEvent::SetPresentationMode(true));

        assert!(!c.state().effective_visibility());
        assert_eq!(
            drain_render(&render_rx),
            vec![RenderCommand::SetVisible(false)]
        );
    }

    #[test]
    fn test_session_error_returns_to_stopped_and_allows_retry() {
        let (mut c, _render_rx, session_rx) = test_controller();

        c.handle(ControlEvent::StartSession);
        c.handle(ControlEvent::Session(SessionEvent::Started));
        c.handle(ControlEvent::Session(SessionEvent::Error(
            "connection lost".to_string(),
        )));

        assert_eq!(c.state().session, SessionState::Stopped);
        assert_eq!(c.state().last_error.as_deref(), Some("connection lost"));

        // A user-initiated retry issues a fresh Start
        c.handle(ControlEvent::StartSession);
        assert_eq!(
            drain_session(&session_rx),
            vec![SessionCommand::Start, SessionCommand::Start]
        );
    }

    #[test]
    fn test_session_error_is_relayed_to_render_layer() {
        let (mut c, render_rx, _session_rx) = test_controller();

        c.handle(ControlEvent::StartSession);
        drop(drain_render(&render_rx));
        c.handle(ControlEvent::Session(SessionEvent::Error(
            "auth failed".to_string(),
        )));

        assert_eq!(
            drain_render(&render_rx),
            vec![RenderCommand::Notice("Session error: auth failed".to_string())]
        );
    }

    #[test]
    fn test_start_without_session_subsystem_surfaces_notice() {
        let (render_tx, render_rx) = unbounded();
        let mut c = Controller::new(&OverlaySettings::default(), render_tx, None);

        c.handle(ControlEvent::StartSession);

        assert_eq!(c.state().session, SessionState::Stopped);
        let commands = drain_render(&render_rx);
        assert!(matches!(commands.as_slice(), [RenderCommand::Notice(_)]));
    }

    #[test]
    fn test_transcript_deltas_are_relayed() {
        let (mut c, render_rx, _session_rx) = test_controller();

        c.handle(ControlEvent::Session(SessionEvent::Transcript(
            TranscriptDelta::Delta("Hello".to_string()),
        )));
        c.handle(ControlEvent::Session(SessionEvent::Transcript(
            TranscriptDelta::Completed,
        )));

        assert_eq!(
            drain_render(&render_rx),
            vec![
                RenderCommand::AppendDelta("Hello".to_string()),
                RenderCommand::EndResponse
            ]
        );
    }

    #[test]
    fn test_quit_stops_active_session_and_loop() {
        let (mut c, _render_rx, session_rx) = test_controller();

        c.handle(ControlEvent::StartSession);
        c.handle(ControlEvent::Session(SessionEvent::Started));
        c.handle(ControlEvent::Quit);

        assert_eq!(
            drain_session(&session_rx),
            vec![SessionCommand::Start, SessionCommand::Stop]
        );
        assert!(!c.running);
    }

    #[test]
    fn test_quit_without_session_issues_no_stop() {
        let (mut c, _render_rx, session_rx) = test_controller();

        c.handle(ControlEvent::Quit);

        assert!(drain_session(&session_rx).is_empty());
    }

    #[test]
    fn test_snapshot_tracks_state() {
        let (mut c, _render_rx, _session_rx) = test_controller();
        let snapshot = c.snapshot_handle();

        c.handle(ControlEvent::ToggleVisibility);
        assert!(!snapshot.read().user_visible);

        c.handle(ControlEvent::StartSession);
        assert!(snapshot.read().session_active);
    }
}
