//! Message types for communication between the controller and its collaborators
//!
//! Every external input (hotkey, menu click, detector report, session event)
//! becomes a `ControlEvent` consumed by the single controller loop. The
//! controller's only outputs are `RenderCommand`s to the overlay window and
//! `SessionCommand`s to the session worker.

/// Events delivered to the controller loop
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// Toggle the user-visible flag of the overlay
    ToggleVisibility,
    /// Step opacity up by one increment
    IncreaseOpacity,
    /// Step opacity down by one increment
    DecreaseOpacity,
    /// Set opacity to an absolute value (menu presets)
    SetOpacity(f32),
    /// Step the overlay scale up by one increment
    IncreaseScale,
    /// Step the overlay scale down by one increment
    DecreaseScale,
    /// Set the overlay scale to an absolute value
    SetScale(f32),
    /// Toggle hide-during-screen-sharing behavior
    TogglePresentationMode,
    /// Set hide-during-screen-sharing behavior directly
    SetPresentationMode(bool),
    /// Start a Realtime API session
    StartSession,
    /// Stop the active Realtime API session
    StopSession,
    /// Screen-share detector report (edge-triggered)
    ScreenShare(bool),
    /// Event reported by the session worker
    Session(SessionEvent),
    /// Shut everything down and exit
    Quit,
}

/// Events emitted by the session worker
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Session connected and configured
    Started,
    /// Session ended (requested or after a failure)
    Stopped,
    /// Session failed; the reason is surfaced to the UI, never retried here
    Error(String),
    /// Streamed model output
    Transcript(TranscriptDelta),
}

/// Incremental transcript output from the model
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptDelta {
    /// A chunk of response text
    Delta(String),
    /// The current response is complete
    Completed,
    /// An informational line (connection status, device selection)
    Notice(String),
}

/// Commands sent to the session worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Connect and begin streaming
    Start,
    /// Tear down the connection; always answered by an eventual `Stopped`
    Stop,
}

/// Commands issued to the overlay render layer
///
/// All commands are idempotent; the render layer gives no feedback.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    /// Show or hide the overlay window contents
    SetVisible(bool),
    /// Set overlay opacity (already clamped by the controller)
    SetOpacity(f32),
    /// Set overlay scale (already clamped by the controller)
    SetScale(f32),
    /// Append streamed text to the current response block
    AppendDelta(String),
    /// Seal the current response block
    EndResponse,
    /// Show an informational line
    Notice(String),
    /// Clear the transcript
    Clear,
    /// Close the overlay window and end the render loop
    Shutdown,
}
