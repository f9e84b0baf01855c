//! Shared message vocabulary between components

pub mod messages;

pub use messages::{ControlEvent, RenderCommand, SessionCommand, SessionEvent, TranscriptDelta};
