//! Client-side state coordination for the story tool.
//!
//! The endpoint is stateless; all continuity lives here. A [`StoryCoordinator`]
//! owns the teacher mission and the world state, persists both through a
//! [`StateStore`] under two fixed keys, and talks to the endpoint through a
//! [`ChapterTransport`].

pub mod coordinator;
pub mod store;
pub mod transport;

pub use coordinator::{StoryCoordinator, StudentTurn};
pub use store::{FileStore, MemoryStore, StateStore, MISSION_KEY, STORY_KEY};
pub use transport::{ChapterTransport, HttpTransport};

/// Errors surfaced to whoever drives the coordinator (a UI, a CLI, a test).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("No lesson mission saved. Save a teacher mission first.")]
    NoMission,

    #[error("Write a story idea first.")]
    EmptyPrompt,

    #[error("A chapter is already being generated.")]
    Busy,

    /// Non-2xx answer; `message` is the endpoint's `error` field.
    #[error("{message} ({status})")]
    Endpoint { status: u16, message: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
