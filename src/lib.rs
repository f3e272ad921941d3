//! StoryEngine: prompt construction and request relay for classroom story chapters.
//!
//! The server half (`routes`, `logic`, `openai`) turns a teacher mission plus the
//! round-tripped world state into one model call and a sanitized chapter.
//! The `client` half owns the local mission/story state and talks to the endpoint.

pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod lenient;
pub mod locked;
pub mod logic;
pub mod model;
pub mod openai;
pub mod prompt;
pub mod protocol;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod util;
