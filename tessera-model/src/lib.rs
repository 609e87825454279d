//! Core data model definitions shared across Tessera crates.
#![allow(missing_docs)]

pub mod events;
pub mod message;
pub mod request;
pub mod task;

pub use events::ThumbnailEvent;
pub use message::{MessageBodyField, MessagePatch};
pub use request::ThumbnailRequest;
pub use task::{CorrelationIds, Task, TaskId, TaskKind, TaskStatus};
