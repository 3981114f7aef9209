//! Backend abstraction layer
//!
//! Provides the trait the renderer drives and a recording implementation
//! used by tests and headless runs.

pub mod recording;
pub mod traits;
pub mod types;

pub use recording::{Command, DrawKind, DrawRecord, RecordingBackend};
pub use traits::*;
pub use types::*;
