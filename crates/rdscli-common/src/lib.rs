//! rdscli-common - Shared types and utilities
//!
//! This crate provides the types shared by the client and the control
//! function, without any AWS SDK dependencies to keep it lightweight.
//!
//! ## Modules
//!
//! - [`defaults`]: Default timing and threshold values
//! - [`event`]: Control event payload and invocation outcome
//! - [`placement`]: Stack naming and stack output keys
//! - [`tags`]: Activity record tag keys and timestamp format

pub mod defaults;
pub mod event;
pub mod placement;
pub mod tags;

// Re-export commonly used types
pub use event::{ControlEvent, EventKind, InvalidEvent, Outcome};
pub use placement::Placement;
pub use tags::ActivityKey;
