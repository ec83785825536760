//! # System Interaction Layer
//!
//! The boundary between the engine and the operating system.
//!
//! - **`executor`**: spawns external programs on tokio, captures their output and
//!   kills them when the session's cancellation token is set.

pub mod executor;
