//! # shire
//!
//! A script engine for prompt documents. A document is a front-matter header
//! (name, variables, conditions, post-processing) followed by a template body
//! with `/command:props`, `@agent` and `$variable` directives, `#if` chains and
//! fenced code.
//!
//! A run has two phases: [`core::analyzer`] walks the document and executes its
//! commands, then [`core::interpolator`] renders the walker's output against
//! the resolved variables.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
pub type CancellationToken = Arc<AtomicBool>;

pub mod cli;
pub mod commands;
pub mod constants;
pub mod core;
pub mod dev_utils;
pub mod models;
pub mod state;
pub mod system;
pub mod workspace;
