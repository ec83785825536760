// src/cli/handlers/mod.rs

// One module per CLI action; `commons` holds what they share.

pub mod cache;
pub mod commons;
pub mod compile;
pub mod post;
pub mod run;
pub mod vars;
