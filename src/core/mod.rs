// src/core/mod.rs

pub mod analyzer;
pub mod cache;
pub mod front_matter;
pub mod interpolator;
pub mod jsonpath;
pub mod logical;
pub mod paths;
pub mod pipeline;
pub mod pipeline_funcs;
pub mod post_processor;
pub mod redact;
pub mod session;
pub mod settings;
pub mod syntax;
pub mod variables;
