//! # parley-core
//!
//! Core types, collaborator traits, configuration, and error handling for
//! the Parley intake pipeline.

pub mod config;
pub mod error;
pub mod message;
pub mod traits;
