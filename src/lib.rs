//! duoHome: streaming voice companion core
//!
//! This library turns a child's utterance into a streamed model reply:
//! star commands and app launches are handled locally, everything else is
//! sent to an OpenAI-compatible or Ollama server and spoken back as the
//! text arrives.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::too_many_lines)]

pub mod assistant;
pub mod cli;
pub mod config;
pub mod error;
pub mod messages;
pub mod services;

// Re-exports for convenience
pub use error::{DuoError, Result};
