//! I/O helpers: filesystem, child processes and text-generation backends.

pub mod attempt_log;
pub mod config;
pub mod document;
pub mod gemini;
pub mod generator;
pub mod loader;
pub mod paths;
pub mod process;
pub mod prompt;
pub mod reference;
