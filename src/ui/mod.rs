//! User Interface module
//!
//! The chart itself is drawn by [`crate::surface::TerminalEngine`]; this
//! module holds the plain-text output printed around it.

/// Simple CLI output functions
pub mod cli;
