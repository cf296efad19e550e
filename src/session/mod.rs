//! Chart session module
//!
//! Runs the chart pipeline for one surface and reports what happened over an
//! event channel.

pub mod action_channel;
pub mod chart_session;

pub use action_channel::{ActionChannel, ChartEvent};
pub use chart_session::{ChartSession, SessionError, SessionSettings};
