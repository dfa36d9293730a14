//! Tripdesk - conversational trip-booking session orchestrator
//!
//! Keeps a trip-planning conversation in sync with a remote planning
//! service over a WebSocket, runs the flight/hotel/activity selection
//! protocol, and arbitrates a shared audio channel between speech capture
//! and playback.

#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools
)]

pub mod config;
pub mod console;
pub mod pricing;
pub mod protocol;
pub mod runtime;
pub mod selection;
pub mod session;
pub mod transport;
pub mod voice;
