//! # Workflows Module
//!
//! Drivers built on top of the engine.
//!
//! - **Slack Estimation** ([`slack`]) - Replays a motion pattern under several
//!   candidate slacks and picks the one with the lowest combined cost of list
//!   maintenance and downstream pair evaluation.

pub mod slack;
