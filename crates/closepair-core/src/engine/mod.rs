//! # Engine Module
//!
//! The stateful layer that keeps a proximity list valid while objects move.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Cutoff, slack, search strategy and tuning thresholds
//! - **Pair Search** ([`finder`]) - Quadratic, grid and rigid-body strategies behind one
//!   trait, with optional periodic boundaries and bounding-box queries
//! - **Motion Tracking** ([`tracker`]) - Snapshots and moved-object detection, rigid-body aware
//! - **Orchestration** ([`controller`]) - Chooses between keeping, patching and rebuilding the list
//! - **Exclusions** ([`filter`]) - Symmetric, stable predicates removing pairs from the list
//! - **Verification** ([`checker`]) - Brute-force cross-check of a maintained list
//! - **Error Handling** ([`error`]) - Engine-level failures
//!
//! ## Update protocol
//!
//! The list is exact for `distance + 2 * slack` at the positions recorded by the
//! tracker. An object that moved at most `slack` cannot have come closer than
//! `distance` to anything not already listed, so only objects that moved
//! further need new work. When too many did, rebuilding is cheaper than patching.

pub mod checker;
pub mod config;
pub mod controller;
pub mod error;
pub mod filter;
pub mod finder;
pub mod pair_list;
pub mod progress;
pub mod tracker;
