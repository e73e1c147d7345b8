//! # Core Module
//!
//! Stateless building blocks of the proximity engine.
//!
//! ## Architecture
//!
//! - **Object Representation** ([`models`]) - Point sets, tracked objects and rigid bodies
//! - **Spatial Indexing** ([`spatial`]) - Distance semantics, sparse uniform grids and
//!   the radius-band partitioner that assigns objects to grids of a matching scale
//!
//! Nothing in this module caches state between calls; the caching and invalidation
//! protocol lives in [`crate::engine`].

pub mod models;
pub mod spatial;
