//! # Core Models Module
//!
//! Data structures describing the objects whose proximity the engine maintains.
//!
//! ## Key Components
//!
//! - [`point_set`] - The ordered, caller-owned collection of tracked objects and rigid bodies
//! - [`object`] - Per-object records, the sphere view used by pair finders, and rigid frames
//! - [`ids`] - Stable identifiers for objects and rigid bodies
//!
//! ## Usage
//!
//! ```
//! use closepair::core::models::point_set::PointSet;
//! use nalgebra::Point3;
//!
//! let mut points = PointSet::new();
//! let id = points.add(Point3::new(0.0, 0.0, 0.0), 1.0).unwrap();
//! assert_eq!(points.index_of(id), Some(0));
//! ```

pub mod ids;
pub mod object;
pub mod point_set;
