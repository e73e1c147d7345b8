//! # closepair
//!
//! Incremental maintenance of close-pair (non-bonded) lists for particle
//! simulation and restraint scoring.
//!
//! Given a set of objects with positions and interaction radii, the library
//! keeps the list of pairs within a cutoff distance up to date as the objects
//! move, rebuilding it only when motion makes that necessary.
//!
//! ## Architectural Philosophy
//!
//! - **[`core`]: The Foundation.** Point sets, rigid bodies, the exact distance
//!   predicate and the radius-banded spatial grids.
//!
//! - **[`engine`]: The Logic Core.** The stateful controller, moved-object
//!   tracking, pair search strategies, filters and the brute-force checker.
//!
//! - **[`workflows`]: Drivers.** Higher-level procedures such as choosing a
//!   slack from measured update costs.
//!
//! ## Example
//!
//! ```
//! use closepair::core::models::point_set::PointSet;
//! use closepair::engine::config::ProximityConfigBuilder;
//! use closepair::engine::controller::ProximityListController;
//! use nalgebra::Point3;
//!
//! let mut points = PointSet::new();
//! points.add(Point3::new(0.0, 0.0, 0.0), 1.0).unwrap();
//! points.add(Point3::new(5.0, 0.0, 0.0), 1.0).unwrap();
//!
//! let config = ProximityConfigBuilder::new().distance(4.0).slack(1.0).build().unwrap();
//! let mut controller = ProximityListController::new(config).unwrap();
//! controller.update(&points).unwrap();
//! assert_eq!(controller.pairs().as_slice(), &[(0, 1)]);
//! ```

pub mod core;
pub mod engine;
pub mod workflows;
