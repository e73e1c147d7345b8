//! # Spatial Indexing
//!
//! - [`distance`] - The exact pair predicate shared by every finder
//! - [`grid`] - A sparse uniform hash grid with bounded neighbourhood traversal
//! - [`partition`] - Power-of-two radius bands, each backed by a grid whose cell
//!   size matches the band's largest radius
//! - [`periodic`] - Periodic boundaries: wrapping, nearest images, boundary copies
//! - [`bounds`] - Axis-aligned bounding boxes and their separation
//!
//! Objects of very different sizes are kept in separate grids so that small
//! objects are not forced into coarse cells sized for the largest radius.

pub mod bounds;
pub mod distance;
pub mod grid;
pub mod partition;
pub mod periodic;
