//! Grid coordinate transformations.
//!
//! Turns the grid-native coordinates of a [`GridDefinition`] into true
//! geographic latitude and longitude for every cell. Regular latitude/longitude
//! grids are the identity case; rotated latitude/longitude grids are unrotated
//! about their southern pole with [`RotatedPole`].
//!
//! [`GridDefinition`]: nwp_common::GridDefinition

pub mod error;
pub mod projector;
pub mod rotated;

pub use error::{ProjectionError, ProjectionResult};
pub use projector::GridProjector;
pub use rotated::RotatedPole;
