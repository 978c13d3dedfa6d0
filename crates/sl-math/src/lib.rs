//! Sightline math utilities.

pub mod math;

pub use math::geo::*;
pub use math::stats::*;
