//! Re-export public algorithms.

pub mod bvals;
pub mod communicator;
pub mod shearing_box;
pub mod task;
pub mod wire;

pub use bvals::BoundaryValues;
pub use shearing_box::OrbitalAdvection;
pub use task::TaskStatus;
