//! Shearing-box orbital advection.
//!
//! In a shearing box the background flow `v2 = -q Ω x1` is removed from the
//! dynamical update and applied afterwards as an exact remap of every x2
//! column. [`OrbitalAdvection`] exchanges the strips of neighboring blocks
//! the remap reads and applies it to cell-centered variables and, through
//! constrained transport, to face-centered magnetic fields.

mod orbital_advection;
pub mod remap_fluxes;

pub use orbital_advection::{OrbitalAdvection, orbital_shift};
pub use remap_fluxes::ReconstructionMethod;
