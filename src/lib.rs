#![cfg_attr(docsrs, feature(doc_cfg))]
//! # amr-halo
//!
//! amr-halo moves ghost-zone data between the MeshBlocks of a block-structured
//! adaptive mesh. It is the communication layer underneath a finite-volume
//! solver: the numerical kernels hand it plain `[block, variable, k, j, i]`
//! arrays and it fills their ghost zones from the neighbors, locally or across
//! processes.
//!
//! ## Features
//! - Neighbor slots for up to 56 directions, including sub-faces of finer
//!   neighbors
//! - Send/receive index ranges for same-level, coarser and finer neighbors
//! - Asynchronous exchange driven by a poll-until-ready task protocol
//! - Flux correction at refinement interfaces
//! - Shearing-box orbital advection of cell- and face-centered fields
//! - Pluggable transports (serial, in-process ranks, MPI)
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! amr-halo = "0.1"
//! # features = ["mpi-support"]
//! ```
//!
//! A stage of the exchange is a sequence of tasks, each of which returns
//! [`TaskStatus`](algs::TaskStatus) so a scheduler can retry incomplete ones:
//!
//! ```no_run
//! use std::sync::Arc;
//! use amr_halo::prelude::*;
//!
//! # fn main() -> Result<(), MeshError> {
//! let mesh = UniformMesh::new(UniformMeshConfig::default())?;
//! let pack = Arc::new(mesh.pack(0)?);
//! let mut bv = BoundaryValues::new(Arc::clone(&pack), RuntimeContext::new(&NoComm)?, 1, 1)?;
//! let mut u = Array5::for_pack(&pack, 1);
//!
//! bv.init_recv()?;
//! bv.pack_and_send(&u, &VolumeAverage)?;
//! while bv.recv_and_unpack(&mut u, &VolumeAverage)? == TaskStatus::Incomplete {}
//! bv.clear_send()?;
//! bv.clear_recv()?;
//! # Ok(())
//! # }
//! ```

pub mod algs;
pub mod config;
pub mod data;
pub mod debug_invariants;
pub mod mesh_error;
pub mod topology;

pub use debug_invariants::DebugInvariants;
pub use mesh_error::MeshError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::bvals::BoundaryValues;
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, NoComm, RayonComm, RuntimeContext};
    pub use crate::algs::shearing_box::{OrbitalAdvection, ReconstructionMethod};
    pub use crate::algs::task::TaskStatus;
    pub use crate::config::{ShearingBoxConfig, UniformMeshConfig};
    pub use crate::data::array::{Array4, Array5, FaceField, FluxField};
    pub use crate::data::buffer::CommStatus;
    pub use crate::data::level_transfer::{LevelTransfer, VolumeAverage};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::mesh_error::MeshError;
    pub use crate::topology::mesh_block::{MeshBlockPack, NeighborBlock, RegionIndices, RegionSize};
    pub use crate::topology::neighbor::{Dimensionality, NeighborIndexer, NeighborOffset};
    pub use crate::topology::uniform::UniformMesh;
}
