//! Mesh topology consumed by the exchange: neighbor slot layout, blocks and
//! per-rank packs.
//!
//! Most users build a [`MeshBlockPack`] (directly or through
//! [`UniformMesh`]) and hand it to the exchange engines.

pub mod mesh_block;
pub mod neighbor;
pub mod uniform;

pub use mesh_block::{LevelRelation, MeshBlockPack, NeighborBlock, RegionIndices, RegionSize};
pub use neighbor::{Dimensionality, NNGHBR, NeighborIndexer, NeighborOffset, SlotKey};
pub use uniform::UniformMesh;
