//! Data module: arrays, index ranges, buffers and level transfer.

pub mod array;
pub mod buffer;
pub mod index_range;
pub mod level_transfer;

pub use array::{Array4, Array5, FaceField, FluxField};
pub use buffer::{BoundaryBuffer, CommStatus, Request, SlotBuffer};
pub use index_range::{BufferIndices, IndexRange};
pub use level_transfer::{LevelTransfer, VolumeAverage};
