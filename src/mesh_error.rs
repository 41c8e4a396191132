//! MeshError: Unified error type for amr-halo public APIs
//!
//! Setup (topology, configuration) and transport failures surface through this
//! type. Receives that have not yet arrived are *not* errors; they are reported
//! as [`TaskStatus::Incomplete`](crate::algs::task::TaskStatus::Incomplete).

use thiserror::Error;

/// Unified error type for halo-exchange operations.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Direction offset with a component outside `{-1,0,1}` or all zero.
    #[error("Topology error: invalid neighbor offset ({0}, {1}, {2})")]
    InvalidOffset(i32, i32, i32),
    /// Offset points along an axis that is not active in this mesh.
    #[error("Topology error: offset ({0}, {1}, {2}) uses an inactive axis")]
    InactiveAxis(i32, i32, i32),
    /// Sub-face selector inconsistent with the direction category.
    #[error("Topology error: sub-face ({f1}, {f2}) invalid for offset {offset:?}")]
    InvalidSubface {
        offset: (i32, i32, i32),
        f1: usize,
        f2: usize,
    },
    /// Slot index outside the neighbor layout.
    #[error("Topology error: neighbor slot {0} out of range")]
    SlotOutOfRange(usize),
    /// Neighbor table refers to a block that is not part of the mesh.
    #[error("Topology error: neighbor gid {gid} not owned by rank {rank}")]
    UnknownNeighbor { gid: usize, rank: usize },
    /// Block interior too small for the ghost width (multilevel needs `nx >= 2*ng`).
    #[error("Topology error: axis {axis} has {nx} cells, need at least {need}")]
    BlockTooSmall { axis: usize, nx: usize, need: usize },
    /// Array or buffer extents do not match what the exchange was set up with.
    #[error("Buffer shape mismatch: expected {expected}, got {found}")]
    BufferShapeMismatch { expected: usize, found: usize },
    /// Underlying send/receive/test/wait failed.
    #[error("Communication error with neighbor {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Invalid configuration, detected at setup.
    #[error("Configuration error: {0}")]
    InvalidConfig(String),
    /// The requested orbital shift does not fit the buffers sized at setup.
    #[error("Orbital shift of {shift} cells exceeds buffer capacity of {max} cells")]
    ShiftExceedsBuffer { shift: i64, max: usize },
    /// Internal consistency check failed.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl MeshError {
    pub(crate) fn comm(neighbor: usize, msg: impl Into<String>) -> Self {
        MeshError::CommError {
            neighbor,
            source: msg.into().into(),
        }
    }
}
