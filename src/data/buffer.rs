//! Per-slot send/receive storage with completion state.
//!
//! Every neighbor slot owns one [`BoundaryBuffer`], shared by all blocks of a
//! pack: a variables [`SlotBuffer`] and a sibling flux-correction
//! [`SlotBuffer`]. Each holds `[nmb][nvar][capacity]` values, one
//! [`CommStatus`] per block and one owned [`Request`] per block.

use crate::algs::communicator::{Progress, Test, Wait};
use crate::data::index_range::BufferIndices;
use crate::debug_invariants::{DebugInvariants, ensure_len};
use crate::mesh_error::MeshError;

/// Completion state of one (block, slot) buffer within a stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CommStatus {
    #[default]
    Undef,
    Waiting,
    Completed,
}

/// Owned transport handle: at most one in-flight transfer per buffer.
#[derive(Debug)]
pub enum Request<H> {
    Idle,
    InFlight(H),
}

impl<H> Default for Request<H> {
    fn default() -> Self {
        Request::Idle
    }
}

impl<H> Request<H> {
    /// Store a freshly posted handle.
    pub fn post(&mut self, h: H) -> Result<(), MeshError> {
        if self.is_in_flight() {
            return Err(MeshError::InvariantViolation(
                "request posted over an in-flight transfer".into(),
            ));
        }
        *self = Request::InFlight(h);
        Ok(())
    }

    #[inline]
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Request::InFlight(_))
    }
}

impl<H: Test> Request<H> {
    /// Poll once. `Done` leaves the request `Idle`.
    pub fn test(&mut self) -> Result<Progress<()>, MeshError> {
        match std::mem::take(self) {
            Request::Idle => Ok(Progress::Done(None)),
            Request::InFlight(h) => match h.test()? {
                Progress::Done(data) => Ok(Progress::Done(data)),
                Progress::Pending(h) => {
                    *self = Request::InFlight(h);
                    Ok(Progress::Pending(()))
                }
            },
        }
    }
}

impl<H: Wait> Request<H> {
    /// Block until the transfer has finished; `Idle` afterwards.
    pub fn wait(&mut self) -> Result<Option<Vec<u8>>, MeshError> {
        match std::mem::take(self) {
            Request::Idle => Ok(None),
            Request::InFlight(h) => h.wait(),
        }
    }
}

/// `[nmb][nvar][capacity]` values plus per-block status and request.
#[derive(Debug)]
pub struct SlotBuffer<H> {
    nvar: usize,
    capacity: usize,
    data: Vec<f64>,
    stat: Vec<CommStatus>,
    req: Vec<Request<H>>,
}

impl<H> Default for SlotBuffer<H> {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

impl<H> SlotBuffer<H> {
    pub fn new(nmb: usize, nvar: usize, capacity: usize) -> Self {
        Self {
            nvar,
            capacity,
            data: vec![0.0; nmb * nvar * capacity],
            stat: vec![CommStatus::Undef; nmb],
            req: (0..nmb).map(|_| Request::Idle).collect(),
        }
    }

    #[inline]
    pub fn nmb(&self) -> usize {
        self.stat.len()
    }

    #[inline]
    pub fn nvar(&self) -> usize {
        self.nvar
    }

    /// Values per variable per block.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Storage of block `m`, `nvar × capacity` long.
    pub fn block(&self, m: usize) -> &[f64] {
        let n = self.nvar * self.capacity;
        &self.data[m * n..(m + 1) * n]
    }

    pub fn block_mut(&mut self, m: usize) -> &mut [f64] {
        let n = self.nvar * self.capacity;
        &mut self.data[m * n..(m + 1) * n]
    }

    #[inline]
    pub fn status(&self, m: usize) -> CommStatus {
        self.stat[m]
    }

    #[inline]
    pub fn set_status(&mut self, m: usize, s: CommStatus) {
        self.stat[m] = s;
    }

    pub fn request_mut(&mut self, m: usize) -> &mut Request<H> {
        &mut self.req[m]
    }

    /// Storage and request of block `m`, borrowed together.
    pub fn block_and_request_mut(&mut self, m: usize) -> (&mut [f64], &mut Request<H>) {
        let n = self.nvar * self.capacity;
        (&mut self.data[m * n..(m + 1) * n], &mut self.req[m])
    }

    pub fn in_flight(&self) -> usize {
        self.req.iter().filter(|r| r.is_in_flight()).count()
    }

    pub fn reset_status(&mut self) {
        self.stat.fill(CommStatus::Undef);
    }
}

impl<H: Wait> SlotBuffer<H> {
    /// Wait on every in-flight request; returns how many were drained.
    pub fn drain(&mut self) -> Result<usize, MeshError> {
        let mut n = 0;
        for r in self.req.iter_mut().filter(|r| r.is_in_flight()) {
            r.wait()?;
            n += 1;
        }
        Ok(n)
    }
}

impl<H> DebugInvariants for SlotBuffer<H> {
    fn validate_invariants(&self) -> Result<(), MeshError> {
        ensure_len("slot data", self.nmb() * self.nvar * self.capacity, self.data.len())?;
        ensure_len("slot requests", self.nmb(), self.req.len())
    }
}

/// Storage of one neighbor slot for every block of a pack.
#[derive(Debug)]
pub struct BoundaryBuffer<H> {
    indices: BufferIndices,
    pub vars: SlotBuffer<H>,
    pub flux: SlotBuffer<H>,
}

impl<H> BoundaryBuffer<H> {
    /// Unallocated buffer over precomputed index ranges.
    pub fn new(indices: BufferIndices) -> Self {
        Self {
            indices,
            vars: SlotBuffer::default(),
            flux: SlotBuffer::default(),
        }
    }

    #[inline]
    pub fn indices(&self) -> &BufferIndices {
        &self.indices
    }

    /// Size both sibling buffers for the largest case any neighbor level
    /// can require. Called once per topology.
    pub fn allocate_buffers(&mut self, nmb: usize, nvar: usize, nflx: usize) {
        self.vars = SlotBuffer::new(nmb, nvar, self.indices.capacity());
        self.flux = SlotBuffer::new(nmb, nflx, self.indices.flux_ndat);
    }
}

impl<H> DebugInvariants for BoundaryBuffer<H> {
    fn validate_invariants(&self) -> Result<(), MeshError> {
        self.vars.validate_invariants()?;
        self.flux.validate_invariants()?;
        if self.vars.capacity() != self.indices.capacity() {
            return Err(MeshError::BufferShapeMismatch {
                expected: self.indices.capacity(),
                found: self.vars.capacity(),
            });
        }
        Ok(())
    }
}
