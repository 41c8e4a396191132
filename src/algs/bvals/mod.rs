//! Ghost-zone exchange between MeshBlocks.
//!
//! [`BoundaryValues`] owns one send and one receive [`BoundaryBuffer`] per
//! neighbor slot and drives the per-stage protocol:
//!
//! 1. `init_recv` posts every remote receive,
//! 2. `pack_and_send` fills buffers (same-rank neighbors directly),
//! 3. `recv_and_unpack` polls and unpacks once everything arrived,
//! 4. `clear_send` / `clear_recv` drain the stage.
//!
//! Flux corrections at refinement interfaces run the same protocol over the
//! sibling flux buffers and a separate communication context.

mod flux;
mod vars;

use std::sync::Arc;

use crate::algs::communicator::{Communicator, Progress, RuntimeContext};
use crate::algs::task::TaskStatus;
use crate::algs::wire;
use crate::data::buffer::{BoundaryBuffer, CommStatus, SlotBuffer};
use crate::data::index_range::{BufferIndices, init_recv_indices, init_send_indices};
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshError;
use crate::topology::mesh_block::{LevelRelation, MeshBlockPack};
use crate::topology::neighbor::{NeighborIndexer, NeighborKind, SlotKey};

/// Message tag: receiving block's local id and the slot it receives into.
#[inline]
pub fn create_tag(lid: usize, slot: usize) -> u32 {
    ((lid << 6) | slot) as u32
}

/// Which sibling buffer (and communication context) a step works on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Category {
    Vars,
    Flux,
}

impl Category {
    fn slot<H>(self, b: &BoundaryBuffer<H>) -> &SlotBuffer<H> {
        match self {
            Category::Vars => &b.vars,
            Category::Flux => &b.flux,
        }
    }

    fn slot_mut<H>(self, b: &mut BoundaryBuffer<H>) -> &mut SlotBuffer<H> {
        match self {
            Category::Vars => &mut b.vars,
            Category::Flux => &mut b.flux,
        }
    }

    /// Cells moved per variable for a neighbor in relation `rel`, or `None`
    /// if this category does not exchange with it. `receiving` selects the
    /// direction of flux corrections (fine sends, coarse receives).
    fn ndat(self, idx: &BufferIndices, key: SlotKey, rel: LevelRelation, receiving: bool) -> Option<usize> {
        match self {
            Category::Vars => Some(idx.ndat(rel)),
            Category::Flux => {
                let wanted = if receiving {
                    LevelRelation::Finer
                } else {
                    LevelRelation::Coarser
                };
                (key.offset.kind() == NeighborKind::Face && rel == wanted).then_some(idx.flux_ndat)
            }
        }
    }
}

/// Axis along which a face slot points.
pub(crate) fn normal_axis(key: SlotKey) -> usize {
    (0..3).find(|&a| key.offset.axis(a) != 0).unwrap_or(0)
}

/// Halo exchange engine for one [`MeshBlockPack`].
pub struct BoundaryValues<C: Communicator> {
    pack: Arc<MeshBlockPack>,
    indexer: NeighborIndexer,
    nvar: usize,
    nflx: usize,
    comms: RuntimeContext<C>,
    sendbuf: Vec<BoundaryBuffer<C::SendHandle>>,
    recvbuf: Vec<BoundaryBuffer<C::RecvHandle>>,
}

impl<C: Communicator> BoundaryValues<C> {
    /// Build buffers for `nvar` cell-centered variables and `nflx` flux
    /// components. A topology change means building a new engine.
    pub fn new(
        pack: Arc<MeshBlockPack>,
        comms: RuntimeContext<C>,
        nvar: usize,
        nflx: usize,
    ) -> Result<Self, MeshError> {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        pack.validate_invariants()?;
        if comms.rank() != pack.rank() {
            return Err(MeshError::InvalidConfig(format!(
                "communicator rank {} does not own pack of rank {}",
                comms.rank(),
                pack.rank()
            )));
        }
        let dims = pack.dims();
        let indcs = *pack.indcs();
        let indexer = pack.indexer();
        let nmb = pack.nmb();

        let mut sendbuf = Vec::with_capacity(dims.nnghbr());
        let mut recvbuf = Vec::with_capacity(dims.nnghbr());
        for n in 0..dims.nnghbr() {
            let (si, ri) = match indexer.key(n) {
                Some(key) => (
                    init_send_indices(&indcs, dims, key),
                    init_recv_indices(&indcs, dims, key),
                ),
                None => (BufferIndices::default(), BufferIndices::default()),
            };
            let (mut sb, mut rb) = (BoundaryBuffer::new(si), BoundaryBuffer::new(ri));
            if indexer.key(n).is_some() {
                sb.allocate_buffers(nmb, nvar, nflx);
                rb.allocate_buffers(nmb, nvar, nflx);
                sb.debug_assert_invariants();
                rb.debug_assert_invariants();
            }
            sendbuf.push(sb);
            recvbuf.push(rb);
        }
        log::debug!(
            "bvals: rank {} with {nmb} blocks, {} slots, {nvar} vars, {nflx} flux vars, {} send values",
            pack.rank(),
            indexer.active_slots().len(),
            sendbuf
                .iter()
                .map(|b| b.vars.nmb() * b.vars.nvar() * b.vars.capacity())
                .sum::<usize>()
        );
        Ok(Self {
            pack,
            indexer,
            nvar,
            nflx,
            comms,
            sendbuf,
            recvbuf,
        })
    }

    #[inline]
    pub fn pack(&self) -> &MeshBlockPack {
        &self.pack
    }

    #[inline]
    pub fn nvar(&self) -> usize {
        self.nvar
    }

    #[inline]
    pub fn nflx(&self) -> usize {
        self.nflx
    }

    pub fn indexer(&self) -> &NeighborIndexer {
        &self.indexer
    }

    /// Receive-side completion state of block `m` in slot `n`.
    pub fn recv_status(&self, m: usize, n: usize) -> CommStatus {
        self.recvbuf[n].vars.status(m)
    }

    pub fn flux_recv_status(&self, m: usize, n: usize) -> CommStatus {
        self.recvbuf[n].flux.status(m)
    }

    fn width(&self, cat: Category) -> usize {
        match cat {
            Category::Vars => self.nvar,
            Category::Flux => self.nflx,
        }
    }

    /// Post receives for every (block, slot) taking part in `cat`.
    fn post_receives(&mut self, cat: Category) -> Result<TaskStatus, MeshError> {
        let pack = Arc::clone(&self.pack);
        let width = self.width(cat);
        let comm = match cat {
            Category::Vars => &self.comms.vars_comm,
            Category::Flux => &self.comms.flux_comm,
        };
        let mut posted = 0usize;
        for m in 0..pack.nmb() {
            for &n in self.indexer.active_slots() {
                let Some(nb) = pack.neighbor(m, n) else { continue };
                let Some(key) = self.indexer.key(n) else { continue };
                let rel = LevelRelation::of(pack.level(m), nb.level);
                let buf = &mut self.recvbuf[n];
                let Some(ndat) = cat.ndat(buf.indices(), key, rel, true) else {
                    continue;
                };
                let slot = cat.slot_mut(buf);
                if nb.rank != pack.rank() {
                    let h = comm.irecv(nb.rank, create_tag(m, n), wire::byte_len(width * ndat))?;
                    slot.request_mut(m).post(h)?;
                    posted += 1;
                }
                slot.set_status(m, CommStatus::Waiting);
            }
        }
        log::trace!("bvals {cat:?}: posted {posted} receives");
        Ok(TaskStatus::Complete)
    }

    /// Route every participating (block, slot) to its destination and let
    /// `fill` write the `width × ndat` outgoing values.
    fn send_all(
        &mut self,
        cat: Category,
        mut fill: impl FnMut(usize, SlotKey, LevelRelation, &BufferIndices, &mut [f64]),
    ) -> Result<TaskStatus, MeshError> {
        let pack = Arc::clone(&self.pack);
        let width = self.width(cat);
        let comm = match cat {
            Category::Vars => &self.comms.vars_comm,
            Category::Flux => &self.comms.flux_comm,
        };
        for m in 0..pack.nmb() {
            for &n in self.indexer.active_slots() {
                let Some(nb) = pack.neighbor(m, n).copied() else {
                    continue;
                };
                let Some(key) = self.indexer.key(n) else { continue };
                let rel = LevelRelation::of(pack.level(m), nb.level);
                let idx = *self.sendbuf[n].indices();
                let Some(ndat) = cat.ndat(&idx, key, rel, false) else {
                    continue;
                };
                let len = width * ndat;
                if nb.rank == pack.rank() {
                    let dm = pack.local_id(nb.gid, nb.rank)?;
                    let dst_buf = self
                        .recvbuf
                        .get_mut(nb.dest)
                        .ok_or(MeshError::SlotOutOfRange(nb.dest))?;
                    let slot = cat.slot_mut(dst_buf);
                    let cap = slot.block(dm).len();
                    let dst = slot
                        .block_mut(dm)
                        .get_mut(..len)
                        .ok_or(MeshError::BufferShapeMismatch { expected: cap, found: len })?;
                    fill(m, key, rel, &idx, dst);
                    slot.set_status(dm, CommStatus::Completed);
                } else {
                    let tag = create_tag(pack.local_id(nb.gid, nb.rank)?, nb.dest);
                    let slot = cat.slot_mut(&mut self.sendbuf[n]);
                    let (block, req) = slot.block_and_request_mut(m);
                    let dst = &mut block[..len];
                    fill(m, key, rel, &idx, dst);
                    let h = comm.isend(nb.rank, tag, wire::cast_slice(dst))?;
                    req.post(h)?;
                }
            }
        }
        Ok(TaskStatus::Complete)
    }

    /// Land arrived payloads. With `block` set, waits on every outstanding
    /// receive instead of polling once.
    fn poll_receives(&mut self, cat: Category, block: bool) -> Result<TaskStatus, MeshError> {
        let pack = Arc::clone(&self.pack);
        let mut pending = 0usize;
        for m in 0..pack.nmb() {
            for &n in self.indexer.active_slots() {
                let Some(nb) = pack.neighbor(m, n).copied() else {
                    continue;
                };
                let slot = cat.slot_mut(&mut self.recvbuf[n]);
                if slot.status(m) != CommStatus::Waiting {
                    continue;
                }
                if nb.rank == pack.rank() {
                    if block {
                        return Err(MeshError::InvariantViolation(format!(
                            "block {m} slot {n}: waiting on a same-rank neighbor that never packed"
                        )));
                    }
                    pending += 1;
                    continue;
                }
                let (buf, req) = slot.block_and_request_mut(m);
                let landed = if block {
                    Some(req.wait()?)
                } else {
                    match req.test()? {
                        Progress::Done(data) => Some(data),
                        Progress::Pending(()) => None,
                    }
                };
                match landed {
                    Some(Some(bytes)) => {
                        let nv = bytes.len() / std::mem::size_of::<f64>();
                        let cap = buf.len();
                        let dst = buf
                            .get_mut(..nv)
                            .ok_or(MeshError::BufferShapeMismatch { expected: cap, found: nv })?;
                        wire::copy_into(nb.rank, &bytes, dst)?;
                        slot.set_status(m, CommStatus::Completed);
                    }
                    Some(None) => {
                        return Err(MeshError::comm(nb.rank, "receive completed without payload"));
                    }
                    None => pending += 1,
                }
            }
        }
        if pending == 0 {
            Ok(TaskStatus::Complete)
        } else {
            log::trace!("bvals {cat:?}: {pending} receives outstanding");
            Ok(TaskStatus::Incomplete)
        }
    }

    /// Per-block list of `(key, relation, recv indices, payload)` to unpack.
    ///
    /// Fails if any participating buffer is not `Completed`.
    fn completed_payloads(&self, cat: Category) -> Result<Vec<Vec<Payload<'_>>>, MeshError> {
        let pack = &self.pack;
        let width = self.width(cat);
        let mut plans = Vec::with_capacity(pack.nmb());
        for m in 0..pack.nmb() {
            let mut row = Vec::new();
            for &n in self.indexer.active_slots() {
                let Some(nb) = pack.neighbor(m, n) else { continue };
                let Some(key) = self.indexer.key(n) else { continue };
                let rel = LevelRelation::of(pack.level(m), nb.level);
                let buf = &self.recvbuf[n];
                let Some(ndat) = cat.ndat(buf.indices(), key, rel, true) else {
                    continue;
                };
                let slot = cat.slot(buf);
                if slot.status(m) != CommStatus::Completed {
                    return Err(MeshError::InvariantViolation(format!(
                        "block {m} slot {n}: unpack before the receive completed"
                    )));
                }
                row.push(Payload {
                    key,
                    rel,
                    idx: *buf.indices(),
                    ndat,
                    data: &slot.block(m)[..width * ndat],
                });
            }
            plans.push(row);
        }
        Ok(plans)
    }

    fn drain_sends(&mut self, cat: Category) -> Result<TaskStatus, MeshError> {
        let mut drained = 0;
        for b in &mut self.sendbuf {
            drained += cat.slot_mut(b).drain()?;
        }
        log::trace!("bvals {cat:?}: drained {drained} sends");
        Ok(TaskStatus::Complete)
    }

    fn drain_receives(&mut self, cat: Category) -> Result<TaskStatus, MeshError> {
        for b in &mut self.recvbuf {
            let slot = cat.slot_mut(b);
            let left = slot.drain()?;
            if left > 0 {
                log::warn!("bvals {cat:?}: discarded {left} receives that were never unpacked");
            }
            slot.reset_status();
        }
        Ok(TaskStatus::Complete)
    }
}

/// Received data of one (block, slot), ready to unpack.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Payload<'a> {
    key: SlotKey,
    rel: LevelRelation,
    idx: BufferIndices,
    ndat: usize,
    data: &'a [f64],
}

impl<C: Communicator> Drop for BoundaryValues<C> {
    fn drop(&mut self) {
        let mut drained = 0usize;
        for b in &mut self.sendbuf {
            for res in [b.vars.drain(), b.flux.drain()] {
                match res {
                    Ok(n) => drained += n,
                    Err(e) => log::warn!("bvals drop: send drain failed: {e}"),
                }
            }
        }
        for b in &mut self.recvbuf {
            for res in [b.vars.drain(), b.flux.drain()] {
                match res {
                    Ok(n) => drained += n,
                    Err(e) => log::warn!("bvals drop: receive drain failed: {e}"),
                }
            }
        }
        if drained > 0 {
            log::warn!("bvals drop: drained {drained} in-flight requests");
        }
    }
}
