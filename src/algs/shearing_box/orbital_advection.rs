//! Orbital advection: remap of x2 columns by the background shear flow.
//!
//! Every column at position `x1` moves by `s = -q Ω x1 dt / dx2` cells along
//! x2. The integer part of `s` is applied by gathering from strips of
//! `ng + maxjshift` rows exchanged with the two x2 neighbors; the remainder
//! `eps ∈ [0, 1)` is applied as a conservative flux-form remap.
//!
//! Face-centered fields are never remapped directly. The same transport is
//! turned into time-integrated EMFs and applied through the discrete curl,
//! which keeps `div B` unchanged to round-off.

use std::sync::Arc;

use rayon::prelude::*;

use super::remap_fluxes::{ReconstructionMethod, remap_flux_column};
use crate::algs::bvals::create_tag;
use crate::algs::communicator::{Communicator, Progress, RuntimeContext};
use crate::algs::task::TaskStatus;
use crate::algs::wire;
use crate::config::ShearingBoxConfig;
use crate::data::array::{Array5, FaceField};
use crate::data::buffer::{CommStatus, SlotBuffer};
use crate::mesh_error::MeshError;
use crate::topology::mesh_block::{MeshBlockPack, RegionIndices, cell_center_x, left_edge_x};
use crate::topology::neighbor::Dimensionality;

/// Integer and fractional part of the orbital shift of a column at `x1`.
///
/// Returns `(joff, eps)` with `joff = floor(s)` and `eps = s - joff ∈ [0, 1)`.
pub fn orbital_shift(qomega: f64, x1: f64, dt: f64, dx2: f64) -> (i64, f64) {
    let s = -qomega * x1 * dt / dx2;
    let j = s.floor();
    let eps = s - j;
    if eps >= 1.0 {
        (j as i64 + 1, 0.0)
    } else {
        (j as i64, eps)
    }
}

/// Send/receive strips for the lower (0) and upper (1) x2 neighbors.
struct Channel<S, R> {
    send: [SlotBuffer<S>; 2],
    recv: [SlotBuffer<R>; 2],
}

impl<S, R> Channel<S, R> {
    fn new(nmb: usize, width: usize, capacity: usize) -> Self {
        Self {
            send: [SlotBuffer::new(nmb, width, capacity), SlotBuffer::new(nmb, width, capacity)],
            recv: [SlotBuffer::new(nmb, width, capacity), SlotBuffer::new(nmb, width, capacity)],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Cc,
    Fc,
}

/// Shearing-box orbital remap for one [`MeshBlockPack`].
pub struct OrbitalAdvection<C: Communicator> {
    pack: Arc<MeshBlockPack>,
    cfg: ShearingBoxConfig,
    nvar: usize,
    maxjshift: usize,
    slots: [usize; 2],
    comms: RuntimeContext<C>,
    cc: Channel<C::SendHandle, C::RecvHandle>,
    fc: Channel<C::SendHandle, C::RecvHandle>,
}

impl<C: Communicator> OrbitalAdvection<C> {
    pub fn new(
        pack: Arc<MeshBlockPack>,
        comms: RuntimeContext<C>,
        nvar: usize,
        cfg: ShearingBoxConfig,
    ) -> Result<Self, MeshError> {
        cfg.validate()?;
        if pack.dims() == Dimensionality::One {
            return Err(MeshError::InvalidConfig(
                "orbital advection needs at least two dimensions".into(),
            ));
        }
        if comms.rank() != pack.rank() {
            return Err(MeshError::InvalidConfig(format!(
                "communicator rank {} does not own pack of rank {}",
                comms.rank(),
                pack.rank()
            )));
        }
        let indcs = *pack.indcs();
        if indcs.ng < cfg.reconstruction.stencil_width() {
            return Err(MeshError::InvalidConfig(format!(
                "{:?} reconstruction needs ng >= {}, got {}",
                cfg.reconstruction,
                cfg.reconstruction.stencil_width(),
                indcs.ng
            )));
        }
        let ix = pack.indexer();
        let slots = [ix.index_of(0, -1, 0)?, ix.index_of(0, 1, 0)?];
        let mut dx2 = pack.mesh_size().dx2;
        for m in 0..pack.nmb() {
            for (side, &n) in slots.iter().enumerate() {
                let nb = pack.neighbor(m, n).ok_or_else(|| {
                    MeshError::InvalidConfig(format!("block {m} has no x2 neighbor in slot {n}"))
                })?;
                if nb.level != pack.level(m) {
                    return Err(MeshError::InvalidConfig(format!(
                        "block {m}: x2 neighbor {} is on level {}, expected {}",
                        nb.gid,
                        nb.level,
                        pack.level(m)
                    )));
                }
                if nb.dest != slots[1 - side] {
                    return Err(MeshError::InvariantViolation(format!(
                        "block {m} slot {n}: x2 neighbor points back into slot {}",
                        nb.dest
                    )));
                }
            }
            dx2 = dx2.min(pack.size(m).dx2);
        }
        if dx2.is_nan() || dx2 <= 0.0 {
            return Err(MeshError::InvalidConfig(format!("dx2 must be positive, got {dx2}")));
        }
        let ms = pack.mesh_size();
        let xmax = ms.x1min.abs().max(ms.x1max.abs());
        let maxjshift = (cfg.qomega().abs() * xmax * cfg.dt_max / dx2).floor() as usize + 1;
        let nj = indcs.ng + maxjshift;
        if nj > indcs.nx[1] {
            return Err(MeshError::InvalidConfig(format!(
                "ng + maxjshift = {nj} exceeds nx2 = {}; reduce dt_max or enlarge blocks",
                indcs.nx[1]
            )));
        }
        let nmb = pack.nmb();
        let (nx1, nk) = (indcs.nx[0], indcs.nx[2]);
        let cc_len = nk * nj * nx1;
        let fc_len = (nk + 1) * nj * nx1 + nk * nj * (nx1 + 1);
        log::debug!(
            "orbital advection: maxjshift={maxjshift}, strip rows={nj}, cc values/block={}, fc values/block={fc_len}",
            nvar * cc_len
        );
        Ok(Self {
            pack,
            cfg,
            nvar,
            maxjshift,
            slots,
            comms,
            cc: Channel::new(nmb, nvar, cc_len),
            fc: Channel::new(nmb, 1, fc_len),
        })
    }

    /// Largest integer shift the strips can hold.
    #[inline]
    pub fn maxjshift(&self) -> usize {
        self.maxjshift
    }

    /// Rows per exchanged strip.
    #[inline]
    pub fn strip_rows(&self) -> usize {
        self.pack.indcs().ng + self.maxjshift
    }

    pub fn config(&self) -> &ShearingBoxConfig {
        &self.cfg
    }

    pub fn recv_status_cc(&self, m: usize, side: usize) -> CommStatus {
        self.cc.recv[side].status(m)
    }

    pub fn init_recv_cc(&mut self) -> Result<TaskStatus, MeshError> {
        self.post_receives(Field::Cc)
    }

    pub fn init_recv_fc(&mut self) -> Result<TaskStatus, MeshError> {
        self.post_receives(Field::Fc)
    }

    /// Send the bottom and top `ng + maxjshift` rows of `u` to the x2 neighbors.
    pub fn pack_and_send_cc(&mut self, u: &Array5) -> Result<TaskStatus, MeshError> {
        self.check_cc(u)?;
        let indcs = *self.pack.indcs();
        let nj = self.strip_rows();
        let nvar = self.nvar;
        self.send_all(Field::Cc, |m, side, dst| {
            let j0 = strip_start(&indcs, side, nj);
            let mut t = 0;
            for v in 0..nvar {
                for k in indcs.ks()..=indcs.ke() {
                    for j in j0..j0 + nj {
                        for i in indcs.is()..=indcs.ie() {
                            dst[t] = u[[m, v, k, j, i]];
                            t += 1;
                        }
                    }
                }
            }
        })
    }

    /// Send the strips of B3 and B1 needed to build the EMFs.
    pub fn pack_and_send_fc(&mut self, b: &FaceField) -> Result<TaskStatus, MeshError> {
        self.check_fc(b)?;
        let indcs = *self.pack.indcs();
        let nj = self.strip_rows();
        self.send_all(Field::Fc, |m, side, dst| {
            let j0 = strip_start(&indcs, side, nj);
            let mut t = 0;
            for k in indcs.ks()..=indcs.ke() + 1 {
                for j in j0..j0 + nj {
                    for i in indcs.is()..=indcs.ie() {
                        dst[t] = b.x3f[[m, k, j, i]];
                        t += 1;
                    }
                }
            }
            for k in indcs.ks()..=indcs.ke() {
                for j in j0..j0 + nj {
                    for i in indcs.is()..=indcs.ie() + 1 {
                        dst[t] = b.x1f[[m, k, j, i]];
                        t += 1;
                    }
                }
            }
        })
    }

    /// Remap `u` over a step `dt` once both strips have arrived.
    pub fn recv_and_unpack_cc(&mut self, u: &mut Array5, dt: f64) -> Result<TaskStatus, MeshError> {
        self.check_cc(u)?;
        self.check_dt(dt)?;
        match self.poll(Field::Cc, false)? {
            TaskStatus::Complete => self.remap_cc(u, dt),
            other => Ok(other),
        }
    }

    pub fn wait_and_unpack_cc(&mut self, u: &mut Array5, dt: f64) -> Result<TaskStatus, MeshError> {
        self.check_cc(u)?;
        self.check_dt(dt)?;
        match self.poll(Field::Cc, true)? {
            TaskStatus::Complete => self.remap_cc(u, dt),
            other => Ok(other),
        }
    }

    /// Apply the orbital EMFs to `b` once both strips have arrived.
    pub fn recv_and_unpack_fc(&mut self, b: &mut FaceField, dt: f64) -> Result<TaskStatus, MeshError> {
        self.check_fc(b)?;
        self.check_dt(dt)?;
        match self.poll(Field::Fc, false)? {
            TaskStatus::Complete => self.remap_fc(b, dt),
            other => Ok(other),
        }
    }

    pub fn wait_and_unpack_fc(&mut self, b: &mut FaceField, dt: f64) -> Result<TaskStatus, MeshError> {
        self.check_fc(b)?;
        self.check_dt(dt)?;
        match self.poll(Field::Fc, true)? {
            TaskStatus::Complete => self.remap_fc(b, dt),
            other => Ok(other),
        }
    }

    /// Wait for every strip sent this stage.
    pub fn clear_send(&mut self) -> Result<TaskStatus, MeshError> {
        for ch in [&mut self.cc, &mut self.fc] {
            for s in &mut ch.send {
                s.drain()?;
            }
        }
        Ok(TaskStatus::Complete)
    }

    /// Drain outstanding receives and reset statuses.
    pub fn clear_recv(&mut self) -> Result<TaskStatus, MeshError> {
        for ch in [&mut self.cc, &mut self.fc] {
            for r in &mut ch.recv {
                let left = r.drain()?;
                if left > 0 {
                    log::warn!("orbital advection: discarded {left} receives that were never unpacked");
                }
                r.reset_status();
            }
        }
        Ok(TaskStatus::Complete)
    }

    fn channel(&mut self, f: Field) -> (&mut Channel<C::SendHandle, C::RecvHandle>, &C) {
        match f {
            Field::Cc => (&mut self.cc, &self.comms.vars_comm),
            Field::Fc => (&mut self.fc, &self.comms.flux_comm),
        }
    }

    fn post_receives(&mut self, f: Field) -> Result<TaskStatus, MeshError> {
        let pack = Arc::clone(&self.pack);
        let slots = self.slots;
        let (ch, comm) = self.channel(f);
        for m in 0..pack.nmb() {
            for (side, &n) in slots.iter().enumerate() {
                let Some(nb) = pack.neighbor(m, n) else { continue };
                let buf = &mut ch.recv[side];
                if nb.rank != pack.rank() {
                    let len = wire::byte_len(buf.block(m).len());
                    let h = comm.irecv(nb.rank, create_tag(m, n), len)?;
                    buf.request_mut(m).post(h)?;
                }
                buf.set_status(m, CommStatus::Waiting);
            }
        }
        Ok(TaskStatus::Complete)
    }

    fn send_all(&mut self, f: Field, mut fill: impl FnMut(usize, usize, &mut [f64])) -> Result<TaskStatus, MeshError> {
        let pack = Arc::clone(&self.pack);
        let slots = self.slots;
        let (ch, comm) = self.channel(f);
        for m in 0..pack.nmb() {
            for (side, &n) in slots.iter().enumerate() {
                let Some(nb) = pack.neighbor(m, n).copied() else {
                    continue;
                };
                if nb.rank == pack.rank() {
                    let dm = pack.local_id(nb.gid, nb.rank)?;
                    let dst = &mut ch.recv[1 - side];
                    fill(m, side, dst.block_mut(dm));
                    dst.set_status(dm, CommStatus::Completed);
                } else {
                    let tag = create_tag(pack.local_id(nb.gid, nb.rank)?, nb.dest);
                    let (blk, req) = ch.send[side].block_and_request_mut(m);
                    fill(m, side, blk);
                    let h = comm.isend(nb.rank, tag, wire::cast_slice(blk))?;
                    req.post(h)?;
                }
            }
        }
        Ok(TaskStatus::Complete)
    }

    fn poll(&mut self, f: Field, block: bool) -> Result<TaskStatus, MeshError> {
        let pack = Arc::clone(&self.pack);
        let slots = self.slots;
        let (ch, _) = self.channel(f);
        let mut pending = 0usize;
        for m in 0..pack.nmb() {
            for (side, &n) in slots.iter().enumerate() {
                let Some(nb) = pack.neighbor(m, n).copied() else {
                    continue;
                };
                let buf = &mut ch.recv[side];
                match buf.status(m) {
                    CommStatus::Completed => continue,
                    CommStatus::Undef => {
                        return Err(MeshError::InvariantViolation(format!(
                            "block {m} slot {n}: orbital receive was never posted"
                        )));
                    }
                    CommStatus::Waiting => {}
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
                let (data, req) = buf.block_and_request_mut(m);
                let landed = if block {
                    Some(req.wait()?)
                } else {
                    match req.test()? {
                        Progress::Done(d) => Some(d),
                        Progress::Pending(()) => None,
                    }
                };
                match landed {
                    Some(Some(bytes)) => {
                        wire::copy_into(nb.rank, &bytes, data)?;
                        buf.set_status(m, CommStatus::Completed);
                    }
                    Some(None) => {
                        return Err(MeshError::comm(nb.rank, "receive completed without payload"));
                    }
                    None => pending += 1,
                }
            }
        }
        Ok(if pending == 0 {
            TaskStatus::Complete
        } else {
            TaskStatus::Incomplete
        })
    }

    fn check_dt(&self, dt: f64) -> Result<(), MeshError> {
        if dt.abs() <= self.cfg.dt_max {
            return Ok(());
        }
        let ms = self.pack.mesh_size();
        let xmax = ms.x1min.abs().max(ms.x1max.abs());
        let shift = (self.cfg.qomega().abs() * xmax * dt.abs() / ms.dx2).ceil();
        Err(MeshError::ShiftExceedsBuffer {
            shift: if shift.is_finite() { shift as i64 } else { i64::MAX },
            max: self.maxjshift,
        })
    }

    fn check_cc(&self, u: &Array5) -> Result<(), MeshError> {
        let n = self.pack.indcs().ncells;
        let want = [self.pack.nmb(), self.nvar, n[2], n[1], n[0]];
        if u.shape() != want {
            return Err(MeshError::BufferShapeMismatch {
                expected: want.iter().product(),
                found: u.len(),
            });
        }
        Ok(())
    }

    fn check_fc(&self, b: &FaceField) -> Result<(), MeshError> {
        let want = FaceField::for_pack(&self.pack);
        for (got, want) in [(&b.x1f, &want.x1f), (&b.x2f, &want.x2f), (&b.x3f, &want.x3f)] {
            if got.shape() != want.shape() {
                return Err(MeshError::BufferShapeMismatch {
                    expected: want.len(),
                    found: got.len(),
                });
            }
        }
        Ok(())
    }

    fn remap_cc(&self, u: &mut Array5, dt: f64) -> Result<TaskStatus, MeshError> {
        let indcs = *self.pack.indcs();
        let nj = self.strip_rows();
        let nvar = self.nvar;
        let method = self.cfg.reconstruction;
        let qomega = self.cfg.qomega();
        let pack = &self.pack;
        let (lower, upper) = strips(&self.cc, pack.nmb());
        let [n1, n2, n3] = indcs.ncells;
        let (nx1, nx2) = (indcs.nx[0], indcs.nx[1]);
        let nk = indcs.nx[2];

        u.par_blocks_mut().for_each(|(m, blk)| {
            let size = pack.size(m);
            let (lo, hi) = (lower[m], upper[m]);
            let mut col = Column::new(nx2, nj, indcs.ng);
            for v in 0..nvar {
                for k in indcs.ks()..=indcs.ke() {
                    for i in indcs.is()..=indcs.ie() {
                        let x1 = cell_center_x((i - indcs.is()) as i64, nx1, size.x1min, size.x1max);
                        let (joff, eps) = orbital_shift(qomega, x1, dt, size.dx2);
                        let strip = ((v * nk + k - indcs.ks()) * nj) * nx1 + i - indcs.is();
                        let at = |j: usize| ((v * n3 + k) * n2 + j) * n1 + i;
                        col.load(|r| lo[strip + r * nx1], |j| blk[at(indcs.js() + j)], |r| hi[strip + r * nx1]);
                        col.remap(method, joff, eps);
                        for (t, &val) in col.updated().iter().enumerate() {
                            blk[at(indcs.js() + t)] = val;
                        }
                    }
                }
            }
        });
        Ok(TaskStatus::Complete)
    }

    fn remap_fc(&self, b: &mut FaceField, dt: f64) -> Result<TaskStatus, MeshError> {
        let indcs = *self.pack.indcs();
        let nj = self.strip_rows();
        let method = self.cfg.reconstruction;
        let qomega = self.cfg.qomega();
        let three_d = self.pack.dims() == Dimensionality::Three;
        let pack = &self.pack;
        let (lower, upper) = strips(&self.fc, pack.nmb());
        let [n1, n2, _] = indcs.ncells;
        let (nx1, nx2, nk) = (indcs.nx[0], indcs.nx[1], indcs.nx[2]);
        let (is, js, ks) = (indcs.is(), indcs.js(), indcs.ks());
        // offset of the B1 part inside a strip
        let b1_off = (nk + 1) * nj * nx1;

        let FaceField { x1f, x2f, x3f } = b;
        x1f.par_blocks_mut()
            .zip(x2f.par_blocks_mut())
            .zip(x3f.par_blocks_mut())
            .for_each(|(((m, b1), (_, b2)), (_, b3))| {
                let size = pack.size(m);
                let (lo, hi) = (lower[m], upper[m]);
                let mut col = Column::new(nx2, nj, indcs.ng);
                // Ez at (k, x2 face, x1 face), Ex at (x3 face, x2 face, i)
                let nf = nx2 + 1;
                let mut ez = vec![0.0; nk * nf * (nx1 + 1)];
                let mut ex = vec![0.0; (nk + 1) * nf * nx1];
                let ez_at = |kk: usize, t: usize, ii: usize| (kk * nf + t) * (nx1 + 1) + ii;
                let ex_at = |kk: usize, t: usize, ii: usize| (kk * nf + t) * nx1 + ii;
                let b1_at = |k: usize, j: usize, i: usize| (k * n2 + j) * (n1 + 1) + i;
                let b2_at = |k: usize, j: usize, i: usize| (k * (n2 + 1) + j) * n1 + i;
                let b3_at = |k: usize, j: usize, i: usize| (k * n2 + j) * n1 + i;

                // Ez = G(B1) on x1 faces
                for kk in 0..nk {
                    for ii in 0..=nx1 {
                        let x1 = left_edge_x(ii as i64, nx1, size.x1min, size.x1max);
                        let (joff, eps) = orbital_shift(qomega, x1, dt, size.dx2);
                        let strip = b1_off + (kk * nj) * (nx1 + 1) + ii;
                        col.load(
                            |r| lo[strip + r * (nx1 + 1)],
                            |j| b1[b1_at(ks + kk, js + j, is + ii)],
                            |r| hi[strip + r * (nx1 + 1)],
                        );
                        col.remap(method, joff, eps);
                        for (t, g) in col.transport(joff).enumerate() {
                            ez[ez_at(kk, t, ii)] = g;
                        }
                    }
                }
                // Ex = -G(B3) on x3 faces
                for kk in 0..=nk {
                    for ii in 0..nx1 {
                        let x1 = cell_center_x(ii as i64, nx1, size.x1min, size.x1max);
                        let (joff, eps) = orbital_shift(qomega, x1, dt, size.dx2);
                        let strip = (kk * nj) * nx1 + ii;
                        col.load(
                            |r| lo[strip + r * nx1],
                            |j| b3[b3_at(ks + kk, js + j, is + ii)],
                            |r| hi[strip + r * nx1],
                        );
                        col.remap(method, joff, eps);
                        for (t, g) in col.transport(joff).enumerate() {
                            ex[ex_at(kk, t, ii)] = -g;
                        }
                    }
                }

                // constrained transport
                let r21 = size.dx2 / size.dx1;
                let r23 = if three_d { size.dx2 / size.dx3 } else { 0.0 };
                for kk in 0..nk {
                    for t in 0..nx2 {
                        for ii in 0..=nx1 {
                            b1[b1_at(ks + kk, js + t, is + ii)] -= ez[ez_at(kk, t + 1, ii)] - ez[ez_at(kk, t, ii)];
                        }
                    }
                    for t in 0..=nx2 {
                        for ii in 0..nx1 {
                            let mut d = r21 * (ez[ez_at(kk, t, ii + 1)] - ez[ez_at(kk, t, ii)]);
                            if three_d {
                                d -= r23 * (ex[ex_at(kk + 1, t, ii)] - ex[ex_at(kk, t, ii)]);
                            }
                            b2[b2_at(ks + kk, js + t, is + ii)] += d;
                        }
                    }
                }
                for kk in 0..=nk {
                    for t in 0..nx2 {
                        for ii in 0..nx1 {
                            b3[b3_at(ks + kk, js + t, is + ii)] += ex[ex_at(kk, t + 1, ii)] - ex[ex_at(kk, t, ii)];
                        }
                    }
                }
            });
        Ok(TaskStatus::Complete)
    }
}

/// Received lower and upper strips of every block.
fn strips<S, R>(ch: &Channel<S, R>, nmb: usize) -> (Vec<&[f64]>, Vec<&[f64]>) {
    let [lo, hi] = &ch.recv;
    (
        (0..nmb).map(|m| lo.block(m)).collect(),
        (0..nmb).map(|m| hi.block(m)).collect(),
    )
}

/// First row of the strip sent to the lower (0) or upper (1) neighbor.
fn strip_start(indcs: &RegionIndices, side: usize, nj: usize) -> usize {
    if side == 0 { indcs.js() } else { indcs.je() + 1 - nj }
}

/// Scratch for one x2 column: the source extended by both strips, its
/// integer-shifted window and the fractional fluxes.
struct Column {
    nx2: usize,
    nj: usize,
    ng: usize,
    ext: Vec<f64>,
    shifted: Vec<f64>,
    flux: Vec<f64>,
    out: Vec<f64>,
}

impl Column {
    fn new(nx2: usize, nj: usize, ng: usize) -> Self {
        Self {
            nx2,
            nj,
            ng,
            ext: vec![0.0; nx2 + 2 * nj],
            shifted: vec![0.0; nx2 + 2 * ng],
            flux: vec![0.0; nx2 + 1],
            out: vec![0.0; nx2],
        }
    }

    /// Fill rows `js - nj ..= je + nj` from the lower strip, the interior
    /// and the upper strip.
    fn load(&mut self, lower: impl Fn(usize) -> f64, interior: impl Fn(usize) -> f64, upper: impl Fn(usize) -> f64) {
        let (nj, nx2) = (self.nj, self.nx2);
        for r in 0..nj {
            self.ext[r] = lower(r);
            self.ext[nj + nx2 + r] = upper(r);
        }
        for j in 0..nx2 {
            self.ext[nj + j] = interior(j);
        }
    }

    /// Source value at interior-relative row `c` (negative below `js`).
    #[inline]
    fn src(&self, c: i64) -> f64 {
        self.ext[(c + self.nj as i64) as usize]
    }

    fn remap(&mut self, method: ReconstructionMethod, joff: i64, eps: f64) {
        let ng = self.ng as i64;
        for t in 0..self.shifted.len() {
            self.shifted[t] = self.src(t as i64 - ng - joff);
        }
        remap_flux_column(method, eps, &self.shifted, self.ng, &mut self.flux);
        for t in 0..self.nx2 {
            self.out[t] = self.shifted[self.ng + t] - (self.flux[t + 1] - self.flux[t]);
        }
    }

    fn updated(&self) -> &[f64] {
        &self.out
    }

    /// Total amount carried through each x2 face `js + t`, `t ∈ 0..=nx2`:
    /// whole cells moved by the integer shift plus the fractional flux.
    fn transport(&self, joff: i64) -> impl Iterator<Item = f64> + '_ {
        (0..=self.nx2).map(move |t| {
            let j = t as i64;
            let whole: f64 = if joff >= 0 {
                (j - joff..j).map(|c| self.src(c)).sum()
            } else {
                -(j..j - joff).map(|c| self.src(c)).sum::<f64>()
            };
            whole + self.flux[t]
        })
    }
}

impl<C: Communicator> Drop for OrbitalAdvection<C> {
    fn drop(&mut self) {
        let mut drained = 0usize;
        for ch in [&mut self.cc, &mut self.fc] {
            let results: Vec<_> = ch
                .send
                .iter_mut()
                .map(SlotBuffer::drain)
                .chain(ch.recv.iter_mut().map(SlotBuffer::drain))
                .collect();
            for res in results {
                match res {
                    Ok(n) => drained += n,
                    Err(e) => log::warn!("orbital advection drop: drain failed: {e}"),
                }
            }
        }
        if drained > 0 {
            log::warn!("orbital advection drop: drained {drained} in-flight requests");
        }
    }
}
