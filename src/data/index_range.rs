//! Send/receive index ranges per neighbor slot and level relation.
//!
//! Ranges are inclusive and expressed in the owning block's index space,
//! except [`BufferIndices::coarser`] on the send side, which lives in the
//! block's half-resolution index space (each coarse cell restricts `2^dim`
//! fine cells). Cells are always packed `k`-slowest, `i`-fastest.

use itertools::iproduct;
use serde::{Deserialize, Serialize};

use crate::topology::mesh_block::{LevelRelation, RegionIndices};
use crate::topology::neighbor::{Dimensionality, NeighborKind, SlotKey};

/// Inclusive 3-D index box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    pub il: usize,
    pub iu: usize,
    pub jl: usize,
    pub ju: usize,
    pub kl: usize,
    pub ku: usize,
}

impl IndexRange {
    fn from_axes(r: [(usize, usize); 3]) -> Self {
        Self {
            il: r[0].0,
            iu: r[0].1,
            jl: r[1].0,
            ju: r[1].1,
            kl: r[2].0,
            ku: r[2].1,
        }
    }

    #[inline]
    pub fn lo(&self, axis: usize) -> usize {
        [self.il, self.jl, self.kl][axis]
    }

    #[inline]
    pub fn hi(&self, axis: usize) -> usize {
        [self.iu, self.ju, self.ku][axis]
    }

    #[inline]
    pub fn extent(&self, axis: usize) -> usize {
        self.hi(axis) + 1 - self.lo(axis)
    }

    pub fn volume(&self) -> usize {
        (0..3).map(|a| self.extent(a)).product()
    }

    /// `(k, j, i)` triples in packing order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, usize)> {
        iproduct!(self.kl..=self.ku, self.jl..=self.ju, self.il..=self.iu)
    }
}

/// Index ranges of one slot for each level relation of the neighbor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferIndices {
    pub same: IndexRange,
    pub coarser: IndexRange,
    pub finer: IndexRange,
    /// Flux-correction face plane (faces only).
    pub flux: IndexRange,
    pub same_ndat: usize,
    pub coarser_ndat: usize,
    pub finer_ndat: usize,
    pub flux_ndat: usize,
}

impl BufferIndices {
    #[inline]
    pub fn range(&self, rel: LevelRelation) -> &IndexRange {
        match rel {
            LevelRelation::Coarser => &self.coarser,
            LevelRelation::Same => &self.same,
            LevelRelation::Finer => &self.finer,
        }
    }

    /// Cells per variable moved for a neighbor in relation `rel`.
    #[inline]
    pub fn ndat(&self, rel: LevelRelation) -> usize {
        match rel {
            LevelRelation::Coarser => self.coarser_ndat,
            LevelRelation::Same => self.same_ndat,
            LevelRelation::Finer => self.finer_ndat,
        }
    }

    /// Per-variable capacity: the largest of the three cases.
    pub fn capacity(&self) -> usize {
        self.same_ndat.max(self.coarser_ndat).max(self.finer_ndat)
    }
}

fn interior_strip(ox: i32, s: usize, e: usize, ng: usize) -> (usize, usize) {
    match ox {
        o if o > 0 => (e + 1 - ng, e),
        o if o < 0 => (s, s + ng - 1),
        _ => (s, e),
    }
}

fn ghost_strip(ox: i32, s: usize, e: usize, ng: usize) -> (usize, usize) {
    match ox {
        o if o > 0 => (e + 1, e + ng),
        o if o < 0 => (s - ng, s - 1),
        _ => (s, e),
    }
}

fn face_plane(ox: i32, s: usize, e: usize) -> (usize, usize) {
    if ox > 0 { (e + 1, e + 1) } else { (s, s) }
}

/// Transverse half selected by a sub-face; inactive axes keep their single cell.
fn half(f: usize, s: usize, nx: usize, active: bool) -> (usize, usize) {
    if !active {
        return (s, s);
    }
    let h = nx / 2;
    if f == 0 { (s, s + h - 1) } else { (s + h, s + nx - 1) }
}

/// Ranges of cells a block copies *out* through slot `key`.
pub fn init_send_indices(indcs: &RegionIndices, dims: Dimensionality, key: SlotKey) -> BufferIndices {
    let ng = indcs.ng;
    let o = key.offset;
    let mut same = [(0, 0); 3];
    let mut coarser = [(0, 0); 3];
    let mut finer = [(0, 0); 3];
    let mut flux = [(0, 0); 3];
    for a in 0..3 {
        let (s, e) = (indcs.start[a], indcs.end[a]);
        let (cs, ce) = (indcs.cstart[a], indcs.cend[a]);
        let ox = o.axis(a);
        same[a] = interior_strip(ox, s, e, ng);
        coarser[a] = interior_strip(ox, cs, ce, ng);
        finer[a] = match key.subface(a) {
            Some(f) => half(f, s, indcs.nx[a], dims.is_active(a)),
            None => interior_strip(ox, s, e, ng),
        };
        flux[a] = if ox != 0 { face_plane(ox, s, e) } else { (cs, ce) };
    }
    finish(same, coarser, finer, flux, o.kind() == NeighborKind::Face)
}

/// Ranges of ghost cells a block writes *in* through slot `key`.
///
/// For a coarser neighbor the range is the fine ghost region to be prolonged
/// into, while `coarser_ndat` counts the coarse cells that arrive; see
/// [`coarse_buffer_offset`].
pub fn init_recv_indices(indcs: &RegionIndices, dims: Dimensionality, key: SlotKey) -> BufferIndices {
    let ng = indcs.ng;
    let o = key.offset;
    let mut same = [(0, 0); 3];
    let mut finer = [(0, 0); 3];
    let mut flux = [(0, 0); 3];
    let mut coarse_cells = 1usize;
    for a in 0..3 {
        let (s, e) = (indcs.start[a], indcs.end[a]);
        let ox = o.axis(a);
        same[a] = ghost_strip(ox, s, e, ng);
        match key.subface(a) {
            Some(f) => {
                finer[a] = half(f, s, indcs.nx[a], dims.is_active(a));
                flux[a] = finer[a];
                coarse_cells *= finer[a].1 + 1 - finer[a].0;
            }
            None => {
                finer[a] = same[a];
                flux[a] = face_plane(ox, s, e);
                coarse_cells *= ng;
            }
        }
    }
    let mut bi = finish(same, same, finer, flux, o.kind() == NeighborKind::Face);
    bi.coarser_ndat = coarse_cells;
    bi
}

fn finish(
    same: [(usize, usize); 3],
    coarser: [(usize, usize); 3],
    finer: [(usize, usize); 3],
    flux: [(usize, usize); 3],
    is_face: bool,
) -> BufferIndices {
    let same = IndexRange::from_axes(same);
    let coarser = IndexRange::from_axes(coarser);
    let finer = IndexRange::from_axes(finer);
    let flux = IndexRange::from_axes(flux);
    BufferIndices {
        same,
        coarser,
        finer,
        flux,
        same_ndat: same.volume(),
        coarser_ndat: coarser.volume(),
        finer_ndat: finer.volume(),
        flux_ndat: if is_face { flux.volume() } else { 0 },
    }
}

/// Fine cells `(lo, hi)` along `axis` restricted into coarse cell `c`.
#[inline]
pub fn fine_children(indcs: &RegionIndices, axis: usize, c: usize) -> (usize, usize) {
    if indcs.nx[axis] == 1 {
        return (c, c);
    }
    let f0 = indcs.start[axis] + 2 * (c - indcs.cstart[axis]);
    (f0, f0 + 1)
}

/// Position of fine ghost cell `(k, j, i)` inside the coarse data received
/// from a coarser neighbor through slot `key`, plus which half of its coarse
/// parent the cell occupies along each axis.
pub fn coarse_buffer_offset(
    indcs: &RegionIndices,
    key: SlotKey,
    k: usize,
    j: usize,
    i: usize,
) -> (usize, [bool; 3]) {
    let ng = indcs.ng;
    let idx = [i, j, k];
    let mut pos = [0usize; 3];
    let mut ext = [1usize; 3];
    let mut upper = [false; 3];
    for a in 0..3 {
        let (s, e) = (indcs.start[a], indcs.end[a]);
        let ox = key.offset.axis(a);
        if ox != 0 {
            ext[a] = ng;
            let d = if ox < 0 { s - idx[a] } else { idx[a] - e };
            let dc = d.div_ceil(2);
            pos[a] = if ox < 0 { ng - dc } else { dc - 1 };
            upper[a] = (d % 2 == 1) == (ox < 0);
        } else if indcs.nx[a] > 1 {
            ext[a] = indcs.nx[a] / 2;
            pos[a] = (idx[a] - s) / 2;
            upper[a] = (idx[a] - s) % 2 == 1;
        }
    }
    ((pos[2] * ext[1] + pos[1]) * ext[0] + pos[0], upper)
}
