//! Neighbor slot layout shared by every buffer in the exchange.
//!
//! Buffers are addressed positionally, so the mapping from a direction offset
//! (plus sub-face selectors across a refinement interface) to a slot index
//! lives in exactly one place: [`NeighborIndexer`].
//!
//! Layout (3-D, multilevel):
//!
//! | slots      | category   |
//! |------------|------------|
//! | `[0, 8)`   | x1-faces   |
//! | `[8, 16)`  | x2-faces   |
//! | `[16, 24)` | x1x2-edges |
//! | `[24, 32)` | x3-faces   |
//! | `[32, 40)` | x3x1-edges |
//! | `[40, 48)` | x2x3-edges |
//! | `[48, 56)` | corners    |
//!
//! Sub-face selectors pick the half of the face (or edge) along each
//! *transverse* axis, in axis order: `f1` for the first axis whose offset is
//! zero, `f2` for the second.

use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

use crate::mesh_error::MeshError;

/// Total number of neighbor slots in the layout.
pub const NNGHBR: usize = 56;

const_assert_eq!(NNGHBR, 7 * 8);

/// Number of active spatial dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimensionality {
    One,
    Two,
    Three,
}

impl Dimensionality {
    pub fn from_ndim(ndim: usize) -> Result<Self, MeshError> {
        match ndim {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            n => Err(MeshError::InvalidConfig(format!(
                "dimensionality must be 1, 2 or 3, got {n}"
            ))),
        }
    }

    #[inline]
    pub fn ndim(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    /// Whether axis `a` (0 = x1, 1 = x2, 2 = x3) carries more than one cell.
    #[inline]
    pub fn is_active(self, axis: usize) -> bool {
        axis < self.ndim()
    }

    /// Length of the per-block neighbor slot arrays for this dimensionality.
    pub fn nnghbr(self) -> usize {
        match self {
            Self::One => 8,
            Self::Two => 24,
            Self::Three => NNGHBR,
        }
    }
}

/// Direction from a block towards one of its neighbors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NeighborOffset {
    pub ox1: i32,
    pub ox2: i32,
    pub ox3: i32,
}

/// Face, edge or corner adjacency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborKind {
    Face,
    Edge,
    Corner,
}

impl NeighborOffset {
    pub const fn new(ox1: i32, ox2: i32, ox3: i32) -> Self {
        Self { ox1, ox2, ox3 }
    }

    #[inline]
    pub fn as_array(self) -> [i32; 3] {
        [self.ox1, self.ox2, self.ox3]
    }

    #[inline]
    pub fn axis(self, a: usize) -> i32 {
        self.as_array()[a]
    }

    /// Direction seen from the neighbor back to this block.
    pub fn opposite(self) -> Self {
        Self::new(-self.ox1, -self.ox2, -self.ox3)
    }

    pub fn nonzero_count(self) -> usize {
        self.as_array().iter().filter(|&&o| o != 0).count()
    }

    pub fn kind(self) -> NeighborKind {
        match self.nonzero_count() {
            1 => NeighborKind::Face,
            2 => NeighborKind::Edge,
            _ => NeighborKind::Corner,
        }
    }

    /// Axes with zero offset, in axis order.
    pub fn transverse_axes(self) -> impl Iterator<Item = usize> {
        (0..3).filter(move |&a| self.axis(a) == 0)
    }
}

/// Fully qualified slot: direction plus sub-face selectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub offset: NeighborOffset,
    pub f1: usize,
    pub f2: usize,
}

impl SlotKey {
    /// Sub-face selector along `axis`, or `None` if `axis` is a normal axis.
    pub fn subface(&self, axis: usize) -> Option<usize> {
        let mut sel = [self.f1, self.f2].into_iter();
        self.offset
            .transverse_axes()
            .zip(&mut sel)
            .find(|&(a, _)| a == axis)
            .map(|(_, f)| f)
    }
}

/// Raw positional layout; callers must have validated the key.
fn layout_index(o: NeighborOffset, f1: usize, f2: usize) -> usize {
    let s = |ox: i32| ((ox + 1) / 2) as usize;
    match (o.ox1 != 0, o.ox2 != 0, o.ox3 != 0) {
        (true, false, false) => s(o.ox1) * 4 + f1 + 2 * f2,
        (false, true, false) => 8 + s(o.ox2) * 4 + f1 + 2 * f2,
        (true, true, false) => 16 + s(o.ox2) * 4 + s(o.ox1) * 2 + f1,
        (false, false, true) => 24 + s(o.ox3) * 4 + f1 + 2 * f2,
        (true, false, true) => 32 + s(o.ox3) * 4 + s(o.ox1) * 2 + f1,
        (false, true, true) => 40 + s(o.ox3) * 4 + s(o.ox2) * 2 + f1,
        (true, true, true) => 48 + s(o.ox3) * 4 + s(o.ox2) * 2 + s(o.ox1),
        (false, false, false) => unreachable!("zero offset rejected by validation"),
    }
}

/// Bijective table between [`SlotKey`]s and slot indices, built once per
/// mesh configuration.
#[derive(Clone, Debug)]
pub struct NeighborIndexer {
    dims: Dimensionality,
    multilevel: bool,
    keys: [Option<SlotKey>; NNGHBR],
    active: Vec<usize>,
}

impl NeighborIndexer {
    pub fn new(dims: Dimensionality, multilevel: bool) -> Self {
        let mut me = Self {
            dims,
            multilevel,
            keys: [None; NNGHBR],
            active: Vec::new(),
        };
        for ox3 in -1..=1 {
            for ox2 in -1..=1 {
                for ox1 in -1..=1 {
                    for f2 in 0..2 {
                        for f1 in 0..2 {
                            let o = NeighborOffset::new(ox1, ox2, ox3);
                            if let Ok(n) = me.index(o, f1, f2) {
                                me.keys[n] = Some(SlotKey { offset: o, f1, f2 });
                            }
                        }
                    }
                }
            }
        }
        me.active = (0..NNGHBR).filter(|&n| me.keys[n].is_some()).collect();
        log::debug!(
            "neighbor indexer: {}-D, multilevel={multilevel}, {} active slots",
            dims.ndim(),
            me.active.len()
        );
        me
    }

    #[inline]
    pub fn dims(&self) -> Dimensionality {
        self.dims
    }

    #[inline]
    pub fn multilevel(&self) -> bool {
        self.multilevel
    }

    /// Length of per-block slot arrays (8, 24 or 56).
    #[inline]
    pub fn nnghbr(&self) -> usize {
        self.dims.nnghbr()
    }

    /// Slot index for a direction and sub-face pair.
    ///
    /// # Errors
    /// Returns a topology error when the offset or sub-face selectors are not
    /// valid for this dimensionality and refinement setting. Intended for
    /// setup; per-stage code works with the returned `usize`.
    pub fn index(&self, offset: NeighborOffset, f1: usize, f2: usize) -> Result<usize, MeshError> {
        let [o1, o2, o3] = offset.as_array();
        if offset.as_array().iter().any(|o| !(-1..=1).contains(o)) || offset.nonzero_count() == 0 {
            return Err(MeshError::InvalidOffset(o1, o2, o3));
        }
        if (0..3).any(|a| offset.axis(a) != 0 && !self.dims.is_active(a)) {
            return Err(MeshError::InactiveAxis(o1, o2, o3));
        }
        let bad = || MeshError::InvalidSubface {
            offset: (o1, o2, o3),
            f1,
            f2,
        };
        if f1 > 1 || f2 > 1 {
            return Err(bad());
        }
        let mut sel = [f1, f2].into_iter();
        for axis in offset.transverse_axes() {
            let f = sel.next().unwrap_or(0);
            if f != 0 && (!self.multilevel || !self.dims.is_active(axis)) {
                return Err(bad());
            }
        }
        // Selectors beyond the number of transverse axes must be zero.
        if sel.any(|f| f != 0) {
            return Err(bad());
        }
        Ok(layout_index(offset, f1, f2))
    }

    /// Convenience: slot index of the same-level neighbor in `offset`.
    pub fn index_of(&self, ox1: i32, ox2: i32, ox3: i32) -> Result<usize, MeshError> {
        self.index(NeighborOffset::new(ox1, ox2, ox3), 0, 0)
    }

    /// Inverse lookup.
    #[inline]
    pub fn key(&self, slot: usize) -> Option<SlotKey> {
        self.keys.get(slot).copied().flatten()
    }

    /// Slots valid for this configuration, in layout order.
    pub fn active_slots(&self) -> &[usize] {
        &self.active
    }

    /// Slots with a face adjacency.
    pub fn face_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.active
            .iter()
            .copied()
            .filter(|&n| matches!(self.keys[n], Some(k) if k.offset.kind() == NeighborKind::Face))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn full_3d_layout_is_bijective() {
        let ix = NeighborIndexer::new(Dimensionality::Three, true);
        assert_eq!(ix.active_slots().len(), NNGHBR);
        let keys: HashSet<_> = (0..NNGHBR).map(|n| ix.key(n).unwrap()).collect();
        assert_eq!(keys.len(), NNGHBR);
        for n in 0..NNGHBR {
            let k = ix.key(n).unwrap();
            assert_eq!(ix.index(k.offset, k.f1, k.f2).unwrap(), n);
        }
    }

    #[test]
    fn category_boundaries() {
        let ix = NeighborIndexer::new(Dimensionality::Three, true);
        assert_eq!(ix.index_of(-1, 0, 0).unwrap(), 0);
        assert_eq!(ix.index_of(1, 0, 0).unwrap(), 4);
        assert_eq!(ix.index_of(0, -1, 0).unwrap(), 8);
        assert_eq!(ix.index_of(0, 1, 0).unwrap(), 12);
        assert_eq!(ix.index_of(-1, -1, 0).unwrap(), 16);
        assert_eq!(ix.index_of(0, 0, -1).unwrap(), 24);
        assert_eq!(ix.index_of(-1, 0, -1).unwrap(), 32);
        assert_eq!(ix.index_of(0, -1, -1).unwrap(), 40);
        assert_eq!(ix.index_of(-1, -1, -1).unwrap(), 48);
        assert_eq!(ix.index_of(1, 1, 1).unwrap(), 55);
    }

    #[test]
    fn uniform_layouts_use_subface_zero_only() {
        let two = NeighborIndexer::new(Dimensionality::Two, false);
        assert_eq!(two.active_slots().len(), 8);
        let two_ml = NeighborIndexer::new(Dimensionality::Two, true);
        assert_eq!(two_ml.active_slots().len(), 12);
        let three = NeighborIndexer::new(Dimensionality::Three, false);
        assert_eq!(three.active_slots().len(), 26);
        let one = NeighborIndexer::new(Dimensionality::One, true);
        assert_eq!(one.active_slots(), &[0, 4]);
    }

    #[test]
    fn rejects_malformed_keys() {
        let ix = NeighborIndexer::new(Dimensionality::Two, true);
        assert!(matches!(
            ix.index(NeighborOffset::new(0, 0, 0), 0, 0),
            Err(MeshError::InvalidOffset(..))
        ));
        assert!(matches!(
            ix.index(NeighborOffset::new(2, 0, 0), 0, 0),
            Err(MeshError::InvalidOffset(..))
        ));
        assert!(matches!(
            ix.index(NeighborOffset::new(0, 0, 1), 0, 0),
            Err(MeshError::InactiveAxis(..))
        ));
        // x3 is inactive, so the second selector of an x1-face must be zero
        assert!(matches!(
            ix.index(NeighborOffset::new(1, 0, 0), 0, 1),
            Err(MeshError::InvalidSubface { .. })
        ));
        // corners never carry sub-faces
        assert!(matches!(
            ix.index(NeighborOffset::new(1, 1, 0), 1, 0),
            Err(MeshError::InvalidSubface { .. })
        ));
    }

    #[test]
    fn subface_maps_to_transverse_axes() {
        let k = SlotKey {
            offset: NeighborOffset::new(0, 1, 0),
            f1: 1,
            f2: 0,
        };
        assert_eq!(k.subface(0), Some(1));
        assert_eq!(k.subface(1), None);
        assert_eq!(k.subface(2), Some(0));
    }
}
