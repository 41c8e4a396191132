//! Dense arrays exchanged with the numerical kernels.
//!
//! Cell-centered variables are `[block, variable, k, j, i]`; face-centered
//! fields are `[block, k, j, i]` with one extra face along their own axis.
//! Storage is row-major with `i` fastest, so each block is one contiguous
//! chunk.

use std::ops::{Index, IndexMut};

use rayon::prelude::*;

use crate::topology::mesh_block::{MeshBlockPack, RegionIndices};

/// Row-major `N`-dimensional array of `f64`.
#[derive(Clone, Debug, PartialEq)]
pub struct Array<const N: usize> {
    shape: [usize; N],
    strides: [usize; N],
    data: Vec<f64>,
}

/// Cell-centered variables `[m, v, k, j, i]`.
pub type Array5 = Array<5>;
/// One face-centered component `[m, k, j, i]`.
pub type Array4 = Array<4>;

impl<const N: usize> Array<N> {
    pub fn zeros(shape: [usize; N]) -> Self {
        let mut strides = [1usize; N];
        for d in (0..N.saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * shape[d + 1];
        }
        Self {
            shape,
            strides,
            data: vec![0.0; shape.iter().product()],
        }
    }

    #[inline]
    pub fn shape(&self) -> [usize; N] {
        self.shape
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn offset(&self, idx: [usize; N]) -> usize {
        debug_assert!(
            idx.iter().zip(&self.shape).all(|(i, n)| i < n),
            "index {idx:?} outside shape {:?}",
            self.shape
        );
        idx.iter().zip(&self.strides).map(|(i, s)| i * s).sum()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Elements per block (leading index).
    #[inline]
    pub fn block_len(&self) -> usize {
        self.strides[0]
    }

    pub fn block(&self, m: usize) -> &[f64] {
        let n = self.block_len();
        &self.data[m * n..(m + 1) * n]
    }

    pub fn block_mut(&mut self, m: usize) -> &mut [f64] {
        let n = self.block_len();
        &mut self.data[m * n..(m + 1) * n]
    }

    /// Parallel iterator over `(m, block)` chunks.
    pub fn par_blocks_mut(&mut self) -> impl IndexedParallelIterator<Item = (usize, &mut [f64])> {
        let n = self.block_len().max(1);
        self.data.par_chunks_mut(n).enumerate()
    }

    pub fn fill_with(&mut self, mut f: impl FnMut([usize; N]) -> f64) {
        let mut idx = [0usize; N];
        for v in self.data.iter_mut() {
            *v = f(idx);
            for d in (0..N).rev() {
                idx[d] += 1;
                if idx[d] < self.shape[d] {
                    break;
                }
                idx[d] = 0;
            }
        }
    }

    /// Row-major strides with the leading (block) axis dropped.
    #[inline]
    pub fn inner_strides(&self) -> &[usize] {
        &self.strides[1..]
    }
}

impl<const N: usize> Index<[usize; N]> for Array<N> {
    type Output = f64;
    #[inline]
    fn index(&self, idx: [usize; N]) -> &f64 {
        &self.data[self.offset(idx)]
    }
}

impl<const N: usize> IndexMut<[usize; N]> for Array<N> {
    #[inline]
    fn index_mut(&mut self, idx: [usize; N]) -> &mut f64 {
        let o = self.offset(idx);
        &mut self.data[o]
    }
}

impl Array5 {
    /// Cell-centered array for every block of `pack`, ghosts included.
    pub fn for_pack(pack: &MeshBlockPack, nvar: usize) -> Self {
        let n = pack.indcs().ncells;
        Self::zeros([pack.nmb(), nvar, n[2], n[1], n[0]])
    }
}

/// Face-centered vector field (e.g. magnetic field) on staggered faces.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceField {
    pub x1f: Array4,
    pub x2f: Array4,
    pub x3f: Array4,
}

impl FaceField {
    pub fn zeros(nmb: usize, indcs: &RegionIndices) -> Self {
        let [n1, n2, n3] = indcs.ncells;
        Self {
            x1f: Array4::zeros([nmb, n3, n2, n1 + 1]),
            x2f: Array4::zeros([nmb, n3, n2 + 1, n1]),
            x3f: Array4::zeros([nmb, n3 + 1, n2, n1]),
        }
    }

    pub fn for_pack(pack: &MeshBlockPack) -> Self {
        Self::zeros(pack.nmb(), pack.indcs())
    }
}

/// Face-centered fluxes of every variable, `[m, v, k, j, i]` per axis.
#[derive(Clone, Debug, PartialEq)]
pub struct FluxField {
    pub x1f: Array5,
    pub x2f: Array5,
    pub x3f: Array5,
}

impl FluxField {
    pub fn zeros(nmb: usize, nvar: usize, indcs: &RegionIndices) -> Self {
        let [n1, n2, n3] = indcs.ncells;
        Self {
            x1f: Array5::zeros([nmb, nvar, n3, n2, n1 + 1]),
            x2f: Array5::zeros([nmb, nvar, n3, n2 + 1, n1]),
            x3f: Array5::zeros([nmb, nvar, n3 + 1, n2, n1]),
        }
    }

    pub fn for_pack(pack: &MeshBlockPack, nvar: usize) -> Self {
        Self::zeros(pack.nmb(), nvar, pack.indcs())
    }

    /// Flux component normal to `axis`.
    pub fn axis(&self, axis: usize) -> &Array5 {
        match axis {
            0 => &self.x1f,
            1 => &self.x2f,
            _ => &self.x3f,
        }
    }

    pub fn axis_mut(&mut self, axis: usize) -> &mut Array5 {
        match axis {
            0 => &mut self.x1f,
            1 => &mut self.x2f,
            _ => &mut self.x3f,
        }
    }
}
