//! Restriction and prolongation across a refinement interface.
//!
//! The exchange only moves data; how a coarse cell is formed from its fine
//! children (and back) belongs to the numerical scheme, which plugs in
//! through [`LevelTransfer`].

/// Fine ⇄ coarse operators applied cell by cell during pack/unpack.
pub trait LevelTransfer: Send + Sync {
    /// Coarse value from the `2^dim` fine children of one coarse cell.
    fn restrict(&self, fine: &[f64]) -> f64;

    /// Fine value from its coarse parent. `upper[a]` is true when the fine
    /// cell is the upper child along axis `a`.
    fn prolong(&self, coarse: f64, upper: [bool; 3]) -> f64;
}

/// Volume-average restriction with piecewise-constant prolongation.
///
/// Conservative on uniform cells; first-order in the ghost zones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VolumeAverage;

impl LevelTransfer for VolumeAverage {
    #[inline]
    fn restrict(&self, fine: &[f64]) -> f64 {
        if fine.is_empty() {
            return 0.0;
        }
        fine.iter().sum::<f64>() / fine.len() as f64
    }

    #[inline]
    fn prolong(&self, coarse: f64, _upper: [bool; 3]) -> f64 {
        coarse
    }
}

impl<T: LevelTransfer + ?Sized> LevelTransfer for &T {
    fn restrict(&self, fine: &[f64]) -> f64 {
        (**self).restrict(fine)
    }

    fn prolong(&self, coarse: f64, upper: [bool; 3]) -> f64 {
        (**self).prolong(coarse, upper)
    }
}
