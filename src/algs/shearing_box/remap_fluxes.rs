//! Fractional-shift fluxes for the orbital remap.
//!
//! A column `q` has been shifted by the integer part of the orbital
//! displacement already; what is left is a shift by `eps ∈ [0, 1)` cells in
//! the +x2 direction. The flux through the lower face of cell `j` is the
//! amount of `q` that crosses it during that fractional shift.

use num_traits::Float;
use serde::{Deserialize, Serialize};

/// Reconstruction used to build the remap fluxes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconstructionMethod {
    /// First order, needs one ghost row.
    DonorCell,
    /// Second order with a van Leer limited slope, needs two ghost rows.
    #[default]
    PiecewiseLinear,
}

impl ReconstructionMethod {
    /// Ghost rows the stencil reaches below the first interior face.
    pub fn stencil_width(self) -> usize {
        match self {
            ReconstructionMethod::DonorCell => 1,
            ReconstructionMethod::PiecewiseLinear => 2,
        }
    }
}

/// Harmonic-mean (van Leer) limited slope; zero at extrema.
#[inline]
pub fn van_leer_slope<T: Float>(qm: T, q0: T, qp: T) -> T {
    let dql = q0 - qm;
    let dqr = qp - q0;
    let prod = dql * dqr;
    if prod > T::zero() {
        (prod + prod) / (dql + dqr)
    } else {
        T::zero()
    }
}

/// Fill `flux[t]` with the flux through the lower face of interior cell
/// `ng + t` of `q`, for `t` in `0..flux.len()`.
///
/// `q` holds `ng` ghost rows on each side of the interior.
pub fn remap_flux_column<T: Float>(method: ReconstructionMethod, eps: T, q: &[T], ng: usize, flux: &mut [T]) {
    debug_assert!(ng >= method.stencil_width());
    debug_assert!(q.len() + 1 >= flux.len() + 2 * ng);
    let half = T::one() / (T::one() + T::one());
    match method {
        ReconstructionMethod::DonorCell => {
            for (t, f) in flux.iter_mut().enumerate() {
                *f = eps * q[ng + t - 1];
            }
        }
        ReconstructionMethod::PiecewiseLinear => {
            let one = T::one();
            for (t, f) in flux.iter_mut().enumerate() {
                let c = ng + t - 1;
                let dq = van_leer_slope(q[c - 1], q[c], q[c + 1]);
                *f = eps * (q[c] + half * (one - eps) * dq);
            }
        }
    }
}
