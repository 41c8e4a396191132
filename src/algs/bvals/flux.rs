//! Flux correction at refinement interfaces.
//!
//! A fine block sends the fluxes on its face shared with a coarser neighbor,
//! area-averaged to coarse resolution; the coarse block overwrites its own
//! face fluxes over the matching sub-face so both sides update with the same
//! flux and stay conservative.

use itertools::iproduct;

use super::{BoundaryValues, Category, normal_axis};
use crate::algs::communicator::Communicator;
use crate::algs::task::TaskStatus;
use crate::data::array::FluxField;
use crate::data::index_range::fine_children;
use crate::mesh_error::MeshError;

impl<C: Communicator> BoundaryValues<C> {
    /// Post receives on every face with a finer neighbor.
    pub fn init_flux_recv(&mut self) -> Result<TaskStatus, MeshError> {
        self.post_receives(Category::Flux)
    }

    /// Send restricted face fluxes to every coarser face neighbor.
    pub fn pack_and_send_flux(&mut self, flx: &FluxField) -> Result<TaskStatus, MeshError> {
        self.check_flux(flx)?;
        let indcs = *self.pack.indcs();
        let nflx = self.nflx;
        self.send_all(Category::Flux, |m, key, _rel, idx, dst| {
            let a0 = normal_axis(key);
            let f = flx.axis(a0);
            let ndat = idx.flux_ndat;
            let children = |a: usize, c: usize| {
                if a == a0 { (c, c) } else { fine_children(&indcs, a, c) }
            };
            for (v, out) in dst.chunks_exact_mut(ndat).enumerate().take(nflx) {
                for (o, (kc, jc, ic)) in out.iter_mut().zip(idx.flux.cells()) {
                    let (kl, ku) = children(2, kc);
                    let (jl, ju) = children(1, jc);
                    let (il, iu) = children(0, ic);
                    let (sum, cnt) = iproduct!(kl..=ku, jl..=ju, il..=iu)
                        .fold((0.0, 0usize), |(s, c), (k, j, i)| (s + f[[m, v, k, j, i]], c + 1));
                    *o = sum / cnt as f64;
                }
            }
        })
    }

    pub fn test_flux_recv(&mut self) -> Result<TaskStatus, MeshError> {
        self.poll_receives(Category::Flux, false)
    }

    /// Overwrite coarse face fluxes once every correction has arrived.
    pub fn recv_and_unpack_flux(&mut self, flx: &mut FluxField) -> Result<TaskStatus, MeshError> {
        self.check_flux(flx)?;
        match self.poll_receives(Category::Flux, false)? {
            TaskStatus::Complete => self.unpack_flux(flx),
            other => Ok(other),
        }
    }

    pub fn wait_and_unpack_flux(&mut self, flx: &mut FluxField) -> Result<TaskStatus, MeshError> {
        self.check_flux(flx)?;
        match self.poll_receives(Category::Flux, true)? {
            TaskStatus::Complete => self.unpack_flux(flx),
            other => Ok(other),
        }
    }

    pub fn clear_flux_send(&mut self) -> Result<TaskStatus, MeshError> {
        self.drain_sends(Category::Flux)
    }

    pub fn clear_flux_recv(&mut self) -> Result<TaskStatus, MeshError> {
        self.drain_receives(Category::Flux)
    }

    fn unpack_flux(&self, flx: &mut FluxField) -> Result<TaskStatus, MeshError> {
        let plans = self.completed_payloads(Category::Flux)?;
        for (m, row) in plans.iter().enumerate() {
            for p in row {
                let f = flx.axis_mut(normal_axis(p.key));
                for v in 0..self.nflx {
                    let data = &p.data[v * p.ndat..(v + 1) * p.ndat];
                    for (&d, (k, j, i)) in data.iter().zip(p.idx.flux.cells()) {
                        f[[m, v, k, j, i]] = d;
                    }
                }
            }
        }
        Ok(TaskStatus::Complete)
    }

    fn check_flux(&self, flx: &FluxField) -> Result<(), MeshError> {
        let n = self.pack.indcs().ncells;
        for a in 0..3 {
            let mut want = [self.pack.nmb(), self.nflx, n[2], n[1], n[0]];
            want[4 - a] += 1;
            let got = flx.axis(a).shape();
            if got != want {
                return Err(MeshError::BufferShapeMismatch {
                    expected: want.iter().product(),
                    found: got.iter().product(),
                });
            }
        }
        Ok(())
    }
}
