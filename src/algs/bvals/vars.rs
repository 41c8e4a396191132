//! Cell-centered variables: pack, send, receive and unpack ghost zones.

use itertools::iproduct;
use rayon::prelude::*;

use super::{BoundaryValues, Category, Payload};
use crate::algs::communicator::Communicator;
use crate::algs::task::TaskStatus;
use crate::data::array::Array5;
use crate::data::index_range::{BufferIndices, coarse_buffer_offset, fine_children};
use crate::data::level_transfer::LevelTransfer;
use crate::mesh_error::MeshError;
use crate::topology::mesh_block::{LevelRelation, RegionIndices};

impl<C: Communicator> BoundaryValues<C> {
    /// Post non-blocking receives for every remote neighbor and mark every
    /// neighbor slot `Waiting`.
    pub fn init_recv(&mut self) -> Result<TaskStatus, MeshError> {
        self.post_receives(Category::Vars)
    }

    /// Copy (or restrict) send ranges of `u` to every neighbor.
    pub fn pack_and_send<T: LevelTransfer>(&mut self, u: &Array5, transfer: &T) -> Result<TaskStatus, MeshError> {
        self.check_vars(u)?;
        let indcs = *self.pack.indcs();
        let nvar = self.nvar;
        let mut kids = Vec::with_capacity(8);
        self.send_all(Category::Vars, |m, _key, rel, idx, dst| {
            pack_cells(u, m, nvar, &indcs, rel, idx, transfer, &mut kids, dst);
        })
    }

    /// Poll outstanding receives once.
    pub fn test_recv(&mut self) -> Result<TaskStatus, MeshError> {
        self.poll_receives(Category::Vars, false)
    }

    /// Block until every remote receive has landed.
    pub fn wait_recv(&mut self) -> Result<TaskStatus, MeshError> {
        self.poll_receives(Category::Vars, true)
    }

    /// Unpack into the ghost zones of `u` once every receive has completed;
    /// `Incomplete` otherwise, with `u` untouched.
    pub fn recv_and_unpack<T: LevelTransfer>(&mut self, u: &mut Array5, transfer: &T) -> Result<TaskStatus, MeshError> {
        self.check_vars(u)?;
        match self.test_recv()? {
            TaskStatus::Complete => self.unpack(u, transfer),
            other => Ok(other),
        }
    }

    pub fn wait_and_unpack<T: LevelTransfer>(&mut self, u: &mut Array5, transfer: &T) -> Result<TaskStatus, MeshError> {
        self.check_vars(u)?;
        match self.wait_recv()? {
            TaskStatus::Complete => self.unpack(u, transfer),
            other => Ok(other),
        }
    }

    /// Wait for all variable sends of this stage to finish.
    pub fn clear_send(&mut self) -> Result<TaskStatus, MeshError> {
        self.drain_sends(Category::Vars)
    }

    /// Drain any receive still in flight and reset statuses to `Undef`.
    pub fn clear_recv(&mut self) -> Result<TaskStatus, MeshError> {
        self.drain_receives(Category::Vars)
    }

    fn unpack<T: LevelTransfer>(&self, u: &mut Array5, transfer: &T) -> Result<TaskStatus, MeshError> {
        let plans = self.completed_payloads(Category::Vars)?;
        let indcs = *self.pack.indcs();
        let nvar = self.nvar;
        u.par_blocks_mut().for_each(|(m, blk)| {
            for p in &plans[m] {
                unpack_cells(blk, nvar, &indcs, p, transfer);
            }
        });
        Ok(TaskStatus::Complete)
    }

    fn check_vars(&self, u: &Array5) -> Result<(), MeshError> {
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
}

#[allow(clippy::too_many_arguments)]
fn pack_cells<T: LevelTransfer>(
    u: &Array5,
    m: usize,
    nvar: usize,
    indcs: &RegionIndices,
    rel: LevelRelation,
    idx: &BufferIndices,
    transfer: &T,
    kids: &mut Vec<f64>,
    dst: &mut [f64],
) {
    let range = idx.range(rel);
    let ndat = idx.ndat(rel);
    if ndat == 0 {
        return;
    }
    for (v, out) in dst.chunks_exact_mut(ndat).enumerate().take(nvar) {
        match rel {
            LevelRelation::Same | LevelRelation::Finer => {
                for (o, (k, j, i)) in out.iter_mut().zip(range.cells()) {
                    *o = u[[m, v, k, j, i]];
                }
            }
            LevelRelation::Coarser => {
                for (o, (kc, jc, ic)) in out.iter_mut().zip(range.cells()) {
                    let (kl, ku) = fine_children(indcs, 2, kc);
                    let (jl, ju) = fine_children(indcs, 1, jc);
                    let (il, iu) = fine_children(indcs, 0, ic);
                    kids.clear();
                    kids.extend(iproduct!(kl..=ku, jl..=ju, il..=iu).map(|(k, j, i)| u[[m, v, k, j, i]]));
                    *o = transfer.restrict(&kids[..]);
                }
            }
        }
    }
}

fn unpack_cells<T: LevelTransfer>(blk: &mut [f64], nvar: usize, indcs: &RegionIndices, p: &Payload<'_>, transfer: &T) {
    let [n1, n2, n3] = indcs.ncells;
    let at = |v: usize, k: usize, j: usize, i: usize| ((v * n3 + k) * n2 + j) * n1 + i;
    for v in 0..nvar {
        let data = &p.data[v * p.ndat..(v + 1) * p.ndat];
        match p.rel {
            LevelRelation::Same | LevelRelation::Finer => {
                for (&d, (k, j, i)) in data.iter().zip(p.idx.range(p.rel).cells()) {
                    blk[at(v, k, j, i)] = d;
                }
            }
            LevelRelation::Coarser => {
                for (k, j, i) in p.idx.coarser.cells() {
                    let (off, upper) = coarse_buffer_offset(indcs, p.key, k, j, i);
                    blk[at(v, k, j, i)] = transfer.prolong(data[off], upper);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::algs::communicator::{NoComm, RuntimeContext};
    use crate::config::UniformMeshConfig;
    use crate::data::buffer::CommStatus;
    use crate::data::level_transfer::VolumeAverage;
    use crate::topology::uniform::UniformMesh;

    fn periodic_1d(nblocks: usize) -> UniformMesh {
        UniformMesh::new(UniformMeshConfig {
            dims: 1,
            nx: [4, 1, 1],
            nblocks: [nblocks, 1, 1],
            ng: 2,
            ..UniformMeshConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn single_block_periodic_wrap() {
        let mesh = periodic_1d(1);
        let pack = Arc::new(mesh.pack(0).unwrap());
        let mut bv = BoundaryValues::new(Arc::clone(&pack), RuntimeContext::new(&NoComm).unwrap(), 1, 1).unwrap();
        let mut u = Array5::for_pack(&pack, 1);
        u.fill_with(|[_, _, _, _, i]| if (2..6).contains(&i) { i as f64 } else { -1.0 });

        bv.init_recv().unwrap();
        assert_eq!(bv.recv_status(0, 0), CommStatus::Waiting);
        bv.pack_and_send(&u, &VolumeAverage).unwrap();
        assert_eq!(bv.recv_status(0, 0), CommStatus::Completed);
        assert_eq!(bv.recv_and_unpack(&mut u, &VolumeAverage).unwrap(), TaskStatus::Complete);
        bv.clear_send().unwrap();
        bv.clear_recv().unwrap();
        assert_eq!(bv.recv_status(0, 0), CommStatus::Undef);

        let row: Vec<f64> = (0..8).map(|i| u[[0, 0, 0, 0, i]]).collect();
        assert_eq!(row, vec![4.0, 5.0, 2.0, 3.0, 4.0, 5.0, 2.0, 3.0]);
    }

    #[test]
    fn unpack_before_init_is_rejected() {
        let mesh = periodic_1d(2);
        let pack = Arc::new(mesh.pack(0).unwrap());
        let mut bv = BoundaryValues::new(Arc::clone(&pack), RuntimeContext::new(&NoComm).unwrap(), 1, 1).unwrap();
        let mut u = Array5::for_pack(&pack, 1);
        assert!(matches!(
            bv.recv_and_unpack(&mut u, &VolumeAverage),
            Err(MeshError::InvariantViolation(_))
        ));
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let mesh = periodic_1d(2);
        let pack = Arc::new(mesh.pack(0).unwrap());
        let mut bv = BoundaryValues::new(Arc::clone(&pack), RuntimeContext::new(&NoComm).unwrap(), 2, 2).unwrap();
        let u = Array5::for_pack(&pack, 1);
        assert!(matches!(
            bv.pack_and_send(&u, &VolumeAverage),
            Err(MeshError::BufferShapeMismatch { .. })
        ));
    }
}
