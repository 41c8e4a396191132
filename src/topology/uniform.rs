//! Single-level block decomposition of a rectangular domain.
//!
//! Builds the neighbor tables that the mesh topology collaborator would
//! otherwise supply: blocks are numbered x1-fastest, distributed over ranks in
//! contiguous runs, and linked to their face/edge/corner neighbors (with
//! periodic wrap where requested).

use crate::config::UniformMeshConfig;
use crate::mesh_error::MeshError;
use crate::topology::mesh_block::{MeshBlockPack, NeighborBlock, RegionIndices, RegionSize};
use crate::topology::neighbor::{Dimensionality, NeighborIndexer};

/// A validated uniform decomposition; hands out one pack per rank.
#[derive(Clone, Debug)]
pub struct UniformMesh {
    cfg: UniformMeshConfig,
    dims: Dimensionality,
    indcs: RegionIndices,
    indexer: NeighborIndexer,
    nmb_each_rank: Vec<usize>,
}

impl UniformMesh {
    pub fn new(cfg: UniformMeshConfig) -> Result<Self, MeshError> {
        cfg.validate()?;
        let dims = Dimensionality::from_ndim(cfg.dims)?;
        let indcs = RegionIndices::new(dims, cfg.nx, cfg.ng)?;
        if cfg.multilevel {
            indcs.check_multilevel(dims)?;
        }
        let indexer = NeighborIndexer::new(dims, cfg.multilevel);
        let nblocks = cfg.total_blocks();
        let base = nblocks / cfg.nranks;
        let extra = nblocks % cfg.nranks;
        let nmb_each_rank = (0..cfg.nranks)
            .map(|r| base + usize::from(r < extra))
            .collect();
        Ok(Self {
            cfg,
            dims,
            indcs,
            indexer,
            nmb_each_rank,
        })
    }

    pub fn indcs(&self) -> &RegionIndices {
        &self.indcs
    }

    pub fn nmb_each_rank(&self) -> &[usize] {
        &self.nmb_each_rank
    }

    /// Rank owning global block `gid`.
    pub fn rank_of(&self, gid: usize) -> usize {
        let mut first = 0;
        for (r, &n) in self.nmb_each_rank.iter().enumerate() {
            if gid < first + n {
                return r;
            }
            first += n;
        }
        self.nmb_each_rank.len() - 1
    }

    fn block_coords(&self, gid: usize) -> [usize; 3] {
        let nb = self.cfg.nblocks;
        [gid % nb[0], (gid / nb[0]) % nb[1], gid / (nb[0] * nb[1])]
    }

    fn gid_of(&self, c: [usize; 3]) -> usize {
        let nb = self.cfg.nblocks;
        (c[2] * nb[1] + c[1]) * nb[0] + c[0]
    }

    fn block_size(&self, c: [usize; 3]) -> RegionSize {
        let (lo, hi) = (self.cfg.xmin, self.cfg.xmax);
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for a in 0..3 {
            let w = (hi[a] - lo[a]) / self.cfg.nblocks[a] as f64;
            min[a] = lo[a] + w * c[a] as f64;
            max[a] = if c[a] + 1 == self.cfg.nblocks[a] {
                hi[a]
            } else {
                lo[a] + w * (c[a] + 1) as f64
            };
        }
        RegionSize::new(min, max, self.indcs.nx)
    }

    fn neighbors_of(&self, c: [usize; 3]) -> Result<Vec<Option<NeighborBlock>>, MeshError> {
        let mut row = vec![None; self.dims.nnghbr()];
        for &n in self.indexer.active_slots() {
            let Some(key) = self.indexer.key(n) else { continue };
            if key.f1 != 0 || key.f2 != 0 {
                continue;
            }
            let mut nc = [0usize; 3];
            let mut inside = true;
            for a in 0..3 {
                let nb = self.cfg.nblocks[a] as i64;
                let mut x = c[a] as i64 + key.offset.axis(a) as i64;
                if x < 0 || x >= nb {
                    if self.cfg.periodic[a] {
                        x = x.rem_euclid(nb);
                    } else {
                        inside = false;
                    }
                }
                nc[a] = x as usize;
            }
            if !inside {
                continue;
            }
            let gid = self.gid_of(nc);
            row[n] = Some(NeighborBlock {
                gid,
                rank: self.rank_of(gid),
                level: 0,
                dest: self.indexer.index(key.offset.opposite(), 0, 0)?,
            });
        }
        Ok(row)
    }

    /// The pack of blocks owned by `rank`.
    pub fn pack(&self, rank: usize) -> Result<MeshBlockPack, MeshError> {
        let mesh_size = RegionSize::new(
            self.cfg.xmin,
            self.cfg.xmax,
            [
                self.indcs.nx[0] * self.cfg.nblocks[0],
                self.indcs.nx[1] * self.cfg.nblocks[1],
                self.indcs.nx[2] * self.cfg.nblocks[2],
            ],
        );
        let mut pack = MeshBlockPack::new(
            rank,
            self.dims,
            self.cfg.multilevel,
            self.indcs,
            mesh_size,
            self.nmb_each_rank.clone(),
        )?;
        let first = pack.first_gid();
        for gid in first..first + self.nmb_each_rank[rank] {
            let c = self.block_coords(gid);
            pack.add_block(0, self.block_size(c), self.neighbors_of(c)?)?;
        }
        log::debug!(
            "uniform mesh: rank {rank} owns gids {first}..{}",
            first + pack.nmb()
        );
        Ok(pack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_invariants::DebugInvariants;

    fn cfg_2d(periodic: bool) -> UniformMeshConfig {
        UniformMeshConfig {
            dims: 2,
            nx: [4, 4, 1],
            nblocks: [3, 2, 1],
            ng: 2,
            periodic: [periodic; 3],
            nranks: 2,
            ..UniformMeshConfig::default()
        }
    }

    #[test]
    fn ranks_own_contiguous_runs() {
        let mesh = UniformMesh::new(cfg_2d(true)).unwrap();
        assert_eq!(mesh.nmb_each_rank(), &[3, 3]);
        assert_eq!(mesh.rank_of(2), 0);
        assert_eq!(mesh.rank_of(3), 1);
        let p1 = mesh.pack(1).unwrap();
        assert_eq!(p1.first_gid(), 3);
        p1.validate_invariants().unwrap();
    }

    #[test]
    fn periodic_neighbors_wrap_and_point_back() {
        let mesh = UniformMesh::new(cfg_2d(true)).unwrap();
        let p0 = mesh.pack(0).unwrap();
        let ix = p0.indexer();
        let left = ix.index_of(-1, 0, 0).unwrap();
        let right = ix.index_of(1, 0, 0).unwrap();
        // block 0 sits at (0,0): its left neighbor wraps to (2,0) = gid 2
        let nb = p0.neighbor(0, left).unwrap();
        assert_eq!(nb.gid, 2);
        assert_eq!(nb.dest, right);
        // lower-left corner wraps in both axes to (2,1) = gid 5, on rank 1
        let ll = ix.index_of(-1, -1, 0).unwrap();
        let nb = p0.neighbor(0, ll).unwrap();
        assert_eq!((nb.gid, nb.rank), (5, 1));
        assert_eq!(nb.dest, ix.index_of(1, 1, 0).unwrap());
    }

    #[test]
    fn outflow_edges_have_no_neighbor() {
        let mesh = UniformMesh::new(cfg_2d(false)).unwrap();
        let p0 = mesh.pack(0).unwrap();
        let ix = p0.indexer();
        assert!(p0.neighbor(0, ix.index_of(-1, 0, 0).unwrap()).is_none());
        assert!(p0.neighbor(0, ix.index_of(1, 0, 0).unwrap()).is_some());
    }
}
