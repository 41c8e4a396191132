//! MeshBlocks, their index ranges and the per-rank `MeshBlockPack`.
//!
//! A `MeshBlockPack` is the read-only view of the mesh topology the exchange
//! consumes: per local block its refinement level, physical extent and one
//! `Option<NeighborBlock>` per neighbor slot. It is rebuilt whenever the mesh
//! is refined or derefined.

use serde::{Deserialize, Serialize};

use crate::debug_invariants::{DebugInvariants, ensure_len};
use crate::mesh_error::MeshError;
use crate::topology::neighbor::{Dimensionality, NeighborIndexer};

/// Cell index ranges shared by every block of a mesh (interior plus ghosts).
///
/// Inactive axes hold a single cell at index 0 and carry no ghosts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionIndices {
    pub ng: usize,
    /// Interior cell count per axis.
    pub nx: [usize; 3],
    /// First interior index per axis (`is`, `js`, `ks`).
    pub start: [usize; 3],
    /// Last interior index per axis (`ie`, `je`, `ke`).
    pub end: [usize; 3],
    /// Total cells including ghosts per axis.
    pub ncells: [usize; 3],
    /// Interior of the half-resolution (coarse) index space.
    pub cnx: [usize; 3],
    pub cstart: [usize; 3],
    pub cend: [usize; 3],
}

impl RegionIndices {
    pub fn new(dims: Dimensionality, nx: [usize; 3], ng: usize) -> Result<Self, MeshError> {
        if ng == 0 {
            return Err(MeshError::InvalidConfig("ghost width must be positive".into()));
        }
        let mut me = Self {
            ng,
            nx: [1; 3],
            start: [0; 3],
            end: [0; 3],
            ncells: [1; 3],
            cnx: [1; 3],
            cstart: [0; 3],
            cend: [0; 3],
        };
        for a in 0..3 {
            if !dims.is_active(a) {
                continue;
            }
            let n = nx[a];
            if n < ng {
                return Err(MeshError::BlockTooSmall { axis: a, nx: n, need: ng });
            }
            me.nx[a] = n;
            me.start[a] = ng;
            me.end[a] = ng + n - 1;
            me.ncells[a] = n + 2 * ng;
            me.cnx[a] = (n / 2).max(1);
            me.cstart[a] = ng;
            me.cend[a] = ng + me.cnx[a] - 1;
        }
        Ok(me)
    }

    #[inline]
    pub fn is(&self) -> usize {
        self.start[0]
    }
    #[inline]
    pub fn ie(&self) -> usize {
        self.end[0]
    }
    #[inline]
    pub fn js(&self) -> usize {
        self.start[1]
    }
    #[inline]
    pub fn je(&self) -> usize {
        self.end[1]
    }
    #[inline]
    pub fn ks(&self) -> usize {
        self.start[2]
    }
    #[inline]
    pub fn ke(&self) -> usize {
        self.end[2]
    }

    /// Cells per block, ghosts included.
    pub fn block_cells(&self) -> usize {
        self.ncells.iter().product()
    }

    /// Check that refinement interfaces fit: `nx >= 2*ng` and even on active axes.
    pub fn check_multilevel(&self, dims: Dimensionality) -> Result<(), MeshError> {
        for a in (0..3).filter(|&a| dims.is_active(a)) {
            let need = 2 * self.ng;
            if self.nx[a] < need || self.nx[a] % 2 != 0 {
                return Err(MeshError::BlockTooSmall {
                    axis: a,
                    nx: self.nx[a],
                    need,
                });
            }
        }
        Ok(())
    }
}

/// Physical extent of a block (or the whole mesh).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionSize {
    pub x1min: f64,
    pub x1max: f64,
    pub x2min: f64,
    pub x2max: f64,
    pub x3min: f64,
    pub x3max: f64,
    pub dx1: f64,
    pub dx2: f64,
    pub dx3: f64,
}

impl RegionSize {
    /// Extent `[min, max]` per axis resolved into `nx` cells.
    pub fn new(min: [f64; 3], max: [f64; 3], nx: [usize; 3]) -> Self {
        let d = |a: usize| (max[a] - min[a]) / nx[a].max(1) as f64;
        Self {
            x1min: min[0],
            x1max: max[0],
            x2min: min[1],
            x2max: max[1],
            x3min: min[2],
            x3max: max[2],
            dx1: d(0),
            dx2: d(1),
            dx3: d(2),
        }
    }
}

/// Center of interior cell `i` (0-based, ghosts excluded) of `nx` cells.
#[inline]
pub fn cell_center_x(i: i64, nx: usize, xmin: f64, xmax: f64) -> f64 {
    let x = (i as f64 + 0.5) / nx as f64;
    xmin * (1.0 - x) + xmax * x
}

/// Left face of interior cell `i` (0-based, ghosts excluded) of `nx` cells.
#[inline]
pub fn left_edge_x(i: i64, nx: usize, xmin: f64, xmax: f64) -> f64 {
    let x = i as f64 / nx as f64;
    xmin * (1.0 - x) + xmax * x
}

/// One entry of the neighbor table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborBlock {
    /// Global id of the neighbor.
    pub gid: usize,
    /// Rank owning the neighbor.
    pub rank: usize,
    /// Refinement level of the neighbor.
    pub level: i32,
    /// Slot on the neighbor that addresses the owning block.
    pub dest: usize,
}

/// Relation of a neighbor's level to the owning block's level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LevelRelation {
    Coarser,
    Same,
    Finer,
}

impl LevelRelation {
    pub fn of(my_level: i32, neighbor_level: i32) -> Self {
        match neighbor_level.cmp(&my_level) {
            std::cmp::Ordering::Less => Self::Coarser,
            std::cmp::Ordering::Equal => Self::Same,
            std::cmp::Ordering::Greater => Self::Finer,
        }
    }
}

/// The blocks owned by one rank, with consecutive global ids.
#[derive(Clone, Debug)]
pub struct MeshBlockPack {
    rank: usize,
    dims: Dimensionality,
    multilevel: bool,
    indcs: RegionIndices,
    mesh_size: RegionSize,
    gids_each_rank: Vec<usize>,
    nmb_each_rank: Vec<usize>,
    levels: Vec<i32>,
    sizes: Vec<RegionSize>,
    neighbors: Vec<Vec<Option<NeighborBlock>>>,
}

impl MeshBlockPack {
    /// Empty pack for `rank`; blocks are appended with [`add_block`](Self::add_block).
    pub fn new(
        rank: usize,
        dims: Dimensionality,
        multilevel: bool,
        indcs: RegionIndices,
        mesh_size: RegionSize,
        nmb_each_rank: Vec<usize>,
    ) -> Result<Self, MeshError> {
        if rank >= nmb_each_rank.len() {
            return Err(MeshError::InvalidConfig(format!(
                "rank {rank} outside of {} ranks",
                nmb_each_rank.len()
            )));
        }
        if multilevel {
            indcs.check_multilevel(dims)?;
        }
        let gids_each_rank = nmb_each_rank
            .iter()
            .scan(0usize, |acc, &n| {
                let first = *acc;
                *acc += n;
                Some(first)
            })
            .collect();
        Ok(Self {
            rank,
            dims,
            multilevel,
            indcs,
            mesh_size,
            gids_each_rank,
            nmb_each_rank,
            levels: Vec::new(),
            sizes: Vec::new(),
            neighbors: Vec::new(),
        })
    }

    /// Append the next local block; returns its local id.
    pub fn add_block(
        &mut self,
        level: i32,
        size: RegionSize,
        neighbors: Vec<Option<NeighborBlock>>,
    ) -> Result<usize, MeshError> {
        let m = self.levels.len();
        if m >= self.nmb_each_rank[self.rank] {
            return Err(MeshError::InvalidConfig(format!(
                "rank {} already holds its {} blocks",
                self.rank, m
            )));
        }
        ensure_len("neighbor slots", self.dims.nnghbr(), neighbors.len())?;
        self.levels.push(level);
        self.sizes.push(size);
        self.neighbors.push(neighbors);
        Ok(m)
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }
    #[inline]
    pub fn nranks(&self) -> usize {
        self.nmb_each_rank.len()
    }
    #[inline]
    pub fn nmb(&self) -> usize {
        self.levels.len()
    }
    #[inline]
    pub fn dims(&self) -> Dimensionality {
        self.dims
    }
    #[inline]
    pub fn multilevel(&self) -> bool {
        self.multilevel
    }
    #[inline]
    pub fn indcs(&self) -> &RegionIndices {
        &self.indcs
    }
    #[inline]
    pub fn mesh_size(&self) -> &RegionSize {
        &self.mesh_size
    }
    #[inline]
    pub fn first_gid(&self) -> usize {
        self.gids_each_rank[self.rank]
    }
    #[inline]
    pub fn level(&self, m: usize) -> i32 {
        self.levels[m]
    }
    #[inline]
    pub fn size(&self, m: usize) -> &RegionSize {
        &self.sizes[m]
    }

    /// Neighbor of local block `m` in slot `n`, if any.
    #[inline]
    pub fn neighbor(&self, m: usize, n: usize) -> Option<&NeighborBlock> {
        self.neighbors[m].get(n).and_then(Option::as_ref)
    }

    /// Local id of `gid` on the rank that owns it.
    pub fn local_id(&self, gid: usize, rank: usize) -> Result<usize, MeshError> {
        let first = *self
            .gids_each_rank
            .get(rank)
            .ok_or(MeshError::UnknownNeighbor { gid, rank })?;
        let lid = gid
            .checked_sub(first)
            .ok_or(MeshError::UnknownNeighbor { gid, rank })?;
        if lid >= self.nmb_each_rank[rank] {
            return Err(MeshError::UnknownNeighbor { gid, rank });
        }
        Ok(lid)
    }

    /// Neighbor indexer matching this pack's dimensionality and refinement.
    pub fn indexer(&self) -> NeighborIndexer {
        NeighborIndexer::new(self.dims, self.multilevel)
    }
}

impl DebugInvariants for MeshBlockPack {
    fn validate_invariants(&self) -> Result<(), MeshError> {
        ensure_len("block sizes", self.nmb(), self.sizes.len())?;
        ensure_len("neighbor table", self.nmb(), self.neighbors.len())?;
        let nnghbr = self.dims.nnghbr();
        let indexer = self.indexer();
        for (m, row) in self.neighbors.iter().enumerate() {
            ensure_len("neighbor slots", nnghbr, row.len())?;
            for (n, nb) in row.iter().enumerate() {
                let Some(nb) = nb else { continue };
                if indexer.key(n).is_none() || indexer.key(nb.dest).is_none() {
                    return Err(MeshError::SlotOutOfRange(n.max(nb.dest)));
                }
                self.local_id(nb.gid, nb.rank)?;
                if (nb.level - self.levels[m]).abs() > 1 {
                    return Err(MeshError::InvariantViolation(format!(
                        "block {m} slot {n}: level jump {} -> {} exceeds 2:1 balance",
                        self.levels[m], nb.level
                    )));
                }
                if nb.level != self.levels[m] && !self.multilevel {
                    return Err(MeshError::InvariantViolation(format!(
                        "block {m} slot {n}: level difference on a single-level mesh"
                    )));
                }
            }
        }
        Ok(())
    }
}
