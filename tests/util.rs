#![allow(dead_code)]
use std::sync::Arc;

use amr_halo::data::index_range::init_recv_indices;
use amr_halo::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Unique, exactly representable value of interior cell `(v, k, j, i)` of block `gid`.
pub fn tagged(gid: usize, v: usize, k: usize, j: usize, i: usize) -> f64 {
    (gid * 1_000_000 + v * 100_000 + k * 10_000 + j * 100 + i) as f64
}

/// Ghost cells start out with this value.
pub const UNSET: f64 = -1.0;

pub fn is_interior(indcs: &RegionIndices, k: usize, j: usize, i: usize) -> bool {
    (indcs.is()..=indcs.ie()).contains(&i)
        && (indcs.js()..=indcs.je()).contains(&j)
        && (indcs.ks()..=indcs.ke()).contains(&k)
}

/// Cell-centered array with tagged interiors and `UNSET` ghosts.
pub fn tagged_field(pack: &MeshBlockPack, nvar: usize) -> Array5 {
    let indcs = *pack.indcs();
    let first = pack.first_gid();
    let mut u = Array5::for_pack(pack, nvar);
    u.fill_with(|[m, v, k, j, i]| {
        if is_interior(&indcs, k, j, i) {
            tagged(first + m, v, k, j, i)
        } else {
            UNSET
        }
    });
    u
}

/// Check that every ghost cell filled by a same-level neighbor holds the
/// neighbor's interior value, and that ghosts without a neighbor are untouched.
pub fn assert_same_level_ghosts(pack: &MeshBlockPack, u: &Array5) {
    let indcs = *pack.indcs();
    let ix = pack.indexer();
    let nvar = u.shape()[1];
    let mut filled = vec![false; u.len()];
    for m in 0..pack.nmb() {
        for &n in ix.active_slots() {
            let Some(nb) = pack.neighbor(m, n) else { continue };
            let key = ix.key(n).unwrap();
            let range = init_recv_indices(&indcs, pack.dims(), key).same;
            for (k, j, i) in range.cells() {
                let src = [i, j, k]
                    .iter()
                    .enumerate()
                    .map(|(a, &x)| match key.offset.axis(a) {
                        o if o > 0 => x - indcs.nx[a],
                        o if o < 0 => x + indcs.nx[a],
                        _ => x,
                    })
                    .collect::<Vec<_>>();
                for v in 0..nvar {
                    let got = u[[m, v, k, j, i]];
                    let want = tagged(nb.gid, v, src[2], src[1], src[0]);
                    assert_eq!(got, want, "block {m} slot {n} var {v} cell ({k},{j},{i})");
                    filled[u.offset([m, v, k, j, i])] = true;
                }
            }
        }
    }
    for m in 0..pack.nmb() {
        for v in 0..nvar {
            for k in 0..indcs.ncells[2] {
                for j in 0..indcs.ncells[1] {
                    for i in 0..indcs.ncells[0] {
                        if !is_interior(&indcs, k, j, i) && !filled[u.offset([m, v, k, j, i])] {
                            assert_eq!(u[[m, v, k, j, i]], UNSET, "unfilled ghost ({m},{v},{k},{j},{i})");
                        }
                    }
                }
            }
        }
    }
}

/// Run `f` once per rank of an in-process world, each on its own thread.
pub fn on_ranks<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(RayonComm) -> T + Sync,
{
    let world = RayonComm::world(n);
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = world.into_iter().map(|c| s.spawn(move || f(c))).collect();
        handles.into_iter().map(|h| h.join().expect("rank panicked")).collect()
    })
}

pub fn pack_of(cfg: UniformMeshConfig, rank: usize) -> Arc<MeshBlockPack> {
    Arc::new(UniformMesh::new(cfg).unwrap().pack(rank).unwrap())
}

/// Uniformly random interior, zero ghosts.
pub fn random_field(pack: &MeshBlockPack, nvar: usize, seed: u64) -> Array5 {
    let indcs = *pack.indcs();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut u = Array5::for_pack(pack, nvar);
    u.fill_with(|[_, _, k, j, i]| {
        if is_interior(&indcs, k, j, i) {
            rng.gen_range(0.5..1.5)
        } else {
            0.0
        }
    });
    u
}

/// Sum of interior cells of variable `v` in block `m`.
pub fn interior_sum(pack: &MeshBlockPack, u: &Array5, m: usize, v: usize) -> f64 {
    let indcs = pack.indcs();
    let mut s = 0.0;
    for k in indcs.ks()..=indcs.ke() {
        for j in indcs.js()..=indcs.je() {
            for i in indcs.is()..=indcs.ie() {
                s += u[[m, v, k, j, i]];
            }
        }
    }
    s
}
