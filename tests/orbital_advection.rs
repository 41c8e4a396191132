mod util;

use std::sync::Arc;

use amr_halo::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use util::{interior_sum, on_ranks, random_field};

fn shear(qshear: f64, dt_max: f64, reconstruction: ReconstructionMethod) -> ShearingBoxConfig {
    ShearingBoxConfig {
        qshear,
        omega0: 1.0,
        dt_max,
        reconstruction,
    }
}

fn remap_cc<C: Communicator>(oa: &mut OrbitalAdvection<C>, u: &mut Array5, dt: f64) {
    assert_eq!(oa.init_recv_cc().unwrap(), TaskStatus::Complete);
    oa.pack_and_send_cc(u).unwrap();
    assert_eq!(oa.wait_and_unpack_cc(u, dt).unwrap(), TaskStatus::Complete);
    oa.clear_send().unwrap();
    oa.clear_recv().unwrap();
}

fn remap_fc<C: Communicator>(oa: &mut OrbitalAdvection<C>, b: &mut FaceField, dt: f64) {
    assert_eq!(oa.init_recv_fc().unwrap(), TaskStatus::Complete);
    oa.pack_and_send_fc(b).unwrap();
    assert_eq!(oa.wait_and_unpack_fc(b, dt).unwrap(), TaskStatus::Complete);
    oa.clear_send().unwrap();
    oa.clear_recv().unwrap();
}

/// Two columns at x1 = -1.5 and -0.5 over 8 periodic x2 cells of width 1/8.
fn two_columns() -> Arc<MeshBlockPack> {
    util::pack_of(
        UniformMeshConfig {
            dims: 2,
            nx: [2, 8, 1],
            ng: 2,
            xmin: [-2.0, -0.5, -0.5],
            xmax: [0.0, 0.5, 0.5],
            ..UniformMeshConfig::default()
        },
        0,
    )
}

fn column(u: &Array5, i: usize) -> Vec<f64> {
    (2..10).map(|j| u[[0, 0, 0, j, i]]).collect()
}

#[test]
fn whole_cell_shift_moves_columns_by_their_offset() {
    let pack = two_columns();
    let cfg = shear(1.0, 0.25, ReconstructionMethod::DonorCell);
    let mut oa = OrbitalAdvection::new(Arc::clone(&pack), RuntimeContext::new(&NoComm).unwrap(), 1, cfg).unwrap();
    assert_eq!(oa.maxjshift(), 5);
    let mut u = Array5::for_pack(&pack, 1);
    u.fill_with(|[_, _, _, j, _]| if (2..10).contains(&j) { (j - 1) as f64 } else { 0.0 });

    remap_cc(&mut oa, &mut u, 0.25);
    // x1 = -0.5 moves one cell, x1 = -1.5 three cells
    assert_eq!(column(&u, 3), vec![8.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    assert_eq!(column(&u, 2), vec![6.0, 7.0, 8.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    // ghosts are not touched by the remap
    assert_eq!(u[[0, 0, 0, 0, 2]], 0.0);
}

#[test]
fn zero_shear_is_the_identity() {
    for method in [ReconstructionMethod::DonorCell, ReconstructionMethod::PiecewiseLinear] {
        let pack = two_columns();
        let mut oa =
            OrbitalAdvection::new(Arc::clone(&pack), RuntimeContext::new(&NoComm).unwrap(), 2, shear(0.0, 0.1, method))
                .unwrap();
        let u0 = random_field(&pack, 2, 7);
        let mut u = u0.clone();
        remap_cc(&mut oa, &mut u, 0.1);
        assert_eq!(u, u0, "{method:?}");
    }
}

#[test]
fn fractional_shift_is_monotone_and_conservative() {
    let pack = two_columns();
    let cfg = shear(1.0, 0.25, ReconstructionMethod::PiecewiseLinear);
    let mut oa = OrbitalAdvection::new(Arc::clone(&pack), RuntimeContext::new(&NoComm).unwrap(), 1, cfg).unwrap();
    // a step: ones in the lower half, zeros in the upper half
    let mut u = Array5::for_pack(&pack, 1);
    u.fill_with(|[_, _, _, j, _]| if (2..6).contains(&j) { 1.0 } else { 0.0 });
    let before = interior_sum(&pack, &u, 0, 0);
    remap_cc(&mut oa, &mut u, 0.1);
    for i in 2..4 {
        for v in column(&u, i) {
            assert!((-1e-14..=1.0 + 1e-14).contains(&v), "overshoot {v} in column {i}");
        }
    }
    assert!((interior_sum(&pack, &u, 0, 0) - before).abs() < 1e-12);
}

#[test]
fn integral_is_conserved_across_ranks_over_a_shear_cycle() {
    let cfg = UniformMeshConfig {
        dims: 2,
        nx: [4, 8, 1],
        nblocks: [1, 2, 1],
        ng: 2,
        nranks: 2,
        ..UniformMeshConfig::default()
    };
    // with q Omega = 1 and a unit box, t = 1 slides the x1 boundaries one full
    // x2 length past each other
    let (dt, nsteps) = (0.05, 20);
    let results = on_ranks(2, |comm| {
        let pack = util::pack_of(cfg.clone(), comm.rank());
        let sb = shear(1.0, dt, ReconstructionMethod::PiecewiseLinear);
        let mut oa = OrbitalAdvection::new(Arc::clone(&pack), RuntimeContext::new(&comm).unwrap(), 1, sb).unwrap();
        let mut u = random_field(&pack, 1, 11 + comm.rank() as u64);
        let before = interior_sum(&pack, &u, 0, 0);
        for _ in 0..nsteps {
            remap_cc(&mut oa, &mut u, dt);
        }
        (before, interior_sum(&pack, &u, 0, 0))
    });
    let before: f64 = results.iter().map(|r| r.0).sum();
    let after: f64 = results.iter().map(|r| r.1).sum();
    assert!((after - before).abs() < 1e-10 * before.abs(), "{before} -> {after}");
}

#[test]
fn cross_rank_shift_matches_single_rank() {
    let base = UniformMeshConfig {
        dims: 2,
        nx: [4, 4, 1],
        nblocks: [1, 2, 1],
        ng: 2,
        ..UniformMeshConfig::default()
    };
    let sb = shear(1.5, 0.2, ReconstructionMethod::PiecewiseLinear);
    let init = |pack: &MeshBlockPack| {
        let mut u = Array5::for_pack(pack, 1);
        let first = pack.first_gid();
        u.fill_with(|[m, _, _, j, i]| ((first + m) * 100 + j * 10 + i) as f64);
        u
    };

    let single = util::pack_of(base.clone(), 0);
    let mut oa = OrbitalAdvection::new(Arc::clone(&single), RuntimeContext::new(&NoComm).unwrap(), 1, sb.clone()).unwrap();
    let mut want = init(&single);
    remap_cc(&mut oa, &mut want, 0.15);

    let split = UniformMeshConfig { nranks: 2, ..base };
    let got = on_ranks(2, |comm| {
        let pack = util::pack_of(split.clone(), comm.rank());
        let mut oa = OrbitalAdvection::new(Arc::clone(&pack), RuntimeContext::new(&comm).unwrap(), 1, sb.clone()).unwrap();
        let mut u = init(&pack);
        remap_cc(&mut oa, &mut u, 0.15);
        u
    });
    for (rank, u) in got.iter().enumerate() {
        assert_eq!(u.block(0), want.block(rank), "rank {rank}");
    }
}

#[test]
fn receives_stay_incomplete_until_the_strip_arrives() {
    let cfg = UniformMeshConfig {
        dims: 2,
        nx: [4, 4, 1],
        nblocks: [1, 2, 1],
        ng: 2,
        nranks: 2,
        ..UniformMeshConfig::default()
    };
    let world = RayonComm::world(2);
    let packs: Vec<_> = (0..2).map(|r| util::pack_of(cfg.clone(), r)).collect();
    let sb = shear(1.5, 0.1, ReconstructionMethod::DonorCell);
    let mut oa: Vec<_> = (0..2)
        .map(|r| {
            OrbitalAdvection::new(Arc::clone(&packs[r]), RuntimeContext::new(&world[r]).unwrap(), 1, sb.clone()).unwrap()
        })
        .collect();
    let mut u: Vec<_> = packs.iter().map(|p| Array5::for_pack(p, 1)).collect();

    for o in &mut oa {
        o.init_recv_cc().unwrap();
    }
    oa[0].pack_and_send_cc(&u[0]).unwrap();
    assert_eq!(oa[0].recv_and_unpack_cc(&mut u[0], 0.1).unwrap(), TaskStatus::Incomplete);
    assert_eq!(oa[0].recv_status_cc(0, 0), CommStatus::Waiting);
    oa[1].pack_and_send_cc(&u[1]).unwrap();
    assert_eq!(oa[0].recv_and_unpack_cc(&mut u[0], 0.1).unwrap(), TaskStatus::Complete);
    assert_eq!(oa[0].recv_status_cc(0, 0), CommStatus::Completed);
    assert_eq!(oa[1].recv_and_unpack_cc(&mut u[1], 0.1).unwrap(), TaskStatus::Complete);
    for o in &mut oa {
        o.clear_send().unwrap();
        o.clear_recv().unwrap();
    }
    assert_eq!(oa[0].recv_status_cc(0, 0), CommStatus::Undef);
}

#[test]
fn step_beyond_dt_max_is_rejected() {
    let pack = two_columns();
    let cfg = shear(1.0, 0.1, ReconstructionMethod::PiecewiseLinear);
    let mut oa = OrbitalAdvection::new(Arc::clone(&pack), RuntimeContext::new(&NoComm).unwrap(), 1, cfg).unwrap();
    let mut u = Array5::for_pack(&pack, 1);
    oa.init_recv_cc().unwrap();
    oa.pack_and_send_cc(&u).unwrap();
    let err = oa.recv_and_unpack_cc(&mut u, 0.5).unwrap_err();
    assert!(matches!(err, MeshError::ShiftExceedsBuffer { max: 2, .. }), "{err}");
    // still usable within the limit
    assert_eq!(oa.recv_and_unpack_cc(&mut u, 0.1).unwrap(), TaskStatus::Complete);
    oa.clear_send().unwrap();
    oa.clear_recv().unwrap();
}

#[test]
fn setup_rejects_unusable_configurations() {
    let ctx = || RuntimeContext::new(&NoComm).unwrap();
    // shift does not fit the 8-cell blocks
    let pack = two_columns();
    let err = OrbitalAdvection::new(Arc::clone(&pack), ctx(), 1, shear(1.0, 1.0, ReconstructionMethod::DonorCell));
    assert!(matches!(err, Err(MeshError::InvalidConfig(_))));
    // 1-D meshes have no x2 direction
    let line = util::pack_of(UniformMeshConfig::default(), 0);
    let err = OrbitalAdvection::new(line, ctx(), 1, ShearingBoxConfig::default());
    assert!(matches!(err, Err(MeshError::InvalidConfig(_))));
    // piecewise-linear needs two ghost rows
    let thin = util::pack_of(
        UniformMeshConfig {
            dims: 2,
            nx: [4, 8, 1],
            ng: 1,
            ..UniformMeshConfig::default()
        },
        0,
    );
    let err = OrbitalAdvection::new(thin, ctx(), 1, shear(1.0, 0.05, ReconstructionMethod::PiecewiseLinear));
    assert!(matches!(err, Err(MeshError::InvalidConfig(_))));
    // open x2 boundaries leave nothing to shift in from
    let open = util::pack_of(
        UniformMeshConfig {
            dims: 2,
            nx: [4, 8, 1],
            periodic: [true, false, true],
            ..UniformMeshConfig::default()
        },
        0,
    );
    let err = OrbitalAdvection::new(open, ctx(), 1, ShearingBoxConfig::default());
    assert!(matches!(err, Err(MeshError::InvalidConfig(_))));
}

/// Discrete divergence of interior cell `(k, j, i)` of block 0.
fn divergence(b: &FaceField, size: &RegionSize, k: usize, j: usize, i: usize, three_d: bool) -> f64 {
    let mut d = (b.x1f[[0, k, j, i + 1]] - b.x1f[[0, k, j, i]]) / size.dx1
        + (b.x2f[[0, k, j + 1, i]] - b.x2f[[0, k, j, i]]) / size.dx2;
    if three_d {
        d += (b.x3f[[0, k + 1, j, i]] - b.x3f[[0, k, j, i]]) / size.dx3;
    }
    d
}

fn max_divergence_change(pack: &MeshBlockPack, before: &FaceField, after: &FaceField) -> f64 {
    let indcs = pack.indcs();
    let three_d = pack.dims() == Dimensionality::Three;
    let size = pack.size(0);
    let mut worst: f64 = 0.0;
    for k in indcs.ks()..=indcs.ke() {
        for j in indcs.js()..=indcs.je() {
            for i in indcs.is()..=indcs.ie() {
                let d0 = divergence(before, size, k, j, i, three_d);
                let d1 = divergence(after, size, k, j, i, three_d);
                worst = worst.max((d1 - d0).abs());
            }
        }
    }
    worst
}

#[test]
fn ct_update_keeps_a_potential_field_divergence_free() {
    let pack = util::pack_of(
        UniformMeshConfig {
            dims: 2,
            nx: [8, 8, 1],
            ng: 2,
            ..UniformMeshConfig::default()
        },
        0,
    );
    let size = *pack.size(0);
    let [n1, n2, _] = pack.indcs().ncells;
    // corner vector potential, periodic in x2 over the interior
    let mut rng = StdRng::seed_from_u64(3);
    let az: Vec<f64> = (0..(n1 + 1) * 8).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let a = |j: usize, i: usize| az[((j + 6) % 8) * (n1 + 1) + i];
    let mut b = FaceField::for_pack(&pack);
    b.x1f.fill_with(|[_, _, j, i]| if j < n2 { (a(j + 1, i) - a(j, i)) / size.dx2 } else { 0.0 });
    b.x2f.fill_with(|[_, _, j, i]| if i < n1 { -(a(j, i + 1) - a(j, i)) / size.dx1 } else { 0.0 });
    let b0 = b.clone();

    let sb = shear(1.5, 0.2, ReconstructionMethod::PiecewiseLinear);
    let mut oa = OrbitalAdvection::new(Arc::clone(&pack), RuntimeContext::new(&NoComm).unwrap(), 1, sb).unwrap();
    remap_fc(&mut oa, &mut b, 0.17);
    assert_ne!(b, b0);
    let indcs = pack.indcs();
    for j in indcs.js()..=indcs.je() {
        for i in indcs.is()..=indcs.ie() {
            assert!(divergence(&b, &size, 0, j, i, false).abs() < 1e-11, "cell ({j},{i})");
        }
    }
}

#[test]
fn ct_update_preserves_divergence_in_3d() {
    let pack = util::pack_of(
        UniformMeshConfig {
            dims: 3,
            nx: [4, 8, 4],
            ng: 2,
            xmax: [0.5, 0.5, 1.5],
            ..UniformMeshConfig::default()
        },
        0,
    );
    let mut rng = StdRng::seed_from_u64(5);
    let mut b = FaceField::for_pack(&pack);
    b.x1f.fill_with(|_| rng.gen_range(-1.0..1.0));
    b.x2f.fill_with(|_| rng.gen_range(-1.0..1.0));
    b.x3f.fill_with(|_| rng.gen_range(-1.0..1.0));
    let b0 = b.clone();

    let sb = shear(1.5, 0.1, ReconstructionMethod::PiecewiseLinear);
    let mut oa = OrbitalAdvection::new(Arc::clone(&pack), RuntimeContext::new(&NoComm).unwrap(), 1, sb).unwrap();
    remap_fc(&mut oa, &mut b, -0.07);
    assert_ne!(b, b0);
    assert!(max_divergence_change(&pack, &b0, &b) < 1e-10);
}

#[test]
fn face_remap_of_b3_matches_cell_remap_in_2d() {
    let pack = two_columns();
    let sb = shear(1.0, 0.25, ReconstructionMethod::PiecewiseLinear);
    let mut oa = OrbitalAdvection::new(Arc::clone(&pack), RuntimeContext::new(&NoComm).unwrap(), 1, sb).unwrap();
    let mut u = random_field(&pack, 1, 9);
    let mut b = FaceField::for_pack(&pack);
    b.x3f.fill_with(|[m, _, j, i]| u[[m, 0, 0, j, i]]);

    remap_cc(&mut oa, &mut u, 0.21);
    remap_fc(&mut oa, &mut b, 0.21);
    let indcs = pack.indcs();
    for j in indcs.js()..=indcs.je() {
        for i in indcs.is()..=indcs.ie() {
            assert!((b.x3f[[0, 0, j, i]] - u[[0, 0, 0, j, i]]).abs() < 1e-12, "cell ({j},{i})");
        }
    }
}

#[test]
fn shearing_config_from_json() {
    let cfg: ShearingBoxConfig =
        serde_json::from_str(r#"{ "qshear": 1.5, "dt_max": 0.02, "reconstruction": "DonorCell" }"#).unwrap();
    assert_eq!(cfg.omega0, 1.0);
    assert_eq!(cfg.reconstruction, ReconstructionMethod::DonorCell);
    cfg.validate().unwrap();
    let bad: ShearingBoxConfig = serde_json::from_str(r#"{ "dt_max": -1.0 }"#).unwrap();
    assert!(matches!(bad.validate(), Err(MeshError::InvalidConfig(_))));
}
