//! Configuration structs (serde-deserialisable, validated at setup).

use serde::{Deserialize, Serialize};

use crate::algs::shearing_box::ReconstructionMethod;
use crate::mesh_error::MeshError;

/// Uniform single-level decomposition of a rectangular domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniformMeshConfig {
    /// Number of active dimensions (1, 2 or 3).
    pub dims: usize,
    /// Interior cells per block along each axis.
    pub nx: [usize; 3],
    /// Blocks along each axis.
    pub nblocks: [usize; 3],
    /// Ghost width.
    pub ng: usize,
    pub periodic: [bool; 3],
    pub xmin: [f64; 3],
    pub xmax: [f64; 3],
    /// Ranks the blocks are distributed over.
    pub nranks: usize,
    /// Lay out sub-face slots so the packs can take part in refinement.
    pub multilevel: bool,
}

impl Default for UniformMeshConfig {
    fn default() -> Self {
        Self {
            dims: 1,
            nx: [8, 1, 1],
            nblocks: [1, 1, 1],
            ng: 2,
            periodic: [true; 3],
            xmin: [-0.5; 3],
            xmax: [0.5; 3],
            nranks: 1,
            multilevel: false,
        }
    }
}

impl UniformMeshConfig {
    pub fn total_blocks(&self) -> usize {
        self.nblocks.iter().product()
    }

    pub fn validate(&self) -> Result<(), MeshError> {
        let bad = |msg: String| Err(MeshError::InvalidConfig(msg));
        if !(1..=3).contains(&self.dims) {
            return bad(format!("dims must be 1, 2 or 3, got {}", self.dims));
        }
        if self.ng == 0 {
            return bad("ng must be positive".into());
        }
        for a in 0..3 {
            if a < self.dims {
                if self.nx[a] == 0 || self.nblocks[a] == 0 {
                    return bad(format!("axis {a}: nx and nblocks must be positive"));
                }
                if !(self.xmax[a] > self.xmin[a]) {
                    return bad(format!("axis {a}: xmax must exceed xmin"));
                }
            } else if self.nblocks[a] != 1 {
                return bad(format!("inactive axis {a} must hold exactly one block"));
            }
        }
        if self.nranks == 0 || self.nranks > self.total_blocks() {
            return bad(format!(
                "cannot spread {} blocks over {} ranks",
                self.total_blocks(),
                self.nranks
            ));
        }
        Ok(())
    }
}

/// Shearing-box orbital advection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShearingBoxConfig {
    /// Shear parameter `q` (1.5 for a Keplerian disk).
    pub qshear: f64,
    /// Angular frequency of the rotating frame.
    pub omega0: f64,
    /// Largest time step the remap will be asked to take; sizes the buffers.
    pub dt_max: f64,
    pub reconstruction: ReconstructionMethod,
}

impl Default for ShearingBoxConfig {
    fn default() -> Self {
        Self {
            qshear: 1.5,
            omega0: 1.0,
            dt_max: 0.1,
            reconstruction: ReconstructionMethod::PiecewiseLinear,
        }
    }
}

impl ShearingBoxConfig {
    /// `q * Omega`, the shear rate.
    pub fn qomega(&self) -> f64 {
        self.qshear * self.omega0
    }

    pub fn validate(&self) -> Result<(), MeshError> {
        if !self.qshear.is_finite() || !self.omega0.is_finite() {
            return Err(MeshError::InvalidConfig("shear parameters must be finite".into()));
        }
        if !(self.dt_max > 0.0) || !self.dt_max.is_finite() {
            return Err(MeshError::InvalidConfig(format!(
                "dt_max must be positive, got {}",
                self.dt_max
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_config_from_json_fills_defaults() {
        let cfg: UniformMeshConfig =
            serde_json::from_str(r#"{ "dims": 2, "nx": [8, 8, 1], "nblocks": [2, 2, 1], "nranks": 4 }"#)
                .unwrap();
        assert_eq!(cfg.ng, 2);
        assert!(cfg.periodic[0]);
        cfg.validate().unwrap();
    }

    #[test]
    fn uniform_config_rejects_bad_layouts() {
        let mut cfg = UniformMeshConfig::default();
        cfg.nranks = 2;
        assert!(matches!(cfg.validate(), Err(MeshError::InvalidConfig(_))));
        let mut cfg = UniformMeshConfig::default();
        cfg.nblocks = [1, 2, 1];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn shearing_config_round_trips_reconstruction() {
        let cfg: ShearingBoxConfig =
            serde_json::from_str(r#"{ "qshear": 1.5, "dt_max": 0.05, "reconstruction": "DonorCell" }"#)
                .unwrap();
        assert_eq!(cfg.reconstruction, ReconstructionMethod::DonorCell);
        assert_eq!(cfg.omega0, 1.0);
        cfg.validate().unwrap();
        let bad = ShearingBoxConfig {
            dt_max: 0.0,
            ..cfg
        };
        assert!(bad.validate().is_err());
    }
}
