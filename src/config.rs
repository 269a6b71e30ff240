use std::path::PathBuf;

use serde::{
    Deserialize,
    Serialize,
};
use topo_solver::{
    AnnealSchedule,
    OptimizerBackend,
    mapping::{
        Boundary,
        MirrorAxis,
    },
    material::MaterialPair,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_region")]
    pub region: RegionConfig,

    #[serde(default)]
    pub schedule: AnnealSchedule,

    #[serde(default)]
    pub optimizer: OptimizerBackend,

    #[serde(default)]
    pub lens: LensConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Raw density every cell starts with.
    #[serde(default = "default_initial_density")]
    pub initial_density: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            schedule: Default::default(),
            optimizer: Default::default(),
            lens: Default::default(),
            output: Default::default(),
            initial_density: default_initial_density(),
        }
    }
}

fn default_initial_density() -> f64 {
    0.5
}

fn default_region() -> RegionConfig {
    RegionConfig {
        name: "lens".to_owned(),
        size: [40, 8],
        resolution: 20.0,
        filter: Some(FilterConfig::MinimumLength {
            length: 0.1,
            eta_e: 0.55,
            boundary: Default::default(),
        }),
        symmetry: Some(MirrorAxis::X),
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegionConfig {
    pub name: String,

    /// Number of cells along x and y
    pub size: [usize; 2],

    /// Cells per unit length
    pub resolution: f64,

    #[serde(default)]
    pub filter: Option<FilterConfig>,

    #[serde(default)]
    pub symmetry: Option<MirrorAxis>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterConfig {
    /// Filter radius given directly, in units of length.
    Radius {
        radius: f64,
        #[serde(default)]
        boundary: [Boundary; 2],
    },
    /// Filter radius derived from a minimum feature size and the erosion
    /// threshold `eta_e`.
    MinimumLength {
        length: f64,
        eta_e: f64,
        #[serde(default)]
        boundary: [Boundary; 2],
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LensConfig {
    /// Wavelengths to focus, one objective each.
    #[serde(default = "default_wavelengths")]
    pub wavelengths: Vec<f64>,

    #[serde(default = "default_focal_length")]
    pub focal_length: f64,

    #[serde(default)]
    pub materials: MaterialPair,
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            wavelengths: default_wavelengths(),
            focal_length: default_focal_length(),
            materials: Default::default(),
        }
    }
}

fn default_wavelengths() -> Vec<f64> {
    vec![0.55, 0.5, 0.45]
}

fn default_focal_length() -> f64 {
    5.0
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Every run creates a timestamped directory in here.
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,

    /// Snapshot every n-th evaluation of a stage. `None` disables snapshots.
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every: Option<usize>,

    /// Pixels per design cell in written images.
    #[serde(default = "default_scale")]
    pub scale: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            snapshot_every: default_snapshot_every(),
            scale: default_scale(),
        }
    }
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("runs")
}

fn default_snapshot_every() -> Option<usize> {
    Some(5)
}

fn default_scale() -> u32 {
    8
}
