use std::f64::consts::TAU;

use nalgebra::{
    DMatrix,
    DVector,
};
use num::Complex;

use crate::{
    design::{
        DesignFields,
        DesignRegion,
    },
    grid::Grid,
    material::{
        MaterialPair,
        PhysicalConstants,
    },
    simulation::{
        AdjointEvaluation,
        AdjointSimulation,
    },
};

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhaseScreenLensConfig {
    /// Frequencies to focus, one objective each.
    pub frequencies: Vec<f64>,

    /// Distance from the exit face of the design region to the focal spot.
    pub focal_length: f64,

    pub materials: MaterialPair,

    pub physical_constants: PhysicalConstants,
}

impl Default for PhaseScreenLensConfig {
    fn default() -> Self {
        Self {
            frequencies: vec![1.0 / 0.55, 1.0 / 0.5, 1.0 / 0.45],
            focal_length: 5.0,
            materials: MaterialPair::default(),
            physical_constants: PhysicalConstants::REDUCED,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LensError {
    #[error("Design region {name:?} is missing")]
    MissingRegion { name: String },
    #[error("Design field has {actual} cells, expected {expected}")]
    FieldSize { expected: usize, actual: usize },
    #[error("Invalid lens configuration: {reason}")]
    InvalidConfig { reason: String },
}

/// Thin-element model of a multi-wavelength metalens.
///
/// Every column of the design region is a phase shifter: light crossing it
/// picks up `k * dy * sum(n(rho) - 1)` over the column's cells. The field at
/// the focal spot is the average of the column contributions
/// `exp(i * (k * path + phase))`, so the focal intensity `|E|^2` lies in
/// `[0, 1]` and equals `1` only if all columns arrive in phase.
///
/// The objective per frequency is `-|E|^2`, which turns focusing into a
/// minimization. Sensitivities are exact.
#[derive(Clone, Debug)]
pub struct PhaseScreenLens {
    region: String,
    grid: Grid,
    cell_height: f64,
    wavenumbers: Vec<f64>,
    path_lengths: Vec<f64>,
    materials: MaterialPair,
}

impl PhaseScreenLens {
    pub fn new(region: &DesignRegion, config: &PhaseScreenLensConfig) -> Result<Self, LensError> {
        if config.frequencies.is_empty() {
            return Err(LensError::InvalidConfig {
                reason: "no frequencies".to_owned(),
            });
        }
        if let Some(frequency) = config
            .frequencies
            .iter()
            .find(|frequency| !frequency.is_finite() || **frequency <= 0.0)
        {
            return Err(LensError::InvalidConfig {
                reason: format!("invalid frequency {frequency}"),
            });
        }
        if !config.focal_length.is_finite() || config.focal_length <= 0.0 {
            return Err(LensError::InvalidConfig {
                reason: format!("invalid focal length {}", config.focal_length),
            });
        }

        let speed_of_light = config.physical_constants.speed_of_light();
        if !speed_of_light.is_finite() || speed_of_light <= 0.0 {
            return Err(LensError::InvalidConfig {
                reason: format!("physical constants give a speed of light of {speed_of_light}"),
            });
        }
        for (name, material) in [
            ("void", config.materials.void),
            ("solid", config.materials.solid),
        ] {
            let permittivity = material.relative_permittivity;
            if !permittivity.is_finite() || permittivity <= 0.0 {
                return Err(LensError::InvalidConfig {
                    reason: format!("{name} material has relative permittivity {permittivity}"),
                });
            }
        }

        let wavenumbers = config
            .frequencies
            .iter()
            .map(|frequency| {
                TAU / config
                    .physical_constants
                    .frequency_to_wavelength(*frequency)
            })
            .collect();

        let width = region.extent().x;
        let path_lengths = (0..region.grid.nx())
            .map(|x| {
                let offset = (x as f64 + 0.5) / region.resolution - 0.5 * width;
                offset.hypot(config.focal_length)
            })
            .collect();

        Ok(Self {
            region: region.name.clone(),
            grid: region.grid,
            cell_height: 1.0 / region.resolution,
            wavenumbers,
            path_lengths,
            materials: config.materials,
        })
    }

    fn column_phase(&self, field: &DVector<f64>, x: usize, wavenumber: f64) -> f64 {
        let optical_path: f64 = (0..self.grid.ny())
            .map(|y| self.materials.refractive_index(field[x + self.grid.nx() * y]) - 1.0)
            .sum();
        wavenumber * self.cell_height * optical_path
    }

    /// Complex focal field for every frequency.
    pub fn focal_fields(&self, field: &DVector<f64>) -> Vec<Complex<f64>> {
        let norm = 1.0 / self.grid.nx() as f64;
        self.wavenumbers
            .iter()
            .map(|&wavenumber| {
                (0..self.grid.nx())
                    .map(|x| {
                        let phase =
                            wavenumber * self.path_lengths[x] + self.column_phase(field, x, wavenumber);
                        Complex::from_polar(norm, phase)
                    })
                    .sum()
            })
            .collect()
    }
}

impl AdjointSimulation for PhaseScreenLens {
    type Error = LensError;

    fn num_objectives(&self) -> usize {
        self.wavenumbers.len()
    }

    fn evaluate(&mut self, fields: &DesignFields) -> Result<AdjointEvaluation, LensError> {
        let field = fields
            .get(&self.region)
            .ok_or_else(|| {
                LensError::MissingRegion {
                    name: self.region.clone(),
                }
            })?;
        if field.len() != self.grid.len() {
            return Err(LensError::FieldSize {
                expected: self.grid.len(),
                actual: field.len(),
            });
        }

        let focal_fields = self.focal_fields(field);
        let objective_values =
            DVector::from_iterator(focal_fields.len(), focal_fields.iter().map(|e| -e.norm_sqr()));

        // cells of other regions don't influence this lens and keep a zero
        // sensitivity
        let mut sensitivity = DMatrix::zeros(fields.num_cells(), self.wavenumbers.len());
        let offset = fields
            .iter()
            .take_while(|(name, _)| *name != self.region)
            .map(|(_, field)| field.len())
            .sum::<usize>();

        let norm = 1.0 / self.grid.nx() as f64;
        for (column, (&wavenumber, focal_field)) in
            self.wavenumbers.iter().zip(&focal_fields).enumerate()
        {
            for x in 0..self.grid.nx() {
                let phase =
                    wavenumber * self.path_lengths[x] + self.column_phase(field, x, wavenumber);
                // d E / d phase_x
                let contribution = Complex::<f64>::i() * Complex::from_polar(norm, phase);
                // d (-|E|^2) / d phase_x
                let d_phase = -2.0 * (focal_field.conj() * contribution).re;

                for y in 0..self.grid.ny() {
                    let index = x + self.grid.nx() * y;
                    let d_index = wavenumber
                        * self.cell_height
                        * self.materials.refractive_index_derivative(field[index]);
                    sensitivity[(offset + index, column)] = d_phase * d_index;
                }
            }
        }

        Ok(AdjointEvaluation {
            objective_values,
            sensitivity,
        })
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use crate::{
        design::{
            DesignRegion,
            DesignSpace,
        },
        grid::Grid,
        mapping::DesignMapping,
        material::{
            Material,
            MaterialPair,
            PhysicalConstants,
        },
        simulation::{
            AdjointSimulation,
            lens::{
                LensError,
                PhaseScreenLens,
                PhaseScreenLensConfig,
            },
        },
    };

    fn lens() -> (DesignSpace, PhaseScreenLens) {
        let grid = Grid::new(12, 3);
        let region = DesignRegion::new("lens", grid, 4.0);
        let lens = PhaseScreenLens::new(&region, &PhaseScreenLensConfig::default()).unwrap();
        let space = DesignSpace::single(region, DesignMapping::new(grid)).unwrap();
        (space, lens)
    }

    #[test]
    fn it_bounds_intensity() {
        let (space, mut lens) = lens();
        let raw = DVector::from_fn(space.num_cells(), |i, _| ((i * 17) % 10) as f64 / 9.0);
        let evaluation = lens.evaluate(&space.split(&raw).unwrap()).unwrap();
        evaluation
            .check_shape(space.num_cells(), lens.num_objectives())
            .unwrap();
        assert!(
            evaluation
                .objective_values
                .iter()
                .all(|value| (-1.0 - 1e-12..=0.0).contains(value))
        );
    }

    #[test]
    fn it_matches_finite_differences() {
        let (space, mut lens) = lens();
        let raw = DVector::from_fn(space.num_cells(), |i, _| ((i * 7) % 11) as f64 / 10.0);
        let evaluation = lens.evaluate(&space.split(&raw).unwrap()).unwrap();

        let h = 1e-6;
        for index in [0, 5, 13, 30, 35] {
            let mut plus = raw.clone();
            plus[index] += h;
            let mut minus = raw.clone();
            minus[index] -= h;
            let plus = lens.evaluate(&space.split(&plus).unwrap()).unwrap();
            let minus = lens.evaluate(&space.split(&minus).unwrap()).unwrap();
            for objective in 0..lens.num_objectives() {
                let numeric = (plus.objective_values[objective]
                    - minus.objective_values[objective])
                    / (2.0 * h);
                let analytic = evaluation.sensitivity[(index, objective)];
                assert!(
                    (numeric - analytic).abs() < 1e-6,
                    "cell {index}, objective {objective}: {numeric} != {analytic}"
                );
            }
        }
    }

    #[test]
    fn it_rejects_missing_region() {
        let (_, mut lens) = lens();
        let other = Grid::new(12, 3);
        let space = DesignSpace::single(
            DesignRegion::new("other", other, 4.0),
            DesignMapping::new(other),
        )
        .unwrap();
        let fields = space.split(&DVector::zeros(other.len())).unwrap();
        assert!(lens.evaluate(&fields).is_err());
    }

    #[test]
    fn it_rejects_invalid_config() {
        let region = DesignRegion::new("lens", Grid::new(4, 1), 4.0);
        let config = PhaseScreenLensConfig {
            frequencies: vec![],
            ..Default::default()
        };
        assert!(PhaseScreenLens::new(&region, &config).is_err());
        let config = PhaseScreenLensConfig {
            focal_length: -1.0,
            ..Default::default()
        };
        assert!(PhaseScreenLens::new(&region, &config).is_err());
    }

    #[test]
    fn it_rejects_unphysical_materials() {
        let region = DesignRegion::new("lens", Grid::new(4, 1), 4.0);
        for materials in [
            MaterialPair {
                void: Material {
                    relative_permittivity: 0.0,
                },
                solid: Material::SILICON,
            },
            MaterialPair {
                void: Material::VACUUM,
                solid: Material {
                    relative_permittivity: -2.0,
                },
            },
            MaterialPair {
                void: Material::VACUUM,
                solid: Material {
                    relative_permittivity: f64::NAN,
                },
            },
        ] {
            let config = PhaseScreenLensConfig {
                materials,
                ..Default::default()
            };
            assert!(matches!(
                PhaseScreenLens::new(&region, &config),
                Err(LensError::InvalidConfig { .. })
            ));
        }

        let config = PhaseScreenLensConfig {
            physical_constants: PhysicalConstants {
                vacuum_permittivity: 0.0,
                vacuum_permeability: 1.0,
            },
            ..Default::default()
        };
        assert!(matches!(
            PhaseScreenLens::new(&region, &config),
            Err(LensError::InvalidConfig { .. })
        ));
    }
}
