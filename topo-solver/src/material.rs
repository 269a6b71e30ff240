/// Vacuum constants, which fix the unit system.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhysicalConstants {
    pub vacuum_permittivity: f64,
    pub vacuum_permeability: f64,
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        Self::REDUCED
    }
}

impl PhysicalConstants {
    /// Units with `c = 1`, so a frequency is the inverse of its vacuum
    /// wavelength.
    pub const REDUCED: Self = Self {
        vacuum_permittivity: 1.0,
        vacuum_permeability: 1.0,
    };

    pub fn speed_of_light(&self) -> f64 {
        (self.vacuum_permittivity * self.vacuum_permeability).powf(-0.5)
    }

    pub fn frequency_to_wavelength(&self, frequency: f64) -> f64 {
        self.speed_of_light() / frequency
    }

    pub fn wavelength_to_frequency(&self, wavelength: f64) -> f64 {
        self.speed_of_light() / wavelength
    }
}

/// A lossless dielectric.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Material {
    /// epsilon_r
    pub relative_permittivity: f64,
}

impl Material {
    pub const VACUUM: Self = Self {
        relative_permittivity: 1.0,
    };

    pub const SILICON_DIOXIDE: Self = Self {
        relative_permittivity: 1.45 * 1.45,
    };

    pub const SILICON_NITRIDE: Self = Self {
        relative_permittivity: 2.0 * 2.0,
    };

    pub const SILICON: Self = Self {
        relative_permittivity: 3.4 * 3.4,
    };

    pub fn refractive_index(&self) -> f64 {
        self.relative_permittivity.sqrt()
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::VACUUM
    }
}

/// The two end materials a design field interpolates between.
///
/// A density of `0` is `void`, `1` is `solid`. The permittivity is
/// interpolated linearly.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MaterialPair {
    pub void: Material,
    pub solid: Material,
}

impl Default for MaterialPair {
    fn default() -> Self {
        Self {
            void: Material::SILICON_DIOXIDE,
            solid: Material::SILICON_NITRIDE,
        }
    }
}

impl MaterialPair {
    pub fn permittivity(&self, density: f64) -> f64 {
        self.void.relative_permittivity
            + density * (self.solid.relative_permittivity - self.void.relative_permittivity)
    }

    pub fn refractive_index(&self, density: f64) -> f64 {
        self.permittivity(density).sqrt()
    }

    /// `dn/drho`
    pub fn refractive_index_derivative(&self, density: f64) -> f64 {
        let delta = self.solid.relative_permittivity - self.void.relative_permittivity;
        0.5 * delta / self.refractive_index(density)
    }
}

#[cfg(test)]
mod tests {
    use crate::material::{
        Material,
        MaterialPair,
        PhysicalConstants,
    };

    #[test]
    fn it_interpolates_between_end_materials() {
        let pair = MaterialPair {
            void: Material::VACUUM,
            solid: Material::SILICON,
        };
        assert_eq!(pair.permittivity(0.0), 1.0);
        assert!((pair.refractive_index(1.0) - 3.4).abs() < 1e-12);
    }

    #[test]
    fn it_differentiates_refractive_index() {
        let pair = MaterialPair::default();
        let h = 1e-6;
        for density in [0.1, 0.5, 0.9] {
            let numeric = (pair.refractive_index(density + h) - pair.refractive_index(density - h))
                / (2.0 * h);
            assert!((numeric - pair.refractive_index_derivative(density)).abs() < 1e-8);
        }
    }

    #[test]
    fn it_converts_reduced_frequencies() {
        let constants = PhysicalConstants::REDUCED;
        assert_eq!(constants.speed_of_light(), 1.0);
        assert_eq!(constants.frequency_to_wavelength(2.0), 0.5);
    }
}
