//! Maps from raw design variables to physical material densities.
//!
//! A [`DesignMapping`] runs, in this order:
//!
//! 1. an optional [`ConicFilter`] to impose a length scale,
//! 2. a [`TanhProjection`] pushing the smoothed field towards 0 and 1,
//! 3. an optional [`MirrorSymmetry`] average.
//!
//! Every step maps `[0, 1]` into `[0, 1]`, and every step has a reverse-mode
//! product used to pull sensitivities back onto the raw design.

pub mod filter;
pub mod projection;
pub mod symmetry;

use nalgebra::DVector;

pub use self::{
    filter::{
        Boundary,
        ConicFilter,
        conic_radius_from_eta_e,
    },
    projection::TanhProjection,
    symmetry::{
        MirrorAxis,
        MirrorSymmetry,
    },
};
use crate::{
    Error,
    grid::Grid,
};

/// The `(eta, beta)` pair of an anneal stage.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProjectionParameters {
    /// Projection threshold
    pub eta: f64,
    /// Projection sharpness
    pub beta: f64,
}

impl ProjectionParameters {
    pub fn new(eta: f64, beta: f64) -> Self {
        Self { eta, beta }
    }

    /// Hard thresholding at `eta`.
    pub fn binarize(eta: f64) -> Self {
        Self {
            eta,
            beta: f64::INFINITY,
        }
    }

    pub fn projection(&self) -> Result<TanhProjection, Error> {
        TanhProjection::new(self.eta, self.beta)
    }
}

#[derive(Clone, Debug)]
pub struct DesignMapping {
    grid: Grid,
    filter: Option<ConicFilter>,
    symmetry: Option<MirrorSymmetry>,
}

impl DesignMapping {
    /// Mapping that only projects.
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            filter: None,
            symmetry: None,
        }
    }

    pub fn with_filter(mut self, filter: ConicFilter) -> Result<Self, Error> {
        Error::check_size("filter grid", self.grid.len(), filter.grid().len())?;
        self.filter = Some(filter);
        Ok(self)
    }

    pub fn with_symmetry(mut self, axis: MirrorAxis) -> Self {
        self.symmetry = Some(MirrorSymmetry::new(self.grid, axis));
        self
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn filter(&self) -> Option<&ConicFilter> {
        self.filter.as_ref()
    }

    pub fn symmetry(&self) -> Option<&MirrorSymmetry> {
        self.symmetry.as_ref()
    }

    fn filtered(&self, raw: &DVector<f64>) -> Result<DVector<f64>, Error> {
        Error::check_size("raw design field", self.grid.len(), raw.len())?;
        Ok(match &self.filter {
            Some(filter) => filter.apply(raw),
            None => raw.clone(),
        })
    }

    pub fn forward(
        &self,
        raw: &DVector<f64>,
        parameters: &ProjectionParameters,
    ) -> Result<DVector<f64>, Error> {
        let projection = parameters.projection()?;
        let projected = self.filtered(raw)?.map(|x| projection.project(x));
        Ok(match &self.symmetry {
            Some(symmetry) => symmetry.apply(&projected),
            None => projected,
        })
    }

    /// Vector-Jacobian product: pulls `cotangent` (a sensitivity with respect
    /// to the physical field) back to the raw field.
    pub fn vjp(
        &self,
        raw: &DVector<f64>,
        parameters: &ProjectionParameters,
        cotangent: &DVector<f64>,
    ) -> Result<DVector<f64>, Error> {
        Error::check_size("physical sensitivity", self.grid.len(), cotangent.len())?;
        let projection = parameters.projection()?;
        let filtered = self.filtered(raw)?;

        let cotangent = match &self.symmetry {
            Some(symmetry) => symmetry.apply(cotangent),
            None => cotangent.clone(),
        };
        let cotangent = cotangent.zip_map(&filtered, |g, x| g * projection.derivative(x));

        Ok(match &self.filter {
            Some(filter) => filter.apply_transpose(&cotangent),
            None => cotangent,
        })
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use crate::{
        grid::Grid,
        mapping::{
            Boundary,
            ConicFilter,
            DesignMapping,
            MirrorAxis,
            ProjectionParameters,
        },
    };

    fn test_mapping(grid: Grid) -> DesignMapping {
        DesignMapping::new(grid)
            .with_filter(ConicFilter::new(grid, 0.15, 20.0, [Boundary::Clamp; 2]).unwrap())
            .unwrap()
            .with_symmetry(MirrorAxis::X)
    }

    fn test_field(len: usize) -> DVector<f64> {
        DVector::from_fn(len, |i, _| ((i * 7919 + 3) % 101) as f64 / 100.0)
    }

    #[test]
    fn it_maps_unit_box_into_unit_box() {
        let grid = Grid::new(10, 6);
        let mapping = test_mapping(grid);
        for beta in [0.0, 1.0, 8.0, 64.0, 512.0, f64::INFINITY] {
            for eta in [0.0, 0.45, 0.5, 0.55, 1.0] {
                let physical = mapping
                    .forward(&test_field(grid.len()), &ProjectionParameters::new(eta, beta))
                    .unwrap();
                assert_eq!(physical.len(), grid.len());
                assert!(physical.iter().all(|x| (0.0..=1.0).contains(x)));
            }
        }
    }

    #[test]
    fn it_binarizes_without_symmetry() {
        let grid = Grid::new(8, 3);
        let mapping = DesignMapping::new(grid);
        let physical = mapping
            .forward(&test_field(grid.len()), &ProjectionParameters::binarize(0.5))
            .unwrap();
        assert!(physical.iter().all(|x| *x == 0.0 || *x == 1.0));
    }

    #[test]
    fn it_produces_symmetric_fields() {
        let grid = Grid::new(7, 4);
        let mapping = test_mapping(grid);
        let physical = mapping
            .forward(&test_field(grid.len()), &ProjectionParameters::new(0.5, 4.0))
            .unwrap();
        let symmetry = mapping.symmetry().unwrap();
        for index in 0..grid.len() {
            assert_eq!(physical[index], physical[symmetry.mirror_index(index)]);
        }
    }

    #[test]
    fn it_matches_finite_differences() {
        let grid = Grid::new(6, 5);
        let mapping = test_mapping(grid);
        let parameters = ProjectionParameters::new(0.5, 3.0);
        let raw = test_field(grid.len());
        let weights = DVector::from_fn(grid.len(), |i, _| ((i * 13) % 7) as f64 - 3.0);

        let gradient = mapping.vjp(&raw, &parameters, &weights).unwrap();

        let h = 1e-6;
        for index in [0, 4, 11, 17, 29] {
            let mut plus = raw.clone();
            plus[index] += h;
            let mut minus = raw.clone();
            minus[index] -= h;
            let numeric = (mapping.forward(&plus, &parameters).unwrap().dot(&weights)
                - mapping.forward(&minus, &parameters).unwrap().dot(&weights))
                / (2.0 * h);
            assert!(
                (numeric - gradient[index]).abs() < 1e-6,
                "cell {index}: {numeric} != {}",
                gradient[index]
            );
        }
    }

    #[test]
    fn it_rejects_mismatched_fields() {
        let grid = Grid::new(4, 4);
        let mapping = DesignMapping::new(grid);
        let parameters = ProjectionParameters::new(0.5, 2.0);
        assert!(mapping.forward(&DVector::zeros(15), &parameters).is_err());
        assert!(
            mapping
                .vjp(&DVector::zeros(16), &parameters, &DVector::zeros(3))
                .is_err()
        );
    }
}
