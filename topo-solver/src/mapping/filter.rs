use nalgebra::{
    DVector,
    Point2,
    Vector2,
};

use crate::{
    Error,
    grid::Grid,
};

/// How the filter samples cells outside the design grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Boundary {
    /// Repeat the edge cell.
    #[default]
    Clamp,
    /// Wrap around to the opposite edge.
    Periodic,
}

#[derive(Clone, Copy, Debug)]
struct Tap {
    offset: Vector2<isize>,
    weight: f64,
}

/// Linear-hat ("conic") smoothing filter.
///
/// The kernel is `max(0, 1 - r / radius)` sampled on the design grid and
/// normalized to sum to one, so the filtered field is a convex combination of
/// the raw field and stays inside its range.
#[derive(Clone, Debug)]
pub struct ConicFilter {
    grid: Grid,
    radius: f64,
    boundary: [Boundary; 2],
    taps: Vec<Tap>,
}

impl ConicFilter {
    /// - `radius`: kernel radius in physical units
    /// - `resolution`: design cells per physical unit
    pub fn new(
        grid: Grid,
        radius: f64,
        resolution: f64,
        boundary: [Boundary; 2],
    ) -> Result<Self, Error> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(Error::InvalidFilter {
                reason: format!("radius must be positive, but is {radius}"),
            });
        }
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(Error::InvalidFilter {
                reason: format!("resolution must be positive, but is {resolution}"),
            });
        }
        if grid.is_empty() {
            return Err(Error::InvalidFilter {
                reason: "design grid is empty".to_owned(),
            });
        }

        let extent = (radius * resolution).ceil();
        if extent > grid.nx().max(grid.ny()) as f64 {
            return Err(Error::InvalidFilter {
                reason: format!(
                    "radius {radius} spans {extent} cells, more than the {}x{} design grid",
                    grid.nx(),
                    grid.ny()
                ),
            });
        }
        let extent = extent as isize;
        let mut taps = vec![];
        for dy in -extent..=extent {
            for dx in -extent..=extent {
                let distance = ((dx * dx + dy * dy) as f64).sqrt() / resolution;
                let weight = 1.0 - distance / radius;
                if weight > 0.0 {
                    taps.push(Tap {
                        offset: Vector2::new(dx, dy),
                        weight,
                    });
                }
            }
        }

        let total: f64 = taps.iter().map(|tap| tap.weight).sum();
        for tap in &mut taps {
            tap.weight /= total;
        }

        tracing::debug!(radius, resolution, num_taps = taps.len(), "conic filter");

        Ok(Self {
            grid,
            radius,
            boundary,
            taps,
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn num_taps(&self) -> usize {
        self.taps.len()
    }

    fn resolve(&self, point: &Point2<usize>, offset: &Vector2<isize>) -> usize {
        let axis = |coordinate: usize, offset: isize, size: usize, boundary: Boundary| {
            let shifted = coordinate as isize + offset;
            match boundary {
                Boundary::Clamp => shifted.clamp(0, size as isize - 1) as usize,
                Boundary::Periodic => shifted.rem_euclid(size as isize) as usize,
            }
        };
        let x = axis(point.x, offset.x, self.grid.nx(), self.boundary[0]);
        let y = axis(point.y, offset.y, self.grid.ny(), self.boundary[1]);
        self.grid.index_unchecked(&Point2::new(x, y))
    }

    fn filter_cell(&self, field: &DVector<f64>, index: usize) -> f64 {
        let point = self.grid.point_unchecked(index);
        self.taps
            .iter()
            .map(|tap| tap.weight * field[self.resolve(&point, &tap.offset)])
            .sum()
    }

    pub fn apply(&self, field: &DVector<f64>) -> DVector<f64> {
        let mut filtered = DVector::zeros(self.grid.len());

        #[cfg(feature = "rayon")]
        {
            use rayon::iter::{
                IndexedParallelIterator as _,
                IntoParallelRefMutIterator as _,
                ParallelIterator as _,
            };

            filtered
                .as_mut_slice()
                .par_iter_mut()
                .enumerate()
                .for_each(|(index, value)| *value = self.filter_cell(field, index));
        }

        #[cfg(not(feature = "rayon"))]
        {
            filtered
                .iter_mut()
                .enumerate()
                .for_each(|(index, value)| *value = self.filter_cell(field, index));
        }

        filtered
    }

    /// Adjoint of [`apply`][Self::apply].
    pub fn apply_transpose(&self, cotangent: &DVector<f64>) -> DVector<f64> {
        let mut gradient = DVector::zeros(self.grid.len());
        for (index, point) in self.grid.iter() {
            for tap in &self.taps {
                gradient[self.resolve(&point, &tap.offset)] += tap.weight * cotangent[index];
            }
        }
        gradient
    }
}

/// Filter radius that gives the minimum length scale `length_scale` for an
/// erosion threshold `eta_e`.
pub fn conic_radius_from_eta_e(length_scale: f64, eta_e: f64) -> Result<f64, Error> {
    if eta_e > 0.5 && eta_e < 0.75 {
        Ok(length_scale / (2.0 * (eta_e - 0.5).sqrt()))
    }
    else if (0.75..=1.0).contains(&eta_e) {
        Ok(length_scale / (2.0 - 2.0 * (1.0 - eta_e).sqrt()))
    }
    else {
        Err(Error::InvalidFilter {
            reason: format!("eta_e must be in (0.5, 1], but is {eta_e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use crate::{
        grid::Grid,
        mapping::filter::{
            Boundary,
            ConicFilter,
            conic_radius_from_eta_e,
        },
    };

    fn test_field(grid: &Grid) -> DVector<f64> {
        DVector::from_fn(grid.len(), |i, _| ((i * 7919) % 13) as f64 / 12.0)
    }

    #[test]
    fn it_preserves_constant_fields() {
        let grid = Grid::new(9, 5);
        for boundary in [Boundary::Clamp, Boundary::Periodic] {
            let filter = ConicFilter::new(grid, 0.3, 10.0, [boundary; 2]).unwrap();
            let filtered = filter.apply(&DVector::from_element(grid.len(), 0.25));
            assert!(filtered.iter().all(|value| (value - 0.25).abs() < 1e-12));
        }
    }

    #[test]
    fn it_keeps_values_in_range() {
        let grid = Grid::new(12, 7);
        let filter = ConicFilter::new(grid, 0.25, 20.0, [Boundary::Clamp; 2]).unwrap();
        let field = test_field(&grid);
        let filtered = filter.apply(&field);
        assert_eq!(filtered.len(), field.len());
        // convex combination, up to rounding
        assert!(filtered.iter().all(|value| (-1e-12..=1.0 + 1e-12).contains(value)));
    }

    #[test]
    fn it_is_adjoint_to_its_transpose() {
        let grid = Grid::new(8, 6);
        for boundary in [[Boundary::Clamp; 2], [Boundary::Periodic, Boundary::Clamp]] {
            let filter = ConicFilter::new(grid, 0.2, 15.0, boundary).unwrap();
            let x = test_field(&grid);
            let y = DVector::from_fn(grid.len(), |i, _| ((i * 31) % 11) as f64 - 5.0);
            let lhs = filter.apply(&x).dot(&y);
            let rhs = x.dot(&filter.apply_transpose(&y));
            assert!((lhs - rhs).abs() < 1e-10, "{lhs} != {rhs}");
        }
    }

    #[test]
    fn it_rejects_non_positive_radius() {
        let grid = Grid::new(4, 4);
        assert!(ConicFilter::new(grid, 0.0, 10.0, [Boundary::Clamp; 2]).is_err());
        assert!(ConicFilter::new(grid, -1.0, 10.0, [Boundary::Clamp; 2]).is_err());
        assert!(ConicFilter::new(grid, 0.1, 0.0, [Boundary::Clamp; 2]).is_err());
        assert!(ConicFilter::new(Grid::new(0, 4), 0.1, 10.0, [Boundary::Clamp; 2]).is_err());
    }

    #[test]
    fn it_degenerates_to_identity_below_one_cell() {
        let grid = Grid::new(5, 5);
        let filter = ConicFilter::new(grid, 0.05, 10.0, [Boundary::Clamp; 2]).unwrap();
        assert_eq!(filter.num_taps(), 1);
        let field = test_field(&grid);
        assert_eq!(filter.apply(&field), field);
    }

    #[test]
    fn it_computes_radius_from_length_scale() {
        let radius = conic_radius_from_eta_e(0.1, 0.75).unwrap();
        assert!((radius - 0.1).abs() < 1e-12);
        assert!(conic_radius_from_eta_e(0.1, 0.55).unwrap() > 0.1);
        assert!(conic_radius_from_eta_e(0.1, 0.4).is_err());
        assert!(conic_radius_from_eta_e(0.1, 0.5).is_err());
    }

    #[test]
    fn it_rejects_kernels_larger_than_the_grid() {
        let grid = Grid::new(40, 8);
        let radius = conic_radius_from_eta_e(0.1, 0.5 + 1e-6).unwrap();
        assert!(radius > 2.0);
        assert!(ConicFilter::new(grid, radius, 20.0, [Boundary::Clamp; 2]).is_err());
        assert!(ConicFilter::new(grid, 2.0, 20.0, [Boundary::Periodic; 2]).is_ok());
        assert!(ConicFilter::new(grid, 2.05, 20.0, [Boundary::Periodic; 2]).is_err());
    }
}
