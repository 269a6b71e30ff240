use nalgebra::{
    DVector,
    Point2,
};

use crate::grid::Grid;

/// Axis whose coordinate is reversed by the mirror.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MirrorAxis {
    /// Left-right mirror, `x -> nx - 1 - x`.
    #[default]
    X,
    /// Top-bottom mirror, `y -> ny - 1 - y`.
    Y,
}

/// Averages a field with its mirror image.
///
/// The average is a projection (applying it twice changes nothing) and it is
/// self-adjoint, so it is its own vector-Jacobian product.
#[derive(Clone, Copy, Debug)]
pub struct MirrorSymmetry {
    grid: Grid,
    axis: MirrorAxis,
}

impl MirrorSymmetry {
    pub fn new(grid: Grid, axis: MirrorAxis) -> Self {
        Self { grid, axis }
    }

    pub fn axis(&self) -> MirrorAxis {
        self.axis
    }

    pub fn mirror_index(&self, index: usize) -> usize {
        let point = self.grid.point_unchecked(index);
        let mirrored = match self.axis {
            MirrorAxis::X => Point2::new(self.grid.nx() - 1 - point.x, point.y),
            MirrorAxis::Y => Point2::new(point.x, self.grid.ny() - 1 - point.y),
        };
        self.grid.index_unchecked(&mirrored)
    }

    pub fn apply(&self, field: &DVector<f64>) -> DVector<f64> {
        DVector::from_fn(self.grid.len(), |index, _| {
            0.5 * (field[index] + field[self.mirror_index(index)])
        })
    }
}
