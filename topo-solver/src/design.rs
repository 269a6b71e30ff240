//! Design regions and the field buffers exchanged with the simulation.

use std::collections::HashSet;

use nalgebra::{
    DMatrix,
    DVector,
    Vector2,
};

use crate::{
    Error,
    grid::Grid,
    mapping::{
        DesignMapping,
        ProjectionParameters,
    },
};

/// A discretized area whose material composition is optimized.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DesignRegion {
    pub name: String,
    pub grid: Grid,
    /// Design cells per unit length
    pub resolution: f64,
}

impl DesignRegion {
    pub fn new(name: impl Into<String>, grid: Grid, resolution: f64) -> Self {
        Self {
            name: name.into(),
            grid,
            resolution,
        }
    }

    /// Physical width and height.
    pub fn extent(&self) -> Vector2<f64> {
        self.grid.size().cast::<f64>() / self.resolution
    }

    pub fn num_cells(&self) -> usize {
        self.grid.len()
    }
}

/// Ordered, named field buffers, one per design region.
#[derive(Clone, Debug, PartialEq)]
pub struct DesignFields {
    fields: Vec<(String, DVector<f64>)>,
}

impl DesignFields {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&DVector<f64>> {
        self.fields
            .iter()
            .find_map(|(field_name, field)| (field_name == name).then_some(field))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DVector<f64>)> {
        self.fields
            .iter()
            .map(|(name, field)| (name.as_str(), field))
    }

    /// Total number of cells over all regions.
    pub fn num_cells(&self) -> usize {
        self.fields.iter().map(|(_, field)| field.len()).sum()
    }

    /// Every cell set to `1` if it exceeds `threshold`, else `0`.
    pub fn thresholded(&self, threshold: f64) -> Self {
        let fields = self
            .fields
            .iter()
            .map(|(name, field)| {
                (
                    name.clone(),
                    field.map(|rho| if rho > threshold { 1.0 } else { 0.0 }),
                )
            })
            .collect();
        Self { fields }
    }

    /// All fields concatenated in region order.
    pub fn concatenated(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.num_cells(),
            self.fields
                .iter()
                .flat_map(|(_, field)| field.iter().copied()),
        )
    }
}

/// The design regions of a problem together with their mappings.
///
/// The raw design vector is the concatenation of all regions' cells in the
/// order the regions were added.
#[derive(Clone, Debug)]
pub struct DesignSpace {
    regions: Vec<(DesignRegion, DesignMapping)>,
}

impl DesignSpace {
    pub fn new(regions: Vec<(DesignRegion, DesignMapping)>) -> Result<Self, Error> {
        if regions.is_empty() {
            return Err(Error::InvalidRegion {
                name: String::new(),
                reason: "no design regions".to_owned(),
            });
        }

        let mut names = HashSet::new();
        for (region, mapping) in &regions {
            let invalid = |reason: &str| {
                Error::InvalidRegion {
                    name: region.name.clone(),
                    reason: reason.to_owned(),
                }
            };
            if !names.insert(region.name.as_str()) {
                return Err(invalid("duplicate name"));
            }
            if region.grid.is_empty() {
                return Err(invalid("empty grid"));
            }
            if !region.resolution.is_finite() || region.resolution <= 0.0 {
                return Err(invalid("resolution must be positive"));
            }
            if mapping.grid() != &region.grid {
                return Err(invalid("mapping grid doesn't match region grid"));
            }
        }

        Ok(Self { regions })
    }

    pub fn single(region: DesignRegion, mapping: DesignMapping) -> Result<Self, Error> {
        Self::new(vec![(region, mapping)])
    }

    pub fn regions(&self) -> impl Iterator<Item = &DesignRegion> {
        self.regions.iter().map(|(region, _)| region)
    }

    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn num_cells(&self) -> usize {
        self.regions.iter().map(|(region, _)| region.num_cells()).sum()
    }

    fn slices<'a>(
        &'a self,
        raw: &'a DVector<f64>,
    ) -> Result<impl Iterator<Item = (&'a DesignRegion, &'a DesignMapping, DVector<f64>)>, Error>
    {
        Error::check_size("design vector", self.num_cells(), raw.len())?;
        let mut offset = 0;
        Ok(self.regions.iter().map(move |(region, mapping)| {
            let n = region.num_cells();
            let slice = raw.rows(offset, n).into_owned();
            offset += n;
            (region, mapping, slice)
        }))
    }

    /// Splits a raw design vector into per-region buffers without mapping.
    pub fn split(&self, raw: &DVector<f64>) -> Result<DesignFields, Error> {
        let fields = self
            .slices(raw)?
            .map(|(region, _, slice)| (region.name.clone(), slice))
            .collect();
        Ok(DesignFields { fields })
    }

    /// Maps the raw design to physical fields.
    pub fn map(
        &self,
        raw: &DVector<f64>,
        parameters: &ProjectionParameters,
    ) -> Result<DesignFields, Error> {
        let fields = self
            .slices(raw)?
            .map(|(region, mapping, slice)| {
                Ok((region.name.clone(), mapping.forward(&slice, parameters)?))
            })
            .collect::<Result<_, Error>>()?;
        Ok(DesignFields { fields })
    }

    /// Pulls a sensitivity matrix `[physical cells, objectives]` back to
    /// `[raw cells, objectives]`.
    pub fn pull_back(
        &self,
        raw: &DVector<f64>,
        parameters: &ProjectionParameters,
        sensitivity: &DMatrix<f64>,
    ) -> Result<DMatrix<f64>, Error> {
        Error::check_size("sensitivity rows", self.num_cells(), sensitivity.nrows())?;

        let mut gradient = DMatrix::zeros(sensitivity.nrows(), sensitivity.ncols());
        let mut offset = 0;
        for (_, mapping, slice) in self.slices(raw)? {
            let n = slice.len();
            for column in 0..sensitivity.ncols() {
                let cotangent = sensitivity.column(column).rows(offset, n).into_owned();
                let pulled = mapping.vjp(&slice, parameters, &cotangent)?;
                gradient
                    .column_mut(column)
                    .rows_mut(offset, n)
                    .copy_from(&pulled);
            }
            offset += n;
        }
        Ok(gradient)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{
        DMatrix,
        DVector,
    };

    use crate::{
        design::{
            DesignRegion,
            DesignSpace,
        },
        grid::Grid,
        mapping::{
            DesignMapping,
            ProjectionParameters,
        },
    };

    fn two_regions() -> DesignSpace {
        let a = Grid::new(2, 2);
        let b = Grid::new(3, 1);
        DesignSpace::new(vec![
            (DesignRegion::new("a", a, 10.0), DesignMapping::new(a)),
            (DesignRegion::new("b", b, 10.0), DesignMapping::new(b)),
        ])
        .unwrap()
    }

    #[test]
    fn it_splits_in_region_order() {
        let space = two_regions();
        let raw = DVector::from_vec(vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        let fields = space.split(&raw).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("a").unwrap().as_slice(), &[0.0, 0.1, 0.2, 0.3]);
        assert_eq!(fields.get("b").unwrap().as_slice(), &[0.4, 0.5, 0.6]);
        assert_eq!(fields.concatenated(), raw);
        assert_eq!(
            fields.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn it_rejects_wrong_design_length() {
        let space = two_regions();
        assert!(space.split(&DVector::zeros(6)).is_err());
        assert!(
            space
                .map(&DVector::zeros(8), &ProjectionParameters::new(0.5, 1.0))
                .is_err()
        );
    }

    #[test]
    fn it_rejects_duplicate_regions() {
        let grid = Grid::new(2, 2);
        let result = DesignSpace::new(vec![
            (DesignRegion::new("a", grid, 10.0), DesignMapping::new(grid)),
            (DesignRegion::new("a", grid, 10.0), DesignMapping::new(grid)),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn it_rejects_mismatched_mapping() {
        let result = DesignSpace::single(
            DesignRegion::new("a", Grid::new(2, 2), 10.0),
            DesignMapping::new(Grid::new(3, 3)),
        );
        assert!(result.is_err());
    }

    #[test]
    fn it_pulls_back_per_region() {
        let space = two_regions();
        let raw = DVector::from_element(7, 0.5);
        let parameters = ProjectionParameters::new(0.5, 0.0);
        let sensitivity = DMatrix::from_fn(7, 2, |i, j| (i + 10 * j) as f64);
        // beta = 0 makes every mapping the identity
        let gradient = space.pull_back(&raw, &parameters, &sensitivity).unwrap();
        assert_eq!(gradient, sensitivity);
    }
}
