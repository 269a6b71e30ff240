use nalgebra::{
    Point2,
    Vector2,
};

/// Row-major layout of a 2D design grid.
///
/// Cells are stored with `x` varying fastest, so the cell at `(x, y)` lives at
/// index `x + nx * y`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Grid {
    size: Vector2<usize>,
}

impl Grid {
    pub fn new(nx: usize, ny: usize) -> Self {
        Self {
            size: Vector2::new(nx, ny),
        }
    }

    pub fn size(&self) -> &Vector2<usize> {
        &self.size
    }

    pub fn nx(&self) -> usize {
        self.size.x
    }

    pub fn ny(&self) -> usize {
        self.size.y
    }

    pub fn len(&self) -> usize {
        self.size.x * self.size.y
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn point_unchecked(&self, index: usize) -> Point2<usize> {
        Point2::new(index % self.size.x, index / self.size.x)
    }

    pub fn point(&self, index: usize) -> Option<Point2<usize>> {
        (index < self.len()).then(|| self.point_unchecked(index))
    }

    pub fn index_unchecked(&self, point: &Point2<usize>) -> usize {
        point.x + self.size.x * point.y
    }

    pub fn index(&self, point: &Point2<usize>) -> Option<usize> {
        self.is_inside(point).then(|| self.index_unchecked(point))
    }

    pub fn is_inside(&self, point: &Point2<usize>) -> bool {
        point.x < self.size.x && point.y < self.size.y
    }

    /// Iterates over all cells as `(index, point)` in storage order.
    pub fn iter(&self) -> GridIter {
        GridIter {
            grid: *self,
            index: 0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GridIter {
    grid: Grid,
    index: usize,
}

impl Iterator for GridIter {
    type Item = (usize, Point2<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        let point = self.grid.point(self.index)?;
        let index = self.index;
        self.index += 1;
        Some((index, point))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.grid.len().saturating_sub(self.index);
        (n, Some(n))
    }
}

impl ExactSizeIterator for GridIter {}
