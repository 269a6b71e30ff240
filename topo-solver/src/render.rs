use std::path::Path;

use colorgrad::Gradient;
use image::RgbaImage;
use nalgebra::DVector;

use crate::{
    Error,
    grid::Grid,
};

/// Renders a density field, one `scale x scale` block per cell.
///
/// The image's y-axis points down, so rows are flipped to keep `y = 0` at the
/// bottom.
pub fn render_field(
    field: &DVector<f64>,
    grid: &Grid,
    scale: u32,
    gradient: &impl Gradient,
) -> Result<RgbaImage, Error> {
    Error::check_size("rendered field", grid.len(), field.len())?;

    let scale = scale.max(1);
    let width = grid.nx() as u32 * scale;
    let height = grid.ny() as u32 * scale;

    Ok(RgbaImage::from_fn(width, height, |x, y| {
        let cell_x = (x / scale) as usize;
        let cell_y = grid.ny() - 1 - (y / scale) as usize;
        let value = field[cell_x + grid.nx() * cell_y];
        image::Rgba(gradient.at(value as f32).to_rgba8())
    }))
}

/// Writes a density field as a PNG, void white and solid black.
pub fn save_field(
    path: impl AsRef<Path>,
    field: &DVector<f64>,
    grid: &Grid,
    scale: u32,
) -> Result<(), Error> {
    let image = render_field(field, grid, scale, &colorgrad::preset::greys())?;
    image.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use crate::{
        grid::Grid,
        render::render_field,
    };

    #[test]
    fn it_renders_cells_as_blocks() {
        let grid = Grid::new(2, 1);
        let field = DVector::from_vec(vec![0.0, 1.0]);
        let image = render_field(&field, &grid, 3, &colorgrad::preset::greys()).unwrap();
        assert_eq!(image.dimensions(), (6, 3));
        assert_eq!(image.get_pixel(0, 0), image.get_pixel(2, 2));
        assert_ne!(image.get_pixel(0, 0), image.get_pixel(5, 0));
    }

    #[test]
    fn it_flips_rows() {
        let grid = Grid::new(1, 2);
        let field = DVector::from_vec(vec![0.0, 1.0]);
        let gradient = colorgrad::preset::greys();
        let image = render_field(&field, &grid, 1, &gradient).unwrap();
        // top row of the image is the last row of the grid
        let top = image::Rgba(colorgrad::Gradient::at(&gradient, 1.0).to_rgba8());
        assert_eq!(*image.get_pixel(0, 0), top);
    }
}
