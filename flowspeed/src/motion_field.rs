//! # Dense flow and magnitude fields

use crate::frame::ForegroundMask;
use nalgebra::*;

/// Dense optical flow field.
///
/// Holds one displacement vector (in pixels) per image pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowField {
    vf: Matrix2xX<f32>,
    width: usize,
}

impl FlowField {
    /// Create a new zero flow field.
    ///
    /// # Arguments
    ///
    /// * `width` - width of the field.
    /// * `height` - height of the field.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            vf: Matrix2xX::repeat(width * height, 0f32),
            width,
        }
    }

    /// Build a flow field from separate horizontal and vertical components.
    ///
    /// Both slices are in row-major order and must have `width * height` elements.
    pub fn from_components(width: usize, dx: &[f32], dy: &[f32]) -> Self {
        assert_eq!(dx.len(), dy.len());
        Self {
            vf: Matrix2xX::from_fn(dx.len(), |r, c| if r == 0 { dx[c] } else { dy[c] }),
            width,
        }
    }

    /// Get width and height of the flow field.
    pub fn dim(&self) -> (usize, usize) {
        if self.width == 0 {
            (0, 0)
        } else {
            (self.width, self.vf.ncols() / self.width)
        }
    }

    /// Get size of the flow field.
    ///
    /// This is the same as `width * height`
    pub fn size(&self) -> usize {
        self.vf.ncols()
    }

    /// Get the flow field in row-major order.
    ///
    /// The elements returned are in the following order:
    ///
    /// `field[0,0].x, field[0,0].y, field[0,1].x, ... field[0,N].y, field[1,0].x, ... field[N,N].y`
    pub fn as_slice(&self) -> &[f32] {
        self.vf.as_slice()
    }

    /// Set motion at given position.
    ///
    /// # Arguments
    ///
    /// * `x` - horizontal coordinate to set at.
    /// * `y` - vertical coordinate to set at.
    /// * `motion` - motion to set.
    pub fn set_motion(&mut self, x: usize, y: usize, motion: Vector2<f32>) {
        self.vf.set_column(self.width * y + x, &motion);
    }

    /// Get motion at coordinates.
    ///
    /// # Arguments
    ///
    /// * `x` - horizontal coordinate.
    /// * `y` - vertical coordinate.
    pub fn get_motion(&self, x: usize, y: usize) -> Vector2<f32> {
        self.vf.column(self.width * y + x).into()
    }

    /// Iterate every element of the flow field.
    ///
    /// The resulting iterator yields `(x, y, motion)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, Vector2<f32>)> + '_ {
        let (width, height) = self.dim();
        (0..height).flat_map(move |y| (0..width).map(move |x| (x, y, self.get_motion(x, y))))
    }

    /// Compute per-pixel motion magnitude.
    pub fn magnitudes(&self) -> MagnitudeField {
        let (width, height) = self.dim();
        MagnitudeField {
            width,
            height,
            data: self.vf.column_iter().map(|c| c.norm()).collect(),
        }
    }
}

/// Per-pixel motion speed, in pixels per sampled frame.
#[derive(Clone, Debug, PartialEq)]
pub struct MagnitudeField {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl MagnitudeField {
    /// Create an all-zero field.
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    /// Get width and height of the field.
    pub fn dim(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Magnitudes in row-major order.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Zero out every pixel that is background in `mask`.
    ///
    /// Pixels outside of the mask (if dimensions differ) are treated as background.
    pub fn apply_mask(&mut self, mask: &ForegroundMask) {
        let (mw, mh) = (mask.width() as usize, mask.height() as usize);

        for y in 0..self.height {
            for x in 0..self.width {
                let keep = x < mw && y < mh && mask.get_pixel(x as u32, y as u32).0[0] != 0;
                if !keep {
                    self.data[y * self.width + x] = 0.0;
                }
            }
        }
    }

    /// Iterate over strictly positive magnitudes.
    pub fn positive(&self) -> impl Iterator<Item = f32> + '_ {
        self.data.iter().copied().filter(|&v| v > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use image::{GrayImage, Luma};

    #[test]
    fn set_and_get() {
        let mut field = FlowField::new(3, 2);
        assert_eq!(field.dim(), (3, 2));
        assert_eq!(field.size(), 6);

        field.set_motion(2, 1, Vector2::new(1.5, -2.0));
        assert_eq!(field.get_motion(2, 1), Vector2::new(1.5, -2.0));
        assert_eq!(field.as_slice()[10..], [1.5, -2.0]);
        assert_eq!(field.iter().filter(|(_, _, m)| m.norm() > 0.0).count(), 1);
    }

    #[test]
    fn components_layout() {
        let field = FlowField::from_components(2, &[1.0, 2.0, 3.0, 4.0], &[5.0, 6.0, 7.0, 8.0]);
        assert_eq!(field.dim(), (2, 2));
        assert_eq!(field.get_motion(0, 1), Vector2::new(3.0, 7.0));
    }

    #[test]
    fn magnitude_is_euclidean() {
        let field = FlowField::from_components(2, &[3.0, 0.0], &[4.0, -1.0]);
        let mag = field.magnitudes();
        assert_eq!(mag.dim(), (2, 1));
        assert_approx_eq!(mag.get(0, 0), 5.0);
        assert_approx_eq!(mag.get(1, 0), 1.0);
    }

    #[test]
    fn empty_field() {
        let field = FlowField::new(0, 0);
        assert_eq!(field.dim(), (0, 0));
        assert_eq!(field.magnitudes().as_slice().len(), 0);
    }

    #[test]
    fn masking() {
        let field = FlowField::from_components(2, &[1.0, 1.0, 1.0, 1.0], &[0.0; 4]);
        let mut mag = field.magnitudes();

        let mut mask = GrayImage::new(2, 2);
        mask.put_pixel(1, 0, Luma([255]));

        mag.apply_mask(&mask);

        assert_eq!(mag.as_slice(), &[0.0, 1.0, 0.0, 0.0]);
        assert_eq!(mag.positive().collect::<Vec<_>>(), vec![1.0]);
    }
}
