use image::RgbImage;
use trashrack_core::{ClassMask, DepthMap};

use crate::EstimateError;

/// Flat point cloud: `(column, row, depth)` positions in crop coordinates and
/// per-point RGB normalized to `[0, 1]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<[f64; 3]>,
    pub colors: Vec<[f32; 3]>,
}

impl PointCloud {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            colors: Vec::with_capacity(capacity),
        }
    }

    /// Cloud without colors; every point is painted black.
    pub fn from_points(points: Vec<[f64; 3]>) -> Self {
        let colors = vec![[0.0; 3]; points.len()];
        Self { points, colors }
    }

    #[inline]
    pub fn push(&mut self, point: [f64; 3], color: [f32; 3]) {
        self.points.push(point);
        self.colors.push(color);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Target and reference clouds lifted from one crop.
#[derive(Clone, Debug, Default)]
pub struct ClassClouds {
    pub target: PointCloud,
    pub reference: PointCloud,
}

impl ClassClouds {
    /// Walk the crop row-major and lift every pixel whose class is `target`
    /// or `reference` to `(column, row, depth)`.
    ///
    /// `reference` may be `None` when the reference class is not part of the
    /// registry; the reference cloud is empty then.
    pub fn from_crop(
        mask: &ClassMask,
        depth: &DepthMap,
        rgb: &RgbImage,
        target: u8,
        reference: Option<u8>,
    ) -> Result<Self, EstimateError> {
        let (w, h) = (mask.width, mask.height);
        if (depth.width, depth.height) != (w, h) {
            return Err(EstimateError::ShapeMismatch {
                what: "depth map",
                expected_w: w,
                expected_h: h,
                got_w: depth.width,
                got_h: depth.height,
            });
        }
        if (rgb.width() as usize, rgb.height() as usize) != (w, h) {
            return Err(EstimateError::ShapeMismatch {
                what: "image crop",
                expected_w: w,
                expected_h: h,
                got_w: rgb.width() as usize,
                got_h: rgb.height() as usize,
            });
        }

        let mut clouds = ClassClouds::default();
        for y in 0..h {
            for x in 0..w {
                let code = mask.get(x, y);
                let cloud = if code == target {
                    &mut clouds.target
                } else if Some(code) == reference {
                    &mut clouds.reference
                } else {
                    continue;
                };
                let [r, g, b] = rgb.get_pixel(x as u32, y as u32).0;
                cloud.push(
                    [x as f64, y as f64, depth.get(x, y) as f64],
                    [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0],
                );
            }
        }
        Ok(clouds)
    }
}
