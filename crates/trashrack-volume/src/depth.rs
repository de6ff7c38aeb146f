use image::RgbImage;
use trashrack_core::{DepthMap, PixelBox};

/// Failure reported by a depth collaborator.
pub type DepthError = Box<dyn std::error::Error + Send + Sync>;

/// Relative depth for an image crop.
///
/// `region` is the crop's position in the frame it was cut from. The returned
/// map must have the crop's dimensions.
pub trait DepthEstimator {
    fn estimate_depth(&self, crop: &RgbImage, region: PixelBox) -> Result<DepthMap, DepthError>;
}

impl<T: DepthEstimator + ?Sized> DepthEstimator for &T {
    fn estimate_depth(&self, crop: &RgbImage, region: PixelBox) -> Result<DepthMap, DepthError> {
        (**self).estimate_depth(crop, region)
    }
}

impl<T: DepthEstimator + ?Sized> DepthEstimator for Box<T> {
    fn estimate_depth(&self, crop: &RgbImage, region: PixelBox) -> Result<DepthMap, DepthError> {
        (**self).estimate_depth(crop, region)
    }
}

/// Depth collaborator backed by a precomputed full-frame depth map.
#[derive(Clone, Debug)]
pub struct MapDepth {
    map: DepthMap,
}

impl MapDepth {
    pub fn new(map: DepthMap) -> Self {
        Self { map }
    }

    pub fn map(&self) -> &DepthMap {
        &self.map
    }
}

/// Returns the region clamped to the stored map. A map recorded for another
/// frame size yields a crop of the wrong size, which the estimator reports
/// as a shape mismatch.
impl DepthEstimator for MapDepth {
    fn estimate_depth(&self, _crop: &RgbImage, region: PixelBox) -> Result<DepthMap, DepthError> {
        Ok(self.map.crop(region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_depth_crops_the_region() {
        let depth = MapDepth::new(DepthMap::from_fn(10, 8, |x, y| (x * 100 + y) as f32));
        let crop = RgbImage::new(3, 2);
        let out = depth
            .estimate_depth(&crop, PixelBox::new(4, 5, 7, 7))
            .unwrap();
        assert_eq!((out.width, out.height), (3, 2));
        assert_eq!(out.get(0, 0), 405.0);
        assert_eq!(out.get(2, 1), 606.0);
    }

    #[test]
    fn map_depth_clamps_to_a_smaller_map() {
        let depth = MapDepth::new(DepthMap::from_fn(4, 4, |_, _| 0.0));
        let crop = RgbImage::new(6, 6);
        let out = depth
            .estimate_depth(&crop, PixelBox::new(0, 0, 6, 6))
            .unwrap();
        assert_eq!((out.width, out.height), (4, 4));
    }
}
