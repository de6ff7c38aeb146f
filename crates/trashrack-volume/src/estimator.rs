use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};
use trashrack_core::{ClassMask, ClassRegistry, PixelBox, ScaleRatio};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    distance_to_plane, fit_plane, project_cloud, smooth_class_cloud, ClassClouds, DepthEstimator,
    EstimateError, PlaneFitParams, PlaneModel, SmoothingParams,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorParams {
    /// Fraction of the box width added on each side before cropping
    /// (usually 0.1 to 0.5).
    pub width_margin: f64,
    /// Fraction of the box height added on top and bottom.
    pub height_margin: f64,
    /// Class whose pixels define the reference plane.
    pub reference_class: String,
    pub plane: PlaneFitParams,
    pub smoothing: SmoothingParams,
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self {
            width_margin: 0.1,
            height_margin: 0.1,
            reference_class: "barragem".to_string(),
            plane: PlaneFitParams::default(),
            smoothing: SmoothingParams::default(),
        }
    }
}

/// Where the reference plane of one estimate came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaneSource {
    /// Fitted on reference pixels inside this crop.
    Fitted,
    /// Too few reference pixels; the previous plane was reused.
    Reused,
    /// No plane could be fitted and none was available to reuse.
    Unavailable,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObstructionMetrics {
    pub area_m2: f64,
    pub volume_m3: f64,
    pub plane_source: PlaneSource,
    /// Target-class pixels inside the enlarged crop.
    pub target_points: usize,
}

impl ObstructionMetrics {
    fn unavailable(target_points: usize) -> Self {
        Self {
            area_m2: 0.0,
            volume_m3: 0.0,
            plane_source: PlaneSource::Unavailable,
            target_points,
        }
    }
}

/// Area and volume of one obstruction above the reference plane.
#[derive(Clone, Debug)]
pub struct VolumetricEstimator<D> {
    depth: D,
    params: EstimatorParams,
}

impl<D: DepthEstimator> VolumetricEstimator<D> {
    pub fn new(depth: D, params: EstimatorParams) -> Self {
        Self { depth, params }
    }

    pub fn params(&self) -> &EstimatorParams {
        &self.params
    }

    /// Estimate the obstruction inside `bbox`.
    ///
    /// `plane` is the plane carried over from the previous detection. It is
    /// replaced whenever a new plane is fitted and left alone otherwise, so
    /// callers thread the same `Option` through all detections of a frame.
    #[allow(clippy::too_many_arguments)]
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(class = class_name, bbox = ?bbox))
    )]
    pub fn estimate(
        &self,
        image: &RgbImage,
        mask: &ClassMask,
        registry: &ClassRegistry,
        bbox: PixelBox,
        class_name: &str,
        scale: ScaleRatio,
        plane: &mut Option<PlaneModel>,
    ) -> Result<ObstructionMetrics, EstimateError> {
        if !scale.is_valid() {
            return Err(EstimateError::InvalidScale(scale));
        }
        let target = registry
            .code(class_name)
            .ok_or_else(|| EstimateError::UnknownClass(class_name.to_string()))?;
        let reference = registry.code(&self.params.reference_class);
        if reference.is_none() {
            log::debug!(
                "reference class {:?} not registered, no plane can be fitted",
                self.params.reference_class
            );
        }

        let (w, h) = image.dimensions();
        if (mask.width, mask.height) != (w as usize, h as usize) {
            return Err(EstimateError::ShapeMismatch {
                what: "class mask",
                expected_w: w as usize,
                expected_h: h as usize,
                got_w: mask.width,
                got_h: mask.height,
            });
        }

        let region = bbox.enlarge(self.params.width_margin, self.params.height_margin, w, h);
        if !region.is_valid() {
            log::warn!("{class_name} box {bbox:?} is empty inside the {w}x{h} frame");
            return Ok(ObstructionMetrics::unavailable(0));
        }

        let crop = imageops::crop_imm(
            image,
            region.x1 as u32,
            region.y1 as u32,
            region.width() as u32,
            region.height() as u32,
        )
        .to_image();
        let mask_crop = mask.crop(region);
        let depth = self
            .depth
            .estimate_depth(&crop, region)
            .map_err(EstimateError::Depth)?;

        let clouds = ClassClouds::from_crop(&mask_crop, &depth, &crop, target, reference)?;

        let fitted = if clouds.reference.len() > 3 {
            fit_plane(&clouds.reference.points, &self.params.plane)
        } else {
            None
        };

        let (model, source, cloud) = match (fitted, *plane) {
            (Some(model), _) => {
                let aligned = project_cloud(&model, &clouds.reference);
                let smoothed =
                    smooth_class_cloud(&clouds.target, &aligned, &self.params.smoothing);
                *plane = Some(model);
                (model, PlaneSource::Fitted, smoothed)
            }
            (None, Some(model)) => {
                log::debug!(
                    "{} reference points in {:?}, reusing previous plane",
                    clouds.reference.len(),
                    region
                );
                (model, PlaneSource::Reused, clouds.target)
            }
            (None, None) => {
                log::info!(
                    "no reference plane for {class_name} in {region:?}, reporting zero metrics"
                );
                return Ok(ObstructionMetrics::unavailable(clouds.target.len()));
            }
        };

        let voxel = scale.pixel_area() * scale.z_res();
        let volume_m3: f64 = cloud
            .points
            .iter()
            .map(|p| voxel * distance_to_plane(&model, p))
            .sum();
        let area_m2 = cloud.len() as f64 * scale.pixel_area();

        log::debug!(
            "{class_name} {bbox:?}: {} px, area {area_m2:.3} m2, volume {volume_m3:.3} m3 ({source:?})",
            cloud.len()
        );

        Ok(ObstructionMetrics {
            area_m2,
            volume_m3,
            plane_source: source,
            target_points: cloud.len(),
        })
    }
}

/// Single-shot estimate with default parameters and no carried-over plane.
///
/// Returns `(area_m2, volume_m3)`.
pub fn estimate_metrics<D: DepthEstimator>(
    image: &RgbImage,
    bbox: PixelBox,
    mask: &ClassMask,
    registry: &ClassRegistry,
    class_name: &str,
    scale: ScaleRatio,
    depth: D,
) -> Result<(f64, f64), EstimateError> {
    let estimator = VolumetricEstimator::new(depth, EstimatorParams::default());
    let mut plane = None;
    let m = estimator.estimate(image, mask, registry, bbox, class_name, scale, &mut plane)?;
    Ok((m.area_m2, m.volume_m3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MapDepth;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use trashrack_core::DepthMap;

    const BARRAGEM: u8 = 1;
    const MACROFITA: u8 = 3;

    fn registry() -> ClassRegistry {
        ClassRegistry::from_names(["barragem", "coluna", "macrofita"]).unwrap()
    }

    fn scale() -> ScaleRatio {
        ScaleRatio::new(0.1, 0.1)
    }

    /// Square target block at depth 2 inside a flat reference area at depth 0.
    fn bump_scene(with_reference: bool) -> (RgbImage, ClassMask, MapDepth) {
        let image = RgbImage::new(40, 40);
        let target = PixelBox::new(10, 10, 20, 20);
        let mut mask = ClassMask::new(40, 40);
        for y in 0..40 {
            for x in 0..40 {
                let inside = (10..20).contains(&x) && (10..20).contains(&y);
                if inside {
                    mask.set(x, y, MACROFITA);
                } else if with_reference {
                    mask.set(x, y, BARRAGEM);
                }
            }
        }
        let depth = DepthMap::from_fn(40, 40, |x, y| {
            if target.x1 as usize <= x && x < target.x2 as usize && (10..20).contains(&y) {
                2.0
            } else {
                0.0
            }
        });
        (image, mask, MapDepth::new(depth))
    }

    #[test]
    fn no_reference_and_no_plane_gives_zero() {
        let image = RgbImage::new(20, 20);
        let mut mask = ClassMask::new(20, 20);
        for i in 0..50 {
            mask.set(5 + i % 10, 5 + i / 10, MACROFITA);
        }
        let depth = MapDepth::new(DepthMap::from_fn(20, 20, |x, _| x as f32));

        let (area, volume) = estimate_metrics(
            &image,
            PixelBox::new(5, 5, 15, 10),
            &mask,
            &registry(),
            "macrofita",
            scale(),
            &depth,
        )
        .unwrap();
        assert_eq!((area, volume), (0.0, 0.0));
    }

    #[test]
    fn fitted_plane_is_stored_for_later_detections() {
        let (image, mask, depth) = bump_scene(true);
        let estimator = VolumetricEstimator::new(depth, EstimatorParams::default());
        let mut plane = None;

        let m = estimator
            .estimate(
                &image,
                &mask,
                &registry(),
                PixelBox::new(10, 10, 20, 20),
                "macrofita",
                scale(),
                &mut plane,
            )
            .unwrap();

        assert_eq!(m.plane_source, PlaneSource::Fitted);
        assert_eq!(m.target_points, 100);
        assert_relative_eq!(m.area_m2, 100.0 * 0.01, epsilon = 1e-12);
        // Smoothing only pulls points towards the plane.
        assert!(m.volume_m3 > 0.0);
        assert!(m.volume_m3 <= 100.0 * 0.001 * 2.0 + 1e-9);

        let fitted = plane.unwrap();
        assert_relative_eq!(fitted.normal.z.abs(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(fitted.d, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn previous_plane_is_reused_without_reference_pixels() {
        let (image, mask, depth) = bump_scene(false);
        let estimator = VolumetricEstimator::new(depth, EstimatorParams::default());
        let floor = PlaneModel::new(Vector3::new(0.0, 0.0, 1.0), 0.0);
        let mut plane = Some(floor);

        let m = estimator
            .estimate(
                &image,
                &mask,
                &registry(),
                PixelBox::new(10, 10, 20, 20),
                "macrofita",
                scale(),
                &mut plane,
            )
            .unwrap();

        assert_eq!(m.plane_source, PlaneSource::Reused);
        assert_eq!(plane, Some(floor));
        // Raw target cloud: 100 px, each 2 units above the plane.
        assert_relative_eq!(m.volume_m3, 100.0 * 0.1 * 0.1 * 0.1 * 2.0, epsilon = 1e-12);
        assert_relative_eq!(m.area_m2, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn depth_map_of_another_frame_is_a_shape_mismatch() {
        let (image, mask, _) = bump_scene(true);
        let small = MapDepth::new(DepthMap::from_fn(12, 12, |_, _| 0.0));
        let estimator = VolumetricEstimator::new(small, EstimatorParams::default());

        let err = estimator
            .estimate(
                &image,
                &mask,
                &registry(),
                PixelBox::new(10, 10, 20, 20),
                "macrofita",
                scale(),
                &mut None,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            EstimateError::ShapeMismatch {
                what: "depth map",
                ..
            }
        ));
    }

    #[test]
    fn metrics_are_never_negative() {
        let (image, mask, depth) = bump_scene(true);
        let estimator = VolumetricEstimator::new(depth, EstimatorParams::default());
        let mut plane = None;
        for bbox in [
            PixelBox::new(0, 0, 40, 40),
            PixelBox::new(12, 12, 14, 14),
            PixelBox::new(30, 30, 39, 39),
        ] {
            let m = estimator
                .estimate(&image, &mask, &registry(), bbox, "macrofita", scale(), &mut plane)
                .unwrap();
            assert!(m.area_m2 >= 0.0 && m.volume_m3 >= 0.0);
        }
    }

    #[test]
    fn configuration_errors() {
        let (image, mask, depth) = bump_scene(true);
        let estimator = VolumetricEstimator::new(&depth, EstimatorParams::default());
        let mut plane = None;
        let bbox = PixelBox::new(10, 10, 20, 20);

        assert!(matches!(
            estimator.estimate(&image, &mask, &registry(), bbox, "sedimento", scale(), &mut plane),
            Err(EstimateError::UnknownClass(name)) if name == "sedimento"
        ));
        assert!(matches!(
            estimator.estimate(
                &image,
                &mask,
                &registry(),
                bbox,
                "macrofita",
                ScaleRatio::new(0.0, 0.1),
                &mut plane
            ),
            Err(EstimateError::InvalidScale(_))
        ));
        assert!(matches!(
            estimator.estimate(
                &image,
                &ClassMask::new(39, 40),
                &registry(),
                bbox,
                "macrofita",
                scale(),
                &mut plane
            ),
            Err(EstimateError::ShapeMismatch { what: "class mask", .. })
        ));
    }

    #[test]
    fn params_round_trip_through_json() {
        let p: EstimatorParams =
            serde_json::from_str(r#"{"width_margin":0.3,"smoothing":{"neighbours":12}}"#).unwrap();
        assert_eq!(p.width_margin, 0.3);
        assert_eq!(p.height_margin, 0.1);
        assert_eq!(p.reference_class, "barragem");
        assert_eq!(p.smoothing.neighbours, 12);
    }
}
