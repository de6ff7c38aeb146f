//! End-to-end obstruction metrics for one trash-rack frame.

use std::collections::BTreeMap;

use image::RgbImage;
use serde::{Deserialize, Serialize, Serializer};
use trashrack_core::{
    BarrierDimensions, ClassMask, ClassRegistry, Detection, MaskShapeError, ScaleRatio,
    Segmentation,
};
use trashrack_rectify::{rectify, RectifiedBarrier, RectifyError};
use trashrack_volume::{
    DepthEstimator, EstimateError, EstimatorParams, PlaneSource, VolumetricEstimator,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Failure reported by a segmentation collaborator.
pub type SegmentError = Box<dyn std::error::Error + Send + Sync>;

/// Instance segmentation of a full frame.
///
/// Implementations must report the same [`ClassRegistry`] for every frame of
/// one run.
pub trait Segmenter {
    fn segment(&self, image: &RgbImage) -> Result<Segmentation, SegmentError>;
}

impl<T: Segmenter + ?Sized> Segmenter for &T {
    fn segment(&self, image: &RgbImage) -> Result<Segmentation, SegmentError> {
        (**self).segment(image)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("segmentation of the {pass} frame failed: {source}")]
    Segment {
        pass: &'static str,
        #[source]
        source: SegmentError,
    },
    #[error("segmentation of the {0} frame found no instances")]
    NoInstances(&'static str),
    #[error("class registry changed between segmentation passes")]
    RegistryChanged {
        before: ClassRegistry,
        after: ClassRegistry,
    },
    #[error(transparent)]
    Mask(#[from] MaskShapeError),
    #[error(transparent)]
    Rectify(#[from] RectifyError),
    #[error(transparent)]
    Estimate(#[from] EstimateError),
}

fn default_min_confidence() -> BTreeMap<String, f32> {
    [("macrofita", 0.4), ("sedimento", 0.4)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn obstruction_classes() -> Vec<String> {
    vec!["macrofita".to_string(), "sedimento".to_string()]
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    /// Horizontal meters per pixel of the rectified frame.
    pub x_res: f64,
    pub barrier: BarrierDimensions,
    pub column_class: String,
    /// Class whose largest detection bounds the structure.
    pub structure_class: String,
    /// Classes measured, in this order.
    pub target_classes: Vec<String>,
    /// Measured detections with a smaller area are discarded.
    pub min_area_m2: f64,
    /// Per-class minimum segmentation confidence; absent classes keep all.
    pub min_confidence: BTreeMap<String, f32>,
    /// Classes that keep their mask pixels when later instances overlap.
    pub protected_classes: Vec<String>,
    pub estimator: EstimatorParams,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            x_res: 0.1,
            barrier: BarrierDimensions::default(),
            column_class: "coluna".to_string(),
            structure_class: "barragem".to_string(),
            target_classes: obstruction_classes(),
            min_area_m2: 10.0,
            min_confidence: default_min_confidence(),
            protected_classes: obstruction_classes(),
            estimator: EstimatorParams::default(),
        }
    }
}

impl PipelineParams {
    fn min_confidence_for(&self, class_name: &str) -> Option<f32> {
        self.min_confidence.get(class_name).copied()
    }
}

/// One measured obstruction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObstructionRecord {
    #[serde(flatten)]
    pub detection: Detection,
    pub plane_source: PlaneSource,
    pub target_points: usize,
}

/// A detection whose depth could not be estimated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailedDetection {
    #[serde(flatten)]
    pub detection: Detection,
    pub error: String,
}

/// Serializable result of the measurement stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub classes: ClassRegistry,
    pub scale: Option<ScaleRatio>,
    pub obstructions: Vec<ObstructionRecord>,
    /// Detections measured below the minimum area.
    pub discarded: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailedDetection>,
}

impl MetricsReport {
    pub fn total_area_m2(&self) -> f64 {
        self.obstructions
            .iter()
            .filter_map(|o| o.detection.area_m2)
            .sum()
    }

    pub fn total_volume_m3(&self) -> f64 {
        self.obstructions
            .iter()
            .filter_map(|o| o.detection.volume_m3)
            .sum()
    }
}

/// Everything produced by [`MetricsPipeline::run`].
#[derive(Clone, Debug, Serialize)]
pub struct PipelineReport {
    #[serde(flatten)]
    pub metrics: MetricsReport,
    /// Rectified frame with the rectified first-pass class mask. Only its
    /// section plan is serialized, as `plan`.
    #[serde(rename = "plan", serialize_with = "serialize_plan")]
    pub rectified: RectifiedBarrier,
    /// Class mask of the second segmentation pass, on the rectified frame.
    #[serde(skip)]
    pub rectified_mask: ClassMask,
}

fn serialize_plan<S: Serializer>(
    rectified: &RectifiedBarrier,
    s: S,
) -> Result<S::Ok, S::Error> {
    rectified.plan.serialize(s)
}

/// Measure every detection of the target classes on an already rectified
/// frame.
///
/// Detections below the per-class confidence threshold are skipped. A plane
/// fitted for one detection is carried over to the following ones. Depth
/// failures are recorded per detection; every other error aborts.
#[allow(clippy::too_many_arguments)]
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(detections = detections.len()))
)]
pub fn measure_obstructions<D: DepthEstimator>(
    image: &RgbImage,
    mask: &ClassMask,
    classes: &ClassRegistry,
    detections: &[Detection],
    scale: ScaleRatio,
    depth: D,
    params: &PipelineParams,
) -> Result<MetricsReport, PipelineError> {
    let estimator = VolumetricEstimator::new(depth, params.estimator.clone());
    let mut report = MetricsReport {
        classes: classes.clone(),
        scale: Some(scale),
        ..MetricsReport::default()
    };
    let mut plane = None;

    for class_name in &params.target_classes {
        let min_confidence = params.min_confidence_for(class_name);
        let mut of_class: Vec<&Detection> = detections
            .iter()
            .filter(|d| &d.class_name == class_name)
            .collect();
        if of_class.is_empty() {
            log::warn!("no {class_name} detections in the rectified frame");
            continue;
        }
        if let Some(min) = min_confidence {
            let before = of_class.len();
            of_class.retain(|d| d.confidence >= min);
            if of_class.len() < before {
                log::debug!(
                    "{} of {before} {class_name} detections below confidence {min}",
                    before - of_class.len()
                );
            }
        }

        for det in of_class {
            let m = match estimator.estimate(
                image,
                mask,
                classes,
                det.bbox,
                class_name,
                scale,
                &mut plane,
            ) {
                Ok(m) => m,
                Err(EstimateError::Depth(err)) => {
                    log::warn!("depth failed for {class_name} {:?}: {err}", det.bbox);
                    report.failures.push(FailedDetection {
                        detection: det.clone(),
                        error: err.to_string(),
                    });
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            if m.area_m2 < params.min_area_m2 {
                log::debug!(
                    "discarding {class_name} {:?}: {:.2} m2 < {:.2} m2",
                    det.bbox,
                    m.area_m2,
                    params.min_area_m2
                );
                report.discarded += 1;
                continue;
            }

            report.obstructions.push(ObstructionRecord {
                detection: det.clone().with_metrics(m.area_m2, m.volume_m3),
                plane_source: m.plane_source,
                target_points: m.target_points,
            });
        }
    }

    log::info!(
        "{} obstructions measured ({} discarded, {} failed), {:.2} m2 / {:.2} m3",
        report.obstructions.len(),
        report.discarded,
        report.failures.len(),
        report.total_area_m2(),
        report.total_volume_m3()
    );
    Ok(report)
}

/// Segment, rectify, re-segment and measure one frame.
#[derive(Clone, Debug, Default)]
pub struct MetricsPipeline {
    params: PipelineParams,
}

impl MetricsPipeline {
    pub fn new(params: PipelineParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    fn segment<S: Segmenter>(
        &self,
        segmenter: &S,
        image: &RgbImage,
        pass: &'static str,
    ) -> Result<Segmentation, PipelineError> {
        let mut seg = segmenter
            .segment(image)
            .map_err(|source| PipelineError::Segment { pass, source })?;
        let before = seg.instances.len();
        seg.retain_confident(|c| self.params.min_confidence_for(c));
        log::debug!(
            "{pass} frame: {} instances, {} kept after confidence filtering",
            before,
            seg.instances.len()
        );
        if seg.instances.is_empty() {
            return Err(PipelineError::NoInstances(pass));
        }
        Ok(seg)
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip_all,
            fields(width = image.width(), height = image.height())
        )
    )]
    pub fn run<S: Segmenter, D: DepthEstimator>(
        &self,
        image: &RgbImage,
        segmenter: &S,
        depth: D,
    ) -> Result<PipelineReport, PipelineError> {
        let p = &self.params;
        let (w, h) = image.dimensions();

        let first = self.segment(segmenter, image, "original")?;
        let columns = first.boxes_of(&p.column_class);
        let structures = first.boxes_of(&p.structure_class);
        let mask = first.class_mask(w as usize, h as usize, &p.protected_classes)?;

        let rectified = rectify(image, Some(&mask), &columns, &structures, p.barrier, p.x_res)?;

        let second = self.segment(segmenter, &rectified.image, "rectified")?;
        if second.classes != first.classes {
            return Err(PipelineError::RegistryChanged {
                before: first.classes,
                after: second.classes,
            });
        }
        let (rw, rh) = rectified.image.dimensions();
        let rectified_mask = second.class_mask(rw as usize, rh as usize, &p.protected_classes)?;

        let detections: Vec<Detection> = second.instances.iter().map(Detection::from).collect();
        let metrics = measure_obstructions(
            &rectified.image,
            &rectified_mask,
            &second.classes,
            &detections,
            rectified.scale,
            depth,
            p,
        )?;

        Ok(PipelineReport {
            metrics,
            rectified,
            rectified_mask,
        })
    }
}
