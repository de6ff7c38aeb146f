//! High-level facade for the `trashrack-*` workspace.
//!
//! This crate provides:
//! - re-exports of the core, rectification and volume crates,
//! - [`MetricsPipeline`], which runs segment → rectify → re-segment →
//!   measure on one frame behind the [`Segmenter`] and
//!   [`DepthEstimator`](volume::DepthEstimator) collaborator traits,
//! - JSON and image helpers in [`io`] used by the `trashrack` CLI.
//!
//! ## Quickstart
//!
//! ```no_run
//! use trashrack::io::{load_depth, load_rgb};
//! use trashrack::volume::MapDepth;
//! use trashrack::{MetricsPipeline, PipelineParams, Segmenter, SegmentError};
//! use trashrack::core::Segmentation;
//!
//! struct MyModel;
//! impl Segmenter for MyModel {
//!     fn segment(&self, _image: &image::RgbImage) -> Result<Segmentation, SegmentError> {
//!         unimplemented!("run your instance segmentation model here")
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let frame = load_rgb("frame.png")?;
//! let depth = MapDepth::new(load_depth("depth.png")?);
//! let pipeline = MetricsPipeline::new(PipelineParams::default());
//! let report = pipeline.run(&frame, &MyModel, &depth)?;
//! println!("{:.1} m3 blocked", report.metrics.total_volume_m3());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `trashrack::core`: boxes, class registry and masks, depth maps, scale.
//! - `trashrack::rectify`: column/grid sections and piecewise rectification.
//! - `trashrack::volume`: plane fitting, smoothing and volume integration.

pub use trashrack_core as core;
pub use trashrack_rectify as rectify;
pub use trashrack_volume as volume;

pub use trashrack_core::{
    BarrierDimensions, ClassMask, ClassRegistry, Detection, PixelBox, ScaleRatio, Segmentation,
};
pub use trashrack_rectify::{BarrierRectifier, RectifiedBarrier, RectifyError};
pub use trashrack_volume::{EstimateError, ObstructionMetrics, PlaneSource, VolumetricEstimator};

pub mod io;
mod pipeline;

pub use io::{ConfigIoError, DetectionsFile, PipelineConfig, RectifyReport};
pub use pipeline::{
    measure_obstructions, FailedDetection, MetricsPipeline, MetricsReport, ObstructionRecord,
    PipelineError, PipelineParams, PipelineReport, SegmentError, Segmenter,
};
