//! Obstruction area and volume from a single frame.
//!
//! The pieces, bottom up:
//! - [`ClassClouds`] lifts target and reference pixels of a crop into
//!   `(column, row, depth)` point clouds,
//! - [`fit_plane`] fits the reference plane to the lowest reference points,
//! - [`project`] / [`project_cloud`] drop points onto that plane,
//! - [`smooth_class_cloud`] averages target points with their neighbours,
//! - [`VolumetricEstimator`] ties them together behind a [`DepthEstimator`].
//!
//! Depth is relative; volumes are integrated with
//! [`ScaleRatio::z_res`](trashrack_core::ScaleRatio::z_res) and are only
//! comparable between frames with the same depth collaborator.

mod cloud;
mod depth;
mod error;
mod estimator;
mod plane;
mod projection;
mod smoothing;

pub use cloud::{ClassClouds, PointCloud};
pub use depth::{DepthError, DepthEstimator, MapDepth};
pub use error::EstimateError;
pub use estimator::{
    estimate_metrics, EstimatorParams, ObstructionMetrics, PlaneSource, VolumetricEstimator,
};
pub use plane::{fit_plane, plane_candidates, PlaneFitParams, PlaneModel};
pub use projection::{distance_to_plane, project, project_cloud, Projection};
pub use smoothing::{smooth_class_cloud, SmoothingParams};
