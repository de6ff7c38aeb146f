//! Core types for trash-rack obstruction metrics.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete image type, segmentation model or depth model:
//! - [`PixelBox`] and the box helpers ([`filter_colliding`], [`largest`]),
//! - [`ClassRegistry`] / [`ClassMask`] for per-pixel class codes,
//! - [`DepthMap`] for relative depth produced by a depth model,
//! - [`BarrierDimensions`] / [`ScaleRatio`] for the physical scale,
//! - [`Segmentation`] / [`Detection`] exchanged with the collaborators.

mod barrier;
mod boxes;
mod class_mask;
mod depth;
mod detection;
mod logger;

pub use barrier::{BarrierDimensions, ScaleRatio};
pub use boxes::{filter_colliding, largest, PixelBox};
pub use class_mask::{ClassMask, ClassRegistry, ClassRegistryError, MaskShapeError};
pub use depth::DepthMap;
pub use detection::{BinaryMask, Detection, SegmentedInstance, Segmentation};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_env, init_with_level, LOG_ENV};
