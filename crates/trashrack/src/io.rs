//! JSON configuration, detection hand-off files and image helpers.

use std::{fs, path::Path};

use image::{DynamicImage, GrayImage, ImageReader, RgbImage};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use trashrack_core::{ClassMask, ClassRegistry, DepthMap, Detection, PixelBox, ScaleRatio};
use trashrack_rectify::SectionPlan;

use crate::pipeline::{MetricsReport, PipelineParams};

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("{0}x{1} buffer does not match its pixel data")]
    BufferShape(u32, u32),
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigIoError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), ConfigIoError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Pipeline configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub params: PipelineParams,
}

impl PipelineConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        read_json(path.as_ref())
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        write_json(self, path.as_ref())
    }
}

/// Detections exchanged with an external segmentation step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionsFile {
    pub classes: ClassRegistry,
    pub detections: Vec<Detection>,
}

impl DetectionsFile {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        read_json(path.as_ref())
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        write_json(self, path.as_ref())
    }

    pub fn boxes_of(&self, class_name: &str) -> Vec<PixelBox> {
        self.detections
            .iter()
            .filter(|d| d.class_name == class_name)
            .map(|d| d.bbox)
            .collect()
    }
}

/// Scale and section layout written next to a rectified frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectifyReport {
    pub scale: ScaleRatio,
    pub plan: SectionPlan,
}

impl RectifyReport {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        read_json(path.as_ref())
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        write_json(self, path.as_ref())
    }
}

impl MetricsReport {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        read_json(path.as_ref())
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        write_json(self, path.as_ref())
    }
}

pub fn load_rgb(path: impl AsRef<Path>) -> Result<RgbImage, ConfigIoError> {
    Ok(ImageReader::open(path)?.decode()?.to_rgb8())
}

/// Read a class mask stored as an 8-bit grayscale image of class codes.
pub fn load_class_mask(path: impl AsRef<Path>) -> Result<ClassMask, ConfigIoError> {
    let gray = ImageReader::open(path)?.decode()?.to_luma8();
    let (w, h) = gray.dimensions();
    ClassMask::from_raw(w as usize, h as usize, gray.into_raw())
        .ok_or(ConfigIoError::BufferShape(w, h))
}

pub fn write_class_mask(mask: &ClassMask, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
    let (w, h) = (mask.width as u32, mask.height as u32);
    let gray =
        GrayImage::from_raw(w, h, mask.data.clone()).ok_or(ConfigIoError::BufferShape(w, h))?;
    gray.save(path)?;
    Ok(())
}

/// Read a relative depth image.
///
/// 16-bit grayscale keeps its full range; anything else is converted to
/// 8-bit grayscale. Values are used as-is.
pub fn load_depth(path: impl AsRef<Path>) -> Result<DepthMap, ConfigIoError> {
    let img = ImageReader::open(path)?.decode()?;
    let (w, h) = (img.width(), img.height());
    let data: Vec<f32> = match img {
        DynamicImage::ImageLuma16(buf) => buf.into_raw().into_iter().map(f32::from).collect(),
        other => other
            .to_luma8()
            .into_raw()
            .into_iter()
            .map(f32::from)
            .collect(),
    };
    DepthMap::from_raw(w as usize, h as usize, data).ok_or(ConfigIoError::BufferShape(w, h))
}
