use serde::{Deserialize, Serialize};

use crate::{ClassMask, ClassRegistry, MaskShapeError, PixelBox};

/// Per-instance boolean pixel mask, frame-sized and row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryMask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<bool>,
}

impl BinaryMask {
    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> bool) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// A mask that is set exactly inside `region`.
    pub fn from_box(width: usize, height: usize, region: PixelBox) -> Self {
        let r = region.clamp_to(width as u32, height as u32);
        Self::from_fn(width, height, |x, y| {
            let (x, y) = (x as i32, y as i32);
            x >= r.x1 && x < r.x2 && y >= r.y1 && y < r.y2
        })
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x]
    }
}

/// One instance reported by the segmentation collaborator.
#[derive(Clone, Debug)]
pub struct SegmentedInstance {
    pub class_name: String,
    pub bbox: PixelBox,
    pub mask: BinaryMask,
    pub confidence: f32,
}

/// Segmentation output for one frame: the class registry used to encode
/// masks plus every detected instance.
#[derive(Clone, Debug, Default)]
pub struct Segmentation {
    pub classes: ClassRegistry,
    pub instances: Vec<SegmentedInstance>,
}

impl Segmentation {
    /// Boxes of every instance of `class_name`, in detection order.
    pub fn boxes_of(&self, class_name: &str) -> Vec<PixelBox> {
        self.instances
            .iter()
            .filter(|i| i.class_name == class_name)
            .map(|i| i.bbox)
            .collect()
    }

    /// Drop instances whose confidence is below the threshold returned by
    /// `min_confidence` for their class.
    pub fn retain_confident(&mut self, min_confidence: impl Fn(&str) -> Option<f32>) {
        self.instances.retain(|inst| match min_confidence(&inst.class_name) {
            Some(min) => inst.confidence >= min,
            None => true,
        });
    }

    /// Paint every instance into a frame-sized class mask, in detection order.
    ///
    /// Instances whose class is missing from the registry are skipped.
    pub fn class_mask(
        &self,
        width: usize,
        height: usize,
        protected_classes: &[String],
    ) -> Result<ClassMask, MaskShapeError> {
        let protected = self.classes.codes_for(protected_classes);
        let mut mask = ClassMask::new(width, height);
        for inst in &self.instances {
            let Some(code) = self.classes.code(&inst.class_name) else {
                log::warn!("class {:?} is not registered; skipping", inst.class_name);
                continue;
            };
            mask.paint(&inst.mask, code, &protected)?;
        }
        Ok(mask)
    }
}

/// A measured obstruction instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    #[serde(rename = "box")]
    pub bbox: PixelBox,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_m2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_m3: Option<f64>,
}

impl Detection {
    pub fn new(class_name: impl Into<String>, bbox: PixelBox, confidence: f32) -> Self {
        Self {
            class_name: class_name.into(),
            bbox,
            confidence,
            area_m2: None,
            volume_m3: None,
        }
    }

    pub fn with_metrics(mut self, area_m2: f64, volume_m3: f64) -> Self {
        self.area_m2 = Some(area_m2);
        self.volume_m3 = Some(volume_m3);
        self
    }
}

impl From<&SegmentedInstance> for Detection {
    fn from(inst: &SegmentedInstance) -> Self {
        Detection::new(inst.class_name.clone(), inst.bbox, inst.confidence)
    }
}
