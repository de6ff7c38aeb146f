use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{BinaryMask, PixelBox};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassRegistryError {
    #[error("class registry is full (at most 255 classes besides background)")]
    Full,
    #[error("class code 0 must be \"background\", got {0:?}")]
    BackgroundMismatch(Option<String>),
    #[error("class codes must be contiguous from 0 (missing code {0})")]
    NonContiguous(u8),
}

/// Mapping between segmentation class names and mask codes.
///
/// Code 0 is always `background`; the model's classes get codes 1, 2, ... in
/// the order they are registered. Serialized as a `{ name: code }` map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, u8>",
    into = "BTreeMap<String, u8>"
)]
pub struct ClassRegistry {
    names: Vec<String>,
}

impl ClassRegistry {
    pub const BACKGROUND: &'static str = "background";

    pub fn new() -> Self {
        Self {
            names: vec![Self::BACKGROUND.to_string()],
        }
    }

    /// Registry for a model whose class names enumerate in `names` order.
    pub fn from_names<I, S>(names: I) -> Result<Self, ClassRegistryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        for name in names {
            registry.register(name.as_ref())?;
        }
        Ok(registry)
    }

    /// Return the code for `name`, assigning the next free code if needed.
    pub fn register(&mut self, name: &str) -> Result<u8, ClassRegistryError> {
        if let Some(code) = self.code(name) {
            return Ok(code);
        }
        let code = u8::try_from(self.names.len()).map_err(|_| ClassRegistryError::Full)?;
        self.names.push(name.to_string());
        Ok(code)
    }

    pub fn code(&self, name: &str) -> Option<u8> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| u8::try_from(i).ok())
    }

    pub fn name(&self, code: u8) -> Option<&str> {
        self.names.get(code as usize).map(String::as_str)
    }

    /// Number of codes including background.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.len() <= 1
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u8)> + '_ {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i as u8))
    }

    /// Codes for every name in `names` that is registered.
    pub fn codes_for<S: AsRef<str>>(&self, names: &[S]) -> Vec<u8> {
        names.iter().filter_map(|n| self.code(n.as_ref())).collect()
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<BTreeMap<String, u8>> for ClassRegistry {
    type Error = ClassRegistryError;

    fn try_from(map: BTreeMap<String, u8>) -> Result<Self, Self::Error> {
        let mut by_code: BTreeMap<u8, String> = BTreeMap::new();
        for (name, code) in map {
            by_code.insert(code, name);
        }
        if by_code.get(&0).map(String::as_str) != Some(Self::BACKGROUND) {
            return Err(ClassRegistryError::BackgroundMismatch(by_code.remove(&0)));
        }
        let mut names = Vec::with_capacity(by_code.len());
        for (expected, (code, name)) in by_code.into_iter().enumerate() {
            if code as usize != expected {
                return Err(ClassRegistryError::NonContiguous(expected as u8));
            }
            names.push(name);
        }
        Ok(Self { names })
    }
}

impl From<ClassRegistry> for BTreeMap<String, u8> {
    fn from(r: ClassRegistry) -> Self {
        r.names
            .into_iter()
            .enumerate()
            .map(|(i, n)| (n, i as u8))
            .collect()
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("mask is {got_w}x{got_h}, expected {expected_w}x{expected_h}")]
pub struct MaskShapeError {
    pub expected_w: usize,
    pub expected_h: usize,
    pub got_w: usize,
    pub got_h: usize,
}

/// Per-pixel class codes for a whole frame (row-major, `0` = background).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassMask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl ClassMask {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Option<Self> {
        (data.len() == width * height).then_some(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, code: u8) {
        self.data[y * self.width + x] = code;
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Paint an instance mask with `code`.
    ///
    /// Pixels that already hold one of the `protected` codes keep it, so the
    /// first obstruction painted on a pixel wins over anything painted later.
    pub fn paint(
        &mut self,
        mask: &BinaryMask,
        code: u8,
        protected: &[u8],
    ) -> Result<usize, MaskShapeError> {
        if mask.width != self.width || mask.height != self.height {
            return Err(MaskShapeError {
                expected_w: self.width,
                expected_h: self.height,
                got_w: mask.width,
                got_h: mask.height,
            });
        }
        let mut painted = 0usize;
        for (dst, &on) in self.data.iter_mut().zip(mask.data.iter()) {
            if on && !protected.contains(&*dst) {
                *dst = code;
                painted += 1;
            }
        }
        Ok(painted)
    }

    /// Copy out the region covered by `region` (clamped to the mask).
    pub fn crop(&self, region: PixelBox) -> ClassMask {
        let r = region.clamp_to(self.width as u32, self.height as u32);
        let w = r.width().max(0) as usize;
        let h = r.height().max(0) as usize;
        let mut data = Vec::with_capacity(w * h);
        for y in r.y1 as usize..r.y1 as usize + h {
            let row = y * self.width;
            data.extend_from_slice(&self.data[row + r.x1 as usize..row + r.x1 as usize + w]);
        }
        ClassMask {
            width: w,
            height: h,
            data,
        }
    }

    pub fn count(&self, code: u8) -> usize {
        self.data.iter().filter(|&&c| c == code).count()
    }
}
