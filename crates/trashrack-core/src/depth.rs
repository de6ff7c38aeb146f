use crate::PixelBox;

/// Relative depth values, row-major. Units are whatever the depth
/// collaborator produces; only the ordering and local shape are meaningful.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthMap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl DepthMap {
    pub fn from_raw(width: usize, height: usize, data: Vec<f32>) -> Option<Self> {
        (data.len() == width * height).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> f32) -> Self {
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

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Copy out `region`, clamped to the map.
    pub fn crop(&self, region: PixelBox) -> DepthMap {
        let r = region.clamp_to(self.width as u32, self.height as u32);
        let (x0, y0) = (r.x1 as usize, r.y1 as usize);
        let w = r.width().max(0) as usize;
        let h = r.height().max(0) as usize;
        let mut data = Vec::with_capacity(w * h);
        for y in y0..y0 + h {
            let row = y * self.width;
            data.extend_from_slice(&self.data[row + x0..row + x0 + w]);
        }
        DepthMap {
            width: w,
            height: h,
            data,
        }
    }
}
