use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in integer pixel coordinates.
///
/// Valid boxes satisfy `x1 < x2 && y1 < y2`; `x2`/`y2` are exclusive when the
/// box is used to crop an image. Serialized as `[x1, y1, x2, y2]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct PixelBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl From<[i32; 4]> for PixelBox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<PixelBox> for [i32; 4] {
    fn from(b: PixelBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

impl PixelBox {
    #[inline]
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build a box from floating-point detector output, truncating toward zero.
    pub fn from_xyxy(xyxy: [f32; 4]) -> Self {
        Self::new(
            xyxy[0] as i32,
            xyxy[1] as i32,
            xyxy[2] as i32,
            xyxy[3] as i32,
        )
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// `(x2 - x1) * (y2 - y1)`, widened to avoid overflow on large frames.
    #[inline]
    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }

    /// Boxes that merely touch at an edge count as overlapping.
    #[inline]
    pub fn overlaps(&self, other: &PixelBox) -> bool {
        !(self.x2 < other.x1 || self.x1 > other.x2 || self.y2 < other.y1 || self.y1 > other.y2)
    }

    /// Clamp into `[0, width] x [0, height]`.
    pub fn clamp_to(&self, width: u32, height: u32) -> PixelBox {
        let w = width as i32;
        let h = height as i32;
        PixelBox::new(
            self.x1.clamp(0, w),
            self.y1.clamp(0, h),
            self.x2.clamp(0, w),
            self.y2.clamp(0, h),
        )
    }

    /// Grow the box symmetrically by `dw_frac` of its width on the left and
    /// right and `dh_frac` of its height on top and bottom, clamped to the
    /// image bounds. Offsets truncate toward zero.
    pub fn enlarge(&self, dw_frac: f64, dh_frac: f64, width: u32, height: u32) -> PixelBox {
        let dw = dw_frac * self.width() as f64;
        let dh = dh_frac * self.height() as f64;
        PixelBox::new(
            ((self.x1 as f64 - dw) as i32).max(0),
            ((self.y1 as f64 - dh) as i32).max(0),
            ((self.x2 as f64 + dw) as i32).min(width as i32),
            ((self.y2 as f64 + dh) as i32).min(height as i32),
        )
    }
}

/// The largest-area box; the earliest one wins ties.
pub fn largest(boxes: &[PixelBox]) -> Option<PixelBox> {
    boxes
        .iter()
        .copied()
        .reduce(|best, b| if b.area() > best.area() { b } else { best })
}

/// Collapse overlapping boxes, keeping the largest box of each collision bin.
///
/// Bins are built in one left-to-right scan: a box that is not binned yet
/// opens a new bin, and every later unbinned box overlapping any member of
/// that bin at the time it is visited joins it. This is greedy and
/// order-sensitive; it is not a transitive closure over all overlaps.
pub fn filter_colliding(boxes: &[PixelBox]) -> Vec<PixelBox> {
    let mut binned = vec![false; boxes.len()];
    let mut kept = Vec::new();
    let mut bin: Vec<PixelBox> = Vec::new();

    for i in 0..boxes.len() {
        if binned[i] {
            continue;
        }
        binned[i] = true;
        bin.clear();
        bin.push(boxes[i]);

        for j in (i + 1)..boxes.len() {
            if binned[j] {
                continue;
            }
            if bin.iter().any(|b| b.overlaps(&boxes[j])) {
                binned[j] = true;
                bin.push(boxes[j]);
            }
        }

        if let Some(best) = largest(&bin) {
            if bin.len() > 1 {
                log::debug!(
                    "collision bin of {} boxes collapsed to {:?}",
                    bin.len(),
                    best
                );
            }
            kept.push(best);
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_edges_overlap() {
        let a = PixelBox::new(0, 0, 10, 10);
        let b = PixelBox::new(10, 0, 20, 10);
        let c = PixelBox::new(11, 0, 20, 10);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(!PixelBox::new(0, 0, 5, 5).overlaps(&PixelBox::new(0, 6, 5, 9)));
    }

    #[test]
    fn area_is_width_times_height() {
        assert_eq!(PixelBox::new(50, 20, 70, 100).area(), 20 * 80);
    }

    #[test]
    fn filter_keeps_largest_per_bin() {
        let boxes = [
            PixelBox::new(0, 0, 10, 10),
            PixelBox::new(5, 5, 25, 25),
            PixelBox::new(100, 0, 110, 10),
            PixelBox::new(8, 8, 12, 12),
        ];
        let kept = filter_colliding(&boxes);
        assert_eq!(
            kept,
            vec![PixelBox::new(5, 5, 25, 25), PixelBox::new(100, 0, 110, 10)]
        );
    }

    #[test]
    fn filter_joins_through_members_already_in_bin() {
        // c only touches b, but b joined a's bin before c was visited.
        let a = PixelBox::new(0, 0, 10, 10);
        let b = PixelBox::new(9, 0, 30, 10);
        let c = PixelBox::new(29, 0, 35, 10);
        assert_eq!(filter_colliding(&[a, b, c]), vec![b]);
    }

    #[test]
    fn filter_is_order_sensitive() {
        // c bridges a and b, but b is visited before c joins a's bin.
        let a = PixelBox::new(0, 0, 10, 10);
        let b = PixelBox::new(20, 0, 40, 10);
        let c = PixelBox::new(9, 0, 21, 10);
        assert_eq!(filter_colliding(&[a, b, c]), vec![c, b]);
        assert_eq!(filter_colliding(&[c, a, b]), vec![b]);
    }

    #[test]
    fn filter_is_idempotent() {
        let boxes = [
            PixelBox::new(48, 18, 72, 100),
            PixelBox::new(50, 20, 70, 100),
            PixelBox::new(150, 20, 170, 100),
            PixelBox::new(152, 30, 168, 90),
            PixelBox::new(250, 20, 270, 100),
        ];
        let once = filter_colliding(&boxes);
        let twice = filter_colliding(&once);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
    }

    #[test]
    fn enlarge_is_symmetric_and_clamped() {
        let b = PixelBox::new(20, 10, 40, 30);
        assert_eq!(b.enlarge(0.1, 0.1, 100, 100), PixelBox::new(18, 8, 42, 32));
        assert_eq!(b.enlarge(0.5, 0.1, 100, 100), PixelBox::new(10, 8, 50, 32));

        let edge = PixelBox::new(2, 1, 98, 99);
        assert_eq!(edge.enlarge(0.5, 0.5, 100, 100), PixelBox::new(0, 0, 100, 100));
    }

    #[test]
    fn largest_prefers_first_on_ties() {
        let a = PixelBox::new(0, 0, 10, 10);
        let b = PixelBox::new(50, 50, 60, 60);
        assert_eq!(largest(&[a, b]), Some(a));
        assert_eq!(largest(&[]), None);
    }

    #[test]
    fn serializes_as_xyxy_array() {
        let b = PixelBox::new(1, 2, 3, 4);
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, "[1,2,3,4]");
        let back: PixelBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
    }
}
