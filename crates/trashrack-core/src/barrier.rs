use serde::{Deserialize, Serialize};

/// Physical measurements of the retention structure, in meters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BarrierDimensions {
    /// Width of one open grid cell between two columns.
    #[serde(rename = "grid_width")]
    pub grid_width_m: f64,
    /// Height of the whole structure.
    #[serde(rename = "grid_height")]
    pub grid_height_m: f64,
    /// Width of one support column.
    #[serde(rename = "column_width")]
    pub column_width_m: f64,
}

impl BarrierDimensions {
    pub fn new(grid_width_m: f64, grid_height_m: f64, column_width_m: f64) -> Self {
        Self {
            grid_width_m,
            grid_height_m,
            column_width_m,
        }
    }

    /// All three measurements are finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        [self.grid_width_m, self.grid_height_m, self.column_width_m]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }
}

impl Default for BarrierDimensions {
    /// Measurements of the reference installation.
    fn default() -> Self {
        Self::new(15.618, 40.0, 5.232)
    }
}

/// Meters per pixel along the rectified image axes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScaleRatio {
    pub x_res: f64,
    pub y_res: f64,
}

impl ScaleRatio {
    pub fn new(x_res: f64, y_res: f64) -> Self {
        Self { x_res, y_res }
    }

    /// Depth resolution used for volume integration.
    ///
    /// Monocular depth has no scale of its own, so this is the mean of the
    /// two in-plane resolutions. It is an approximation, not a measurement.
    #[inline]
    pub fn z_res(&self) -> f64 {
        0.5 * (self.x_res + self.y_res)
    }

    /// Nominal ground footprint of one pixel, in square meters.
    #[inline]
    pub fn pixel_area(&self) -> f64 {
        self.x_res * self.y_res
    }

    pub fn is_valid(&self) -> bool {
        self.x_res.is_finite() && self.y_res.is_finite() && self.x_res > 0.0 && self.y_res > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_use_short_json_names() {
        let d: BarrierDimensions =
            serde_json::from_str(r#"{"grid_width":10,"grid_height":40,"column_width":3}"#)
                .unwrap();
        assert_eq!(d, BarrierDimensions::new(10.0, 40.0, 3.0));
        assert!(d.is_valid());
        assert!(!BarrierDimensions::new(10.0, 0.0, 3.0).is_valid());
    }

    #[test]
    fn z_res_is_mean_of_plane_resolutions() {
        let s = ScaleRatio::new(0.1, 0.3);
        assert!((s.z_res() - 0.2).abs() < 1e-12);
        assert!((s.pixel_area() - 0.03).abs() < 1e-12);
    }
}
