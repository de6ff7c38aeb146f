use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use serde::{Deserialize, Serialize};

/// Implicit plane `normal · p + d = 0`.
///
/// Planes produced by [`fit_plane`] carry a unit normal; hand-built planes
/// need not, projection divides by `|normal|²`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneModel {
    pub normal: Vector3<f64>,
    pub d: f64,
}

impl PlaneModel {
    pub fn new(normal: Vector3<f64>, d: f64) -> Self {
        Self { normal, d }
    }

    /// Signed algebraic distance `normal · p + d` (true distance only for a
    /// unit normal).
    #[inline]
    pub fn evaluate(&self, p: &[f64; 3]) -> f64 {
        self.normal.dot(&Vector3::from(*p)) + self.d
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneFitParams {
    /// Number of bins along each of X and Y used to pick the lowest point of
    /// every cell as a plane candidate.
    pub cells_per_side: usize,
}

impl Default for PlaneFitParams {
    fn default() -> Self {
        Self { cells_per_side: 10 }
    }
}

/// Lowest-depth point of every occupied XY bin.
///
/// A bin index of `(p - min) / step` reaches `cells_per_side` for points on
/// the max edge, so the grid carries one extra row and column. When either
/// axis has no extent every point is a candidate.
pub fn plane_candidates(points: &[[f64; 3]], params: &PlaneFitParams) -> Vec<[f64; 3]> {
    let n = params.cells_per_side.max(1);
    if points.is_empty() {
        return Vec::new();
    }

    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for p in points {
        min_x = min_x.min(p[0]);
        max_x = max_x.max(p[0]);
        min_y = min_y.min(p[1]);
        max_y = max_y.max(p[1]);
    }

    let step_x = (max_x - min_x) / n as f64;
    let step_y = (max_y - min_y) / n as f64;
    if step_x == 0.0 || step_y == 0.0 {
        return points.to_vec();
    }

    let side = n + 1;
    let mut bins: Vec<Option<[f64; 3]>> = vec![None; side * side];
    for p in points {
        let ix = (((p[0] - min_x) / step_x) as usize).min(n);
        let iy = (((p[1] - min_y) / step_y) as usize).min(n);
        let idx = iy * side + ix;
        let lower = match bins[idx] {
            Some(best) => p[2] < best[2],
            None => true,
        };
        if lower {
            bins[idx] = Some(*p);
        }
    }

    bins.into_iter().flatten().collect()
}

/// Fit a plane to the lowest points of `points`.
///
/// The normal is the eigenvector of the smallest eigenvalue of the
/// candidates' covariance. Returns `None` with fewer than three candidates or
/// a degenerate covariance.
pub fn fit_plane(points: &[[f64; 3]], params: &PlaneFitParams) -> Option<PlaneModel> {
    let candidates = plane_candidates(points, params);
    if candidates.len() < 3 {
        log::debug!("plane fit: only {} candidates", candidates.len());
        return None;
    }

    let count = candidates.len() as f64;
    let centroid = candidates
        .iter()
        .fold(Vector3::<f64>::zeros(), |acc, p| acc + Vector3::from(*p))
        / count;

    let mut cov = Matrix3::<f64>::zeros();
    for p in &candidates {
        let r = Vector3::from(*p) - centroid;
        cov += r * r.transpose();
    }
    cov /= count;
    if cov.iter().any(|v| !v.is_finite()) {
        log::debug!("plane fit: non-finite covariance");
        return None;
    }

    let eig = SymmetricEigen::new(cov);
    let mut min_idx = 0;
    for i in 1..3 {
        if eig.eigenvalues[i] < eig.eigenvalues[min_idx] {
            min_idx = i;
        }
    }
    let normal: Vector3<f64> = eig.eigenvectors.column(min_idx).into_owned();
    let norm = normal.norm();
    if !norm.is_finite() || norm < 1e-12 {
        return None;
    }
    let normal = normal / norm;

    Some(PlaneModel {
        normal,
        d: -normal.dot(&centroid),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tilted_plane() -> Vec<[f64; 3]> {
        let mut pts = Vec::new();
        for y in 0..20 {
            for x in 0..30 {
                let (x, y) = (x as f64, y as f64);
                pts.push([x, y, 2.0 * x + 3.0 * y + 5.0]);
            }
        }
        pts
    }

    #[test]
    fn recovers_a_tilted_plane() {
        let plane = fit_plane(&tilted_plane(), &PlaneFitParams::default()).unwrap();
        let expected = Vector3::new(2.0, 3.0, -1.0).normalize();

        assert_relative_eq!(plane.normal.norm(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(plane.normal.cross(&expected).norm(), 0.0, epsilon = 1e-6);
        for p in tilted_plane().iter().step_by(37) {
            assert_relative_eq!(plane.evaluate(p), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn keeps_the_lowest_point_per_bin() {
        let mut pts = tilted_plane();
        // A bump far above the plane must not survive binning.
        pts.push([10.0, 10.0, 500.0]);
        let candidates = plane_candidates(&pts, &PlaneFitParams::default());
        assert!(candidates.len() <= 11 * 11);
        assert!(candidates.iter().all(|p| p[2] < 500.0));
    }

    #[test]
    fn collinear_extent_uses_all_points() {
        let pts: Vec<[f64; 3]> = (0..8).map(|i| [i as f64, 4.0, 1.0]).collect();
        assert_eq!(plane_candidates(&pts, &PlaneFitParams::default()).len(), 8);
    }

    #[test]
    fn too_few_candidates_is_not_a_fit() {
        assert!(fit_plane(&[], &PlaneFitParams::default()).is_none());
        assert!(fit_plane(&[[0.0, 0.0, 0.0], [1.0, 1.0, 0.0]], &PlaneFitParams::default()).is_none());
    }

    #[test]
    fn params_deserialize_with_defaults() {
        let p: PlaneFitParams = serde_json::from_str("{}").unwrap();
        assert_eq!(p, PlaneFitParams::default());
    }
}
