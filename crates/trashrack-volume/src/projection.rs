use nalgebra::Vector3;

use crate::{PlaneModel, PointCloud};

/// Orthogonal projection of one point onto a plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub point: [f64; 3],
    /// Euclidean distance between the input point and `point`.
    pub distance: f64,
    /// Signed step along the normal; positive on the side the normal points to.
    pub t: f64,
}

/// `t = (n·p + d) / |n|²`, `projected = p - t·n`.
#[inline]
pub fn project(plane: &PlaneModel, p: &[f64; 3]) -> Projection {
    let n = &plane.normal;
    let v = Vector3::from(*p);
    let t = (n.dot(&v) + plane.d) / n.norm_squared();
    let proj = v - n * t;
    Projection {
        point: proj.into(),
        distance: (proj - v).norm(),
        t,
    }
}

/// Distance of `p` from the plane.
#[inline]
pub fn distance_to_plane(plane: &PlaneModel, p: &[f64; 3]) -> f64 {
    project(plane, p).distance
}

/// Project every point of `cloud` onto `plane`; colors are kept.
pub fn project_cloud(plane: &PlaneModel, cloud: &PointCloud) -> PointCloud {
    PointCloud {
        points: cloud.points.iter().map(|p| project(plane, p).point).collect(),
        colors: cloud.colors.clone(),
    }
}
