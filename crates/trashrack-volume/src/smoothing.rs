use std::collections::HashMap;

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::PointCloud;

/// Fixed rotation applied to every point before it enters the tree.
///
/// A kd-tree leaf cannot split when all of its points share the split
/// coordinate. Pixel clouds are full of such sets (one image column, a
/// projected flat plane); in a generic rotated frame they are not axis
/// aligned anymore. Euclidean distances are unchanged.
fn tree_frame() -> Rotation3<f64> {
    Rotation3::from_euler_angles(0.61, 0.37, 0.23)
}

#[inline]
fn rotated(frame: &Rotation3<f64>, p: &[f64; 3]) -> [f64; 3] {
    (frame * Vector3::from(*p)).into()
}

/// Collapse coincident points into one entry with a multiplicity.
///
/// A kd-tree bucket overflowing with identical points cannot be split, so
/// the tree only ever holds distinct coordinates.
fn distinct_points<'a>(
    points: impl Iterator<Item = &'a [f64; 3]>,
) -> (Vec<[f64; 3]>, Vec<usize>) {
    let mut index: HashMap<[u64; 3], usize> = HashMap::new();
    let mut distinct = Vec::new();
    let mut counts = Vec::new();
    for p in points {
        // `+ 0.0` folds -0.0 into 0.0.
        let key = p.map(|v| (v + 0.0).to_bits());
        match index.get(&key) {
            Some(&i) => counts[i] += 1,
            None => {
                index.insert(key, distinct.len());
                distinct.push(*p);
                counts.push(1);
            }
        }
    }
    (distinct, counts)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingParams {
    /// Neighbours averaged into every target point (the point itself is
    /// usually among them).
    pub neighbours: usize,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self { neighbours: 100 }
    }
}

/// Pull every target point towards its neighbourhood in `target ++ reference`.
///
/// Each point becomes `(p + Σ neighbours) / (found + 1)`. Coincident points
/// count once per copy. Cardinality, order and colors of `target` are
/// preserved; `reference` only contributes neighbours.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "debug",
        skip_all,
        fields(target = target.len(), reference = reference.len(), k = params.neighbours)
    )
)]
pub fn smooth_class_cloud(
    target: &PointCloud,
    reference: &PointCloud,
    params: &SmoothingParams,
) -> PointCloud {
    if target.is_empty() || params.neighbours == 0 {
        return target.clone();
    }

    let (distinct, counts) =
        distinct_points(target.points.iter().chain(reference.points.iter()));

    let frame = tree_frame();
    let mut tree: KdTree<f64, 3> = KdTree::with_capacity(distinct.len());
    for (i, p) in distinct.iter().enumerate() {
        tree.add(&rotated(&frame, p), i as u64);
    }

    let points = target
        .points
        .iter()
        .map(|p| {
            let found = tree.nearest_n::<SquaredEuclidean>(&rotated(&frame, p), params.neighbours);
            let mut acc = *p;
            let mut taken = 0usize;
            for nn in &found {
                if taken == params.neighbours {
                    break;
                }
                let idx = nn.item as usize;
                let take = counts[idx].min(params.neighbours - taken);
                let q = &distinct[idx];
                let m = take as f64;
                acc[0] += m * q[0];
                acc[1] += m * q[1];
                acc[2] += m * q[2];
                taken += take;
            }
            let denom = (taken + 1) as f64;
            [acc[0] / denom, acc[1] / denom, acc[2] / denom]
        })
        .collect();

    PointCloud {
        points,
        colors: target.colors.clone(),
    }
}
