use criterion::{black_box, criterion_group, criterion_main, Criterion};
use trashrack_volume::{
    fit_plane, project_cloud, smooth_class_cloud, PlaneFitParams, PointCloud, SmoothingParams,
};

/// Gently tilted reference floor with a mound of target points on top.
fn scene(side: usize) -> (PointCloud, PointCloud) {
    let mut target = PointCloud::default();
    let mut reference = PointCloud::default();
    let c = side as f64 / 2.0;
    for y in 0..side {
        for x in 0..side {
            let (fx, fy) = (x as f64, y as f64);
            let floor = 0.02 * fx + 0.01 * fy;
            let r2 = (fx - c).powi(2) + (fy - c).powi(2);
            if r2 < (side as f64 / 4.0).powi(2) {
                target.push([fx, fy, floor + 3.0 - r2.sqrt() * 0.1], [0.2, 0.6, 0.2]);
            } else {
                reference.push([fx, fy, floor], [0.5, 0.5, 0.5]);
            }
        }
    }
    (target, reference)
}

fn bench_plane_fit(c: &mut Criterion) {
    let (_, reference) = scene(200);
    let params = PlaneFitParams::default();
    c.bench_function("fit_plane_200x200", |b| {
        b.iter(|| fit_plane(black_box(&reference.points), black_box(&params)))
    });
}

fn bench_smoothing(c: &mut Criterion) {
    let (target, reference) = scene(96);
    let plane = fit_plane(&reference.points, &PlaneFitParams::default());
    let aligned = match plane {
        Some(p) => project_cloud(&p, &reference),
        None => reference,
    };
    let params = SmoothingParams::default();
    c.bench_function("smooth_class_cloud_96x96_k100", |b| {
        b.iter(|| {
            smooth_class_cloud(
                black_box(&target),
                black_box(&aligned),
                black_box(&params),
            )
        })
    });
}

criterion_group!(benches, bench_plane_fit, bench_smoothing);
criterion_main!(benches);
