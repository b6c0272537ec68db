//! Property-based tests for projection and dataset windows using proptest.

use proptest::prelude::*;

use lidarcast_core::DatasetProfile;
use lidarcast_ml::data::WindowSpec;
use lidarcast_ml::projection::Projector;
use lidarcast_ml::scan::{Point, PointCloud};

fn small_profile(height: usize, width: usize) -> DatasetProfile {
    let mut p = DatasetProfile::kitti();
    p.height = height;
    p.width = width;
    p
}

fn point() -> impl Strategy<Value = Point> {
    (-90.0f32..90.0, -90.0f32..90.0, -10.0f32..10.0, 0.0f32..1.0).prop_map(|(x, y, z, i)| Point {
        x,
        y,
        z,
        intensity: i,
    })
}

// --- Projection properties ---

proptest! {
    #[test]
    fn every_point_is_kept_or_dropped(
        points in prop::collection::vec(point(), 0..200),
        height in 1usize..32,
        width in 1usize..64,
    ) {
        let projector = Projector::new(&small_profile(height, width));
        let out = projector.project(&PointCloud { points: points.clone() });
        let in_range = points
            .iter()
            .filter(|p| (1.0..=85.0).contains(&p.range()))
            .count();
        prop_assert_eq!(out.dropped, points.len() - in_range);
        prop_assert!(out.image.occupied() <= in_range);
        prop_assert_eq!(out.image.range.dim(), (height, width));
        prop_assert_eq!(out.image.xyz.dim(), (3, height, width));
    }

    #[test]
    fn pixels_stay_inside_the_image(
        p in point(),
        height in 1usize..64,
        width in 1usize..256,
    ) {
        let r = p.range();
        prop_assume!(r > 0.0);
        let projector = Projector::new(&small_profile(height, width));
        let (row, col) = projector.pixel(p.x, p.y, p.z, r);
        prop_assert!(row < height);
        prop_assert!(col < width);
    }

    #[test]
    fn occupied_pixels_hold_their_closest_point(
        points in prop::collection::vec(point(), 1..100),
    ) {
        let projector = Projector::new(&small_profile(16, 32));
        let out = projector.project(&PointCloud { points: points.clone() });
        for p in &points {
            let r = p.range();
            if !(1.0..=85.0).contains(&r) {
                continue;
            }
            let (row, col) = projector.pixel(p.x, p.y, p.z, r);
            let stored = out.image.range[[row, col]];
            prop_assert!(stored > 0.0);
            prop_assert!(stored <= r);
        }
    }

    #[test]
    fn stored_xyz_matches_stored_range(
        points in prop::collection::vec(point(), 1..100),
    ) {
        let projector = Projector::new(&small_profile(16, 32));
        let out = projector.project(&PointCloud { points });
        for ((row, col), &r) in out.image.range.indexed_iter() {
            if r == 0.0 {
                prop_assert_eq!(out.image.xyz[[0, row, col]], 0.0);
                continue;
            }
            let x = out.image.xyz[[0, row, col]];
            let y = out.image.xyz[[1, row, col]];
            let z = out.image.xyz[[2, row, col]];
            prop_assert!(((x * x + y * y + z * z).sqrt() - r).abs() < 1e-3);
        }
    }
}

// --- Window properties ---

proptest! {
    #[test]
    fn windows_fit_inside_the_sequence(
        frames in 0usize..200,
        n_past in 1usize..10,
        n_future in 1usize..10,
    ) {
        let w = WindowSpec { n_past, n_future };
        let samples = w.samples_in(frames);
        if samples > 0 {
            let last = w.anchor(samples - 1);
            prop_assert_eq!(last + n_future, frames - 1);
            prop_assert_eq!(w.anchor(0) + 1, n_past);
        } else {
            prop_assert!(frames < n_past + n_future);
        }
    }
}
