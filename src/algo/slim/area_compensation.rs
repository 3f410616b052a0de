//! Keeping the UV area of a chart stable across SLIM solves.
//!
//! SLIM minimizes distortion relative to the 3D triangles, so a solve pulls
//! the map towards the mesh's own surface area. When the existing layout
//! should keep its scale (a reused initialization, or several pins fixing
//! it), the 3D mesh is rescaled to the map's area before solving. Without
//! pins the solved map can then be scaled back to the recorded area.

use crate::algo::kernels::{doublearea_signed, surface_area};

use super::SlimData;

/// Signed UV area of all faces.
pub(crate) fn map_area(data: &SlimData) -> f64 {
    doublearea_signed(&data.v_o, &data.f).iter().sum::<f64>() / 2.0
}

/// Scale the 3D mesh so its area matches the current map, and record that
/// area as the expected area of the result.
///
/// Only applies when the initialization was kept or more than one vertex is
/// pinned; otherwise the map is free to take the mesh's scale.
pub fn correct_mesh_surface_area_if_necessary(data: &mut SlimData) {
    if !(data.skip_initialization || data.b.len() > 1) {
        return;
    }

    let mesh = surface_area(&data.v, &data.f);
    let map = map_area(data);
    if mesh <= 0.0 || map <= 0.0 {
        log::debug!("Skipping mesh area correction: mesh area {mesh}, map area {map}");
        return;
    }

    let scale = (map / mesh).sqrt();
    for p in &mut data.v {
        p.coords *= scale;
    }
    data.expected_surface_area = map;
}

/// Scale the solved map back to the recorded area.
///
/// Applies when an expected area was recorded and no vertex is pinned; pins
/// fix the scale on their own.
pub fn correct_map_surface_area_if_necessary(data: &mut SlimData) {
    if !data.valid || data.expected_surface_area == 0.0 || !data.b.is_empty() {
        return;
    }

    let current = map_area(data);
    if current <= 0.0 {
        return;
    }
    let scale = (data.expected_surface_area / current).sqrt();
    for p in &mut data.v_o {
        p.coords *= scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point2, Point3};

    fn create_quad(uv_scale: f64) -> SlimData {
        let v = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let f = vec![[0, 1, 2], [0, 2, 3]];
        let uv = v.iter().map(|p| Point2::new(p.x * uv_scale, p.y * uv_scale)).collect();
        SlimData::new(v, f, uv, vec![], vec![])
    }

    #[test]
    fn test_mesh_matches_kept_map() {
        let mut data = create_quad(3.0);
        data.skip_initialization = true;
        correct_mesh_surface_area_if_necessary(&mut data);

        assert!((data.expected_surface_area - 9.0).abs() < 1e-12);
        assert!((surface_area(&data.v, &data.f) - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_fresh_map_is_left_alone() {
        let mut data = create_quad(3.0);
        correct_mesh_surface_area_if_necessary(&mut data);
        assert_eq!(data.expected_surface_area, 0.0);
        assert!((surface_area(&data.v, &data.f) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_map_area_is_restored() {
        let mut data = create_quad(2.0);
        data.skip_initialization = true;
        correct_mesh_surface_area_if_necessary(&mut data);

        // A solve that shrank the map
        for p in &mut data.v_o {
            p.coords *= 0.3;
        }
        correct_map_surface_area_if_necessary(&mut data);
        assert!((map_area(&data) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_pins_keep_solved_scale() {
        let mut data = create_quad(1.0);
        data.b = vec![0];
        data.bc = vec![Point2::origin()];
        data.expected_surface_area = 4.0;
        correct_map_surface_area_if_necessary(&mut data);
        assert!((map_area(&data) - 1.0).abs() < 1e-12);
    }
}
