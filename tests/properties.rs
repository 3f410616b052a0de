//! End-to-end properties of the unwrapping pipeline.

use std::f64::consts::PI;

use nalgebra::{Point2, Point3};
use unfold::algo::kernels::{cotmatrix, doublearea_signed};
use unfold::algo::parameterize::{
    abf_solve, abf_tolerance, convex_border_parameterization, lscm_begin, lscm_finish, lscm_solve,
    map_vertices_to_convex_border, BorderMethod,
};
use unfold::algo::slim::{
    correct_map_surface_area_if_necessary, correct_mesh_surface_area_if_necessary, count_flips,
    slim_precompute, slim_solve, transform_initialization_if_necessary, SlimData, SOFT_CONST_P,
};
use unfold::mesh::VertFlags;
use unfold::prelude::*;

// ---- Fixtures ----

/// An `n × n` quad grid on the XY plane, one UV slot per quad corner.
fn grid_handle(n: usize) -> ParamHandle {
    let key = |i: usize, j: usize| (j * (n + 1) + i) as ParamKey;
    let mut handle = ParamHandle::new(vec![Point2::origin(); 4 * n * n]);
    for j in 0..n {
        for i in 0..n {
            let f = j * n + i;
            let corners = [(i, j), (i + 1, j), (i + 1, j + 1), (i, j + 1)];
            let keys = corners.map(|(a, b)| key(a, b));
            let co = corners.map(|(a, b)| Point3::new(a as f64, b as f64, 0.0));
            let slots = [4 * f, 4 * f + 1, 4 * f + 2, 4 * f + 3];
            handle
                .add_face(&FaceInput::new(f as ParamKey, &keys, &co, &slots))
                .unwrap();
        }
    }
    handle.end(&ConstructOptions::default()).unwrap();
    handle
}

/// An open fan of three triangles around a slightly raised apex.
fn raised_fan() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let mut v = vec![Point3::new(0.0, 0.0, 0.1)];
    for k in 0..3 {
        let a = 2.0 * PI * k as f64 / 3.0;
        v.push(Point3::new(a.cos(), a.sin(), 0.0));
    }
    (v, vec![[0, 1, 2], [0, 2, 3], [0, 3, 1]])
}

/// The unit tetrahedron without its slanted face: three right triangles
/// meeting at the origin.
fn open_tetrahedron() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let v = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
    ];
    (v, vec![[0, 2, 1], [0, 1, 3], [0, 3, 2]])
}

fn build_chart(v: &[Point3<f64>], f: &[[usize; 3]]) -> Chart {
    let uv = vec![Point2::origin(); 3 * f.len()];
    let mut builder = ChartBuilder::new();
    for (i, tri) in f.iter().enumerate() {
        let keys = tri.map(|k| k as ParamKey);
        let pos = tri.map(|k| v[k]);
        let slots = [3 * i, 3 * i + 1, 3 * i + 2];
        builder
            .add_face(&FaceInput::new(i as ParamKey, &keys, &pos, &slots), &uv)
            .unwrap();
    }
    builder.end(&uv, 1.0, false, false).charts.remove(0).mesh
}

fn assert_no_flips(chart: &Chart) {
    for f in chart.face_ids() {
        let area = chart.face_uv_area_signed(f);
        assert!(area > 0.0, "face {f:?} has uv area {area}");
    }
}

// ---- Flattening ----

#[test]
fn test_lscm_recovers_planar_grid() {
    let mut handle = grid_handle(3);
    handle.lscm_begin(&LscmOptions::default()).unwrap();
    let report = handle.lscm_solve().unwrap();
    handle.lscm_end().unwrap();
    assert_eq!(report, SolveReport { changed: 1, failed: 0 });

    // A similarity: every edge is scaled by the same factor
    let chart = handle.charts()[0].mesh();
    assert_no_flips(chart);
    let ratios: Vec<f64> = chart
        .edge_ids()
        .map(|e| chart.edge_uv_length(e) / chart.edge_length(e))
        .collect();
    for r in &ratios {
        assert!((r - ratios[0]).abs() < 1e-6 * ratios[0], "{r} vs {}", ratios[0]);
    }
}

#[test]
fn test_slim_recovers_planar_grid() {
    let mut handle = grid_handle(3);
    let report = handle
        .slim_solve(&SlimOptions::default().with_iterations(30))
        .unwrap();
    assert_eq!(report.failed, 0);

    let chart = handle.charts()[0].mesh();
    assert_no_flips(chart);
    for e in chart.edge_ids() {
        let (len2, len3) = (chart.edge_uv_length(e), chart.edge_length(e));
        assert!((len2 - len3).abs() < 0.1 * len3, "{len2} vs {len3}");
    }
}

#[test]
fn test_slim_steps_never_flip() {
    let (v, f) = raised_fan();
    let boundary = vec![1, 2, 3];
    let init = convex_border_parameterization(
        &v,
        &f,
        &boundary,
        &map_vertices_to_convex_border(3),
        BorderMethod::MeanValue,
    )
    .unwrap();
    assert_eq!(count_flips(&f, &init), 0);

    let mut data = SlimData::new(v, f, init, vec![], vec![]);
    slim_precompute(&mut data, SlimEnergy::SymmetricDirichlet, SOFT_CONST_P);
    let mut energy = data.energy;
    for _ in 0..10 {
        slim_solve(&mut data, 1).unwrap();
        assert_eq!(count_flips(&data.f, &data.v_o), 0);
        assert!(data.energy <= energy + 1e-9);
        energy = data.energy;
    }
}

#[test]
fn test_open_tetrahedron_pipeline() {
    let (v, f) = open_tetrahedron();

    // Mean value initialization, boundary in face order
    let init = convex_border_parameterization(
        &v,
        &f,
        &[1, 3, 2],
        &map_vertices_to_convex_border(3),
        BorderMethod::MeanValue,
    )
    .unwrap();
    assert!(doublearea_signed(&init, &f).iter().all(|&a| a > 0.0));

    let mut chart = build_chart(&v, &f);
    for x in chart.vert_ids() {
        let key = chart.vert(x).key as usize;
        chart.vert_mut(x).uv = init[key];
    }
    assert_no_flips(&chart);

    // ABF then LSCM on the initialized chart
    let mut ctx = lscm_begin(&mut chart, &LscmOptions::default()).unwrap();
    assert!(ctx.abf_alpha.is_some());
    lscm_solve(&mut chart, &mut ctx).unwrap();
    lscm_finish(&mut chart, &ctx);
    assert_no_flips(&chart);

    let outer = chart.boundaries().outer.unwrap();
    let edges = chart.boundary_loop(outer);
    assert_eq!(edges.len(), 3);
    let len3: f64 = edges.iter().map(|&e| chart.edge_length(e)).sum();
    let len2: f64 = edges.iter().map(|&e| chart.edge_uv_length(e)).sum();
    assert!((len2 - len3).abs() < 0.05 * len3, "{len2} vs {len3}");

    // The three faces flatten into an equilateral triangle
    for &e in &edges {
        let side = chart.edge_uv_length(e);
        assert!((side - 2f64.sqrt()).abs() < 1e-3, "side {side}");
    }
}

// ---- Kernels ----

#[test]
fn test_convex_border_on_circle() {
    let pts = map_vertices_to_convex_border(4);
    let expected = [(1.0, 0.5), (0.5, 1.0), (0.0, 0.5), (0.5, 0.0)];
    for (p, (x, y)) in pts.iter().zip(expected) {
        assert!((p.x - x).abs() < 1e-12 && (p.y - y).abs() < 1e-12);
    }

    for p in map_vertices_to_convex_border(17) {
        let r = (p - Point2::new(0.5, 0.5)).norm();
        assert!((r - 0.5).abs() < 1e-12);
    }
}

#[test]
fn test_cotmatrix_rows_sum_to_zero() {
    let (v, f) = raised_fan();
    let l = cotmatrix(&v, &f);
    for i in 0..l.nrows() {
        let sum: f64 = l.row(i).map(|(_, x)| x).sum();
        assert!(sum.abs() < 1e-12, "row {i} sums to {sum}");
    }
}

#[test]
fn test_abf_interior_angle_sum() {
    let (v, f) = raised_fan();
    let mut chart = build_chart(&v, &f);
    let alpha = abf_solve(&mut chart).unwrap();
    let limit = abf_tolerance(chart.num_faces()).sqrt();

    let apex = chart
        .vert_ids()
        .find(|&x| chart.vert(x).flag.contains(VertFlags::INTERIOR))
        .unwrap();
    let sum: f64 = chart.vert_edges(apex).map(|e| alpha[e.index()]).sum();
    assert!((sum - 2.0 * PI).abs() < limit, "angle sum {sum}");
}

// ---- Pins and areas ----

#[test]
fn test_two_pins_map_exactly() {
    let (v, f) = raised_fan();
    let uv = vec![
        Point2::new(0.5, 0.5),
        Point2::new(1.0, 0.5),
        Point2::new(0.25, 0.9),
        Point2::new(0.25, 0.1),
    ];
    let bc = vec![Point2::new(3.0, -1.0), Point2::new(2.0, 4.0)];
    let mut data = SlimData::new(v, f, uv, vec![1, 3], bc.clone());

    transform_initialization_if_necessary(&mut data);
    assert_eq!(data.v_o[1], bc[0]);
    assert_eq!(data.v_o[3], bc[1]);
    assert_eq!(count_flips(&data.f, &data.v_o), 0);
}

#[test]
fn test_area_correction_restores_expected_area() {
    let (v, f) = raised_fan();
    let uv: Vec<Point2<f64>> = v.iter().map(|p| Point2::new(5.0 * p.x, 3.0 * p.y)).collect();
    let mut data = SlimData::new(v, f, uv, vec![], vec![]);
    data.skip_initialization = true;

    // The mesh is scaled to the map, whose area becomes the target
    correct_mesh_surface_area_if_necessary(&mut data);
    let expected = data.expected_surface_area;
    let uv_area =
        |data: &SlimData| doublearea_signed(&data.v_o, &data.f).iter().sum::<f64>() / 2.0;
    assert!(expected > 0.0);
    assert!((uv_area(&data) - expected).abs() < 1e-12 * expected);

    slim_precompute(&mut data, SlimEnergy::SymmetricDirichlet, SOFT_CONST_P);
    let energy = data.energy;
    slim_solve(&mut data, 10).unwrap();
    assert!(data.energy < energy);
    assert_eq!(count_flips(&data.f, &data.v_o), 0);

    correct_map_surface_area_if_necessary(&mut data);
    let area = uv_area(&data);
    assert!((area - expected).abs() < 1e-9 * expected, "{area} vs {expected}");
}

// ---- Packing ----

#[test]
fn test_unit_box_packs_to_itself() {
    let co = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    ];
    let layer: Vec<Point2<f64>> = co.iter().map(|p| Point2::new(p.x, p.y)).collect();
    let mut handle = ParamHandle::new(layer.clone());
    handle
        .add_face(&FaceInput::new(0, &[0, 1, 2, 3], &co, &[0, 1, 2, 3]))
        .unwrap();
    handle.end(&ConstructOptions::default()).unwrap();

    handle.pack(&PackOptions::default()).unwrap();
    handle.flush().unwrap();
    for (a, b) in handle.uv_layer().iter().zip(&layer) {
        assert!((a - b).norm() < 1e-12);
    }
}
