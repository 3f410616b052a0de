//! Chart fixtures shared by unit tests.

use nalgebra::{Point2, Point3};

use super::{Chart, ChartBuilder, FaceInput};

/// An `n x n` grid of unit squares in the XY plane, two CCW triangles per
/// square. UVs start at the origin.
pub(crate) fn create_grid_chart(n: usize) -> Chart {
    let idx = |i: usize, j: usize| (j * (n + 1) + i) as u64;
    let co = |k: u64| {
        let k = k as usize;
        Point3::new((k % (n + 1)) as f64, (k / (n + 1)) as f64, 0.0)
    };

    let mut tris = Vec::new();
    for j in 0..n {
        for i in 0..n {
            tris.push([idx(i, j), idx(i + 1, j), idx(i + 1, j + 1)]);
            tris.push([idx(i, j), idx(i + 1, j + 1), idx(i, j + 1)]);
        }
    }

    let uv = vec![Point2::origin(); 3 * tris.len()];
    let mut builder = ChartBuilder::new();
    for (f, t) in tris.iter().enumerate() {
        let pos = t.map(co);
        let slots = [3 * f, 3 * f + 1, 3 * f + 2];
        builder
            .add_face(&FaceInput::new(f as u64, t, &pos, &slots), &uv)
            .unwrap();
    }
    builder.end(&uv, 1.0, false, false).charts.remove(0).mesh
}
