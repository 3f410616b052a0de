//! Area smoothing of a flattened chart.
//!
//! Evens out how much UV space each region of a chart receives compared to
//! its 3D size. The per-vertex stretch is sampled on a regular grid laid
//! over the chart's UV bounding box. The grid is then relaxed so its cells
//! grow where the chart is stretched and shrink where it is compressed.
//! Finally every vertex is carried back through the relaxed grid: a UV that
//! lies in a relaxed cell takes the matching position in the regular cell.

use nalgebra::{Point2, Vector2};

use crate::mesh::Chart;

/// Grid spacing relative to the median 3D edge length.
const SPACING_FACTOR: f64 = 0.1;
/// Empty room around the chart, relative to its half extent.
const PADDING: f64 = 0.15;
/// The spacing grows until the grid has at most this many nodes.
const MAX_NODES: usize = 1 << 20;

const OUTER_ITERATIONS: usize = 10;
const INNER_ITERATIONS: usize = 50;
/// Largest single node step that still counts as movement.
const STEP_LIMIT: f64 = 1e-4;
/// Total movement per node below which relaxation stops.
const MOVE_LIMIT: f64 = 1e-5;
/// Barycentric slack for points on shared cell edges.
const INSIDE_EPS: f64 = 1e-10;

/// Smooth the UV area distribution of a chart in place.
///
/// Returns the number of vertices that could not be located in the relaxed
/// grid; those keep their UV. Charts with no UV extent or mostly
/// zero-length edges are left untouched.
pub fn smooth_area(chart: &mut Chart) -> usize {
    if chart.num_edges() == 0 {
        return 0;
    }

    let mut lengths: Vec<f64> = chart.edge_ids().map(|e| chart.edge_length(e)).collect();
    lengths.sort_by(f64::total_cmp);
    let mut spacing = lengths[lengths.len() / 2] * SPACING_FACTOR;
    if spacing == 0.0 {
        return 0;
    }

    let (min, max) = chart.uv_bbox();
    let center = nalgebra::center(&min, &max);
    let half = (max - min) * 0.5;
    if half.x <= 0.0 || half.y <= 0.0 {
        return 0;
    }
    let distortion = vertex_distortion(chart);
    let fill = half.x * half.y * 4.0 / (spacing * spacing);
    if fill > MAX_NODES as f64 {
        spacing *= (fill / MAX_NODES as f64).sqrt();
        log::debug!("coarsening area smoothing grid to spacing {spacing}");
    }

    let Some(mut grid) = Grid::new(center, half, spacing) else {
        return 0;
    };
    grid.embed(chart, &distortion);
    grid.relax();

    let lookup = grid.inverse();
    let mut missed = 0;
    for v in chart.vert_ids() {
        match lookup.map(chart.vert(v).uv) {
            Some(uv) => chart.vert_mut(v).uv = uv,
            None => missed += 1,
        }
    }
    if missed > 0 {
        log::warn!("area smoothing: no mapping cell for {missed} vertices");
    }
    missed
}

/// Mean ratio of UV to 3D edge length around each vertex, both normalized
/// by the chart's average edge lengths.
fn vertex_distortion(chart: &Chart) -> Vec<f64> {
    let n = chart.num_edges() as f64;
    let (mut avg2, mut avg3) = (0.0, 0.0);
    for e in chart.edge_ids() {
        avg2 += chart.edge_uv_length(e);
        avg3 += chart.edge_length(e);
    }
    avg2 /= n;
    avg3 /= n;

    chart
        .vert_ids()
        .map(|v| {
            let (mut sum, mut count) = (0.0, 0);
            for e in chart.vert_edges(v) {
                let len2 = chart.edge_uv_length(e) * avg3;
                let len3 = chart.edge_length(e) * avg2;
                if len3 != 0.0 {
                    sum += len2 / len3;
                }
                count += 1;
            }
            if count > 0 {
                sum / count as f64
            } else {
                1.0
            }
        })
        .collect()
}

/// Barycentric coordinates of `p` in triangle `abc`. A degenerate triangle
/// gives its centroid weights.
fn barycentric(a: Point2<f64>, b: Point2<f64>, c: Point2<f64>, p: Point2<f64>) -> [f64; 3] {
    let (ab, ac) = (b - a, c - a);
    let div = ab.perp(&ac);
    if div == 0.0 {
        return [1.0 / 3.0; 3];
    }
    let h = p - a;
    let b1 = h.perp(&ac) / div;
    let b2 = ab.perp(&h) / div;
    [1.0 - b1 - b2, b1, b2]
}

// ---- Grid ----

/// A regular grid whose nodes carry a stretch value and a relaxed position.
struct Grid {
    min: Point2<f64>,
    spacing: f64,
    nx: usize,
    ny: usize,
    value: Vec<f64>,
    pos: Vec<Point2<f64>>,
}

impl Grid {
    /// Cover a box of half extent `half` around `center`, with padding and
    /// two cells of margin. `None` when the grid would have no interior.
    fn new(center: Point2<f64>, half: Vector2<f64>, spacing: f64) -> Option<Self> {
        let padded = half * (1.0 + PADDING) + Vector2::repeat(2.0 * spacing);
        let gx = (padded.x / spacing) as usize;
        let gy = (padded.y / spacing) as usize;
        let (nx, ny) = (2 * gx + 1, 2 * gy + 1);
        if nx <= 2 || ny <= 2 {
            return None;
        }

        let min = center - Vector2::new(gx as f64, gy as f64) * spacing;
        let mut grid = Self {
            min,
            spacing,
            nx,
            ny,
            value: vec![1.0; nx * ny],
            pos: Vec::with_capacity(nx * ny),
        };
        for y in 0..ny {
            for x in 0..nx {
                let p = grid.rest(x, y);
                grid.pos.push(p);
            }
        }
        Some(grid)
    }

    #[inline]
    fn rest(&self, x: usize, y: usize) -> Point2<f64> {
        self.min + Vector2::new(x as f64, y as f64) * self.spacing
    }

    /// Sample the vertex distortion at every node covered by a face.
    fn embed(&mut self, chart: &Chart, distortion: &[f64]) {
        for f in chart.face_ids() {
            let verts = chart.face_verts(f);
            let [a, b, c] = verts.map(|v| chart.vert(v).uv);
            let d = verts.map(|v| distortion[v.index()]);

            let lo = a.inf(&b).inf(&c) - self.min;
            let hi = a.sup(&b).sup(&c) - self.min;
            let x1 = (lo.x / self.spacing).max(0.0) as usize;
            let y1 = (lo.y / self.spacing).max(0.0) as usize;
            let x2 = ((hi.x / self.spacing) as usize + 2).min(self.nx);
            let y2 = ((hi.y / self.spacing) as usize + 2).min(self.ny);

            for y in y1..y2 {
                for x in x1..x2 {
                    let w = barycentric(a, b, c, self.rest(x, y));
                    if w.iter().all(|&w| w > 0.0) {
                        self.value[x + y * self.nx] = d[0] * w[0] + d[1] * w[1] + d[2] * w[2];
                    }
                }
            }
        }
    }

    /// Move interior nodes towards the weighted mean of their four
    /// neighbours. Links between stretched nodes are weak, so cells grow
    /// there. Border nodes stay fixed.
    fn relax(&mut self) {
        let (nx, ny) = (self.nx, self.ny);
        let ex = nx - 1;
        let mut horizontal = vec![0.0; ex * (ny - 1)];
        let mut vertical = vec![0.0; ex * (ny - 1)];
        for y in 0..ny - 1 {
            for x in 0..ex {
                let i = x + y * nx;
                let j = x + y * ex;
                horizontal[j] = 2.0 / (self.value[i] + self.value[i + 1]).max(f64::EPSILON);
                vertical[j] = 2.0 / (self.value[i] + self.value[i + nx]).max(f64::EPSILON);
            }
        }

        let move_limit = MOVE_LIMIT * (nx * ny) as f64;
        let mut old = self.pos.clone();
        for _ in 0..OUTER_ITERATIONS {
            let mut moved = 0.0;
            for _ in 0..INNER_ITERATIONS {
                old.copy_from_slice(&self.pos);
                let mut step: f64 = 0.0;
                for y in 1..ny - 1 {
                    for x in 1..nx - 1 {
                        let i = x + y * nx;
                        let j = x + y * ex;
                        let (wl, wr) = (horizontal[j - 1], horizontal[j]);
                        let (wd, wu) = (vertical[j - ex], vertical[j]);

                        let sum = wl * old[i - 1].coords
                            + wr * old[i + 1].coords
                            + wd * old[i - nx].coords
                            + wu * old[i + nx].coords;
                        let p = Point2::from(sum / (wl + wr + wd + wu));

                        let len = (p - old[i]).norm();
                        step = step.max(len);
                        moved += len;
                        self.pos[i] = p;
                    }
                }
                if step < STEP_LIMIT {
                    break;
                }
            }
            if moved < move_limit {
                break;
            }
        }
    }

    /// Split every cell into two triangles and index them for point lookup.
    fn inverse(&self) -> InverseMap {
        let (nx, ny) = (self.nx, self.ny);
        let mut triangles = Vec::with_capacity(2 * (nx - 1) * (ny - 1));
        for y in 0..ny - 1 {
            for x in 0..nx - 1 {
                let i = x + y * nx;
                let right = (self.pos[i + 1], self.rest(x + 1, y));
                let up = (self.pos[i + nx], self.rest(x, y + 1));
                triangles.push([(self.pos[i], self.rest(x, y)), right, up]);
                triangles.push([(self.pos[i + nx + 1], self.rest(x + 1, y + 1)), right, up]);
            }
        }
        InverseMap::new(triangles, self.min, self.spacing, nx - 1, ny - 1)
    }
}

// ---- Inverse lookup ----

/// A triangle of the relaxed grid paired with its regular position.
type MapTriangle = [(Point2<f64>, Point2<f64>); 3];

/// Bucketed relaxed-grid triangles. Relaxed nodes never leave the grid box,
/// so buckets over the regular cells cover every triangle.
struct InverseMap {
    triangles: Vec<MapTriangle>,
    buckets: Vec<Vec<usize>>,
    min: Point2<f64>,
    spacing: f64,
    cols: usize,
    rows: usize,
}

impl InverseMap {
    fn new(
        triangles: Vec<MapTriangle>,
        min: Point2<f64>,
        spacing: f64,
        cols: usize,
        rows: usize,
    ) -> Self {
        let mut map = Self {
            triangles: Vec::new(),
            buckets: vec![Vec::new(); cols * rows],
            min,
            spacing,
            cols,
            rows,
        };
        for (t, &tri) in triangles.iter().enumerate() {
            let [a, b, c] = tri.map(|(p, _)| p);
            let (x1, y1) = map.cell(a.inf(&b).inf(&c));
            let (x2, y2) = map.cell(a.sup(&b).sup(&c));
            for y in y1..=y2 {
                for x in x1..=x2 {
                    map.buckets[x + y * cols].push(t);
                }
            }
        }
        map.triangles = triangles;
        map
    }

    fn cell(&self, p: Point2<f64>) -> (usize, usize) {
        let d = (p - self.min) / self.spacing;
        let x = (d.x.max(0.0) as usize).min(self.cols - 1);
        let y = (d.y.max(0.0) as usize).min(self.rows - 1);
        (x, y)
    }

    /// Regular position of a point of the relaxed grid.
    fn map(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let (x, y) = self.cell(p);
        self.buckets[x + y * self.cols].iter().find_map(|&t| {
            let [(a, ra), (b, rb), (c, rc)] = self.triangles[t];
            let w = barycentric(a, b, c, p);
            if w.iter().all(|&w| w >= -INSIDE_EPS) {
                Some(Point2::from(ra.coords * w[0] + rb.coords * w[1] + rc.coords * w[2]))
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::testing::create_grid_chart;

    /// Mean horizontal UV stretch of the first and last column of a grid chart.
    fn column_stretch(chart: &Chart, n: usize) -> (f64, f64) {
        let (mut first, mut last) = ((0.0, 0), (0.0, 0));
        for e in chart.edge_ids() {
            let (a, b) = (chart.vert(chart.edge_vert(e)), chart.vert(chart.edge_dest(e)));
            if a.co.y != b.co.y || a.co.x >= b.co.x {
                continue;
            }
            let ratio = chart.edge_uv_length(e) / chart.edge_length(e);
            if a.co.x == 0.0 {
                first = (first.0 + ratio, first.1 + 1);
            } else if b.co.x == n as f64 {
                last = (last.0 + ratio, last.1 + 1);
            }
        }
        (first.0 / first.1 as f64, last.0 / last.1 as f64)
    }

    #[test]
    fn test_barycentric() {
        let (a, b, c) = (Point2::new(0.0, 0.0), Point2::new(2.0, 0.0), Point2::new(0.0, 2.0));
        let w = barycentric(a, b, c, Point2::new(0.5, 1.0));
        assert!((w[0] - 0.25).abs() < 1e-12);
        assert!((w[1] - 0.25).abs() < 1e-12);
        assert!((w[2] - 0.5).abs() < 1e-12);

        let w = barycentric(a, a, a, Point2::new(1.0, 1.0));
        assert_eq!(w, [1.0 / 3.0; 3]);
    }

    #[test]
    fn test_even_chart_stays_put() {
        let n = 4;
        let mut chart = create_grid_chart(n);
        for v in chart.vert_ids() {
            let co = chart.vert(v).co;
            chart.vert_mut(v).uv = Point2::new(co.x, co.y);
        }

        assert_eq!(smooth_area(&mut chart), 0);
        for v in chart.verts() {
            assert!((v.uv - Point2::new(v.co.x, v.co.y)).norm() < 1e-6, "{:?}", v.uv);
        }
    }

    #[test]
    fn test_stretch_is_evened_out() {
        let n = 2;
        let mut chart = create_grid_chart(n);
        for v in chart.vert_ids() {
            let co = chart.vert(v).co;
            chart.vert_mut(v).uv = Point2::new(co.x * co.x / n as f64, co.y);
        }
        let (first, last) = column_stretch(&chart, n);
        assert!((last / first - 3.0).abs() < 1e-12);

        assert_eq!(smooth_area(&mut chart), 0);
        let (first, last) = column_stretch(&chart, n);
        assert!(last / first < 2.85, "stretch {first} .. {last}");
        for f in chart.face_ids() {
            assert!(chart.face_uv_area_signed(f) > 0.0);
        }
    }

    #[test]
    fn test_empty_chart_is_ignored() {
        let mut chart = create_grid_chart(2);
        chart.uv_zero();
        assert_eq!(smooth_area(&mut chart), 0);
        assert!(chart.verts().all(|v| v.uv == Point2::origin()));
    }
}
