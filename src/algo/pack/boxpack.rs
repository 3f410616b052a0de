//! Bottom-left corner packing of axis-aligned boxes.
//!
//! Boxes are placed largest first. Every placed box contributes its corners
//! as candidate anchors; each corner remembers which of its four quadrants
//! are still free. A new box tries the anchors in order of the extent the
//! layout would reach, and for each anchor the free quadrants, until it fits
//! without overlapping any placed box.
//!
//! Two details keep the search small:
//!
//! - each corner caches, per quadrant, the last box that blocked it, which
//!   is tested before the full scan
//! - when two neighbouring boxes have the same height (or width), their
//!   coincident corners are merged into one so the gap between them is not
//!   offered twice

use std::cmp::Ordering;

/// Overlap tolerance.
const EPSILON: f64 = 1e-7;
/// Size difference under which neighbouring corners are merged.
const EPSILON_MERGE: f64 = 1e-5;

// Corner and quadrant indices
const BL: usize = 0;
const TR: usize = 1;
const TL: usize = 2;
const BR: usize = 3;

const BLF: u8 = 1 << BL;
const TRF: u8 = 1 << TR;
const TLF: u8 = 1 << TL;
const BRF: u8 = 1 << BR;
const CORNER_FLAGS: u8 = BLF | TRF | TLF | BRF;

/// A box to be packed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackBox {
    /// Placed x, set by [`boxpack2d`].
    pub x: f64,
    /// Placed y, set by [`boxpack2d`].
    pub y: f64,
    /// Width.
    pub w: f64,
    /// Height.
    pub h: f64,
    /// Caller's index, carried through the sort.
    pub index: usize,
}

impl PackBox {
    /// A box of the given size, not yet placed.
    pub fn new(w: f64, h: f64, index: usize) -> Self {
        Self { x: 0.0, y: 0.0, w, h, index }
    }
}

#[derive(Debug, Clone)]
struct Corner {
    x: f64,
    y: f64,
    /// Quadrants where a box may still be placed.
    free: u8,
    used: bool,
    /// Placed boxes touching this corner, by the quadrant they occupy.
    trb: Option<usize>,
    blb: Option<usize>,
    brb: Option<usize>,
    tlb: Option<usize>,
    /// Last box that blocked each quadrant.
    isect_cache: [Option<usize>; 4],
}

impl Corner {
    fn new(free: u8) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            free,
            used: false,
            trb: None,
            blb: None,
            brb: None,
            tlb: None,
            isect_cache: [None; 4],
        }
    }
}

struct Packer {
    corners: Vec<Corner>,
    /// Corner of each box, indexed by `BL`, `TR`, `TL`, `BR`.
    box_corners: Vec<[usize; 4]>,
    sizes: Vec<(f64, f64)>,
}

impl Packer {
    fn xmin(&self, b: usize) -> f64 {
        self.corners[self.box_corners[b][BL]].x
    }
    fn ymin(&self, b: usize) -> f64 {
        self.corners[self.box_corners[b][BL]].y
    }
    fn xmax(&self, b: usize) -> f64 {
        self.corners[self.box_corners[b][TR]].x
    }
    fn ymax(&self, b: usize) -> f64 {
        self.corners[self.box_corners[b][TR]].y
    }

    fn set_xmin(&mut self, b: usize, x: f64) {
        let w = self.sizes[b].0;
        let c = self.box_corners[b];
        self.corners[c[TR]].x = x + w;
        self.corners[c[BR]].x = x + w;
        self.corners[c[BL]].x = x;
        self.corners[c[TL]].x = x;
    }
    fn set_xmax(&mut self, b: usize, x: f64) {
        let w = self.sizes[b].0;
        let c = self.box_corners[b];
        self.corners[c[BL]].x = x - w;
        self.corners[c[TL]].x = x - w;
        self.corners[c[TR]].x = x;
        self.corners[c[BR]].x = x;
    }
    fn set_ymin(&mut self, b: usize, y: f64) {
        let h = self.sizes[b].1;
        let c = self.box_corners[b];
        self.corners[c[TR]].y = y + h;
        self.corners[c[TL]].y = y + h;
        self.corners[c[BL]].y = y;
        self.corners[c[BR]].y = y;
    }
    fn set_ymax(&mut self, b: usize, y: f64) {
        let h = self.sizes[b].1;
        let c = self.box_corners[b];
        self.corners[c[BL]].y = y - h;
        self.corners[c[BR]].y = y - h;
        self.corners[c[TL]].y = y;
        self.corners[c[TR]].y = y;
    }

    fn isect(&self, a: usize, b: usize) -> bool {
        !(self.xmin(a) + EPSILON >= self.xmax(b)
            || self.ymin(a) + EPSILON >= self.ymax(b)
            || self.xmax(a) - EPSILON <= self.xmin(b)
            || self.ymax(a) - EPSILON <= self.ymin(b))
    }

    /// Merge two coincident corners, each given as (box, corner). The unused
    /// one is replaced by the used one and `mask` is cleared from it.
    fn merge(&mut self, a: (usize, usize), b: (usize, usize), mask: u8) {
        let ca = self.box_corners[a.0][a.1];
        let cb = self.box_corners[b.0][b.1];
        if self.corners[ca].used {
            self.corners[ca].free &= self.corners[cb].free & !mask;
            self.box_corners[b.0][b.1] = ca;
        } else {
            self.corners[cb].free &= self.corners[ca].free & !mask;
            self.box_corners[a.0][a.1] = cb;
        }
    }

    /// Update the free quadrants around `anchor` after `b` was placed there.
    fn resolve_neighbours(&mut self, anchor: usize, b: usize) {
        let c = self.corners[anchor].clone();

        // Vertical neighbours
        if let Some((tlb, trb)) = touching(c.tlb, c.trb, b) {
            let (htl, htr) = (self.sizes[tlb].1, self.sizes[trb].1);
            if (htl - htr).abs() < EPSILON_MERGE {
                self.merge((trb, TL), (tlb, TR), BLF | BRF);
            } else if htl > htr {
                let v = self.box_corners[trb][TL];
                self.corners[v].free &= !(TLF | BLF);
            } else {
                let v = self.box_corners[tlb][TR];
                self.corners[v].free &= !(TRF | BRF);
            }
        } else if let Some((blb, brb)) = touching(c.blb, c.brb, b) {
            let (hbl, hbr) = (self.sizes[blb].1, self.sizes[brb].1);
            if (hbl - hbr).abs() < EPSILON_MERGE {
                self.merge((blb, BR), (brb, BL), TRF | TLF);
            } else if hbl > hbr {
                let v = self.box_corners[brb][BL];
                self.corners[v].free &= !(TLF | TRF);
            } else {
                let v = self.box_corners[blb][BR];
                self.corners[v].free &= !(TRF | BRF);
            }
        }

        // Horizontal neighbours
        if let Some((tlb, blb)) = touching(c.tlb, c.blb, b) {
            let (wtl, wbl) = (self.sizes[tlb].0, self.sizes[blb].0);
            if (wtl - wbl).abs() < EPSILON_MERGE {
                self.merge((blb, TL), (tlb, BL), TRF | BRF);
            } else if wtl > wbl {
                let v = self.box_corners[blb][TL];
                self.corners[v].free &= !(TLF | TRF);
            } else {
                let v = self.box_corners[tlb][BL];
                self.corners[v].free &= !(BLF | BRF);
            }
        } else if let Some((trb, brb)) = touching(c.trb, c.brb, b) {
            let (wtr, wbr) = (self.sizes[trb].0, self.sizes[brb].0);
            if (wtr - wbr).abs() < EPSILON_MERGE {
                self.merge((brb, TR), (trb, BR), TLF | BLF);
            } else if wtr > wbr {
                let v = self.box_corners[brb][TR];
                self.corners[v].free &= !(TLF | TRF);
            } else {
                let v = self.box_corners[trb][BR];
                self.corners[v].free &= !(BLF | BRF);
            }
        }
    }
}

/// Both neighbours, when both exist and one of them is `placed`.
fn touching(a: Option<usize>, b: Option<usize>, placed: usize) -> Option<(usize, usize)> {
    match (a, b) {
        (Some(a), Some(b)) if a == placed || b == placed => Some((a, b)),
        _ => None,
    }
}

/// Pack `boxes` without overlap into the positive quadrant.
///
/// The boxes are sorted by area, largest first, and their `x`/`y` set.
/// Returns the total width and height of the packing.
///
/// # Example
///
/// ```
/// use unfold::algo::pack::{boxpack2d, PackBox};
///
/// let mut boxes = vec![PackBox::new(1.0, 1.0, 0), PackBox::new(2.0, 1.0, 1)];
/// let (w, h) = boxpack2d(&mut boxes);
/// assert_eq!(boxes[0].index, 1);
/// assert!(w * h >= 3.0);
/// ```
pub fn boxpack2d(boxes: &mut [PackBox]) -> (f64, f64) {
    if boxes.is_empty() {
        return (0.0, 0.0);
    }

    boxes.sort_by(|a, b| (b.w * b.h).partial_cmp(&(a.w * a.h)).unwrap_or(Ordering::Equal));

    let n = boxes.len();
    let mut packer = Packer {
        corners: Vec::with_capacity(4 * n),
        box_corners: Vec::with_capacity(n),
        sizes: boxes.iter().map(|b| (b.w, b.h)).collect(),
    };
    for b in 0..n {
        let base = packer.corners.len();
        let mut bl = Corner::new(CORNER_FLAGS & !TRF);
        bl.trb = Some(b);
        let mut tr = Corner::new(CORNER_FLAGS & !BLF);
        tr.blb = Some(b);
        let mut tl = Corner::new(CORNER_FLAGS & !BRF);
        tl.brb = Some(b);
        let mut br = Corner::new(CORNER_FLAGS & !TLF);
        br.tlb = Some(b);
        packer.corners.extend([bl, tr, tl, br]);
        packer.box_corners.push([base + BL, base + TR, base + TL, base + BR]);
    }

    // The first box sits at the origin
    let first = packer.box_corners[0];
    packer.corners[first[BL]].free = 0;
    packer.corners[first[BR]].free &= !(BLF | BRF);
    packer.corners[first[TL]].free &= !(BLF | TLF);
    packer.set_xmin(0, 0.0);
    packer.set_ymin(0, 0.0);
    for &c in &first {
        packer.corners[c].used = true;
    }
    let mut tot_x = boxes[0].w;
    let mut tot_y = boxes[0].h;
    let mut candidates: Vec<usize> = vec![first[TR], first[TL], first[BR]];

    for b in 1..n {
        let (w, h) = packer.sizes[b];
        let extent = |c: &Corner| (c.x + w).max(c.y + h);
        candidates.sort_by(|&p, &q| {
            extent(&packer.corners[p])
                .partial_cmp(&extent(&packer.corners[q]))
                .unwrap_or(Ordering::Equal)
        });

        let mut placed = false;
        'search: for ci in 0..candidates.len() {
            let anchor = candidates[ci];
            for quad in [BL, TR, TL, BR] {
                if packer.corners[anchor].free & (1 << quad) == 0 {
                    continue;
                }
                let (ax, ay) = (packer.corners[anchor].x, packer.corners[anchor].y);
                match quad {
                    BL => {
                        packer.set_xmax(b, ax);
                        packer.set_ymax(b, ay);
                    }
                    TR => {
                        packer.set_xmin(b, ax);
                        packer.set_ymin(b, ay);
                    }
                    TL => {
                        packer.set_xmax(b, ax);
                        packer.set_ymin(b, ay);
                    }
                    _ => {
                        packer.set_xmin(b, ax);
                        packer.set_ymax(b, ay);
                    }
                }

                if packer.xmin(b) < 0.0 || packer.ymin(b) < 0.0 {
                    continue;
                }
                if let Some(cached) = packer.corners[anchor].isect_cache[quad] {
                    if packer.isect(b, cached) {
                        continue;
                    }
                }
                if let Some(blocker) = (0..b).find(|&other| packer.isect(b, other)) {
                    packer.corners[anchor].isect_cache[quad] = Some(blocker);
                    continue;
                }

                // Place it
                tot_x = tot_x.max(packer.xmax(b));
                tot_y = tot_y.max(packer.ymax(b));
                packer.corners[anchor].free &= !(1 << quad);
                match quad {
                    TR => {
                        packer.box_corners[b][BL] = anchor;
                        packer.corners[anchor].trb = Some(b);
                    }
                    TL => {
                        packer.box_corners[b][BR] = anchor;
                        packer.corners[anchor].tlb = Some(b);
                    }
                    BR => {
                        packer.box_corners[b][TL] = anchor;
                        packer.corners[anchor].brb = Some(b);
                    }
                    _ => {
                        packer.box_corners[b][TR] = anchor;
                        packer.corners[anchor].blb = Some(b);
                    }
                }

                // Nothing may go below or left of the packing
                let c = packer.box_corners[b];
                if packer.xmin(b) <= 0.0 {
                    packer.corners[c[TL]].free &= !(TLF | BLF);
                    packer.corners[c[BL]].free &= !(TLF | BLF);
                } else if packer.ymin(b) <= 0.0 {
                    packer.corners[c[BL]].free &= !(BRF | BLF);
                    packer.corners[c[BR]].free &= !(BRF | BLF);
                }

                packer.resolve_neighbours(anchor, b);

                for &v in &packer.box_corners[b] {
                    if !packer.corners[v].used {
                        packer.corners[v].used = true;
                        candidates.push(v);
                    }
                }
                placed = true;
                break 'search;
            }
        }

        if !placed {
            // Every anchor was blocked; append to the right
            log::debug!("boxpack2d: no anchor for box {b}, appending");
            packer.set_xmin(b, tot_x);
            packer.set_ymin(b, 0.0);
            tot_x += w;
            tot_y = tot_y.max(h);
        }
    }

    for (b, out) in boxes.iter_mut().enumerate() {
        out.x = packer.xmin(b);
        out.y = packer.ymin(b);
    }
    (tot_x, tot_y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlaps(a: &PackBox, b: &PackBox) -> bool {
        a.x + 1e-9 < b.x + b.w && b.x + 1e-9 < a.x + a.w && a.y + 1e-9 < b.y + b.h && b.y + 1e-9 < a.y + a.h
    }

    fn assert_valid(boxes: &[PackBox], tot: (f64, f64)) {
        for (i, a) in boxes.iter().enumerate() {
            assert!(a.x >= 0.0 && a.y >= 0.0, "{a:?}");
            assert!(a.x + a.w <= tot.0 + 1e-9 && a.y + a.h <= tot.1 + 1e-9, "{a:?} outside {tot:?}");
            for b in &boxes[i + 1..] {
                assert!(!overlaps(a, b), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn test_single_box_at_origin() {
        let mut boxes = vec![PackBox::new(2.0, 3.0, 7)];
        let tot = boxpack2d(&mut boxes);
        assert_eq!(tot, (2.0, 3.0));
        assert_eq!((boxes[0].x, boxes[0].y), (0.0, 0.0));
        assert_eq!(boxes[0].index, 7);
    }

    #[test]
    fn test_four_squares_fill_a_square() {
        let mut boxes: Vec<_> = (0..4).map(|i| PackBox::new(1.0, 1.0, i)).collect();
        let tot = boxpack2d(&mut boxes);
        assert_valid(&boxes, tot);
        assert_eq!(tot, (2.0, 2.0));
    }

    #[test]
    fn test_largest_first() {
        let mut boxes = vec![
            PackBox::new(0.5, 0.5, 0),
            PackBox::new(3.0, 2.0, 1),
            PackBox::new(1.0, 1.0, 2),
        ];
        let tot = boxpack2d(&mut boxes);
        assert_eq!(boxes.iter().map(|b| b.index).collect::<Vec<_>>(), vec![1, 2, 0]);
        assert_eq!((boxes[0].x, boxes[0].y), (0.0, 0.0));
        assert_valid(&boxes, tot);
    }

    #[test]
    fn test_mixed_sizes_do_not_overlap() {
        let sizes = [
            (3.0, 1.0),
            (1.0, 2.5),
            (2.0, 2.0),
            (0.7, 0.3),
            (1.2, 1.9),
            (0.4, 0.4),
            (2.2, 0.6),
            (0.9, 1.1),
            (1.5, 1.5),
            (0.2, 2.0),
        ];
        let mut boxes: Vec<_> = sizes.iter().enumerate().map(|(i, &(w, h))| PackBox::new(w, h, i)).collect();
        let tot = boxpack2d(&mut boxes);
        assert_valid(&boxes, tot);

        let area: f64 = sizes.iter().map(|(w, h)| w * h).sum();
        assert!(tot.0 * tot.1 >= area);
    }
}
