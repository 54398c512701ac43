//! Probabilistic Hough transform returning finite line segments.
//!
//! Edge pixels are visited in a random (but seeded, so reproducible) order.
//! Each one votes in a (theta, rho) accumulator; once a bin reaches the vote
//! threshold the line is traced through the edge map in both directions,
//! tolerating short gaps, and the traced pixels are removed so they cannot
//! vote again.

use image::GrayImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::models::LineSegment;

/// Fixed-point fraction bits used while walking along a line.
const SHIFT: u32 = 16;
const RNG_SEED: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughParams {
    /// Distance resolution in pixels.
    pub rho: f64,
    /// Angle resolution in radians.
    pub theta: f64,
    /// Minimum accumulator votes.
    pub threshold: u32,
    /// Minimum extent along either axis for a traced segment to be kept.
    pub min_line_length: u32,
    /// Maximum run of missing pixels bridged while tracing.
    pub max_line_gap: u32,
}

impl Default for HoughParams {
    fn default() -> Self {
        Self {
            rho: 1.0,
            theta: std::f64::consts::PI / 180.0,
            threshold: 50,
            min_line_length: 50,
            max_line_gap: 10,
        }
    }
}

struct Accumulator {
    num_angle: usize,
    num_rho: usize,
    /// Interleaved (cos, sin) / rho per angle bin.
    trig: Vec<(f32, f32)>,
    votes: Vec<i32>,
}

impl Accumulator {
    fn new(width: u32, height: u32, params: &HoughParams) -> Self {
        let num_angle = ((std::f64::consts::PI / params.theta).round() as usize).max(1);
        let num_rho = ((((width + height) * 2 + 1) as f64 / params.rho).round() as usize).max(1);
        let irho = 1.0 / params.rho;

        let trig = (0..num_angle)
            .map(|n| {
                let angle = n as f64 * params.theta;
                ((angle.cos() * irho) as f32, (angle.sin() * irho) as f32)
            })
            .collect();

        Self {
            num_angle,
            num_rho,
            trig,
            votes: vec![0; num_angle * num_rho],
        }
    }

    fn rho_index(&self, n: usize, x: usize, y: usize) -> usize {
        let (c, s) = self.trig[n];
        let r = (x as f32 * c + y as f32 * s).round() as i64 + (self.num_rho as i64 - 1) / 2;
        r.clamp(0, self.num_rho as i64 - 1) as usize
    }

    /// Add one vote per angle; returns the strongest bin and its count.
    fn vote(&mut self, x: usize, y: usize) -> (usize, i32) {
        let mut best = (0, i32::MIN);
        for n in 0..self.num_angle {
            let r = self.rho_index(n, x, y);
            let slot = &mut self.votes[n * self.num_rho + r];
            *slot += 1;
            if *slot > best.1 {
                best = (n, *slot);
            }
        }
        best
    }

    fn unvote(&mut self, x: usize, y: usize) {
        for n in 0..self.num_angle {
            let r = self.rho_index(n, x, y);
            self.votes[n * self.num_rho + r] -= 1;
        }
    }
}

/// Fixed-point stepping along a line: one axis moves a whole pixel per step,
/// the other a fraction of one.
#[derive(Clone, Copy)]
struct Walker {
    x0: i64,
    y0: i64,
    dx0: i64,
    dy0: i64,
    x_major: bool,
}

impl Walker {
    fn new(x: usize, y: usize, cos_t: f32, sin_t: f32) -> Self {
        let a = -sin_t;
        let b = cos_t;
        let (mut x0, mut y0) = (x as i64, y as i64);
        let (dx0, dy0);
        let x_major = a.abs() > b.abs();
        if x_major {
            dx0 = if a > 0.0 { 1 } else { -1 };
            dy0 = (b as f64 * (1u64 << SHIFT) as f64 / a.abs() as f64).round() as i64;
            y0 = (y0 << SHIFT) + (1 << (SHIFT - 1));
        } else {
            dy0 = if b > 0.0 { 1 } else { -1 };
            dx0 = (a as f64 * (1u64 << SHIFT) as f64 / b.abs() as f64).round() as i64;
            x0 = (x0 << SHIFT) + (1 << (SHIFT - 1));
        }
        Self {
            x0,
            y0,
            dx0,
            dy0,
            x_major,
        }
    }

    /// Pixel positions walked from the seed, forwards (`k == 0`) or backwards.
    fn steps(self, k: usize) -> impl Iterator<Item = (i64, i64)> {
        let (dx, dy) = if k == 0 {
            (self.dx0, self.dy0)
        } else {
            (-self.dx0, -self.dy0)
        };
        let x_major = self.x_major;
        (0i64..).map(move |i| {
            let x = self.x0 + dx * i;
            let y = self.y0 + dy * i;
            if x_major { (x, y >> SHIFT) } else { (x >> SHIFT, y) }
        })
    }
}

/// Detect line segments in a binary edge map. Any non-zero pixel is an edge.
pub fn detect_segments(edges: &GrayImage, params: &HoughParams) -> Vec<LineSegment> {
    let (width, height) = edges.dimensions();
    let (w, h) = (width as usize, height as usize);

    let mut mask: Vec<bool> = edges.as_raw().iter().map(|&v| v != 0).collect();
    let mut points: Vec<(usize, usize)> = mask
        .iter()
        .enumerate()
        .filter(|(_, on)| **on)
        .map(|(i, _)| (i % w, i / w))
        .collect();

    debug!(edge_pixels = points.len(), "probabilistic hough");

    let mut acc = Accumulator::new(width, height, params);
    let mut rng = StdRng::seed_from_u64(RNG_SEED);
    let threshold = params.threshold as i32;
    let gap_limit = params.max_line_gap as i64;
    let min_len = params.min_line_length as i64;
    let mut segments = Vec::new();

    let in_bounds = |x: i64, y: i64| x >= 0 && y >= 0 && x < w as i64 && y < h as i64;

    let mut remaining = points.len();
    while remaining > 0 {
        let idx = rng.gen_range(0..remaining);
        let (x, y) = points[idx];
        remaining -= 1;
        points[idx] = points[remaining];

        // Already consumed by an earlier line
        if !mask[y * w + x] {
            continue;
        }

        let (best_n, best_votes) = acc.vote(x, y);
        if best_votes < threshold {
            continue;
        }

        let (cos_t, sin_t) = acc.trig[best_n];
        let walker = Walker::new(x, y, cos_t, sin_t);

        // Find both ends of the run through the seed
        let mut ends = [(x as i64, y as i64); 2];
        for (k, end) in ends.iter_mut().enumerate() {
            let mut gap = 0;
            for (px, py) in walker.steps(k) {
                if !in_bounds(px, py) {
                    break;
                }
                if mask[py as usize * w + px as usize] {
                    gap = 0;
                    *end = (px, py);
                } else {
                    gap += 1;
                    if gap > gap_limit {
                        break;
                    }
                }
            }
        }

        let good_line = (ends[1].0 - ends[0].0).abs() >= min_len
            || (ends[1].1 - ends[0].1).abs() >= min_len;

        // Consume the run; only accepted lines give their votes back
        for (k, end) in ends.iter().enumerate() {
            for (px, py) in walker.steps(k) {
                if !in_bounds(px, py) {
                    break;
                }
                let i = py as usize * w + px as usize;
                if mask[i] {
                    if good_line {
                        acc.unvote(px as usize, py as usize);
                    }
                    mask[i] = false;
                }
                if (px, py) == *end {
                    break;
                }
            }
        }

        if good_line {
            segments.push(LineSegment::new(
                ends[0].0 as i32,
                ends[0].1 as i32,
                ends[1].0 as i32,
                ends[1].1 as i32,
            ));
        }
    }

    debug!(segments = segments.len(), "hough segments traced");
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn horizontal(width: u32, height: u32, y: u32, x0: u32, x1: u32) -> GrayImage {
        let mut img = GrayImage::new(width, height);
        for x in x0..x1 {
            img.put_pixel(x, y, Luma([255]));
        }
        img
    }

    #[test]
    fn empty_map_yields_nothing() {
        let img = GrayImage::new(64, 64);
        assert!(detect_segments(&img, &HoughParams::default()).is_empty());
    }

    #[test]
    fn traces_single_horizontal_run() {
        let img = horizontal(200, 120, 60, 40, 140);
        let segments = detect_segments(&img, &HoughParams::default());

        assert_eq!(segments.len(), 1);
        let seg = segments[0];
        assert_eq!(seg.y1, 60);
        assert_eq!(seg.y2, 60);
        assert!((seg.x2 - seg.x1).abs() >= 50);
    }

    #[test]
    fn short_run_is_not_a_segment() {
        let img = horizontal(200, 120, 60, 40, 80);
        assert!(detect_segments(&img, &HoughParams::default()).is_empty());
    }

    #[test]
    fn bridges_small_gaps() {
        let mut img = horizontal(200, 120, 60, 20, 90);
        for x in 95..170 {
            img.put_pixel(x, 60, Luma([255]));
        }
        let segments = detect_segments(&img, &HoughParams::default());

        assert_eq!(segments.len(), 1);
        let seg = segments[0];
        let (lo, hi) = (seg.x1.min(seg.x2), seg.x1.max(seg.x2));
        assert!(lo <= 30 && hi >= 160, "{:?}", seg);
    }

    #[test]
    fn deterministic_across_runs() {
        let mut img = horizontal(160, 160, 30, 10, 150);
        for y in 10..150 {
            img.put_pixel(80, y, Luma([255]));
        }
        let a = detect_segments(&img, &HoughParams::default());
        let b = detect_segments(&img, &HoughParams::default());
        assert_eq!(a, b);
    }
}
