//! Two-threshold Canny edge detector on an already smoothed image.
//!
//! Unlike `imageproc::edges::canny` this does not blur internally, and it
//! uses integer L1 gradient magnitudes so thresholds are compared exactly.

use image::{GrayImage, Luma};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

/// tan(22.5°) in Q15 fixed point.
const TG22: i64 = 13573;
const SHIFT: u32 = 15;

const NOT_EDGE: u8 = 1;
const CANDIDATE: u8 = 0;
const EDGE: u8 = 2;

/// Binary edge map (0 / 255). Local maxima with magnitude above `high` seed
/// edges; maxima above `low` are kept only when 8-connected to a seed.
pub fn canny(image: &GrayImage, low: f32, high: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    let (low, high) = if low > high { (high, low) } else { (low, high) };
    let low = low.floor() as i32;
    let high = high.floor() as i32;

    let gx = horizontal_sobel(image);
    let gy = vertical_sobel(image);

    let (w, h) = (width as usize, height as usize);
    let mut magnitude = vec![0i32; w * h];
    for (i, (dx, dy)) in gx.pixels().zip(gy.pixels()).enumerate() {
        magnitude[i] = (dx[0] as i32).abs() + (dy[0] as i32).abs();
    }

    let mag_at = |x: i64, y: i64| -> i32 {
        if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            0
        } else {
            magnitude[y as usize * w + x as usize]
        }
    };

    let mut map = vec![NOT_EDGE; w * h];
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            let m = magnitude[idx];
            if m <= low {
                continue;
            }

            let dx = gx.get_pixel(x as u32, y as u32)[0] as i64;
            let dy = gy.get_pixel(x as u32, y as u32)[0] as i64;
            let (xi, yi) = (x as i64, y as i64);

            let ax = dx.abs();
            let ay = dy.abs() << SHIFT;
            let tg22x = ax * TG22;

            let is_max = if ay < tg22x {
                // Gradient mostly along x
                m > mag_at(xi - 1, yi) && m >= mag_at(xi + 1, yi)
            } else if ay > tg22x + (ax << (SHIFT + 1)) {
                // Gradient mostly along y
                m > mag_at(xi, yi - 1) && m >= mag_at(xi, yi + 1)
            } else {
                let s = if (dx ^ dy) < 0 { -1 } else { 1 };
                m > mag_at(xi - s, yi - 1) && m > mag_at(xi + s, yi + 1)
            };

            if !is_max {
                continue;
            }

            if m > high {
                map[idx] = EDGE;
                stack.push((x, y));
            } else {
                map[idx] = CANDIDATE;
            }
        }
    }

    // Hysteresis: grow seeds through connected candidates
    while let Some((x, y)) = stack.pop() {
        let x0 = x.saturating_sub(1);
        let y0 = y.saturating_sub(1);
        let x1 = (x + 1).min(w - 1);
        let y1 = (y + 1).min(h - 1);
        for ny in y0..=y1 {
            for nx in x0..=x1 {
                let idx = ny * w + nx;
                if map[idx] == CANDIDATE {
                    map[idx] = EDGE;
                    stack.push((nx, ny));
                }
            }
        }
    }

    let mut out = GrayImage::new(width, height);
    for (i, state) in map.iter().enumerate() {
        if *state == EDGE {
            out.put_pixel((i % w) as u32, (i / w) as u32, Luma([255]));
        }
    }
    out
}
