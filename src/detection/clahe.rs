//! Contrast limited adaptive histogram equalization.
//!
//! The image is split into a `tiles_x` by `tiles_y` grid. Each tile gets its
//! own clipped, equalized lookup table, and every output pixel blends the
//! tables of the four nearest tile centres bilinearly.

use image::{GrayImage, Luma};

const HIST_SIZE: usize = 256;

/// Mirror an out-of-range index back into `0..n` without repeating the edge
/// sample (`dcb|abcd|cba`).
pub(crate) fn reflect_101(mut i: i64, n: i64) -> usize {
    if n == 1 {
        return 0;
    }
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Equalize `image` tile by tile with histogram bins capped at `clip_limit`
/// times the mean bin height. A non-positive limit disables clipping.
pub fn equalize_adaptive(image: &GrayImage, clip_limit: f64, tiles_x: u32, tiles_y: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    let tiles_x = tiles_x.max(1) as usize;
    let tiles_y = tiles_y.max(1) as usize;
    let (w, h) = (width as usize, height as usize);

    // Sides that do not split evenly are extended by reflection for the
    // histograms only
    let ext_w = w.div_ceil(tiles_x) * tiles_x;
    let ext_h = h.div_ceil(tiles_y) * tiles_y;
    let tile_w = ext_w / tiles_x;
    let tile_h = ext_h / tiles_y;
    let tile_area = tile_w * tile_h;

    let clip = if clip_limit > 0.0 {
        ((clip_limit * tile_area as f64 / HIST_SIZE as f64) as u32).max(1)
    } else {
        0
    };

    let src = image.as_raw();
    let col_index: Vec<usize> = (0..ext_w).map(|x| reflect_101(x as i64, w as i64)).collect();
    let row_index: Vec<usize> = (0..ext_h).map(|y| reflect_101(y as i64, h as i64)).collect();

    let lut_scale = 255.0f32 / tile_area as f32;
    let mut luts = vec![[0u8; HIST_SIZE]; tiles_x * tiles_y];

    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut hist = [0u32; HIST_SIZE];
            for y in ty * tile_h..(ty + 1) * tile_h {
                let row = row_index[y] * w;
                for x in tx * tile_w..(tx + 1) * tile_w {
                    hist[src[row + col_index[x]] as usize] += 1;
                }
            }

            if clip > 0 {
                clip_histogram(&mut hist, clip);
            }

            let lut = &mut luts[ty * tiles_x + tx];
            let mut sum = 0u32;
            for (bin, count) in hist.iter().enumerate() {
                sum += count;
                lut[bin] = (sum as f32 * lut_scale).round().min(255.0) as u8;
            }
        }
    }

    let inv_tw = 1.0f32 / tile_w as f32;
    let inv_th = 1.0f32 / tile_h as f32;

    // Horizontal interpolation coordinates are the same for every row
    let columns: Vec<(usize, usize, f32)> = (0..w)
        .map(|x| {
            let txf = x as f32 * inv_tw - 0.5;
            let tx1 = txf.floor() as i64;
            let xa = txf - tx1 as f32;
            let tx2 = (tx1 + 1).min(tiles_x as i64 - 1) as usize;
            (tx1.max(0) as usize, tx2, xa)
        })
        .collect();

    let mut out = GrayImage::new(width, height);
    for y in 0..h {
        let tyf = y as f32 * inv_th - 0.5;
        let ty1 = tyf.floor() as i64;
        let ya = tyf - ty1 as f32;
        let ya1 = 1.0 - ya;
        let ty2 = (ty1 + 1).min(tiles_y as i64 - 1) as usize;
        let ty1 = ty1.max(0) as usize;

        let row = y * w;
        for x in 0..w {
            let value = src[row + x] as usize;
            let (tx1, tx2, xa) = columns[x];
            let xa1 = 1.0 - xa;

            let top = luts[ty1 * tiles_x + tx1][value] as f32 * xa1
                + luts[ty1 * tiles_x + tx2][value] as f32 * xa;
            let bottom = luts[ty2 * tiles_x + tx1][value] as f32 * xa1
                + luts[ty2 * tiles_x + tx2][value] as f32 * xa;
            let res = top * ya1 + bottom * ya;

            out.put_pixel(x as u32, y as u32, Luma([res.round().clamp(0.0, 255.0) as u8]));
        }
    }

    out
}

/// Cap every bin at `clip` and spread the excess evenly, handing the
/// remainder out one count at a time across the range.
fn clip_histogram(hist: &mut [u32; HIST_SIZE], clip: u32) {
    let mut clipped = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            clipped += *bin - clip;
            *bin = clip;
        }
    }

    let batch = clipped / HIST_SIZE as u32;
    let mut residual = (clipped - batch * HIST_SIZE as u32) as usize;
    for bin in hist.iter_mut() {
        *bin += batch;
    }

    if residual != 0 {
        let step = (HIST_SIZE / residual).max(1);
        let mut i = 0;
        while i < HIST_SIZE && residual > 0 {
            hist[i] += 1;
            i += step;
            residual -= 1;
        }
    }
}
