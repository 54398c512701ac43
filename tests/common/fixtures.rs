#![allow(dead_code)]

use image::{GrayImage, Luma, Rgb, RgbImage};
use sheetcount::ImageArray;

/// Blank single-channel edge map.
pub fn blank_edges(width: u32, height: u32) -> GrayImage {
    GrayImage::new(width, height)
}

/// Edge map with one horizontal run of `len` pixels starting at `(x0, y)`.
pub fn horizontal_edge(width: u32, height: u32, x0: u32, y: u32, len: u32) -> GrayImage {
    let mut img = blank_edges(width, height);
    for x in x0..x0 + len {
        img.put_pixel(x, y, Luma([255]));
    }
    img
}

/// Edge map with one vertical run of `len` pixels starting at `(x, y0)`.
pub fn vertical_edge(width: u32, height: u32, x: u32, y0: u32, len: u32) -> GrayImage {
    let mut img = blank_edges(width, height);
    for y in y0..y0 + len {
        img.put_pixel(x, y, Luma([255]));
    }
    img
}

/// Photo-like RGB image of a stack: horizontal bands alternating between a
/// light and a dark tone every `band` rows.
pub fn stack_photo(width: u32, height: u32, band: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |_, y| {
        if (y / band) % 2 == 0 {
            Rgb([210, 205, 190])
        } else {
            Rgb([60, 55, 50])
        }
    })
}

/// Same as `stack_photo` but with vertical bands.
pub fn striped_photo(width: u32, height: u32, band: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| {
        if (x / band) % 2 == 0 {
            Rgb([210, 205, 190])
        } else {
            Rgb([60, 55, 50])
        }
    })
}

/// Deterministic textured image without long straight structures.
pub fn noise_photo(width: u32, height: u32) -> RgbImage {
    let mut state = 0x2545_f491u32;
    RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let v = (state & 0xff) as u8;
        Rgb([v, v.wrapping_mul(3), v.wrapping_add(40)])
    })
}

pub fn as_array(img: RgbImage) -> ImageArray {
    ImageArray::from_rgb(img)
}

/// Count pixels holding exactly `value`.
pub fn count_value(img: &GrayImage, value: u8) -> usize {
    img.pixels().filter(|p| p[0] == value).count()
}
