//! Difference matting: alpha and foreground recovery from a white/black pair.
//!
//! Rendering a subject over a flat background follows the compositing model
//! `composite = alpha * foreground + (1 - alpha) * background`.
//!
//! Over white and black backgrounds the two composites differ by exactly
//! `(1 - alpha) * (255, 255, 255)`, so the length of the per-pixel color shift
//! gives `alpha` directly, and the black composite (which is just
//! `alpha * foreground`) un-blends to the foreground color.

use std::borrow::Cow;

use image::imageops::{self, FilterType};
use image::{RgbImage, RgbaImage};

use crate::error::{Error, Result};

/// Distance between pure white and pure black in RGB space: `sqrt(3 * 255^2)`.
pub const BG_DIST: f32 = 441.672_96;

/// Alpha at or below which a pixel is treated as fully transparent.
///
/// Un-blending divides by alpha; below this the color is noise.
pub const MIN_ALPHA: f32 = 0.01;

/// Recover one RGBA pixel from its white- and black-background renderings.
///
/// Output channels are always within `[0, 255]`. Pixels with alpha at or below
/// [`MIN_ALPHA`] get color `(0, 0, 0)`.
#[must_use]
pub fn recover_pixel(white: [u8; 3], black: [u8; 3]) -> [u8; 4] {
    let dist_sq: f32 = white
        .iter()
        .zip(black.iter())
        .map(|(&w, &b)| {
            let d = f32::from(w) - f32::from(b);
            d * d
        })
        .sum();
    let alpha = (1.0 - dist_sq.sqrt() / BG_DIST).clamp(0.0, 1.0);

    let mut out = [0u8; 4];
    if alpha > MIN_ALPHA {
        for (dst, &b) in out.iter_mut().zip(black.iter()) {
            *dst = to_channel(f32::from(b) / alpha);
        }
    }
    out[3] = to_channel(alpha * 255.0);
    out
}

/// Round and clamp a float into a `u8` channel value.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Bring the black-background image to the white image's dimensions.
///
/// The white image is authoritative. Returns the black image unchanged (borrowed)
/// when dimensions already agree, otherwise a Lanczos3-resampled copy.
#[must_use]
pub fn reconcile_dimensions<'a>(white: &RgbImage, black: &'a RgbImage) -> Cow<'a, RgbImage> {
    if white.dimensions() == black.dimensions() {
        return Cow::Borrowed(black);
    }
    tracing::debug!(
        from_w = black.width(),
        from_h = black.height(),
        to_w = white.width(),
        to_h = white.height(),
        "resampling black-background image"
    );
    Cow::Owned(imageops::resize(
        black,
        white.width(),
        white.height(),
        FilterType::Lanczos3,
    ))
}

/// Recover an RGBA image from a white/black background pair.
///
/// The black image is resampled first if its dimensions differ. The result has
/// the white image's dimensions.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] if the pixel buffers still disagree in
/// size after reconciliation.
pub fn recover_rgba(white: &RgbImage, black: &RgbImage) -> Result<RgbaImage> {
    let black = reconcile_dimensions(white, black);
    recover_rgba_from_raw(white.width(), white.height(), white.as_raw(), black.as_raw())
}

/// Recover an RGBA image from raw, row-major RGB8 buffers.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] if the two buffers differ in length or
/// do not hold exactly `width * height` RGB pixels.
pub fn recover_rgba_from_raw(
    width: u32,
    height: u32,
    white: &[u8],
    black: &[u8],
) -> Result<RgbaImage> {
    let mismatch = || Error::DimensionMismatch {
        white_len: white.len(),
        black_len: black.len(),
    };
    if white.len() != black.len() {
        return Err(mismatch());
    }
    let expected = u64::from(width) * u64::from(height) * 3;
    if white.len() as u64 != expected {
        return Err(mismatch());
    }

    let data = map_pixels(white, black);
    RgbaImage::from_raw(width, height, data).ok_or_else(mismatch)
}

#[cfg(feature = "parallel")]
fn map_pixels(white: &[u8], black: &[u8]) -> Vec<u8> {
    use rayon::prelude::*;
    white
        .par_chunks_exact(3)
        .zip(black.par_chunks_exact(3))
        .flat_map_iter(|(w, b)| recover_pixel([w[0], w[1], w[2]], [b[0], b[1], b[2]]))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn map_pixels(white: &[u8], black: &[u8]) -> Vec<u8> {
    white
        .chunks_exact(3)
        .zip(black.chunks_exact(3))
        .flat_map(|(w, b)| recover_pixel([w[0], w[1], w[2]], [b[0], b[1], b[2]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn bg_dist_matches_white_black_distance() {
        let computed = (3.0_f32 * 255.0 * 255.0).sqrt();
        assert!((computed - BG_DIST).abs() < 1e-3);
    }

    #[test]
    fn identical_pixels_are_fully_opaque() {
        for v in [[0, 0, 0], [255, 255, 255], [12, 200, 77], [128, 128, 128]] {
            let px = recover_pixel(v, v);
            assert_eq!(px, [v[0], v[1], v[2], 255], "input {v:?}");
        }
    }

    #[test]
    fn white_over_black_is_fully_transparent() {
        assert_eq!(recover_pixel([255, 255, 255], [0, 0, 0]), [0, 0, 0, 0]);
    }

    #[test]
    fn grey_shift_recovers_partial_alpha() {
        // dist = sqrt(3 * 150^2) ~ 259.8, alpha ~ 0.412
        let px = recover_pixel([200, 200, 200], [50, 50, 50]);
        assert_eq!(px[3], 105);
        assert_eq!(&px[..3], &[121, 121, 121]);
    }

    #[test]
    fn near_zero_alpha_emits_black() {
        // alpha = 1 - 440/441.67 ~ 0.004, under the threshold
        let px = recover_pixel([254, 254, 255], [0, 0, 0]);
        assert_eq!(&px[..3], &[0, 0, 0]);
        assert!(px[3] <= 1);
    }

    #[test]
    fn un_blended_color_is_clamped() {
        // Black brighter than white is physically impossible; still in range.
        let px = recover_pixel([0, 0, 0], [255, 255, 255]);
        assert_eq!(px, [0, 0, 0, 0]);

        // alpha ~ 0.215; red would un-blend to ~1160
        let px = recover_pixel([255, 255, 255], [250, 10, 10]);
        assert_eq!(px[0], 255);
        assert_eq!(px[1], 46);
        assert_eq!(px[3], 55);
    }

    #[test]
    fn channel_sweep_honours_opacity_and_threshold() {
        let levels = [0u8, 1, 2, 64, 127, 128, 200, 254, 255];
        for &w in &levels {
            for &b in &levels {
                let px = recover_pixel([w, b, w], [b, w, b]);
                if w == b {
                    assert_eq!(px, [b, b, b, 255], "w == b == {b}");
                }
                if f32::from(px[3]) / 255.0 <= MIN_ALPHA {
                    assert_eq!(&px[..3], &[0, 0, 0], "w {w}, b {b}");
                }

                let grey = recover_pixel([w, w, w], [b, b, b]);
                if w == 255 && b == 0 {
                    assert_eq!(grey, [0, 0, 0, 0]);
                }
                if w == b {
                    assert_eq!(grey[3], 255);
                }
            }
        }
    }

    #[test]
    fn reconcile_borrows_when_sizes_match() {
        let white = RgbImage::new(4, 3);
        let black = RgbImage::new(4, 3);
        assert!(matches!(
            reconcile_dimensions(&white, &black),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn reconcile_resizes_black_to_white_dimensions() {
        let white = RgbImage::from_pixel(8, 6, Rgb([40, 40, 40]));
        let black = RgbImage::from_pixel(4, 3, Rgb([40, 40, 40]));
        let out = recover_rgba(&white, &black).unwrap();
        assert_eq!(out.dimensions(), (8, 6));
        for px in out.pixels() {
            assert!(px[3] >= 250, "expected near-opaque, got {:?}", px.0);
        }
    }

    #[test]
    fn raw_buffers_of_different_length_are_rejected() {
        let white = vec![0u8; 2 * 2 * 3];
        let black = vec![0u8; 2 * 2 * 3 - 3];
        let err = recover_rgba_from_raw(2, 2, &white, &black).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                white_len: 12,
                black_len: 9
            }
        ));
    }

    #[test]
    fn raw_buffers_not_matching_dimensions_are_rejected() {
        let buf = vec![0u8; 5 * 3];
        let err = recover_rgba_from_raw(2, 2, &buf, &buf).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn recovery_is_deterministic() {
        let white = RgbImage::from_fn(16, 9, |x, y| Rgb([(x * 15) as u8, (y * 27) as u8, 255]));
        let black = RgbImage::from_fn(16, 9, |x, y| Rgb([(x * 7) as u8, (y * 3) as u8, 0]));
        let first = recover_rgba(&white, &black).unwrap();
        let second = recover_rgba(&white, &black).unwrap();
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn forward_composite_round_trips_within_tolerance() {
        let fg = [180.0_f32, 90.0, 30.0];
        let alpha = 0.6_f32;
        let compose = |bg: f32| -> [u8; 3] {
            fg.map(|c| to_channel(alpha * c + (1.0 - alpha) * bg))
        };
        let px = recover_pixel(compose(255.0), compose(0.0));
        assert!((i32::from(px[3]) - 153).abs() <= 1, "alpha {}", px[3]);
        for ch in 0..3 {
            let expected = fg[ch] as i32;
            let diff = (i32::from(px[ch]) - expected).abs();
            assert!(diff <= 2, "ch {ch}: got {}, want {expected}", px[ch]);
        }
    }
}
