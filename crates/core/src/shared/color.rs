//! BT.601 limited-range conversions between RGB and planar 4:2:0 (I420).
//!
//! Capture backends that start from RGB pixels (still images, the test
//! pattern) use these to produce the planar layout the pipeline carries;
//! renderers use them to turn the planar buffer back into RGBA.

/// Byte length of a planar 4:2:0 image: a full-resolution luma plane plus
/// two quarter-resolution chroma planes.
pub fn i420_len(width: u32, height: u32) -> usize {
    3 * (width as usize) * (height as usize) / 2
}

/// Returns true when both dimensions can be split into 2x2 chroma blocks.
pub fn is_i420_compatible(width: u32, height: u32) -> bool {
    width > 0 && height > 0 && width % 2 == 0 && height % 2 == 0
}

pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (clamp(y), clamp(u), clamp(v))
}

pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    [
        clamp((298 * c + 409 * e + 128) >> 8),
        clamp((298 * c - 100 * d - 208 * e + 128) >> 8),
        clamp((298 * c + 516 * d + 128) >> 8),
    ]
}

/// Converts tightly packed RGB24 into `dst`, which must be `i420_len` bytes.
///
/// Chroma is taken from the average colour of each 2x2 block.
pub fn rgb_to_i420(rgb: &[u8], width: u32, height: u32, dst: &mut [u8]) {
    let w = width as usize;
    let h = height as usize;
    debug_assert!(is_i420_compatible(width, height));
    debug_assert_eq!(rgb.len(), w * h * 3);
    debug_assert_eq!(dst.len(), i420_len(width, height));

    let (luma, chroma) = dst.split_at_mut(w * h);
    let (u_plane, v_plane) = chroma.split_at_mut(w * h / 4);

    for (i, px) in rgb.chunks_exact(3).enumerate() {
        luma[i] = rgb_to_yuv(px[0], px[1], px[2]).0;
    }

    let cw = w / 2;
    for cy in 0..h / 2 {
        for cx in 0..cw {
            let mut sum = [0u32; 3];
            for (dy, dx) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                let idx = ((cy * 2 + dy) * w + cx * 2 + dx) * 3;
                sum[0] += rgb[idx] as u32;
                sum[1] += rgb[idx + 1] as u32;
                sum[2] += rgb[idx + 2] as u32;
            }
            let (_, u, v) = rgb_to_yuv((sum[0] / 4) as u8, (sum[1] / 4) as u8, (sum[2] / 4) as u8);
            u_plane[cy * cw + cx] = u;
            v_plane[cy * cw + cx] = v;
        }
    }
}

fn clamp(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::original_canvas(400, 300, 180_000)]
    #[case::tiny(4, 2, 12)]
    #[case::hd(1280, 720, 1_382_400)]
    fn test_i420_len(#[case] w: u32, #[case] h: u32, #[case] expected: usize) {
        assert_eq!(i420_len(w, h), expected);
    }

    #[rstest]
    #[case::odd_width(3, 2, false)]
    #[case::odd_height(4, 3, false)]
    #[case::zero(0, 2, false)]
    #[case::even(4, 2, true)]
    fn test_is_i420_compatible(#[case] w: u32, #[case] h: u32, #[case] expected: bool) {
        assert_eq!(is_i420_compatible(w, h), expected);
    }

    #[test]
    fn test_white_and_black_hit_limited_range_extremes() {
        assert_eq!(rgb_to_yuv(255, 255, 255), (235, 128, 128));
        assert_eq!(rgb_to_yuv(0, 0, 0), (16, 128, 128));
    }

    #[test]
    fn test_yuv_to_rgb_inverts_extremes() {
        assert_eq!(yuv_to_rgb(235, 128, 128), [255, 255, 255]);
        assert_eq!(yuv_to_rgb(16, 128, 128), [0, 0, 0]);
    }

    #[test]
    fn test_round_trip_stays_close_for_saturated_colours() {
        for rgb in [[255u8, 0, 0], [0, 255, 0], [0, 0, 255], [120, 60, 200]] {
            let (y, u, v) = rgb_to_yuv(rgb[0], rgb[1], rgb[2]);
            let back = yuv_to_rgb(y, u, v);
            for c in 0..3 {
                let diff = (back[c] as i32 - rgb[c] as i32).abs();
                assert!(diff <= 3, "{rgb:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn test_rgb_to_i420_layout() {
        // 4x2 image: left half white, right half black
        let mut rgb = Vec::new();
        for _row in 0..2 {
            for col in 0..4 {
                let v = if col < 2 { 255 } else { 0 };
                rgb.extend_from_slice(&[v, v, v]);
            }
        }
        let mut dst = vec![0u8; i420_len(4, 2)];
        rgb_to_i420(&rgb, 4, 2, &mut dst);

        assert_eq!(&dst[..8], &[235, 235, 16, 16, 235, 235, 16, 16]);
        // Two chroma samples per plane, all neutral for grey input
        assert_eq!(&dst[8..], &[128, 128, 128, 128]);
    }
}
