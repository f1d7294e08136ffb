//! Vertex-space scale/offset pairs for each scaling mode.
//!
//! The renderer always draws a quad spanning the whole output; these
//! functions only compute how much to shrink or grow that quad around its
//! centre so the sampled texture ends up filled, fit, stretched, or shown at
//! native size. No pixels are ever resized on the CPU.

use murkwall_common::ScaleMode;

const MIN_SCALE: f32 = 0.1;
const MAX_SCALE: f32 = 10.0;

/// Compute the `(scale, offset)` pair `Renderer::present`/`blend` expect.
///
/// `panscan` only affects [`ScaleMode::Stretch`] (uniform scale factor) and
/// [`ScaleMode::Panscan`] (how tightly the fit-inside crops toward fill);
/// it is ignored by `Fill` and `Original`.
pub fn compute_scale(
    mode: ScaleMode,
    media_width: u32,
    media_height: u32,
    output_width: u32,
    output_height: u32,
    panscan: f32,
) -> ([f32; 2], [f32; 2]) {
    let video_aspect = media_width as f32 / media_height.max(1) as f32;
    let display_aspect = output_width as f32 / output_height.max(1) as f32;

    let (sx, sy) = match mode {
        ScaleMode::Fill => (
            (video_aspect / display_aspect).max(1.0),
            (display_aspect / video_aspect).max(1.0),
        ),
        ScaleMode::Stretch => (panscan, panscan),
        ScaleMode::Original => (
            media_width as f32 / output_width.max(1) as f32,
            media_height as f32 / output_height.max(1) as f32,
        ),
        ScaleMode::Panscan => {
            // Fit entirely inside the output (letterbox/pillarbox), then
            // scale both axes uniformly by `panscan`.
            let mut sx = panscan;
            let mut sy = panscan;
            if video_aspect > display_aspect {
                sy *= display_aspect / video_aspect;
            } else {
                sx *= video_aspect / display_aspect;
            }
            (sx, sy)
        }
    };

    (
        [sx.clamp(MIN_SCALE, MAX_SCALE), sy.clamp(MIN_SCALE, MAX_SCALE)],
        [0.0, 0.0],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_crops_a_wider_video_on_a_taller_display() {
        // 16:9 media on a 4:3 display: video is relatively wider, so x
        // overflows (crops) and y stays at 1.
        let (scale, offset) = compute_scale(ScaleMode::Fill, 1920, 1080, 1024, 768, 1.0);
        let expected_sx = (1920.0 / 1080.0) / (1024.0 / 768.0);
        assert!((scale[0] - expected_sx).abs() < 1e-4);
        assert!((scale[1] - 1.0).abs() < 1e-4);
        assert_eq!(offset, [0.0, 0.0]);
    }

    #[test]
    fn stretch_ignores_aspect_and_uses_panscan_as_uniform_scale() {
        let (scale, _) = compute_scale(ScaleMode::Stretch, 1920, 1080, 800, 600, 1.0);
        assert_eq!(scale, [1.0, 1.0]);
    }

    #[test]
    fn original_uses_native_pixel_ratio() {
        let (scale, _) = compute_scale(ScaleMode::Original, 640, 480, 1920, 1080, 1.0);
        assert!((scale[0] - 640.0 / 1920.0).abs() < 1e-4);
        assert!((scale[1] - 480.0 / 1080.0).abs() < 1e-4);
    }

    #[test]
    fn panscan_one_fits_entirely_inside_a_mismatched_display() {
        // Media wider than display: y axis shrinks to preserve aspect.
        let (scale, _) = compute_scale(ScaleMode::Panscan, 1920, 1080, 1024, 1024, 1.0);
        assert!((scale[0] - 1.0).abs() < 1e-4);
        let display_aspect = 1024.0f32 / 1024.0;
        let video_aspect = 1920.0f32 / 1080.0;
        assert!((scale[1] - display_aspect / video_aspect).abs() < 1e-4);
    }

    #[test]
    fn scale_is_clamped_to_the_documented_range() {
        let (scale, _) = compute_scale(ScaleMode::Original, 50_000, 1, 1, 1, 1.0);
        assert_eq!(scale[0], MAX_SCALE);
    }
}
