//! Static image loading.
//!
//! Scaling is a GPU vertex transform (see [`crate::gpu::renderer::Renderer::present`]),
//! not a CPU resize pass, so this module's only job is decoding a still image
//! into RGBA8 bytes ready for [`crate::gpu::texture::TextureCache::upload_rgba`].

use std::path::Path;

use anyhow::{Context, Result};

/// A decoded still image, ready for GPU upload.
pub struct LoadedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Decode an image file (jpg/png/webp/gif — first frame only) to RGBA8.
pub fn load_image(path: impl AsRef<Path>) -> Result<LoadedImage> {
    let path = path.as_ref();
    log::info!("loading image: {}", path.display());

    let image =
        image::open(path).with_context(|| format!("failed to load image: {}", path.display()))?;
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();

    log::info!("loaded image: {width}x{height} ({})", path.display());

    Ok(LoadedImage {
        width,
        height,
        rgba: rgba.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_png_to_rgba8() {
        let file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        let img = image::RgbaImage::from_pixel(4, 3, image::Rgba([10, 20, 30, 255]));
        image::DynamicImage::ImageRgba8(img).save(file.path()).unwrap();

        let loaded = load_image(file.path()).unwrap();
        assert_eq!((loaded.width, loaded.height), (4, 3));
        assert_eq!(loaded.rgba.len(), 4 * 3 * 4);
        assert_eq!(&loaded.rgba[0..4], &[10, 20, 30, 255]);
    }
}
