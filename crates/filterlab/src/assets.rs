//! Texture asset loading

use crate::device::{ColorSpace, Extent, TextureData};
use crate::{Error, Result};
use std::path::PathBuf;

/// Resolves texture paths into decoded RGBA8 pixels
pub trait AssetSource {
    fn load_texture(&self, path: &str, color_space: ColorSpace) -> Result<TextureData>;
}

/// Decodes images from a directory with the `image` crate
#[derive(Debug, Clone)]
pub struct ImageAssetSource {
    root: PathBuf,
}

impl ImageAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for ImageAssetSource {
    fn load_texture(&self, path: &str, color_space: ColorSpace) -> Result<TextureData> {
        let full_path = self.root.join(path);
        let image = image::open(&full_path).map_err(|e| Error::AssetLoad {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        tracing::info!("Loaded texture {} ({width}x{height})", full_path.display());

        Ok(TextureData {
            extent: Extent::new(width, height),
            color_space,
            pixels: rgba.into_raw(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_png() {
        let dir = std::env::temp_dir().join(format!("filterlab-assets-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let image = image::RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]));
        image.save(dir.join("tiny.png")).unwrap();

        let data = ImageAssetSource::new(&dir).load_texture("tiny.png", ColorSpace::Srgb).unwrap();
        assert_eq!(data.extent, Extent::new(4, 2));
        assert_eq!(data.pixels.len(), 4 * 2 * 4);
        assert_eq!(&data.pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_missing_texture() {
        let source = ImageAssetSource::new(std::env::temp_dir());
        assert!(matches!(
            source.load_texture("filterlab-missing.png", ColorSpace::Linear),
            Err(Error::AssetLoad { .. })
        ));
    }
}
