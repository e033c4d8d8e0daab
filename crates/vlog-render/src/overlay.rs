//! Border overlay loading.

use std::path::Path;

use image::imageops::FilterType;
use tracing::warn;

use crate::error::{RenderError, RenderResult};

/// Load a border image as a full-frame straight-alpha RGBA raster.
///
/// Borders are authored at the output geometry; anything else is resized
/// with a warning so a template cannot take down a run over a few pixels.
pub fn load_border_rgba(path: &Path, width: u32, height: u32) -> RenderResult<Vec<u8>> {
    let img = image::open(path)
        .map_err(|e| RenderError::config(format!("unusable border {}: {e}", path.display())))?
        .to_rgba8();

    let raster = if img.dimensions() == (width, height) {
        img
    } else {
        warn!(
            path = %path.display(),
            actual = ?img.dimensions(),
            expected = ?(width, height),
            "border resized to output geometry"
        );
        image::imageops::resize(&img, width, height, FilterType::Lanczos3)
    };

    Ok(raster.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_and_resizes_border() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("border.png");
        image::RgbaImage::from_pixel(8, 8, image::Rgba([1, 2, 3, 128]))
            .save(&path)
            .unwrap();

        let raster = load_border_rgba(&path, 16, 4).unwrap();
        assert_eq!(raster.len(), 16 * 4 * 4);
    }

    #[test]
    fn unreadable_border_is_a_config_error() {
        let err = load_border_rgba(Path::new("/missing/border.png"), 8, 8).unwrap_err();
        assert!(matches!(err, RenderError::Config(_)));
    }
}
