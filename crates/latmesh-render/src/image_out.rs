use image::{ImageError, RgbImage};
use std::fs;
use std::path::Path;

/// Write `image` as PNG, creating parent directories first.
pub fn write_png(path: &Path, image: &RgbImage) -> Result<(), ImageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(ImageError::IoError)?;
        }
    }
    image.save_with_format(path, image::ImageFormat::Png)
}
