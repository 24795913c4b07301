use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::{ColorType, DynamicImage, GrayImage, ImageEncoder, ImageError};

use crate::canvas::{ColorMode, LayerStack, Raster};
use crate::error::{EditorError, Result};

/// JPEG quality used for exports.
pub const JPEG_QUALITY: u8 = 95;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
    Tiff,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tiff => "tiff",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "bmp" => Some(SaveFormat::Bmp),
            "tif" | "tiff" => Some(SaveFormat::Tiff),
            _ => None,
        }
    }

    /// Format implied by a path's extension; PNG when there is none.
    pub fn for_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            None => Ok(SaveFormat::Png),
            Some(ext) => Self::from_extension(ext)
                .ok_or_else(|| EditorError::validation(format!("unsupported export format '.{}'", ext))),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> EditorError {
    EditorError::Io { path: path.to_path_buf(), source }
}

/// Decoding errors that are really file-access errors keep their path.
fn image_error(path: &Path, err: ImageError) -> EditorError {
    match err {
        ImageError::IoError(source) => io_error(path, source),
        other => EditorError::Image(other),
    }
}

/// Decode any supported picture from disk.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|e| image_error(path, e))
}

/// Encode an 8-bit grayscale image to `path`.
pub fn encode_and_write(image: &GrayImage, path: &Path, format: SaveFormat) -> Result<()> {
    let file = File::create(path).map_err(|e| io_error(path, e))?;
    let mut writer = BufWriter::new(file);
    let (w, h) = image.dimensions();
    let data = image.as_raw();

    let encoded = match format {
        SaveFormat::Png => PngEncoder::new(&mut writer).write_image(data, w, h, ColorType::L8),
        SaveFormat::Jpeg => {
            JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).write_image(data, w, h, ColorType::L8)
        }
        SaveFormat::Bmp => BmpEncoder::new(&mut writer).write_image(data, w, h, ColorType::L8),
        SaveFormat::Tiff => TiffEncoder::new(&mut writer).write_image(data, w, h, ColorType::L8),
    };
    encoded.map_err(|e| image_error(path, e))?;
    writer.flush().map_err(|e| io_error(path, e))
}

/// Full-resolution grayscale composite, no alpha blending.
pub fn export_image(stack: &LayerStack) -> GrayImage {
    match stack.compose(ColorMode::Gray, false) {
        Raster::Gray(img) => img,
        other => other.to_gray(),
    }
}

/// Write the flattened mask to a caller-chosen path.
pub fn export(stack: &LayerStack, path: &Path) -> Result<()> {
    let format = SaveFormat::for_path(path)?;
    encode_and_write(&export_image(stack), path, format)
}

/// `mask_<YYYYMMDD_HHMMSS>.<ext>`
pub fn quick_export_name(now: chrono::DateTime<chrono::Local>, format: SaveFormat) -> String {
    format!("mask_{}.{}", now.format("%Y%m%d_%H%M%S"), format.extension())
}

/// Export under an auto-generated name in `dir`.  Returns the path written.
pub fn quick_export(stack: &LayerStack, dir: &Path, format: SaveFormat) -> Result<PathBuf> {
    let path = dir.join(quick_export_name(chrono::Local::now(), format));
    encode_and_write(&export_image(stack), &path, format)?;
    Ok(path)
}

/// Write a display raster (any format) as grayscale PNG.
pub fn save_frame(raster: &Raster, path: &Path) -> Result<()> {
    encode_and_write(&raster.to_gray(), path, SaveFormat::Png)
}
