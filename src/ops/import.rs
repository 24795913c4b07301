// ============================================================================
// IMPORT: external picture → processed raster → fitted new top layer
// ============================================================================

use image::{DynamicImage, GrayImage, Luma};
use rayon::prelude::*;

use crate::canvas::{BLANK, ImageRect, Layer, LayerStack, Raster};
use crate::components::history::{HistoryManager, StackSnapshot};
use crate::error::{EditorError, Result};
use crate::ops::automask::rgb_to_lab;
use crate::settings::{GrayThreshold, ImportMode, LabThreshold, Resolution};

/// How a processed picture is brought to the target resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitPolicy {
    /// Source rectangle, resampled to target if its size differs.
    Crop(ImageRect),
    /// Source smaller in both dimensions, centred on background.
    CenterPad,
    /// Whole source resampled to target.
    ScaleUp,
}

impl FitPolicy {
    /// A target-sized window centred on the source, clipped to the source.
    pub fn centered_crop(source: (u32, u32), target: Resolution) -> Self {
        let w = target.width.min(source.0);
        let h = target.height.min(source.1);
        FitPolicy::Crop(ImageRect::from_origin_size((source.0 - w) / 2, (source.1 - h) / 2, w, h))
    }
}

/// Thresholds used by [`ImportMode::Binary`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BinaryThresholds {
    pub gray: GrayThreshold,
    pub lab: LabThreshold,
}

fn is_gray_source(img: &DynamicImage) -> bool {
    matches!(img, DynamicImage::ImageLuma8(_) | DynamicImage::ImageLuma16(_))
}

/// Apply the processing mode.  Binary output is pure 0 / 255: a grayscale
/// source is banded by the gray threshold, anything else by the LAB box.
pub fn process(img: &DynamicImage, mode: ImportMode, thresholds: &BinaryThresholds) -> Raster {
    match mode {
        ImportMode::Grayscale => Raster::Gray(luma_of(img)),
        ImportMode::Color => Raster::Rgb(img.to_rgb8()),
        ImportMode::Binary if is_gray_source(img) => {
            let mut gray = img.to_luma8();
            let t = thresholds.gray;
            gray.par_iter_mut().for_each(|v| *v = if t.contains(*v) { 255 } else { 0 });
            Raster::Gray(gray)
        }
        ImportMode::Binary => {
            let rgb = img.to_rgb8();
            let t = thresholds.lab;
            let data: Vec<u8> = rgb
                .as_raw()
                .par_chunks_exact(3)
                .map(|p| {
                    let (l, a, b) = rgb_to_lab(p[0], p[1], p[2]);
                    if t.contains(l, a, b) { 255 } else { 0 }
                })
                .collect();
            let (w, h) = rgb.dimensions();
            Raster::Gray(GrayImage::from_raw(w, h, data).unwrap_or_else(|| GrayImage::from_pixel(w, h, Luma([0]))))
        }
    }
}

/// Rec.601 luma through the same path layers use.
fn luma_of(img: &DynamicImage) -> GrayImage {
    if is_gray_source(img) {
        img.to_luma8()
    } else {
        Raster::Rgb(img.to_rgb8()).to_gray()
    }
}

/// Bring `raster` to exactly `target`.
pub fn fit(raster: &Raster, policy: FitPolicy, target: Resolution) -> Result<Raster> {
    let (sw, sh) = raster.dimensions();
    let (tw, th) = target.as_tuple();
    match policy {
        FitPolicy::Crop(rect) => {
            let r = rect.clamped(sw, sh);
            if r.is_empty() {
                return Err(EditorError::validation(format!(
                    "crop rectangle {}x{} at ({}, {}) lies outside the {}x{} source",
                    rect.width(),
                    rect.height(),
                    rect.x0,
                    rect.y0,
                    sw,
                    sh
                )));
            }
            Ok(raster.crop(r).resized(tw, th))
        }
        FitPolicy::CenterPad => {
            if sw >= tw || sh >= th {
                return Err(EditorError::validation(format!(
                    "centering needs a source smaller than {}x{} in both dimensions, got {}x{}",
                    tw, th, sw, sh
                )));
            }
            let mut canvas = Raster::new_filled(raster.mode(), tw, th, BLANK);
            canvas.paste(raster, ((tw - sw) / 2) as i64, ((th - sh) / 2) as i64);
            Ok(canvas)
        }
        FitPolicy::ScaleUp => Ok(raster.resized(tw, th)),
    }
}

/// Process, fit, and append as a new current layer.  One history entry.
/// Returns the new layer's name.
pub fn import_layer(
    stack: &mut LayerStack,
    history: &mut HistoryManager,
    img: &DynamicImage,
    mode: ImportMode,
    policy: FitPolicy,
    thresholds: &BinaryThresholds,
) -> Result<String> {
    let processed = process(img, mode, thresholds);
    let fitted = fit(&processed, policy, stack.resolution())?;
    let name = stack.unique_layer_name();
    let before = StackSnapshot::capture(stack);
    stack.push(Layer::new(name.clone(), fitted))?;
    history.push("Import Image", before);
    Ok(name)
}
