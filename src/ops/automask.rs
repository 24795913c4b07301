// ============================================================================
// AUTO MASK: threshold intersection across layers, applied to the target
// ============================================================================
//
// The target is the last entry of the stack.  Every other layer that is
// visible and of the right format "qualifies" for a threshold pass:
//   grayscale layers  → value in [min, max]       (or == 255 with no thresholds)
//   RGB layers        → LAB colour inside the box
// Per-format maps are AND-reduced, the two results AND-ed together, and every
// selected pixel of the target is set to ink.

use std::borrow::Cow;

use image::{GrayImage, Luma, RgbImage};
use rayon::prelude::*;

use crate::canvas::{ColorMode, INK, LayerStack, Raster};
use crate::components::history::{HistoryManager, StackSnapshot};
use crate::error::{EditorError, Result};
use crate::settings::{GrayThreshold, LabThreshold};

/// Outcome of a successful pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutoMaskReport {
    pub target_name: String,
    pub gray_layers: usize,
    pub lab_layers: usize,
    pub masked_pixels: usize,
}

/// Boolean map in row-major order, one entry per pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaskMap {
    pub width: u32,
    pub height: u32,
    pub bits: Vec<bool>,
}

impl MaskMap {
    fn and_with(&mut self, other: &[bool]) {
        self.bits
            .par_iter_mut()
            .zip(other.par_iter())
            .for_each(|(a, &b)| *a = *a && b);
    }

    pub fn count(&self) -> usize {
        self.bits.par_iter().filter(|&&b| b).count()
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[(y * self.width + x) as usize]
    }
}

// ----------------------------------------------------------------------------
//  Colour conversion
// ----------------------------------------------------------------------------

fn srgb_to_linear(c: u8) -> f32 {
    let c = c as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn lab_f(t: f32) -> f32 {
    if t > 0.008856 {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

/// sRGB → CIE L*a*b* (D65).  L is rescaled to 0..=255; a and b are signed,
/// rounded and clamped to -128..=127.
pub fn rgb_to_lab(r: u8, g: u8, b: u8) -> (u8, i16, i16) {
    let (r, g, b) = (srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b));

    let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / 0.950456;
    let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
    let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / 1.088754;

    let l = if y > 0.008856 { 116.0 * y.cbrt() - 16.0 } else { 903.3 * y };
    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    let a = 500.0 * (fx - fy);
    let bb = 200.0 * (fy - fz);

    (
        (l * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8,
        a.round().clamp(-128.0, 127.0) as i16,
        bb.round().clamp(-128.0, 127.0) as i16,
    )
}

// ----------------------------------------------------------------------------
//  Threshold maps
// ----------------------------------------------------------------------------

pub fn gray_band_map(img: &GrayImage, t: GrayThreshold) -> Vec<bool> {
    img.as_raw().par_iter().map(|&v| t.contains(v)).collect()
}

pub fn gray_white_map(img: &GrayImage) -> Vec<bool> {
    img.as_raw().par_iter().map(|&v| v == 255).collect()
}

pub fn lab_box_map(img: &RgbImage, t: LabThreshold) -> Vec<bool> {
    img.as_raw()
        .par_chunks_exact(3)
        .map(|p| {
            let (l, a, b) = rgb_to_lab(p[0], p[1], p[2]);
            t.contains(l, a, b)
        })
        .collect()
}

fn at_size(raster: &Raster, w: u32, h: u32) -> Cow<'_, Raster> {
    if raster.dimensions() == (w, h) {
        Cow::Borrowed(raster)
    } else {
        Cow::Owned(raster.resized(w, h))
    }
}

fn fold(acc: &mut Option<MaskMap>, bits: Vec<bool>, w: u32, h: u32) {
    match acc {
        Some(map) => map.and_with(&bits),
        None => *acc = Some(MaskMap { width: w, height: h, bits }),
    }
}

/// Compute the final mask without touching the stack.
///
/// Returns the map plus how many gray / RGB layers took part.  Fails when
/// fewer than two layers exist or when no qualifying layer produced a map.
pub fn compute_mask(
    stack: &LayerStack,
    gray: Option<GrayThreshold>,
    lab: Option<LabThreshold>,
) -> Result<(MaskMap, usize, usize)> {
    if stack.len() < 2 {
        return Err(EditorError::precondition("auto mask needs at least two layers"));
    }
    let (w, h) = (stack.width(), stack.height());
    let sources = &stack.layers()[..stack.len() - 1];

    let mut gray_acc: Option<MaskMap> = None;
    let mut lab_acc: Option<MaskMap> = None;
    let mut gray_layers = 0;
    let mut lab_layers = 0;

    for layer in sources.iter().filter(|l| l.visible) {
        let raster = at_size(&layer.raster, w, h);
        match raster.as_ref() {
            Raster::Gray(img) => {
                let bits = match (gray, lab) {
                    (Some(t), _) => gray_band_map(img, t),
                    (None, None) => gray_white_map(img),
                    (None, Some(_)) => continue,
                };
                fold(&mut gray_acc, bits, w, h);
                gray_layers += 1;
            }
            Raster::Rgb(img) => {
                let Some(t) = lab else { continue };
                fold(&mut lab_acc, lab_box_map(img, t), w, h);
                lab_layers += 1;
            }
        }
    }

    let mask = match (gray_acc, lab_acc) {
        (Some(mut g), Some(l)) => {
            g.and_with(&l.bits);
            g
        }
        (Some(g), None) => g,
        (None, Some(l)) => l,
        (None, None) => {
            return Err(EditorError::precondition(
                "no qualifying layer for the configured thresholds",
            ));
        }
    };
    Ok((mask, gray_layers, lab_layers))
}

/// Black out every selected pixel of the target (last) layer, converting it
/// to grayscale first.  One history entry on success; an empty selection is
/// refused and leaves everything untouched.
pub fn auto_mask(
    stack: &mut LayerStack,
    history: &mut HistoryManager,
    gray: Option<GrayThreshold>,
    lab: Option<LabThreshold>,
) -> Result<AutoMaskReport> {
    let (mask, gray_layers, lab_layers) = compute_mask(stack, gray, lab)?;
    let masked_pixels = mask.count();
    if masked_pixels == 0 {
        return Err(EditorError::precondition(
            "no qualifying layer selects any pixel for the configured thresholds",
        ));
    }

    let before = StackSnapshot::capture(stack);
    let target = stack.last_mut();
    target.raster.coerce(ColorMode::Gray);
    if let Raster::Gray(img) = &mut target.raster {
        for (px, &hit) in img.pixels_mut().zip(mask.bits.iter()) {
            if hit {
                *px = Luma([INK]);
            }
        }
    }
    let target_name = target.name.clone();
    history.push("Auto Mask", before);

    Ok(AutoMaskReport {
        target_name,
        gray_layers,
        lab_layers,
        masked_pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{BLANK, Layer};
    use crate::settings::Resolution;
    use image::Rgb;

    fn gray_from(values: &[u8], w: u32) -> Raster {
        let h = values.len() as u32 / w;
        Raster::Gray(GrayImage::from_raw(w, h, values.to_vec()).unwrap())
    }

    fn stack_with(sources: Vec<Raster>) -> LayerStack {
        let (w, h) = sources[0].dimensions();
        let mut layers: Vec<Layer> = sources
            .into_iter()
            .enumerate()
            .map(|(i, r)| Layer::new(format!("src{}", i), r))
            .collect();
        layers.push(Layer::new("target".into(), Raster::blank(ColorMode::Gray, w, h)));
        LayerStack::from_layers(Resolution { width: w, height: h }, layers).unwrap()
    }

    #[test]
    fn lab_of_primaries() {
        assert_eq!(rgb_to_lab(255, 255, 255), (255, 0, 0));
        assert_eq!(rgb_to_lab(0, 0, 0), (0, 0, 0));
        let (l, a, b) = rgb_to_lab(255, 0, 0);
        assert!((135..=137).contains(&l), "L {}", l);
        assert!(a > 70 && b > 60);
        let (_, a, _) = rgb_to_lab(0, 255, 0);
        assert!(a < -80);
    }

    #[test]
    fn gray_band_is_inclusive_at_both_ends() {
        let a = gray_from(&[99, 100, 150, 151, 120, 120], 6);
        let b = gray_from(&[120, 120, 120, 120, 99, 151], 6);
        let mut s = stack_with(vec![a, b]);
        let mut h = HistoryManager::default();
        let t = GrayThreshold::new(100, 150).unwrap();
        let report = auto_mask(&mut s, &mut h, Some(t), None).unwrap();
        assert_eq!(report.gray_layers, 2);
        assert_eq!(report.masked_pixels, 2);
        let target = &s.last().raster;
        let got: Vec<u8> = (0..6).map(|x| target.value_at(x, 0)).collect();
        assert_eq!(got, vec![BLANK, INK, INK, BLANK, BLANK, BLANK]);
        assert_eq!(h.undo_count(), 1);
    }

    #[test]
    fn fallback_masks_common_white() {
        let a = gray_from(&[255, 255, 0, 0], 4);
        let b = gray_from(&[255, 0, 255, 0], 4);
        let mut s = stack_with(vec![a, b]);
        let mut h = HistoryManager::default();
        auto_mask(&mut s, &mut h, None, None).unwrap();
        let target = &s.last().raster;
        let got: Vec<u8> = (0..4).map(|x| target.value_at(x, 0)).collect();
        assert_eq!(got, vec![INK, BLANK, BLANK, BLANK]);
    }

    #[test]
    fn invisible_and_target_layers_do_not_qualify() {
        let a = gray_from(&[255, 255], 2);
        let b = gray_from(&[0, 0], 2);
        let mut s = stack_with(vec![a, b]);
        s.layers_mut()[1].visible = false;
        let (mask, gray_layers, _) = compute_mask(&s, None, None).unwrap();
        assert_eq!(gray_layers, 1);
        assert_eq!(mask.bits, vec![true, true]);
    }

    #[test]
    fn lab_box_selects_matching_colours() {
        let mut img = RgbImage::from_pixel(2, 1, Rgb([255, 255, 255]));
        img.put_pixel(1, 0, Rgb([255, 0, 0]));
        let mut s = stack_with(vec![Raster::Rgb(img)]);
        let mut h = HistoryManager::default();
        let near_white = LabThreshold::new([200, 255, -10, 10, -10, 10]).unwrap();
        let report = auto_mask(&mut s, &mut h, None, Some(near_white)).unwrap();
        assert_eq!(report.lab_layers, 1);
        assert_eq!(s.last().raster.value_at(0, 0), INK);
        assert_eq!(s.last().raster.value_at(1, 0), BLANK);
    }

    #[test]
    fn gray_and_lab_results_are_intersected() {
        let g = gray_from(&[120, 120], 2);
        let mut img = RgbImage::from_pixel(2, 1, Rgb([255, 255, 255]));
        img.put_pixel(0, 0, Rgb([0, 0, 255]));
        let s = stack_with(vec![g, Raster::Rgb(img)]);
        let gt = GrayThreshold::new(100, 150).unwrap();
        let lt = LabThreshold::new([200, 255, -10, 10, -10, 10]).unwrap();
        let (mask, gl, ll) = compute_mask(&s, Some(gt), Some(lt)).unwrap();
        assert_eq!((gl, ll), (1, 1));
        assert_eq!(mask.bits, vec![false, true]);
    }

    #[test]
    fn too_few_layers_or_no_qualifier_fail_without_mutation() {
        let mut s = LayerStack::new(Resolution { width: 2, height: 2 });
        let mut h = HistoryManager::default();
        assert!(auto_mask(&mut s, &mut h, None, None).unwrap_err().is_precondition());

        // Only gray sources but only a LAB threshold set
        let mut s = stack_with(vec![gray_from(&[0, 0], 2)]);
        let before = s.clone();
        let lt = LabThreshold::new([0, 255, -128, 127, -128, 127]).unwrap();
        assert!(auto_mask(&mut s, &mut h, None, Some(lt)).unwrap_err().is_precondition());
        assert_eq!(s, before);
        assert_eq!(h.undo_count(), 0);
    }

    #[test]
    fn rgb_target_is_coerced_to_gray() {
        let mut s = stack_with(vec![gray_from(&[255, 0], 2)]);
        s.last_mut().raster = Raster::blank(ColorMode::Rgb, 2, 1);
        let mut h = HistoryManager::default();
        auto_mask(&mut s, &mut h, None, None).unwrap();
        assert_eq!(s.last().raster.mode(), ColorMode::Gray);
        assert_eq!(s.last().raster.value_at(0, 0), INK);
        h.undo(&mut s);
        assert_eq!(s.last().raster.mode(), ColorMode::Rgb);
    }
}
