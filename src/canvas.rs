use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use rayon::prelude::*;

use crate::error::{EditorError, Result};
use crate::settings::Resolution;

/// Background value of a blank mask ("paper").
pub const BLANK: u8 = 255;
/// Value written by painting ("ink").
pub const INK: u8 = 0;

/// Alpha assigned to a layer hidden from the layer panel.
pub const HIDDEN_ALPHA: f32 = 0.3;

// ============================================================================
// IMAGE-SPACE RECTANGLE
// ============================================================================

/// Axis-aligned rectangle in image pixels, `x0..x1` × `y0..y1` (ends exclusive).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl ImageRect {
    /// Build from two corners in any order.
    pub fn from_corners(ax: u32, ay: u32, bx: u32, by: u32) -> Self {
        Self {
            x0: ax.min(bx),
            y0: ay.min(by),
            x1: ax.max(bx),
            y1: ay.max(by),
        }
    }

    pub fn from_origin_size(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x0: x, y0: y, x1: x + w, y1: y + h }
    }

    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    /// Intersect with the `w × h` image bounds.
    pub fn clamped(&self, w: u32, h: u32) -> Self {
        Self {
            x0: self.x0.min(w),
            y0: self.y0.min(h),
            x1: self.x1.min(w),
            y1: self.y1.min(h),
        }
    }

    /// Start corner rounded down, end corner rounded up to multiples of `m`.
    pub fn grid_aligned(&self, m: u32) -> Self {
        let m = m.max(1);
        Self {
            x0: (self.x0 / m) * m,
            y0: (self.y0 / m) * m,
            x1: self.x1.div_ceil(m) * m,
            y1: self.y1.div_ceil(m) * m,
        }
    }

    /// Same size, new top-left corner.
    pub fn moved_to(&self, x: u32, y: u32) -> Self {
        Self::from_origin_size(x, y, self.width(), self.height())
    }
}

// ============================================================================
// RASTER: one fixed-format pixel buffer
// ============================================================================

/// Pixel format of a raster.  Exactly one per layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ColorMode {
    #[default]
    Gray,
    Rgb,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Raster {
    Gray(GrayImage),
    Rgb(RgbImage),
}

/// Rec.601 luma, the same weights the editor uses everywhere a colour is
/// flattened to a mask value.
#[inline]
pub fn luma601(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

impl Raster {
    /// Uniformly filled raster; `value` is replicated across RGB channels.
    pub fn new_filled(mode: ColorMode, width: u32, height: u32, value: u8) -> Self {
        match mode {
            ColorMode::Gray => Raster::Gray(GrayImage::from_pixel(width, height, Luma([value]))),
            ColorMode::Rgb => Raster::Rgb(RgbImage::from_pixel(width, height, Rgb([value; 3]))),
        }
    }

    pub fn blank(mode: ColorMode, width: u32, height: u32) -> Self {
        Self::new_filled(mode, width, height, BLANK)
    }

    pub fn mode(&self) -> ColorMode {
        match self {
            Raster::Gray(_) => ColorMode::Gray,
            Raster::Rgb(_) => ColorMode::Rgb,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            Raster::Gray(img) => img.width(),
            Raster::Rgb(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Raster::Gray(img) => img.height(),
            Raster::Rgb(img) => img.height(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Raw interleaved samples.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Raster::Gray(img) => img.as_raw(),
            Raster::Rgb(img) => img.as_raw(),
        }
    }

    /// Flatten to grayscale (copy for gray rasters).
    pub fn to_gray(&self) -> GrayImage {
        match self {
            Raster::Gray(img) => img.clone(),
            Raster::Rgb(img) => {
                let (w, h) = img.dimensions();
                let data: Vec<u8> = img
                    .as_raw()
                    .par_chunks_exact(3)
                    .map(|p| luma601(p[0], p[1], p[2]))
                    .collect();
                GrayImage::from_raw(w, h, data).unwrap_or_else(|| GrayImage::new(w, h))
            }
        }
    }

    pub fn to_rgb(&self) -> RgbImage {
        match self {
            Raster::Rgb(img) => img.clone(),
            Raster::Gray(img) => {
                let (w, h) = img.dimensions();
                let data: Vec<u8> = img.as_raw().iter().flat_map(|&v| [v, v, v]).collect();
                RgbImage::from_raw(w, h, data).unwrap_or_else(|| RgbImage::new(w, h))
            }
        }
    }

    /// Copy in the requested format.
    pub fn converted(&self, mode: ColorMode) -> Raster {
        match mode {
            ColorMode::Gray => Raster::Gray(self.to_gray()),
            ColorMode::Rgb => Raster::Rgb(self.to_rgb()),
        }
    }

    /// Convert in place; no-op when the format already matches.
    pub fn coerce(&mut self, mode: ColorMode) {
        if self.mode() != mode {
            *self = self.converted(mode);
        }
    }

    /// High-quality (Lanczos) resample.  Returns a plain copy when the size
    /// already matches.
    pub fn resized(&self, width: u32, height: u32) -> Raster {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        match self {
            Raster::Gray(img) => Raster::Gray(imageops::resize(img, width, height, FilterType::Lanczos3)),
            Raster::Rgb(img) => Raster::Rgb(imageops::resize(img, width, height, FilterType::Lanczos3)),
        }
    }

    /// Mask value at a pixel (luma for RGB).
    pub fn value_at(&self, x: u32, y: u32) -> u8 {
        match self {
            Raster::Gray(img) => img.get_pixel(x, y).0[0],
            Raster::Rgb(img) => {
                let p = img.get_pixel(x, y).0;
                luma601(p[0], p[1], p[2])
            }
        }
    }

    /// Overwrite every pixel of `rect` (clipped to the raster) with `value`.
    pub fn fill_rect(&mut self, rect: ImageRect, value: u8) {
        let r = rect.clamped(self.width(), self.height());
        if r.is_empty() {
            return;
        }
        match self {
            Raster::Gray(img) => {
                for y in r.y0..r.y1 {
                    for x in r.x0..r.x1 {
                        img.put_pixel(x, y, Luma([value]));
                    }
                }
            }
            Raster::Rgb(img) => {
                for y in r.y0..r.y1 {
                    for x in r.x0..r.x1 {
                        img.put_pixel(x, y, Rgb([value; 3]));
                    }
                }
            }
        }
    }

    /// Fill the ellipse inscribed in the inclusive box `(left, top)..=(right, bottom)`.
    pub fn fill_ellipse(&mut self, left: u32, top: u32, right: u32, bottom: u32, value: u8) {
        let (w, h) = self.dimensions();
        if w == 0 || h == 0 || left > right || top > bottom {
            return;
        }
        let right = right.min(w - 1);
        let bottom = bottom.min(h - 1);
        let cx = (left + right) as f32 / 2.0;
        let cy = (top + bottom) as f32 / 2.0;
        let rx = (right - left) as f32 / 2.0 + 0.5;
        let ry = (bottom - top) as f32 / 2.0 + 0.5;
        for y in top..=bottom {
            for x in left..=right {
                let dx = (x as f32 - cx) / rx;
                let dy = (y as f32 - cy) / ry;
                if dx * dx + dy * dy <= 1.0 {
                    match self {
                        Raster::Gray(img) => img.put_pixel(x, y, Luma([value])),
                        Raster::Rgb(img) => img.put_pixel(x, y, Rgb([value; 3])),
                    }
                }
            }
        }
    }

    /// Mean of the first channel over `rect` (clipped).  `None` if empty.
    pub fn block_mean(&self, rect: ImageRect) -> Option<f32> {
        let r = rect.clamped(self.width(), self.height());
        if r.is_empty() {
            return None;
        }
        let mut sum: u64 = 0;
        for y in r.y0..r.y1 {
            for x in r.x0..r.x1 {
                sum += match self {
                    Raster::Gray(img) => img.get_pixel(x, y).0[0],
                    Raster::Rgb(img) => img.get_pixel(x, y).0[0],
                } as u64;
            }
        }
        Some(sum as f32 / (r.width() as u64 * r.height() as u64) as f32)
    }

    /// Copy of the pixels inside `rect` (clipped).
    pub fn crop(&self, rect: ImageRect) -> Raster {
        let r = rect.clamped(self.width(), self.height());
        match self {
            Raster::Gray(img) => {
                Raster::Gray(imageops::crop_imm(img, r.x0, r.y0, r.width(), r.height()).to_image())
            }
            Raster::Rgb(img) => {
                Raster::Rgb(imageops::crop_imm(img, r.x0, r.y0, r.width(), r.height()).to_image())
            }
        }
    }

    /// Paste `src` with its top-left corner at `(x, y)`, clipped to bounds.
    /// The fragment is converted to this raster's format first.
    pub fn paste(&mut self, src: &Raster, x: i64, y: i64) {
        let src = src.converted(self.mode());
        match (self, &src) {
            (Raster::Gray(dst), Raster::Gray(s)) => imageops::replace(dst, s, x, y),
            (Raster::Rgb(dst), Raster::Rgb(s)) => imageops::replace(dst, s, x, y),
            _ => {}
        }
    }

    /// Bounding box of every pixel whose mask value differs from `background`.
    pub fn content_bounds(&self, background: u8) -> Option<ImageRect> {
        let (w, h) = self.dimensions();
        let mut bounds: Option<ImageRect> = None;
        for y in 0..h {
            for x in 0..w {
                if self.value_at(x, y) != background {
                    let b = bounds.get_or_insert(ImageRect { x0: x, y0: y, x1: x + 1, y1: y + 1 });
                    b.x0 = b.x0.min(x);
                    b.y0 = b.y0.min(y);
                    b.x1 = b.x1.max(x + 1);
                    b.y1 = b.y1.max(y + 1);
                }
            }
        }
        bounds
    }
}

// ============================================================================
// LAYER
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub(crate) name: String,
    pub(crate) raster: Raster,
    pub visible: bool,
    /// Informational only.
    pub applied: bool,
    /// 0.0..=1.0, used by the alpha-blend composite path.
    pub alpha: f32,
    pub hidden: bool,
}

impl Layer {
    pub fn new(name: String, raster: Raster) -> Self {
        Self {
            name,
            raster,
            visible: true,
            applied: false,
            alpha: 1.0,
            hidden: false,
        }
    }

    /// Blank grayscale layer.
    pub fn blank(name: String, resolution: Resolution) -> Self {
        Self::new(name, Raster::blank(ColorMode::Gray, resolution.width, resolution.height))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    /// Contributes to a composite.
    pub fn is_shown(&self) -> bool {
        self.visible && !self.hidden
    }
}

// ============================================================================
// LAYER STACK
// ============================================================================

/// Ordered layers plus the current-layer pointer.
///
/// Invariants: never empty, every raster is `width × height`,
/// `current_index < layers.len()`.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerStack {
    layers: Vec<Layer>,
    current_index: usize,
    width: u32,
    height: u32,
}

impl LayerStack {
    /// One blank `Layer 1`.
    pub fn new(resolution: Resolution) -> Self {
        Self {
            layers: vec![Layer::blank("Layer 1".to_string(), resolution)],
            current_index: 0,
            width: resolution.width,
            height: resolution.height,
        }
    }

    /// Build from existing layers; rasters of other sizes are resampled.
    pub fn from_layers(resolution: Resolution, layers: Vec<Layer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(EditorError::precondition("a layer stack needs at least one layer"));
        }
        let mut stack = Self {
            layers: Vec::with_capacity(layers.len()),
            current_index: 0,
            width: resolution.width,
            height: resolution.height,
        };
        for mut layer in layers {
            if stack.find(&layer.name).is_some() {
                return Err(EditorError::validation(format!("duplicate layer name '{}'", layer.name)));
            }
            layer.raster = layer.raster.resized(resolution.width, resolution.height);
            stack.layers.push(layer);
        }
        stack.current_index = stack.layers.len() - 1;
        Ok(stack)
    }

    pub fn resolution(&self) -> Resolution {
        Resolution { width: self.width, height: self.height }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn get(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> &Layer {
        &self.layers[self.current_index]
    }

    pub(crate) fn current_mut(&mut self) -> &mut Layer {
        &mut self.layers[self.current_index]
    }

    pub fn last(&self) -> &Layer {
        &self.layers[self.layers.len() - 1]
    }

    pub(crate) fn last_mut(&mut self) -> &mut Layer {
        let idx = self.layers.len() - 1;
        &mut self.layers[idx]
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.name.clone()).collect()
    }

    pub fn set_current(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.current_index = index;
        Ok(())
    }

    pub fn set_visible(&mut self, index: usize, visible: bool) -> Result<()> {
        self.check_index(index)?;
        self.layers[index].visible = visible;
        Ok(())
    }

    pub fn set_hidden(&mut self, index: usize, hidden: bool) -> Result<()> {
        self.check_index(index)?;
        self.layers[index].hidden = hidden;
        Ok(())
    }

    /// Blend weight for the alpha composite path, clamped to `0.0..=1.0`.
    pub fn set_alpha(&mut self, index: usize, alpha: f32) -> Result<()> {
        self.check_index(index)?;
        if !alpha.is_finite() {
            return Err(EditorError::validation(format!("layer alpha must be finite, got {}", alpha)));
        }
        self.layers[index].alpha = alpha.clamp(0.0, 1.0);
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.layers.len() {
            return Err(EditorError::validation(format!(
                "layer index {} out of range ({} layers)",
                index,
                self.layers.len()
            )));
        }
        Ok(())
    }

    /// First free `Layer N` name, starting from `N = len + 1`.
    pub fn unique_layer_name(&self) -> String {
        let mut n = self.layers.len() + 1;
        loop {
            let name = format!("Layer {}", n);
            if self.find(&name).is_none() {
                return name;
            }
            n += 1;
        }
    }

    /// Append a blank layer and make it current.
    pub fn create_layer(&mut self) -> &Layer {
        let name = self.unique_layer_name();
        self.layers.push(Layer::blank(name, self.resolution()));
        self.current_index = self.layers.len() - 1;
        &self.layers[self.current_index]
    }

    /// Insert at `index` (clamped to the end) and make it current.
    pub fn insert(&mut self, index: usize, layer: Layer) -> Result<()> {
        if layer.name.trim().is_empty() {
            return Err(EditorError::validation("layer name cannot be empty"));
        }
        if self.find(&layer.name).is_some() {
            return Err(EditorError::validation(format!("layer '{}' already exists", layer.name)));
        }
        if layer.raster.dimensions() != (self.width, self.height) {
            return Err(EditorError::validation(format!(
                "layer raster is {}x{}, expected {}x{}",
                layer.raster.width(),
                layer.raster.height(),
                self.width,
                self.height
            )));
        }
        let idx = index.min(self.layers.len());
        self.layers.insert(idx, layer);
        self.current_index = idx;
        Ok(())
    }

    pub fn push(&mut self, layer: Layer) -> Result<()> {
        let end = self.layers.len();
        self.insert(end, layer)
    }

    /// Remove a layer; refuses to remove the last remaining one.
    pub fn remove(&mut self, index: usize) -> Result<Layer> {
        if self.layers.len() <= 1 {
            return Err(EditorError::precondition("cannot delete the last layer"));
        }
        if index >= self.layers.len() {
            return Err(EditorError::validation(format!("layer index {} out of range", index)));
        }
        let removed = self.layers.remove(index);
        if self.current_index >= self.layers.len() {
            self.current_index = self.layers.len() - 1;
        } else if self.current_index > index {
            self.current_index -= 1;
        }
        Ok(removed)
    }

    /// Listed layers take the given relative order; unlisted ones keep theirs
    /// and follow.  The current pointer follows its layer.
    pub fn reorder(&mut self, names: &[String]) -> Result<()> {
        let mut picked: Vec<usize> = Vec::with_capacity(names.len());
        for name in names {
            let Some(idx) = self.find(name) else {
                return Err(EditorError::validation(format!("no layer named '{}'", name)));
            };
            if picked.contains(&idx) {
                return Err(EditorError::validation(format!("layer '{}' listed twice", name)));
            }
            picked.push(idx);
        }
        let rest: Vec<usize> = (0..self.layers.len()).filter(|i| !picked.contains(i)).collect();
        let order: Vec<usize> = picked.into_iter().chain(rest).collect();

        let current_name = self.current().name.clone();
        let mut slots: Vec<Option<Layer>> = std::mem::take(&mut self.layers).into_iter().map(Some).collect();
        self.layers = order.iter().filter_map(|&i| slots[i].take()).collect();
        self.current_index = self.find(&current_name).unwrap_or(0);
        Ok(())
    }

    /// Position swap; the raster travels with its layer record.
    pub fn swap(&mut self, a: usize, b: usize) {
        self.layers.swap(a, b);
    }

    /// Resample every layer to a new target resolution.
    pub fn set_resolution(&mut self, resolution: Resolution) {
        self.width = resolution.width;
        self.height = resolution.height;
        self.layers.par_iter_mut().for_each(|layer| {
            layer.raster = layer.raster.resized(resolution.width, resolution.height);
        });
    }

    /// Format used for live display: the topmost shown layer's format.
    pub fn display_color_mode(&self) -> ColorMode {
        display_color_mode(&self.layers)
    }

    /// Flatten at the stack's own resolution.
    pub fn compose(&self, mode: ColorMode, apply_alpha: bool) -> Raster {
        compose(&self.layers, (self.width, self.height), mode, apply_alpha)
    }
}

// ============================================================================
// COMPOSITOR
// ============================================================================

/// Scan from the last index toward 0; first shown layer decides.  Gray if none.
pub fn display_color_mode(layers: &[Layer]) -> ColorMode {
    layers
        .iter()
        .rev()
        .find(|l| l.is_shown())
        .map(|l| l.raster.mode())
        .unwrap_or(ColorMode::Gray)
}

/// Flatten `layers` in stack order onto a blank `target_size` canvas.
///
/// Hidden / invisible layers are skipped.  Mismatched rasters are resampled.
/// With `apply_alpha`, a layer whose alpha is below 1 is linearly blended
/// onto the running composite; otherwise it is pasted opaque.
pub fn compose(layers: &[Layer], target_size: (u32, u32), mode: ColorMode, apply_alpha: bool) -> Raster {
    let (tw, th) = target_size;
    let mut composite = Raster::blank(mode, tw, th);

    for layer in layers.iter().filter(|l| l.is_shown()) {
        let img = layer.raster.resized(tw, th).converted(mode);
        let alpha = layer.alpha.clamp(0.0, 1.0);

        if apply_alpha && alpha < 1.0 {
            blend_into(&mut composite, &img, alpha);
        } else {
            composite = img;
        }
    }
    composite
}

/// `dst = dst * (1 - alpha) + src * alpha`, per sample.
fn blend_into(dst: &mut Raster, src: &Raster, alpha: f32) {
    let src_raw = src.as_bytes();
    let dst_raw: &mut [u8] = match dst {
        Raster::Gray(img) => &mut **img,
        Raster::Rgb(img) => &mut **img,
    };
    dst_raw
        .par_iter_mut()
        .zip(src_raw.par_iter())
        .for_each(|(d, &s)| {
            let v = *d as f32 * (1.0 - alpha) + s as f32 * alpha;
            *d = v.round().clamp(0.0, 255.0) as u8;
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(w: u32, h: u32) -> Resolution {
        Resolution { width: w, height: h }
    }

    fn gray_layer(name: &str, w: u32, h: u32, value: u8) -> Layer {
        Layer::new(name.to_string(), Raster::new_filled(ColorMode::Gray, w, h, value))
    }

    #[test]
    fn grid_alignment_rounds_outward() {
        let r = ImageRect::from_corners(5, 7, 13, 9).grid_aligned(4);
        assert_eq!(r, ImageRect { x0: 4, y0: 4, x1: 16, y1: 12 });
        let same = ImageRect::from_corners(8, 8, 16, 16).grid_aligned(8);
        assert_eq!(same, ImageRect { x0: 8, y0: 8, x1: 16, y1: 16 });
    }

    #[test]
    fn create_layer_appends_blank_and_selects_it() {
        let mut stack = LayerStack::new(res(4, 3));
        let name = stack.create_layer().name.clone();
        assert_eq!(name, "Layer 2");
        assert_eq!(stack.current_index(), 1);
        assert!(stack.current().raster.as_bytes().iter().all(|&v| v == BLANK));
        assert_eq!(stack.current().raster.dimensions(), (4, 3));
    }

    #[test]
    fn unique_names_skip_taken_ones() {
        let mut stack = LayerStack::new(res(2, 2));
        stack.push(gray_layer("Layer 2", 2, 2, 0)).unwrap();
        stack.create_layer();
        assert_eq!(stack.current().name, "Layer 3");
        stack.remove(0).unwrap();
        // len + 1 == 3 is taken, so the next free number is used
        assert_eq!(stack.unique_layer_name(), "Layer 4");
    }

    #[test]
    fn insert_rejects_wrong_size_and_duplicates() {
        let mut stack = LayerStack::new(res(4, 4));
        assert!(stack.insert(0, gray_layer("x", 3, 4, 0)).unwrap_err().is_validation());
        assert!(stack.insert(0, gray_layer("Layer 1", 4, 4, 0)).unwrap_err().is_validation());
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn removing_last_layer_is_a_precondition_error() {
        let mut stack = LayerStack::new(res(2, 2));
        assert!(stack.remove(0).unwrap_err().is_precondition());
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn remove_keeps_current_on_same_layer() {
        let mut stack = LayerStack::new(res(2, 2));
        stack.create_layer();
        stack.create_layer();
        stack.set_current(2).unwrap();
        stack.remove(0).unwrap();
        assert_eq!(stack.current().name, "Layer 3");
    }

    #[test]
    fn reorder_moves_listed_first_and_keeps_rest() {
        let mut stack = LayerStack::new(res(2, 2));
        stack.create_layer();
        stack.create_layer();
        stack.create_layer();
        stack.set_current(1).unwrap();
        stack
            .reorder(&["Layer 4".to_string(), "Layer 2".to_string()])
            .unwrap();
        assert_eq!(stack.names(), vec!["Layer 4", "Layer 2", "Layer 1", "Layer 3"]);
        assert_eq!(stack.current().name, "Layer 2");
        assert!(stack.reorder(&["nope".to_string()]).is_err());
        assert!(stack.reorder(&["Layer 1".to_string(), "Layer 1".to_string()]).is_err());
        assert_eq!(stack.names(), vec!["Layer 4", "Layer 2", "Layer 1", "Layer 3"]);
    }

    #[test]
    fn compose_is_deterministic_and_pure() {
        let mut stack = LayerStack::new(res(8, 8));
        stack.current_mut().raster.fill_rect(ImageRect::from_corners(0, 0, 4, 4), INK);
        stack.create_layer();
        stack.current_mut().alpha = 0.5;
        stack.current_mut().raster.fill_rect(ImageRect::from_corners(2, 2, 6, 6), 100);
        let before = stack.clone();
        let a = stack.compose(ColorMode::Gray, true);
        let b = stack.compose(ColorMode::Gray, true);
        assert_eq!(a, b);
        assert_eq!(stack, before);
    }

    #[test]
    fn compose_pastes_opaque_layers_in_order() {
        let layers = vec![gray_layer("a", 4, 4, 10), gray_layer("b", 4, 4, 200)];
        let out = compose(&layers, (4, 4), ColorMode::Gray, false);
        assert!(out.as_bytes().iter().all(|&v| v == 200));
    }

    #[test]
    fn compose_skips_hidden_and_invisible() {
        let mut layers = vec![gray_layer("a", 4, 4, 10), gray_layer("b", 4, 4, 200)];
        layers[1].visible = false;
        let out = compose(&layers, (4, 4), ColorMode::Gray, false);
        assert!(out.as_bytes().iter().all(|&v| v == 10));
        layers[1].visible = true;
        layers[1].hidden = true;
        let out = compose(&layers, (4, 4), ColorMode::Gray, false);
        assert!(out.as_bytes().iter().all(|&v| v == 10));
        layers[0].hidden = true;
        let out = compose(&layers, (4, 4), ColorMode::Gray, false);
        assert!(out.as_bytes().iter().all(|&v| v == BLANK));
    }

    #[test]
    fn flag_setters_check_the_index() {
        let mut stack = LayerStack::new(res(2, 2));
        stack.push(gray_layer("b", 2, 2, 9)).unwrap();
        stack.set_hidden(1, true).unwrap();
        stack.set_alpha(1, 1.7).unwrap();
        stack.set_visible(0, false).unwrap();
        assert!(stack.layers()[1].hidden);
        assert_eq!(stack.layers()[1].alpha, 1.0);
        assert!(!stack.layers()[0].is_shown());

        assert!(stack.set_visible(2, true).unwrap_err().is_validation());
        assert!(stack.set_hidden(5, true).unwrap_err().is_validation());
        assert!(stack.set_alpha(2, 0.5).unwrap_err().is_validation());
        assert!(stack.set_alpha(0, f32::NAN).unwrap_err().is_validation());
        assert_eq!(stack.layers()[0].alpha, 1.0);
    }

    #[test]
    fn compose_blends_partial_alpha() {
        let mut layers = vec![gray_layer("a", 2, 2, 0), gray_layer("b", 2, 2, 200)];
        layers[1].alpha = 0.25;
        let out = compose(&layers, (2, 2), ColorMode::Gray, true);
        assert!(out.as_bytes().iter().all(|&v| v == 50));
        // Without the alpha path the layer is pasted opaque
        let out = compose(&layers, (2, 2), ColorMode::Gray, false);
        assert!(out.as_bytes().iter().all(|&v| v == 200));
    }

    #[test]
    fn compose_resamples_mismatched_layers() {
        let layers = vec![gray_layer("a", 3, 3, 0)];
        let out = compose(&layers, (6, 5), ColorMode::Gray, false);
        assert_eq!(out.dimensions(), (6, 5));
        assert!(out.as_bytes().iter().all(|&v| v == 0));
    }

    #[test]
    fn display_mode_follows_topmost_shown_layer() {
        let mut layers = vec![
            Layer::new("rgb".into(), Raster::blank(ColorMode::Rgb, 2, 2)),
            gray_layer("g", 2, 2, 0),
        ];
        assert_eq!(display_color_mode(&layers), ColorMode::Gray);
        layers[1].hidden = true;
        assert_eq!(display_color_mode(&layers), ColorMode::Rgb);
        layers[0].visible = false;
        assert_eq!(display_color_mode(&layers), ColorMode::Gray);
    }

    #[test]
    fn rgb_to_gray_uses_rec601() {
        let mut img = RgbImage::new(1, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        assert_eq!(Raster::Rgb(img).to_gray().get_pixel(0, 0).0[0], 76);
    }

    #[test]
    fn content_bounds_finds_ink() {
        let mut r = Raster::blank(ColorMode::Gray, 10, 10);
        assert_eq!(r.content_bounds(BLANK), None);
        r.fill_rect(ImageRect::from_corners(2, 3, 5, 7), INK);
        assert_eq!(r.content_bounds(BLANK), Some(ImageRect { x0: 2, y0: 3, x1: 5, y1: 7 }));
    }

    #[test]
    fn paste_clips_at_edges() {
        let mut dst = Raster::blank(ColorMode::Gray, 4, 4);
        let frag = Raster::new_filled(ColorMode::Rgb, 3, 3, 0);
        dst.paste(&frag, 2, 2);
        assert_eq!(dst.value_at(3, 3), 0);
        assert_eq!(dst.value_at(1, 1), BLANK);
        assert_eq!(dst.mode(), ColorMode::Gray);
    }

    #[test]
    fn ellipse_stays_inside_its_box() {
        let mut r = Raster::blank(ColorMode::Gray, 20, 20);
        r.fill_ellipse(5, 5, 15, 15, INK);
        assert_eq!(r.value_at(10, 10), INK);
        assert_eq!(r.value_at(5, 5), BLANK);
        assert_eq!(r.value_at(4, 10), BLANK);
        let b = r.content_bounds(BLANK).unwrap();
        assert!(b.x0 >= 5 && b.x1 <= 16 && b.y0 >= 5 && b.y1 <= 16);
    }
}
