//! Screen ↔ image coordinate mapping: zoom, pan and the render origin.
//!
//! Pure geometry; knows nothing about layers.  Screen positions are in the
//! host container's pixel space, image positions in raster pixels.

use egui::{Pos2, Rect, Vec2};

use crate::canvas::ImageRect;

pub const MIN_SCALE: f32 = 0.1;
pub const MAX_SCALE: f32 = 10.0;
/// Multiplier per wheel notch.
pub const ZOOM_IN_FACTOR: f32 = 1.1;
pub const ZOOM_OUT_FACTOR: f32 = 0.9;
/// The image is never drawn closer than this to the container's top/left edge.
pub const MIN_MARGIN: f32 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ViewTransform {
    scale: f32,
    offset: Vec2,
    origin: Pos2,
    /// Pointer and offset at the start of an active pan gesture.
    pan_anchor: Option<(Pos2, Vec2)>,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: Vec2::ZERO,
            origin: Pos2::new(MIN_MARGIN, MIN_MARGIN),
            pan_anchor: None,
        }
    }
}

impl ViewTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    pub fn origin(&self) -> Pos2 {
        self.origin
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale.clamp(MIN_SCALE, MAX_SCALE);
    }

    /// Back to 1:1, no pan.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Recompute where the image's top-left lands: centred in the container,
    /// shifted by the pan offset, never above/left of the margin.
    pub fn update_origin(&mut self, container: Vec2, image_size: (u32, u32)) -> Pos2 {
        let disp = self.display_size(image_size);
        let x = ((container.x - disp.x) / 2.0).floor() + self.offset.x;
        let y = ((container.y - disp.y) / 2.0).floor() + self.offset.y;
        self.origin = Pos2::new(x.max(MIN_MARGIN), y.max(MIN_MARGIN));
        self.origin
    }

    pub fn display_size(&self, image_size: (u32, u32)) -> Vec2 {
        Vec2::new(
            (image_size.0 as f32 * self.scale).floor().max(1.0),
            (image_size.1 as f32 * self.scale).floor().max(1.0),
        )
    }

    /// Screen rectangle the image occupies at the current origin.
    pub fn image_screen_rect(&self, image_size: (u32, u32)) -> Rect {
        Rect::from_min_size(self.origin, self.display_size(image_size))
    }

    /// Truncates toward zero; may be negative or past the image edge.
    pub fn screen_to_image(&self, screen: Pos2) -> (i64, i64) {
        let x = (screen.x - self.origin.x) / self.scale;
        let y = (screen.y - self.origin.y) / self.scale;
        (x as i64, y as i64)
    }

    /// Like `screen_to_image`, but `None` outside `0..w × 0..h`.
    pub fn screen_to_pixel(&self, screen: Pos2, image_size: (u32, u32)) -> Option<(u32, u32)> {
        let (x, y) = self.screen_to_image(screen);
        let (w, h) = image_size;
        if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            return None;
        }
        Some((x as u32, y as u32))
    }

    pub fn image_to_screen(&self, x: f32, y: f32) -> Pos2 {
        Pos2::new(self.origin.x + x * self.scale, self.origin.y + y * self.scale)
    }

    /// Both drag corners mapped, ordered, and clamped to `[0, w] × [0, h]`.
    pub fn screen_to_image_rect(&self, a: Pos2, b: Pos2, image_size: (u32, u32)) -> ImageRect {
        let (w, h) = image_size;
        let clamp = |v: i64, max: u32| v.clamp(0, max as i64) as u32;
        let (ax, ay) = self.screen_to_image(a);
        let (bx, by) = self.screen_to_image(b);
        ImageRect::from_corners(clamp(ax, w), clamp(ay, h), clamp(bx, w), clamp(by, h))
    }

    /// One wheel notch.  The pan offset is re-anchored so the point under
    /// `cursor` stays put.
    pub fn zoom(&mut self, direction: ZoomDirection, cursor: Pos2) {
        let factor = match direction {
            ZoomDirection::In => ZOOM_IN_FACTOR,
            ZoomDirection::Out => ZOOM_OUT_FACTOR,
        };
        let old_scale = self.scale;
        self.scale = (self.scale * factor).clamp(MIN_SCALE, MAX_SCALE);
        let ratio = self.scale / old_scale;
        self.offset = self.offset * ratio + cursor.to_vec2() * (1.0 - ratio);
    }

    pub fn begin_pan(&mut self, pointer: Pos2) {
        self.pan_anchor = Some((pointer, self.offset));
    }

    /// No-op unless a pan gesture is active.
    pub fn update_pan(&mut self, pointer: Pos2) {
        if let Some((start, start_offset)) = self.pan_anchor {
            self.offset = start_offset + (pointer - start);
        }
    }

    pub fn end_pan(&mut self) {
        self.pan_anchor = None;
    }

    pub fn is_panning(&self) -> bool {
        self.pan_anchor.is_some()
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        self.offset += delta;
    }
}
