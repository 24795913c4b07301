use crate::canvas::{BLANK, INK, ImageRect, LayerStack};
use crate::components::history::{HistoryManager, StackSnapshot};
use crate::ops::clipboard;

/// Brush colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Ink {
    #[default]
    Black,
    White,
}

impl Ink {
    pub fn value(self) -> u8 {
        match self {
            Ink::Black => INK,
            Ink::White => BLANK,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    PaintRect,
    EraseRect,
    Brush(Ink),
    /// Grid-mode single click: flips a merge-factor block by majority.
    PixelToggle,
    /// Region select; also drives move / copy / paste / delete.
    Select,
}

impl Tool {
    pub fn label(&self) -> &'static str {
        match self {
            Tool::PaintRect => "Paint (rectangle)",
            Tool::EraseRect => "Erase (rectangle)",
            Tool::Brush(Ink::Black) => "Brush",
            Tool::Brush(Ink::White) => "Brush (erase)",
            Tool::PixelToggle => "Pixel toggle",
            Tool::Select => "Select",
        }
    }
}

/// Per-gesture knobs, taken from the session settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToolOptions {
    pub merge_factor: u32,
    pub brush_size: u32,
    /// Paint / erase rect act as pixel toggle.
    pub grid_mode: bool,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            merge_factor: 1,
            brush_size: crate::settings::DEFAULT_BRUSH_SIZE,
            grid_mode: false,
        }
    }
}

/// What a pointer event did.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolEvent {
    Nothing,
    /// The live raster changed; no history entry yet.
    Preview,
    SelectionChanged(Option<ImageRect>),
    /// One history entry was pushed.
    Committed(&'static str),
}

enum GestureKind {
    Rect { anchor: (u32, u32), ink: u8, touched: bool },
    Brush { ink: u8 },
    Marquee { anchor: (u32, u32) },
    Move { anchor: (i64, i64), source: ImageRect },
}

/// A primary-button gesture in progress.  `before` is the undo target,
/// captured when the gesture began.
struct Gesture {
    kind: GestureKind,
    before: StackSnapshot,
}

// ============================================================================
// TOOL STATE: active tool, selection, gesture dispatch
// ============================================================================

#[derive(Default)]
pub struct ToolState {
    active: Tool,
    selection: Option<ImageRect>,
    gesture: Option<Gesture>,
}

impl ToolState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Tool {
        self.active
    }

    /// Switching away from `Select` drops the selection.
    pub fn set_tool(&mut self, tool: Tool) {
        self.active = tool;
        if tool != Tool::Select {
            self.selection = None;
        }
    }

    pub fn selection(&self) -> Option<ImageRect> {
        self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Option<ImageRect> {
        &mut self.selection
    }

    pub fn set_selection(&mut self, selection: Option<ImageRect>) {
        self.selection = selection;
    }

    pub fn is_gesture_active(&self) -> bool {
        self.gesture.is_some()
    }

    /// Abandon the gesture and undo its live preview.
    pub fn cancel_gesture(&mut self, stack: &mut LayerStack) {
        if let Some(g) = self.gesture.take() {
            g.before.restore_into(stack);
        }
    }

    /// Primary button down at image position `pos`.
    pub fn press(
        &mut self,
        pos: (i64, i64),
        stack: &mut LayerStack,
        history: &mut HistoryManager,
        opts: &ToolOptions,
    ) -> ToolEvent {
        // A press without a release drops the stale gesture
        self.cancel_gesture(stack);
        let m = opts.merge_factor.max(1);

        match self.active {
            Tool::Select => self.press_select(pos, stack, m),
            Tool::PixelToggle => toggle_block(pos, stack, history, m),
            Tool::PaintRect | Tool::EraseRect if opts.grid_mode => toggle_block(pos, stack, history, m),
            Tool::PaintRect | Tool::EraseRect => {
                let ink = if self.active == Tool::PaintRect { INK } else { BLANK };
                self.gesture = Some(Gesture {
                    kind: GestureKind::Rect {
                        anchor: clamp_point(pos, stack),
                        ink,
                        touched: false,
                    },
                    before: StackSnapshot::capture(stack),
                });
                ToolEvent::Nothing
            }
            Tool::Brush(ink) => {
                let before = StackSnapshot::capture(stack);
                stamp_brush(pos, ink.value(), stack, opts);
                self.gesture = Some(Gesture {
                    kind: GestureKind::Brush { ink: ink.value() },
                    before,
                });
                ToolEvent::Preview
            }
        }
    }

    /// Pointer moved with the primary button held.
    pub fn drag(&mut self, pos: (i64, i64), stack: &mut LayerStack, opts: &ToolOptions) -> ToolEvent {
        let m = opts.merge_factor.max(1);
        let Some(gesture) = self.gesture.as_mut() else {
            return ToolEvent::Nothing;
        };

        match &mut gesture.kind {
            GestureKind::Rect { anchor, ink, touched } => {
                let rect = drag_rect(*anchor, pos, stack, m);
                if rect.is_empty() {
                    return ToolEvent::Nothing;
                }
                stack.current_mut().raster.fill_rect(rect, *ink);
                *touched = true;
                ToolEvent::Preview
            }
            GestureKind::Brush { ink } => {
                stamp_brush(pos, *ink, stack, opts);
                ToolEvent::Preview
            }
            GestureKind::Marquee { anchor } => {
                let rect = drag_rect(*anchor, pos, stack, m);
                if rect.is_empty() {
                    return ToolEvent::Nothing;
                }
                self.selection = Some(rect);
                ToolEvent::SelectionChanged(self.selection)
            }
            GestureKind::Move { anchor, source } => {
                let dest = move_destination(*source, *anchor, pos, stack, m);
                self.selection = Some(dest);
                ToolEvent::SelectionChanged(self.selection)
            }
        }
    }

    /// Primary button released; finalizes the gesture.
    pub fn release(
        &mut self,
        pos: (i64, i64),
        stack: &mut LayerStack,
        history: &mut HistoryManager,
        opts: &ToolOptions,
    ) -> ToolEvent {
        let m = opts.merge_factor.max(1);
        let Some(gesture) = self.gesture.take() else {
            return ToolEvent::Nothing;
        };

        match gesture.kind {
            GestureKind::Rect { anchor, ink, touched } => {
                let rect = drag_rect(anchor, pos, stack, m);
                let touched = if rect.is_empty() {
                    touched
                } else {
                    stack.current_mut().raster.fill_rect(rect, ink);
                    true
                };
                if !touched {
                    return ToolEvent::Nothing;
                }
                let description = if ink == INK { "Paint Rectangle" } else { "Erase Rectangle" };
                history.push(description, gesture.before);
                ToolEvent::Committed(description)
            }
            GestureKind::Brush { .. } => {
                history.push("Brush Stroke", gesture.before);
                ToolEvent::Committed("Brush Stroke")
            }
            GestureKind::Marquee { anchor } => {
                let rect = drag_rect(anchor, pos, stack, m);
                if !rect.is_empty() {
                    self.selection = Some(rect);
                }
                ToolEvent::SelectionChanged(self.selection)
            }
            GestureKind::Move { anchor, source } => {
                let target = move_destination(source, anchor, pos, stack, m);
                if target == source {
                    self.selection = Some(source);
                    return ToolEvent::SelectionChanged(self.selection);
                }
                let dest = clipboard::move_region(stack, source, (target.x0 as i64, target.y0 as i64));
                self.selection = Some(dest);
                history.push("Move Selection", gesture.before);
                ToolEvent::Committed("Move Selection")
            }
        }
    }

    fn press_select(&mut self, pos: (i64, i64), stack: &mut LayerStack, m: u32) -> ToolEvent {
        match self.selection {
            None => {
                if let Some(region) = region_under(pos, stack, m) {
                    self.selection = Some(region);
                    return ToolEvent::SelectionChanged(self.selection);
                }
            }
            Some(sel) => {
                let (sx, sy) = (snap_down(pos.0, m), snap_down(pos.1, m));
                if sx >= 0 && sy >= 0 && sel.contains(sx as u32, sy as u32) {
                    self.gesture = Some(Gesture {
                        kind: GestureKind::Move { anchor: pos, source: sel },
                        before: StackSnapshot::capture(stack),
                    });
                    return ToolEvent::Nothing;
                }
            }
        }
        self.gesture = Some(Gesture {
            kind: GestureKind::Marquee { anchor: clamp_point(pos, stack) },
            before: StackSnapshot::capture(stack),
        });
        ToolEvent::Nothing
    }
}

// ----------------------------------------------------------------------------
//  Gesture geometry helpers
// ----------------------------------------------------------------------------

/// Round down to a multiple of `m`, toward negative infinity.
fn snap_down(v: i64, m: u32) -> i64 {
    v.div_euclid(m as i64) * m as i64
}

fn clamp_point(pos: (i64, i64), stack: &LayerStack) -> (u32, u32) {
    (
        pos.0.clamp(0, stack.width() as i64) as u32,
        pos.1.clamp(0, stack.height() as i64) as u32,
    )
}

/// Rectangle spanned by `anchor` and `pos`, grid-aligned outward.  The end
/// edge may pass the image by less than one cell; writes clip there.
fn drag_rect(anchor: (u32, u32), pos: (i64, i64), stack: &LayerStack, m: u32) -> ImageRect {
    let (px, py) = clamp_point(pos, stack);
    ImageRect::from_corners(anchor.0, anchor.1, px, py).grid_aligned(m)
}

/// Bounding box of the current layer's ink, grid-aligned, if it contains `pos`.
fn region_under(pos: (i64, i64), stack: &LayerStack, m: u32) -> Option<ImageRect> {
    if pos.0 < 0 || pos.1 < 0 {
        return None;
    }
    let bounds = stack.current().raster.content_bounds(BLANK)?;
    if !bounds.contains(pos.0 as u32, pos.1 as u32) {
        return None;
    }
    Some(bounds.grid_aligned(m))
}

fn move_destination(source: ImageRect, anchor: (i64, i64), pos: (i64, i64), stack: &LayerStack, m: u32) -> ImageRect {
    let dx = snap_down(pos.0 - anchor.0, m);
    let dy = snap_down(pos.1 - anchor.1, m);
    let max_x = stack.width().saturating_sub(source.width()) as i64;
    let max_y = stack.height().saturating_sub(source.height()) as i64;
    let x = (source.x0 as i64 + dx).clamp(0, max_x) as u32;
    let y = (source.y0 as i64 + dy).clamp(0, max_y) as u32;
    source.moved_to(x, y)
}

/// Filled ellipse of radius `brush_size` at the grid cell under `pos`.
fn stamp_brush(pos: (i64, i64), value: u8, stack: &mut LayerStack, opts: &ToolOptions) {
    let m = opts.merge_factor.max(1) as i64;
    let r = opts.brush_size.max(1) as i64;
    let (w, h) = (stack.width() as i64, stack.height() as i64);
    let cx = pos.0.div_euclid(m) * m;
    let cy = pos.1.div_euclid(m) * m;
    let left = (cx - r).max(0);
    let top = (cy - r).max(0);
    let right = (cx + r + m).min(w);
    let bottom = (cy + r + m).min(h);
    if left > right || top > bottom || left >= w || top >= h {
        return;
    }
    stack
        .current_mut()
        .raster
        .fill_ellipse(left as u32, top as u32, right as u32, bottom as u32, value);
}

/// Flip the `m × m` cell under `pos` by majority and commit.
fn toggle_block(pos: (i64, i64), stack: &mut LayerStack, history: &mut HistoryManager, m: u32) -> ToolEvent {
    if pos.0 < 0 || pos.1 < 0 || pos.0 >= stack.width() as i64 || pos.1 >= stack.height() as i64 {
        return ToolEvent::Nothing;
    }
    let cell = ImageRect::from_origin_size(snap_down(pos.0, m) as u32, snap_down(pos.1, m) as u32, m, m);
    let Some(mean) = stack.current().raster.block_mean(cell) else {
        return ToolEvent::Nothing;
    };
    let value = if mean > 128.0 { INK } else { BLANK };
    let before = StackSnapshot::capture(stack);
    stack.current_mut().raster.fill_rect(cell, value);
    history.push("Toggle Pixel", before);
    ToolEvent::Committed("Toggle Pixel")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Resolution;

    fn setup(w: u32, h: u32) -> (LayerStack, HistoryManager, ToolState) {
        (
            LayerStack::new(Resolution { width: w, height: h }),
            HistoryManager::default(),
            ToolState::new(),
        )
    }

    fn opts(m: u32) -> ToolOptions {
        ToolOptions { merge_factor: m, ..ToolOptions::default() }
    }

    fn gesture(t: &mut ToolState, s: &mut LayerStack, h: &mut HistoryManager, o: &ToolOptions, from: (i64, i64), to: (i64, i64)) -> ToolEvent {
        t.press(from, s, h, o);
        t.drag(to, s, o);
        t.release(to, s, h, o)
    }

    #[test]
    fn paint_rect_fills_and_commits_once() {
        let (mut s, mut h, mut t) = setup(640, 480);
        let ev = gesture(&mut t, &mut s, &mut h, &opts(1), (10, 10), (50, 50));
        assert_eq!(ev, ToolEvent::Committed("Paint Rectangle"));
        assert_eq!(h.undo_count(), 1);
        let r = &s.current().raster;
        assert_eq!(r.value_at(20, 20), INK);
        assert_eq!(r.value_at(60, 60), BLANK);
        h.undo(&mut s);
        assert_eq!(s.current().raster.value_at(20, 20), BLANK);
    }

    #[test]
    fn erase_rect_writes_background() {
        let (mut s, mut h, mut t) = setup(20, 20);
        s.current_mut().raster.fill_rect(ImageRect::from_corners(0, 0, 20, 20), INK);
        t.set_tool(Tool::EraseRect);
        gesture(&mut t, &mut s, &mut h, &opts(1), (15, 15), (5, 5));
        assert_eq!(s.current().raster.value_at(10, 10), BLANK);
        assert_eq!(s.current().raster.value_at(4, 4), INK);
    }

    #[test]
    fn committed_rects_align_to_merge_factor() {
        for m in 1..=5u32 {
            for &(from, to) in &[((3, 7), (17, 12)), ((19, 2), (1, 18)), ((0, 0), (7, 9))] {
                let (mut s, mut h, mut t) = setup(40, 40);
                gesture(&mut t, &mut s, &mut h, &opts(m), from, to);
                let b = s.current().raster.content_bounds(BLANK).unwrap();
                for edge in [b.x0, b.y0, b.x1, b.y1] {
                    assert_eq!(edge % m, 0, "edge {} for m={}", edge, m);
                }

                t.set_tool(Tool::Select);
                t.set_selection(None);
                // Start the marquee outside the ink so no bbox is adopted
                t.press((39, 39), &mut s, &mut h, &opts(m));
                t.drag((from.0, from.1), &mut s, &opts(m));
                t.release((from.0, from.1), &mut s, &mut h, &opts(m));
                let sel = t.selection().unwrap();
                for edge in [sel.x0, sel.y0, sel.x1, sel.y1] {
                    assert_eq!(edge % m, 0);
                }
            }
        }
    }

    #[test]
    fn click_without_drag_does_not_commit() {
        let (mut s, mut h, mut t) = setup(10, 10);
        let o = opts(1);
        t.press((4, 4), &mut s, &mut h, &o);
        assert_eq!(t.release((4, 4), &mut s, &mut h, &o), ToolEvent::Nothing);
        assert_eq!(h.undo_count(), 0);
    }

    #[test]
    fn brush_stamps_and_commits_on_release() {
        let (mut s, mut h, mut t) = setup(50, 50);
        t.set_tool(Tool::Brush(Ink::Black));
        let o = ToolOptions { brush_size: 3, ..opts(1) };
        assert_eq!(t.press((20, 20), &mut s, &mut h, &o), ToolEvent::Preview);
        t.drag((30, 20), &mut s, &o);
        assert_eq!(h.undo_count(), 0);
        assert_eq!(t.release((30, 20), &mut s, &mut h, &o), ToolEvent::Committed("Brush Stroke"));
        assert_eq!(h.undo_count(), 1);
        assert_eq!(s.current().raster.value_at(20, 20), INK);
        assert_eq!(s.current().raster.value_at(30, 20), INK);
        assert_eq!(s.current().raster.value_at(25, 30), BLANK);
        h.undo(&mut s);
        assert!(s.current().raster.as_bytes().iter().all(|&v| v == BLANK));
    }

    #[test]
    fn pixel_toggle_flips_by_majority_once_per_click() {
        let (mut s, mut h, mut t) = setup(8, 8);
        t.set_tool(Tool::PixelToggle);
        let o = opts(2);
        t.press((3, 5), &mut s, &mut h, &o);
        t.release((3, 5), &mut s, &mut h, &o);
        let r = &s.current().raster;
        assert_eq!(r.content_bounds(BLANK), Some(ImageRect { x0: 2, y0: 4, x1: 4, y1: 6 }));
        assert_eq!(h.undo_count(), 1);
        t.press((2, 4), &mut s, &mut h, &o);
        assert!(s.current().raster.as_bytes().iter().all(|&v| v == BLANK));
    }

    #[test]
    fn grid_mode_turns_paint_into_toggle() {
        let (mut s, mut h, mut t) = setup(8, 8);
        let o = ToolOptions { grid_mode: true, ..opts(4) };
        assert_eq!(t.press((1, 1), &mut s, &mut h, &o), ToolEvent::Committed("Toggle Pixel"));
        t.drag((7, 7), &mut s, &o);
        t.release((7, 7), &mut s, &mut h, &o);
        assert_eq!(
            s.current().raster.content_bounds(BLANK),
            Some(ImageRect { x0: 0, y0: 0, x1: 4, y1: 4 })
        );
    }

    #[test]
    fn select_adopts_ink_bounds_under_click() {
        let (mut s, mut h, mut t) = setup(20, 20);
        s.current_mut().raster.fill_rect(ImageRect::from_corners(5, 5, 9, 8), INK);
        t.set_tool(Tool::Select);
        let o = opts(1);
        // Outside the bbox: nothing adopted
        t.press((15, 15), &mut s, &mut h, &o);
        t.release((15, 15), &mut s, &mut h, &o);
        assert_eq!(t.selection(), None);
        let ev = t.press((6, 6), &mut s, &mut h, &o);
        assert_eq!(ev, ToolEvent::SelectionChanged(Some(ImageRect { x0: 5, y0: 5, x1: 9, y1: 8 })));
        assert_eq!(h.undo_count(), 0);
    }

    #[test]
    fn moving_a_selection_blanks_source_and_commits() {
        let (mut s, mut h, mut t) = setup(20, 20);
        s.current_mut().raster.fill_rect(ImageRect::from_corners(2, 2, 4, 4), INK);
        let before = s.clone();
        t.set_tool(Tool::Select);
        let o = opts(1);
        t.press((3, 3), &mut s, &mut h, &o);
        t.release((3, 3), &mut s, &mut h, &o);
        t.press((3, 3), &mut s, &mut h, &o);
        t.drag((8, 3), &mut s, &o);
        assert_eq!(t.selection(), Some(ImageRect { x0: 7, y0: 2, x1: 9, y1: 4 }));
        // Preview moves only the outline
        assert_eq!(s, before);
        let ev = t.release((13, 13), &mut s, &mut h, &o);
        assert_eq!(ev, ToolEvent::Committed("Move Selection"));
        let dest = ImageRect { x0: 12, y0: 12, x1: 14, y1: 14 };
        assert_eq!(t.selection(), Some(dest));
        assert_eq!(s.current().raster.content_bounds(BLANK), Some(dest));
        h.undo(&mut s);
        assert_eq!(s, before);
    }

    #[test]
    fn switching_tools_clears_selection() {
        let mut t = ToolState::new();
        t.set_tool(Tool::Select);
        t.set_selection(Some(ImageRect::from_corners(0, 0, 2, 2)));
        t.set_tool(Tool::Select);
        assert!(t.selection().is_some());
        t.set_tool(Tool::Brush(Ink::White));
        assert_eq!(t.selection(), None);
    }

    #[test]
    fn cancel_gesture_restores_live_preview() {
        let (mut s, mut h, mut t) = setup(10, 10);
        let before = s.clone();
        let o = opts(1);
        t.press((0, 0), &mut s, &mut h, &o);
        t.drag((5, 5), &mut s, &o);
        assert_ne!(s, before);
        t.cancel_gesture(&mut s);
        assert_eq!(s, before);
        assert!(!t.is_gesture_active());
    }
}
