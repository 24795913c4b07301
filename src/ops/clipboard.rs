// ============================================================================
// CLIPBOARD OPERATIONS: copy, paste, delete and move of selected regions
// ============================================================================

use crate::canvas::{BLANK, ImageRect, LayerStack, Raster};
use crate::components::history::{HistoryManager, StackSnapshot};
use crate::error::{EditorError, Result};

/// Session-scoped clipboard holding at most one fragment.
#[derive(Clone, Debug, Default)]
pub struct Clipboard {
    fragment: Option<Raster>,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_fragment(&self) -> bool {
        self.fragment.is_some()
    }

    pub fn fragment(&self) -> Option<&Raster> {
        self.fragment.as_ref()
    }

    /// Dimensions without cloning the pixels.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.fragment.as_ref().map(|f| f.dimensions())
    }

    pub fn clear(&mut self) {
        self.fragment = None;
    }

    /// Crop the current layer at `selection` into the clipboard.
    /// Neither the stack nor history change.
    pub fn copy(&mut self, stack: &LayerStack, selection: Option<ImageRect>) -> Result<()> {
        let rect = require_selection(selection, stack)?;
        self.fragment = Some(stack.current().raster.crop(rect));
        Ok(())
    }

    /// Paste the fragment at image origin `(0, 0)` of the current layer.
    pub fn paste(&self, stack: &mut LayerStack, history: &mut HistoryManager) -> Result<()> {
        let Some(fragment) = self.fragment.as_ref() else {
            return Err(EditorError::precondition("nothing has been copied"));
        };
        let before = StackSnapshot::capture(stack);
        stack.current_mut().raster.paste(fragment, 0, 0);
        history.push("Paste", before);
        Ok(())
    }
}

/// Fill the selection with background on the current layer and drop the
/// selection.
pub fn delete_region(
    stack: &mut LayerStack,
    history: &mut HistoryManager,
    selection: &mut Option<ImageRect>,
) -> Result<()> {
    let rect = require_selection(*selection, stack)?;
    let before = StackSnapshot::capture(stack);
    stack.current_mut().raster.fill_rect(rect, BLANK);
    history.push("Delete Region", before);
    *selection = None;
    Ok(())
}

/// Move the pixels of `from` so its top-left lands at `to`, clamped so the
/// region stays inside the image.  The vacated source becomes background.
/// Returns the destination rectangle.  No history entry; the caller owns
/// the gesture's undo snapshot.
pub fn move_region(stack: &mut LayerStack, from: ImageRect, to: (i64, i64)) -> ImageRect {
    let (w, h) = (stack.width(), stack.height());
    let from = from.clamped(w, h);
    let max_x = (w - from.width()) as i64;
    let max_y = (h - from.height()) as i64;
    let dest = from.moved_to(to.0.clamp(0, max_x) as u32, to.1.clamp(0, max_y) as u32);

    let raster = &mut stack.current_mut().raster;
    let fragment = raster.crop(from);
    raster.fill_rect(from, BLANK);
    raster.paste(&fragment, dest.x0 as i64, dest.y0 as i64);
    dest
}

fn require_selection(selection: Option<ImageRect>, stack: &LayerStack) -> Result<ImageRect> {
    let Some(rect) = selection else {
        return Err(EditorError::precondition("select a region first"));
    };
    let rect = rect.clamped(stack.width(), stack.height());
    if rect.is_empty() {
        return Err(EditorError::precondition("the selection is empty"));
    }
    Ok(rect)
}
