// ============================================================================
// CANVAS-LEVEL OPERATIONS: layer management, invert, white board, resize
// ============================================================================
//
// Every function validates first and mutates after, then records the
// pre-mutation snapshot as one undo step.

use image::Luma;

use crate::canvas::{BLANK, ColorMode, HIDDEN_ALPHA, INK, LayerStack, Raster};
use crate::components::history::{HistoryManager, StackSnapshot};
use crate::error::{EditorError, Result};
use crate::settings::Resolution;

/// Append a blank layer named `Layer N` and make it current.
pub fn new_layer(stack: &mut LayerStack, history: &mut HistoryManager) -> String {
    let before = StackSnapshot::capture(stack);
    let name = stack.create_layer().name.clone();
    history.push("New Layer", before);
    name
}

/// Delete the current layer (the last remaining one is kept).
pub fn delete_layer(stack: &mut LayerStack, history: &mut HistoryManager) -> Result<String> {
    if stack.len() <= 1 {
        return Err(EditorError::precondition("cannot delete the only layer"));
    }
    let before = StackSnapshot::capture(stack);
    let removed = stack.remove(stack.current_index())?;
    history.push("Delete Layer", before);
    Ok(removed.name)
}

/// Point the editor at another layer.  No history entry.
pub fn select_layer(stack: &mut LayerStack, index: usize) -> Result<()> {
    stack.set_current(index)
}

pub fn rename_layer(stack: &mut LayerStack, history: &mut HistoryManager, new_name: &str) -> Result<()> {
    let new_name = new_name.trim();
    if new_name.is_empty() {
        return Err(EditorError::validation("layer name cannot be empty"));
    }
    let current = stack.current_index();
    if let Some(idx) = stack.find(new_name) {
        if idx != current {
            return Err(EditorError::validation(format!("layer '{}' already exists", new_name)));
        }
        return Ok(());
    }
    let before = StackSnapshot::capture(stack);
    stack.current_mut().name = new_name.to_string();
    history.push("Rename Layer", before);
    Ok(())
}

pub fn reorder_layers(stack: &mut LayerStack, history: &mut HistoryManager, names: &[String]) -> Result<()> {
    let before = StackSnapshot::capture(stack);
    stack.reorder(names)?;
    history.push("Reorder Layers", before);
    Ok(())
}

/// Flip the current layer between shown (alpha 1) and hidden (alpha 0.3).
/// Returns whether the layer is hidden afterwards.
pub fn toggle_layer_visibility(stack: &mut LayerStack, history: &mut HistoryManager) -> bool {
    let before = StackSnapshot::capture(stack);
    let layer = stack.current_mut();
    if layer.alpha >= 1.0 {
        layer.alpha = HIDDEN_ALPHA;
        layer.hidden = true;
    } else {
        layer.alpha = 1.0;
        layer.hidden = false;
    }
    let hidden = layer.hidden;
    history.push(if hidden { "Hide Layer" } else { "Show Layer" }, before);
    hidden
}

/// Swap ink and background on the current layer (converted to grayscale).
/// Intermediate values are left alone.
pub fn invert_mask(stack: &mut LayerStack, history: &mut HistoryManager) {
    let before = StackSnapshot::capture(stack);
    let raster = &mut stack.current_mut().raster;
    raster.coerce(ColorMode::Gray);
    if let Raster::Gray(img) = raster {
        for px in img.pixels_mut() {
            *px = match px.0[0] {
                INK => Luma([BLANK]),
                BLANK => Luma([INK]),
                v => Luma([v]),
            };
        }
    }
    history.push("Invert Mask", before);
}

/// Replace everything with one blank `Layer 1` at `resolution`.
pub fn white_board(stack: &mut LayerStack, history: &mut HistoryManager, resolution: Resolution) {
    let before = StackSnapshot::capture(stack);
    *stack = LayerStack::new(resolution);
    history.push("White Board", before);
}

/// Resample every layer to a new target resolution.
pub fn change_resolution(stack: &mut LayerStack, history: &mut HistoryManager, resolution: Resolution) {
    if stack.resolution() == resolution {
        return;
    }
    let before = StackSnapshot::capture(stack);
    stack.set_resolution(resolution);
    history.push("Change Resolution", before);
}
