use std::path::{Path, PathBuf};
use std::time::Duration;

use egui::{Pos2, Rect, Vec2};
use image::DynamicImage;
use uuid::Uuid;

use crate::canvas::{LayerStack, Raster};
use crate::components::history::HistoryManager;
use crate::components::playback::{PlaybackController, PlaybackStep, TickHandle};
use crate::components::tools::{Tool, ToolEvent, ToolOptions, ToolState};
use crate::error::{EditorError, Result};
use crate::io::{self, SaveFormat};
use crate::ops::automask::{self, AutoMaskReport};
use crate::ops::canvas_ops;
use crate::ops::clipboard::{self, Clipboard};
use crate::ops::import::{self, BinaryThresholds, FitPolicy};
use crate::settings::{EditorSettings, GrayThreshold, ImportMode, LabThreshold, Resolution};
use crate::viewport::{ViewTransform, ZoomDirection};
use crate::{log_info, log_warn};

/// What the shell should draw.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Display composite and where it goes on screen.
    Image { raster: Raster, screen_rect: Rect, scale: f32 },
    /// Nothing drawable; show this message instead.
    Placeholder(String),
}

/// One editing session: the single owner of the layer stack, history,
/// tools, clipboard, view and playback state.
pub struct EditorSession {
    pub id: Uuid,
    settings: EditorSettings,
    stack: LayerStack,
    history: HistoryManager,
    tools: ToolState,
    clipboard: Clipboard,
    view: ViewTransform,
    playback: PlaybackController,
    /// Last outcome, for the shell's status bar.
    status: String,
    is_dirty: bool,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new(EditorSettings::default())
    }
}

impl EditorSession {
    /// A white board at the configured resolution.
    pub fn new(settings: EditorSettings) -> Self {
        let stack = LayerStack::new(settings.resolution);
        Self::with_stack(settings, stack)
    }

    /// Adopt an existing stack; its resolution becomes the configured one.
    pub fn with_stack(mut settings: EditorSettings, stack: LayerStack) -> Self {
        settings.resolution = stack.resolution();
        let playback = PlaybackController::new(settings.playback_interval);
        let id = Uuid::new_v4();
        log_info!("Session {} started at {} with {} layer(s)", id, settings.resolution, stack.len());
        Self {
            id,
            settings,
            stack,
            history: HistoryManager::default(),
            tools: ToolState::new(),
            clipboard: Clipboard::new(),
            view: ViewTransform::new(),
            playback,
            status: String::from("Ready"),
            is_dirty: false,
        }
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn stack(&self) -> &LayerStack {
        &self.stack
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    pub fn active_tool(&self) -> Tool {
        self.tools.active()
    }

    pub fn selection(&self) -> Option<crate::canvas::ImageRect> {
        self.tools.selection()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_running()
    }

    /// The document as the user sees it outside a playback run.
    pub fn document(&self) -> &LayerStack {
        self.playback.original().unwrap_or(&self.stack)
    }

    fn tool_options(&self) -> ToolOptions {
        ToolOptions {
            merge_factor: self.settings.merge_factor,
            brush_size: self.settings.brush_size,
            grid_mode: self.settings.grid_mode,
        }
    }

    // ------------------------------------------------------------------------
    //  Status / logging helpers
    // ------------------------------------------------------------------------

    fn report(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        log_info!("{}", msg);
        self.status = msg;
    }

    fn failed(&mut self, what: &str, err: EditorError) -> EditorError {
        log_warn!("{} failed: {}", what, err);
        self.status = format!("{}: {}", what, err);
        err
    }

    fn changed(&mut self, msg: impl Into<String>) {
        self.is_dirty = true;
        self.report(msg);
    }

    /// Mutations are refused while a playback run owns the stack.
    fn ensure_editable(&mut self, what: &str) -> Result<()> {
        if self.playback.is_running() {
            let err = EditorError::precondition("stop playback first");
            return Err(self.failed(what, err));
        }
        Ok(())
    }

    /// Checks for a non-tool command.  A primary-button gesture still in
    /// flight is abandoned first, so its release cannot land on top of this
    /// command's history entry.
    fn begin_command(&mut self, what: &str) -> Result<()> {
        self.ensure_editable(what)?;
        self.tools.cancel_gesture(&mut self.stack);
        Ok(())
    }

    /// History swaps whole stacks; the configured size follows the stack.
    fn sync_resolution(&mut self) {
        self.settings.resolution = self.stack.resolution();
    }

    // ========================================================================
    // LAYERS
    // ========================================================================

    pub fn new_layer(&mut self) -> Result<String> {
        self.begin_command("New layer")?;
        let name = canvas_ops::new_layer(&mut self.stack, &mut self.history);
        self.changed(format!("Created {}", name));
        Ok(name)
    }

    pub fn delete_layer(&mut self) -> Result<String> {
        self.begin_command("Delete layer")?;
        match canvas_ops::delete_layer(&mut self.stack, &mut self.history) {
            Ok(name) => {
                self.tools.set_selection(None);
                self.changed(format!("Deleted {}", name));
                Ok(name)
            }
            Err(e) => Err(self.failed("Delete layer", e)),
        }
    }

    pub fn select_layer(&mut self, index: usize) -> Result<()> {
        self.begin_command("Select layer")?;
        if let Err(e) = canvas_ops::select_layer(&mut self.stack, index) {
            return Err(self.failed("Select layer", e));
        }
        self.tools.set_selection(None);
        let name = self.stack.current().name.clone();
        self.report(format!("Selected {}", name));
        Ok(())
    }

    pub fn rename_layer(&mut self, new_name: &str) -> Result<()> {
        self.begin_command("Rename layer")?;
        let old = self.stack.current().name.clone();
        if let Err(e) = canvas_ops::rename_layer(&mut self.stack, &mut self.history, new_name) {
            return Err(self.failed("Rename layer", e));
        }
        let new = self.stack.current().name.clone();
        self.changed(format!("Renamed {} to {}", old, new));
        Ok(())
    }

    pub fn reorder_layers(&mut self, names: &[String]) -> Result<()> {
        self.begin_command("Reorder layers")?;
        if let Err(e) = canvas_ops::reorder_layers(&mut self.stack, &mut self.history, names) {
            return Err(self.failed("Reorder layers", e));
        }
        let order = self.stack.names().join(", ");
        self.changed(format!("Layer order: {}", order));
        Ok(())
    }

    pub fn toggle_layer_visibility(&mut self) -> Result<bool> {
        self.begin_command("Toggle visibility")?;
        let hidden = canvas_ops::toggle_layer_visibility(&mut self.stack, &mut self.history);
        let name = self.stack.current().name.clone();
        self.changed(format!("{} is now {}", name, if hidden { "hidden" } else { "shown" }));
        Ok(hidden)
    }

    pub fn invert_mask(&mut self) -> Result<()> {
        self.begin_command("Invert mask")?;
        canvas_ops::invert_mask(&mut self.stack, &mut self.history);
        let name = self.stack.current().name.clone();
        self.changed(format!("Inverted {}", name));
        Ok(())
    }

    /// One blank layer at the configured resolution; undoable.
    pub fn white_board(&mut self) -> Result<()> {
        self.begin_command("White board")?;
        self.tools.set_selection(None);
        self.view.reset();
        canvas_ops::white_board(&mut self.stack, &mut self.history, self.settings.resolution);
        self.changed(format!("New white board {}", self.settings.resolution));
        Ok(())
    }

    /// Back to a fresh session state; history and clipboard are dropped.
    pub fn reset(&mut self) -> Result<()> {
        self.begin_command("Reset")?;
        self.stack = LayerStack::new(self.settings.resolution);
        self.history.clear();
        self.clipboard.clear();
        self.tools.set_selection(None);
        self.view.reset();
        self.is_dirty = false;
        self.report("Reset");
        Ok(())
    }

    /// Resample every layer; the new size also becomes the configured one.
    pub fn set_resolution(&mut self, resolution: Resolution) -> Result<()> {
        self.begin_command("Change resolution")?;
        self.settings.resolution = resolution;
        canvas_ops::change_resolution(&mut self.stack, &mut self.history, resolution);
        self.tools.set_selection(None);
        self.view.reset();
        self.changed(format!("Resolution set to {}", resolution));
        Ok(())
    }

    // ========================================================================
    // SETTINGS
    // ========================================================================

    pub fn set_auto_mask_thresholds(&mut self, gray: Option<GrayThreshold>, lab: Option<LabThreshold>) {
        self.settings.auto_mask_gray = gray;
        self.settings.auto_mask_lab = lab;
        self.report(format!(
            "Auto-mask thresholds: gray {}, LAB {}",
            gray.map_or("unset".to_string(), |t| t.to_string()),
            lab.map_or("unset".to_string(), |t| t.to_string())
        ));
    }

    pub fn set_import_thresholds(&mut self, gray: GrayThreshold, lab: LabThreshold) {
        self.settings.import_gray = gray;
        self.settings.import_lab = lab;
    }

    pub fn set_import_mode(&mut self, mode: ImportMode) {
        self.settings.import_mode = mode;
        self.report(format!("Import mode: {}", mode.name()));
    }

    pub fn set_brush_size(&mut self, size: u32) -> Result<()> {
        if size == 0 {
            return Err(self.failed("Brush size", EditorError::validation("brush size must be positive")));
        }
        self.settings.brush_size = size;
        self.report(format!("Brush size: {}", size));
        Ok(())
    }

    pub fn set_merge_factor(&mut self, factor: u32) -> Result<()> {
        if factor == 0 {
            return Err(self.failed("Merge factor", EditorError::validation("merge factor must be positive")));
        }
        self.settings.merge_factor = factor;
        self.report(format!("Merge factor: {}", factor));
        Ok(())
    }

    pub fn set_playback_interval(&mut self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(self.failed(
                "Playback interval",
                EditorError::validation("playback interval must be positive"),
            ));
        }
        self.settings.playback_interval = interval;
        self.playback.set_interval(interval);
        self.report(format!("Playback interval: {} ms", interval.as_millis()));
        Ok(())
    }

    pub fn set_grid_mode(&mut self, on: bool) {
        self.settings.grid_mode = on;
        self.report(if on { "Grid mode on" } else { "Grid mode off" });
    }

    // ========================================================================
    // AUTO MASK / HISTORY
    // ========================================================================

    pub fn auto_mask(&mut self) -> Result<AutoMaskReport> {
        self.begin_command("Auto mask")?;
        let (gray, lab) = (self.settings.auto_mask_gray, self.settings.auto_mask_lab);
        match automask::auto_mask(&mut self.stack, &mut self.history, gray, lab) {
            Ok(report) => {
                self.changed(format!(
                    "Auto mask applied to {}: {} pixels ({} gray, {} colour layers)",
                    report.target_name, report.masked_pixels, report.gray_layers, report.lab_layers
                ));
                Ok(report)
            }
            Err(e) => Err(self.failed("Auto mask", e)),
        }
    }

    /// Returns the undone step's description, `None` if there was nothing to undo.
    pub fn undo(&mut self) -> Result<Option<String>> {
        self.begin_command("Undo")?;
        let undone = self.history.undo(&mut self.stack);
        self.sync_resolution();
        self.tools.set_selection(None);
        match &undone {
            Some(d) => self.changed(format!("Undo: {}", d)),
            None => self.report("Nothing to undo"),
        }
        Ok(undone)
    }

    pub fn redo(&mut self) -> Result<Option<String>> {
        self.begin_command("Redo")?;
        let redone = self.history.redo(&mut self.stack);
        self.sync_resolution();
        self.tools.set_selection(None);
        match &redone {
            Some(d) => self.changed(format!("Redo: {}", d)),
            None => self.report("Nothing to redo"),
        }
        Ok(redone)
    }

    // ========================================================================
    // TOOLS: primary button in screen or image space
    // ========================================================================

    pub fn set_tool(&mut self, tool: Tool) {
        self.tools.set_tool(tool);
        self.report(format!("Tool: {}", tool.label()));
    }

    pub fn pointer_down(&mut self, screen: Pos2) -> Result<ToolEvent> {
        let pos = self.view.screen_to_image(screen);
        self.press_at(pos)
    }

    pub fn pointer_drag(&mut self, screen: Pos2) -> Result<ToolEvent> {
        let pos = self.view.screen_to_image(screen);
        self.drag_to(pos)
    }

    pub fn pointer_up(&mut self, screen: Pos2) -> Result<ToolEvent> {
        let pos = self.view.screen_to_image(screen);
        self.release_at(pos)
    }

    pub fn press_at(&mut self, pos: (i64, i64)) -> Result<ToolEvent> {
        self.ensure_editable("Edit")?;
        let opts = self.tool_options();
        let event = self.tools.press(pos, &mut self.stack, &mut self.history, &opts);
        self.note_tool_event(&event);
        Ok(event)
    }

    pub fn drag_to(&mut self, pos: (i64, i64)) -> Result<ToolEvent> {
        self.ensure_editable("Edit")?;
        let opts = self.tool_options();
        let event = self.tools.drag(pos, &mut self.stack, &opts);
        self.note_tool_event(&event);
        Ok(event)
    }

    pub fn release_at(&mut self, pos: (i64, i64)) -> Result<ToolEvent> {
        self.ensure_editable("Edit")?;
        let opts = self.tool_options();
        let event = self.tools.release(pos, &mut self.stack, &mut self.history, &opts);
        self.note_tool_event(&event);
        Ok(event)
    }

    fn note_tool_event(&mut self, event: &ToolEvent) {
        match event {
            ToolEvent::Committed(what) => self.changed(*what),
            ToolEvent::SelectionChanged(Some(r)) => {
                self.status = format!("Selection ({}, {}) to ({}, {})", r.x0, r.y0, r.x1, r.y1);
            }
            ToolEvent::SelectionChanged(None) | ToolEvent::Preview | ToolEvent::Nothing => {}
        }
    }

    // ========================================================================
    // VIEW: secondary-button pan, wheel zoom
    // ========================================================================

    pub fn zoom(&mut self, direction: ZoomDirection, cursor: Pos2) {
        self.view.zoom(direction, cursor);
        self.status = format!("Zoom {:.2}", self.view.scale());
    }

    pub fn begin_pan(&mut self, pointer: Pos2) {
        self.view.begin_pan(pointer);
    }

    pub fn pan_to(&mut self, pointer: Pos2) {
        self.view.update_pan(pointer);
    }

    pub fn end_pan(&mut self) {
        self.view.end_pan();
    }

    pub fn reset_view(&mut self) {
        self.view.reset();
    }

    /// Recompute the render origin for `container` and produce the display
    /// composite (top-most shown layer decides the format, alpha applied).
    pub fn render_frame(&mut self, container: Vec2) -> Frame {
        if !self.stack.layers().iter().any(|l| l.is_shown()) {
            self.status = "Nothing to display: every layer is hidden".to_string();
            return Frame::Placeholder("No visible layer".to_string());
        }
        let size = (self.stack.width(), self.stack.height());
        if container.x <= 0.0 || container.y <= 0.0 {
            self.status = "Nothing to display: the viewport has no area".to_string();
            return Frame::Placeholder("Viewport has no area".to_string());
        }
        self.view.update_origin(container, size);
        let mode = self.stack.display_color_mode();
        let raster = self.stack.compose(mode, true);
        Frame::Image {
            raster,
            screen_rect: self.view.image_screen_rect(size),
            scale: self.view.scale(),
        }
    }

    // ========================================================================
    // CLIPBOARD
    // ========================================================================

    pub fn copy(&mut self) -> Result<()> {
        let selection = self.tools.selection();
        if let Err(e) = self.clipboard.copy(&self.stack, selection) {
            return Err(self.failed("Copy", e));
        }
        self.report("Copied selection");
        Ok(())
    }

    pub fn paste(&mut self) -> Result<()> {
        self.begin_command("Paste")?;
        if let Err(e) = self.clipboard.paste(&mut self.stack, &mut self.history) {
            return Err(self.failed("Paste", e));
        }
        self.changed("Pasted at (0, 0)");
        Ok(())
    }

    pub fn delete_region(&mut self) -> Result<()> {
        self.begin_command("Delete region")?;
        let result = clipboard::delete_region(&mut self.stack, &mut self.history, self.tools.selection_mut());
        if let Err(e) = result {
            return Err(self.failed("Delete region", e));
        }
        self.changed("Deleted selection");
        Ok(())
    }

    // ========================================================================
    // IMPORT / EXPORT
    // ========================================================================

    /// Process with the configured import mode, fit, and add as a new layer.
    pub fn import_image(&mut self, img: &DynamicImage, policy: FitPolicy) -> Result<String> {
        self.begin_command("Import")?;
        let thresholds = BinaryThresholds {
            gray: self.settings.import_gray,
            lab: self.settings.import_lab,
        };
        let mode = self.settings.import_mode;
        match import::import_layer(&mut self.stack, &mut self.history, img, mode, policy, &thresholds) {
            Ok(name) => {
                self.view.reset();
                self.tools.set_selection(None);
                self.changed(format!("Imported {} ({}) as {}", mode.name(), self.stack.resolution(), name));
                Ok(name)
            }
            Err(e) => Err(self.failed("Import", e)),
        }
    }

    pub fn import_file(&mut self, path: &Path, policy: FitPolicy) -> Result<String> {
        let img = match io::load_image(path) {
            Ok(img) => img,
            Err(e) => return Err(self.failed("Import", e)),
        };
        self.import_image(&img, policy)
    }

    pub fn export(&mut self, path: &Path) -> Result<()> {
        if let Err(e) = io::export(self.document(), path) {
            return Err(self.failed("Export", e));
        }
        self.is_dirty = false;
        self.report(format!("Exported {}", path.display()));
        Ok(())
    }

    /// `mask_<timestamp>.<ext>` inside `dir`.
    pub fn quick_export(&mut self, dir: &Path, format: SaveFormat) -> Result<PathBuf> {
        match io::quick_export(self.document(), dir, format) {
            Ok(path) => {
                self.is_dirty = false;
                self.report(format!("Exported {}", path.display()));
                Ok(path)
            }
            Err(e) => Err(self.failed("Quick export", e)),
        }
    }

    // ========================================================================
    // PLAYBACK
    // ========================================================================

    /// Start (or restart) a reveal run.  Any gesture in flight is dropped.
    pub fn start_playback(&mut self) -> Result<PlaybackStep> {
        self.tools.cancel_gesture(&mut self.stack);
        match self.playback.start(&mut self.stack) {
            Ok(step) => {
                self.tools.set_selection(None);
                let slot = PlaybackController::reveal_slot(self.stack.len());
                let name = self.stack.layers()[slot].name.clone();
                self.report(format!("Playback: showing {}", name));
                Ok(step)
            }
            Err(e) => Err(self.failed("Playback", e)),
        }
    }

    /// Feed a fired timer back in.  Stale handles are ignored (`None`).
    pub fn playback_tick(&mut self, handle: TickHandle) -> Option<PlaybackStep> {
        let step = self.playback.tick(handle, &mut self.stack)?;
        match step {
            PlaybackStep::Finished => self.report("Playback finished, layer order restored"),
            PlaybackStep::Scheduled { .. } => {
                let slot = PlaybackController::reveal_slot(self.stack.len());
                let name = self.stack.layers()[slot].name.clone();
                self.status = format!("Playback: showing {}", name);
            }
        }
        Some(step)
    }

    /// Returns the handle whose timer the shell should cancel.
    pub fn stop_playback(&mut self) -> Option<TickHandle> {
        let pending = self.playback.stop(&mut self.stack)?;
        self.report("Playback stopped, layer order restored");
        Some(pending)
    }

    /// Start when idle, stop when running.  Stopping yields `Finished`.
    pub fn toggle_playback(&mut self) -> Result<PlaybackStep> {
        if self.playback.is_running() {
            self.stop_playback();
            Ok(PlaybackStep::Finished)
        } else {
            self.start_playback()
        }
    }
}
