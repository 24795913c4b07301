// End-to-end behaviour of the editor session, driven the way a shell would.

use std::time::Duration;

use egui::Pos2;
use image::{GrayImage, Rgb, RgbImage};
use maskfe::EditorSession;
use maskfe::canvas::{BLANK, ColorMode, INK, ImageRect, Layer, LayerStack, Raster};
use maskfe::components::history::{HistoryManager, StackSnapshot};
use maskfe::components::playback::PlaybackStep;
use maskfe::components::tools::Tool;
use maskfe::settings::{EditorSettings, GrayThreshold, LabThreshold, Resolution};
use maskfe::viewport::ViewTransform;

fn res(w: u32, h: u32) -> Resolution {
    Resolution { width: w, height: h }
}

fn gray(name: &str, w: u32, h: u32, value: u8) -> Layer {
    Layer::new(name.to_string(), Raster::new_filled(ColorMode::Gray, w, h, value))
}

fn quick_settings() -> EditorSettings {
    EditorSettings {
        playback_interval: Duration::from_millis(1),
        ..EditorSettings::default()
    }
}

#[test]
fn scenario_a_paint_rect_then_export() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = EditorSession::new(EditorSettings::default());
    assert_eq!(s.stack().resolution(), res(640, 480));

    s.set_tool(Tool::PaintRect);
    s.press_at((10, 10)).unwrap();
    s.drag_to((30, 30)).unwrap();
    s.release_at((50, 50)).unwrap();

    let path = dir.path().join("a.png");
    s.export(&path).unwrap();
    let img = image::open(&path).unwrap().to_luma8();
    assert_eq!(img.dimensions(), (640, 480));
    assert_eq!(img.get_pixel(20, 20).0[0], 0);
    assert_eq!(img.get_pixel(60, 60).0[0], 255);
}

#[test]
fn scenario_b_disjoint_thresholds_are_refused() {
    let rgb = Layer::new("colour".to_string(), Raster::Rgb(RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]))));
    let stack = LayerStack::from_layers(
        res(4, 4),
        vec![gray("gray", 4, 4, 200), rgb, gray("target", 4, 4, BLANK)],
    )
    .unwrap();
    let mut s = EditorSession::with_stack(quick_settings(), stack);
    s.set_auto_mask_thresholds(
        Some(GrayThreshold::new(0, 10).unwrap()),
        Some(LabThreshold::new([0, 255, -128, 127, -128, 127]).unwrap()),
    );
    let before = s.stack().clone();

    let err = s.auto_mask().unwrap_err();
    assert!(err.is_precondition());
    assert_eq!(s.stack(), &before);
    assert!(!s.history().can_undo());
}

#[test]
fn scenario_c_five_layer_playback_restores_everything() {
    let layers = (0..5u8).map(|i| gray(&format!("L{}", i), 6, 4, i * 40)).collect();
    let mut stack = LayerStack::from_layers(res(6, 4), layers).unwrap();
    stack.set_alpha(1, 0.3).unwrap();
    stack.set_hidden(1, true).unwrap();
    let original = stack.clone();
    let mut s = EditorSession::with_stack(quick_settings(), stack);

    let mut step = s.start_playback().unwrap();
    let mut seen = Vec::new();
    while let PlaybackStep::Scheduled { handle, delay } = step {
        assert_eq!(delay, Duration::from_millis(1));
        let shown: Vec<&str> = s.stack().layers().iter().filter(|l| l.is_shown()).map(|l| l.name()).collect();
        assert_eq!(shown.len(), 1);
        assert_eq!(s.stack().layers()[3].name(), shown[0]);
        if seen.last() != Some(&shown[0].to_string()) {
            seen.push(shown[0].to_string());
        }
        step = s.playback_tick(handle).unwrap();
    }

    assert_eq!(seen, vec!["L3", "L2", "L1", "L0", "L4"]);
    assert!(!s.is_playing());
    assert_eq!(s.stack(), &original);
}

#[test]
fn scenario_d_undo_after_auto_mask() {
    let mut raster = Raster::new_filled(ColorMode::Gray, 4, 4, 255);
    raster.fill_rect(ImageRect::from_corners(0, 0, 2, 2), 120);
    let src = Layer::new("src".to_string(), raster);
    let stack = LayerStack::from_layers(res(4, 4), vec![src, gray("target", 4, 4, 77)]).unwrap();
    let mut s = EditorSession::with_stack(quick_settings(), stack);
    s.set_auto_mask_thresholds(Some(GrayThreshold::new(100, 150).unwrap()), None);
    let before = s.stack().last().raster().clone();

    let report = s.auto_mask().unwrap();
    assert_eq!(report.masked_pixels, 4);
    assert_eq!(s.stack().last().raster().value_at(1, 1), INK);
    assert_eq!(s.stack().last().raster().value_at(3, 3), 77);

    assert_eq!(s.undo().unwrap().as_deref(), Some("Auto Mask"));
    assert_eq!(s.stack().last().raster(), &before);
}

#[test]
fn threshold_boundaries_follow_every_qualifying_layer() {
    let a = Layer::new(
        "a".to_string(),
        Raster::Gray(GrayImage::from_raw(4, 1, vec![99, 100, 150, 151]).unwrap()),
    );
    let b = gray("b", 4, 1, 120);
    let stack = LayerStack::from_layers(res(4, 1), vec![a, b, gray("t", 4, 1, BLANK)]).unwrap();
    let mut s = EditorSession::with_stack(quick_settings(), stack);
    s.set_auto_mask_thresholds(Some(GrayThreshold::new(100, 150).unwrap()), None);
    s.auto_mask().unwrap();
    assert_eq!(s.stack().last().raster().as_bytes(), &[BLANK, INK, INK, BLANK]);
}

#[test]
fn fallback_rule_needs_white_everywhere() {
    let a = Layer::new("a".to_string(), Raster::Gray(GrayImage::from_raw(3, 1, vec![255, 255, 0]).unwrap()));
    let b = Layer::new("b".to_string(), Raster::Gray(GrayImage::from_raw(3, 1, vec![255, 0, 255]).unwrap()));
    let stack = LayerStack::from_layers(res(3, 1), vec![a, b, gray("t", 3, 1, 90)]).unwrap();
    let mut s = EditorSession::with_stack(quick_settings(), stack);
    s.auto_mask().unwrap();
    assert_eq!(s.stack().last().raster().as_bytes(), &[INK, 90, 90]);
}

#[test]
fn history_round_trips_any_depth() {
    for n in 1..=6 {
        let mut stack = LayerStack::new(res(5, 5));
        let initial = stack.clone();
        let mut history = HistoryManager::default();
        for i in 0..n {
            let before = StackSnapshot::capture(&stack);
            let mut raster = Raster::blank(ColorMode::Gray, 5, 5);
            raster.fill_rect(ImageRect::from_corners(0, 0, i + 1, i + 1), INK);
            stack.push(Layer::new(format!("step {}", i), raster)).unwrap();
            history.push("step", before);
        }
        assert_eq!(history.redo(&mut stack), None);
        for _ in 0..n {
            assert!(history.undo(&mut stack).is_some());
        }
        assert_eq!(stack, initial);
        assert_eq!(history.undo(&mut stack), None);
        assert_eq!(stack, initial);
    }
}

#[test]
fn compose_is_pure_and_skips_hidden_layers() {
    let mut stack =
        LayerStack::from_layers(res(4, 4), vec![gray("a", 4, 4, 10), gray("b", 2, 2, 200)]).unwrap();
    let first = stack.compose(ColorMode::Gray, true);
    let snapshot = stack.clone();
    assert_eq!(stack.compose(ColorMode::Gray, true), first);
    assert_eq!(stack, snapshot);
    assert_eq!(first.value_at(0, 0), 200);

    stack.set_visible(1, false).unwrap();
    assert_eq!(stack.compose(ColorMode::Gray, true).value_at(0, 0), 10);
}

#[test]
fn committed_edits_align_to_the_merge_grid() {
    for m in [2u32, 3, 4, 8] {
        let mut s = EditorSession::with_stack(quick_settings(), LayerStack::new(res(64, 48)));
        s.set_merge_factor(m).unwrap();
        s.press_at((5, 7)).unwrap();
        s.release_at((19, 22)).unwrap();
        let b = s.stack().current().raster().content_bounds(BLANK).unwrap();
        for edge in [b.x0, b.y0, b.x1, b.y1] {
            assert_eq!(edge % m, 0, "edge {} with merge factor {}", edge, m);
        }

        s.set_tool(Tool::Select);
        s.press_at((1, 1)).unwrap();
        s.drag_to((13, 11)).unwrap();
        s.release_at((13, 11)).unwrap();
        let sel = s.selection().unwrap();
        for edge in [sel.x0, sel.y0, sel.x1, sel.y1] {
            assert_eq!(edge % m, 0);
        }
    }
}

#[test]
fn view_round_trip_stays_within_a_pixel() {
    let mut view = ViewTransform::new();
    for scale in [0.1f32, 0.37, 1.0, 2.5, 10.0] {
        view.set_scale(scale);
        for (x, y) in [(0i64, 0i64), (13, 7), (639, 479)] {
            let screen = view.image_to_screen(x as f32 + 0.5, y as f32 + 0.5);
            let (bx, by) = view.screen_to_image(screen);
            assert!((bx - x).abs() <= 1 && (by - y).abs() <= 1, "scale {} point {:?}", scale, (x, y));
        }
    }
}

#[test]
fn pointer_gestures_use_screen_space() {
    let mut s = EditorSession::with_stack(quick_settings(), LayerStack::new(res(20, 20)));
    s.pointer_down(Pos2::new(12.0, 12.0)).unwrap();
    s.pointer_up(Pos2::new(16.0, 15.0)).unwrap();
    assert_eq!(
        s.stack().current().raster().content_bounds(BLANK),
        Some(ImageRect { x0: 2, y0: 2, x1: 6, y1: 5 })
    );
}

#[test]
fn stopping_mid_run_restores_and_ignores_the_old_timer() {
    let layers = (0..4u8).map(|i| gray(&format!("L{}", i), 3, 3, i)).collect();
    let stack = LayerStack::from_layers(res(3, 3), layers).unwrap();
    let original = stack.clone();
    let mut s = EditorSession::with_stack(quick_settings(), stack);

    let PlaybackStep::Scheduled { handle, .. } = s.start_playback().unwrap() else {
        panic!("run should be scheduled");
    };
    let PlaybackStep::Scheduled { handle: h2, .. } = s.playback_tick(handle).unwrap() else {
        panic!("run should continue");
    };
    let PlaybackStep::Scheduled { handle: h3, .. } = s.playback_tick(h2).unwrap() else {
        panic!("run should continue");
    };
    assert_ne!(s.stack(), &original);
    assert_eq!(s.stop_playback(), Some(h3));
    assert_eq!(s.stack(), &original);
    assert_eq!(s.playback_tick(h3), None);
    assert_eq!(s.stack(), &original);
}
