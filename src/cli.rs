// ============================================================================
// MaskFE CLI: headless mask building via command-line arguments
// ============================================================================
//
// Usage examples:
//   maskfe -i scan.png -o mask.png                         (grayscale import, export)
//   maskfe -i "shots/*.jpg" --mode color --auto-mask --lab 0,200,-28,22,-28,22 -o mask.png
//   maskfe -i a.png b.png --fit pad --resolution 320x240 --invert --quick-export
//   maskfe -i a.png b.png c.png --playback-frames frames/
//
// Inputs are imported as layers in the order given, on top of nothing: the
// session's initial white board is dropped once at least one input loaded.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::components::playback::PlaybackStep;
use crate::error::{EditorError, Result};
use crate::io::{self, SaveFormat};
use crate::ops::import::FitPolicy;
use crate::session::EditorSession;
use crate::settings::{self, EditorSettings, ImportMode};
use crate::{log_err, log_info};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// MaskFE headless mask builder.
#[derive(Parser, Debug)]
#[command(
    name = "maskfe",
    about = "MaskFE headless binary-mask builder",
    long_about = "Import pictures as layers, optionally derive a mask from them with\n\
                  gray / LAB thresholds, and export the flattened grayscale mask.\n\n\
                  Example:\n  \
                  maskfe -i scan.png --auto-mask --gray 0,128 -o mask.png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Import processing: gray, binary, color.
    #[arg(short, long, default_value = "gray", value_name = "MODE")]
    pub mode: String,

    /// Fit policy: scale (resample), pad (centre a smaller source), crop (centred window).
    #[arg(long, default_value = "scale", value_name = "POLICY")]
    pub fit: String,

    /// Target resolution, e.g. 640x480.
    #[arg(short, long, value_name = "WxH")]
    pub resolution: Option<String>,

    /// Append a blank layer and fill it from the thresholds of the others.
    #[arg(long)]
    pub auto_mask: bool,

    /// Auto-mask grayscale band "min,max".
    #[arg(long, value_name = "MIN,MAX")]
    pub gray: Option<String>,

    /// Auto-mask LAB box "lmin,lmax,amin,amax,bmin,bmax".
    #[arg(long, value_name = "L,L,A,A,B,B", allow_hyphen_values = true)]
    pub lab: Option<String>,

    /// Swap ink and background on the current layer before export.
    #[arg(long)]
    pub invert: bool,

    /// Output file path; format from the extension (png, jpg, bmp, tiff).
    #[arg(short, long, value_name = "FILE", conflicts_with = "quick_export")]
    pub output: Option<PathBuf>,

    /// Export as mask_<timestamp>.png into --output-dir.
    #[arg(long)]
    pub quick_export: bool,

    /// Directory for --quick-export (default: current directory).
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Write every playback step's display composite as numbered PNGs.
    #[arg(long, value_name = "DIR")]
    pub playback_frames: Option<PathBuf>,

    /// Print each step's status line and timing.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the pipeline and return an OS exit code.
/// `0` = everything succeeded, `1` = any error.
pub fn run(args: CliArgs) -> ExitCode {
    if args.output.is_none() && !args.quick_export && args.playback_frames.is_none() {
        eprintln!("error: nothing to do; give --output, --quick-export or --playback-frames.");
        return ExitCode::FAILURE;
    }

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    let start = Instant::now();
    match run_pipeline(&args, &inputs) {
        Ok(()) => {
            if args.verbose {
                println!("done ({:.0}ms)", start.elapsed().as_secs_f64() * 1000.0);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log_err!("CLI run failed: {}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Settings for this run: defaults overridden by the arguments.
fn settings_from_args(args: &CliArgs) -> Result<EditorSettings> {
    let mut s = EditorSettings::default();
    if let Some(res) = &args.resolution {
        s.resolution = settings::parse_resolution(res)?;
    }
    s.import_mode = ImportMode::parse(&args.mode)?;
    if let Some(gray) = &args.gray {
        s.auto_mask_gray = Some(settings::parse_gray_threshold(gray)?);
    }
    if let Some(lab) = &args.lab {
        s.auto_mask_lab = Some(settings::parse_lab_threshold(lab)?);
    }
    Ok(s)
}

fn parse_fit(text: &str) -> Result<Option<FitPolicy>> {
    match text.trim().to_lowercase().as_str() {
        "scale" => Ok(Some(FitPolicy::ScaleUp)),
        "pad" => Ok(Some(FitPolicy::CenterPad)),
        // Needs the source size, resolved per input
        "crop" => Ok(None),
        other => Err(EditorError::validation(format!(
            "unknown fit policy '{}' (expected scale, pad or crop)",
            other
        ))),
    }
}

// ============================================================================
// Pipeline
// ============================================================================

fn run_pipeline(args: &CliArgs, inputs: &[PathBuf]) -> Result<()> {
    let settings = settings_from_args(args)?;
    let fit = parse_fit(&args.fit)?;
    let mut session = EditorSession::new(settings);
    log_info!("CLI run: {} input(s)", inputs.len());

    // -- Step 1: Import --------------------------------------------------
    let total = inputs.len();
    for (idx, path) in inputs.iter().enumerate() {
        if args.verbose {
            println!("[{}/{}] {}", idx + 1, total, path.display());
        }
        let img = io::load_image(path)?;
        let policy = match fit {
            Some(p) => p,
            None => FitPolicy::centered_crop((img.width(), img.height()), session.stack().resolution()),
        };
        session.import_image(&img, policy)?;
        say(args, &session);
    }

    // The white board the session started with is not part of the document
    session.select_layer(0)?;
    session.delete_layer()?;
    session.select_layer(session.stack().len() - 1)?;

    // -- Step 2: Auto mask -----------------------------------------------
    if args.auto_mask {
        session.new_layer()?;
        session.auto_mask()?;
        say(args, &session);
    }

    // -- Step 3: Invert --------------------------------------------------
    if args.invert {
        session.invert_mask()?;
        say(args, &session);
    }

    // -- Step 4: Export --------------------------------------------------
    if let Some(out) = &args.output {
        session.export(out)?;
        println!("  → {}", out.display());
    } else if args.quick_export {
        let path = session.quick_export(&args.output_dir, SaveFormat::Png)?;
        println!("  → {}", path.display());
    }

    if let Some(dir) = &args.playback_frames {
        let written = write_playback_frames(&mut session, dir)?;
        println!("  → {} playback frame(s) in {}", written, dir.display());
    }
    Ok(())
}

/// Drive a playback run with immediate ticks, saving the display composite
/// of every step as `frame_NNN.png`.  Returns the number of frames written.
fn write_playback_frames(session: &mut EditorSession, dir: &Path) -> Result<usize> {
    std::fs::create_dir_all(dir).map_err(|source| EditorError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut step = session.start_playback()?;
    let mut written = 0;
    while let PlaybackStep::Scheduled { handle, .. } = step {
        let stack = session.stack();
        let frame = stack.compose(stack.display_color_mode(), true);
        let path = dir.join(format!("frame_{:03}.png", written));
        if let Err(e) = io::save_frame(&frame, &path) {
            session.stop_playback();
            return Err(e);
        }
        written += 1;
        step = match session.playback_tick(handle) {
            Some(next) => next,
            None => break,
        };
    }
    log_info!("Wrote {} playback frames to {}", written, dir.display());
    Ok(written)
}

fn say(args: &CliArgs, session: &EditorSession) {
    if args.verbose {
        println!("  {}", session.status());
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}
