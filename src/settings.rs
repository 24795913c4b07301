// ============================================================================
// EDITOR SETTINGS: validated configuration values + key=value persistence
// ============================================================================
//
// The shell collects raw strings from its dialogs and hands them to the
// `parse_*` helpers below; the core only ever sees values that passed
// validation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EditorError, Result};

pub const DEFAULT_RESOLUTION: Resolution = Resolution { width: 640, height: 480 };
pub const DEFAULT_BRUSH_SIZE: u32 = 5;
pub const DEFAULT_PLAYBACK_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_IMPORT_GRAY: GrayThreshold = GrayThreshold { min: 0, max: 128 };
/// Binarisation range for colour imports: L on the 0..=255 scale, a*/b* signed.
pub const DEFAULT_IMPORT_LAB: LabThreshold = LabThreshold {
    l_min: 0,
    l_max: 200,
    a_min: -28,
    a_max: 22,
    b_min: -28,
    b_max: 22,
};

// ----------------------------------------------------------------------------
//  Value types
// ----------------------------------------------------------------------------

/// Fixed raster size every layer must match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(EditorError::validation("resolution must be positive integers"));
        }
        Ok(Self { width, height })
    }

    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Inclusive grayscale band `min..=max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GrayThreshold {
    pub min: u8,
    pub max: u8,
}

impl GrayThreshold {
    pub fn new(min: i64, max: i64) -> Result<Self> {
        if !(0 <= min && min <= max && max <= 255) {
            return Err(EditorError::validation(
                "gray threshold must satisfy 0 <= min <= max <= 255",
            ));
        }
        Ok(Self { min: min as u8, max: max as u8 })
    }

    #[inline]
    pub fn contains(&self, v: u8) -> bool {
        v >= self.min && v <= self.max
    }
}

impl fmt::Display for GrayThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.min, self.max)
    }
}

/// Inclusive LAB box. `L` is on the 8-bit 0..=255 scale, `a*`/`b*` are signed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LabThreshold {
    pub l_min: u8,
    pub l_max: u8,
    pub a_min: i16,
    pub a_max: i16,
    pub b_min: i16,
    pub b_max: i16,
}

impl LabThreshold {
    pub fn new(values: [i64; 6]) -> Result<Self> {
        let [l_min, l_max, a_min, a_max, b_min, b_max] = values;
        let l_ok = 0 <= l_min && l_min <= l_max && l_max <= 255;
        let a_ok = -128 <= a_min && a_min <= a_max && a_max <= 127;
        let b_ok = -128 <= b_min && b_min <= b_max && b_max <= 127;
        if !(l_ok && a_ok && b_ok) {
            return Err(EditorError::validation(
                "LAB threshold out of range: L in [0,255], A/B in [-128,127], min <= max",
            ));
        }
        Ok(Self {
            l_min: l_min as u8,
            l_max: l_max as u8,
            a_min: a_min as i16,
            a_max: a_max as i16,
            b_min: b_min as i16,
            b_max: b_max as i16,
        })
    }

    #[inline]
    pub fn contains(&self, l: u8, a: i16, b: i16) -> bool {
        l >= self.l_min
            && l <= self.l_max
            && a >= self.a_min
            && a <= self.a_max
            && b >= self.b_min
            && b <= self.b_max
    }
}

impl fmt::Display for LabThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.l_min, self.l_max, self.a_min, self.a_max, self.b_min, self.b_max
        )
    }
}

/// How an imported picture is processed before it becomes a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ImportMode {
    #[default]
    Grayscale,
    /// Thresholded to pure 0 / 255.
    Binary,
    Color,
}

impl ImportMode {
    pub fn name(&self) -> &'static str {
        match self {
            ImportMode::Grayscale => "gray",
            ImportMode::Binary => "binary",
            ImportMode::Color => "color",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gray" | "grey" | "grayscale" => Ok(ImportMode::Grayscale),
            "binary" | "bin" => Ok(ImportMode::Binary),
            "color" | "colour" | "rgb" => Ok(ImportMode::Color),
            other => Err(EditorError::validation(format!("unknown import mode '{}'", other))),
        }
    }
}

// ----------------------------------------------------------------------------
//  Settings
// ----------------------------------------------------------------------------

/// Editor settings that persist across sessions.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    pub resolution: Resolution,
    /// Auto-mask gray band; `None` = not set.
    pub auto_mask_gray: Option<GrayThreshold>,
    /// Auto-mask LAB box; `None` = not set.
    pub auto_mask_lab: Option<LabThreshold>,
    pub import_gray: GrayThreshold,
    pub import_lab: LabThreshold,
    pub import_mode: ImportMode,
    pub brush_size: u32,
    /// Edit-grid granularity, 1 = no merging.
    pub merge_factor: u32,
    pub playback_interval: Duration,
    /// Pixel grid display; paint/erase clicks toggle whole cells while on.
    pub grid_mode: bool,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            auto_mask_gray: None,
            auto_mask_lab: None,
            import_gray: DEFAULT_IMPORT_GRAY,
            import_lab: DEFAULT_IMPORT_LAB,
            import_mode: ImportMode::Grayscale,
            brush_size: DEFAULT_BRUSH_SIZE,
            merge_factor: 1,
            playback_interval: Duration::from_millis(DEFAULT_PLAYBACK_INTERVAL_MS),
            grid_mode: false,
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/maskfe/maskfe_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\MaskFE\maskfe_settings.cfg
    /// On macOS:   ~/Library/Application Support/MaskFE/maskfe_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").ok()?;
            return Some(PathBuf::from(appdata).join("MaskFE").join("maskfe_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("MaskFE")
                    .join("maskfe_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?;
            Some(config_dir.join("maskfe").join("maskfe_settings.cfg"))
        }
    }

    /// Load settings from the default location (defaults if missing or corrupt).
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_config_str(&content),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to the default location.
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::settings_path() else {
            return Err(EditorError::precondition("no settings directory available"));
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| EditorError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, self.to_config_string()).map_err(|source| EditorError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_config_string(&self) -> String {
        let opt = |v: Option<String>| v.unwrap_or_default();
        format!(
            "resolution={}\n\
             auto_mask_gray={}\n\
             auto_mask_lab={}\n\
             import_gray={}\n\
             import_lab={}\n\
             import_mode={}\n\
             brush_size={}\n\
             merge_factor={}\n\
             playback_interval_ms={}\n\
             grid_mode={}\n",
            self.resolution,
            opt(self.auto_mask_gray.map(|t| t.to_string())),
            opt(self.auto_mask_lab.map(|t| t.to_string())),
            self.import_gray,
            self.import_lab,
            self.import_mode.name(),
            self.brush_size,
            self.merge_factor,
            self.playback_interval.as_millis(),
            self.grid_mode,
        )
    }

    /// Parse a settings file.  Invalid lines keep their default value.
    pub fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else {
                continue;
            };
            let val = val.trim();
            match key.trim() {
                "resolution" => {
                    if let Ok(r) = parse_resolution(val) {
                        s.resolution = r;
                    }
                }
                "auto_mask_gray" => {
                    if let Ok(t) = parse_optional_gray(val) {
                        s.auto_mask_gray = t;
                    }
                }
                "auto_mask_lab" => {
                    if let Ok(t) = parse_optional_lab(val) {
                        s.auto_mask_lab = t;
                    }
                }
                "import_gray" => {
                    if let Ok(t) = parse_gray_threshold(val) {
                        s.import_gray = t;
                    }
                }
                "import_lab" => {
                    if let Ok(t) = parse_lab_threshold(val) {
                        s.import_lab = t;
                    }
                }
                "import_mode" => {
                    if let Ok(m) = ImportMode::parse(val) {
                        s.import_mode = m;
                    }
                }
                "brush_size" => {
                    if let Ok(v) = parse_positive_int(val, "brush size") {
                        s.brush_size = v;
                    }
                }
                "merge_factor" => {
                    if let Ok(v) = parse_positive_int(val, "merge factor") {
                        s.merge_factor = v;
                    }
                }
                "playback_interval_ms" => {
                    if let Ok(ms) = val.parse::<u64>()
                        && ms > 0
                    {
                        s.playback_interval = Duration::from_millis(ms);
                    }
                }
                "grid_mode" => {
                    s.grid_mode = val == "true";
                }
                _ => {}
            }
        }
        s
    }
}

// ----------------------------------------------------------------------------
//  Boundary parsers
// ----------------------------------------------------------------------------

/// Split on ASCII or full-width commas, dropping empty parts.
fn split_values(text: &str) -> Vec<&str> {
    text.split([',', '，'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn parse_ints(text: &str, expected: usize, what: &str) -> Result<Vec<i64>> {
    let parts = split_values(text);
    if parts.len() != expected {
        return Err(EditorError::validation(format!(
            "{} needs {} comma-separated values, got {}",
            what,
            expected,
            parts.len()
        )));
    }
    parts
        .iter()
        .map(|p| {
            p.parse::<i64>()
                .map_err(|_| EditorError::validation(format!("{}: '{}' is not an integer", what, p)))
        })
        .collect()
}

/// `"640x480"` or `"640×480"`.
pub fn parse_resolution(text: &str) -> Result<Resolution> {
    let text = text.trim();
    if text.is_empty() {
        return Err(EditorError::validation("resolution is empty"));
    }
    let normalized = text.replace('×', "x").to_lowercase();
    let parts: Vec<&str> = normalized.split('x').map(str::trim).collect();
    if parts.len() != 2 {
        return Err(EditorError::validation("resolution must look like WIDTHxHEIGHT"));
    }
    let w = parts[0]
        .parse::<i64>()
        .map_err(|_| EditorError::validation("resolution width is not an integer"))?;
    let h = parts[1]
        .parse::<i64>()
        .map_err(|_| EditorError::validation("resolution height is not an integer"))?;
    if w <= 0 || h <= 0 || w > u32::MAX as i64 || h > u32::MAX as i64 {
        return Err(EditorError::validation("resolution must be positive integers"));
    }
    Resolution::new(w as u32, h as u32)
}

/// `"min,max"`.
pub fn parse_gray_threshold(text: &str) -> Result<GrayThreshold> {
    let v = parse_ints(text, 2, "gray threshold")?;
    GrayThreshold::new(v[0], v[1])
}

/// `"Lmin,Lmax,Amin,Amax,Bmin,Bmax"`.
pub fn parse_lab_threshold(text: &str) -> Result<LabThreshold> {
    let v = parse_ints(text, 6, "LAB threshold")?;
    LabThreshold::new([v[0], v[1], v[2], v[3], v[4], v[5]])
}

/// Empty text means "not set".
pub fn parse_optional_gray(text: &str) -> Result<Option<GrayThreshold>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    parse_gray_threshold(text).map(Some)
}

pub fn parse_optional_lab(text: &str) -> Result<Option<LabThreshold>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    parse_lab_threshold(text).map(Some)
}

pub fn parse_positive_int(text: &str, what: &str) -> Result<u32> {
    match text.trim().parse::<i64>() {
        Ok(v) if v >= 1 && v <= u32::MAX as i64 => Ok(v as u32),
        Ok(_) => Err(EditorError::validation(format!("{} must be a positive integer", what))),
        Err(_) => Err(EditorError::validation(format!("{}: '{}' is not an integer", what, text.trim()))),
    }
}

/// Seconds as typed by the user, stored as whole milliseconds.
pub fn parse_interval_secs(text: &str) -> Result<Duration> {
    let secs: f64 = text
        .trim()
        .parse()
        .map_err(|_| EditorError::validation("playback interval must be a number of seconds"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(EditorError::validation("playback interval must be positive"));
    }
    let ms = (secs * 1000.0) as u64;
    if ms == 0 {
        return Err(EditorError::validation("playback interval is below one millisecond"));
    }
    Ok(Duration::from_millis(ms))
}
