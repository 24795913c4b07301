//! Session log.
//!
//! One file per run, truncated when the binary calls [`init`]:
//!   Windows:  `%APPDATA%\MaskFE\maskfe.log`
//!   Linux:    `$XDG_DATA_HOME/MaskFE/maskfe.log` (or `~/.local/share/...`)
//!   macOS:    `~/Library/Application Support/MaskFE/maskfe.log`
//!
//! Use the `log_info!` / `log_warn!` / `log_err!` macros.  Before `init` they
//! do nothing, so the library and its tests never write a file.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

struct Sink {
    path: PathBuf,
    file: Mutex<File>,
}

static SINK: OnceLock<Sink> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        })
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, format_args!($($arg)*))
    };
}

/// Where the log is being written, once initialised.
pub fn log_path() -> Option<&'static Path> {
    SINK.get().map(|s| s.path.as_path())
}

pub fn is_enabled() -> bool {
    SINK.get().is_some()
}

/// Append one `[time] [LEVEL] message` line.  I/O errors are swallowed.
pub fn write(level: Level, msg: fmt::Arguments<'_>) {
    let Some(sink) = SINK.get() else {
        return;
    };
    if let Ok(mut file) = sink.file.lock() {
        let _ = writeln!(file, "{}", format_line(&timestamp(), level, msg));
    }
}

fn format_line(time: &str, level: Level, msg: fmt::Arguments<'_>) -> String {
    format!("[{}] [{}] {}", time, level, msg)
}

fn raw_line(line: &str) {
    if let Some(sink) = SINK.get()
        && let Ok(mut file) = sink.file.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

/// Open the default log file and mirror panics into it.  Call once, from
/// the binary.  Failing to open the file only disables logging.
pub fn init() {
    if let Err(e) = init_at(&default_log_path()) {
        eprintln!("[logger] logging disabled: {}", e);
    }
}

/// Like [`init`] with an explicit file.  A second call is a no-op.
pub fn init_at(path: &Path) -> std::io::Result<()> {
    if SINK.get().is_some() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    let _ = SINK.set(Sink {
        path: path.to_path_buf(),
        file: Mutex::new(file),
    });

    raw_line(&format!(
        "=== MaskFE {} session {} ===",
        env!("CARGO_PKG_VERSION"),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    ));

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        raw_line(&format!("[{}] [PANIC] {}", timestamp(), info));
        prev(info);
    }));
    Ok(())
}

fn default_log_path() -> PathBuf {
    data_dir().join("MaskFE").join("maskfe.log")
}

/// Per-user data directory, without the app folder.
fn data_dir() -> PathBuf {
    let var = |k: &str| std::env::var_os(k).map(PathBuf::from);
    if cfg!(target_os = "windows") {
        if let Some(p) = var("APPDATA") {
            return p;
        }
    }
    if cfg!(target_os = "macos") {
        if let Some(home) = var("HOME") {
            return home.join("Library").join("Application Support");
        }
    }
    var("XDG_DATA_HOME")
        .or_else(|| var("HOME").map(|h| h.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}
