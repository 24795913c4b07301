//! MaskFE: a layered binary-mask editor core.
//!
//! [`session::EditorSession`] owns the layer stack and every component that
//! acts on it; the shell (the bundled CLI, or any GUI) drives it with
//! pointer events, layer commands and playback ticks.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::large_enum_variant)]

pub mod logger;

pub mod canvas;
pub mod cli;
pub mod components;
pub mod error;
pub mod io;
pub mod ops;
pub mod session;
pub mod settings;
pub mod viewport;

pub use error::{EditorError, Result};
pub use session::{EditorSession, Frame};
