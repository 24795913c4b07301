pub mod automask;
pub mod canvas_ops;
pub mod clipboard;
pub mod import;
