pub mod history;
pub mod playback;
pub mod tools;
