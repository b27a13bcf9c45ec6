// Loading
mod image;
pub use image::Image;

// Running
mod runtime;
pub use runtime::{RunFlag, RunState};

// Terminal I/O
pub mod term;
pub use term::{Console, Terminal};

mod error;
