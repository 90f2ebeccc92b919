//! Boundary to the external media tools.
//!
//! The `MediaTool` trait is the only surface the rest of the crate sees;
//! `SubprocessTool` implements it over yt-dlp and ffmpeg child processes
//! spawned in their own process groups so cancellation can kill the whole
//! tree. Percent parsing stays in the per-tool modules, normalization into
//! task progress happens on the worker side of the trait.

mod ffmpeg;
mod process;
pub mod script; // Expose for tests (ScriptedTool)
mod subprocess;
mod traits;
mod types;
mod ytdlp;

pub use script::{ScriptStep, ScriptedTool};
pub use subprocess::SubprocessTool;
pub use traits::{MediaTool, ProgressFn, Result, ToolError};
pub use types::{ConvertSpec, FetchSpec, FormatCatalog, FormatOption, MediaProbe, MuxSpec};
