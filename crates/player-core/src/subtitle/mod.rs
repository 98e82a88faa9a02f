//! Subtitle support: SubRip parsing, content fetching, and binding the active
//! track into the engine with the user's time offset applied.

pub mod binder;
pub mod fetch;
pub mod parser;

pub use binder::{LoadOutcome, SubtitleBinder, SubtitleFetch};
pub use fetch::{fetch_subtitle, FetchSource};
pub use parser::{parse_srt, SubtitleCue};
