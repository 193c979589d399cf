//! Fetch engine abstraction and the yt-dlp implementation.

pub mod capture;
pub mod traits;
pub mod ytdlp;

pub use capture::ErrorCapture;
pub use traits::{FetchEngine, FetchMetadata, FetchOutput, FetchRequest};
pub use ytdlp::{YtDlpEngine, YtDlpEngineConfig};
