//! File discovery: turns a target path into batches of conversion candidates.
//!
//! The walk is lazy. Candidates come out in batches of at most `chunk_size`
//! entries so the index can persist them one chunk at a time without the
//! whole tree ever being held in memory.

mod error;
mod types;
mod walker;

pub use error::DiscoveryError;
pub use types::{is_media_extension, Candidate, EntryKind, AUDIO_EXTENSIONS, VIDEO_EXTENSIONS};
pub use walker::{discover, CandidateBatches, FileDiscoverer, PART_FILE_MARKER};
