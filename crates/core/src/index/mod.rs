//! Conversion index: the durable ledger behind resumable jobs.
//!
//! One SQLite file per job (selected by [`JobKey`]) records every discovered
//! input, the output path it was assigned and where it stands. Discoveries
//! are appended one chunk per transaction, pending work is read back a page
//! at a time, and every status change is committed before `mark` returns.
//! Killing the process at any point leaves a consistent index; whatever was
//! in flight is still `Pending` on the next run.
//!
//! # Example
//!
//! ```ignore
//! use rekonv_core::index::{ConversionIndex, EntryStatus};
//!
//! let index = ConversionIndex::open_or_create(Path::new(".rekonv"), &job, &config.index)?;
//! for batch in discover(&job, config.index.chunk_size)? {
//!     index.append_entries(batch)?;
//! }
//! index.mark_discovery_complete()?;
//!
//! for entry in index.iterate_pending() {
//!     let entry = entry?;
//!     index.mark(entry.id, EntryStatus::Done, None)?;
//! }
//! assert!(index.verify_complete()?.is_complete());
//! ```

mod error;
mod naming;
mod sqlite;
mod types;

pub use error::IndexError;
pub use naming::{planned_output, with_suffix};
pub use sqlite::{ConversionIndex, PendingEntries};
pub use types::{AppendOutcome, EntryStatus, IndexEntry, JobKey, StatusCounts, VerifyReport};
