//! Conversion driver: works through the pending entries of an index.
//!
//! Each entry is converted (or copied) into a hidden part file next to its
//! output and renamed into place on success, then marked in the index before
//! the next entry starts. A failing file is recorded and the run moves on;
//! only index errors stop it.

mod copy;
mod error;
mod runner;
mod types;

pub use copy::copy_file;
pub use error::DriverError;
pub use runner::{part_path, ConversionDriver};
pub use types::{DriveProgress, DriveSummary};
