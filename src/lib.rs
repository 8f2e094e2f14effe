pub mod commands;
pub mod error;
pub mod planner;
pub mod progress;
pub mod transfer;
pub mod utils;

pub use error::DownloadError;
pub use progress::ProgressSink;
pub use transfer::{probe_size, unit_for_url, ByteRange, Credentials, TransferUnit};
