pub mod detail;
pub mod index;
pub mod writer;

pub use detail::{read_detail, DetailLogRow, DetailWriter};
pub use index::{read_index, TrackIndexEntry};
pub use writer::{recent_detail_files, LogWriter};
