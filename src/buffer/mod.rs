/*!
 * Buffer Access
 * Sources, record splitting, filtering and snapshot fetching
 */

pub mod fetcher;
pub mod file;
pub mod filter;
pub mod memory;
pub mod reader;
pub mod source;

pub use fetcher::{Snapshot, SnapshotFetcher};
pub use file::FileBuffer;
pub use filter::{compile_pattern, AttributeMatch, EventFilter, ExclusionSet, MatchMode};
pub use memory::MemoryBuffer;
pub use reader::{BufferHeader, RecordItem, RecordReader, RecordSlice};
pub use source::{BufferSource, ExclusionSource, ExclusionTable, NoExclusions};
