//! Resumable Chunked Upload Core
//!
//! Implements reliable large file uploads with:
//! - Offset-addressed positional chunk writes into one preallocated target file
//! - Durable, crash-recoverable session/chunk tracking in the Metadata Store
//! - Exactly-once finalization via compare-and-set session status transitions
//! - Streaming SHA-256 digesting and best-effort container peeking at finalize
//! - A periodic janitor reclaiming expired sessions and orphaned scratch files
//!
//! Protocol flow:
//! 1. Client calls `init` with an upload id, filename, and total size.
//! 2. Client uploads chunks in any order; each lands at its own byte offset.
//! 3. Once every chunk is received, the coordinator finalizes exactly once.
//! 4. Client polls `status` for progress or the final session state.

pub mod container;
pub mod coordinator;
pub mod digest;
pub mod janitor;
pub mod types;
pub mod writer;

pub use coordinator::Coordinator;
pub use janitor::Janitor;
pub use types::*;
pub use writer::ChunkWriter;
