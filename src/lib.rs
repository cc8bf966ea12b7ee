//! # jls — chunked container format for long sampled-signal logs
//!
//! Format guarantees:
//! - All numeric fields are little-endian
//! - Every chunk is self-describing: tag, chunk_meta, lengths, CRC32 over its
//!   header and separately over its payload; corrupt headers/payloads abort
//!   reads of that chunk without aborting the rest of the file
//! - Sources and signals are defined once via `source_def`/`signal_def` and
//!   addressed by a small bounded id (`SOURCE_COUNT`/`SIGNAL_COUNT`)
//! - Each signal's tracks (FSR/VSR/ANNOTATION/UTC) are independent
//!   doubly-linked chunk chains threaded through the file by file offset
//! - FSR signals build a hierarchical summary/index tree alongside the raw
//!   data chunks, enabling logarithmic-time statistical range queries
//! - A file missing its tail (truncation) is still readable up to the
//!   largest complete level; `Reader::scan_forward` reconstructs chunk
//!   offsets by scanning from `FILE_HEADER_SIZE` without relying on any
//!   linked list

pub mod error;
pub mod format;
pub mod raw;
pub mod signal;
pub mod string_arena;
pub mod summary;
pub mod writer;
pub mod reader;

pub use error::{Error, Result};
pub use format::{
    ChunkHeader, ChunkKind, StorageType, TrackType, CHUNK_HEADER_SIZE, FILE_HEADER_SIZE,
    FILE_MAGIC, FORMAT_VERSION, SIGNAL_COUNT, SOURCE_COUNT, SUMMARY_LEVEL_COUNT,
};
pub use raw::{RawReader, RawWriter};
pub use signal::{step_sizes, DataType, Signal, SignalType, Source};
pub use string_arena::{StringArena, StringHandle};
pub use summary::{combine, summarize, SummaryEntry};
pub use writer::Writer;
pub use reader::{Annotation, Reader, ScanEntry, ScanReport};
