pub mod archive;
pub mod archive_sink;
pub mod object_store;

pub use archive::{encode_csv_gz, ArchiveKey, ArchiveOutcome, ArchiveStatus, Archiver, FailureStage};
pub use archive_sink::{ArchiveSink, BatchReport};
pub use object_store::{MemoryObjectStore, ObjectStore, S3ObjectStore, StoreError};
