//! C7: the archive container. An archive is a header followed by an
//! ordered run of tagged, self-lengthed sections (§4.7): one `PAYLOADP`
//! stream, one `CHUNKSCH` index, one `CONTENTS`/`BCKUPSET` pair per backup
//! increment, a final `HASHTBLE` snapshot, and an `END` footer.

pub mod archive;
pub mod backupset;
pub mod chunktab;
pub mod contents;
pub mod header;

pub use archive::{Archive, Increment};
pub use backupset::BackupSet;
pub use chunktab::{ChunkEntry, ChunkIndex};
pub use contents::{FileKind, FileRecord};
pub use header::Header;
