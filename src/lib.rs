//! Lazy USTAR tar archive encoder.
//!
//! Entries are described with [`EntryDescriptor`] and turned into a
//! [`Tarball`], a `Stream` of byte chunks that produces the archive only as
//! fast as it is consumed. Paths and sizes the legacy ustar fields cannot
//! hold are carried in POSIX PAX extended headers; content may be a buffer or
//! any lazy producer and is never held beyond the moment it is drained.

pub mod archive;
pub mod entry;
mod error;
pub mod header;
pub mod octal;
pub mod pax;
pub mod path;
pub mod stream;

pub use {
    archive::{assemble, Tarball},
    entry::{ComposedEntry, Content, EntryDescriptor, PlainEntry},
    error::{Error, Result},
    header::{EntryType, HeaderBlock},
    pax::{PaxExtendedHeader, PaxKeyword},
    path::{split_path, SplitPath},
    stream::{BufferChunks, ByteStream, Concat, PaddedContent, ReaderStream, BLOCK_SIZE},
};
