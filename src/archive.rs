//! Whole archives.
use {
    crate::{
        entry::{ComposedEntry, EntryDescriptor},
        error::{Error, Result},
        stream::{BufferChunks, ByteStream, Concat, BLOCK_SIZE},
    },
    futures::{stream::IntoAsyncRead, TryStreamExt},
    futures_lite::Stream,
    std::{
        io,
        pin::Pin,
        task::{Context, Poll},
    },
};

/// Two zero blocks close every archive.
const TERMINATOR_SIZE: usize = BLOCK_SIZE * 2;

/// A complete tar archive as a lazy stream of chunks.
///
/// Entries appear in input order; nothing is read or encoded beyond what the
/// consumer has polled for. Dropping the stream early releases all pending
/// content producers.
pub struct Tarball<'a> {
    inner: Concat<'a>,
}

impl<'a> Tarball<'a> {
    /// Lay out every entry and queue the terminator.
    ///
    /// Fails before producing anything when `entries` is empty or any entry
    /// is malformed.
    pub fn new<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = EntryDescriptor<'a>>,
    {
        let mut inner = entries
            .into_iter()
            .map(|entry| {
                ComposedEntry::new(entry).map(|e| Box::pin(e.into_stream()) as ByteStream<'a>)
            })
            .collect::<Result<Concat<'a>>>()?;
        if inner.is_empty() {
            return Err(Error::EmptyArchive);
        }
        tracing::trace!(target: "tar", "tarball with {} entries", inner.len());
        inner.push(Box::pin(BufferChunks::new(vec![0u8; TERMINATOR_SIZE])));
        Ok(Self { inner })
    }

    /// Expose the archive as an `AsyncRead`.
    pub fn into_reader(self) -> IntoAsyncRead<Self> {
        self.into_async_read()
    }
}

/// Build the archive stream for `entries`.
pub fn assemble<'a, I>(entries: I) -> Result<Tarball<'a>>
where
    I: IntoIterator<Item = EntryDescriptor<'a>>,
{
    Tarball::new(entries)
}

impl Stream for Tarball<'_> {
    type Item = io::Result<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
