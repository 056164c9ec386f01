//! Lazy byte producers the archive is assembled from.
//!
//! Every producer is a `Stream` of `io::Result<Vec<u8>>` chunks and does no
//! work until polled.
use {
    futures_lite::{io::AsyncRead, Stream},
    pin_project_lite::pin_project,
    std::{
        collections::VecDeque,
        io,
        pin::Pin,
        task::{self, Context, Poll},
    },
};

pub const BLOCK_SIZE: usize = 512;
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Boxed lazy byte producer.
pub type ByteStream<'a> = Pin<Box<dyn Stream<Item = io::Result<Vec<u8>>> + Send + 'a>>;

pub(crate) const fn padded_size(n: u64) -> u64 {
    if n == 0 {
        0
    } else {
        n.saturating_add(511) & !511
    }
}

/// Yields a buffer in fixed-size slices, zero-padding the last one to a
/// block boundary.
#[derive(Debug)]
pub struct BufferChunks {
    buf: Vec<u8>,
    pos: usize,
    chunk_size: usize,
}

impl BufferChunks {
    pub fn new(buf: Vec<u8>) -> Self {
        Self::with_chunk_size(buf, BLOCK_SIZE)
    }
    /// `chunk_size` is rounded up to a whole number of blocks.
    pub fn with_chunk_size(buf: Vec<u8>, chunk_size: usize) -> Self {
        Self {
            buf,
            pos: 0,
            chunk_size: chunk_size
                .max(1)
                .checked_next_multiple_of(BLOCK_SIZE)
                .unwrap_or(usize::MAX - usize::MAX % BLOCK_SIZE),
        }
    }
}

impl Stream for BufferChunks {
    type Item = io::Result<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.pos >= this.buf.len() {
            return Poll::Ready(None);
        }
        let end = this.buf.len().min(this.pos.saturating_add(this.chunk_size));
        let mut chunk = Vec::with_capacity(padded_size((end - this.pos) as u64) as usize);
        chunk.extend_from_slice(&this.buf[this.pos..end]);
        chunk.resize(padded_size(chunk.len() as u64) as usize, 0);
        this.pos = end;
        if this.pos == this.buf.len() {
            // release the source as soon as it is drained
            this.buf = Vec::new();
            this.pos = 0;
        }
        Poll::Ready(Some(Ok(chunk)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.buf.len() - self.pos).div_ceil(self.chunk_size);
        (n, Some(n))
    }
}

/// Drains producers one after another, passing chunks through untouched.
///
/// A producer is dropped as soon as it reports its end. The first error ends
/// the whole stream: every pending producer is dropped with it.
pub struct Concat<'a> {
    streams: VecDeque<ByteStream<'a>>,
}

impl<'a> Concat<'a> {
    pub fn new(first: ByteStream<'a>, second: ByteStream<'a>) -> Self {
        Self {
            streams: VecDeque::from([first, second]),
        }
    }
    /// Queue another producer behind the ones already present.
    pub fn push(&mut self, next: ByteStream<'a>) {
        self.streams.push_back(next);
    }
    /// Number of producers not yet drained.
    pub fn len(&self) -> usize {
        self.streams.len()
    }
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl<'a> FromIterator<ByteStream<'a>> for Concat<'a> {
    fn from_iter<I: IntoIterator<Item = ByteStream<'a>>>(iter: I) -> Self {
        Self {
            streams: iter.into_iter().collect(),
        }
    }
}

impl Stream for Concat<'_> {
    type Item = io::Result<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        while let Some(front) = self.streams.front_mut() {
            match task::ready!(front.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => return Poll::Ready(Some(Ok(chunk))),
                Some(Err(err)) => {
                    tracing::trace!(
                        target: "tar",
                        "dropping {} producers after error",
                        self.streams.len()
                    );
                    self.streams.clear();
                    return Poll::Ready(Some(Err(err)));
                }
                None => {
                    self.streams.pop_front();
                }
            }
        }
        Poll::Ready(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PadState {
    Streaming,
    Padding,
    Done,
}

pin_project! {
    /// Passes streamed entry content through verbatim, checks it against the
    /// declared size and pads the tail of the whole content to a block
    /// boundary.
    pub struct PaddedContent<S> {
        #[pin]
        inner: S,
        expected: u64,
        seen: u64,
        state: PadState,
    }
}

impl<S> PaddedContent<S> {
    pub fn new(inner: S, expected: u64) -> Self {
        Self {
            inner,
            expected,
            seen: 0,
            state: PadState::Streaming,
        }
    }
}

impl<S: Stream<Item = io::Result<Vec<u8>>>> Stream for PaddedContent<S> {
    type Item = io::Result<Vec<u8>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            match *this.state {
                PadState::Streaming => match task::ready!(this.inner.as_mut().poll_next(cx)) {
                    Some(Ok(chunk)) => {
                        *this.seen += chunk.len() as u64;
                        if *this.seen > *this.expected {
                            *this.state = PadState::Done;
                            return Poll::Ready(Some(Err(io::Error::new(
                                io::ErrorKind::InvalidData,
                                format!(
                                    "content exceeds declared size of {} bytes",
                                    *this.expected
                                ),
                            ))));
                        }
                        return Poll::Ready(Some(Ok(chunk)));
                    }
                    Some(Err(err)) => {
                        *this.state = PadState::Done;
                        return Poll::Ready(Some(Err(err)));
                    }
                    None => {
                        if *this.seen < *this.expected {
                            *this.state = PadState::Done;
                            return Poll::Ready(Some(Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                format!(
                                    "content ended after {} of {} bytes",
                                    *this.seen, *this.expected
                                ),
                            ))));
                        }
                        *this.state = PadState::Padding;
                    }
                },
                PadState::Padding => {
                    *this.state = PadState::Done;
                    let padding = padded_size(*this.seen) - *this.seen;
                    tracing::trace!(
                        target: "tar",
                        "content EOF reached, size = {}, padding = {}",
                        *this.seen,
                        padding
                    );
                    if padding > 0 {
                        return Poll::Ready(Some(Ok(vec![0u8; padding as usize])));
                    }
                }
                PadState::Done => return Poll::Ready(None),
            }
        }
    }
}

pin_project! {
    /// Adapts an `AsyncRead` into a stream of chunks of up to 64 KiB.
    pub struct ReaderStream<R> {
        #[pin]
        reader: R,
        buf: Box<[u8]>,
        done: bool,
    }
}

impl<R: AsyncRead> ReaderStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
            done: false,
        }
    }
}

impl<R: AsyncRead> Stream for ReaderStream<R> {
    type Item = io::Result<Vec<u8>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        loop {
            match task::ready!(this.reader.as_mut().poll_read(cx, this.buf)) {
                Ok(0) => {
                    *this.done = true;
                    return Poll::Ready(None);
                }
                Ok(n) => return Poll::Ready(Some(Ok(this.buf[..n].to_vec()))),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(err)));
                }
            }
        }
    }
}
