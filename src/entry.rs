//! Archive entries: what the caller describes and what gets streamed.
use {
    crate::{
        error::{Error, Result},
        header::{resolve, EntryType, HeaderBlock},
        pax::{encode_records, PaxExtendedHeader},
        stream::{BufferChunks, ByteStream, Concat, PaddedContent, ReaderStream},
    },
    futures::{stream, TryStreamExt},
    futures_lite::{io::AsyncRead, Stream},
    std::{
        fmt,
        future::Future,
        io,
        time::{SystemTime, UNIX_EPOCH},
    },
};

const PAX_HEADER_NAME: &str = "PaxHeader/@PaxHeader";

/// Body of an entry.
pub enum Content<'a> {
    Empty,
    Buffer(Vec<u8>),
    /// Content produced lazily, in chunks of any size.
    Stream(ByteStream<'a>),
}

impl<'a> Content<'a> {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Vec<u8>>> + Send + 'a,
    {
        Self::Stream(Box::pin(stream))
    }
    /// Read the content from `reader` once the archive gets to it.
    pub fn from_reader<R: AsyncRead + Send + 'a>(reader: R) -> Self {
        Self::from_stream(ReaderStream::new(reader))
    }
    /// Like [`Content::from_reader`], but the reader itself is only created
    /// by `open` once the archive gets to this entry.
    pub fn open_with<F, Fut, R>(open: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = io::Result<R>> + Send + 'a,
        R: AsyncRead + Send + 'a,
    {
        Self::from_stream(
            stream::once(async move { open().await.map(ReaderStream::new) }).try_flatten(),
        )
    }
}

impl From<Vec<u8>> for Content<'_> {
    fn from(buf: Vec<u8>) -> Self {
        Self::Buffer(buf)
    }
}

impl From<&[u8]> for Content<'_> {
    fn from(buf: &[u8]) -> Self {
        Self::Buffer(buf.to_vec())
    }
}

impl From<&str> for Content<'_> {
    fn from(s: &str) -> Self {
        Self::Buffer(s.as_bytes().to_vec())
    }
}

impl fmt::Debug for Content<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Buffer(buf) => write!(f, "Buffer({} bytes)", buf.len()),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Caller-side description of one archive member.
///
/// Defaults: mode `0o777`, uid/gid 0, size 0, mtime 0, regular file, no
/// content.
#[derive(Debug)]
pub struct EntryDescriptor<'a> {
    name: String,
    mode: u32,
    uid: u32,
    gid: u32,
    size: u64,
    mtime: u64,
    kind: EntryType,
    link_name: Option<String>,
    uname: Option<String>,
    gname: Option<String>,
    dev_major: Option<String>,
    dev_minor: Option<String>,
    content: Content<'a>,
}

impl<'a> EntryDescriptor<'a> {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            mode: 0o777,
            uid: 0,
            gid: 0,
            size: 0,
            mtime: 0,
            kind: EntryType::Regular,
            link_name: None,
            uname: None,
            gname: None,
            dev_major: None,
            dev_minor: None,
            content: Content::Empty,
        }
    }
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = uid;
        self
    }
    pub fn with_gid(mut self, gid: u32) -> Self {
        self.gid = gid;
        self
    }
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }
    /// Modification time in seconds since the epoch.
    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }
    /// Modification time rounded to the nearest second; earlier than the
    /// epoch counts as the epoch.
    pub fn with_modified(self, modified: SystemTime) -> Self {
        let mtime = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() + u64::from(d.subsec_millis() >= 500))
            .unwrap_or(0);
        self.with_mtime(mtime)
    }
    pub fn with_entry_type(mut self, kind: EntryType) -> Self {
        self.kind = kind;
        self
    }
    pub fn with_link_name<S: Into<String>>(mut self, link: S) -> Self {
        self.link_name = Some(link.into());
        self
    }
    pub fn with_uname<S: Into<String>>(mut self, uname: S) -> Self {
        self.uname = Some(uname.into());
        self
    }
    pub fn with_gname<S: Into<String>>(mut self, gname: S) -> Self {
        self.gname = Some(gname.into());
        self
    }
    pub fn with_dev_major<S: Into<String>>(mut self, major: S) -> Self {
        self.dev_major = Some(major.into());
        self
    }
    pub fn with_dev_minor<S: Into<String>>(mut self, minor: S) -> Self {
        self.dev_minor = Some(minor.into());
        self
    }
    /// Attach the entry body. Buffered content also sets the size to its
    /// length; streamed content needs an explicit [`with_size`](Self::with_size).
    pub fn with_content<C: Into<Content<'a>>>(mut self, content: C) -> Self {
        self.content = content.into();
        if let Content::Buffer(buf) = &self.content {
            self.size = buf.len() as u64;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn mode(&self) -> u32 {
        self.mode
    }
    pub fn uid(&self) -> u32 {
        self.uid
    }
    pub fn gid(&self) -> u32 {
        self.gid
    }
    pub fn size(&self) -> u64 {
        self.size
    }
    pub fn mtime(&self) -> u64 {
        self.mtime
    }
    pub fn entry_type(&self) -> EntryType {
        self.kind
    }
    pub fn link_name(&self) -> Option<&str> {
        self.link_name.as_deref()
    }
    pub fn uname(&self) -> Option<&str> {
        self.uname.as_deref()
    }
    pub fn gname(&self) -> Option<&str> {
        self.gname.as_deref()
    }
    pub fn dev_major(&self) -> Option<&str> {
        self.dev_major.as_deref()
    }
    pub fn dev_minor(&self) -> Option<&str> {
        self.dev_minor.as_deref()
    }
}

/// A resolved header together with its content producer.
pub struct PlainEntry<'a> {
    header: HeaderBlock,
    content: ByteStream<'a>,
}

impl<'a> PlainEntry<'a> {
    /// Resolve `entry`; the PAX records it needs are returned alongside.
    fn resolve(entry: EntryDescriptor<'a>) -> Result<(Self, Vec<PaxExtendedHeader>)> {
        let (header, extensions) = resolve(&entry)?;
        let size = entry.size;
        let content: ByteStream<'a> = match entry.content {
            Content::Empty if size == 0 => Box::pin(BufferChunks::new(Vec::new())),
            Content::Empty => {
                return Err(Error::SizeMismatch {
                    name: entry.name,
                    declared: size,
                    actual: 0,
                })
            }
            Content::Buffer(buf) if buf.len() as u64 == size => Box::pin(BufferChunks::new(buf)),
            Content::Buffer(buf) => {
                return Err(Error::SizeMismatch {
                    name: entry.name,
                    declared: size,
                    actual: buf.len() as u64,
                })
            }
            Content::Stream(stream) => Box::pin(PaddedContent::new(stream, size)),
        };
        Ok((Self { header, content }, extensions))
    }
    pub fn header(&self) -> &HeaderBlock {
        &self.header
    }
    fn into_stream(self) -> Concat<'a> {
        Concat::new(
            Box::pin(BufferChunks::new(self.header.as_bytes().to_vec())),
            self.content,
        )
    }
}

impl fmt::Debug for PlainEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainEntry")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

/// An entry ready to be streamed.
///
/// Entries whose values overflow the ustar fields carry a PAX extended header
/// entry in front of them. That extension is always a [`PlainEntry`], so
/// nesting never goes deeper than one level.
#[derive(Debug)]
pub enum ComposedEntry<'a> {
    Plain(PlainEntry<'a>),
    Extended {
        records: Vec<PaxExtendedHeader>,
        extension: PlainEntry<'static>,
        entry: PlainEntry<'a>,
    },
}

impl<'a> ComposedEntry<'a> {
    pub fn new(entry: EntryDescriptor<'a>) -> Result<Self> {
        let (entry, records) = PlainEntry::resolve(entry)?;
        if records.is_empty() {
            return Ok(Self::Plain(entry));
        }
        let data = encode_records(&records);
        tracing::trace!(
            target: "tar",
            "PAX extension for {:?}: {} records, {} bytes",
            String::from_utf8_lossy(&entry.header.path()),
            records.len(),
            data.len()
        );
        let (extension, nested) = PlainEntry::resolve(
            EntryDescriptor::new(PAX_HEADER_NAME)
                .with_entry_type(EntryType::PaxLocal)
                .with_content(data),
        )?;
        debug_assert!(nested.is_empty(), "PAX header entry needs no extension");
        Ok(Self::Extended {
            records,
            extension,
            entry,
        })
    }
    /// Header of the entry itself.
    pub fn header(&self) -> &HeaderBlock {
        match self {
            Self::Plain(entry) | Self::Extended { entry, .. } => entry.header(),
        }
    }
    /// Header of the PAX extension entry, if any.
    pub fn extension_header(&self) -> Option<&HeaderBlock> {
        match self {
            Self::Plain(_) => None,
            Self::Extended { extension, .. } => Some(extension.header()),
        }
    }
    pub fn records(&self) -> &[PaxExtendedHeader] {
        match self {
            Self::Plain(_) => &[],
            Self::Extended { records, .. } => records.as_slice(),
        }
    }
    /// Extension (if any), header and padded content, in that order.
    pub fn into_stream(self) -> Concat<'a> {
        match self {
            Self::Plain(entry) => entry.into_stream(),
            Self::Extended {
                extension, entry, ..
            } => Concat::new(Box::pin(extension.into_stream()), Box::pin(entry.into_stream())),
        }
    }
}
