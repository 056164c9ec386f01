//! The 512-byte ustar header block.
//!
//! [`resolve`] is a pure function from an [`EntryDescriptor`] to a finished
//! [`HeaderBlock`] plus the PAX records needed for the values the legacy
//! fields cannot carry.
use {
    crate::{
        entry::EntryDescriptor,
        error::{Error, Result},
        octal::{format_octal, parse_octal},
        pax::PaxExtendedHeader,
        path::{path_cut_name, split_path, SplitPath, NAME_LEN, PREFIX_LEN},
        stream::BLOCK_SIZE,
    },
    std::fmt,
};

const MAGIC: [u8; 6] = *b"ustar\0";
const VERSION: [u8; 2] = *b"00";

/// Value of the `typeflag` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryType {
    Regular = b'0',
    Link = b'1',
    Symlink = b'2',
    CharDevice = b'3',
    BlockDevice = b'4',
    Directory = b'5',
    Fifo = b'6',
    Contiguous = b'7',
    PaxLocal = b'x',
    PaxGlobal = b'g',
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Regular | Self::Contiguous => "regular file",
            Self::Link => "link",
            Self::Symlink => "symlink",
            Self::CharDevice => "character device",
            Self::BlockDevice => "block device",
            Self::Directory => "directory",
            Self::Fifo => "FIFO",
            Self::PaxLocal => "PAX next file extension",
            Self::PaxGlobal => "PAX global extension",
        })
    }
}

impl EntryType {
    pub fn byte(self) -> u8 {
        self as u8
    }
    /// Decode a `typeflag` byte; pre-POSIX archives use NUL for regular files.
    pub fn from_byte(b: u8) -> std::result::Result<Self, u8> {
        match b {
            b'\0' => Ok(Self::Regular),
            v if v == Self::Regular.byte() => Ok(Self::Regular),
            v if v == Self::Link.byte() => Ok(Self::Link),
            v if v == Self::Symlink.byte() => Ok(Self::Symlink),
            v if v == Self::CharDevice.byte() => Ok(Self::CharDevice),
            v if v == Self::BlockDevice.byte() => Ok(Self::BlockDevice),
            v if v == Self::Directory.byte() => Ok(Self::Directory),
            v if v == Self::Fifo.byte() => Ok(Self::Fifo),
            v if v == Self::Contiguous.byte() => Ok(Self::Contiguous),
            v if v == Self::PaxLocal.byte() => Ok(Self::PaxLocal),
            v if v == Self::PaxGlobal.byte() => Ok(Self::PaxGlobal),
            v => Err(v),
        }
    }
}

#[repr(C)]
#[allow(missing_docs)]
struct UstarHeader {
    name: [u8; NAME_LEN],
    mode: [u8; 8],
    uid: [u8; 8],
    gid: [u8; 8],
    size: [u8; 12],
    mtime: [u8; 12],
    cksum: [u8; 8],
    typeflag: [u8; 1],
    linkname: [u8; NAME_LEN],
    magic: [u8; 6],
    version: [u8; 2],
    uname: [u8; 32],
    gname: [u8; 32],
    dev_major: [u8; 8],
    dev_minor: [u8; 8],
    prefix: [u8; PREFIX_LEN],
    #[allow(dead_code)]
    pad: [u8; 12],
}

impl UstarHeader {
    fn set_mode(&mut self, mode: u32) {
        format_octal(mode as u64, &mut self.mode);
    }
    fn set_uid(&mut self, uid: u32) {
        format_octal(uid as u64, &mut self.uid);
    }
    fn set_gid(&mut self, gid: u32) {
        format_octal(gid as u64, &mut self.gid);
    }
    /// Returns `false` when the size had to be truncated.
    fn set_size(&mut self, size: u64) -> bool {
        format_octal(size, &mut self.size)
    }
    fn set_mtime(&mut self, mtime: u64) -> bool {
        format_octal(mtime, &mut self.mtime)
    }
    fn set_typeflag(&mut self, kind: EntryType) {
        self.typeflag[0] = kind.byte();
    }
    fn set_path(&mut self, path: SplitPath<'_>) {
        self.prefix[..path.prefix.len()].copy_from_slice(path.prefix.as_bytes());
        self.name[..path.name.len()].copy_from_slice(path.name.as_bytes());
    }
    fn set_name_bytes(&mut self, name: &[u8]) {
        copy_truncated(&mut self.name, name, NAME_LEN - 1);
    }
    fn set_link_path(&mut self, name: &str) {
        copy_truncated(&mut self.linkname, name.as_bytes(), NAME_LEN - 1);
    }
    fn set_uname(&mut self, name: &str) {
        copy_truncated(&mut self.uname, name.as_bytes(), 31);
    }
    fn set_gname(&mut self, name: &str) {
        copy_truncated(&mut self.gname, name.as_bytes(), 31);
    }
    fn set_dev_major(&mut self, major: &str) {
        copy_truncated(&mut self.dev_major, major.as_bytes(), 7);
    }
    fn set_dev_minor(&mut self, minor: &str) {
        copy_truncated(&mut self.dev_minor, minor.as_bytes(), 7);
    }
}

fn copy_truncated(field: &mut [u8], bytes: &[u8], max: usize) {
    let n = bytes.len().min(max).min(field.len());
    field[..n].copy_from_slice(&bytes[..n]);
}

fn null_terminated(bytes: &[u8]) -> &[u8] {
    &bytes[..bytes
        .iter()
        .position(|b| *b == b'\0')
        .unwrap_or(bytes.len())]
}

/// A complete 512-byte ustar header.
#[derive(Clone, PartialEq, Eq)]
pub struct HeaderBlock {
    record: [u8; BLOCK_SIZE],
}

impl HeaderBlock {
    fn new() -> Self {
        let mut block = Self {
            record: [0u8; BLOCK_SIZE],
        };
        let hdr = block.fields_mut();
        hdr.magic = MAGIC;
        hdr.version = VERSION;
        block
    }
    fn fields(&self) -> &UstarHeader {
        // SAFETY: UstarHeader is repr(C), consists of byte arrays only and
        // has the size of the record, so any 512 bytes are a valid value
        unsafe { &*(self.record.as_ptr() as *const UstarHeader) }
    }
    fn fields_mut(&mut self) -> &mut UstarHeader {
        // SAFETY: see `fields`
        unsafe { &mut *(self.record.as_mut_ptr() as *mut UstarHeader) }
    }
    fn finalize(&mut self) {
        self.fields_mut().cksum.fill(b' ');
        let checksum = self.compute_checksum();
        let cksum = &mut self.fields_mut().cksum;
        format_octal(checksum as u64, &mut cksum[..7]);
        cksum[7] = b' ';
    }

    /// Wrap a block read back from an archive.
    pub fn from_bytes(record: [u8; BLOCK_SIZE]) -> Self {
        Self { record }
    }
    pub fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.record
    }
    pub fn is_ustar(&self) -> bool {
        let hdr = self.fields();
        hdr.magic == MAGIC && hdr.version == VERSION
    }
    pub fn name(&self) -> &[u8] {
        null_terminated(&self.fields().name)
    }
    pub fn prefix(&self) -> &[u8] {
        null_terminated(&self.fields().prefix)
    }
    /// The legacy path, `prefix/name` or just `name`.
    pub fn path(&self) -> Vec<u8> {
        let (prefix, name) = (self.prefix(), self.name());
        if prefix.is_empty() {
            return name.to_vec();
        }
        let mut path = Vec::with_capacity(prefix.len() + 1 + name.len());
        path.extend_from_slice(prefix);
        path.push(b'/');
        path.extend_from_slice(name);
        path
    }
    pub fn mode(&self) -> Option<u32> {
        parse_octal(&self.fields().mode).ok().map(|m| m as u32)
    }
    pub fn uid(&self) -> Option<u32> {
        parse_octal(&self.fields().uid).ok().map(|u| u as u32)
    }
    pub fn gid(&self) -> Option<u32> {
        parse_octal(&self.fields().gid).ok().map(|g| g as u32)
    }
    /// Size as stored in the legacy field, possibly truncated.
    pub fn size(&self) -> Option<u64> {
        parse_octal(&self.fields().size).ok()
    }
    pub fn mtime(&self) -> Option<u64> {
        parse_octal(&self.fields().mtime).ok()
    }
    pub fn entry_type(&self) -> std::result::Result<EntryType, u8> {
        EntryType::from_byte(self.fields().typeflag[0])
    }
    pub fn link_name(&self) -> &[u8] {
        null_terminated(&self.fields().linkname)
    }
    pub fn uname(&self) -> &[u8] {
        null_terminated(&self.fields().uname)
    }
    pub fn gname(&self) -> &[u8] {
        null_terminated(&self.fields().gname)
    }
    pub fn dev_major(&self) -> &[u8] {
        null_terminated(&self.fields().dev_major)
    }
    pub fn dev_minor(&self) -> &[u8] {
        null_terminated(&self.fields().dev_minor)
    }
    /// Checksum stored in the `chksum` field.
    pub fn checksum(&self) -> Option<u32> {
        parse_octal(&self.fields().cksum).ok().map(|c| c as u32)
    }
    /// Sum of all bytes with the `chksum` field counted as eight spaces.
    pub fn compute_checksum(&self) -> u32 {
        let cksum = 148..156;
        self.record
            .iter()
            .enumerate()
            .map(|(i, b)| u32::from(if cksum.contains(&i) { b' ' } else { *b }))
            .sum()
    }
}

impl fmt::Debug for HeaderBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderBlock")
            .field("path", &String::from_utf8_lossy(&self.path()))
            .field("typeflag", &self.entry_type())
            .field("mode", &self.mode())
            .field("size", &self.size())
            .field("mtime", &self.mtime())
            .field("checksum", &self.checksum())
            .finish()
    }
}

/// Lay out the header of `entry`.
///
/// Returns the finished block and, in `path`, `size` order, the PAX records
/// for values the legacy fields had to truncate. An empty record list means
/// the header stands on its own.
pub fn resolve(entry: &EntryDescriptor<'_>) -> Result<(HeaderBlock, Vec<PaxExtendedHeader>)> {
    let name = entry.name();
    if name.is_empty() {
        return Err(Error::EmptyName);
    }
    if name.ends_with('/') {
        return Err(Error::DirectoryName(name.to_string()));
    }

    let mut extensions = Vec::new();
    let mut block = HeaderBlock::new();
    let header = block.fields_mut();

    let split = split_path(name);
    tracing::trace!(
        target: "tar",
        "resolve: name={} split={:?} size={}",
        name,
        split,
        entry.size()
    );
    match split {
        Some(split) => header.set_path(split),
        None => {
            tracing::debug!(target: "tar", "path {:?} does not fit ustar fields, using PAX path", name);
            extensions.push(PaxExtendedHeader::path(name));
            header.set_name_bytes(&path_cut_name(name));
        }
    }

    header.set_mode(entry.mode());
    header.set_uid(entry.uid());
    header.set_gid(entry.gid());
    if !header.set_size(entry.size()) {
        tracing::debug!(target: "tar", "size {} of {:?} exceeds ustar field, using PAX size", entry.size(), name);
        extensions.push(PaxExtendedHeader::size(entry.size()));
    }
    if !header.set_mtime(entry.mtime()) {
        tracing::trace!(target: "tar", "mtime {} of {:?} truncated", entry.mtime(), name);
    }
    header.set_typeflag(entry.entry_type());
    if let Some(link) = entry.link_name() {
        header.set_link_path(link);
    }
    if let Some(uname) = entry.uname() {
        header.set_uname(uname);
    }
    if let Some(gname) = entry.gname() {
        header.set_gname(gname);
    }
    if let Some(major) = entry.dev_major() {
        header.set_dev_major(major);
    }
    if let Some(minor) = entry.dev_minor() {
        header.set_dev_minor(minor);
    }
    block.finalize();
    Ok((block, extensions))
}
