//! Mapping of arbitrary paths onto the ustar `prefix`/`name` fields.

/// Width of the `name` field.
pub const NAME_LEN: usize = 100;
/// Width of the `prefix` field.
pub const PREFIX_LEN: usize = 155;

const MAX_NAME_LEN: usize = NAME_LEN - 1;
const MAX_PREFIX_LEN: usize = PREFIX_LEN - 1;

const PATH_CUT_MARKER: &[u8] = b"@PathCut/_pc_root/";

/// A path split into the two legacy header fields.
///
/// Readers rebuild the path as `prefix + "/" + name` when `prefix` is not
/// empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPath<'a> {
    pub prefix: &'a str,
    pub name: &'a str,
}

/// Split `path` so that it fits the `prefix` and `name` fields.
///
/// Paths of at most 99 bytes are kept whole in `name`. Longer paths are cut
/// at the leftmost `/` leaving at most 154 bytes of prefix and 99 bytes of
/// name. `None` means no such cut exists and the path has to travel in a PAX
/// `path` record.
pub fn split_path(path: &str) -> Option<SplitPath<'_>> {
    let bytes = path.as_bytes();
    if bytes.len() <= MAX_NAME_LEN {
        return Some(SplitPath { prefix: "", name: path });
    }
    for (pos, _) in bytes.iter().enumerate().filter(|(_, b)| **b == b'/') {
        if pos > MAX_PREFIX_LEN {
            break;
        }
        if bytes.len() - pos - 1 <= MAX_NAME_LEN {
            // a cut at '/' always lands on a char boundary
            return Some(SplitPath {
                prefix: &path[..pos],
                name: &path[pos + 1..],
            });
        }
    }
    None
}

/// Legacy `name` for entries whose real path only lives in a PAX record.
///
/// PAX-unaware readers see `@PathCut/_pc_root/` followed by as much of the
/// path as fits in 99 bytes.
pub fn path_cut_name(path: &str) -> Vec<u8> {
    let keep = path.len().min(MAX_NAME_LEN - PATH_CUT_MARKER.len());
    let mut name = Vec::with_capacity(PATH_CUT_MARKER.len() + keep);
    name.extend_from_slice(PATH_CUT_MARKER);
    name.extend_from_slice(&path.as_bytes()[..keep]);
    name
}
