//! On-disk layout of a single cache entry.
//!
//! ```text
//! offset  size  field
//! 0       4     magic "CVAC"
//! 4       1     layout version
//! 5       3     reserved (zero)
//! 8       8     priority (i64 LE)
//! 16      8     write sequence (u64 LE)
//! 24      4     key length (u32 LE)
//! 28      n     key bytes
//! 28+n    ..    value bytes
//! ```
//!
//! Priority and write sequence live in the object itself so the eviction index
//! can be rebuilt by scanning the store on open.

use bytes::{Bytes, BytesMut};
use object_store::path::Path;

use crate::{CacheError, CacheResult};

const MAGIC: &[u8; 4] = b"CVAC";
const LAYOUT_VERSION: u8 = 1;
pub(crate) const HEADER_LEN: usize = 28;

/// Prefix under which all entries are stored.
pub(crate) const ENTRY_PREFIX: &str = "entries";

/// Key bytes per path segment; longer keys span nested directories.
const SEGMENT_KEY_BYTES: usize = 64;

/// Eviction metadata carried alongside each entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryMeta {
    pub priority: i64,
    pub seq: u64,
}

/// Decoded entry object.
#[derive(Debug)]
pub(crate) struct StoredEntry {
    pub meta: EntryMeta,
    pub key: Vec<u8>,
    pub value: Bytes,
}

/// Serialize an entry for the backing store.
pub(crate) fn encode_entry(key: &[u8], value: &[u8], meta: EntryMeta) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + key.len() + value.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&[LAYOUT_VERSION, 0, 0, 0]);
    buf.extend_from_slice(&meta.priority.to_le_bytes());
    buf.extend_from_slice(&meta.seq.to_le_bytes());
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    buf.freeze()
}

/// Parse the fixed header, returning metadata and key length.
pub(crate) fn decode_header(bytes: &[u8]) -> CacheResult<(EntryMeta, usize)> {
    if bytes.len() < HEADER_LEN {
        return Err(CacheError::corrupt(format!(
            "object is {} bytes, shorter than header",
            bytes.len()
        )));
    }
    if &bytes[0..4] != MAGIC {
        return Err(CacheError::corrupt("bad magic"));
    }
    if bytes[4] != LAYOUT_VERSION {
        return Err(CacheError::corrupt(format!(
            "unsupported layout version {}",
            bytes[4]
        )));
    }

    let priority = i64::from_le_bytes(read_array(&bytes[8..16]));
    let seq = u64::from_le_bytes(read_array(&bytes[16..24]));
    let key_len = u32::from_le_bytes(read_array(&bytes[24..28])) as usize;

    Ok((EntryMeta { priority, seq }, key_len))
}

/// Parse a complete entry object.
pub(crate) fn decode_entry(bytes: Bytes) -> CacheResult<StoredEntry> {
    let (meta, key_len) = decode_header(&bytes)?;
    let key_end = HEADER_LEN + key_len;
    if bytes.len() < key_end {
        return Err(CacheError::corrupt(format!(
            "key length {} exceeds object size {}",
            key_len,
            bytes.len()
        )));
    }

    Ok(StoredEntry {
        meta,
        key: bytes[HEADER_LEN..key_end].to_vec(),
        value: bytes.slice(key_end..),
    })
}

/// Deterministic object path for a key.
///
/// The whole key is hex-encoded, so distinct keys never share an object.
/// Keys longer than one segment are split into directories named `<hex>.d`,
/// which keeps every segment short and never clashes with a leaf name.
pub(crate) fn object_path(key: &[u8]) -> Path {
    let mut name = String::with_capacity(ENTRY_PREFIX.len() + key.len() * 2 + 8);
    name.push_str(ENTRY_PREFIX);
    let mut chunks = key.chunks(SEGMENT_KEY_BYTES).peekable();
    if chunks.peek().is_none() {
        name.push_str("/_");
    }
    while let Some(chunk) = chunks.next() {
        name.push('/');
        name.push_str(&hex(chunk));
        if chunks.peek().is_some() {
            name.push_str(".d");
        }
    }
    Path::from(name)
}

fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    if s.is_empty() {
        s.push('_');
    }
    s
}

fn read_array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}
