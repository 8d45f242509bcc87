//! Pack files: many blobs compressed into a single blob.
//!
//! Layout:
//!
//! ```text
//! "BSPK" | version u32 BE | count u32 BE
//! count x ( digest [32] | varint size | varint csize | crc32 u32 BE | zstd [csize] )
//! trailer [32]  (pack-domain BLAKE3 of everything before it)
//! ```
//!
//! `size` is the size claimed by the entry's ref, not necessarily the
//! length the payload decompresses to. Readers report what they find and
//! leave judging it to [`Blob::valid_contents`].

use bytes::Bytes;

use blobsweep_crypto::ContentHasher;
use blobsweep_types::BlobRef;

use crate::blob::Blob;
use crate::error::{StoreError, StoreResult};

const MAGIC: &[u8; 4] = b"BSPK";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 12;
const TRAILER_LEN: usize = 32;
const ZSTD_LEVEL: i32 = 3;

/// Accumulates blobs and encodes them as a pack.
#[derive(Debug, Default)]
pub struct PackWriter {
    entries: Vec<(BlobRef, Bytes)>,
}

impl PackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add bytes under their correct ref.
    pub fn add(&mut self, data: impl Into<Bytes>) -> BlobRef {
        let data = data.into();
        let blob_ref = ContentHasher::BLOB.blob_ref(&data);
        self.entries.push((blob_ref, data));
        blob_ref
    }

    /// Add bytes under an arbitrary ref, without checking that they match.
    pub fn add_unchecked(&mut self, blob_ref: BlobRef, data: impl Into<Bytes>) {
        self.entries.push((blob_ref, data.into()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode the pack.
    pub fn finish(self) -> StoreResult<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_be_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());

        for (blob_ref, data) in &self.entries {
            let compressed = zstd::encode_all(data.as_ref(), ZSTD_LEVEL)?;
            out.extend_from_slice(blob_ref.digest());
            encode_varint(&mut out, blob_ref.size());
            encode_varint(&mut out, compressed.len() as u64);
            out.extend_from_slice(&crc32fast::hash(&compressed).to_be_bytes());
            out.extend_from_slice(&compressed);
        }

        let trailer = ContentHasher::PACK.digest(&out);
        out.extend_from_slice(&trailer);
        Ok(out)
    }
}

/// Reads the blobs out of an encoded pack.
#[derive(Debug, Clone)]
pub struct PackReader {
    pack: BlobRef,
    data: Bytes,
    count: u32,
}

impl PackReader {
    /// Check the header and trailer of the pack stored as `pack`.
    pub fn from_bytes(pack: BlobRef, data: Bytes) -> StoreResult<Self> {
        let corrupt = |reason: &str| StoreError::CorruptPack {
            pack,
            reason: reason.to_string(),
        };

        if data.len() < HEADER_LEN + TRAILER_LEN {
            return Err(corrupt("too short"));
        }
        if &data[0..4] != MAGIC {
            return Err(corrupt("bad magic"));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != VERSION {
            return Err(corrupt(&format!("unsupported version {version}")));
        }
        let body_end = data.len() - TRAILER_LEN;
        if ContentHasher::PACK.digest(&data[..body_end]) != data[body_end..] {
            return Err(corrupt("checksum mismatch"));
        }
        let count = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        Ok(Self { pack, data, count })
    }

    /// The ref of the pack itself.
    pub fn pack_ref(&self) -> &BlobRef {
        &self.pack
    }

    /// Number of entries the header declares.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Iterate over the pack's blobs in stored order.
    ///
    /// A structural problem ends the iteration with an error. A single entry
    /// whose payload is damaged comes out as an unreadable blob instead.
    pub fn entries(&self) -> PackEntries<'_> {
        PackEntries {
            reader: self,
            pos: HEADER_LEN,
            remaining: self.count,
            done: false,
        }
    }
}

/// Iterator returned by [`PackReader::entries`].
pub struct PackEntries<'a> {
    reader: &'a PackReader,
    pos: usize,
    remaining: u32,
    done: bool,
}

impl<'a> PackEntries<'a> {
    fn body(&self) -> &[u8] {
        &self.reader.data[..self.reader.data.len() - TRAILER_LEN]
    }

    fn corrupt(&mut self, reason: impl Into<String>) -> StoreError {
        self.done = true;
        StoreError::CorruptPack {
            pack: self.reader.pack,
            reason: format!("{} at offset {}", reason.into(), self.pos),
        }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        if end > self.body().len() {
            return None;
        }
        let start = self.pos;
        self.pos = end;
        let reader: &'a PackReader = self.reader;
        Some(&reader.data[start..end])
    }

    fn varint(&mut self) -> Result<u64, &'static str> {
        let (value, used) = decode_varint(&self.body()[self.pos..])?;
        self.pos += used;
        Ok(value)
    }

    fn next_entry(&mut self) -> StoreResult<Blob> {
        let mut digest = [0u8; 32];
        match self.take(32) {
            Some(bytes) => digest.copy_from_slice(bytes),
            None => return Err(self.corrupt("truncated digest")),
        }
        let size = match self.varint() {
            Ok(v) => v,
            Err(reason) => return Err(self.corrupt(reason)),
        };
        let csize = match self.varint() {
            Ok(v) => v,
            Err(reason) => return Err(self.corrupt(reason)),
        };
        let crc = match self.take(4) {
            Some(b) => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            None => return Err(self.corrupt("truncated checksum")),
        };
        let compressed = match usize::try_from(csize) {
            Ok(n) => self.take(n),
            Err(_) => None,
        };
        let Some(compressed) = compressed else {
            return Err(self.corrupt("payload extends beyond pack"));
        };

        let blob_ref = BlobRef::new(digest, size);
        if crc32fast::hash(compressed) != crc {
            return Ok(Blob::unreadable(blob_ref, "pack entry checksum mismatch"));
        }
        match zstd::decode_all(compressed) {
            Ok(data) => Ok(Blob::new(blob_ref, data)),
            Err(e) => Ok(Blob::unreadable(blob_ref, format!("decompression failed: {e}"))),
        }
    }
}

impl Iterator for PackEntries<'_> {
    type Item = StoreResult<Blob>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.remaining == 0 {
            self.done = true;
            if self.pos != self.body().len() {
                return Some(Err(self.corrupt("trailing bytes after last entry")));
            }
            return None;
        }
        self.remaining -= 1;
        Some(self.next_entry())
    }
}

/// Encode a u64 as a LEB128 varint.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a LEB128 varint. Returns (value, bytes consumed).
pub(crate) fn decode_varint(data: &[u8]) -> Result<(u64, usize), &'static str> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 {
            return Err("varint overflow");
        }
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err("truncated varint")
}
