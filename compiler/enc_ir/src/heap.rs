//! Metadata heaps: `#Strings`, `#Blob`, `#US`, `#GUID`.
//!
//! # Generations
//!
//! Heap offsets are aggregate across a generation chain. A heap built for
//! generation N starts at `base` (the combined size of all earlier
//! generations' heaps) and its local buffer begins with the empty item, so
//! every non-empty value gets an offset `> base` and the empty value is
//! always offset 0. Values are deduplicated within one heap only; values
//! written by earlier generations are never re-imported.

use rustc_hash::FxHashMap;

use crate::codec::{write_compressed_u32, ByteReader};
use crate::{BlobId, GuidId, ImageError, StringId, UserStringId};

/// Aggregate heap sizes (bytes, or entries for `#GUID`) through a generation.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Default, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct HeapSizes {
    pub strings: u32,
    pub blobs: u32,
    pub user_strings: u32,
    pub guids: u32,
}

/// Convert a buffer position to a heap offset.
fn offset_of(base: u32, local: usize, heap: &'static str) -> Result<u32, ImageError> {
    u32::try_from(local)
        .ok()
        .and_then(|local| base.checked_add(local))
        .ok_or(ImageError::HeapOffsetOutOfRange {
            heap,
            offset: u32::MAX,
        })
}

/// Translate an aggregate offset to a position in this heap's buffer.
fn local_of(base: u32, offset: u32, len: usize, heap: &'static str) -> Result<usize, ImageError> {
    let local = offset
        .checked_sub(base)
        .map(|l| l as usize)
        .filter(|&l| l < len)
        .ok_or(ImageError::HeapOffsetOutOfRange { heap, offset })?;
    Ok(local)
}

/// `#Strings`: zero-terminated UTF-8.
#[derive(Clone, Debug)]
pub struct StringHeap {
    base: u32,
    data: Vec<u8>,
    dedup: FxHashMap<String, StringId>,
}

impl StringHeap {
    pub fn new(base: u32) -> Self {
        StringHeap {
            base,
            data: vec![0],
            dedup: FxHashMap::default(),
        }
    }

    /// Wrap bytes read from an image. Read-only views never deduplicate
    /// against later additions.
    pub fn from_bytes(base: u32, data: Vec<u8>) -> Self {
        StringHeap {
            base,
            data,
            dedup: FxHashMap::default(),
        }
    }

    pub fn add(&mut self, value: &str) -> Result<StringId, ImageError> {
        if value.is_empty() {
            return Ok(StringId::EMPTY);
        }
        if let Some(&id) = self.dedup.get(value) {
            return Ok(id);
        }
        let id = StringId::new(offset_of(self.base, self.data.len(), "#Strings")?);
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.dedup.insert(value.to_owned(), id);
        Ok(id)
    }

    pub fn get(&self, id: StringId) -> Result<&str, ImageError> {
        if id.is_empty() {
            return Ok("");
        }
        let start = local_of(self.base, id.offset(), self.data.len(), "#Strings")?;
        let end = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .map_or(self.data.len(), |n| start + n);
        std::str::from_utf8(&self.data[start..end]).map_err(|_| ImageError::InvalidUtf8(id.offset()))
    }

    #[inline]
    pub fn base(&self) -> u32 {
        self.base
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Aggregate size after this heap.
    #[inline]
    pub fn end(&self) -> u32 {
        offset_of(self.base, self.data.len(), "#Strings").unwrap_or(u32::MAX)
    }
}

/// `#Blob`: compressed length prefix followed by the bytes.
#[derive(Clone, Debug)]
pub struct BlobHeap {
    base: u32,
    data: Vec<u8>,
    dedup: FxHashMap<Vec<u8>, BlobId>,
}

impl BlobHeap {
    pub fn new(base: u32) -> Self {
        BlobHeap {
            base,
            data: vec![0],
            dedup: FxHashMap::default(),
        }
    }

    pub fn from_bytes(base: u32, data: Vec<u8>) -> Self {
        BlobHeap {
            base,
            data,
            dedup: FxHashMap::default(),
        }
    }

    pub fn add(&mut self, value: &[u8]) -> Result<BlobId, ImageError> {
        if value.is_empty() {
            return Ok(BlobId::EMPTY);
        }
        if let Some(&id) = self.dedup.get(value) {
            return Ok(id);
        }
        let id = BlobId::new(offset_of(self.base, self.data.len(), "#Blob")?);
        let len = u32::try_from(value.len()).map_err(|_| ImageError::CompressedOverflow(u32::MAX))?;
        write_compressed_u32(&mut self.data, len)?;
        self.data.extend_from_slice(value);
        self.dedup.insert(value.to_vec(), id);
        Ok(id)
    }

    pub fn get(&self, id: BlobId) -> Result<&[u8], ImageError> {
        if id.is_empty() {
            return Ok(&[]);
        }
        let start = local_of(self.base, id.offset(), self.data.len(), "#Blob")?;
        let mut reader = ByteReader::new(&self.data[start..]);
        let len = reader.read_compressed_u32()? as usize;
        reader.read_bytes(len)
    }

    #[inline]
    pub fn base(&self) -> u32 {
        self.base
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn end(&self) -> u32 {
        offset_of(self.base, self.data.len(), "#Blob").unwrap_or(u32::MAX)
    }
}

/// `#US`: compressed length, UTF-16LE code units, then a one-byte flag
/// that is set when any code unit needs more than 8 bits.
#[derive(Clone, Debug)]
pub struct UserStringHeap {
    base: u32,
    data: Vec<u8>,
    dedup: FxHashMap<String, UserStringId>,
}

impl UserStringHeap {
    pub fn new(base: u32) -> Self {
        UserStringHeap {
            base,
            data: vec![0],
            dedup: FxHashMap::default(),
        }
    }

    pub fn from_bytes(base: u32, data: Vec<u8>) -> Self {
        UserStringHeap {
            base,
            data,
            dedup: FxHashMap::default(),
        }
    }

    pub fn add(&mut self, value: &str) -> Result<UserStringId, ImageError> {
        if let Some(&id) = self.dedup.get(value) {
            return Ok(id);
        }
        let id = UserStringId::new(offset_of(self.base, self.data.len(), "#US")?);
        let units: Vec<u16> = value.encode_utf16().collect();
        let byte_len = u32::try_from(units.len() * 2 + 1)
            .map_err(|_| ImageError::CompressedOverflow(u32::MAX))?;
        write_compressed_u32(&mut self.data, byte_len)?;
        for unit in &units {
            self.data.extend_from_slice(&unit.to_le_bytes());
        }
        self.data.push(u8::from(units.iter().any(|&u| u > 0xFF)));
        self.dedup.insert(value.to_owned(), id);
        Ok(id)
    }

    pub fn get(&self, id: UserStringId) -> Result<String, ImageError> {
        let start = local_of(self.base, id.offset(), self.data.len(), "#US")?;
        let mut reader = ByteReader::new(&self.data[start..]);
        let len = reader.read_compressed_u32()? as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let bytes = reader.read_bytes(len)?;
        let units: Vec<u16> = bytes[..len - 1]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16(&units).map_err(|_| ImageError::InvalidUtf8(id.offset()))
    }

    #[inline]
    pub fn base(&self) -> u32 {
        self.base
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn end(&self) -> u32 {
        offset_of(self.base, self.data.len(), "#US").unwrap_or(u32::MAX)
    }
}

/// `#GUID`: 16-byte entries, indexed from 1.
#[derive(Clone, Debug)]
pub struct GuidHeap {
    base: u32,
    entries: Vec<[u8; 16]>,
}

impl GuidHeap {
    pub fn new(base: u32) -> Self {
        GuidHeap {
            base,
            entries: Vec::new(),
        }
    }

    pub fn from_bytes(base: u32, data: &[u8]) -> Self {
        let entries = data
            .chunks_exact(16)
            .map(|c| {
                let mut guid = [0u8; 16];
                guid.copy_from_slice(c);
                guid
            })
            .collect();
        GuidHeap { base, entries }
    }

    /// GUIDs are never deduplicated: each generation writes its own ids.
    pub fn add(&mut self, guid: [u8; 16]) -> Result<GuidId, ImageError> {
        self.entries.push(guid);
        Ok(GuidId::new(offset_of(self.base, self.entries.len(), "#GUID")?))
    }

    pub fn get(&self, id: GuidId) -> Result<[u8; 16], ImageError> {
        if id.is_empty() {
            return Ok([0; 16]);
        }
        let local = local_of(self.base + 1, id.offset(), self.entries.len(), "#GUID")?;
        Ok(self.entries[local])
    }

    #[inline]
    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.entries.iter().flatten().copied().collect()
    }

    #[inline]
    pub fn end(&self) -> u32 {
        offset_of(self.base, self.entries.len(), "#GUID").unwrap_or(u32::MAX)
    }
}

/// The four heaps of one image.
#[derive(Clone, Debug)]
pub struct Heaps {
    pub strings: StringHeap,
    pub blobs: BlobHeap,
    pub user_strings: UserStringHeap,
    pub guids: GuidHeap,
}

impl Heaps {
    /// Empty heaps continuing after `previous`.
    pub fn new(previous: HeapSizes) -> Self {
        Heaps {
            strings: StringHeap::new(previous.strings),
            blobs: BlobHeap::new(previous.blobs),
            user_strings: UserStringHeap::new(previous.user_strings),
            guids: GuidHeap::new(previous.guids),
        }
    }

    /// Aggregate sizes through these heaps.
    pub fn sizes(&self) -> HeapSizes {
        HeapSizes {
            strings: self.strings.end(),
            blobs: self.blobs.end(),
            user_strings: self.user_strings.end(),
            guids: self.guids.end(),
        }
    }

    /// Sizes these heaps continue from.
    pub fn bases(&self) -> HeapSizes {
        HeapSizes {
            strings: self.strings.base(),
            blobs: self.blobs.base(),
            user_strings: self.user_strings.base(),
            guids: self.guids.base(),
        }
    }
}

#[cfg(test)]
mod tests;
