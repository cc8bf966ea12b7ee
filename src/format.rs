//! On-disk binary layout: file header, chunk header, tags, chunk_meta bit
//! packing. All numeric fields are little-endian.
//!
//! # File header (64 bytes)
//!
//! ```text
//! Offset  Size  Field
//!    0      4   magic          = b"JLS1"
//!    4      4   format_version (LE u32)
//!    8     52   reserved, zero
//!   60      4   header_crc32   CRC32([0..60])  ← LAST (LE u32)
//! ```
//!
//! # Chunk header (36 bytes)
//!
//! ```text
//! Offset  Size  Field
//!    0      8   item_next            file offset, 0 until patched   (LE u64)
//!    8      8   item_prev            file offset, 0 if first        (LE u64)
//!   16      1   tag                  chunk kind
//!   17      1   rsv0_u8              reserved, zero
//!   18      2   chunk_meta           tag-dependent                  (LE u16)
//!   20      4   payload_length                                     (LE u32)
//!   24      4   payload_prev_length  physically preceding payload   (LE u32)
//!   28      4   header_crc32         CRC32([0..28])                 (LE u32)
//!   32      4   payload_crc32        CRC32(payload)                 (LE u32)
//! ```
//!
//! `header_crc32` lets a reader reject a torn/corrupt header before it ever
//! trusts `payload_length` enough to size a read. `payload_crc32` is only
//! checked once the payload itself has been read.

use crate::error::{Error, Result};
use crc32fast::Hasher;
use std::io::{Read, Write};

// ── File header ─────────────────────────────────────────────────────────────

pub const FILE_MAGIC: &[u8; 4] = b"JLS1";
pub const FORMAT_VERSION: u32 = 1;
pub const FILE_HEADER_SIZE: usize = 64;

pub fn write_file_header<W: Write>(mut w: W) -> Result<()> {
    let mut buf = [0u8; FILE_HEADER_SIZE];
    buf[0..4].copy_from_slice(FILE_MAGIC);
    buf[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    // bytes [8..60) stay zero (reserved).
    let mut h = Hasher::new();
    h.update(&buf[..60]);
    buf[60..64].copy_from_slice(&h.finalize().to_le_bytes());
    w.write_all(&buf)?;
    Ok(())
}

/// Validate the file header. Fails with `Io` on magic/version mismatch, as
/// the raw layer treats a foreign file the same as any other unreadable one.
pub fn read_file_header<R: Read>(mut r: R) -> Result<()> {
    let mut buf = [0u8; FILE_HEADER_SIZE];
    r.read_exact(&mut buf)?;
    if &buf[0..4] != FILE_MAGIC {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "bad file magic",
        )));
    }
    let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    if version > FORMAT_VERSION {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unsupported format version {version}"),
        )));
    }
    let mut h = Hasher::new();
    h.update(&buf[..60]);
    let expected = h.finalize();
    let stored = u32::from_le_bytes(buf[60..64].try_into().unwrap());
    if expected != stored {
        return Err(Error::CrcHeader);
    }
    Ok(())
}

// ── Tags ─────────────────────────────────────────────────────────────────────

pub const TAG_USER_DATA: u8 = 0x01;
pub const TAG_SOURCE_DEF: u8 = 0x02;
pub const TAG_SIGNAL_DEF: u8 = 0x03;

/// Track type, packed into bits 3-4 of a track-chunk tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TrackType {
    Fsr = 0,
    Vsr = 1,
    Annotation = 2,
    Utc = 3,
}

impl TrackType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(TrackType::Fsr),
            1 => Some(TrackType::Vsr),
            2 => Some(TrackType::Annotation),
            3 => Some(TrackType::Utc),
            _ => None,
        }
    }
}

/// Chunk kind within a track, packed into bits 0-2 of a track-chunk tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkKind {
    Def = 0,
    Head = 1,
    Data = 2,
    Index = 3,
    Summary = 4,
}

impl ChunkKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ChunkKind::Def),
            1 => Some(ChunkKind::Head),
            2 => Some(ChunkKind::Data),
            3 => Some(ChunkKind::Index),
            4 => Some(ChunkKind::Summary),
            _ => None,
        }
    }
}

/// Build a track-chunk tag: `0x20 | (track_type << 3) | chunk_kind`.
pub fn track_tag(track_type: TrackType, chunk_kind: ChunkKind) -> u8 {
    0x20 | ((track_type as u8) << 3) | (chunk_kind as u8)
}

/// Decode a tag into `(track_type, chunk_kind)`. Returns `None` for
/// non-track tags (USER_DATA/SOURCE_DEF/SIGNAL_DEF) or unknown bit patterns.
pub fn decode_track_tag(tag: u8) -> Option<(TrackType, ChunkKind)> {
    if tag & 0x20 == 0 {
        return None;
    }
    let track_type = TrackType::from_u8((tag >> 3) & 0x3)?;
    let chunk_kind = ChunkKind::from_u8(tag & 0x7)?;
    Some((track_type, chunk_kind))
}

// ── Storage types (user-data / annotation payloads) ─────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StorageType {
    Invalid = 0,
    Binary = 1,
    String = 2,
    Json = 3,
}

impl StorageType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(StorageType::Invalid),
            1 => Some(StorageType::Binary),
            2 => Some(StorageType::String),
            3 => Some(StorageType::Json),
            _ => None,
        }
    }
}

// ── Reserved counts ──────────────────────────────────────────────────────────

pub const SOURCE_COUNT: usize = 256;
pub const SIGNAL_COUNT: usize = 256;
pub const SUMMARY_LEVEL_COUNT: usize = 8;
pub const TRACK_HEAD_PAYLOAD_SIZE: usize = SUMMARY_LEVEL_COUNT * 8; // 64 bytes

/// Bytes of reserved padding at the start of a SOURCE_DEF payload, before
/// its five terminated strings.
pub const SOURCE_DEF_RESERVED: usize = 64;
/// Fixed-size prefix of a SIGNAL_DEF payload, before its two terminated
/// strings (name, si_units): source_id(2) + signal_type(1) + data_type(1)
/// + sample_rate(8) + samples_per_data(4) + sample_decimate_factor(4) +
/// entries_per_summary(4) + summary_decimate_factor(4) + utc_rate_auto(4).
pub const SIGNAL_DEF_FIXED_SIZE: usize = 2 + 1 + 1 + 8 + 4 + 4 + 4 + 4 + 4;
/// Fixed-size prefix of an ANNOTATION data payload, before its bytes:
/// timestamp(8) + annotation_type(1) + storage_type(1) + reserved(2) +
/// data_len(4).
pub const ANNOTATION_HEADER_SIZE: usize = 8 + 1 + 1 + 2 + 4;
/// Fixed size of a UTC data payload: sample_id(8) + utc(8).
pub const UTC_PAYLOAD_SIZE: usize = 8 + 8;

// ── chunk_meta packing ───────────────────────────────────────────────────────

/// Pack `(id, level)` into chunk_meta: bits 0-11 = id, bits 12-15 = level.
pub fn pack_meta(id: u16, level: u8) -> u16 {
    debug_assert!(id < 0x1000);
    debug_assert!(level < 0x10);
    (id & 0x0FFF) | ((level as u16) << 12)
}

pub fn unpack_meta(meta: u16) -> (u16, u8) {
    (meta & 0x0FFF, (meta >> 12) as u8)
}

// ── Chunk header ─────────────────────────────────────────────────────────────

pub const CHUNK_HEADER_SIZE: usize = 36;

#[derive(Debug, Clone, Copy)]
pub struct ChunkHeader {
    pub item_next: u64,
    pub item_prev: u64,
    pub tag: u8,
    pub chunk_meta: u16,
    pub payload_length: u32,
    pub payload_prev_length: u32,
}

impl ChunkHeader {
    pub fn new(tag: u8, chunk_meta: u16, payload_length: u32, payload_prev_length: u32) -> Self {
        Self {
            item_next: 0,
            item_prev: 0,
            tag,
            chunk_meta,
            payload_length,
            payload_prev_length,
        }
    }

    /// Serialize the 36-byte header, computing `header_crc32` over bytes
    /// `[0..28)` and storing `payload_crc32` (pre-computed by the caller
    /// from the payload bytes) in the trailing 4 bytes.
    pub fn to_bytes(&self, payload_crc: u32) -> [u8; CHUNK_HEADER_SIZE] {
        let mut buf = [0u8; CHUNK_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.item_next.to_le_bytes());
        buf[8..16].copy_from_slice(&self.item_prev.to_le_bytes());
        buf[16] = self.tag;
        buf[17] = 0; // rsv0_u8
        buf[18..20].copy_from_slice(&self.chunk_meta.to_le_bytes());
        buf[20..24].copy_from_slice(&self.payload_length.to_le_bytes());
        buf[24..28].copy_from_slice(&self.payload_prev_length.to_le_bytes());

        let mut h = Hasher::new();
        h.update(&buf[..28]);
        let header_crc = h.finalize();
        buf[28..32].copy_from_slice(&header_crc.to_le_bytes());
        buf[32..36].copy_from_slice(&payload_crc.to_le_bytes());
        buf
    }

    /// Parse and validate `header_crc32`. Does not touch `payload_crc32` —
    /// that is validated by the caller once the payload bytes are in hand.
    pub fn from_bytes(buf: &[u8; CHUNK_HEADER_SIZE]) -> Result<(Self, u32)> {
        let mut h = Hasher::new();
        h.update(&buf[..28]);
        let expected = h.finalize();
        let stored_header_crc = u32::from_le_bytes(buf[28..32].try_into().unwrap());
        if expected != stored_header_crc {
            return Err(Error::CrcHeader);
        }

        let header = ChunkHeader {
            item_next: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            item_prev: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            tag: buf[16],
            chunk_meta: u16::from_le_bytes(buf[18..20].try_into().unwrap()),
            payload_length: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
            payload_prev_length: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
        };
        let payload_crc = u32::from_le_bytes(buf[32..36].try_into().unwrap());
        Ok((header, payload_crc))
    }
}

pub fn crc32(data: &[u8]) -> u32 {
    let mut h = Hasher::new();
    h.update(data);
    h.finalize()
}

// ── Nul/unit-separator terminated strings ───────────────────────────────────

/// Append `s` as a nul-terminated string followed by a unit-separator
/// (0x1F) byte, the writer-side half of the §3 string encoding.
pub fn push_terminated_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0x00);
    buf.push(0x1F);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_header_round_trip() {
        let mut buf = Vec::new();
        write_file_header(&mut buf).unwrap();
        assert_eq!(buf.len(), FILE_HEADER_SIZE);
        read_file_header(&buf[..]).unwrap();
    }

    #[test]
    fn file_header_rejects_bad_magic() {
        let mut buf = vec![0u8; FILE_HEADER_SIZE];
        buf[0..4].copy_from_slice(b"NOPE");
        assert!(read_file_header(&buf[..]).is_err());
    }

    #[test]
    fn chunk_header_round_trip() {
        let mut h = ChunkHeader::new(TAG_SOURCE_DEF, 7, 123, 45);
        h.item_next = 999;
        h.item_prev = 111;
        let bytes = h.to_bytes(0xdead_beef);
        let (parsed, payload_crc) = ChunkHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.item_next, 999);
        assert_eq!(parsed.item_prev, 111);
        assert_eq!(parsed.tag, TAG_SOURCE_DEF);
        assert_eq!(parsed.chunk_meta, 7);
        assert_eq!(parsed.payload_length, 123);
        assert_eq!(parsed.payload_prev_length, 45);
        assert_eq!(payload_crc, 0xdead_beef);
    }

    #[test]
    fn chunk_header_detects_corruption() {
        let h = ChunkHeader::new(TAG_USER_DATA, 0, 10, 0);
        let mut bytes = h.to_bytes(0);
        bytes[0] ^= 0xFF;
        assert!(matches!(ChunkHeader::from_bytes(&bytes), Err(Error::CrcHeader)));
    }

    #[test]
    fn track_tag_round_trip() {
        for tt in [TrackType::Fsr, TrackType::Vsr, TrackType::Annotation, TrackType::Utc] {
            for ck in [ChunkKind::Def, ChunkKind::Head, ChunkKind::Data, ChunkKind::Index, ChunkKind::Summary] {
                let tag = track_tag(tt, ck);
                let (dtt, dck) = decode_track_tag(tag).unwrap();
                assert_eq!(tt, dtt);
                assert_eq!(ck, dck);
            }
        }
    }

    #[test]
    fn meta_pack_round_trip() {
        let meta = pack_meta(4095, 9);
        assert_eq!(unpack_meta(meta), (4095, 9));
    }
}
