//! Raw chunk layer: serialize/deserialize the chunk header, compute/verify
//! CRC32s, and provide positional I/O. Stateless beyond the open file and
//! current position — it does not interpret tags.

use crate::error::{Error, Result};
use crate::format::{self, ChunkHeader, CHUNK_HEADER_SIZE};
use std::io::{Read, Seek, SeekFrom, Write};

/// Raw chunk writer over any `Write + Seek` backing store.
pub struct RawWriter<W: Write + Seek> {
    inner: W,
    /// Payload length of the last chunk physically written, so each new
    /// chunk's `payload_prev_length` is filled in automatically regardless
    /// of which logical list it belongs to (the reverse physical scan is a
    /// whole-file concept, not a per-list one).
    last_payload_len: u32,
}

impl<W: Write + Seek> RawWriter<W> {
    /// Open in write mode: emits the file-header at offset 0.
    pub fn create(mut inner: W) -> Result<Self> {
        inner.seek(SeekFrom::Start(0))?;
        format::write_file_header(&mut inner)?;
        Ok(Self { inner, last_payload_len: 0 })
    }

    /// Write `header`+`payload` contiguously at the current position.
    /// Fills in both CRCs and `payload_prev_length`. Returns the offset the
    /// chunk started at.
    pub fn write(&mut self, header: &ChunkHeader, payload: &[u8]) -> Result<u64> {
        let offset = self.inner.stream_position()?;
        let mut header = *header;
        header.payload_prev_length = self.last_payload_len;
        let payload_crc = format::crc32(payload);
        let bytes = header.to_bytes(payload_crc);
        self.inner.write_all(&bytes)?;
        self.inner.write_all(payload)?;
        self.last_payload_len = payload.len() as u32;
        Ok(offset)
    }

    /// Seek to `offset`, overwrite only the header region (not payload),
    /// recompute `header_crc32`, and restore the original stream position.
    pub fn write_header_in_place(&mut self, offset: u64, header: &ChunkHeader, payload_crc: u32) -> Result<()> {
        let restore = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(offset))?;
        let bytes = header.to_bytes(payload_crc);
        self.inner.write_all(&bytes)?;
        self.inner.seek(SeekFrom::Start(restore))?;
        Ok(())
    }

    /// Seek to `offset`, overwrite only the payload region (fixed-size
    /// payloads such as a track head), and restore the original position.
    /// The caller is responsible for patching the header's `payload_crc32`
    /// separately if the payload changed.
    pub fn write_payload_in_place(&mut self, offset: u64, payload: &[u8]) -> Result<()> {
        let restore = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(offset + CHUNK_HEADER_SIZE as u64))?;
        self.inner.write_all(payload)?;
        self.inner.seek(SeekFrom::Start(restore))?;
        Ok(())
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

impl<W: Read + Write + Seek> RawWriter<W> {
    /// Read back a chunk's header at `offset` without disturbing the
    /// stream's current position. Used to patch a chunk's payload (and
    /// recompute its `payload_crc32`) without clobbering an `item_next`
    /// that a later append may have already patched in.
    pub fn read_header_at(&mut self, offset: u64) -> Result<(ChunkHeader, u32)> {
        let restore = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(offset))?;
        let mut buf = [0u8; CHUNK_HEADER_SIZE];
        self.inner.read_exact(&mut buf)?;
        self.inner.seek(SeekFrom::Start(restore))?;
        ChunkHeader::from_bytes(&buf)
    }
}

/// Raw chunk reader over any `Read + Seek` backing store.
pub struct RawReader<R: Read + Seek> {
    inner: R,
}

impl<R: Read + Seek> RawReader<R> {
    /// Open in read mode: validates the file-header at offset 0.
    pub fn open(mut inner: R) -> Result<Self> {
        inner.seek(SeekFrom::Start(0))?;
        format::read_file_header(&mut inner)?;
        Ok(Self { inner })
    }

    /// Read the next chunk header and payload.
    ///
    /// If `payload_length > payload_capacity`, the file position is left at
    /// the chunk start and `TooBig { required }` is returned. End-of-file
    /// (no bytes available for a new header) returns `Empty`.
    pub fn read(&mut self, payload_capacity: usize) -> Result<(ChunkHeader, Vec<u8>)> {
        let chunk_start = self.inner.stream_position()?;

        let mut hdr_buf = [0u8; CHUNK_HEADER_SIZE];
        match self.inner.read_exact(&mut hdr_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(Error::Empty),
            Err(e) => return Err(Error::Io(e)),
        }
        let (header, payload_crc) = ChunkHeader::from_bytes(&hdr_buf)?;

        if header.payload_length as usize > payload_capacity {
            self.inner.seek(SeekFrom::Start(chunk_start))?;
            return Err(Error::TooBig { required: header.payload_length });
        }

        let mut payload = vec![0u8; header.payload_length as usize];
        match self.inner.read_exact(&mut payload) {
            Ok(()) => {}
            // A header present but its payload torn off by truncation reads
            // the same as "nothing more here" rather than a hard I/O error —
            // this is what lets a reader recover a clean prefix of a file
            // truncated mid-chunk.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.inner.seek(SeekFrom::Start(chunk_start))?;
                return Err(Error::Empty);
            }
            Err(e) => return Err(Error::Io(e)),
        }

        if format::crc32(&payload) != payload_crc {
            return Err(Error::CrcPayload);
        }

        Ok((header, payload))
    }

    /// Read just a chunk's header at `offset`, without its payload, leaving
    /// the stream positioned right after the header. Used to recover a
    /// chunk's `item_prev` when its payload is unreadable (e.g. truncated).
    pub fn read_header_at(&mut self, offset: u64) -> Result<(ChunkHeader, u32)> {
        self.inner.seek(SeekFrom::Start(offset))?;
        let mut hdr_buf = [0u8; CHUNK_HEADER_SIZE];
        match self.inner.read_exact(&mut hdr_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(Error::Empty),
            Err(e) => return Err(Error::Io(e)),
        }
        ChunkHeader::from_bytes(&hdr_buf)
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ChunkHeader, TAG_USER_DATA};
    use std::io::Cursor;

    fn fresh() -> RawWriter<Cursor<Vec<u8>>> {
        RawWriter::create(Cursor::new(Vec::new())).unwrap()
    }

    #[test]
    fn write_then_read_round_trip() {
        let mut w = fresh();
        let h = ChunkHeader::new(TAG_USER_DATA, 0, 5, 0);
        let off = w.write(&h, b"hello").unwrap();
        assert_eq!(off, format::FILE_HEADER_SIZE as u64);

        let buf = w.into_inner().into_inner();
        let mut r = RawReader::open(Cursor::new(buf)).unwrap();
        r.seek(off).unwrap();
        let (rh, payload) = r.read(64).unwrap();
        assert_eq!(payload, b"hello");
        assert_eq!(rh.payload_length, 5);
    }

    #[test]
    fn too_big_leaves_position_at_chunk_start() {
        let mut w = fresh();
        let h = ChunkHeader::new(TAG_USER_DATA, 0, 5, 0);
        let off = w.write(&h, b"hello").unwrap();
        let buf = w.into_inner().into_inner();

        let mut r = RawReader::open(Cursor::new(buf)).unwrap();
        r.seek(off).unwrap();
        let err = r.read(2).unwrap_err();
        assert!(matches!(err, Error::TooBig { required: 5 }));
        assert_eq!(r.tell().unwrap(), off);

        // Retry with enough capacity succeeds.
        let (_, payload) = r.read(64).unwrap();
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn corrupt_payload_detected() {
        let mut w = fresh();
        let h = ChunkHeader::new(TAG_USER_DATA, 0, 5, 0);
        let off = w.write(&h, b"hello").unwrap();
        let mut buf = w.into_inner().into_inner();
        let payload_off = off as usize + CHUNK_HEADER_SIZE;
        buf[payload_off] ^= 0xFF;

        let mut r = RawReader::open(Cursor::new(buf)).unwrap();
        r.seek(off).unwrap();
        assert!(matches!(r.read(64), Err(Error::CrcPayload)));
    }

    #[test]
    fn empty_stream_is_empty() {
        let w = fresh();
        let buf = w.into_inner().into_inner();
        let mut r = RawReader::open(Cursor::new(buf)).unwrap();
        assert!(matches!(r.read(64), Err(Error::Empty)));
    }

    #[test]
    fn write_header_in_place_patches_item_next() {
        let mut w = fresh();
        let h1 = ChunkHeader::new(TAG_USER_DATA, 0, 0, 0);
        let off1 = w.write(&h1, &[]).unwrap();
        let h2 = ChunkHeader::new(TAG_USER_DATA, 0, 0, 0);
        let off2 = w.write(&h2, &[]).unwrap();

        let mut patched = h1;
        patched.item_next = off2;
        w.write_header_in_place(off1, &patched, format::crc32(&[])).unwrap();

        let buf = w.into_inner().into_inner();
        let mut r = RawReader::open(Cursor::new(buf)).unwrap();
        r.seek(off1).unwrap();
        let (rh, _) = r.read(0).unwrap();
        assert_eq!(rh.item_next, off2);
    }
}
