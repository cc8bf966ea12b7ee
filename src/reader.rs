//! Streaming reader: a single forward scan at `open` builds the source and
//! signal tables; everything else (raw sample ranges, hierarchical
//! statistics, annotations) is resolved lazily by descending from a
//! track's head chunk.

use crate::error::{Error, Result};
use crate::format::{
    self, decode_track_tag, ChunkHeader, ChunkKind, StorageType, TrackType, CHUNK_HEADER_SIZE,
    SUMMARY_LEVEL_COUNT, TAG_SIGNAL_DEF, TAG_SOURCE_DEF, TAG_USER_DATA, TRACK_HEAD_PAYLOAD_SIZE,
};
use crate::raw::RawReader;
use crate::signal::{self, DataType, Signal, SignalType, Source};
use crate::string_arena::StringArena;
use crate::summary::{self, SummaryEntry};
use std::io::{Read, Seek};

/// Generous payload capacity for the forward scan and chunk re-reads; no
/// chunk in this format legitimately exceeds a few megabytes.
const SCAN_PAYLOAD_CAP: usize = 64 * 1024 * 1024;

#[derive(Clone)]
struct SignalRecord {
    signal: Signal,
    fsr_head: Option<u64>,
    vsr_head: Option<u64>,
    annotation_head: Option<u64>,
    utc_head: Option<u64>,
}

/// One decoded annotation, in the order `annotations` chooses to return
/// them (chronological, oldest first).
#[derive(Debug, Clone)]
pub struct Annotation {
    pub timestamp: i64,
    pub annotation_type: u8,
    pub storage_type: StorageType,
    pub data: Vec<u8>,
}

/// One chunk observed by [`Reader::scan_forward`].
#[derive(Debug, Clone)]
pub struct ScanEntry {
    pub offset: u64,
    pub tag: u8,
    pub payload_length: u32,
}

/// Result of an index-bypass forward scan: every chunk the scanner could
/// read, plus one message per point where it had to resynchronize after
/// a torn or corrupt header/payload.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub chunks: Vec<ScanEntry>,
    pub errors: Vec<String>,
}

pub struct Reader<R: Read + Seek> {
    raw: RawReader<R>,
    sources: [Option<Source>; format::SOURCE_COUNT],
    signals: [Option<SignalRecord>; format::SIGNAL_COUNT],
    user_data_anchor: Option<u64>,
    user_data_cursor: Option<u64>,
}

impl<R: Read + Seek> Reader<R> {
    /// Open a file for reading: validates the file header, then scans
    /// forward once to build the source/signal/head-offset tables.
    pub fn open(inner: R) -> Result<Self> {
        let mut raw = RawReader::open(inner)?;
        let mut sources: [Option<Source>; format::SOURCE_COUNT] = std::array::from_fn(|_| None);
        let mut signals: [Option<SignalRecord>; format::SIGNAL_COUNT] = std::array::from_fn(|_| None);
        let mut user_data_anchor = None;

        raw.seek(format::FILE_HEADER_SIZE as u64)?;
        loop {
            let offset = raw.tell()?;
            match raw.read(SCAN_PAYLOAD_CAP) {
                Ok((header, payload)) => match header.tag {
                    TAG_USER_DATA => {
                        if user_data_anchor.is_none() {
                            user_data_anchor = Some(offset);
                        }
                    }
                    TAG_SOURCE_DEF => {
                        let (id, _) = format::unpack_meta(header.chunk_meta);
                        sources[id as usize] = Some(decode_source_def_payload(id, &payload));
                    }
                    TAG_SIGNAL_DEF => {
                        let (id, _) = format::unpack_meta(header.chunk_meta);
                        let signal = decode_signal_def_payload(id, &payload)?;
                        signals[id as usize] = Some(SignalRecord {
                            signal,
                            fsr_head: None,
                            vsr_head: None,
                            annotation_head: None,
                            utc_head: None,
                        });
                    }
                    tag => {
                        if let Some((track_type, ChunkKind::Head)) = decode_track_tag(tag) {
                            let (id, _) = format::unpack_meta(header.chunk_meta);
                            if let Some(rec) = signals[id as usize].as_mut() {
                                match track_type {
                                    TrackType::Fsr => rec.fsr_head = Some(offset),
                                    TrackType::Vsr => rec.vsr_head = Some(offset),
                                    TrackType::Annotation => rec.annotation_head = Some(offset),
                                    TrackType::Utc => rec.utc_head = Some(offset),
                                }
                            }
                        }
                    }
                },
                Err(Error::Empty) => break,
                Err(e) => return Err(e),
            }
        }

        Ok(Self {
            raw,
            sources,
            signals,
            user_data_anchor,
            user_data_cursor: None,
        })
    }

    pub fn sources(&self) -> Vec<&Source> {
        self.sources.iter().filter_map(|o| o.as_ref()).collect()
    }

    pub fn signals(&self) -> Vec<&Signal> {
        self.signals.iter().filter_map(|o| o.as_ref().map(|r| &r.signal)).collect()
    }

    fn signal_record(&self, signal_id: u16) -> Result<SignalRecord> {
        self.signals
            .get(signal_id as usize)
            .and_then(|o| o.clone())
            .ok_or(Error::NotFound)
    }

    /// Total number of FSR samples written so far: descends the highest
    /// populated index chain, always taking the last entry, down to the
    /// latest DATA chunk.
    pub fn fsr_length(&mut self, signal_id: u16) -> Result<u64> {
        let rec = self.signal_record(signal_id)?;
        if rec.signal.signal_type != SignalType::Fsr {
            return Err(Error::NotSupported("signal is not FSR".into()));
        }
        let head_offset = rec.fsr_head.ok_or(Error::NotFound)?;
        let head_payload = self.read_head_payload(head_offset)?;
        if head_payload.iter().all(|&o| o == 0) {
            return Ok(0);
        }
        let data_offset = self.descend_last(&head_payload)?;
        if data_offset == 0 {
            return Ok(0);
        }
        self.latest_readable_data_end(data_offset)
    }

    /// Read the data chunk at `offset`; if its payload was torn off by
    /// truncation, walk `item_prev` back through the same data list until a
    /// complete chunk is found, returning that chunk's end sample id. A
    /// file truncated mid-chunk is still readable up to its last complete
    /// data chunk.
    fn latest_readable_data_end(&mut self, mut offset: u64) -> Result<u64> {
        loop {
            match self.read_data_chunk(offset) {
                Ok((sample_id, samples, _)) => return Ok(sample_id + samples.len() as u64),
                Err(Error::Empty) | Err(Error::Io(_)) | Err(Error::CrcPayload) => {
                    let (header, _) = self.raw.read_header_at(offset)?;
                    if header.item_prev == 0 {
                        return Ok(0);
                    }
                    offset = header.item_prev;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Locate the file offset of the DATA chunk containing `sample_id`.
    pub fn seek(&mut self, signal_id: u16, sample_id: u64) -> Result<u64> {
        let rec = self.signal_record(signal_id)?;
        if rec.signal.signal_type != SignalType::Fsr {
            return Err(Error::NotSupported("signal is not FSR".into()));
        }
        let step = signal::step_sizes(&rec.signal);
        let head_offset = rec.fsr_head.ok_or(Error::NotFound)?;
        let head_payload = self.read_head_payload(head_offset)?;
        let top = highest_populated(&head_payload);
        if head_payload[top] == 0 {
            return Err(Error::NotFound);
        }
        let offset = self.descend_to_level(&head_payload, &step, top, 0, sample_id)?;
        let (start, samples, _) = self.read_data_chunk(offset)?;
        if sample_id < start || sample_id >= start + samples.len() as u64 {
            return Err(Error::NotFound);
        }
        Ok(offset)
    }

    /// Read `out.len()` consecutive raw samples starting at `sample_id`,
    /// crossing DATA chunk boundaries as needed via `item_next`.
    pub fn fsr_f32(&mut self, signal_id: u16, sample_id: u64, out: &mut [f32]) -> Result<()> {
        if out.is_empty() {
            return Ok(());
        }
        let mut offset = self.seek(signal_id, sample_id)?;
        let mut filled = 0usize;
        let mut cursor = sample_id;
        loop {
            let (start, samples, item_next) = self.read_data_chunk(offset)?;
            let local_start = (cursor - start) as usize;
            if local_start >= samples.len() {
                return Err(Error::Empty);
            }
            let available = samples.len() - local_start;
            let want = out.len() - filled;
            let take = available.min(want);
            out[filled..filled + take].copy_from_slice(&samples[local_start..local_start + take]);
            filled += take;
            cursor += take as u64;
            if filled == out.len() {
                return Ok(());
            }
            if item_next == 0 {
                return Err(Error::Empty);
            }
            offset = item_next;
        }
    }

    /// Fill `out` with `(min,max,mean,variance)` summaries over consecutive
    /// `increment`-sample buckets starting at `sample_id`. Uses the
    /// hierarchical summary tree when a level's span divides `increment`
    /// evenly and the whole bucket lives inside one summary chunk;
    /// otherwise falls back to reading raw samples and summarizing
    /// directly (always correct, just not O(log n)).
    pub fn fsr_f32_statistics(
        &mut self,
        signal_id: u16,
        sample_id: u64,
        increment: u64,
        out: &mut [SummaryEntry],
    ) -> Result<()> {
        if increment == 0 {
            return Err(Error::ParameterInvalid("increment must be nonzero".into()));
        }
        let rec = self.signal_record(signal_id)?;
        if rec.signal.signal_type != SignalType::Fsr {
            return Err(Error::NotSupported("signal is not FSR".into()));
        }
        let step = signal::step_sizes(&rec.signal);
        let head_offset = rec.fsr_head.ok_or(Error::NotFound)?;
        let head_payload = self.read_head_payload(head_offset)?;
        let top = highest_populated(&head_payload);

        let mut level = 0usize;
        for l in (1..=top).rev() {
            if increment % step[l] == 0 {
                level = l;
                break;
            }
        }

        for (i, slot) in out.iter_mut().enumerate() {
            let bucket_start = sample_id + i as u64 * increment;
            *slot = self.aggregate_range(signal_id, &head_payload, &step, level, top, bucket_start, increment)?;
        }
        Ok(())
    }

    fn aggregate_range(
        &mut self,
        signal_id: u16,
        head_payload: &[u64; SUMMARY_LEVEL_COUNT],
        step: &[u64; SUMMARY_LEVEL_COUNT],
        level: usize,
        top: usize,
        bucket_start: u64,
        increment: u64,
    ) -> Result<SummaryEntry> {
        if level == 0 {
            return self.raw_bucket(signal_id, bucket_start, increment);
        }

        let index_offset = match self.descend_to_level(head_payload, step, top, level, bucket_start) {
            Ok(o) => o,
            Err(_) => return self.raw_bucket(signal_id, bucket_start, increment),
        };
        let (first_sample_id, child_offsets) = self.read_index_chunk(index_offset)?;
        let span = step[level];
        let entry_idx = entry_index(bucket_start, first_sample_id, span);
        let count = (increment / span) as usize;
        if entry_idx + count > child_offsets.len() {
            return self.raw_bucket(signal_id, bucket_start, increment);
        }

        let (_, entries) = self.read_sibling_summary_chunk(index_offset, child_offsets.len())?;
        let mut acc = entries[entry_idx];
        let mut n = span;
        for k in 1..count {
            let (combined, combined_n) = summary::combine(acc, n, entries[entry_idx + k], span);
            acc = combined;
            n = combined_n;
        }
        Ok(acc)
    }

    fn raw_bucket(&mut self, signal_id: u16, start: u64, count: u64) -> Result<SummaryEntry> {
        let mut buf = vec![0f32; count as usize];
        self.fsr_f32(signal_id, start, &mut buf)?;
        Ok(summary::summarize(&buf))
    }

    /// Annotations for `signal_id`, oldest first — walks `item_prev` from
    /// the track head back to the first chunk, then reverses.
    pub fn annotations(&mut self, signal_id: u16) -> Result<Vec<Annotation>> {
        let rec = self.signal_record(signal_id)?;
        let head_offset = match rec.annotation_head {
            Some(h) => h,
            None => return Ok(Vec::new()),
        };
        let head_payload = self.read_head_payload(head_offset)?;
        let mut offset = head_payload[0];
        let mut out = Vec::new();
        while offset != 0 {
            let (header, payload) = self.read_chunk_at(offset)?;
            out.push(decode_annotation_payload(&payload)?);
            offset = header.item_prev;
        }
        out.reverse();
        Ok(out)
    }

    /// Reset user-data iteration to just after the sentinel chunk.
    pub fn user_data_reset(&mut self) {
        self.user_data_cursor = self.user_data_anchor;
    }

    /// Advance to and return the next user-data chunk after the cursor.
    pub fn user_data_next(&mut self) -> Result<Option<(u16, StorageType, Vec<u8>)>> {
        let cursor = match self.user_data_cursor {
            Some(c) => c,
            None => return Ok(None),
        };
        let (header, payload) = self.read_chunk_at(cursor)?;
        if header.item_next == 0 {
            self.user_data_cursor = None;
            return Ok(None);
        }
        self.user_data_cursor = Some(header.item_next);
        let (next_header, next_payload) = self.read_chunk_at(header.item_next)?;
        let (user_field, storage_raw) = format::unpack_meta(next_header.chunk_meta);
        let storage_type = StorageType::from_u8(storage_raw as u8).unwrap_or(StorageType::Invalid);
        Ok(Some((user_field, storage_type, next_payload)))
    }

    /// Index-bypass diagnostic scan: reads every chunk sequentially from
    /// the raw byte stream, ignoring all linked lists, and resynchronizes
    /// one byte at a time after a torn header or bad CRC so later,
    /// undamaged chunks remain visible.
    pub fn scan_forward(&mut self) -> ScanReport {
        let mut report = ScanReport::default();
        if self.raw.seek(format::FILE_HEADER_SIZE as u64).is_err() {
            report.errors.push("failed to seek past file header".into());
            return report;
        }
        loop {
            let offset = match self.raw.tell() {
                Ok(o) => o,
                Err(e) => {
                    report.errors.push(e.to_string());
                    break;
                }
            };
            match self.raw.read(SCAN_PAYLOAD_CAP) {
                Ok((header, _payload)) => {
                    report.chunks.push(ScanEntry {
                        offset,
                        tag: header.tag,
                        payload_length: header.payload_length,
                    });
                }
                Err(Error::Empty) => break,
                Err(e) => {
                    report.errors.push(format!("{e} at offset {offset}"));
                    if self.raw.seek(offset + 1).is_err() {
                        break;
                    }
                }
            }
        }
        report
    }

    // ── low-level chunk access ───────────────────────────────────────────

    fn read_chunk_at(&mut self, offset: u64) -> Result<(ChunkHeader, Vec<u8>)> {
        self.raw.seek(offset)?;
        self.raw.read(SCAN_PAYLOAD_CAP)
    }

    fn read_head_payload(&mut self, head_offset: u64) -> Result<[u64; SUMMARY_LEVEL_COUNT]> {
        let (_, payload) = self.read_chunk_at(head_offset)?;
        decode_head_payload(&payload)
    }

    fn read_data_chunk(&mut self, offset: u64) -> Result<(u64, Vec<f32>, u64)> {
        let (header, payload) = self.read_chunk_at(offset)?;
        let (sample_id, samples) = decode_data_payload(&payload)?;
        Ok((sample_id, samples, header.item_next))
    }

    fn read_index_chunk(&mut self, offset: u64) -> Result<(i64, Vec<u64>)> {
        let (_, payload) = self.read_chunk_at(offset)?;
        decode_index_payload(&payload)
    }

    /// Recover the SUMMARY chunk that was written immediately before the
    /// INDEX chunk at `index_offset` (see DESIGN.md "Head payload slot
    /// assignment"): both chunks share the same entry count, so the
    /// summary payload's length is computable without reading it first.
    fn read_sibling_summary_chunk(&mut self, index_offset: u64, entry_count: usize) -> Result<(i64, Vec<SummaryEntry>)> {
        let summary_payload_len = 16 + entry_count * 16;
        let summary_offset = index_offset
            .checked_sub((CHUNK_HEADER_SIZE + summary_payload_len) as u64)
            .ok_or(Error::NotFound)?;
        let (_, payload) = self.read_chunk_at(summary_offset)?;
        decode_summary_payload(&payload)
    }

    /// Descend the index chain from `start_level` down to `target_level`,
    /// always following the child covering `sample_id`. Returns the DATA
    /// chunk offset when `target_level == 0`, else the INDEX-level-
    /// `target_level` chunk's own offset.
    fn descend_to_level(
        &mut self,
        head_payload: &[u64; SUMMARY_LEVEL_COUNT],
        step: &[u64; SUMMARY_LEVEL_COUNT],
        start_level: usize,
        target_level: usize,
        sample_id: u64,
    ) -> Result<u64> {
        let mut level = start_level;
        let mut offset = head_payload[level];
        if offset == 0 {
            return Err(Error::NotFound);
        }
        while level > target_level {
            let (first_sample_id, child_offsets) = self.read_index_chunk(offset)?;
            let idx = entry_index(sample_id, first_sample_id, step[level]).min(child_offsets.len().saturating_sub(1));
            offset = child_offsets[idx];
            level -= 1;
        }
        Ok(offset)
    }

    /// Descend always taking the LAST child at each level, to find the
    /// most recently written DATA chunk. A summary tree's upper levels may
    /// be torn off by truncation before its level-0 data; if descending
    /// from the topmost populated level fails, retry starting one level
    /// down rather than propagate the error.
    fn descend_last(&mut self, head_payload: &[u64; SUMMARY_LEVEL_COUNT]) -> Result<u64> {
        let top = highest_populated(head_payload);
        for level in (0..=top).rev() {
            let offset = head_payload[level];
            if offset == 0 {
                continue;
            }
            if let Ok(data_offset) = self.descend_last_from(offset, level) {
                return Ok(data_offset);
            }
        }
        Ok(0)
    }

    fn descend_last_from(&mut self, mut offset: u64, mut level: usize) -> Result<u64> {
        while level > 0 {
            let (_, child_offsets) = self.read_index_chunk(offset)?;
            offset = *child_offsets.last().ok_or(Error::NotFound)?;
            level -= 1;
        }
        Ok(offset)
    }
}

fn highest_populated(head_payload: &[u64; SUMMARY_LEVEL_COUNT]) -> usize {
    let mut level = SUMMARY_LEVEL_COUNT - 1;
    while level > 0 && head_payload[level] == 0 {
        level -= 1;
    }
    level
}

fn entry_index(sample_id: u64, first_sample_id: i64, span: u64) -> usize {
    if (sample_id as i64) < first_sample_id {
        return 0;
    }
    ((sample_id as i64 - first_sample_id) as u64 / span) as usize
}

// ── Payload decoding ─────────────────────────────────────────────────────────

fn decode_source_def_payload(source_id: u16, payload: &[u8]) -> Source {
    let mut pos = format::SOURCE_DEF_RESERVED;
    let mut arena = StringArena::new();
    let name = arena.read_terminated(payload, &mut pos);
    let vendor = arena.read_terminated(payload, &mut pos);
    let model = arena.read_terminated(payload, &mut pos);
    let version = arena.read_terminated(payload, &mut pos);
    let serial_number = arena.read_terminated(payload, &mut pos);
    Source {
        source_id,
        name: arena.get(name).to_string(),
        vendor: arena.get(vendor).to_string(),
        model: arena.get(model).to_string(),
        version: arena.get(version).to_string(),
        serial_number: arena.get(serial_number).to_string(),
    }
}

fn decode_signal_def_payload(signal_id: u16, payload: &[u8]) -> Result<Signal> {
    if payload.len() < format::SIGNAL_DEF_FIXED_SIZE {
        return Err(Error::ParameterInvalid("signal_def payload too short".into()));
    }
    let source_id = u16::from_le_bytes(payload[0..2].try_into().unwrap());
    let signal_type = SignalType::from_u8(payload[2])
        .ok_or_else(|| Error::ParameterInvalid("unknown signal_type".into()))?;
    let data_type =
        DataType::from_u8(payload[3]).ok_or_else(|| Error::ParameterInvalid("unknown data_type".into()))?;
    let sample_rate = f64::from_le_bytes(payload[4..12].try_into().unwrap());
    let samples_per_data = u32::from_le_bytes(payload[12..16].try_into().unwrap());
    let sample_decimate_factor = u32::from_le_bytes(payload[16..20].try_into().unwrap());
    let entries_per_summary = u32::from_le_bytes(payload[20..24].try_into().unwrap());
    let summary_decimate_factor = u32::from_le_bytes(payload[24..28].try_into().unwrap());
    let utc_rate_auto = u32::from_le_bytes(payload[28..32].try_into().unwrap());

    let mut pos = format::SIGNAL_DEF_FIXED_SIZE;
    let mut arena = StringArena::new();
    let name = arena.read_terminated(payload, &mut pos);
    let si_units = arena.read_terminated(payload, &mut pos);

    Ok(Signal {
        signal_id,
        source_id,
        signal_type,
        data_type,
        sample_rate,
        samples_per_data,
        sample_decimate_factor,
        entries_per_summary,
        summary_decimate_factor,
        utc_rate_auto,
        name: arena.get(name).to_string(),
        si_units: arena.get(si_units).to_string(),
    })
}

fn decode_head_payload(payload: &[u8]) -> Result<[u64; SUMMARY_LEVEL_COUNT]> {
    if payload.len() < TRACK_HEAD_PAYLOAD_SIZE {
        return Err(Error::ParameterInvalid("head payload too short".into()));
    }
    let mut out = [0u64; SUMMARY_LEVEL_COUNT];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = u64::from_le_bytes(payload[i * 8..i * 8 + 8].try_into().unwrap());
    }
    Ok(out)
}

fn decode_data_payload(payload: &[u8]) -> Result<(u64, Vec<f32>)> {
    if payload.len() < 16 {
        return Err(Error::ParameterInvalid("data payload too short".into()));
    }
    let sample_id = u64::from_le_bytes(payload[0..8].try_into().unwrap());
    let count = u64::from_le_bytes(payload[8..16].try_into().unwrap()) as usize;
    if payload.len() < 16 + count * 4 {
        return Err(Error::ParameterInvalid("data payload truncated".into()));
    }
    let mut samples = Vec::with_capacity(count);
    for i in 0..count {
        let off = 16 + i * 4;
        samples.push(f32::from_le_bytes(payload[off..off + 4].try_into().unwrap()));
    }
    Ok((sample_id, samples))
}

fn decode_summary_payload(payload: &[u8]) -> Result<(i64, Vec<SummaryEntry>)> {
    if payload.len() < 16 {
        return Err(Error::ParameterInvalid("summary payload too short".into()));
    }
    let first_sample_id = i64::from_le_bytes(payload[0..8].try_into().unwrap());
    let count = i64::from_le_bytes(payload[8..16].try_into().unwrap()) as usize;
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let off = 16 + i * 16;
        if payload.len() < off + 16 {
            return Err(Error::ParameterInvalid("summary payload truncated".into()));
        }
        entries.push(SummaryEntry {
            min: f32::from_le_bytes(payload[off..off + 4].try_into().unwrap()),
            max: f32::from_le_bytes(payload[off + 4..off + 8].try_into().unwrap()),
            mean: f32::from_le_bytes(payload[off + 8..off + 12].try_into().unwrap()),
            variance: f32::from_le_bytes(payload[off + 12..off + 16].try_into().unwrap()),
        });
    }
    Ok((first_sample_id, entries))
}

fn decode_index_payload(payload: &[u8]) -> Result<(i64, Vec<u64>)> {
    if payload.len() < 16 {
        return Err(Error::ParameterInvalid("index payload too short".into()));
    }
    let first_sample_id = i64::from_le_bytes(payload[0..8].try_into().unwrap());
    let count = i64::from_le_bytes(payload[8..16].try_into().unwrap()) as usize;
    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        let off = 16 + i * 8;
        if payload.len() < off + 8 {
            return Err(Error::ParameterInvalid("index payload truncated".into()));
        }
        offsets.push(i64::from_le_bytes(payload[off..off + 8].try_into().unwrap()) as u64);
    }
    Ok((first_sample_id, offsets))
}

fn decode_annotation_payload(payload: &[u8]) -> Result<Annotation> {
    if payload.len() < format::ANNOTATION_HEADER_SIZE {
        return Err(Error::ParameterInvalid("annotation payload too short".into()));
    }
    let timestamp = i64::from_le_bytes(payload[0..8].try_into().unwrap());
    let annotation_type = payload[8];
    let storage_type = StorageType::from_u8(payload[9]).unwrap_or(StorageType::Invalid);
    let data_len = u32::from_le_bytes(payload[12..16].try_into().unwrap()) as usize;
    let data = payload
        .get(16..16 + data_len)
        .ok_or_else(|| Error::ParameterInvalid("annotation payload truncated".into()))?
        .to_vec();
    Ok(Annotation {
        timestamp,
        annotation_type,
        storage_type,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Writer;
    use std::io::Cursor;

    fn open_pair() -> Writer<Cursor<Vec<u8>>> {
        Writer::create(Cursor::new(Vec::new())).unwrap()
    }

    #[test]
    fn round_trip_fsr_length_and_samples() {
        let mut w = open_pair();
        w.signal_def(Signal {
            signal_id: 1,
            source_id: 0,
            signal_type: SignalType::Fsr,
            data_type: DataType::F32,
            sample_rate: 1000.0,
            samples_per_data: 100,
            sample_decimate_factor: 10,
            entries_per_summary: 1000,
            summary_decimate_factor: 10,
            utc_rate_auto: 0,
            name: "s".into(),
            si_units: "V".into(),
        })
        .unwrap();

        let samples: Vec<f32> = (0..10_000).map(|i| i as f32).collect();
        w.fsr_f32(1, 0, &samples).unwrap();
        let cursor = w.close().unwrap();

        let mut r = Reader::open(cursor).unwrap();
        assert_eq!(r.fsr_length(1).unwrap(), 10_000);

        let mut out = vec![0f32; 10_000];
        r.fsr_f32(1, 0, &mut out).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn annotations_round_trip_chronological() {
        let mut w = open_pair();
        w.signal_def(Signal {
            signal_id: 2,
            source_id: 0,
            signal_type: SignalType::Vsr,
            data_type: DataType::F32,
            sample_rate: 0.0,
            samples_per_data: 1000,
            sample_decimate_factor: 10,
            entries_per_summary: 1000,
            summary_decimate_factor: 10,
            utc_rate_auto: 0,
            name: "v".into(),
            si_units: "".into(),
        })
        .unwrap();
        w.vsr_annotation(2, 10, 0, StorageType::String, b"first").unwrap();
        w.vsr_annotation(2, 20, 0, StorageType::String, b"second").unwrap();

        let cursor = w.close().unwrap();
        let mut r = Reader::open(cursor).unwrap();
        let anns = r.annotations(2).unwrap();
        assert_eq!(anns.len(), 2);
        assert_eq!(anns[0].data, b"first");
        assert_eq!(anns[1].data, b"second");
    }
}
