//! Streaming writer: source/signal definitions, annotation/UTC/user-data
//! appends, and the FSR summarization cascade.
//!
//! Every logical list (source list, the shared signal/track-def/track-head
//! list, one list per user-data, and one data/summary/index list per
//! `(signal_id, track_type, level)`) is maintained by its own
//! [`LinkedList`] MRA handle: appending writes the new chunk with
//! `item_prev` pointing at the previous tail, then patches that tail's
//! `item_next` in place.

use crate::error::{Error, Result};
use crate::format::{
    self, track_tag, ChunkHeader, ChunkKind, StorageType, TrackType, ANNOTATION_HEADER_SIZE,
    SIGNAL_DEF_FIXED_SIZE, SOURCE_DEF_RESERVED, SUMMARY_LEVEL_COUNT, TAG_SIGNAL_DEF, TAG_SOURCE_DEF,
    TAG_USER_DATA, TRACK_HEAD_PAYLOAD_SIZE, UTC_PAYLOAD_SIZE,
};
use crate::raw::RawWriter;
use crate::signal::{self, DataType, Signal, SignalType, Source};
use crate::summary::{self, LevelAccumulator, SummaryEntry};
use std::io::{Read, Seek, Write};
use std::path::Path;

/// Most-Recently-Added handle for one logical doubly-linked list.
#[derive(Default)]
struct LinkedList {
    mra: Option<(u64, ChunkHeader, u32)>,
}

impl LinkedList {
    fn append<W: Read + Write + Seek>(
        &mut self,
        raw: &mut RawWriter<W>,
        mut header: ChunkHeader,
        payload: &[u8],
    ) -> Result<u64> {
        let payload_crc = format::crc32(payload);
        header.item_prev = self.mra.as_ref().map(|m| m.0).unwrap_or(0);
        header.item_next = 0;
        let offset = raw.write(&header, payload)?;
        if let Some((prev_offset, mut prev_header, prev_crc)) = self.mra.take() {
            prev_header.item_next = offset;
            raw.write_header_in_place(prev_offset, &prev_header, prev_crc)?;
        }
        self.mra = Some((offset, header, payload_crc));
        Ok(offset)
    }
}

/// Per-track writer state: the raw data list (level 0), and one
/// summary/index list pair per summary level 1..7. `head_payload[0]` is the
/// latest data chunk offset; `head_payload[L]` for `L >= 1` is the latest
/// index-level-L chunk offset (see DESIGN.md "Head payload slot
/// assignment").
struct TrackState {
    track_type: TrackType,
    signal_id: u16,
    head_offset: u64,
    head_payload: [u64; SUMMARY_LEVEL_COUNT],
    data_list: LinkedList,
    index_lists: [LinkedList; SUMMARY_LEVEL_COUNT],
    summary_lists: [LinkedList; SUMMARY_LEVEL_COUNT],
    accumulators: [LevelAccumulator; SUMMARY_LEVEL_COUNT],
}

impl TrackState {
    fn new<W: Read + Write + Seek>(
        raw: &mut RawWriter<W>,
        signal_list: &mut LinkedList,
        track_type: TrackType,
        signal_id: u16,
    ) -> Result<Self> {
        let meta = format::pack_meta(signal_id, 0);

        let def_header = ChunkHeader::new(track_tag(track_type, ChunkKind::Def), meta, 0, 0);
        signal_list.append(raw, def_header, &[])?;

        let head_payload = [0u64; SUMMARY_LEVEL_COUNT];
        let head_bytes = encode_head_payload(&head_payload);
        let head_header = ChunkHeader::new(
            track_tag(track_type, ChunkKind::Head),
            meta,
            TRACK_HEAD_PAYLOAD_SIZE as u32,
            0,
        );
        let head_offset = signal_list.append(raw, head_header, &head_bytes)?;

        Ok(Self {
            track_type,
            signal_id,
            head_offset,
            head_payload,
            data_list: LinkedList::default(),
            index_lists: std::array::from_fn(|_| LinkedList::default()),
            summary_lists: std::array::from_fn(|_| LinkedList::default()),
            accumulators: std::array::from_fn(|_| LevelAccumulator::default()),
        })
    }

    /// Patch the head chunk's payload in place, re-reading its header
    /// first so an `item_next` patched by a later append to the shared
    /// signal list isn't clobbered.
    fn patch_head_level<W: Read + Write + Seek>(
        &mut self,
        raw: &mut RawWriter<W>,
        level: usize,
        offset: u64,
    ) -> Result<()> {
        self.head_payload[level] = offset;
        let bytes = encode_head_payload(&self.head_payload);
        let crc = format::crc32(&bytes);
        raw.write_payload_in_place(self.head_offset, &bytes)?;
        let (header, _) = raw.read_header_at(self.head_offset)?;
        raw.write_header_in_place(self.head_offset, &header, crc)?;
        Ok(())
    }
}

struct SignalState {
    signal: Signal,
    fsr: Option<TrackState>,
    vsr: Option<TrackState>,
    annotation: Option<TrackState>,
    utc: Option<TrackState>,
    fsr_buffer: Vec<f32>,
    fsr_buffer_start: u64,
    fsr_next_sample_id: u64,
}

/// Streaming writer over any `Read + Write + Seek` backing store.
pub struct Writer<W: Read + Write + Seek> {
    raw: RawWriter<W>,
    source_list: LinkedList,
    signal_list: LinkedList,
    user_data_list: LinkedList,
    sources_defined: [bool; format::SOURCE_COUNT],
    signals: [Option<Box<SignalState>>; format::SIGNAL_COUNT],
}

impl<W: Read + Write + Seek> Writer<W> {
    /// Open a fresh file over `inner`: writes the file header, the sentinel
    /// user-data chunk, reserved source 0, and reserved signal 0 (VSR,
    /// used for global annotations — `fsr_length(0)` correctly reports
    /// `NotSupported`).
    pub fn create(inner: W) -> Result<Self> {
        let mut raw = RawWriter::create(inner)?;
        let mut user_data_list = LinkedList::default();

        let sentinel = ChunkHeader::new(TAG_USER_DATA, format::pack_meta(0, 0), 0, 0);
        user_data_list.append(&mut raw, sentinel, &[])?;

        let mut writer = Self {
            raw,
            source_list: LinkedList::default(),
            signal_list: LinkedList::default(),
            user_data_list,
            sources_defined: [false; format::SOURCE_COUNT],
            signals: std::array::from_fn(|_| None),
        };

        writer.source_def(Source {
            source_id: 0,
            name: String::new(),
            vendor: String::new(),
            model: String::new(),
            version: String::new(),
            serial_number: String::new(),
        })?;
        writer.signal_def(Signal {
            signal_id: 0,
            source_id: 0,
            signal_type: SignalType::Vsr,
            data_type: DataType::F32,
            sample_rate: 0.0,
            samples_per_data: 1000,
            sample_decimate_factor: 10,
            entries_per_summary: 1000,
            summary_decimate_factor: 10,
            utc_rate_auto: 0,
            name: String::new(),
            si_units: String::new(),
        })?;

        Ok(writer)
    }

    pub fn source_def(&mut self, source: Source) -> Result<()> {
        let id = source.source_id as usize;
        if id >= format::SOURCE_COUNT {
            return Err(Error::ParameterInvalid(format!("source_id {id} out of range")));
        }
        if self.sources_defined[id] {
            return Err(Error::AlreadyExists);
        }

        let payload = encode_source_def_payload(&source);
        let meta = format::pack_meta(source.source_id, 0);
        let header = ChunkHeader::new(TAG_SOURCE_DEF, meta, payload.len() as u32, 0);
        self.source_list.append(&mut self.raw, header, &payload)?;
        self.sources_defined[id] = true;
        Ok(())
    }

    pub fn signal_def(&mut self, signal: Signal) -> Result<()> {
        let id = signal.signal_id as usize;
        if id >= format::SIGNAL_COUNT {
            return Err(Error::ParameterInvalid(format!("signal_id {id} out of range")));
        }
        if self.signals[id].is_some() {
            return Err(Error::AlreadyExists);
        }
        let source_defined =
            (signal.source_id as usize) < format::SOURCE_COUNT && self.sources_defined[signal.source_id as usize];
        let (signal, warnings) = signal::validate_and_clamp(signal, source_defined)?;
        for w in &warnings {
            eprintln!("jls: warning: {w}");
        }

        let payload = encode_signal_def_payload(&signal);
        let meta = format::pack_meta(signal.signal_id, 0);
        let header = ChunkHeader::new(TAG_SIGNAL_DEF, meta, payload.len() as u32, 0);
        self.signal_list.append(&mut self.raw, header, &payload)?;

        let mut state = Box::new(SignalState {
            signal: signal.clone(),
            fsr: None,
            vsr: None,
            annotation: None,
            utc: None,
            fsr_buffer: Vec::new(),
            fsr_buffer_start: 0,
            fsr_next_sample_id: 0,
        });

        for &track_type in signal.tracks() {
            let track = TrackState::new(&mut self.raw, &mut self.signal_list, track_type, signal.signal_id)?;
            match track_type {
                TrackType::Fsr => state.fsr = Some(track),
                TrackType::Vsr => state.vsr = Some(track),
                TrackType::Annotation => state.annotation = Some(track),
                TrackType::Utc => state.utc = Some(track),
            }
        }

        self.signals[id] = Some(state);
        Ok(())
    }

    pub fn user_data(&mut self, user_field: u16, storage_type: StorageType, bytes: &[u8]) -> Result<()> {
        if user_field >= 0x1000 {
            return Err(Error::ParameterInvalid("user_field must fit in 12 bits".into()));
        }
        if storage_type == StorageType::Invalid && !bytes.is_empty() {
            return Err(Error::ParameterInvalid("INVALID storage_type requires an empty payload".into()));
        }

        let payload: Vec<u8> = match storage_type {
            StorageType::String | StorageType::Json => {
                let mut v = Vec::with_capacity(bytes.len() + 1);
                v.extend_from_slice(bytes);
                v.push(0);
                v
            }
            _ => bytes.to_vec(),
        };

        let meta = format::pack_meta(user_field, storage_type as u8);
        let header = ChunkHeader::new(TAG_USER_DATA, meta, payload.len() as u32, 0);
        self.user_data_list.append(&mut self.raw, header, &payload)?;
        Ok(())
    }

    pub fn fsr_f32(&mut self, signal_id: u16, sample_id: u64, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let idx = signal_id as usize;
        if idx >= format::SIGNAL_COUNT {
            return Err(Error::ParameterInvalid(format!("signal_id {idx} out of range")));
        }

        let (samples_per_data, sample_decimate_factor, entries_per_summary, summary_decimate_factor) = {
            let state = self.signals[idx].as_ref().ok_or(Error::NotFound)?;
            if state.signal.signal_type != SignalType::Fsr {
                return Err(Error::ParameterInvalid("fsr_f32 requires an FSR signal".into()));
            }
            (
                state.signal.samples_per_data,
                state.signal.sample_decimate_factor,
                state.signal.entries_per_summary,
                state.signal.summary_decimate_factor,
            )
        };

        let state = self.signals[idx].as_mut().ok_or(Error::NotFound)?;
        if state.fsr_next_sample_id != sample_id {
            return Err(Error::ParameterInvalid(format!(
                "fsr_f32: expected contiguous sample_id {}, got {}",
                state.fsr_next_sample_id, sample_id
            )));
        }

        let mut remaining = samples;
        while !remaining.is_empty() {
            let space = samples_per_data as usize - state.fsr_buffer.len();
            let take = space.min(remaining.len());
            if state.fsr_buffer.is_empty() {
                state.fsr_buffer_start = state.fsr_next_sample_id;
            }
            state.fsr_buffer.extend_from_slice(&remaining[..take]);
            state.fsr_next_sample_id += take as u64;
            remaining = &remaining[take..];

            if state.fsr_buffer.len() == samples_per_data as usize {
                let buffer_start = state.fsr_buffer_start;
                let buffer = std::mem::take(&mut state.fsr_buffer);
                let track = state.fsr.as_mut().expect("FSR signal always owns an FSR track");
                flush_fsr_data(
                    &mut self.raw,
                    track,
                    buffer_start,
                    &buffer,
                    sample_decimate_factor,
                    entries_per_summary,
                    summary_decimate_factor,
                )?;
            }
        }
        // NOTE: this loop runs to exhaustion regardless of how many chunks
        // it takes to flush `samples` — it must not return after the first.
        Ok(())
    }

    pub fn fsr_annotation(
        &mut self,
        signal_id: u16,
        timestamp: i64,
        annotation_type: u8,
        storage_type: StorageType,
        bytes: &[u8],
    ) -> Result<()> {
        self.write_annotation(signal_id, SignalType::Fsr, timestamp, annotation_type, storage_type, bytes)
    }

    pub fn vsr_annotation(
        &mut self,
        signal_id: u16,
        timestamp: i64,
        annotation_type: u8,
        storage_type: StorageType,
        bytes: &[u8],
    ) -> Result<()> {
        self.write_annotation(signal_id, SignalType::Vsr, timestamp, annotation_type, storage_type, bytes)
    }

    fn write_annotation(
        &mut self,
        signal_id: u16,
        expected_type: SignalType,
        timestamp: i64,
        annotation_type: u8,
        storage_type: StorageType,
        bytes: &[u8],
    ) -> Result<()> {
        let idx = signal_id as usize;
        let state = self.signals.get_mut(idx).and_then(|s| s.as_mut()).ok_or(Error::NotFound)?;
        if state.signal.signal_type != expected_type {
            return Err(Error::ParameterInvalid("signal_type mismatch for annotation".into()));
        }
        let track = state
            .annotation
            .as_mut()
            .ok_or_else(|| Error::NotSupported("signal has no ANNOTATION track".into()))?;

        let payload = encode_annotation_payload(timestamp, annotation_type, storage_type, bytes);
        let tag = track_tag(TrackType::Annotation, ChunkKind::Data);
        let meta = format::pack_meta(signal_id, 0);
        let header = ChunkHeader::new(tag, meta, payload.len() as u32, 0);
        let offset = track.data_list.append(&mut self.raw, header, &payload)?;
        track.patch_head_level(&mut self.raw, 0, offset)?;
        Ok(())
    }

    pub fn fsr_utc(&mut self, signal_id: u16, sample_id: u64, utc: i64) -> Result<()> {
        let idx = signal_id as usize;
        let state = self.signals.get_mut(idx).and_then(|s| s.as_mut()).ok_or(Error::NotFound)?;
        if state.signal.signal_type != SignalType::Fsr {
            return Err(Error::ParameterInvalid("fsr_utc requires an FSR signal".into()));
        }
        let track = state
            .utc
            .as_mut()
            .ok_or_else(|| Error::NotSupported("signal has no UTC track".into()))?;

        let mut payload = Vec::with_capacity(UTC_PAYLOAD_SIZE);
        payload.extend_from_slice(&sample_id.to_le_bytes());
        payload.extend_from_slice(&utc.to_le_bytes());
        let tag = track_tag(TrackType::Utc, ChunkKind::Data);
        let meta = format::pack_meta(signal_id, 0);
        let header = ChunkHeader::new(tag, meta, payload.len() as u32, 0);
        let offset = track.data_list.append(&mut self.raw, header, &payload)?;
        track.patch_head_level(&mut self.raw, 0, offset)?;
        Ok(())
    }

    /// Flush any partial FSR sample buffer as a final short data chunk,
    /// force-flush every level's partial accumulator bottom-up, and hand
    /// back the underlying stream.
    pub fn close(mut self) -> Result<W> {
        for idx in 0..format::SIGNAL_COUNT {
            let Some(state) = self.signals[idx].as_mut() else { continue };
            if state.signal.signal_type != SignalType::Fsr {
                continue;
            }
            let sample_decimate_factor = state.signal.sample_decimate_factor;
            let entries_per_summary = state.signal.entries_per_summary;
            let summary_decimate_factor = state.signal.summary_decimate_factor;

            if !state.fsr_buffer.is_empty() {
                let buffer_start = state.fsr_buffer_start;
                let buffer = std::mem::take(&mut state.fsr_buffer);
                let track = state.fsr.as_mut().expect("FSR signal always owns an FSR track");
                flush_fsr_data(
                    &mut self.raw,
                    track,
                    buffer_start,
                    &buffer,
                    sample_decimate_factor,
                    entries_per_summary,
                    summary_decimate_factor,
                )?;
            }
            if let Some(track) = state.fsr.as_mut() {
                force_flush_all_levels(&mut self.raw, track, summary_decimate_factor)?;
            }
        }
        Ok(self.raw.into_inner())
    }
}

impl Writer<std::fs::File> {
    pub fn create_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Self::create(file)
    }
}

// ── Summarization cascade ────────────────────────────────────────────────────

fn flush_fsr_data<W: Read + Write + Seek>(
    raw: &mut RawWriter<W>,
    track: &mut TrackState,
    sample_id: u64,
    samples: &[f32],
    sample_decimate_factor: u32,
    entries_per_summary: u32,
    summary_decimate_factor: u32,
) -> Result<()> {
    let payload = encode_data_payload(sample_id, samples);
    let tag = track_tag(TrackType::Fsr, ChunkKind::Data);
    let meta = format::pack_meta(track.signal_id, 0);
    let header = ChunkHeader::new(tag, meta, payload.len() as u32, 0);
    let offset = track.data_list.append(raw, header, &payload)?;
    track.patch_head_level(raw, 0, offset)?;

    for (entry, weight, start_idx) in decimate_samples(samples, sample_decimate_factor) {
        let entry_sample_id = (sample_id + start_idx as u64) as i64;
        track.accumulators[1].push(entry, weight, offset, entry_sample_id);
    }

    cascade_flush(raw, track, 1, entries_per_summary, summary_decimate_factor)
}

/// Flush every level at or above `start_level` whose accumulator has
/// reached `entries_per_summary`, promoting decimated entries upward.
fn cascade_flush<W: Read + Write + Seek>(
    raw: &mut RawWriter<W>,
    track: &mut TrackState,
    start_level: usize,
    entries_per_summary: u32,
    summary_decimate_factor: u32,
) -> Result<()> {
    let mut level = start_level;
    while level < SUMMARY_LEVEL_COUNT && track.accumulators[level].len() >= entries_per_summary as usize {
        flush_one_level(raw, track, level, summary_decimate_factor)?;
        level += 1;
    }
    Ok(())
}

/// Flush whatever is in every summary level's accumulator, regardless of
/// whether it has reached `entries_per_summary` — used by `close`.
fn force_flush_all_levels<W: Read + Write + Seek>(
    raw: &mut RawWriter<W>,
    track: &mut TrackState,
    summary_decimate_factor: u32,
) -> Result<()> {
    for level in 1..SUMMARY_LEVEL_COUNT {
        flush_one_level(raw, track, level, summary_decimate_factor)?;
    }
    Ok(())
}

fn flush_one_level<W: Read + Write + Seek>(
    raw: &mut RawWriter<W>,
    track: &mut TrackState,
    level: usize,
    summary_decimate_factor: u32,
) -> Result<()> {
    if track.accumulators[level].is_empty() {
        return Ok(());
    }
    let (first_sample_id, entries, weights, child_offsets) = track.accumulators[level].drain();

    let summary_payload = encode_summary_payload(first_sample_id, &entries);
    let summary_tag = track_tag(track.track_type, ChunkKind::Summary);
    let meta = format::pack_meta(track.signal_id, level as u8);
    let summary_header = ChunkHeader::new(summary_tag, meta, summary_payload.len() as u32, 0);
    track.summary_lists[level].append(raw, summary_header, &summary_payload)?;

    let index_payload = encode_index_payload(first_sample_id, &child_offsets);
    let index_tag = track_tag(track.track_type, ChunkKind::Index);
    let index_header = ChunkHeader::new(index_tag, meta, index_payload.len() as u32, 0);
    let index_offset = track.index_lists[level].append(raw, index_header, &index_payload)?;

    track.patch_head_level(raw, level, index_offset)?;

    if level + 1 < SUMMARY_LEVEL_COUNT {
        let mut cursor = first_sample_id;
        for (entry, weight) in decimate_entries(&entries, &weights, summary_decimate_factor) {
            track.accumulators[level + 1].push(entry, weight, index_offset, cursor);
            cursor += weight as i64;
        }
    }
    Ok(())
}

fn decimate_samples(samples: &[f32], factor: u32) -> Vec<(SummaryEntry, u64, usize)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < samples.len() {
        let end = (i + factor as usize).min(samples.len());
        out.push((summary::summarize(&samples[i..end]), (end - i) as u64, i));
        i = end;
    }
    out
}

fn decimate_entries(entries: &[SummaryEntry], weights: &[u64], factor: u32) -> Vec<(SummaryEntry, u64)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        let end = (i + factor as usize).min(entries.len());
        let mut acc = entries[i];
        let mut n = weights[i];
        for j in i + 1..end {
            let (combined, combined_n) = summary::combine(acc, n, entries[j], weights[j]);
            acc = combined;
            n = combined_n;
        }
        out.push((acc, n));
        i = end;
    }
    out
}

// ── Payload encoding ─────────────────────────────────────────────────────────

fn encode_head_payload(offsets: &[u64; SUMMARY_LEVEL_COUNT]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TRACK_HEAD_PAYLOAD_SIZE);
    for o in offsets {
        buf.extend_from_slice(&o.to_le_bytes());
    }
    buf
}

fn encode_source_def_payload(source: &Source) -> Vec<u8> {
    let mut buf = vec![0u8; SOURCE_DEF_RESERVED];
    format::push_terminated_string(&mut buf, &source.name);
    format::push_terminated_string(&mut buf, &source.vendor);
    format::push_terminated_string(&mut buf, &source.model);
    format::push_terminated_string(&mut buf, &source.version);
    format::push_terminated_string(&mut buf, &source.serial_number);
    buf
}

fn encode_signal_def_payload(signal: &Signal) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SIGNAL_DEF_FIXED_SIZE + signal.name.len() + signal.si_units.len() + 4);
    buf.extend_from_slice(&signal.source_id.to_le_bytes());
    buf.push(signal.signal_type as u8);
    buf.push(signal.data_type as u8);
    buf.extend_from_slice(&signal.sample_rate.to_le_bytes());
    buf.extend_from_slice(&signal.samples_per_data.to_le_bytes());
    buf.extend_from_slice(&signal.sample_decimate_factor.to_le_bytes());
    buf.extend_from_slice(&signal.entries_per_summary.to_le_bytes());
    buf.extend_from_slice(&signal.summary_decimate_factor.to_le_bytes());
    buf.extend_from_slice(&signal.utc_rate_auto.to_le_bytes());
    format::push_terminated_string(&mut buf, &signal.name);
    format::push_terminated_string(&mut buf, &signal.si_units);
    buf
}

fn encode_data_payload(sample_id: u64, samples: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + samples.len() * 4);
    buf.extend_from_slice(&sample_id.to_le_bytes());
    buf.extend_from_slice(&(samples.len() as u64).to_le_bytes());
    for s in samples {
        buf.extend_from_slice(&s.to_le_bytes());
    }
    buf
}

fn encode_summary_payload(first_sample_id: i64, entries: &[SummaryEntry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + entries.len() * 16);
    buf.extend_from_slice(&first_sample_id.to_le_bytes());
    buf.extend_from_slice(&(entries.len() as i64).to_le_bytes());
    for e in entries {
        buf.extend_from_slice(&e.min.to_le_bytes());
        buf.extend_from_slice(&e.max.to_le_bytes());
        buf.extend_from_slice(&e.mean.to_le_bytes());
        buf.extend_from_slice(&e.variance.to_le_bytes());
    }
    buf
}

fn encode_index_payload(first_sample_id: i64, offsets: &[u64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + offsets.len() * 8);
    buf.extend_from_slice(&first_sample_id.to_le_bytes());
    buf.extend_from_slice(&(offsets.len() as i64).to_le_bytes());
    for o in offsets {
        buf.extend_from_slice(&(*o as i64).to_le_bytes());
    }
    buf
}

fn encode_annotation_payload(timestamp: i64, annotation_type: u8, storage_type: StorageType, bytes: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ANNOTATION_HEADER_SIZE + bytes.len());
    buf.extend_from_slice(&timestamp.to_le_bytes());
    buf.push(annotation_type);
    buf.push(storage_type as u8);
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Reader;
    use std::io::Cursor;

    fn open_writer() -> Writer<Cursor<Vec<u8>>> {
        Writer::create(Cursor::new(Vec::new())).unwrap()
    }

    #[test]
    fn empty_file_has_sentinel_source0_signal0() {
        let w = open_writer();
        let buf = w.raw.into_inner().into_inner();
        let mut r = Reader::open(Cursor::new(buf)).unwrap();
        assert_eq!(r.sources().len(), 1);
        assert_eq!(r.signals().len(), 1);
        assert!(matches!(r.fsr_length(0), Err(Error::NotSupported(_))));
    }

    #[test]
    fn duplicate_source_rejected() {
        let mut w = open_writer();
        let src = Source {
            source_id: 5,
            name: "a".into(),
            vendor: "b".into(),
            model: "c".into(),
            version: "d".into(),
            serial_number: "e".into(),
        };
        w.source_def(src.clone()).unwrap();
        assert!(matches!(w.source_def(src), Err(Error::AlreadyExists)));
    }

    #[test]
    fn fsr_f32_writes_multiple_chunks_without_early_return() {
        let mut w = open_writer();
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

        let samples: Vec<f32> = (0..350).map(|i| i as f32).collect();
        w.fsr_f32(1, 0, &samples).unwrap();
        w.close().unwrap();
    }
}
