//! Replays a stored flux-timing stream (real SuperCard Pro captures, or a
//! buffer built directly from `fluxfat`'s own encoder) with optional
//! injected jitter and drift, for exercising the decoder host-side.

use anyhow::{ensure, Context};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use fluxfat::geometry::OVERHEAD;
use std::io::{Cursor, Read, Seek, SeekFrom};

const SCP_MAGIC: &[u8; 3] = b"SCP";
const TRACK_TABLE_OFFSET: u64 = 0x10;
const TRACK_TABLE_SLOTS: usize = 160;

/// One decoded revolution: the pulse-interval stream in raw capture ticks
/// (resolution applied, `OVERHEAD` still included).
pub struct Revolution {
    pub intervals: Vec<u32>,
}

/// Parses the flux table for a single track out of an SCP image buffer.
/// Only what the simulator itself consumes: magic, revolution count, track
/// range, resolution, the per-track offset table, and overflow-continued
/// 16-bit big-endian flux samples.
pub struct ScpImage {
    pub revolution_count: u8,
    pub track_range: (u8, u8),
    pub resolution: u8,
    raw: Vec<u8>,
    track_offsets: [u32; TRACK_TABLE_SLOTS],
}

impl ScpImage {
    pub fn parse(raw: &[u8]) -> anyhow::Result<Self> {
        ensure!(raw.len() >= 0x10 + TRACK_TABLE_SLOTS * 4, "truncated SCP header");
        ensure!(&raw[0..3] == SCP_MAGIC, "bad SCP magic");

        let revolution_count = raw[5];
        let track_range = (raw[6], raw[7]);
        let resolution = raw[9];

        let mut cursor = Cursor::new(raw);
        cursor.seek(SeekFrom::Start(TRACK_TABLE_OFFSET))?;
        let mut track_offsets = [0u32; TRACK_TABLE_SLOTS];
        for slot in track_offsets.iter_mut() {
            *slot = cursor
                .read_u32::<LittleEndian>()
                .context("reading track offset table")?;
        }

        Ok(ScpImage {
            revolution_count,
            track_range,
            resolution,
            raw: raw.to_vec(),
            track_offsets,
        })
    }

    /// Reads every revolution recorded for `track_slot` (0..159, matching
    /// the physical track-table index, not a cylinder number).
    pub fn track_revolutions(&self, track_slot: usize) -> anyhow::Result<Vec<Revolution>> {
        let offset = *self
            .track_offsets
            .get(track_slot)
            .context("track slot out of range")?;
        if offset == 0 {
            return Ok(Vec::new());
        }

        let mut cursor = Cursor::new(&self.raw[..]);
        cursor.seek(SeekFrom::Start(offset as u64))?;
        let mut tag = [0u8; 3];
        cursor.read_exact(&mut tag)?;
        ensure!(&tag == b"TRK", "missing TRK tag");
        let _track_number = cursor.read_u8()?;

        let mut revolutions = Vec::with_capacity(self.revolution_count as usize);
        for _ in 0..self.revolution_count {
            let _duration = cursor.read_u32::<LittleEndian>()?;
            let flux_count = cursor.read_u32::<LittleEndian>()?;
            let data_offset = cursor.read_u32::<LittleEndian>()?;

            let mut data_cursor = Cursor::new(&self.raw[..]);
            data_cursor.seek(SeekFrom::Start(offset as u64 + data_offset as u64))?;

            let mut intervals = Vec::with_capacity(flux_count as usize);
            let mut accumulator: u32 = 0;
            for _ in 0..flux_count {
                let sample = data_cursor.read_u16::<BigEndian>()?;
                if sample == 0 {
                    accumulator += 65536;
                    continue;
                }
                intervals.push(accumulator + sample as u32);
                accumulator = 0;
            }
            revolutions.push(Revolution { intervals });
        }
        Ok(revolutions)
    }
}

/// Converts a raw SCP tick count to our PIO-clock time base:
/// `(total * (resolution+1) * 3 + 2) / 5`.
pub fn scp_ticks_to_pio_units(total: u32, resolution: u8) -> u32 {
    (total * (resolution as u32 + 1) * 3 + 2) / 5
}

/// A small linear congruential generator matching the one named for replay
/// jitter: `seed = seed*1103515245 + 12345`.
pub struct Lcg {
    seed: u32,
}

impl Lcg {
    pub fn new(seed: u32) -> Self {
        Lcg { seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.seed = self.seed.wrapping_mul(1103515245).wrapping_add(12345);
        self.seed
    }

    /// A bounded uniform deviate in `[-bound, bound]`.
    pub fn bounded(&mut self, bound: i32) -> i32 {
        if bound <= 0 {
            return 0;
        }
        let span = (2 * bound + 1) as u32;
        ((self.next_u32() >> 8) % span) as i32 - bound
    }
}

/// Replays a pulse-interval stream with optional jitter and drift, and
/// converts it down to the `OVERHEAD`-subtracted `u8` domain `MfmDecoder`
/// expects.
pub struct FluxSimulator {
    intervals: Vec<u32>,
    position: usize,
    rng: Lcg,
    jitter_units: u32,
    drift_ppm: i64,
}

impl FluxSimulator {
    pub fn new(intervals: Vec<u32>) -> Self {
        FluxSimulator {
            intervals,
            position: 0,
            rng: Lcg::new(0xACE1),
            jitter_units: 0,
            drift_ppm: 0,
        }
    }

    /// Builds a simulator directly from an encoder's pulse-interval buffer,
    /// adding `OVERHEAD` back so the stored values are in the same raw-tick
    /// domain as a real capture.
    pub fn from_encoder_buffer(buf: &[u8]) -> Self {
        let intervals = buf.iter().map(|&b| b as u32 + OVERHEAD as u32).collect();
        Self::new(intervals)
    }

    pub fn from_scp_revolution(rev: &Revolution, resolution: u8) -> Self {
        let intervals = rev
            .intervals
            .iter()
            .map(|&t| scp_ticks_to_pio_units(t, resolution))
            .collect();
        Self::new(intervals)
    }

    pub fn with_jitter(mut self, units: u32) -> Self {
        self.jitter_units = units;
        self
    }

    pub fn with_drift_ppm(mut self, ppm: i64) -> Self {
        self.drift_ppm = ppm;
        self
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Returns the next interval in the `OVERHEAD`-subtracted `u8` domain,
    /// with drift and jitter applied, or `None` at the end of the stream.
    pub fn next_delta(&mut self) -> Option<u8> {
        let raw = *self.intervals.get(self.position)?;
        self.position += 1;

        let drifted = (raw as i64 * (1_000_000 + self.drift_ppm)) / 1_000_000;
        let jittered = drifted + self.rng.bounded(self.jitter_units as i32) as i64;
        let overhead_removed = jittered - OVERHEAD as i64;

        Some(overhead_removed.clamp(0, u8::MAX as i64) as u8)
    }
}

/// Builds a minimal single-revolution SCP container around a single track's
/// raw-tick interval stream - enough for `ScpImage::parse` to read back.
/// Real captures are a collaborator (`OVERHEAD` of this crate, not produced
/// here); this is only for exercising the parser and simulator together
/// without one on hand.
pub fn build_single_track_scp(track_slot: usize, raw_intervals: &[u32]) -> Vec<u8> {
    let mut out = vec![0u8; 0x10 + TRACK_TABLE_SLOTS * 4];
    out[0..3].copy_from_slice(SCP_MAGIC);
    out[5] = 1; // one revolution
    out[6] = track_slot as u8;
    out[7] = track_slot as u8;
    out[9] = 0; // resolution 0 => 25ns ticks

    let track_header_offset = out.len() as u32;
    out[0x10 + track_slot * 4..0x10 + track_slot * 4 + 4]
        .copy_from_slice(&track_header_offset.to_le_bytes());

    out.extend_from_slice(b"TRK");
    out.push(track_slot as u8);

    let duration: u32 = raw_intervals.iter().sum();
    let flux_count = raw_intervals.len() as u32;
    // Relative to the TRK header start: 4 bytes of tag+track-number, plus
    // one 12-byte revolution record ahead of the flux data itself.
    let data_offset = 16u32;
    out.extend_from_slice(&duration.to_le_bytes());
    out.extend_from_slice(&flux_count.to_le_bytes());
    out.extend_from_slice(&data_offset.to_le_bytes());

    for &interval in raw_intervals {
        // None of our intervals are large enough to need overflow
        // continuation, so a plain big-endian 16-bit sample suffices.
        out.extend_from_slice(&(interval as u16).to_be_bytes());
    }

    out
}
