use super::{ISO_DAM, ISO_IDAM};
use crate::crc16;
use crate::geometry::{LONG, MEDIUM, OVERHEAD, SECTOR_SIZE, SHORT};
use crate::types::Sector;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum PulseClass {
    Short,
    Medium,
    Long,
}

impl PulseClass {
    fn half_cells(self) -> u8 {
        match self {
            PulseClass::Short => 2,
            PulseClass::Medium => 3,
            PulseClass::Long => 4,
        }
    }

    fn nominal(self) -> f32 {
        match self {
            PulseClass::Short => SHORT as f32,
            PulseClass::Medium => MEDIUM as f32,
            PulseClass::Long => LONG as f32,
        }
    }

    /// Nominal length in the raw, pre-`OVERHEAD`-subtraction domain (the
    /// domain the 1.25x/1.75x classification thresholds are defined in).
    fn nominal_raw(self) -> f32 {
        self.nominal() + OVERHEAD as f32
    }
}

use PulseClass::{Long as L, Medium as M, Short as S};

const SYNC_PATTERN: [PulseClass; 15] = [M, L, M, L, M, S, L, M, L, M, S, L, M, L, M];

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    Hunt,
    AwaitingMark,
    CollectingAddr,
    CollectingData,
}

#[derive(Clone, Copy, Debug)]
struct Header {
    track: u8,
    side: u8,
    sector_n: u8,
}

pub enum DecodeEvent {
    Sector(Sector),
}

/// Accepts a raw pulse-interval stream and emits completed `Sector`s. A
/// missed sync is not fatal - the decoder just stays in `Hunt`. A CRC-bad
/// data record is still emitted, with `valid = false`, so callers can retry
/// on the next revolution. A data record with no preceding address record
/// is dropped silently.
///
/// One decoder instance is meant to consume one track's worth of interval
/// stream at a time (`reset` between tracks/revolutions) - this is what
/// gives the "address-to-data proximity within one track" check its
/// meaning: as long as the caller feeds one track at a time, a provisional
/// header can only ever pair with a data record from the same track.
pub struct MfmDecoder {
    short_est: f32,
    history: [PulseClass; 15],
    state: State,
    half_cell_idx: u8,
    byte_acc: u8,
    scratch: [u8; SECTOR_SIZE + 2],
    scratch_len: usize,
    scratch_target: usize,
    provisional_header: Option<Header>,
}

impl Default for MfmDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MfmDecoder {
    pub fn new() -> Self {
        MfmDecoder {
            // Tracked in the raw, pre-`OVERHEAD`-subtraction domain (48 for
            // a nominal short cell), since that's the domain the 1.25x/1.75x
            // classification thresholds are defined in.
            short_est: SHORT as f32 + OVERHEAD as f32,
            history: [S; 15],
            state: State::Hunt,
            half_cell_idx: 0,
            byte_acc: 0,
            scratch: [0u8; SECTOR_SIZE + 2],
            scratch_len: 0,
            scratch_target: 0,
            provisional_header: None,
        }
    }

    /// Resets all state for a new decode session, as the `mfm_t` ownership
    /// note requires between revolutions/tracks.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn classify(&self, delta: u8) -> PulseClass {
        // `delta` arrives with `OVERHEAD` already subtracted; add it back so
        // the comparison happens in the same raw-tick domain `short_est` is
        // tracked in (and the domain the 1.25x/1.75x factors are defined in).
        let raw = delta as f32 + OVERHEAD as f32;
        let t1 = self.short_est * 1.25;
        let t2 = self.short_est * 1.75;
        if raw < t1 {
            PulseClass::Short
        } else if raw < t2 {
            PulseClass::Medium
        } else {
            PulseClass::Long
        }
    }

    fn update_estimate(&mut self, delta: u8, class: PulseClass) {
        const ALPHA: f32 = 0.25;
        let raw = delta as f32 + OVERHEAD as f32;
        let implied_short = raw * (SHORT as f32 + OVERHEAD as f32) / class.nominal_raw();
        self.short_est = self.short_est * (1.0 - ALPHA) + implied_short * ALPHA;
    }

    fn push_history(&mut self, class: PulseClass) {
        self.history.copy_within(1.., 0);
        self.history[14] = class;
    }

    /// Feed one pulse-interval delta. Returns `Some` exactly when a data
    /// record (valid or not) has just completed.
    pub fn feed(&mut self, delta: u8) -> Option<DecodeEvent> {
        let class = self.classify(delta);
        self.update_estimate(delta, class);
        self.push_history(class);

        if self.state == State::Hunt {
            if self.history == SYNC_PATTERN {
                self.state = State::AwaitingMark;
                self.half_cell_idx = 0;
                self.byte_acc = 0;
            }
            return None;
        }

        let n = class.half_cells();
        let mut event = None;
        for i in 0..n {
            let bit = i == n - 1;
            if self.half_cell_idx & 1 == 1 {
                self.byte_acc = (self.byte_acc << 1) | (bit as u8);
            }
            self.half_cell_idx += 1;
            if self.half_cell_idx == 16 {
                self.half_cell_idx = 0;
                event = self.handle_byte(self.byte_acc);
            }
        }
        event
    }

    fn handle_byte(&mut self, byte: u8) -> Option<DecodeEvent> {
        match self.state {
            State::Hunt => None,
            State::AwaitingMark => {
                match byte {
                    ISO_IDAM => {
                        self.state = State::CollectingAddr;
                        self.scratch_len = 0;
                        self.scratch_target = 6; // track, side, sector_n, size_code, crc_hi, crc_lo
                    }
                    ISO_DAM => {
                        self.state = State::CollectingData;
                        self.scratch_len = 0;
                        self.scratch_target = SECTOR_SIZE + 2;
                    }
                    _ => self.state = State::Hunt,
                }
                None
            }
            State::CollectingAddr => {
                self.scratch[self.scratch_len] = byte;
                self.scratch_len += 1;
                if self.scratch_len == self.scratch_target {
                    let mut crc = crc16::seeded(ISO_IDAM);
                    crc.update(&self.scratch[0..4]);
                    crc.update(&self.scratch[4..6]);
                    if crc.get() == 0 {
                        self.provisional_header = Some(Header {
                            track: self.scratch[0],
                            side: self.scratch[1],
                            sector_n: self.scratch[2],
                        });
                    } else {
                        self.provisional_header = None;
                    }
                    self.state = State::Hunt;
                }
                None
            }
            State::CollectingData => {
                self.scratch[self.scratch_len] = byte;
                self.scratch_len += 1;
                if self.scratch_len == self.scratch_target {
                    let mut crc = crc16::seeded(ISO_DAM);
                    crc.update(&self.scratch[0..SECTOR_SIZE]);
                    crc.update(&self.scratch[SECTOR_SIZE..SECTOR_SIZE + 2]);
                    let crc_ok = crc.get() == 0;
                    self.state = State::Hunt;

                    let header = self.provisional_header.take();
                    return header.map(|h| {
                        let mut sector = Sector::new(h.track, h.side, h.sector_n);
                        sector.data.copy_from_slice(&self.scratch[0..SECTOR_SIZE]);
                        sector.valid = crc_ok;
                        DecodeEvent::Sector(sector)
                    });
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mfm::EncodeBuf;

    fn decode_all(intervals: &[u8]) -> heapless::Vec<Sector, 32> {
        let mut dec = MfmDecoder::new();
        let mut out: heapless::Vec<Sector, 32> = heapless::Vec::new();
        for &d in intervals {
            if let Some(DecodeEvent::Sector(s)) = dec.feed(d) {
                let _ = out.push(s);
            }
        }
        out
    }

    #[test]
    fn round_trips_a_single_sector() {
        let mut buf = [0u8; 8192];
        let mut enc = EncodeBuf::new(&mut buf);
        let mut data = [0u8; SECTOR_SIZE];
        for (i, b) in data.iter_mut().enumerate() {
            *b = i as u8;
        }
        enc.encode_sector(0, 0, 1, &data);
        assert!(!enc.overflow());

        let sectors = decode_all(enc.as_slice());
        assert_eq!(sectors.len(), 1);
        assert!(sectors[0].valid);
        assert_eq!(sectors[0].track, 0);
        assert_eq!(sectors[0].side, 0);
        assert_eq!(sectors[0].sector_n, 1);
        assert_eq!(&sectors[0].data[..], &data[..]);
    }

    #[test]
    fn corrupted_data_crc_is_reported_invalid() {
        let mut buf = [0u8; 8192];
        let mut enc = EncodeBuf::new(&mut buf);
        let data = [0x5Au8; SECTOR_SIZE];
        enc.encode_sector(3, 1, 7, &data);

        let mut corrupted: heapless::Vec<u8, 8192> = heapless::Vec::new();
        for &p in enc.as_slice() {
            let _ = corrupted.push(p);
        }
        // flip one interval deep inside the data field
        let idx = corrupted.len() - 40;
        corrupted[idx] = corrupted[idx].wrapping_add(20);

        let sectors = decode_all(&corrupted);
        assert_eq!(sectors.len(), 1);
        assert!(!sectors[0].valid);
    }

    #[test]
    fn data_without_address_is_dropped() {
        let mut buf = [0u8; 8192];
        let mut enc = EncodeBuf::new(&mut buf);
        // Encode only a bare data record (no address record ahead of it).
        enc.encode_sync();
        enc.encode_byte(ISO_DAM);
        let data = [0u8; SECTOR_SIZE];
        enc.encode_bytes(&data);
        let mut crc = crc16::seeded(ISO_DAM);
        crc.update(&data);
        enc.encode_bytes(&crc.get().to_be_bytes());

        let sectors = decode_all(enc.as_slice());
        assert!(sectors.is_empty());
    }
}
