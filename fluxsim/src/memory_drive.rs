//! `DriveIo` implementations used only to drive tests: a plain in-memory
//! medium, and a variant that additionally round-trips every write through
//! the MFM encoder/decoder so FAT12-level tests also exercise the codec.

use fluxfat::geometry::{CYLINDERS, SECTORS_PER_TRACK, SIDES};
use fluxfat::mfm::{DecodeEvent, EncodeBuf, MfmDecoder};
use fluxfat::{DriveIo, Sector, TrackRecord};

/// A flat in-memory medium: writes land directly, no codec involved.
pub struct MemoryDrive {
    tracks: Vec<Vec<TrackRecord>>,
    pub disk_changed: bool,
    pub write_protected: bool,
}

impl MemoryDrive {
    pub fn new() -> Self {
        let mut tracks = Vec::with_capacity(CYLINDERS);
        for cyl in 0..CYLINDERS {
            let mut sides = Vec::with_capacity(SIDES);
            for side in 0..SIDES {
                sides.push(TrackRecord::empty(cyl as u8, side as u8));
            }
            tracks.push(sides);
        }
        MemoryDrive {
            tracks,
            disk_changed: false,
            write_protected: false,
        }
    }
}

impl Default for MemoryDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl DriveIo for MemoryDrive {
    fn read(&mut self, sector: &mut Sector) -> bool {
        let track = &self.tracks[sector.track as usize][sector.side as usize];
        match track.sectors.iter().find(|s| s.sector_n == sector.sector_n) {
            Some(found) => {
                sector.data = found.data;
                sector.valid = found.valid;
                true
            }
            None => false,
        }
    }

    fn write(&mut self, track: &TrackRecord) -> bool {
        if self.write_protected {
            return false;
        }
        self.tracks[track.cylinder as usize][track.side as usize] = *track;
        true
    }

    fn disk_changed(&mut self) -> bool {
        self.disk_changed
    }

    fn write_protected(&mut self) -> bool {
        self.write_protected
    }
}

/// A medium that serializes every written track through `EncodeBuf` and
/// immediately decodes it back with `MfmDecoder`, storing only sectors
/// that survived the round trip with a valid CRC. Exercises the full
/// encode/decode path underneath ordinary FAT12 traffic.
pub struct FluxRoundTripDrive {
    inner: MemoryDrive,
}

impl FluxRoundTripDrive {
    pub fn new() -> Self {
        FluxRoundTripDrive {
            inner: MemoryDrive::new(),
        }
    }
}

impl Default for FluxRoundTripDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl DriveIo for FluxRoundTripDrive {
    fn read(&mut self, sector: &mut Sector) -> bool {
        self.inner.read(sector)
    }

    fn write(&mut self, track: &TrackRecord) -> bool {
        if self.inner.write_protected {
            return false;
        }

        let mut buf = vec![0u8; 32 * 1024];
        let mut enc = EncodeBuf::new(&mut buf);
        enc.encode_track(track);
        if enc.overflow() {
            return false;
        }

        let mut decoded = TrackRecord::empty(track.cylinder, track.side);
        let mut filled = [false; SECTORS_PER_TRACK];
        let mut dec = MfmDecoder::new();
        for &delta in enc.as_slice() {
            if let Some(DecodeEvent::Sector(s)) = dec.feed(delta) {
                let idx = (s.sector_n - 1) as usize;
                if idx < SECTORS_PER_TRACK {
                    decoded.sectors[idx] = s;
                    filled[idx] = true;
                }
            }
        }

        for (i, slot) in decoded.sectors.iter_mut().enumerate() {
            if !filled[i] {
                *slot = Sector::new(track.cylinder, track.side, (i + 1) as u8);
            }
        }

        self.inner.write(&decoded)
    }

    fn disk_changed(&mut self) -> bool {
        self.inner.disk_changed()
    }

    fn write_protected(&mut self) -> bool {
        self.inner.write_protected()
    }
}
