use crate::geometry::{SECTORS_PER_TRACK, SECTOR_SIZE};

/// One 512-byte logical sector plus the metadata needed to address it.
/// `valid` means "CRC matched at decode time" - it is `false`, not an error,
/// when a data record's CRC did not verify.
#[derive(Clone, Copy, Debug)]
pub struct Sector {
    pub track: u8,
    pub side: u8,
    pub sector_n: u8,
    pub size_code: u8,
    pub data: [u8; SECTOR_SIZE],
    pub valid: bool,
}

impl Default for Sector {
    fn default() -> Self {
        Sector {
            track: 0,
            side: 0,
            sector_n: 1,
            size_code: 2,
            data: [0u8; SECTOR_SIZE],
            valid: false,
        }
    }
}

impl Sector {
    pub fn new(track: u8, side: u8, sector_n: u8) -> Self {
        Sector {
            track,
            side,
            sector_n,
            ..Default::default()
        }
    }
}

/// The unit of write I/O: exactly 18 sectors belonging to one (cylinder,
/// side) pair, because the medium is written a track at a time.
#[derive(Clone, Copy, Debug)]
pub struct TrackRecord {
    pub cylinder: u8,
    pub side: u8,
    pub sectors: [Sector; SECTORS_PER_TRACK],
}

impl TrackRecord {
    pub fn empty(cylinder: u8, side: u8) -> Self {
        TrackRecord {
            cylinder,
            side,
            sectors: [Sector::default(); SECTORS_PER_TRACK],
        }
    }
}
