use crate::types::{Sector, TrackRecord};

/// The seam between the core and the physical drive. An implementor owns
/// whatever context it needs (GPIO handles, a simulated medium, an open
/// file) - there is no static/global state anywhere in this crate, per the
/// "global state in the drive context" design note.
pub trait DriveIo {
    /// Fills in `sector.data` and `sector.valid`. The caller has already set
    /// `track`/`side`/`sector_n` on `sector`.
    fn read(&mut self, sector: &mut Sector) -> bool;

    /// Writes all 18 sectors of `track`.
    fn write(&mut self, track: &TrackRecord) -> bool;

    fn disk_changed(&mut self) -> bool;

    fn write_protected(&mut self) -> bool;
}
