use crate::geometry::SECTOR_SIZE;

const BATCH_CAPACITY: usize = 64;

/// Fixed-capacity mapping from LBA to a dirty 512-byte image. Every read in
/// `Fat12` goes through `read`, so a pending write is always visible to a
/// subsequent read within the same batch (read-your-writes) without the
/// caller having to special-case it.
pub struct WriteBatch {
    entries: heapless::Vec<(u32, [u8; SECTOR_SIZE]), BATCH_CAPACITY>,
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch {
            entries: heapless::Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces any existing entry for `lba`. Returns `Err(())` if the
    /// batch is full and `lba` is not already present.
    pub fn add(&mut self, lba: u32, data: [u8; SECTOR_SIZE]) -> Result<(), ()> {
        if let Some(slot) = self.entries.iter_mut().find(|(l, _)| *l == lba) {
            slot.1 = data;
            return Ok(());
        }
        self.entries.push((lba, data)).map_err(|_| ())
    }

    pub fn read(&self, lba: u32) -> Option<&[u8; SECTOR_SIZE]> {
        self.entries.iter().find(|(l, _)| *l == lba).map(|(_, d)| d)
    }

    /// Any pending LBA, for the flush loop to pick a track to drain.
    pub fn peek_any(&self) -> Option<u32> {
        self.entries.first().map(|(l, _)| *l)
    }

    /// Removes and returns the pending image for `lba`, if any.
    pub fn take(&mut self, lba: u32) -> Option<[u8; SECTOR_SIZE]> {
        let pos = self.entries.iter().position(|(l, _)| *l == lba)?;
        Some(self.entries.swap_remove(pos).1)
    }
}
