mod batch;
mod bpb;
mod dir;

pub use batch::WriteBatch;
pub use bpb::Bpb;
pub use dir::{DirEntry, Dirent};

use crate::drive::DriveIo;
use crate::error::{Error, Result};
use crate::geometry::{SECTORS_PER_TRACK, SECTOR_SIZE};
use crate::types::{Sector, TrackRecord};

const EOC: u16 = 0xFFF;
const BAD_CLUSTER: u16 = 0xFF7;
const FIRST_DATA_CLUSTER: u16 = 2;

fn lba_to_chs(lba: u32, heads: u32, spt: u32) -> (u8, u8, u8) {
    let cyl = lba / (heads * spt);
    let head = (lba % (heads * spt)) / spt;
    let sec = (lba % spt) + 1;
    (cyl as u8, head as u8, sec as u8)
}

/// Mount state plus the one scratch buffer and at most one active write
/// batch `fat12_t` is specified to own.
pub struct Fat12<D: DriveIo> {
    drive: D,
    bpb: Bpb,
    scratch: [u8; SECTOR_SIZE],
    batch: WriteBatch,
    batch_in_use: bool,
}

/// Open file handle for reading, per §4.4: `{start_cluster, file_size,
/// bytes_read, current_cluster}`.
pub struct ReadFile {
    start_cluster: u16,
    file_size: u32,
    bytes_read: u32,
    current_cluster: u16,
    in_cluster_offset: usize,
}

/// Open file handle for writing. Append-only; tracks the first cluster for
/// the directory entry written back at `close`.
pub struct WriteFile {
    name: [u8; 11],
    dir_lba: u32,
    dir_index: usize,
    first_cluster: u16,
    current_cluster: u16,
    bytes_written: u32,
    in_cluster_offset: usize,
}

impl<D: DriveIo> Fat12<D> {
    pub fn mount(mut drive: D) -> Result<Self> {
        let mut sector0 = Sector::new(0, 0, 1);
        if !drive.read(&mut sector0) {
            return Err(Error::Read);
        }
        let bpb = Bpb::parse(&sector0.data)?;

        Ok(Fat12 {
            drive,
            bpb,
            scratch: [0u8; SECTOR_SIZE],
            batch: WriteBatch::new(),
            batch_in_use: false,
        })
    }

    pub fn bpb(&self) -> &Bpb {
        &self.bpb
    }

    fn read_lba(&mut self, lba: u32) -> Result<()> {
        if let Some(bytes) = self.batch.read(lba) {
            self.scratch.copy_from_slice(bytes);
            return Ok(());
        }

        let (cyl, head, sec) = lba_to_chs(lba, self.bpb.heads as u32, self.bpb.sectors_per_track as u32);
        let mut sector = Sector::new(cyl, head, sec);
        if !self.drive.read(&mut sector) {
            return Err(Error::Read);
        }
        self.scratch.copy_from_slice(&sector.data);
        Ok(())
    }

    fn fat_entry(&mut self, cluster: u16) -> Result<u16> {
        let total_clusters = self.bpb.total_clusters();
        if cluster < FIRST_DATA_CLUSTER || (cluster as u32) >= total_clusters + FIRST_DATA_CLUSTER as u32 {
            return Err(Error::Invalid);
        }

        let byte_off = cluster as u32 + cluster as u32 / 2;
        let lba = self.bpb.fat_start + byte_off / SECTOR_SIZE as u32;
        let in_sector = (byte_off % SECTOR_SIZE as u32) as usize;

        self.read_lba(lba)?;
        let lo = self.scratch[in_sector];
        let hi = if in_sector + 1 < SECTOR_SIZE {
            self.scratch[in_sector + 1]
        } else {
            self.read_lba(lba + 1)?;
            self.scratch[0]
        };
        let value = u16::from(lo) | (u16::from(hi) << 8);

        Ok(if cluster % 2 == 0 {
            value & 0x0FFF
        } else {
            value >> 4
        })
    }

    fn set_fat_entry(&mut self, cluster: u16, entry: u16) -> Result<()> {
        let byte_off = cluster as u32 + cluster as u32 / 2;
        let in_sector = (byte_off % SECTOR_SIZE as u32) as usize;
        let even = cluster % 2 == 0;

        for copy in 0..self.bpb.num_fats as u32 {
            let lba = self.bpb.fat_start + copy * self.bpb.sectors_per_fat as u32 + byte_off / SECTOR_SIZE as u32;
            self.read_lba(lba)?;
            let mut image = self.scratch;

            if in_sector + 1 < SECTOR_SIZE {
                let cur = u16::from(image[in_sector]) | (u16::from(image[in_sector + 1]) << 8);
                let merged = if even {
                    (cur & 0xF000) | (entry & 0x0FFF)
                } else {
                    (cur & 0x000F) | (entry << 4)
                };
                image[in_sector] = (merged & 0xFF) as u8;
                image[in_sector + 1] = (merged >> 8) as u8;
                self.batch.add(lba, image).map_err(|_| Error::Full)?;
            } else {
                let next_lba = lba + 1;
                let lo_byte = image[in_sector];
                self.read_lba(next_lba)?;
                let mut next_image = self.scratch;
                let cur = u16::from(lo_byte) | (u16::from(next_image[0]) << 8);
                let merged = if even {
                    (cur & 0xF000) | (entry & 0x0FFF)
                } else {
                    (cur & 0x000F) | (entry << 4)
                };
                image[in_sector] = (merged & 0xFF) as u8;
                next_image[0] = (merged >> 8) as u8;
                self.batch.add(lba, image).map_err(|_| Error::Full)?;
                self.batch.add(next_lba, next_image).map_err(|_| Error::Full)?;
            }
        }
        Ok(())
    }

    fn alloc_cluster(&mut self, hint: u16) -> Result<u16> {
        let total_clusters = self.bpb.total_clusters() as u16;
        let mut c = if hint < FIRST_DATA_CLUSTER { FIRST_DATA_CLUSTER } else { hint };
        let limit = FIRST_DATA_CLUSTER + total_clusters;
        while c < limit {
            if self.fat_entry(c)? == 0 {
                return Ok(c);
            }
            c += 1;
        }
        Err(Error::Full)
    }

    fn cluster_to_lba(&self, cluster: u16) -> u32 {
        self.bpb.data_start + (cluster as u32 - FIRST_DATA_CLUSTER as u32) * self.bpb.sectors_per_cluster as u32
    }

    fn read_dir_entry_at(&mut self, lba: u32, index: usize) -> Result<DirEntry> {
        self.read_lba(lba)?;
        let raw = &self.scratch[index * 32..index * 32 + 32];
        Ok(DirEntry::parse(raw))
    }

    fn write_dir_entry_at(&mut self, lba: u32, index: usize, dirent: &Dirent) -> Result<()> {
        self.read_lba(lba)?;
        let mut image = self.scratch;
        dirent.write_into(&mut image[index * 32..index * 32 + 32]);
        self.batch.add(lba, image).map_err(|_| Error::Full)
    }

    fn find_entry(&mut self, name: &[u8; 11]) -> Result<(u32, usize, Dirent)> {
        let root_lba = self.bpb.root_dir_start;
        let entries_per_sector = SECTOR_SIZE / 32;
        for sector_off in 0..self.bpb.root_dir_sectors {
            let lba = root_lba + sector_off;
            for index in 0..entries_per_sector {
                match self.read_dir_entry_at(lba, index)? {
                    DirEntry::End => return Err(Error::NotFound),
                    DirEntry::Active(d) if &d.name == name => return Ok((lba, index, d)),
                    _ => {}
                }
            }
        }
        Err(Error::NotFound)
    }

    /// Walks the root directory once, remembering the first free slot seen
    /// and returning immediately on an exact match. At the End marker, a
    /// previously remembered free slot is reused in preference to
    /// extending the directory at the End marker itself.
    fn find_write_slot(&mut self, name: &[u8; 11]) -> Result<(u32, usize, Option<Dirent>)> {
        let root_lba = self.bpb.root_dir_start;
        let entries_per_sector = SECTOR_SIZE / 32;
        let mut free_slot: Option<(u32, usize)> = None;

        for sector_off in 0..self.bpb.root_dir_sectors {
            let lba = root_lba + sector_off;
            for index in 0..entries_per_sector {
                match self.read_dir_entry_at(lba, index)? {
                    DirEntry::Active(d) if &d.name == name => return Ok((lba, index, Some(d))),
                    DirEntry::Free if free_slot.is_none() => free_slot = Some((lba, index)),
                    DirEntry::End => {
                        let (slot_lba, slot_index) = free_slot.unwrap_or((lba, index));
                        return Ok((slot_lba, slot_index, None));
                    }
                    _ => {}
                }
            }
        }
        Err(Error::Full)
    }

    fn free_chain(&mut self, start: u16) -> Result<()> {
        let mut cluster = start;
        while cluster >= FIRST_DATA_CLUSTER && cluster < BAD_CLUSTER {
            let next = self.fat_entry(cluster)?;
            self.set_fat_entry(cluster, 0)?;
            if next < FIRST_DATA_CLUSTER {
                break;
            }
            cluster = next;
        }
        Ok(())
    }

    pub fn open_read(&mut self, name: &str) -> Result<ReadFile> {
        let packed = pack_83(name).ok_or(Error::Invalid)?;
        let (_, _, dirent) = self.find_entry(&packed)?;
        if dirent.is_directory {
            return Err(Error::Invalid);
        }
        Ok(ReadFile {
            start_cluster: dirent.start_cluster,
            file_size: dirent.file_size,
            bytes_read: 0,
            current_cluster: dirent.start_cluster,
            in_cluster_offset: 0,
        })
    }

    pub fn read(&mut self, file: &mut ReadFile, out: &mut [u8]) -> Result<usize> {
        if file.bytes_read >= file.file_size {
            return Ok(0);
        }
        let remaining_file = (file.file_size - file.bytes_read) as usize;
        let want = out.len().min(remaining_file);
        if want == 0 || file.current_cluster < FIRST_DATA_CLUSTER {
            return Ok(0);
        }

        let cluster_bytes = self.bpb.sectors_per_cluster as usize * SECTOR_SIZE;
        let mut produced = 0;
        while produced < want {
            let lba = self.cluster_to_lba(file.current_cluster)
                + (file.in_cluster_offset / SECTOR_SIZE) as u32;
            self.read_lba(lba)?;
            let sector_off = file.in_cluster_offset % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - sector_off).min(want - produced);
            out[produced..produced + chunk].copy_from_slice(&self.scratch[sector_off..sector_off + chunk]);
            produced += chunk;
            file.in_cluster_offset += chunk;
            file.bytes_read += chunk as u32;

            if file.in_cluster_offset >= cluster_bytes {
                file.in_cluster_offset = 0;
                let next = self.fat_entry(file.current_cluster)?;
                if next >= BAD_CLUSTER {
                    break;
                }
                file.current_cluster = next;
            }
        }
        Ok(produced)
    }

    pub fn open_write(&mut self, name: &str) -> Result<WriteFile> {
        if self.batch_in_use {
            return Err(Error::Invalid);
        }
        let packed = pack_83(name).ok_or(Error::Invalid)?;
        let (lba, index, existing) = self.find_write_slot(&packed)?;

        if let Some(existing) = existing {
            self.free_chain(existing.start_cluster)?;
        }

        self.batch_in_use = true;
        Ok(WriteFile {
            name: packed,
            dir_lba: lba,
            dir_index: index,
            first_cluster: 0,
            current_cluster: 0,
            bytes_written: 0,
            in_cluster_offset: 0,
        })
    }

    pub fn write(&mut self, file: &mut WriteFile, data: &[u8]) -> Result<()> {
        let cluster_bytes = self.bpb.sectors_per_cluster as usize * SECTOR_SIZE;
        let mut consumed = 0;

        while consumed < data.len() {
            if file.current_cluster < FIRST_DATA_CLUSTER || file.in_cluster_offset >= cluster_bytes {
                let hint = if file.current_cluster < FIRST_DATA_CLUSTER {
                    FIRST_DATA_CLUSTER
                } else {
                    file.current_cluster + 1
                };
                let new_cluster = self.alloc_cluster(hint)?;
                self.set_fat_entry(new_cluster, EOC)?;
                if file.current_cluster >= FIRST_DATA_CLUSTER {
                    self.set_fat_entry(file.current_cluster, new_cluster)?;
                } else {
                    file.first_cluster = new_cluster;
                }
                file.current_cluster = new_cluster;
                file.in_cluster_offset = 0;
            }

            let lba = self.cluster_to_lba(file.current_cluster)
                + (file.in_cluster_offset / SECTOR_SIZE) as u32;
            let sector_off = file.in_cluster_offset % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - sector_off).min(data.len() - consumed);

            self.read_lba(lba)?;
            let mut image = self.scratch;
            image[sector_off..sector_off + chunk].copy_from_slice(&data[consumed..consumed + chunk]);
            self.batch.add(lba, image).map_err(|_| Error::Full)?;

            consumed += chunk;
            file.in_cluster_offset += chunk;
            file.bytes_written += chunk as u32;
        }
        Ok(())
    }

    pub fn close_write(&mut self, file: WriteFile) -> Result<()> {
        let dirent = Dirent {
            name: file.name,
            is_directory: false,
            start_cluster: file.first_cluster,
            file_size: file.bytes_written,
        };
        self.write_dir_entry_at(file.dir_lba, file.dir_index, &dirent)?;
        let result = self.flush_batch();
        self.batch_in_use = false;
        result
    }

    pub fn delete(&mut self, name: &str) -> Result<()> {
        let packed = pack_83(name).ok_or(Error::Invalid)?;
        let (lba, index, dirent) = self.find_entry(&packed)?;
        self.free_chain(dirent.start_cluster)?;

        self.read_lba(lba)?;
        let mut image = self.scratch;
        image[index * 32] = dir::FREE_MARKER;
        self.batch.add(lba, image).map_err(|_| Error::Full)?;
        self.flush_batch()
    }

    /// Flushes the batch to whole tracks. Sectors of a flushed track not
    /// present in the batch are read through the same batch-aware path, so
    /// already-pending entries still win (the read-through policy, the
    /// mandated default outside of formatting).
    fn flush_batch(&mut self) -> Result<()> {
        let heads = self.bpb.heads as u32;
        let spt = self.bpb.sectors_per_track as u32;

        while let Some(lba) = self.batch.peek_any() {
            let (cyl, head, _) = lba_to_chs(lba, heads, spt);
            let track_base = (cyl as u32) * heads * spt + (head as u32) * spt;

            let mut track = TrackRecord::empty(cyl, head);
            for (i, slot) in track.sectors.iter_mut().enumerate().take(SECTORS_PER_TRACK) {
                let sector_lba = track_base + i as u32;
                let data = match self.batch.take(sector_lba) {
                    Some(bytes) => bytes,
                    None => {
                        self.read_lba(sector_lba)?;
                        self.scratch
                    }
                };
                *slot = Sector {
                    track: cyl,
                    side: head,
                    sector_n: (i + 1) as u8,
                    size_code: 2,
                    data,
                    valid: true,
                };
            }

            if !self.drive.write(&track) {
                return Err(Error::Write);
            }
        }
        Ok(())
    }

    /// Writes the boot sector, both FAT copies' first sector, and an
    /// optional volume label, all staged through the batch so that sectors
    /// sharing a track with each other are committed together instead of
    /// clobbering one another one `drive.write` at a time. `quick` stops
    /// before the data area; `full` additionally zero-fills every
    /// remaining data-area track directly (each write already covers a
    /// whole track, so no batching is needed there). Unlike ordinary batch
    /// flushes, format is explicitly allowed to skip read-through and emit
    /// virgin zero-filled tracks for any sector it doesn't stage itself -
    /// except on the one track straddling the reserved/FAT/root region and
    /// the data area, where the metadata sectors are read back rather than
    /// clobbered with zeros.
    pub fn format(&mut self, label: &str, full: bool) -> Result<()> {
        let bpb = self.bpb;
        let boot = bpb.render_boot_sector(label);
        self.batch.add(0, boot).map_err(|_| Error::Full)?;

        let first_fat = bpb.render_first_fat_sector();
        for copy in 0..bpb.num_fats as u32 {
            let base = bpb.fat_start + copy * bpb.sectors_per_fat as u32;
            self.batch.add(base, first_fat).map_err(|_| Error::Full)?;
            for extra in 1..bpb.sectors_per_fat as u32 {
                self.batch
                    .add(base + extra, [0u8; SECTOR_SIZE])
                    .map_err(|_| Error::Full)?;
            }
        }

        let root_label = bpb.render_label_entry(label);
        for sector_off in 0..bpb.root_dir_sectors {
            let lba = bpb.root_dir_start + sector_off;
            let data = if sector_off == 0 { root_label } else { [0u8; SECTOR_SIZE] };
            self.batch.add(lba, data).map_err(|_| Error::Full)?;
        }

        self.flush_batch()?;

        if full {
            let total_sectors = bpb.total_sectors;
            let spt = bpb.sectors_per_track as u32;
            let data_start = bpb.data_start;

            // The track containing `data_start` may also hold trailing
            // reserved/FAT/root sectors written above; read those back so
            // the zero-fill below only touches the data-area portion.
            let boundary_track_start = (data_start / spt) * spt;
            if boundary_track_start < data_start {
                let (cyl, head, _) = lba_to_chs(boundary_track_start, bpb.heads as u32, spt);
                let mut track = TrackRecord::empty(cyl, head);
                for (i, slot) in track.sectors.iter_mut().enumerate() {
                    let lba = boundary_track_start + i as u32;
                    *slot = Sector::new(cyl, head, (i + 1) as u8);
                    if lba < data_start {
                        if !self.drive.read(slot) {
                            return Err(Error::Read);
                        }
                    } else {
                        slot.valid = true;
                    }
                }
                if !self.drive.write(&track) {
                    return Err(Error::Write);
                }
            }

            let mut lba = ((data_start + spt - 1) / spt) * spt;
            while lba < total_sectors {
                let (cyl, head, _) = lba_to_chs(lba, bpb.heads as u32, spt);
                let mut track = TrackRecord::empty(cyl, head);
                for (i, slot) in track.sectors.iter_mut().enumerate() {
                    *slot = Sector::new(cyl, head, (i + 1) as u8);
                    slot.valid = true;
                }
                if !self.drive.write(&track) {
                    return Err(Error::Write);
                }
                lba += spt;
            }
        }
        Ok(())
    }
}

/// Uppercases and space-pads a `name.ext` string into the fixed 11-byte 8.3
/// form. Rejects names that do not fit.
fn pack_83(name: &str) -> Option<[u8; 11]> {
    let mut out = [b' '; 11];
    let mut parts = name.splitn(2, '.');
    let stem = parts.next()?;
    let ext = parts.next().unwrap_or("");
    if stem.is_empty() || stem.len() > 8 || ext.len() > 3 {
        return None;
    }
    for (i, b) in stem.bytes().enumerate() {
        out[i] = b.to_ascii_uppercase();
    }
    for (i, b) in ext.bytes().enumerate() {
        out[8 + i] = b.to_ascii_uppercase();
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_short_names() {
        assert_eq!(&pack_83("A.B").unwrap(), b"A       B  ");
        assert_eq!(&pack_83("TEST.TXT").unwrap(), b"TEST    TXT");
    }

    #[test]
    fn rejects_oversized_names() {
        assert!(pack_83("TOOLONGNAME.TXT").is_none());
        assert!(pack_83("A.TOOLONG").is_none());
    }

    #[test]
    fn lba_chs_matches_hd_geometry() {
        assert_eq!(lba_to_chs(0, 2, 18), (0, 0, 1));
        assert_eq!(lba_to_chs(17, 2, 18), (0, 0, 18));
        assert_eq!(lba_to_chs(18, 2, 18), (0, 1, 1));
        assert_eq!(lba_to_chs(36, 2, 18), (1, 0, 1));
    }
}
