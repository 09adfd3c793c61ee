use crate::error::{Error, Result};
use crate::geometry::SECTOR_SIZE;

const BOOT_SIGNATURE_OFFSET: usize = 510;
const EXT_BOOT_SIGNATURE: u8 = 0x29;
const VOLUME_SERIAL: u32 = 0x1234_5678;

/// Fields parsed out of the BIOS Parameter Block in sector 0, plus the
/// derived layout constants the rest of `fat12` works in terms of.
#[derive(Clone, Copy, Debug)]
pub struct Bpb {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_dir_entries: u16,
    pub total_sectors: u32,
    pub media_descriptor: u8,
    pub sectors_per_fat: u16,
    pub sectors_per_track: u16,
    pub heads: u16,

    pub fat_start: u32,
    pub root_dir_start: u32,
    pub root_dir_sectors: u32,
    pub data_start: u32,
}

impl Bpb {
    pub fn parse(sector0: &[u8; SECTOR_SIZE]) -> Result<Self> {
        if sector0[BOOT_SIGNATURE_OFFSET] != 0x55 || sector0[BOOT_SIGNATURE_OFFSET + 1] != 0xAA {
            return Err(Error::Invalid);
        }

        let bytes_per_sector = u16::from_le_bytes([sector0[11], sector0[12]]);
        let sectors_per_cluster = sector0[13];
        let reserved_sectors = u16::from_le_bytes([sector0[14], sector0[15]]);
        let num_fats = sector0[16];
        let root_dir_entries = u16::from_le_bytes([sector0[17], sector0[18]]);
        let total_sectors_16 = u16::from_le_bytes([sector0[19], sector0[20]]);
        let media_descriptor = sector0[21];
        let sectors_per_fat = u16::from_le_bytes([sector0[22], sector0[23]]);
        let sectors_per_track = u16::from_le_bytes([sector0[24], sector0[25]]);
        let heads = u16::from_le_bytes([sector0[26], sector0[27]]);
        let total_sectors_32 = u32::from_le_bytes([sector0[32], sector0[33], sector0[34], sector0[35]]);

        let total_sectors = if total_sectors_16 != 0 {
            total_sectors_16 as u32
        } else {
            total_sectors_32
        };

        if bytes_per_sector as usize != SECTOR_SIZE
            || sectors_per_cluster == 0
            || num_fats == 0
            || sectors_per_track == 0
            || heads == 0
        {
            return Err(Error::Invalid);
        }

        let fat_start = reserved_sectors as u32;
        let root_dir_start = fat_start + num_fats as u32 * sectors_per_fat as u32;
        let root_dir_sectors =
            (root_dir_entries as u32 * 32 + SECTOR_SIZE as u32 - 1) / SECTOR_SIZE as u32;
        let data_start = root_dir_start + root_dir_sectors;

        Ok(Bpb {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            num_fats,
            root_dir_entries,
            total_sectors,
            media_descriptor,
            sectors_per_fat,
            sectors_per_track,
            heads,
            fat_start,
            root_dir_start,
            root_dir_sectors,
            data_start,
        })
    }

    pub fn total_clusters(&self) -> u32 {
        (self.total_sectors - self.data_start) / self.sectors_per_cluster as u32
    }

    /// The HD (1.44 MB) parameter set this crate supports exclusively.
    pub fn hd_defaults() -> Self {
        let reserved_sectors = 1u16;
        let num_fats = 2u8;
        let sectors_per_fat = 9u16;
        let root_dir_entries = 224u16;

        let fat_start = reserved_sectors as u32;
        let root_dir_start = fat_start + num_fats as u32 * sectors_per_fat as u32;
        let root_dir_sectors =
            (root_dir_entries as u32 * 32 + SECTOR_SIZE as u32 - 1) / SECTOR_SIZE as u32;
        let data_start = root_dir_start + root_dir_sectors;

        Bpb {
            bytes_per_sector: SECTOR_SIZE as u16,
            sectors_per_cluster: 1,
            reserved_sectors,
            num_fats,
            root_dir_entries,
            total_sectors: 2880,
            media_descriptor: 0xF0,
            sectors_per_fat,
            sectors_per_track: 18,
            heads: 2,
            fat_start,
            root_dir_start,
            root_dir_sectors,
            data_start,
        }
    }

    /// Renders a boot sector: jump `EB 3C 90`, OEM `"MSDOS5.0"`, this BPB,
    /// extended-boot signature `0x29`, a volume serial, an 11-byte
    /// space-padded label, `"FAT12   "`, and the `0x55 0xAA` signature.
    pub fn render_boot_sector(&self, label: &str) -> [u8; SECTOR_SIZE] {
        let mut s = [0u8; SECTOR_SIZE];
        s[0] = 0xEB;
        s[1] = 0x3C;
        s[2] = 0x90;
        s[3..11].copy_from_slice(b"MSDOS5.0");

        s[11..13].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        s[13] = self.sectors_per_cluster;
        s[14..16].copy_from_slice(&self.reserved_sectors.to_le_bytes());
        s[16] = self.num_fats;
        s[17..19].copy_from_slice(&self.root_dir_entries.to_le_bytes());
        let total_16 = if self.total_sectors <= 0xFFFF {
            self.total_sectors as u16
        } else {
            0
        };
        s[19..21].copy_from_slice(&total_16.to_le_bytes());
        s[21] = self.media_descriptor;
        s[22..24].copy_from_slice(&self.sectors_per_fat.to_le_bytes());
        s[24..26].copy_from_slice(&self.sectors_per_track.to_le_bytes());
        s[26..28].copy_from_slice(&self.heads.to_le_bytes());
        s[32..36].copy_from_slice(&self.total_sectors.to_le_bytes());

        s[38] = EXT_BOOT_SIGNATURE;
        s[39..43].copy_from_slice(&VOLUME_SERIAL.to_le_bytes());

        let mut padded_label = [b' '; 11];
        for (i, b) in label.bytes().take(11).enumerate() {
            padded_label[i] = b.to_ascii_uppercase();
        }
        s[43..54].copy_from_slice(&padded_label);
        s[54..62].copy_from_slice(b"FAT12   ");

        s[BOOT_SIGNATURE_OFFSET] = 0x55;
        s[BOOT_SIGNATURE_OFFSET + 1] = 0xAA;
        s
    }

    /// First FAT sector: `{media, 0xFF, 0xFF}` followed by zeros, the
    /// standard reserved-entry prefix for clusters 0 and 1.
    pub fn render_first_fat_sector(&self) -> [u8; SECTOR_SIZE] {
        let mut s = [0u8; SECTOR_SIZE];
        s[0] = self.media_descriptor;
        s[1] = 0xFF;
        s[2] = 0xFF;
        s
    }

    /// An optional volume-label root entry: the label split across the 8/3
    /// name fields with attribute `0x08` (`ATTR_VOLUME_ID`).
    pub fn render_label_entry(&self, label: &str) -> [u8; SECTOR_SIZE] {
        let mut s = [0u8; SECTOR_SIZE];
        if label.is_empty() {
            return s;
        }
        let mut name = [b' '; 11];
        for (i, b) in label.bytes().take(11).enumerate() {
            name[i] = b.to_ascii_uppercase();
        }
        s[0..11].copy_from_slice(&name);
        s[11] = 0x08;
        s
    }
}
