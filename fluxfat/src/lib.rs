#![cfg_attr(not(test), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod crc16;
pub mod drive;
pub mod error;
pub mod fat12;
pub mod geometry;
pub mod mfm;
pub mod types;

pub use drive::DriveIo;
pub use error::Error;
pub use fat12::{Bpb, Fat12, ReadFile, WriteFile};
pub use types::{Sector, TrackRecord};
