pub mod memory_drive;
pub mod pio;
pub mod scp;

pub use memory_drive::{FluxRoundTripDrive, MemoryDrive};
pub use scp::{FluxSimulator, Lcg, ScpImage};
