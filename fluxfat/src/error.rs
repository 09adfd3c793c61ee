use core::fmt;

/// The six error kinds a `fat12_t`/`mfm_t` caller can observe.
///
/// CRC failures at the decoder are *not* represented here - they surface as
/// `Sector::valid == false` so callers can retry on the next revolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// Malformed argument or on-disk structure (bad boot signature,
    /// out-of-range cluster, double open, illegal BPB field).
    Invalid,
    /// The drive I/O callback returned `false` during a read.
    Read,
    /// The drive I/O callback returned `false` during a write.
    Write,
    /// A root-directory scan exhausted without a match.
    NotFound,
    /// No free directory entry, no free cluster, or the write batch is at
    /// capacity.
    Full,
    /// Past end-of-file or end-of-directory.
    Eof,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::Invalid => "invalid argument or on-disk structure",
            Error::Read => "drive read failed",
            Error::Write => "drive write failed",
            Error::NotFound => "not found",
            Error::Full => "no free capacity",
            Error::Eof => "end of file",
        };
        f.write_str(msg)
    }
}

#[cfg(any(test, feature = "std"))]
impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;
