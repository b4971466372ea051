/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The length prefix declares an empty frame.
    #[error("zero-length frame declared")]
    ZeroLength,

    /// The declared length cannot hold the CRC trailer.
    #[error("declared length {declared} too short for crc trailer")]
    TooShort { declared: usize },

    /// The extended-length flag is set but the second prefix byte is missing.
    #[error("incomplete length prefix")]
    IncompletePrefix,

    /// The declared length runs past the end of the datagram.
    #[error("truncated frame (declared {declared} bytes, {remaining} remaining)")]
    Truncated { declared: usize, remaining: usize },

    /// The CRC trailer does not match the checksum of prefix and payload.
    #[error("crc mismatch (trailer {trailer:#06x}, computed {computed:#06x})")]
    CrcMismatch { trailer: u16, computed: u16 },

    /// The payload does not fit in a 15-bit declared length.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A cursor read went past the end of its buffer.
    #[error("read past end of buffer (wanted {wanted}, {remaining} remaining)")]
    OutOfBounds { wanted: usize, remaining: usize },
}

impl FrameError {
    /// True for CRC failures, false for structural (length/truncation) failures.
    pub fn is_integrity(&self) -> bool {
        matches!(self, FrameError::CrcMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
