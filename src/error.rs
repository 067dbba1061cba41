//! FLAC decoder error types.

use thiserror::Error;

/// FLAC decoding error.
///
/// `OutOfData` is the only non-fatal variant: the decoder stays usable and
/// [`bytes_consumed`](crate::FlacDecoder::bytes_consumed) reports `0` so the
/// caller can grow its input buffer and retry the same frame. Every other
/// variant signals stream corruption (the caller may attempt to resync by
/// calling [`decode_frame`](crate::FlacDecoder::decode_frame) again on later
/// bytes) or resource exhaustion.
#[derive(Debug, Error)]
pub enum FlacError {
    /// Input does not begin with the `fLaC` stream marker.
    #[error("input does not begin with the fLaC stream marker")]
    BadMagicNumber,

    /// No frame sync code was found before the input ran out.
    #[error("frame sync code not found")]
    SyncNotFound,

    /// The input ended in the middle of a frame. Supply more bytes and retry.
    #[error("incomplete frame: more input is required")]
    OutOfData,

    /// The frame header carries the reserved block size code 0.
    #[error("reserved block size code in frame header")]
    BadBlockSizeCode,

    /// Malformed stream or frame header, or a frame whose parameters do not
    /// match STREAMINFO.
    #[error("malformed header")]
    BadHeader,

    /// Channel assignment codes 11-15 are reserved.
    #[error("reserved channel assignment {0}")]
    ReservedChannelAssignment(u8),

    /// Reserved bit depth code, or a wasted-bits shift that consumes the
    /// entire sample width.
    #[error("bad or reserved sample depth")]
    BadSampleDepth,

    /// Subframe type codes 2-7 and 13-31 are reserved.
    #[error("reserved subframe type {0}")]
    ReservedSubframeType(u8),

    /// Fixed prediction orders above 4 are invalid.
    #[error("fixed prediction order {0} out of range")]
    BadFixedPredictionOrder(u8),

    /// Residual coding methods 2 and 3 are reserved.
    #[error("reserved residual coding method")]
    ReservedResidualCodingMethod,

    /// The block size cannot be split into the coded number of Rice
    /// partitions.
    #[error("block size not divisible into Rice partitions")]
    BlockSizeNotDivisibleRice,

    /// The working sample buffer or a metadata accumulator could not be
    /// allocated.
    #[error("memory allocation failed")]
    MemoryAllocation,

    /// A frame declared a block size larger than the STREAMINFO maximum.
    #[error("frame block size {got} exceeds stream maximum {max}")]
    BlockSizeOutOfRange {
        /// Block size declared by the frame header.
        got: u32,
        /// Maximum block size from STREAMINFO.
        max: u32,
    },

    /// Frame header CRC-8 or frame CRC-16 verification failed.
    #[error("CRC mismatch: stream has {expected:#06x}, computed {actual:#06x}")]
    CrcMismatch {
        /// Checksum read from the stream.
        expected: u16,
        /// Checksum computed over the received bytes.
        actual: u16,
    },

    /// A metadata block exceeds the configured size limit for its type.
    ///
    /// The decoder itself skips oversized blocks silently; this variant is
    /// part of the public vocabulary for callers that pre-validate limits.
    #[error("metadata block exceeds the configured size limit")]
    MetadataTooLarge,

    /// The caller's output buffer is too small for the decoded frame.
    #[error("output buffer too small: need {needed} bytes, have {available}")]
    OutputBufferTooSmall {
        /// Bytes required for the decoded frame.
        needed: usize,
        /// Bytes available in the caller's buffer.
        available: usize,
    },
}

/// FLAC decoder result type.
pub type Result<T> = std::result::Result<T, FlacError>;
