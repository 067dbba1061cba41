//! # streamflac
//!
//! A streaming FLAC (Free Lossless Audio Codec) decoder that accepts its
//! input in arbitrary chunks, designed for memory-constrained targets as
//! well as host-side use.
//!
//! ## Features
//!
//! - Incremental header parsing: [`FlacDecoder::read_header`] can be called
//!   repeatedly as bytes arrive, resuming at any byte boundary
//! - All subframe types: constant, verbatim, fixed prediction (orders 0-4),
//!   and LPC (orders 1-32) with Rice-coded residuals
//! - Left/side, right/side, and mid/side stereo decorrelation
//! - CRC-8 and CRC-16 validation (can be disabled)
//! - Configurable per-type size limits for retained metadata blocks
//! - Interleaved little-endian PCM output at the stream bit depth, or
//!   left-justified 32-bit output
//!
//! ## Example
//!
//! ```no_run
//! use streamflac::{FlacDecoder, FrameOutcome, HeaderStatus};
//!
//! let stream: Vec<u8> = std::fs::read("audio.flac").unwrap();
//! let mut decoder = FlacDecoder::new();
//!
//! let mut pos = 0;
//! while let HeaderStatus::NeedMoreData = decoder.read_header(&stream[pos..]).unwrap() {
//!     pos += decoder.bytes_consumed();
//! }
//! pos += decoder.bytes_consumed();
//!
//! let mut pcm = vec![0u8; decoder.output_buffer_size_bytes() as usize];
//! loop {
//!     match decoder.decode_frame(&stream[pos..], &mut pcm).unwrap() {
//!         FrameOutcome::Frame { num_samples } => {
//!             pos += decoder.bytes_consumed();
//!             // use &pcm[..] (num_samples interleaved samples)
//!             let _ = num_samples;
//!         }
//!         FrameOutcome::EndOfStream => break,
//!     }
//! }
//! ```

pub mod bitstream;
mod crc;
pub mod decoder;
pub mod error;
mod lpc;
mod output;

pub use bitstream::BitReader;
pub use decoder::FlacDecoder;
pub use error::{FlacError, Result};

/// Default retained size limit for PADDING blocks (skipped).
pub const DEFAULT_MAX_PADDING_SIZE: u32 = 0;
/// Default retained size limit for APPLICATION blocks (skipped).
pub const DEFAULT_MAX_APPLICATION_SIZE: u32 = 0;
/// Default retained size limit for SEEKTABLE blocks (skipped; seeking is
/// unsupported).
pub const DEFAULT_MAX_SEEKTABLE_SIZE: u32 = 0;
/// Default retained size limit for VORBIS_COMMENT blocks (typical tags fit
/// in 1-2 KB).
pub const DEFAULT_MAX_VORBIS_COMMENT_SIZE: u32 = 2 * 1024;
/// Default retained size limit for CUESHEET blocks (skipped).
pub const DEFAULT_MAX_CUESHEET_SIZE: u32 = 0;
/// Default retained size limit for PICTURE blocks (skipped; saves memory on
/// constrained devices).
pub const DEFAULT_MAX_ALBUM_ART_SIZE: u32 = 0;
/// Default retained size limit for unknown block types (skipped).
pub const DEFAULT_MAX_UNKNOWN_SIZE: u32 = 0;

/// Stream properties from the mandatory STREAMINFO metadata block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Minimum block size in samples per channel (16-65535).
    pub min_block_size: u16,
    /// Maximum block size in samples per channel (16-65535).
    pub max_block_size: u16,
    /// Minimum frame size in bytes (0 = unknown).
    pub min_frame_size: u32,
    /// Maximum frame size in bytes (0 = unknown).
    pub max_frame_size: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels (1-8).
    pub channels: u8,
    /// Bits per sample (4-32).
    pub sample_depth: u8,
    /// Total samples per channel, a 36-bit value (0 = unknown).
    pub total_samples: u64,
    /// MD5 signature of the unencoded audio data (all zero = no signature).
    pub md5_signature: [u8; 16],
}

/// FLAC metadata block types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataType {
    /// Required stream information; always parsed, never retained as bytes.
    StreamInfo,
    /// Reserved space.
    Padding,
    /// Application-specific data.
    Application,
    /// Seek points for random access.
    SeekTable,
    /// Vorbis-style comments (tags).
    VorbisComment,
    /// CD cuesheet.
    CueSheet,
    /// Embedded picture (album art).
    Picture,
    /// Any other type code (7-126), plus the invalid value 127.
    Unknown(u8),
}

impl From<u8> for MetadataType {
    fn from(code: u8) -> Self {
        match code {
            0 => MetadataType::StreamInfo,
            1 => MetadataType::Padding,
            2 => MetadataType::Application,
            3 => MetadataType::SeekTable,
            4 => MetadataType::VorbisComment,
            5 => MetadataType::CueSheet,
            6 => MetadataType::Picture,
            n => MetadataType::Unknown(n),
        }
    }
}

impl MetadataType {
    /// The 7-bit type code as it appears in the stream.
    pub fn code(&self) -> u8 {
        match self {
            MetadataType::StreamInfo => 0,
            MetadataType::Padding => 1,
            MetadataType::Application => 2,
            MetadataType::SeekTable => 3,
            MetadataType::VorbisComment => 4,
            MetadataType::CueSheet => 5,
            MetadataType::Picture => 6,
            MetadataType::Unknown(n) => *n,
        }
    }

    // Size-limit slot: one per known type, all unknown types share slot 7.
    pub(crate) fn limit_slot(&self) -> usize {
        match self {
            MetadataType::Unknown(_) => 7,
            known => known.code() as usize,
        }
    }
}

/// A metadata block retained during header parsing.
///
/// Only blocks whose coded length fits the configured limit for their type
/// are retained, so `data` always holds the complete block body.
#[derive(Debug, Clone)]
pub struct MetadataBlock {
    /// Block type.
    pub block_type: MetadataType,
    /// Raw block body.
    pub data: Vec<u8>,
}

impl MetadataBlock {
    /// Length of the block body in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the block body is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Channel layout of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAssignment {
    /// 1-8 independently coded channels.
    Independent(u8),
    /// Left channel plus a side channel (`side = left - right`).
    LeftSide,
    /// Side channel plus right channel.
    RightSide,
    /// Mid channel plus side channel.
    MidSide,
}

impl ChannelAssignment {
    /// Decode the 4-bit channel assignment field of a frame header.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0..=7 => Ok(ChannelAssignment::Independent(code + 1)),
            8 => Ok(ChannelAssignment::LeftSide),
            9 => Ok(ChannelAssignment::RightSide),
            10 => Ok(ChannelAssignment::MidSide),
            n => Err(FlacError::ReservedChannelAssignment(n)),
        }
    }

    /// Number of channels carried by a frame with this assignment.
    pub fn channel_count(&self) -> u8 {
        match self {
            ChannelAssignment::Independent(n) => *n,
            _ => 2,
        }
    }
}

/// How a single channel's block is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubframeType {
    /// One value replicated across the block.
    Constant,
    /// Uncompressed samples.
    Verbatim,
    /// Fixed predictor of order 0-4.
    Fixed(u8),
    /// Linear predictive coding of order 1-32.
    Lpc(u8),
}

impl SubframeType {
    /// Decode the 6-bit subframe type field.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(SubframeType::Constant),
            1 => Ok(SubframeType::Verbatim),
            8..=12 => Ok(SubframeType::Fixed(code - 8)),
            32..=63 => Ok(SubframeType::Lpc(code - 31)),
            n => Err(FlacError::ReservedSubframeType(n)),
        }
    }
}

/// Outcome of a [`FlacDecoder::read_header`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStatus {
    /// STREAMINFO and all metadata blocks have been consumed; frames follow.
    Complete,
    /// The header continues past the supplied bytes; advance the input by
    /// [`FlacDecoder::bytes_consumed`] and call again with more data.
    NeedMoreData,
}

/// Outcome of a [`FlacDecoder::decode_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// One frame was decoded and written to the output buffer.
    Frame {
        /// Total samples written across all channels
        /// (`block_size * channels`).
        num_samples: u32,
    },
    /// The call was made with empty input: clean end of stream.
    EndOfStream,
}
