//! Streaming FLAC decoder.
//!
//! The decoder is driven by the caller: [`FlacDecoder::read_header`] is
//! called with input chunks until it reports [`HeaderStatus::Complete`],
//! then [`FlacDecoder::decode_frame`] is called once per frame. After every
//! call [`FlacDecoder::bytes_consumed`] tells the caller how far to advance
//! its input window; the input buffer only has to stay valid for the
//! duration of a single call.
//!
//! Header parsing resumes at any byte boundary. Frame decoding does not:
//! each `decode_frame` call must see one whole frame (sync code through
//! CRC-16), otherwise it returns [`FlacError::OutOfData`] with nothing
//! consumed and the caller is expected to grow its buffer.

use crate::bitstream::BitReader;
use crate::crc;
use crate::error::{FlacError, Result};
use crate::lpc;
use crate::output;
use crate::{
    ChannelAssignment, FrameOutcome, HeaderStatus, MetadataBlock, MetadataType, StreamInfo,
    SubframeType, DEFAULT_MAX_ALBUM_ART_SIZE, DEFAULT_MAX_APPLICATION_SIZE,
    DEFAULT_MAX_CUESHEET_SIZE, DEFAULT_MAX_PADDING_SIZE, DEFAULT_MAX_SEEKTABLE_SIZE,
    DEFAULT_MAX_UNKNOWN_SIZE, DEFAULT_MAX_VORBIS_COMMENT_SIZE,
};

// "fLaC"
const STREAM_MARKER: u32 = 0x664C_6143;
const STREAMINFO_LEN: usize = 34;
const MAX_LPC_ORDER: usize = 32;
// 2 sync + 2 coded fields + 7 coded number + 2 block size + 2 sample rate.
const MAX_FRAME_HEADER_LEN: usize = 16;

const SAMPLE_RATE_TABLE: [u32; 11] = [
    88200, 176400, 192000, 8000, 16000, 22050, 24000, 32000, 44100, 48000, 96000,
];

// Index is the predictor order; coefficients apply oldest sample first.
const FIXED_COEFFICIENTS: [&[i32]; 5] = [&[], &[1], &[-1, 2], &[1, -3, 3], &[-1, 4, -6, 4]];

// Header parsing position, kept across read_header calls.
#[derive(Debug, Clone, Copy)]
enum HeaderState {
    Magic,
    BlockHeader,
    BlockBody {
        last: bool,
        block_type: MetadataType,
        length: u32,
        read: u32,
    },
    Done,
}

// Parsed frame header, valid for one decode_frame call.
#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    block_size: u32,
    assignment: ChannelAssignment,
    sample_depth: u32,
    // Byte offset of the first sync byte in the caller's buffer.
    start_offset: usize,
}

/// Streaming FLAC decoder.
///
/// One instance decodes one stream. Two instances may run on different
/// threads; a single instance is not meant to be shared.
#[derive(Debug)]
pub struct FlacDecoder {
    stream_info: Option<StreamInfo>,
    metadata_blocks: Vec<MetadataBlock>,
    header_state: HeaderState,
    // Accumulator for the metadata block currently being read.
    pending_block: Vec<u8>,
    // Channel-major working buffer, max_block_size samples per channel.
    block_samples: Vec<i32>,
    bytes_consumed: usize,
    crc_check_enabled: bool,
    output_32bit_samples: bool,
    // Retained-size limits indexed by MetadataType::limit_slot(). Slot 0
    // (STREAMINFO) is never consulted.
    max_metadata_sizes: [u32; 8],
}

impl Default for FlacDecoder {
    fn default() -> Self {
        Self {
            stream_info: None,
            metadata_blocks: Vec::new(),
            header_state: HeaderState::Magic,
            pending_block: Vec::new(),
            block_samples: Vec::new(),
            bytes_consumed: 0,
            crc_check_enabled: true,
            output_32bit_samples: false,
            max_metadata_sizes: [
                0,
                DEFAULT_MAX_PADDING_SIZE,
                DEFAULT_MAX_APPLICATION_SIZE,
                DEFAULT_MAX_SEEKTABLE_SIZE,
                DEFAULT_MAX_VORBIS_COMMENT_SIZE,
                DEFAULT_MAX_CUESHEET_SIZE,
                DEFAULT_MAX_ALBUM_ART_SIZE,
                DEFAULT_MAX_UNKNOWN_SIZE,
            ],
        }
    }
}

impl FlacDecoder {
    /// Create a decoder in its initial state.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================
    // Configuration
    // ========================================

    /// Enable or disable frame-header CRC-8 and frame CRC-16 validation.
    /// Enabled by default.
    pub fn set_crc_check_enabled(&mut self, enabled: bool) {
        self.crc_check_enabled = enabled;
    }

    /// Current CRC checking state.
    pub fn crc_check_enabled(&self) -> bool {
        self.crc_check_enabled
    }

    /// Enable or disable 32-bit output mode.
    ///
    /// When enabled, every sample is written as a left-justified signed
    /// 32-bit little-endian value regardless of the stream bit depth, which
    /// avoids 3-byte packed samples downstream. Disabled by default.
    pub fn set_output_32bit_samples(&mut self, enabled: bool) {
        self.output_32bit_samples = enabled;
    }

    /// Current 32-bit output mode state.
    pub fn output_32bit_samples(&self) -> bool {
        self.output_32bit_samples
    }

    /// Set the retained-size limit in bytes for one metadata block type.
    ///
    /// Blocks longer than the limit are skipped during header parsing; a
    /// limit of 0 skips the type entirely. STREAMINFO is always parsed and
    /// ignores its limit.
    pub fn set_max_metadata_size(&mut self, block_type: MetadataType, max_size: u32) {
        self.max_metadata_sizes[block_type.limit_slot()] = max_size;
    }

    /// Current retained-size limit for one metadata block type.
    pub fn max_metadata_size(&self, block_type: MetadataType) -> u32 {
        self.max_metadata_sizes[block_type.limit_slot()]
    }

    /// Set the retained-size limit for PICTURE blocks (album art).
    pub fn set_max_album_art_size(&mut self, max_size: u32) {
        self.set_max_metadata_size(MetadataType::Picture, max_size);
    }

    /// Current retained-size limit for PICTURE blocks.
    pub fn max_album_art_size(&self) -> u32 {
        self.max_metadata_size(MetadataType::Picture)
    }

    // ========================================
    // Stream information
    // ========================================

    /// Parsed STREAMINFO, available once the header is complete.
    pub fn stream_info(&self) -> Option<&StreamInfo> {
        self.stream_info.as_ref()
    }

    /// Sample rate in Hz, or 0 before the header is parsed.
    pub fn sample_rate(&self) -> u32 {
        self.stream_info.as_ref().map_or(0, |i| i.sample_rate)
    }

    /// Number of channels, or 0 before the header is parsed.
    pub fn channels(&self) -> u32 {
        self.stream_info.as_ref().map_or(0, |i| u32::from(i.channels))
    }

    /// Bits per sample, or 0 before the header is parsed.
    pub fn sample_depth(&self) -> u32 {
        self.stream_info
            .as_ref()
            .map_or(0, |i| u32::from(i.sample_depth))
    }

    /// Minimum block size from STREAMINFO.
    pub fn min_block_size(&self) -> u32 {
        self.stream_info
            .as_ref()
            .map_or(0, |i| u32::from(i.min_block_size))
    }

    /// Maximum block size from STREAMINFO.
    pub fn max_block_size(&self) -> u32 {
        self.stream_info
            .as_ref()
            .map_or(0, |i| u32::from(i.max_block_size))
    }

    /// Total samples per channel from STREAMINFO (0 = unknown).
    pub fn total_samples(&self) -> u64 {
        self.stream_info.as_ref().map_or(0, |i| i.total_samples)
    }

    /// MD5 signature from STREAMINFO (all zero = no signature).
    pub fn md5_signature(&self) -> [u8; 16] {
        self.stream_info
            .as_ref()
            .map_or([0; 16], |i| i.md5_signature)
    }

    /// Bytes per sample in the output (4 in 32-bit output mode).
    pub fn output_bytes_per_sample(&self) -> u32 {
        if self.output_32bit_samples {
            4
        } else {
            (self.sample_depth() + 7) / 8
        }
    }

    /// Output buffer size in samples (`max_block_size * channels`).
    pub fn output_buffer_size(&self) -> u32 {
        self.max_block_size() * self.channels()
    }

    /// Output buffer size in bytes sufficient for any frame of the stream.
    pub fn output_buffer_size_bytes(&self) -> u32 {
        self.output_buffer_size() * self.output_bytes_per_sample()
    }

    /// Bytes logically drained from the start of the input buffer by the
    /// most recent call. The caller advances its input window by this much.
    pub fn bytes_consumed(&self) -> usize {
        self.bytes_consumed
    }

    // ========================================
    // Metadata access
    // ========================================

    /// All metadata blocks retained during header parsing, in stream order.
    pub fn metadata_blocks(&self) -> &[MetadataBlock] {
        &self.metadata_blocks
    }

    /// The first retained metadata block of the given type, if any.
    pub fn metadata_block(&self, block_type: MetadataType) -> Option<&MetadataBlock> {
        self.metadata_blocks
            .iter()
            .find(|b| b.block_type == block_type)
    }

    // ========================================
    // Header parsing
    // ========================================

    /// Parse the stream marker and metadata blocks.
    ///
    /// May be called repeatedly: on [`HeaderStatus::NeedMoreData`] the
    /// caller advances its input by [`bytes_consumed`](Self::bytes_consumed)
    /// and calls again with more data. Parsing resumes at any byte split.
    ///
    /// Calling again after [`HeaderStatus::Complete`] starts a fresh
    /// sequence and releases the previous stream's metadata.
    pub fn read_header(&mut self, input: &[u8]) -> Result<HeaderStatus> {
        self.bytes_consumed = 0;
        if matches!(self.header_state, HeaderState::Done) {
            self.reset_stream_state();
        }

        let mut reader = BitReader::new(input);
        let result = self.run_header_machine(&mut reader);
        reader.rewind_to_byte_boundary();
        self.bytes_consumed = reader.bytes_consumed();
        result
    }

    fn reset_stream_state(&mut self) {
        self.stream_info = None;
        self.metadata_blocks.clear();
        self.pending_block = Vec::new();
        self.header_state = HeaderState::Magic;
    }

    fn run_header_machine(&mut self, reader: &mut BitReader) -> Result<HeaderStatus> {
        loop {
            match self.header_state {
                HeaderState::Magic => {
                    if reader.remaining_bytes() < 4 {
                        return Ok(HeaderStatus::NeedMoreData);
                    }
                    if reader.read_uint(32) != STREAM_MARKER {
                        return Err(FlacError::BadMagicNumber);
                    }
                    self.header_state = HeaderState::BlockHeader;
                }
                HeaderState::BlockHeader => {
                    if reader.remaining_bytes() < 4 {
                        return Ok(HeaderStatus::NeedMoreData);
                    }
                    let last = reader.read_uint(1) != 0;
                    let block_type = MetadataType::from(reader.read_uint(7) as u8);
                    let length = reader.read_uint(24);
                    self.pending_block.clear();
                    self.header_state = HeaderState::BlockBody {
                        last,
                        block_type,
                        length,
                        read: 0,
                    };
                }
                HeaderState::BlockBody {
                    last,
                    block_type,
                    length,
                    read,
                } => {
                    let retain = match block_type {
                        MetadataType::StreamInfo => true,
                        other => length <= self.max_metadata_sizes[other.limit_slot()],
                    };

                    let remaining = (length - read) as usize;
                    let chunk = remaining.min(reader.remaining_bytes());
                    if retain {
                        if read == 0 && length > 0 {
                            self.pending_block
                                .try_reserve_exact(length as usize)
                                .map_err(|_| FlacError::MemoryAllocation)?;
                        }
                        for _ in 0..chunk {
                            self.pending_block.push(reader.read_aligned_byte());
                        }
                    } else {
                        for _ in 0..chunk {
                            reader.read_aligned_byte();
                        }
                    }

                    let read = read + chunk as u32;
                    if read < length {
                        self.header_state = HeaderState::BlockBody {
                            last,
                            block_type,
                            length,
                            read,
                        };
                        return Ok(HeaderStatus::NeedMoreData);
                    }

                    if block_type == MetadataType::StreamInfo {
                        let info = parse_stream_info(&self.pending_block)?;
                        tracing::debug!(
                            "stream info: {} Hz, {} channels, {} bits",
                            info.sample_rate,
                            info.channels,
                            info.sample_depth
                        );
                        self.stream_info = Some(info);
                        self.pending_block.clear();
                    } else if retain {
                        let data = std::mem::take(&mut self.pending_block);
                        tracing::trace!(
                            "retained metadata block type {} ({} bytes)",
                            block_type.code(),
                            length
                        );
                        self.metadata_blocks.push(MetadataBlock { block_type, data });
                    } else {
                        tracing::trace!(
                            "skipped metadata block type {} ({} bytes)",
                            block_type.code(),
                            length
                        );
                    }

                    if last {
                        let info = self.stream_info.as_ref().ok_or(FlacError::BadHeader)?;
                        validate_stream_info(info)?;
                        self.header_state = HeaderState::Done;
                    } else {
                        self.header_state = HeaderState::BlockHeader;
                    }
                }
                HeaderState::Done => return Ok(HeaderStatus::Complete),
            }
        }
    }

    // ========================================
    // Frame decoding
    // ========================================

    /// Decode one frame into interleaved PCM.
    ///
    /// `output` must hold at least
    /// [`output_buffer_size_bytes`](Self::output_buffer_size_bytes) bytes.
    /// Empty input means the stream ended cleanly. On
    /// [`FlacError::OutOfData`] nothing is consumed; on other errors the
    /// scanned bytes stay consumed so a later call can resync.
    pub fn decode_frame(&mut self, input: &[u8], output: &mut [u8]) -> Result<FrameOutcome> {
        self.bytes_consumed = 0;
        if !matches!(self.header_state, HeaderState::Done) {
            return Err(FlacError::BadHeader);
        }
        let info = self.stream_info.clone().ok_or(FlacError::BadHeader)?;

        if input.is_empty() {
            return Ok(FrameOutcome::EndOfStream);
        }

        let needed = usize::from(info.max_block_size) * usize::from(info.channels);
        if self.block_samples.len() < needed {
            self.block_samples
                .try_reserve_exact(needed - self.block_samples.len())
                .map_err(|_| FlacError::MemoryAllocation)?;
            self.block_samples.resize(needed, 0);
        }

        let mut reader = BitReader::new(input);
        match self.decode_frame_inner(&mut reader, input, output, &info) {
            Ok(num_samples) => {
                reader.rewind_to_byte_boundary();
                self.bytes_consumed = reader.bytes_consumed();
                Ok(FrameOutcome::Frame { num_samples })
            }
            Err(FlacError::OutOfData) => Err(FlacError::OutOfData),
            Err(err) => {
                // Leave the scanned bytes consumed so the caller can resync
                // past the bad frame.
                reader.align_to_byte();
                reader.rewind_to_byte_boundary();
                self.bytes_consumed = reader.bytes_consumed();
                Err(err)
            }
        }
    }

    fn decode_frame_inner(
        &mut self,
        reader: &mut BitReader,
        input: &[u8],
        output: &mut [u8],
        info: &StreamInfo,
    ) -> Result<u32> {
        let header = self.decode_frame_header(reader, info)?;

        // The working buffer is sized from STREAMINFO; a larger frame would
        // run past its channel planes.
        if header.block_size > u32::from(info.max_block_size) {
            return Err(FlacError::BlockSizeOutOfRange {
                got: header.block_size,
                max: u32::from(info.max_block_size),
            });
        }

        self.decode_subframes(reader, &header)?;
        if reader.out_of_data() {
            return Err(FlacError::OutOfData);
        }

        reader.align_to_byte();
        if reader.remaining_bytes() < 2 {
            return Err(FlacError::OutOfData);
        }
        let frame_end = reader.bytes_consumed();
        let crc_read = reader.read_uint(16) as u16;
        if self.crc_check_enabled && frame_end > header.start_offset {
            let actual = crc::crc16(&input[header.start_offset..frame_end]);
            if actual != crc_read {
                tracing::warn!(
                    "frame CRC-16 mismatch: stream {:#06x}, computed {:#06x}",
                    crc_read,
                    actual
                );
                return Err(FlacError::CrcMismatch {
                    expected: crc_read,
                    actual,
                });
            }
        }

        output::write_interleaved(
            &self.block_samples,
            header.block_size as usize,
            usize::from(info.channels),
            header.sample_depth,
            self.output_32bit_samples,
            output,
        )?;

        Ok(header.block_size * u32::from(info.channels))
    }

    fn decode_frame_header(&self, reader: &mut BitReader, info: &StreamInfo) -> Result<FrameHeader> {
        let (start_offset, sync1) = find_frame_sync(reader)?;

        let mut raw_header = [0u8; MAX_FRAME_HEADER_LEN];
        raw_header[0] = 0xFF;
        raw_header[1] = sync1;
        let mut raw_len = 2;

        // A 0xFF here can only be the start of a real sync code, which means
        // the one we locked onto was false.
        let byte = read_header_byte(reader)?;
        if byte == 0xFF {
            return Err(FlacError::SyncNotFound);
        }
        raw_header[raw_len] = byte;
        raw_len += 1;

        let block_size_code = byte >> 4;
        let sample_rate_code = byte & 0x0F;
        let mut block_size = match block_size_code {
            0 => return Err(FlacError::BadBlockSizeCode),
            1 => 192,
            2..=5 => 576u32 << (block_size_code - 2),
            6 | 7 => 0, // coded after the frame number
            _ => 256u32 << (block_size_code - 8),
        };

        let byte = read_header_byte(reader)?;
        if byte == 0xFF {
            return Err(FlacError::SyncNotFound);
        }
        raw_header[raw_len] = byte;
        raw_len += 1;

        let channel_code = byte >> 4;
        let depth_code = (byte & 0x0E) >> 1;
        let sample_depth = match depth_code {
            0 => u32::from(info.sample_depth),
            1 => 8,
            2 => 12,
            3 => return Err(FlacError::BadSampleDepth),
            4 => 16,
            5 => 20,
            6 => 24,
            _ => 32,
        };
        // The reserved bit (0x01) is tolerated; some encoders set it.

        // UTF-8-like coded frame/sample number. Seeking is unsupported, so
        // the value is consumed without validation.
        let mut lead = read_header_byte(reader)?;
        raw_header[raw_len] = lead;
        raw_len += 1;
        while lead >= 0b1100_0000 {
            let cont = read_header_byte(reader)?;
            raw_header[raw_len] = cont;
            raw_len += 1;
            lead <<= 1;
        }

        if block_size_code == 6 {
            let byte = read_header_byte(reader)?;
            raw_header[raw_len] = byte;
            raw_len += 1;
            block_size = u32::from(byte) + 1;
        } else if block_size_code == 7 {
            let hi = read_header_byte(reader)?;
            raw_header[raw_len] = hi;
            raw_len += 1;
            let lo = read_header_byte(reader)?;
            raw_header[raw_len] = lo;
            raw_len += 1;
            block_size = ((u32::from(hi) << 8) | u32::from(lo)) + 1;
        }

        let sample_rate = match sample_rate_code {
            0 => info.sample_rate,
            1..=11 => SAMPLE_RATE_TABLE[usize::from(sample_rate_code) - 1],
            12 => {
                let byte = read_header_byte(reader)?;
                raw_header[raw_len] = byte;
                raw_len += 1;
                u32::from(byte) * 1000
            }
            13 | 14 => {
                let hi = read_header_byte(reader)?;
                raw_header[raw_len] = hi;
                raw_len += 1;
                let lo = read_header_byte(reader)?;
                raw_header[raw_len] = lo;
                raw_len += 1;
                let rate = (u32::from(hi) << 8) | u32::from(lo);
                if sample_rate_code == 14 {
                    rate * 10
                } else {
                    rate
                }
            }
            _ => return Err(FlacError::BadHeader),
        };

        let crc_read = read_header_byte(reader)?;
        if self.crc_check_enabled {
            let actual = crc::crc8(&raw_header[..raw_len]);
            if actual != crc_read {
                return Err(FlacError::CrcMismatch {
                    expected: u16::from(crc_read),
                    actual: u16::from(actual),
                });
            }
        }

        let assignment = ChannelAssignment::from_code(channel_code)?;

        // Mid-stream parameter changes are unsupported: the frame must agree
        // with STREAMINFO.
        if assignment.channel_count() != info.channels {
            return Err(FlacError::BadHeader);
        }
        if depth_code != 0 && sample_depth != u32::from(info.sample_depth) {
            return Err(FlacError::BadHeader);
        }
        if sample_rate != info.sample_rate {
            return Err(FlacError::BadHeader);
        }

        tracing::trace!(
            "frame header: block_size={} assignment={:?} depth={}",
            block_size,
            assignment,
            sample_depth
        );

        Ok(FrameHeader {
            block_size,
            assignment,
            sample_depth,
            start_offset,
        })
    }

    fn decode_subframes(&mut self, reader: &mut BitReader, header: &FrameHeader) -> Result<()> {
        let block_size = header.block_size as usize;
        let depth = header.sample_depth;

        match header.assignment {
            ChannelAssignment::Independent(count) => {
                for ch in 0..usize::from(count) {
                    self.decode_subframe(reader, block_size, depth, ch * block_size)?;
                }
            }
            ChannelAssignment::LeftSide => {
                self.decode_subframe(reader, block_size, depth, 0)?;
                self.decode_subframe(reader, block_size, depth + 1, block_size)?;
                let buf = &mut self.block_samples;
                for i in 0..block_size {
                    buf[block_size + i] = buf[i].wrapping_sub(buf[block_size + i]);
                }
            }
            ChannelAssignment::RightSide => {
                self.decode_subframe(reader, block_size, depth + 1, 0)?;
                self.decode_subframe(reader, block_size, depth, block_size)?;
                let buf = &mut self.block_samples;
                for i in 0..block_size {
                    buf[i] = buf[i].wrapping_add(buf[block_size + i]);
                }
            }
            ChannelAssignment::MidSide => {
                self.decode_subframe(reader, block_size, depth, 0)?;
                self.decode_subframe(reader, block_size, depth + 1, block_size)?;
                let buf = &mut self.block_samples;
                for i in 0..block_size {
                    let side = buf[block_size + i];
                    let right = buf[i].wrapping_sub(side >> 1);
                    buf[block_size + i] = right;
                    buf[i] = right.wrapping_add(side);
                }
            }
        }
        Ok(())
    }

    fn decode_subframe(
        &mut self,
        reader: &mut BitReader,
        block_size: usize,
        sample_depth: u32,
        offset: usize,
    ) -> Result<()> {
        reader.read_uint(1); // padding bit, tolerated either way

        let subframe_type = SubframeType::from_code(reader.read_uint(6) as u8)?;

        let mut shift = reader.read_uint(1);
        if shift == 1 {
            while reader.read_uint(1) == 0 {
                shift += 1;
                if reader.out_of_data() {
                    return Err(FlacError::OutOfData);
                }
            }
        }
        // The wasted-bits shift must leave at least one significant bit.
        if shift >= 32 {
            return Err(FlacError::BadSampleDepth);
        }
        let depth = sample_depth
            .checked_sub(shift)
            .filter(|d| *d != 0)
            .ok_or(FlacError::BadSampleDepth)?;

        match subframe_type {
            SubframeType::Constant => {
                let value = reader.read_sint(depth);
                self.block_samples[offset..offset + block_size].fill(value);
            }
            SubframeType::Verbatim => {
                for i in 0..block_size {
                    self.block_samples[offset + i] = reader.read_sint(depth);
                }
            }
            SubframeType::Fixed(order) => {
                self.decode_fixed_subframe(reader, block_size, offset, order, depth)?;
            }
            SubframeType::Lpc(order) => {
                self.decode_lpc_subframe(reader, block_size, offset, order, depth)?;
            }
        }

        if shift > 0 {
            for sample in &mut self.block_samples[offset..offset + block_size] {
                *sample <<= shift;
            }
        }
        Ok(())
    }

    fn decode_fixed_subframe(
        &mut self,
        reader: &mut BitReader,
        block_size: usize,
        offset: usize,
        order: u8,
        sample_depth: u32,
    ) -> Result<()> {
        let order = usize::from(order);
        if order >= FIXED_COEFFICIENTS.len() {
            return Err(FlacError::BadFixedPredictionOrder(order as u8));
        }
        if order > block_size {
            return Err(FlacError::BadHeader);
        }

        for i in 0..order {
            self.block_samples[offset + i] = reader.read_sint(sample_depth);
        }
        self.decode_residuals(reader, block_size, offset, order)?;

        // Fixed prediction always has quantization level 0.
        let coefs = FIXED_COEFFICIENTS[order];
        let strategy = lpc::lpc_strategy(sample_depth, coefs, 0);
        lpc::restore_linear_prediction(
            &mut self.block_samples[offset..offset + block_size],
            coefs,
            0,
            strategy,
        );
        Ok(())
    }

    fn decode_lpc_subframe(
        &mut self,
        reader: &mut BitReader,
        block_size: usize,
        offset: usize,
        order: u8,
        sample_depth: u32,
    ) -> Result<()> {
        let order = usize::from(order);
        if order > block_size {
            return Err(FlacError::BadHeader);
        }

        for i in 0..order {
            self.block_samples[offset + i] = reader.read_sint(sample_depth);
        }

        let precision = reader.read_uint(4) + 1;
        let quantization = reader.read_sint(5);

        // Coefficients arrive newest-sample first.
        let mut coefs = [0i32; MAX_LPC_ORDER];
        for i in 0..order {
            coefs[order - 1 - i] = reader.read_sint(precision);
        }
        let coefs = &coefs[..order];

        self.decode_residuals(reader, block_size, offset, order)?;

        let strategy = lpc::lpc_strategy(sample_depth, coefs, quantization);
        lpc::restore_linear_prediction(
            &mut self.block_samples[offset..offset + block_size],
            coefs,
            quantization,
            strategy,
        );
        Ok(())
    }

    fn decode_residuals(
        &mut self,
        reader: &mut BitReader,
        block_size: usize,
        offset: usize,
        warm_up: usize,
    ) -> Result<()> {
        let method = reader.read_uint(2);
        if method >= 2 {
            return Err(FlacError::ReservedResidualCodingMethod);
        }
        let (param_bits, escape_param) = if method == 0 { (4, 0xF) } else { (5, 0x1F) };

        let partition_order = reader.read_uint(4);
        let num_partitions = 1usize << partition_order;
        if block_size % num_partitions != 0 {
            return Err(FlacError::BlockSizeNotDivisibleRice);
        }
        let partition_len = block_size >> partition_order;

        let mut index = offset + warm_up;
        for partition in 0..num_partitions {
            let count = if partition == 0 {
                // Warm-up samples live in the first partition.
                partition_len
                    .checked_sub(warm_up)
                    .ok_or(FlacError::BlockSizeNotDivisibleRice)?
            } else {
                partition_len
            };

            let param = reader.read_uint(param_bits);
            if param < escape_param {
                for _ in 0..count {
                    self.block_samples[index] = reader.read_rice_sint(param);
                    index += 1;
                }
            } else {
                let raw_bits = reader.read_uint(5);
                if raw_bits == 0 {
                    self.block_samples[index..index + count].fill(0);
                    index += count;
                } else {
                    for _ in 0..count {
                        self.block_samples[index] = reader.read_sint(raw_bits);
                        index += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

// Read one frame-header byte, mapping exhaustion to OutOfData so the
// caller can refill and retry rather than treating zero fill as corruption.
fn read_header_byte(reader: &mut BitReader) -> Result<u8> {
    let byte = reader.read_aligned_byte();
    if reader.out_of_data() {
        return Err(FlacError::OutOfData);
    }
    Ok(byte)
}

// Scan for 0xFF followed by a byte whose top seven bits are 0b1111100.
// Returns the byte offset of the sync code and the second sync byte.
fn find_frame_sync(reader: &mut BitReader) -> Result<(usize, u8)> {
    reader.align_to_byte();
    let mut pending_ff = false;
    loop {
        let byte = if pending_ff {
            pending_ff = false;
            0xFF
        } else {
            let byte = reader.read_aligned_byte();
            if reader.out_of_data() {
                return Err(FlacError::SyncNotFound);
            }
            byte
        };
        if byte == 0xFF {
            let second = reader.read_aligned_byte();
            if reader.out_of_data() {
                return Err(FlacError::SyncNotFound);
            }
            if second == 0xFF {
                // Could itself start a sync code; reconsider next round.
                pending_ff = true;
            } else if second >> 1 == 0x7C {
                return Ok((reader.bytes_consumed() - 2, second));
            }
        }
    }
}

fn parse_stream_info(data: &[u8]) -> Result<StreamInfo> {
    if data.len() < STREAMINFO_LEN {
        return Err(FlacError::BadHeader);
    }

    let min_block_size = u16::from_be_bytes([data[0], data[1]]);
    let max_block_size = u16::from_be_bytes([data[2], data[3]]);
    let min_frame_size =
        (u32::from(data[4]) << 16) | (u32::from(data[5]) << 8) | u32::from(data[6]);
    let max_frame_size =
        (u32::from(data[7]) << 16) | (u32::from(data[8]) << 8) | u32::from(data[9]);

    // 20 bits sample rate, 3 bits channels-1, 5 bits depth-1, 36 bits total.
    let sample_rate =
        (u32::from(data[10]) << 12) | (u32::from(data[11]) << 4) | (u32::from(data[12]) >> 4);
    let channels = ((data[12] >> 1) & 0x07) + 1;
    let sample_depth = (((data[12] & 0x01) << 4) | (data[13] >> 4)) + 1;
    let total_samples = (u64::from(data[13] & 0x0F) << 32)
        | (u64::from(data[14]) << 24)
        | (u64::from(data[15]) << 16)
        | (u64::from(data[16]) << 8)
        | u64::from(data[17]);

    let mut md5_signature = [0u8; 16];
    md5_signature.copy_from_slice(&data[18..34]);

    Ok(StreamInfo {
        min_block_size,
        max_block_size,
        min_frame_size,
        max_frame_size,
        sample_rate,
        channels,
        sample_depth,
        total_samples,
        md5_signature,
    })
}

fn validate_stream_info(info: &StreamInfo) -> Result<()> {
    if info.sample_rate == 0
        || info.channels == 0
        || info.sample_depth == 0
        || info.max_block_size == 0
    {
        return Err(FlacError::BadHeader);
    }
    if info.min_block_size < 16 || info.min_block_size > info.max_block_size {
        return Err(FlacError::BadHeader);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaminfo_bytes() -> Vec<u8> {
        // min=max=4096, no frame sizes, 44100 Hz, stereo, 16 bits, total 0.
        let mut data = vec![0u8; STREAMINFO_LEN];
        data[0..2].copy_from_slice(&4096u16.to_be_bytes());
        data[2..4].copy_from_slice(&4096u16.to_be_bytes());
        // Sample rate 44100 = 0x0AC44 across data[10..12] and high nibble of
        // data[12]; channels-1 = 1 in bits 3..1; depth-1 = 15 split over
        // data[12] bit 0 and data[13] high nibble.
        data[10] = 0x0A;
        data[11] = 0xC4;
        data[12] = 0x40 | (1 << 1) | 0x00;
        data[13] = 0xF0;
        data
    }

    #[test]
    fn parses_stream_info_fields() {
        let info = parse_stream_info(&streaminfo_bytes()).unwrap();
        assert_eq!(info.min_block_size, 4096);
        assert_eq!(info.max_block_size, 4096);
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.channels, 2);
        assert_eq!(info.sample_depth, 16);
        assert_eq!(info.total_samples, 0);
        assert_eq!(info.md5_signature, [0u8; 16]);
    }

    #[test]
    fn rejects_short_stream_info() {
        assert!(matches!(
            parse_stream_info(&[0u8; 33]),
            Err(FlacError::BadHeader)
        ));
    }

    #[test]
    fn validates_block_size_ordering() {
        let mut info = parse_stream_info(&streaminfo_bytes()).unwrap();
        validate_stream_info(&info).unwrap();

        info.min_block_size = 8;
        assert!(matches!(
            validate_stream_info(&info),
            Err(FlacError::BadHeader)
        ));

        info.min_block_size = 8192;
        assert!(matches!(
            validate_stream_info(&info),
            Err(FlacError::BadHeader)
        ));
    }

    #[test]
    fn decode_frame_requires_header() {
        let mut decoder = FlacDecoder::new();
        let mut out = [0u8; 16];
        assert!(matches!(
            decoder.decode_frame(&[0xFF, 0xF8], &mut out),
            Err(FlacError::BadHeader)
        ));
    }

    #[test]
    fn sync_scan_handles_double_ff() {
        // 0xFF 0xFF 0xF8: the second FF begins the real sync pair.
        let data = [0x00, 0xFF, 0xFF, 0xF8, 0x00];
        let mut reader = BitReader::new(&data);
        let (offset, sync1) = find_frame_sync(&mut reader).unwrap();
        assert_eq!(offset, 2);
        assert_eq!(sync1, 0xF8);
    }

    #[test]
    fn sync_scan_reports_exhaustion() {
        let data = [0x00, 0x11, 0x22, 0xFF];
        let mut reader = BitReader::new(&data);
        assert!(matches!(
            find_frame_sync(&mut reader),
            Err(FlacError::SyncNotFound)
        ));
    }
}
