//! Property-based tests for the incremental bit reader.
//!
//! The reader is checked against a naive bit-at-a-time model, and the
//! rewind/consume contract that the streaming decoder depends on is
//! exercised at arbitrary split points.

use proptest::prelude::*;
use streamflac::BitReader;

// Naive MSB-first extraction of `bits` bits starting at `bit_pos`.
fn model_read(data: &[u8], bit_pos: usize, bits: u32) -> u64 {
    let mut value = 0u64;
    for i in 0..bits as usize {
        let pos = bit_pos + i;
        let bit = (data[pos / 8] >> (7 - pos % 8)) & 1;
        value = (value << 1) | u64::from(bit);
    }
    value
}

// MSB-first encoder used to generate Rice-coded input.
struct Sink {
    bytes: Vec<u8>,
    acc: u8,
    nbits: u32,
}

impl Sink {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            acc: 0,
            nbits: 0,
        }
    }

    fn put(&mut self, value: u64, bits: u32) {
        for i in (0..bits).rev() {
            self.acc = (self.acc << 1) | ((value >> i) & 1) as u8;
            self.nbits += 1;
            if self.nbits == 8 {
                self.bytes.push(self.acc);
                self.acc = 0;
                self.nbits = 0;
            }
        }
    }

    fn put_rice(&mut self, value: i32, k: u32) {
        let folded = if value < 0 {
            ((u64::from(value.unsigned_abs())) << 1) - 1
        } else {
            (value as u64) << 1
        };
        let quotient = folded >> k;
        for _ in 0..quotient {
            self.put(0, 1);
        }
        self.put(1, 1);
        if k > 0 {
            self.put(folded & ((1 << k) - 1), k);
        }
    }

    fn into_bytes(mut self) -> Vec<u8> {
        while self.nbits != 0 {
            self.put(0, 1);
        }
        self.bytes
    }
}

proptest! {
    /// read_uint agrees with the naive model for any sequence of widths.
    #[test]
    fn read_uint_matches_model(
        data in prop::collection::vec(any::<u8>(), 16..64),
        widths in prop::collection::vec(1u32..=32, 1..32),
    ) {
        let mut reader = BitReader::new(&data);
        let mut bit_pos = 0usize;
        for &w in &widths {
            if bit_pos + w as usize > data.len() * 8 {
                break;
            }
            let expected = model_read(&data, bit_pos, w) as u32;
            prop_assert_eq!(reader.read_uint(w), expected);
            prop_assert!(!reader.out_of_data());
            bit_pos += w as usize;
        }
    }

    /// read_sint agrees with sign extension of the model value.
    #[test]
    fn read_sint_matches_model(
        data in prop::collection::vec(any::<u8>(), 16..64),
        widths in prop::collection::vec(1u32..=32, 1..32),
    ) {
        let mut reader = BitReader::new(&data);
        let mut bit_pos = 0usize;
        for &w in &widths {
            if bit_pos + w as usize > data.len() * 8 {
                break;
            }
            let raw = model_read(&data, bit_pos, w);
            let shift = 64 - w;
            let expected = (((raw << shift) as i64) >> shift) as i32;
            prop_assert_eq!(reader.read_sint(w), expected);
            bit_pos += w as usize;
        }
    }

    /// Rice values survive an encode/decode round trip.
    #[test]
    fn rice_roundtrip(
        values in prop::collection::vec(-500i32..=500, 1..32),
        k in 0u32..=14,
    ) {
        let mut sink = Sink::new();
        for &v in &values {
            sink.put_rice(v, k);
        }
        let data = sink.into_bytes();

        let mut reader = BitReader::new(&data);
        for (i, &expected) in values.iter().enumerate() {
            prop_assert_eq!(reader.read_rice_sint(k), expected, "index {}", i);
        }
        prop_assert!(!reader.out_of_data());
    }

    /// After aligning, consumed bytes equal the bit count rounded up, and a
    /// second align changes nothing.
    #[test]
    fn align_consumes_to_ceiling_and_is_idempotent(
        data in prop::collection::vec(any::<u8>(), 8..32),
        bits in 1usize..=64,
    ) {
        let bits = bits.min(data.len() * 8);
        let mut reader = BitReader::new(&data);
        let mut taken = 0usize;
        while taken < bits {
            let step = (bits - taken).min(7) as u32;
            reader.read_uint(step);
            taken += step as usize;
        }

        reader.align_to_byte();
        reader.align_to_byte();
        reader.rewind_to_byte_boundary();
        prop_assert_eq!(reader.bytes_consumed(), (bits + 7) / 8);
    }

    /// Rewinding at a byte boundary and resuming on the remainder reads the
    /// same values as one uninterrupted pass.
    #[test]
    fn rewind_then_resume_is_seamless(
        data in prop::collection::vec(any::<u8>(), 12..48),
        first_reads in prop::collection::vec(1u32..=4, 1..4),
        second_reads in prop::collection::vec(1u32..=4, 1..4),
    ) {
        // Whole-byte widths keep every stop point rewindable.
        let widths_a: Vec<u32> = first_reads.iter().map(|w| w * 8).collect();
        let widths_b: Vec<u32> = second_reads.iter().map(|w| w * 8).collect();
        let total: usize = widths_a.iter().chain(&widths_b).map(|&w| w as usize / 8).sum();
        prop_assume!(total <= data.len());

        let mut continuous = BitReader::new(&data);
        let mut expected = Vec::new();
        for &w in widths_a.iter().chain(&widths_b) {
            expected.push(continuous.read_uint(w));
        }

        let mut first = BitReader::new(&data);
        let mut got = Vec::new();
        for &w in &widths_a {
            got.push(first.read_uint(w));
        }
        first.rewind_to_byte_boundary();
        let consumed = first.bytes_consumed();

        let mut second = BitReader::new(&data[consumed..]);
        for &w in &widths_b {
            got.push(second.read_uint(w));
        }

        prop_assert_eq!(got, expected);
    }
}

#[test]
fn exhaustion_returns_zero_and_sets_flag() {
    let data = [0xFFu8; 2];
    let mut reader = BitReader::new(&data);
    assert_eq!(reader.read_uint(16), 0xFFFF);
    assert_eq!(reader.read_uint(1), 0);
    assert!(reader.out_of_data());
}
