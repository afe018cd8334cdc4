//! Entry compression and decompression.
//!
//! Every payload stored in the archives is compressed with the same byte oriented LZ scheme. A
//! stream is a sequence of opcodes, each starting with a control byte:
//!
//! | Control byte  | Meaning                                                                        |
//! |---------------|--------------------------------------------------------------------------------|
//! | `0x00`        | End of stream                                                                  |
//! | `0b000nnnnn`  | Copy `n` (1-31) raw bytes                                                       |
//! | `0b001nnnnn`  | Copy `n * 0x100 + next` raw bytes                                               |
//! | `0b0100nnnn`  | Repeat the next byte `n + 4` times                                              |
//! | `0b0101nnnn`  | Repeat the byte after next `n * 0x100 + next + 4` times                        |
//! | `0b1lldddddd` | Copy `l + 4` bytes from `d * 0x100 + next` bytes back in the output            |
//! | `0b011nnnnn`  | Only valid directly after a backreference: extend it by another `n` bytes      |
//!
//! Decoded data is always returned padded with zeros to a multiple of 16 bytes.

use std::collections::{HashMap, VecDeque};

use tracing::instrument;

use crate::error::{DecompressionError, Result};
use crate::layout::align;

/// Marks the end of a compressed stream
pub const END_OF_STREAM: u8 = 0x00;

/// Decoded data is padded to this many bytes
pub const DECODED_ALIGNMENT: usize = 0x10;

const MIN_MATCH: usize = 4;
const MAX_DISPLACEMENT: usize = 0x1FFF;
const MAX_DIRECT: usize = 0x1FFF;
const SHORT_DIRECT_LIMIT: usize = 0x1F;
const MAX_RUN: usize = 0x1F3;
const SHORT_RUN_LIMIT: usize = 0x13;
const MAX_INLINE_EXTENSION: usize = 3;
const MAX_CONTINUATION: usize = 0x1F;

const BACKREFERENCE: u8 = 0x80;
const REPEAT: u8 = 0x40;
const REPEAT_EXTENDED: u8 = 0x50;
const DIRECT_EXTENDED: u8 = 0x20;
const CONTINUATION: u8 = 0x60;
const CONTINUATION_MASK: u8 = 0xE0;

struct Stream<'a> {
    input: &'a [u8],
    position: usize,
}

impl<'a> Stream<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    fn next(&mut self) -> core::result::Result<u8, DecompressionError> {
        let byte = self.peek().ok_or(DecompressionError::Truncated {
            position: self.position,
        })?;
        self.position += 1;
        Ok(byte)
    }

    fn take(&mut self, count: usize) -> core::result::Result<&'a [u8], DecompressionError> {
        let bytes = self
            .input
            .get(self.position..self.position + count)
            .ok_or(DecompressionError::Truncated {
                position: self.input.len(),
            })?;
        self.position += count;
        Ok(bytes)
    }
}

fn copy_back(output: &mut Vec<u8>, source: usize, count: usize) {
    // Byte by byte so that overlapping sources repeat the pattern
    for i in source..source + count {
        let byte = output[i];
        output.push(byte);
    }
}

/// Decompress a stream, stopping at an end of stream opcode or the end of the input.
#[instrument(skip_all, err, fields(size = input.len()))]
pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    let mut stream = Stream { input, position: 0 };
    let mut output = Vec::with_capacity(input.len() * 2);

    while let Some(control) = stream.peek() {
        let position = stream.position;
        stream.position += 1;

        if control == END_OF_STREAM {
            break;
        }

        if control & BACKREFERENCE != 0 {
            let count = ((control & 0x60) >> 5) as usize + MIN_MATCH;
            let displacement = stream.next()? as usize + (control & 0x1F) as usize * 0x100;
            if displacement == 0 || displacement > output.len() {
                return Err(DecompressionError::InvalidBackreference {
                    position,
                    displacement,
                    available: output.len(),
                }
                .into());
            }

            let mut source = output.len() - displacement;
            copy_back(&mut output, source, count);
            source += count;

            while let Some(next) = stream.peek() {
                if next & CONTINUATION_MASK != CONTINUATION {
                    break;
                }
                stream.position += 1;

                let extra = (next & 0x1F) as usize;
                copy_back(&mut output, source, extra);
                source += extra;
            }
        } else if control & REPEAT != 0 {
            let count = if control & 0x10 == 0 {
                (control & 0x0F) as usize + MIN_MATCH
            } else {
                stream.next()? as usize + (control & 0x0F) as usize * 0x100 + MIN_MATCH
            };
            let value = stream.next()?;
            output.resize(output.len() + count, value);
        } else {
            let count = if control & DIRECT_EXTENDED == 0 {
                control as usize
            } else {
                stream.next()? as usize + (control & 0x1F) as usize * 0x100
            };
            output.extend_from_slice(stream.take(count)?);
        }
    }

    // Undo the reserve byte appended by the encoder
    if output.len() % DECODED_ALIGNMENT == 1 && output.last() == Some(&0) {
        output.pop();
    }
    output.resize(align(output.len(), DECODED_ALIGNMENT), 0);

    Ok(output)
}

struct Encoder<'a> {
    data: &'a [u8],
    output: Vec<u8>,
    pending: usize,
    history: HashMap<[u8; MIN_MATCH], VecDeque<usize>>,
}

impl Encoder<'_> {
    fn flush_direct(&mut self, at: usize) {
        let count = self.pending;
        if count == 0 {
            return;
        }

        if count <= SHORT_DIRECT_LIMIT {
            self.output.push(count as u8);
        } else {
            self.output
                .extend_from_slice(&[DIRECT_EXTENDED | (count >> 8) as u8, count as u8]);
        }
        self.output.extend_from_slice(&self.data[at - count..at]);
        self.pending = 0;
    }

    fn run_length(&self, at: usize) -> usize {
        let value = self.data[at];
        self.data[at..]
            .iter()
            .take(MAX_RUN)
            .take_while(|&&b| b == value)
            .count()
    }

    fn emit_run(&mut self, at: usize, count: usize) {
        if count <= SHORT_RUN_LIMIT {
            self.output.push(REPEAT | (count - MIN_MATCH) as u8);
        } else {
            let encoded = count - MIN_MATCH;
            self.output
                .extend_from_slice(&[REPEAT_EXTENDED | (encoded >> 8) as u8, encoded as u8]);
        }
        self.output.push(self.data[at]);
    }

    /// Longest match for the data at `at` among earlier positions sharing its first four bytes.
    fn longest_match(&mut self, at: usize, key: [u8; MIN_MATCH]) -> Option<(usize, usize)> {
        let data = self.data;
        let candidates = self.history.get_mut(&key)?;
        while candidates
            .front()
            .is_some_and(|&p| at - p > MAX_DISPLACEMENT)
        {
            candidates.pop_front();
        }

        let limit = data.len() - at;
        let mut best: Option<(usize, usize)> = None;
        for &candidate in candidates.iter().rev() {
            let length = data[at..]
                .iter()
                .zip(&data[candidate..])
                .take_while(|(a, b)| a == b)
                .count();
            if best.map_or(true, |(_, l)| length > l) {
                best = Some((candidate, length));
            }
            if length == limit {
                break;
            }
        }

        best.filter(|&(_, length)| length >= MIN_MATCH)
    }

    fn emit_backreference(&mut self, at: usize, source: usize, length: usize) {
        let displacement = at - source;
        let inline = (length - MIN_MATCH).min(MAX_INLINE_EXTENSION);
        let mut remaining = length - MIN_MATCH - inline;

        self.output.extend_from_slice(&[
            BACKREFERENCE | (inline as u8) << 5 | (displacement >> 8) as u8,
            displacement as u8,
        ]);
        while remaining > 0 {
            let extra = remaining.min(MAX_CONTINUATION);
            self.output.push(CONTINUATION | extra as u8);
            remaining -= extra;
        }
    }

    fn remember(&mut self, at: usize, key: [u8; MIN_MATCH]) {
        self.history.entry(key).or_default().push_back(at);
    }
}

/// Compress data so that [`decompress`] restores it (zero padded to a multiple of 16 bytes).
///
/// No end of stream opcode is written; containers terminate the stream themselves.
#[instrument(skip_all, fields(size = input.len()))]
pub fn compress(input: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(input.len() + 1);
    data.extend_from_slice(input);
    data.push(0x00);

    // The reserve byte must be written out when the decoder would otherwise drop a real zero
    let end = if input.len() % DECODED_ALIGNMENT == 1 && input.last() == Some(&0) {
        data.len()
    } else {
        input.len()
    };

    let mut encoder = Encoder {
        data: &data,
        output: Vec::with_capacity(input.len() / 2 + 16),
        pending: 0,
        history: HashMap::new(),
    };

    let mut at = 0;
    while at < end {
        let key: Option<[u8; MIN_MATCH]> = data[at..end.min(at + MIN_MATCH)].try_into().ok();

        if let Some(key) = key {
            if key.iter().all(|&b| b == key[0]) {
                encoder.flush_direct(at);
                let count = encoder.run_length(at);
                encoder.emit_run(at, count);
                at += count;
                continue;
            }

            if let Some((source, length)) = encoder.longest_match(at, key) {
                encoder.flush_direct(at);
                encoder.emit_backreference(at, source, length);
                encoder.remember(at, key);
                at += length;
                continue;
            }

            encoder.remember(at, key);
        }

        if encoder.pending == MAX_DIRECT {
            encoder.flush_direct(at);
        }
        encoder.pending += 1;
        at += 1;
    }
    encoder.flush_direct(at);

    encoder.output
}
