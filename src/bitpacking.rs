// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Vorbis bitpacking layer

Functionality to read content from the bitpacking layer.

Implements vorbis spec, section 2: values are packed least significant
bit first into each octet, and an octet boundary in the middle of a
value contributes the higher bits from the following octet.

The most important struct of this mod is the `BitpackCursor` struct.
It can be instantiated using `BitpackCursor::new()`.

Running past the end of the packet is reported via the `OutOfData` error.
Once that happened, the cursor is "exhausted" and every further read
fails too, matching what the bitstream spec requires for truncated
packets: decoding stops, whatever was decoded so far stands.
*/

use thiserror::Error;

/// The cursor ran past the end of the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("end of packet reached")]
pub struct OutOfData;

/// A Cursor on slices to read numbers and bitflags, bit aligned.
#[derive(Clone)]
pub struct BitpackCursor <'a> {
	bit_cursor :u8,
	byte_cursor :usize,
	inner :&'a[u8],
	exhausted :bool,
}

macro_rules! bpc_read_fn {
( $name:ident, $rettype:ident, $bitnum:expr ) => {
	#[inline]
	pub fn $name(&mut self) -> Result<$rettype, OutOfData> {
		Ok(self.read($bitnum)? as $rettype)
	}
}
}

impl <'a> BitpackCursor <'a> {
	/// Creates a new `BitpackCursor` for the given slice
	pub fn new(arr :&'a[u8]) -> BitpackCursor<'a> {
		BitpackCursor {
			bit_cursor : 0,
			byte_cursor : 0,
			inner : arr,
			exhausted : false,
		}
	}

	/// Number of bits that can still be read
	pub fn bits_left(&self) -> usize {
		if self.exhausted {
			return 0;
		}
		self.inner.len() * 8 - self.byte_cursor * 8 - self.bit_cursor as usize
	}

	/// Number of bits consumed so far
	pub fn bits_read(&self) -> usize {
		if self.exhausted {
			return self.inner.len() * 8;
		}
		self.byte_cursor * 8 + self.bit_cursor as usize
	}

	/// Whether a read has already run past the end of the packet
	pub fn is_exhausted(&self) -> bool {
		self.exhausted
	}

	fn mark_exhausted(&mut self) -> OutOfData {
		self.exhausted = true;
		self.byte_cursor = self.inner.len();
		self.bit_cursor = 0;
		OutOfData
	}

	/// Returns the next `bit_count` bits (at most 32) without advancing.
	///
	/// Unlike `read`, a failing peek doesn't exhaust the cursor,
	/// so callers may retry with a lower bit count.
	pub fn peek(&self, bit_count :u8) -> Result<u32, OutOfData> {
		debug_assert!(bit_count <= 32);
		if bit_count == 0 {
			return Ok(0);
		}
		if self.exhausted || (bit_count as usize) > self.bits_left() {
			return Err(OutOfData);
		}
		let octets = (self.bit_cursor as usize + bit_count as usize + 7) / 8;
		let mut acc :u64 = 0;
		for (i, b) in self.inner[self.byte_cursor .. self.byte_cursor + octets]
				.iter().enumerate() {
			acc |= (*b as u64) << (8 * i);
		}
		acc >>= self.bit_cursor;
		let mask = (1u64 << bit_count) - 1;
		Ok((acc & mask) as u32)
	}

	/// Skips `bit_count` bits.
	///
	/// Skipping past the end exhausts the cursor.
	pub fn advance(&mut self, bit_count :usize) -> Result<(), OutOfData> {
		if self.exhausted || bit_count > self.bits_left() {
			return Err(self.mark_exhausted());
		}
		let pos = self.bit_cursor as usize + bit_count;
		self.byte_cursor += pos / 8;
		self.bit_cursor = (pos % 8) as u8;
		Ok(())
	}

	/// Reads `bit_count` bits (at most 32) and advances.
	pub fn read(&mut self, bit_count :u8) -> Result<u32, OutOfData> {
		match self.peek(bit_count) {
			Ok(v) => {
				self.advance(bit_count as usize)?;
				Ok(v)
			},
			Err(_) => Err(self.mark_exhausted()),
		}
	}

	/// Reads a single bit as flag
	#[inline]
	pub fn read_bit_flag(&mut self) -> Result<bool, OutOfData> {
		Ok(self.read(1)? == 1)
	}

	/// Reads `bit_count` bits (at most 32) into an usize
	#[inline]
	pub fn read_dyn_usize(&mut self, bit_count :u8) -> Result<usize, OutOfData> {
		Ok(self.read(bit_count)? as usize)
	}

	bpc_read_fn!(read_u2, u8, 2);
	bpc_read_fn!(read_u3, u8, 3);
	bpc_read_fn!(read_u4, u8, 4);
	bpc_read_fn!(read_u5, u8, 5);
	bpc_read_fn!(read_u6, u8, 6);
	bpc_read_fn!(read_u8, u8, 8);
	bpc_read_fn!(read_u16, u16, 16);
	bpc_read_fn!(read_u24, u32, 24);
	bpc_read_fn!(read_u32, u32, 32);
	bpc_read_fn!(read_i32, i32, 32);
}

#[test]
fn test_bitpacking_reader_static() {
	// Test vectors taken from Vorbis I spec, section 2.1.6
	let test_arr = &[0b11111100, 0b01001000, 0b11001110, 0b00000110];
	let mut cur = BitpackCursor::new(test_arr);
	assert_eq!(cur.read_u4().unwrap(),  12);
	assert_eq!(cur.read(3).unwrap(),  7);
	assert_eq!(cur.read(7).unwrap(),  17);
	assert_eq!(cur.read(13).unwrap(), 6969);
	assert_eq!(cur.bits_read(), 27);
	assert_eq!(cur.bits_left(), 5);
}

#[test]
fn test_capture_pattern_nonaligned() {
	// Codebook sync pattern, read after a single leading bit
	let test_arr = &[0x84, 0x86, 0xac, 0x00];
	let mut cur = BitpackCursor::new(test_arr);
	assert_eq!(cur.read_bit_flag().unwrap(), false);
	assert_eq!(cur.read_u24().unwrap(), 0x564342);
	let test_arr = &[0x42, 0x43, 0x56];
	let mut cur = BitpackCursor::new(test_arr);
	assert_eq!(cur.read_u24().unwrap(), 0x564342);
}

#[test]
fn test_peek_does_not_advance() {
	let test_arr = &[0b1010_1100, 0xff];
	let mut cur = BitpackCursor::new(test_arr);
	assert_eq!(cur.peek(4).unwrap(), 0b1100);
	assert_eq!(cur.peek(4).unwrap(), 0b1100);
	cur.advance(2).unwrap();
	assert_eq!(cur.peek(8).unwrap(), 0b1110_1011);
	assert_eq!(cur.peek(0).unwrap(), 0);
	assert_eq!(cur.read_u32(), Err(OutOfData));
}

#[test]
fn test_full_width_read() {
	let test_arr = &[0x78, 0x56, 0x34, 0x12, 0xff];
	let mut cur = BitpackCursor::new(test_arr);
	assert_eq!(cur.read_u32().unwrap(), 0x12345678);
	assert_eq!(cur.read_u8().unwrap(), 0xff);
	let test_arr = &[0xff, 0xff, 0xff, 0xff, 0xff];
	let mut cur = BitpackCursor::new(test_arr);
	cur.advance(3).unwrap();
	assert_eq!(cur.read(32).unwrap(), 0xffff_ffff);
	assert_eq!(cur.read_i32(), Err(OutOfData));
}

#[test]
fn test_out_of_data_is_sticky() {
	let test_arr = &[0xff];
	let mut cur = BitpackCursor::new(test_arr);
	assert_eq!(cur.read(5).unwrap(), 0b11111);
	// A failing peek leaves the cursor alone
	assert_eq!(cur.peek(4), Err(OutOfData));
	assert!(!cur.is_exhausted());
	assert_eq!(cur.read(3).unwrap(), 0b111);
	assert_eq!(cur.read(1), Err(OutOfData));
	assert!(cur.is_exhausted());
	// Even zero bit reads keep failing now
	assert_eq!(cur.read(0), Err(OutOfData));
	assert_eq!(cur.bits_left(), 0);

	let mut cur = BitpackCursor::new(&[]);
	assert_eq!(cur.read_bit_flag(), Err(OutOfData));
	let mut cur = BitpackCursor::new(test_arr);
	assert_eq!(cur.advance(9), Err(OutOfData));
	assert_eq!(cur.read(1), Err(OutOfData));
}

/// Packs values the way `BitpackCursor` reads them, for building test streams
#[cfg(test)]
pub(crate) struct BitpackWriter {
	buf :Vec<u8>,
	bit_cursor :u8,
}

#[cfg(test)]
impl BitpackWriter {
	pub fn new() -> Self {
		BitpackWriter { buf : Vec::new(), bit_cursor : 0 }
	}
	pub fn write(&mut self, val :u32, bit_count :u8) -> &mut Self {
		for i in 0 .. bit_count {
			if self.bit_cursor == 0 {
				self.buf.push(0);
			}
			let bit = ((val >> i) & 1) as u8;
			if let Some(last) = self.buf.last_mut() {
				*last |= bit << self.bit_cursor;
			}
			self.bit_cursor = (self.bit_cursor + 1) % 8;
		}
		self
	}
	pub fn write_flag(&mut self, flag :bool) -> &mut Self {
		self.write(flag as u32, 1)
	}
	/// Writes a huffman codeword, most significant bit first
	pub fn write_codeword(&mut self, word :u32, len :u8) -> &mut Self {
		for b in (0 .. len).rev() {
			self.write((word >> b) & 1, 1);
		}
		self
	}
	pub fn into_inner(self) -> Vec<u8> {
		self.buf
	}
}

#[test]
fn test_writer_reader_agree() {
	let mut w = BitpackWriter::new();
	w.write(12, 4).write(7, 3).write(17, 7).write(6969, 13);
	let v = w.into_inner();
	assert_eq!(v, &[0b11111100, 0b01001000, 0b11001110, 0b00000110]);
}
