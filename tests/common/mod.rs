// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Synthetic ogg/vorbis streams

Builds header and audio packets for a tiny codec setup and lays them
into pages. The setup has two codebooks, one floor 1 without
partitions, and a residue over the first 128 bins of each channel.
Two channel streams use residue 2 and square polar coupling.
*/

#![allow(dead_code)]

use byteorder::{ByteOrder, LittleEndian};
use vorbis_core::ogg::crc;
use vorbis_core::{DecodeOptions, DecodeStatus, OggVorbisDecoder, VorbisError};

pub const SERIAL :u32 = 0x0bad_cafe;

pub fn init_logger() {
	let _ = env_logger::builder().is_test(true).try_init();
}

/// LSB first bit writer
pub struct BitWriter {
	buf :Vec<u8>,
	bit :usize,
}

impl BitWriter {
	pub fn new() -> Self {
		BitWriter { buf : Vec::new(), bit : 0 }
	}
	pub fn write(&mut self, val :u32, bits :u8) -> &mut Self {
		for i in 0 .. bits {
			if self.bit % 8 == 0 {
				self.buf.push(0);
			}
			if (val >> i) & 1 == 1 {
				let last = self.buf.len() - 1;
				self.buf[last] |= 1 << (self.bit % 8);
			}
			self.bit += 1;
		}
		self
	}
	pub fn write_flag(&mut self, flag :bool) -> &mut Self {
		self.write(flag as u32, 1)
	}
	pub fn into_inner(self) -> Vec<u8> {
		self.buf
	}
}

fn begin_header(w :&mut BitWriter, kind :u32) {
	w.write(kind, 8);
	for b in b"vorbis" {
		w.write(*b as u32, 8);
	}
}

pub fn ident(channels :u8, rate :u32, bs0 :u8, bs1 :u8) -> Vec<u8> {
	let mut w = BitWriter::new();
	begin_header(&mut w, 1);
	w.write(0, 32).write(channels as u32, 8).write(rate, 32);
	w.write(0, 32).write(128_000, 32).write(0, 32);
	w.write(bs0 as u32, 4).write(bs1 as u32, 4);
	w.write_flag(true);
	w.into_inner()
}

pub fn comment(vendor :&str, comments :&[&str]) -> Vec<u8> {
	let mut w = BitWriter::new();
	begin_header(&mut w, 3);
	w.write(vendor.len() as u32, 32);
	for b in vendor.bytes() {
		w.write(b as u32, 8);
	}
	w.write(comments.len() as u32, 32);
	for c in comments {
		w.write(c.len() as u32, 32);
		for b in c.bytes() {
			w.write(b as u32, 8);
		}
	}
	w.write_flag(true);
	w.into_inner()
}

pub fn setup(channels :u8) -> Vec<u8> {
	let mut w = BitWriter::new();
	begin_header(&mut w, 5);
	w.write(1, 8);
	// Book 0: a single entry, used for the residue classes
	w.write(0x564342, 24).write(1, 16).write(1, 24);
	w.write_flag(false).write_flag(false);
	w.write(0, 5);
	w.write(0, 4);
	// Book 1: two entries, valued -1 and 1
	w.write(0x564342, 24).write(1, 16).write(2, 24);
	w.write_flag(false).write_flag(false);
	w.write(0, 5).write(0, 5);
	w.write(1, 4);
	w.write(0xE280_0001, 32).write(0x62A0_0001, 32);
	w.write(0, 4).write_flag(false);
	w.write(0, 1).write(1, 1);
	// Time domain transforms
	w.write(0, 6).write(0, 16);
	// Floor 1
	w.write(0, 6).write(1, 16);
	w.write(0, 5);
	w.write(0, 2).write(7, 4);
	// Residue
	let residue_type = if channels > 1 { 2 } else { 1 };
	w.write(0, 6).write(residue_type, 16);
	w.write(0, 24).write(128 * channels as u32, 24).write(31, 24);
	w.write(0, 6).write(0, 8);
	w.write(1, 3).write_flag(false);
	w.write(1, 8);
	// Mapping
	w.write(0, 6).write(0, 16);
	w.write_flag(false);
	if channels == 2 {
		w.write_flag(true).write(0, 8);
		w.write(0, 1).write(1, 1);
	} else {
		w.write_flag(false);
	}
	w.write(0, 2);
	w.write(0, 8).write(0, 8).write(0, 8);
	// Modes
	w.write(1, 6);
	w.write_flag(false).write(0, 16).write(0, 16).write(0, 8);
	w.write_flag(true).write(0, 16).write(0, 16).write(0, 8);
	w.write_flag(true);
	w.into_inner()
}

/// Audio packet with pseudo random residue signs
pub fn audio(channels :u8, long :bool, flags :(bool, bool), seed :u32) -> Vec<u8> {
	let mut w = BitWriter::new();
	w.write(0, 1);
	w.write_flag(long);
	if long {
		w.write_flag(flags.0).write_flag(flags.1);
	}
	for ch in 0 .. channels as u32 {
		w.write_flag(true);
		w.write(100 + (seed + ch) % 40, 8).write(120 - (seed + 3 * ch) % 30, 8);
	}
	let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
	for _ in 0 .. 4 * channels as u32 {
		w.write(0, 1);
		for _ in 0 .. 32 {
			state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
			w.write((state >> 16) & 1, 1);
		}
	}
	w.into_inner()
}

/// Lays packets into pages
pub struct PageWriter {
	serial :u32,
	sequence :u32,
	max_segments :usize,
	pub out :Vec<u8>,
}

impl PageWriter {
	pub fn new(serial :u32, max_segments :usize) -> Self {
		PageWriter {
			serial,
			sequence : 0,
			max_segments,
			out : Vec::new(),
		}
	}

	/// Writes the packets, each with the granule position
	/// at its end, onto as many pages as needed
	pub fn write(&mut self, packets :&[(&[u8], i64)], bos :bool, eos :bool) {
		// (segment length, granule if a packet ends here)
		let mut segments = Vec::new();
		let mut body = Vec::new();
		for &(data, granule) in packets {
			for _ in 0 .. data.len() / 255 {
				segments.push((255u8, None));
			}
			segments.push(((data.len() % 255) as u8, Some(granule)));
			body.extend_from_slice(data);
		}

		let chunks = segments.chunks(self.max_segments).collect::<Vec<_>>();
		let mut continued = false;
		let mut offset = 0;
		for (i, chunk) in chunks.iter().enumerate() {
			let mut flags = 0;
			if continued {
				flags |= 1;
			}
			if bos && i == 0 {
				flags |= 2;
			}
			if eos && i == chunks.len() - 1 {
				flags |= 4;
			}
			let granule = chunk.iter().filter_map(|s| s.1).last().unwrap_or(-1);
			let len :usize = chunk.iter().map(|s| s.0 as usize).sum();
			let lacing = chunk.iter().map(|s| s.0).collect::<Vec<_>>();
			self.page(flags, granule, &lacing, &body[offset .. offset + len]);
			offset += len;
			continued = chunk.last().map_or(false, |s| s.1.is_none());
		}
	}

	fn page(&mut self, flags :u8, granule :i64, lacing :&[u8], body :&[u8]) {
		let mut header = vec![0; 27];
		header[.. 4].copy_from_slice(b"OggS");
		header[5] = flags;
		LittleEndian::write_i64(&mut header[6 .. 14], granule);
		LittleEndian::write_u32(&mut header[14 .. 18], self.serial);
		LittleEndian::write_u32(&mut header[18 .. 22], self.sequence);
		header[26] = lacing.len() as u8;
		header.extend_from_slice(lacing);
		let checksum = crc::page_checksum(&header, body);
		LittleEndian::write_u32(&mut header[22 .. 26], checksum);
		self.out.extend_from_slice(&header);
		self.out.extend_from_slice(body);
		self.sequence += 1;
	}
}

/// Block size exponents used by all synthetic streams
pub const BLOCKSIZES :(u8, u8) = (8, 11);

fn blocksize(long :bool) -> i64 {
	1 << if long { BLOCKSIZES.1 } else { BLOCKSIZES.0 }
}

/// A complete stream with one audio packet per entry of `pattern`,
/// `true` for long blocks. The last `cut` samples are cut off by the
/// final granule position. Returns the stream and its sample count.
pub fn synth_stream(channels :u8, pattern :&[bool], cut :i64, max_segments :usize) -> (Vec<u8>, i64) {
	let mut pw = PageWriter::new(SERIAL, max_segments);
	pw.write(&[(&ident(channels, 44100, BLOCKSIZES.0, BLOCKSIZES.1)[..], 0)], true, false);
	let long_comment = format!("DESCRIPTION={}", "la".repeat(300));
	pw.write(&[
		(&comment("synth", &["TITLE=noise", &long_comment])[..], 0),
		(&setup(channels)[..], 0),
	], false, false);

	let mut packets = Vec::new();
	let mut granule = 0;
	for (i, &long) in pattern.iter().enumerate() {
		let prev = if i > 0 { pattern[i - 1] } else { long };
		let next = pattern.get(i + 1).cloned().unwrap_or(long);
		if i > 0 {
			granule += blocksize(prev) / 4 + blocksize(long) / 4;
		}
		packets.push((audio(channels, long, (prev, next), i as u32), granule));
	}
	let total = granule - cut;
	if let Some(last) = packets.last_mut() {
		last.1 = total;
	}

	let count = packets.len();
	for (i, group) in packets.chunks(4).enumerate() {
		let refs = group.iter().map(|(p, g)| (&p[..], *g)).collect::<Vec<_>>();
		pw.write(&refs, false, (i + 1) * 4 >= count);
	}
	(pw.out, total)
}

/// Decodes everything, feeding `chunk` bytes at a time.
///
/// Returns the interleaved samples.
pub fn decode_chunked(data :&[u8], chunk :usize, options :DecodeOptions)
		-> Result<Vec<f32>, VorbisError> {
	let mut dec = OggVorbisDecoder::new(options);
	let mut pcm = Vec::new();
	for c in data.chunks(chunk) {
		dec.feed_bytes(c);
		loop {
			match dec.decode()? {
				DecodeStatus::PcmReady(n) => {
					pcm.extend_from_slice(dec.pcm_out(n));
					dec.consumed(n);
				},
				_ => break,
			}
		}
	}
	Ok(pcm)
}
