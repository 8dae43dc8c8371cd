// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

#![forbid(unsafe_code)]

/*!
An `ogg/vorbis` decoder, written in Rust.

If you "just" want to decode `ogg/vorbis` files, take a look into
the `inside_ogg` module. It turns bytes into interleaved `f32` samples.

The layers below it can be used on their own: the `ogg` module splits
a byte stream into pages and packets, the `header` module parses the
three Vorbis headers, and a `session::DecoderSession` decodes the
audio packets of a stream.
*/

use thiserror::Error;

pub mod header;
mod header_cached;
mod codebook;
mod floor;
mod floor0;
mod floor1;
mod residue;
mod mapping;
mod imdct;
mod window;
pub mod audio;
mod bitpacking;
pub mod ogg;
pub mod session;
pub mod inside_ogg;
pub mod options;
pub mod samples;

pub use crate::inside_ogg::{DecodeStatus, OggStreamReader, OggVorbisDecoder};
pub use crate::options::DecodeOptions;
pub use crate::session::{DecodeOutcome, DecoderSession, PacketInfo};

/// Errors that can occur during decoding
#[derive(Debug, Error)]
pub enum VorbisError {
	#[error("Vorbis bitstream audio decode problem: {0}")]
	BadAudio(#[from] crate::audio::AudioReadError),
	#[error("Vorbis bitstream header decode problem: {0}")]
	BadHeader(#[from] crate::header::HeaderReadError),
	#[error("Ogg decode problem: {0}")]
	Ogg(#[from] crate::ogg::OggError),
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

pub(crate) fn ilog(val :u64) -> u8 {
	64 - val.leading_zeros() as u8
}

#[test]
fn test_ilog() {
	// Uses the test vectors from the Vorbis I spec
	assert_eq!(ilog(0), 0);
	assert_eq!(ilog(1), 1);
	assert_eq!(ilog(2), 2);
	assert_eq!(ilog(3), 2);
	assert_eq!(ilog(4), 3);
	assert_eq!(ilog(7), 3);
}

pub(crate) fn bit_reverse(n :u32) -> u32 {
	// From the stb_vorbis implementation
	let mut nn = n;
	nn = ((nn & 0xAAAAAAAA) >> 1) | ((nn & 0x55555555) << 1);
	nn = ((nn & 0xCCCCCCCC) >> 2) | ((nn & 0x33333333) << 2);
	nn = ((nn & 0xF0F0F0F0) >> 4) | ((nn & 0x0F0F0F0F) << 4);
	nn = ((nn & 0xFF00FF00) >> 8) | ((nn & 0x00FF00FF) << 8);
	return (nn >> 16) | (nn << 16);
}

#[test]
fn test_bit_reverse() {
	assert_eq!(bit_reverse(1), 0x8000_0000);
	assert_eq!(bit_reverse(0b1101), 0xB000_0000);
	assert_eq!(bit_reverse(0xFFFF_0000), 0x0000_FFFF);
}
