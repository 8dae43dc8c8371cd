// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Audio packet decoding

This module decodes the audio packets given to it into blocks
of time domain data. Overlapping the blocks is up to the session.
*/

use std::ops::AddAssign;

use log::trace;
use thiserror::Error;

use crate::bitpacking::{BitpackCursor, OutOfData};
use crate::header::{IdentHeader, SetupHeader};
use crate::header_cached::StreamLookups;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AudioReadError {
	#[error("end of packet reached")]
	EndOfPacket,
	/// The packet selects a mode the setup header doesn't declare
	#[error("invalid audio packet")]
	AudioBadFormat,
	#[error("the packet is a header packet")]
	AudioIsHeader,
	/// A block was fed while decoded samples were still pending.
	///
	/// Consume the available samples first.
	#[error("decoded samples have not been consumed yet")]
	PcmPending,
}

impl From<OutOfData> for AudioReadError {
	fn from(_ :OutOfData) -> AudioReadError {
		AudioReadError::EndOfPacket
	}
}

/// Bits spent on the parts of audio packets
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BitCounters {
	/// Packet type, mode and window flags
	pub glue :u64,
	pub floor :u64,
	pub residue :u64,
}

impl AddAssign for BitCounters {
	fn add_assign(&mut self, other :BitCounters) {
		self.glue += other.glue;
		self.floor += other.floor;
		self.residue += other.residue;
	}
}

/// A decoded block, before overlapping
pub(crate) struct Block {
	/// Whether this is a long block
	pub long :bool,
	/// Time domain data of each channel, as long as the block
	pub pcm :Vec<Vec<f32>>,
	pub bits :BitCounters,
}

struct PacketMode {
	long :bool,
	mapping :usize,
	/// Previous and next window flags, only present for long blocks
	window_flags :Option<(bool, bool)>,
}

fn read_packet_mode(setup :&SetupHeader, look :&StreamLookups, rdr :&mut BitpackCursor)
		-> Result<PacketMode, AudioReadError> {
	if rdr.read_bit_flag()? {
		return Err(AudioReadError::AudioIsHeader);
	}
	let mode_number = rdr.read_dyn_usize(look.mode_bits)?;
	let mode = setup.modes.get(mode_number)
		.ok_or(AudioReadError::AudioBadFormat)?;
	let window_flags = if mode.blockflag {
		Some((rdr.read_bit_flag()?, rdr.read_bit_flag()?))
	} else {
		None
	};
	Ok(PacketMode {
		long : mode.blockflag,
		mapping : mode.mapping as usize,
		window_flags,
	})
}

/// Decodes an audio packet into a block
pub(crate) fn decode_block(ident :&IdentHeader, setup :&SetupHeader,
		look :&StreamLookups, packet :&[u8]) -> Result<Block, AudioReadError> {
	let mut rdr = BitpackCursor::new(packet);
	let mode = read_packet_mode(setup, look, &mut rdr)?;
	let glue = rdr.bits_read() as u64;

	let n = ident.blocksize(mode.long);
	let mut pcm = vec![vec![0.; n]; ident.audio_channels as usize];
	let mapping = &setup.mappings[mode.mapping];
	let mut bits = mapping.inverse(&setup.codebooks, look, &mut rdr, &mut pcm, mode.long);
	bits.glue = glue;
	trace!("decoded block: size {}, window flags {:?}, bits {:?}",
		n, mode.window_flags, bits);
	Ok(Block {
		long : mode.long,
		pcm,
		bits,
	})
}

/**
Returns the per-channel sample count of a packet if it were decoded.

This operation is very cheap and doesn't involve actual decoding of the packet.

The count is attributed the way the window shapes suggest: a long
block followed by a short one completes its flat part right away,
and the short block after it completes correspondingly less. Summed
over a stream, the counts match what decoding yields, but for a
single packet they can differ from the amount a session makes
available after it. The first packet of a stream yields no samples
when decoded, while this function returns a nonzero number.
*/
pub fn get_decoded_sample_count(ident :&IdentHeader, setup :&SetupHeader, packet :&[u8])
		-> Result<usize, AudioReadError> {
	let mut rdr = BitpackCursor::new(packet);
	if rdr.read_bit_flag()? {
		return Err(AudioReadError::AudioIsHeader);
	}
	let mode_bits = crate::ilog(setup.modes.len() as u64 - 1);
	let mode_number = rdr.read_dyn_usize(mode_bits)?;
	let mode = setup.modes.get(mode_number)
		.ok_or(AudioReadError::AudioBadFormat)?;
	let n = ident.blocksize(mode.blockflag);
	let bs0 = ident.blocksize(false);
	let (prev_long, next_long) = if mode.blockflag {
		(rdr.read_bit_flag()?, rdr.read_bit_flag()?)
	} else {
		(true, true)
	};
	let left_win_start = if prev_long {
		0
	} else {
		(n - bs0) >> 2
	};
	let right_win_start = if next_long {
		n >> 1
	} else {
		(n * 3 - bs0) >> 2
	};
	Ok(right_win_start - left_win_start)
}

#[cfg(test)]
fn mono_stream() -> (IdentHeader, SetupHeader, StreamLookups) {
	use crate::header::{read_header_ident, read_header_setup, test_packets};
	let ident = read_header_ident(&test_packets::ident(1, 44100, 8, 11)).unwrap();
	let setup = read_header_setup(&test_packets::mono_setup(0), 1, (8, 11)).unwrap();
	let look = StreamLookups::new(&ident, &setup);
	(ident, setup, look)
}

#[test]
fn test_decode_block() {
	use crate::header::test_packets::mono_audio;
	let (ident, setup, look) = mono_stream();

	let packet = mono_audio(false, (false, false), None, &|_| true);
	let block = decode_block(&ident, &setup, &look, &packet).unwrap();
	assert!(!block.long);
	assert_eq!(block.pcm.len(), 1);
	assert_eq!(block.pcm[0].len(), 256);
	assert!(block.pcm[0].iter().all(|v| *v == 0.));
	assert_eq!(block.bits, BitCounters { glue : 2, floor : 1, residue : 0 });

	let packet = mono_audio(true, (true, false), Some((100, 140)), &|i| i % 3 == 0);
	let block = decode_block(&ident, &setup, &look, &packet).unwrap();
	assert!(block.long);
	assert_eq!(block.pcm[0].len(), 2048);
	assert!(block.pcm[0].iter().any(|v| *v != 0.));
	assert!(block.pcm[0].iter().all(|v| v.is_finite()));
	assert_eq!(block.bits, BitCounters { glue : 4, floor : 17, residue : 132 });
}

#[test]
fn test_decode_block_errors() {
	let (ident, mut setup, _) = mono_stream();
	let look = StreamLookups::new(&ident, &setup);
	assert_eq!(decode_block(&ident, &setup, &look, &[]).err(),
		Some(AudioReadError::EndOfPacket));
	assert_eq!(decode_block(&ident, &setup, &look, &[0x05]).err(),
		Some(AudioReadError::AudioIsHeader));
	// Silent long block
	let block = decode_block(&ident, &setup, &look, &[0b10]).unwrap();
	assert!(block.long);
	assert!(block.pcm[0].iter().all(|v| *v == 0.));

	// With three modes, mode 3 doesn't exist
	let mode = setup.modes[0];
	setup.modes.push(mode);
	let look = StreamLookups::new(&ident, &setup);
	assert_eq!(look.mode_bits, 2);
	assert_eq!(decode_block(&ident, &setup, &look, &[0b110]).err(),
		Some(AudioReadError::AudioBadFormat));
}

#[test]
fn test_get_decoded_sample_count() {
	use crate::header::test_packets::mono_audio;
	let (ident, setup, _) = mono_stream();
	let count = |long, flags| {
		let packet = mono_audio(long, flags, None, &|_| false);
		get_decoded_sample_count(&ident, &setup, &packet).unwrap()
	};
	assert_eq!(count(false, (false, false)), 128);
	assert_eq!(count(true, (true, true)), 1024);
	assert_eq!(count(true, (false, true)), 576);
	assert_eq!(count(true, (true, false)), 1472);
	assert_eq!(count(true, (false, false)), 1024);
	assert_eq!(get_decoded_sample_count(&ident, &setup, &[1]),
		Err(AudioReadError::AudioIsHeader));
}

#[test]
fn test_bit_counters_add() {
	let mut a = BitCounters { glue : 1, floor : 2, residue : 3 };
	a += BitCounters { glue : 10, floor : 20, residue : 30 };
	assert_eq!(a, BitCounters { glue : 11, floor : 22, residue : 33 });
}
