// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Decoder session

A session owns everything needed to decode the audio packets of one
logical stream: the headers, the tables derived from them, and the
overlap history. Feed it the audio packets in order, then take the
samples that became available out of it before feeding the next one.

Samples of a block are only complete once the next block has been
overlapped onto it, so the first packet of a stream never yields any.
*/

use log::{debug, trace};

use crate::audio::{self, AudioReadError, BitCounters};
use crate::header::{CommentHeader, HeaderSet, IdentHeader, SetupHeader};
use crate::header_cached::StreamLookups;
use crate::options::DecodeOptions;
use crate::window::OverlapBuffer;

/// Container metadata of an audio packet
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PacketInfo {
	/// Absolute sample position at the end of the packet, if known
	pub granule_pos :Option<i64>,
	/// Whether this is the last packet of the stream
	pub end_of_stream :bool,
	/// Position of the packet within the logical stream
	pub packet_no :u64,
}

/// Result of feeding an audio packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOutcome {
	/// Samples per channel that became available
	pub samples :usize,
	/// Whether the packet was a long block
	pub long :bool,
	/// Bits spent on the packet
	pub bits :BitCounters,
}

pub struct DecoderSession {
	ident :IdentHeader,
	comment :CommentHeader,
	setup :SetupHeader,
	look :StreamLookups,
	options :DecodeOptions,
	overlap :OverlapBuffer,
	/// Size flags of the previous and the current block
	lw :bool,
	w :bool,
	/// Sample range in the overlap history that is ready.
	///
	/// `pcm_returned` is `None` until the first block came in.
	pcm_returned :Option<usize>,
	pcm_current :usize,
	sequence :Option<u64>,
	granule_pos :Option<i64>,
	/// Samples decoded since the granule position was last known
	sample_count :Option<i64>,
	eos :bool,
	bit_counters :BitCounters,
	interleaved :Vec<f32>,
}

impl DecoderSession {
	pub fn new(headers :HeaderSet, options :DecodeOptions) -> Self {
		let (ident, comment, setup) = headers;
		let look = StreamLookups::new(&ident, &setup);
		let overlap = OverlapBuffer::new(ident.audio_channels as usize,
			(ident.blocksize(false), ident.blocksize(true)));
		DecoderSession {
			ident,
			comment,
			setup,
			look,
			options,
			overlap,
			lw : false,
			w : false,
			pcm_returned : None,
			pcm_current : 0,
			sequence : None,
			granule_pos : None,
			sample_count : None,
			eos : false,
			bit_counters : BitCounters::default(),
			interleaved : Vec::new(),
		}
	}

	pub fn ident(&self) -> &IdentHeader {
		&self.ident
	}

	pub fn comment(&self) -> &CommentHeader {
		&self.comment
	}

	pub fn setup(&self) -> &SetupHeader {
		&self.setup
	}

	/// Decodes an audio packet and overlaps it onto the history.
	///
	/// Fails with `PcmPending` if samples of the previous
	/// packet are still available. Other errors mean the packet is
	/// undecodable; it can be skipped and decoding continued.
	pub fn feed(&mut self, packet :&[u8], info :PacketInfo)
			-> Result<DecodeOutcome, AudioReadError> {
		if self.available() > 0 {
			return Err(AudioReadError::PcmPending);
		}
		let block = audio::decode_block(&self.ident, &self.setup, &self.look, packet)?;
		self.bit_counters += block.bits;

		self.lw = self.w;
		self.w = block.long;
		if self.sequence.map_or(true, |s| s.wrapping_add(1) != info.packet_no) {
			// Out of sequence, lose count
			self.granule_pos = None;
			self.sample_count = None;
		}
		self.sequence = Some(info.packet_no);

		let centers = self.overlap.add_block(&block.pcm, self.lw, self.w,
			self.look.window_slopes());
		let block_samples = (self.ident.blocksize(self.lw) / 4
			+ self.ident.blocksize(self.w) / 4) as i64;
		if self.pcm_returned.is_none() {
			self.pcm_returned = Some(centers.this);
			self.pcm_current = centers.this;
		} else {
			self.pcm_returned = Some(centers.prev);
			self.pcm_current = centers.prev + block_samples as usize;
		}

		self.sample_count = Some(match self.sample_count {
			Some(c) => c + block_samples,
			None => 0,
		});
		if self.options.trim_granule {
			self.track_granule(info, block_samples);
		}
		if info.end_of_stream {
			debug!("end of stream");
			self.eos = true;
		}

		let samples = self.available();
		trace!("block in: long {}, {} samples ready", self.w, samples);
		Ok(DecodeOutcome {
			samples,
			long : block.long,
			bits : block.bits,
		})
	}

	/// Follows the granule positions, trimming the samples of
	/// blocks that reach beyond the start or the end of the stream.
	fn track_granule(&mut self, info :PacketInfo, block_samples :i64) {
		let packet_granule = info.granule_pos.filter(|g| *g >= 0);
		let buffered = self.available() as i64;
		match self.granule_pos {
			None => {
				let granule = match packet_granule {
					Some(g) => g,
					None => return,
				};
				self.granule_pos = Some(granule);
				let sample_count = self.sample_count.unwrap_or(0);
				if sample_count > granule {
					let extra = sample_count - granule;
					if info.end_of_stream {
						// A stream of a single page is cut at the end
						let extra = extra.min(buffered);
						self.pcm_current -= extra as usize;
					} else {
						let returned = self.pcm_returned.unwrap_or(0) + extra as usize;
						self.pcm_returned = Some(returned.min(self.pcm_current));
					}
				}
			},
			Some(g) => {
				let expected = g + block_samples;
				self.granule_pos = Some(expected);
				if let Some(granule) = packet_granule {
					if expected > granule && info.end_of_stream {
						let extra = (expected - granule).min(buffered).max(0);
						self.pcm_current -= extra as usize;
					}
					self.granule_pos = Some(granule);
				}
			},
		}
	}

	/// Samples per channel that are ready
	pub fn available(&self) -> usize {
		match self.pcm_returned {
			Some(r) if r < self.pcm_current => self.pcm_current - r,
			_ => 0,
		}
	}

	/// Returns up to `max` ready samples per channel, interleaved.
	///
	/// The samples stay available until `consumed` is called.
	pub fn pcm_out(&mut self, max :usize) -> &[f32] {
		let frames = self.available().min(max);
		let channels = self.overlap.channels();
		self.interleaved.clear();
		if let Some(start) = self.pcm_returned {
			let overlap = &self.overlap;
			let planes = (0 .. channels)
				.map(|ch| overlap.samples(ch, start, start + frames))
				.collect::<Vec<_>>();
			self.interleaved.reserve(frames * channels);
			for i in 0 .. frames {
				for plane in planes.iter() {
					self.interleaved.push(plane[i]);
				}
			}
		}
		&self.interleaved
	}

	/// The ready samples of each channel
	pub fn pcm_planar(&self) -> Vec<&[f32]> {
		let start = match self.pcm_returned {
			Some(r) => r,
			None => return vec![&[][..]; self.overlap.channels()],
		};
		let end = start + self.available();
		(0 .. self.overlap.channels())
			.map(|ch| self.overlap.samples(ch, start, end))
			.collect()
	}

	/// Marks `n` samples per channel as read.
	///
	/// Returns the number actually marked, which is less
	/// than `n` if fewer samples are available.
	pub fn consumed(&mut self, n :usize) -> usize {
		let n = n.min(self.available());
		if let Some(r) = self.pcm_returned.as_mut() {
			*r += n;
		}
		n
	}

	/// Whether the last packet of the stream has been fed
	pub fn is_end_of_stream(&self) -> bool {
		self.eos
	}

	/// Granule position of the last fed packet, if known
	pub fn granule_position(&self) -> Option<i64> {
		self.granule_pos
	}

	/// Bits spent on all packets fed so far
	pub fn bit_counters(&self) -> BitCounters {
		self.bit_counters
	}

	/// Drops the overlap history and all position tracking.
	///
	/// Use this after a discontinuity. The next packet is treated
	/// like the first one of a stream.
	pub fn restart(&mut self) {
		self.overlap.reset();
		self.lw = false;
		self.w = false;
		self.pcm_returned = None;
		self.pcm_current = 0;
		self.sequence = None;
		self.granule_pos = None;
		self.sample_count = None;
		self.eos = false;
	}
}

#[cfg(test)]
fn mono_session(options :DecodeOptions) -> DecoderSession {
	use crate::header::{HeaderParser, test_packets};
	let mut parser = HeaderParser::new();
	parser.push(&test_packets::ident(1, 44100, 8, 11), true).unwrap();
	parser.push(&test_packets::comment("test", &[]), false).unwrap();
	let headers = parser.push(&test_packets::mono_setup(0), false).unwrap().unwrap();
	DecoderSession::new(headers, options)
}

#[cfg(test)]
fn short_packet() -> Vec<u8> {
	crate::header::test_packets::mono_audio(false, (false, false),
		Some((120, 120)), &|i| i % 2 == 0)
}

#[cfg(test)]
fn info(packet_no :u64) -> PacketInfo {
	PacketInfo { granule_pos : None, end_of_stream : false, packet_no }
}

#[test]
fn test_first_block_is_held_back() {
	use crate::header::test_packets::mono_audio;
	let mut s = mono_session(DecodeOptions::default());
	let packet = short_packet();
	let out = s.feed(&packet, info(3)).unwrap();
	assert_eq!(out.samples, 0);
	assert_eq!(s.available(), 0);
	assert!(s.pcm_out(4096).is_empty());

	// Steady state: a quarter of each of the two blocks
	for no in 4 .. 8 {
		let out = s.feed(&packet, info(no)).unwrap();
		assert_eq!(out.samples, 128);
		assert_eq!(s.pcm_out(4096).len(), 128);
		assert!(s.pcm_out(4096).iter().any(|v| *v != 0.));
		assert_eq!(s.consumed(128), 128);
	}

	// Short to long and back
	let long = mono_audio(true, (false, false), Some((120, 120)), &|i| i % 2 == 0);
	assert_eq!(s.feed(&long, info(8)).unwrap().samples, 64 + 512);
	s.consumed(576);
	assert_eq!(s.feed(&packet, info(9)).unwrap().samples, 512 + 64);
	s.consumed(576);

	let counters = s.bit_counters();
	assert_eq!(counters.floor, 7 * 17);
	assert_eq!(counters.residue, 7 * 132);
}

#[test]
fn test_pcm_pending() {
	let mut s = mono_session(DecodeOptions::default());
	let packet = short_packet();
	s.feed(&packet, info(3)).unwrap();
	s.feed(&packet, info(4)).unwrap();
	assert_eq!(s.feed(&packet, info(5)), Err(AudioReadError::PcmPending));

	// Partial consumption keeps the rest
	assert_eq!(s.pcm_out(100).len(), 100);
	let planar = s.pcm_planar();
	assert_eq!(planar.len(), 1);
	assert_eq!(planar[0].len(), 128);
	let tail = planar[0][100 ..].to_vec();
	assert_eq!(s.consumed(100), 100);
	assert_eq!(s.pcm_out(4096), &tail[..]);
	assert_eq!(s.consumed(1000), 28);
	assert!(s.feed(&packet, info(5)).is_ok());
}

#[test]
fn test_granule_trims_end() {
	let mut s = mono_session(DecodeOptions::default());
	let packet = short_packet();
	s.feed(&packet, info(3)).unwrap();
	s.feed(&packet, info(4)).unwrap();
	s.consumed(128);
	let last = PacketInfo { granule_pos : Some(200), end_of_stream : true, packet_no : 5 };
	assert_eq!(s.feed(&packet, last).unwrap().samples, 72);
	assert!(s.is_end_of_stream());
	assert_eq!(s.granule_position(), Some(200));
}

#[test]
fn test_granule_trims_beginning() {
	let packet = short_packet();
	let mut s = mono_session(DecodeOptions::default());
	s.feed(&packet, info(3)).unwrap();
	let second = PacketInfo { granule_pos : Some(100), end_of_stream : false, packet_no : 4 };
	assert_eq!(s.feed(&packet, second).unwrap().samples, 100);
	// The trimmed samples are the first ones
	let all = {
		let mut s = mono_session(DecodeOptions {
			trim_granule : false,
			.. DecodeOptions::default()
		});
		s.feed(&packet, info(3)).unwrap();
		assert_eq!(s.feed(&packet, second).unwrap().samples, 128);
		s.pcm_out(128).to_vec()
	};
	assert_eq!(s.pcm_out(128), &all[28 ..]);

	s.consumed(100);
	s.feed(&packet, info(5)).unwrap();
	assert_eq!(s.granule_position(), Some(228));
}

#[test]
fn test_packet_gap_resets_granule() {
	let packet = short_packet();
	let run = |last_no :u64| {
		let mut s = mono_session(DecodeOptions::default());
		s.feed(&packet, info(3)).unwrap();
		let second = PacketInfo { granule_pos : Some(128), end_of_stream : false, packet_no : 4 };
		s.feed(&packet, second).unwrap();
		s.consumed(128);
		let last = PacketInfo { granule_pos : Some(50), end_of_stream : true, packet_no : last_no };
		s.feed(&packet, last).unwrap().samples
	};
	// In sequence, the backdated end removes everything that's buffered
	assert_eq!(run(5), 0);
	// After a gap the old count can't be trusted
	assert_eq!(run(7), 128);
}

#[test]
fn test_restart() {
	let packet = short_packet();
	let mut s = mono_session(DecodeOptions::default());
	s.feed(&packet, info(3)).unwrap();
	s.feed(&packet, info(4)).unwrap();
	s.restart();
	assert_eq!(s.available(), 0);
	assert_eq!(s.feed(&packet, info(9)).unwrap().samples, 0);
	assert_eq!(s.feed(&packet, info(10)).unwrap().samples, 128);
}

#[test]
fn test_undecodable_packet_is_skippable() {
	let packet = short_packet();
	let mut s = mono_session(DecodeOptions::default());
	s.feed(&packet, info(3)).unwrap();
	assert_eq!(s.feed(&[], info(4)), Err(AudioReadError::EndOfPacket));
	assert_eq!(s.feed(&packet, info(5)).unwrap().samples, 128);
}
