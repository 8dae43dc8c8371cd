// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Higher-level utilities for Ogg streams and files

This module ties the demuxer, the header parser and the decoder
session together. `OggVorbisDecoder` is push based: hand it bytes
as they arrive and ask it for decoded samples. `OggStreamReader`
pulls the bytes from a `Read` implementation instead.

Only the first logical stream is decoded. Pages of other streams
multiplexed into the same file are skipped.
*/

use std::io::{self, Read};

use log::{debug, warn};

use crate::header::{CommentHeader, HeaderParser, HeaderReadError, IdentHeader};
use crate::ogg::{LogicalStream, OggError, OggSync, PacketOutcome, PageOutcome};
use crate::options::DecodeOptions;
use crate::samples::{InterleavedSamples, Samples};
use crate::session::{DecoderSession, PacketInfo};
use crate::VorbisError;

/// State of the decoder after a call to `decode`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
	/// The given number of samples per channel can be taken
	PcmReady(usize),
	/// All submitted bytes have been used up
	NeedMoreData,
	/// The last packet of the stream has been decoded
	/// and all its samples consumed
	EndOfStream,
}

/**
Push based ogg/vorbis decoder

Submit bytes with `feed_bytes`, then call `decode` until it
reports `NeedMoreData`. Whenever it reports `PcmReady`, take the
samples with `pcm_out` and mark them with `consumed`.
*/
pub struct OggVorbisDecoder {
	options :DecodeOptions,
	sync :OggSync,
	stream :Option<LogicalStream>,
	headers :HeaderParser,
	session :Option<DecoderSession>,
}

impl OggVorbisDecoder {
	pub fn new(options :DecodeOptions) -> Self {
		OggVorbisDecoder {
			options,
			sync : OggSync::new(options.verify_crc),
			stream : None,
			headers : HeaderParser::new(),
			session : None,
		}
	}

	/// Creates a decoder for a stream that is completely in memory.
	///
	/// The headers are read right away.
	pub fn from_bytes(data :&[u8], options :DecodeOptions) -> Result<Self, VorbisError> {
		let mut dec = OggVorbisDecoder::new(options);
		dec.feed_bytes(data);
		if !dec.headers_ready()? {
			return Err(HeaderReadError::EndOfPacket.into());
		}
		Ok(dec)
	}

	/// Appends bytes of the stream
	pub fn feed_bytes(&mut self, bytes :&[u8]) {
		self.sync.submit(bytes);
	}

	/// Reads packets until the three headers are known.
	///
	/// Returns `false` if more bytes are needed for that.
	pub fn headers_ready(&mut self) -> Result<bool, VorbisError> {
		while self.session.is_none() {
			if !self.next_packet()? {
				return Ok(false);
			}
		}
		Ok(true)
	}

	/// Decodes until samples are available or the submitted bytes run out.
	///
	/// Errors are fatal to the stream. Problems with single audio
	/// packets are logged and the packet is skipped.
	pub fn decode(&mut self) -> Result<DecodeStatus, VorbisError> {
		loop {
			if let Some(session) = self.session.as_ref() {
				let available = session.available();
				if available > 0 {
					return Ok(DecodeStatus::PcmReady(available));
				}
				if session.is_end_of_stream() {
					return Ok(DecodeStatus::EndOfStream);
				}
			}
			if !self.next_packet()? {
				return Ok(DecodeStatus::NeedMoreData);
			}
		}
	}

	/// Handles one packet, or returns `false` if none is buffered
	fn next_packet(&mut self) -> Result<bool, VorbisError> {
		loop {
			let outcome = match self.stream.as_mut() {
				Some(stream) => stream.pop_packet(),
				None => PacketOutcome::NeedMoreData,
			};
			match outcome {
				PacketOutcome::NeedMoreData => {
					if !pump_page(&mut self.sync, &mut self.stream)? {
						return Ok(false);
					}
				},
				PacketOutcome::Discontinuity => {
					let session = match self.session.as_mut() {
						Some(s) => s,
						None => return Err(OggError::HeaderDiscontinuity.into()),
					};
					warn!("data lost, restarting the decode");
					session.restart();
					return Ok(true);
				},
				PacketOutcome::Packet(packet) => {
					if let Some(session) = self.session.as_mut() {
						let info = PacketInfo {
							granule_pos : packet.granule_pos,
							end_of_stream : packet.eos,
							packet_no : packet.packet_no,
						};
						if let Err(e) = session.feed(packet.data, info) {
							warn!("skipping audio packet {}: {}", packet.packet_no, e);
						}
						return Ok(true);
					}
					if let Some(headers) = self.headers.push(packet.data, packet.bos)? {
						self.session = Some(DecoderSession::new(headers, self.options));
					}
					return Ok(true);
				},
			}
		}
	}

	/// Up to `max` available samples per channel, interleaved
	pub fn pcm_out(&mut self, max :usize) -> &[f32] {
		match self.session.as_mut() {
			Some(s) => s.pcm_out(max),
			None => &[],
		}
	}

	/// The available samples of each channel
	pub fn pcm_planar(&self) -> Vec<&[f32]> {
		match self.session.as_ref() {
			Some(s) => s.pcm_planar(),
			None => Vec::new(),
		}
	}

	/// Marks `n` samples per channel as read, see `DecoderSession::consumed`
	pub fn consumed(&mut self, n :usize) -> usize {
		match self.session.as_mut() {
			Some(s) => s.consumed(n),
			None => 0,
		}
	}

	/// The identification header, as soon as it has been read
	pub fn ident(&self) -> Option<&IdentHeader> {
		match self.session.as_ref() {
			Some(s) => Some(s.ident()),
			None => self.headers.ident(),
		}
	}

	pub fn comment(&self) -> Option<&CommentHeader> {
		self.session.as_ref().map(|s| s.comment())
	}

	pub fn channels(&self) -> Option<u8> {
		self.ident().map(|i| i.audio_channels)
	}

	pub fn sample_rate(&self) -> Option<u32> {
		self.ident().map(|i| i.audio_sample_rate)
	}

	/// The decoder session, once the headers have been read
	pub fn session(&self) -> Option<&DecoderSession> {
		self.session.as_ref()
	}

	pub fn is_end_of_stream(&self) -> bool {
		self.session.as_ref().map_or(false, |s| s.is_end_of_stream())
	}
}

/// Moves the next page of our logical stream from the sync layer
/// into the stream. Returns `false` if no complete page is buffered.
fn pump_page(sync :&mut OggSync, stream :&mut Option<LogicalStream>) -> Result<bool, OggError> {
	loop {
		let page = match sync.next_page() {
			PageOutcome::Ready(page) => page,
			PageOutcome::NeedMoreData => return Ok(false),
			PageOutcome::Resynced(_) => continue,
		};
		if let Some(s) = stream.as_mut() {
			if s.serial() != page.serial() {
				warn!("ignoring page of logical stream {:08x}", page.serial());
				continue;
			}
			s.push_page(&page)?;
		} else {
			if !page.bos() {
				return Err(OggError::MissingBeginOfStream);
			}
			debug!("decoding logical stream {:08x}", page.serial());
			let mut s = LogicalStream::new(page.serial());
			s.push_page(&page)?;
			*stream = Some(s);
		}
		return Ok(true);
	}
}

/**
Reading ogg/vorbis files or streams

This is a small helper struct to help reading ogg/vorbis files
or streams in that format.

It only supports the main use case of pure audio ogg files streams.
Reading a file where vorbis is only one of multiple streams, like
in the case of ogv, decodes the first vorbis stream and skips the
others.
*/
pub struct OggStreamReader<R :Read> {
	rdr :R,
	dec :OggVorbisDecoder,
	buf :Vec<u8>,
	eof :bool,

	pub ident_hdr :IdentHeader,
	pub comment_hdr :CommentHeader,
}

impl<R :Read> OggStreamReader<R> {
	/// Constructs a new OggStreamReader and reads the headers
	pub fn new(rdr :R) -> Result<Self, VorbisError> {
		OggStreamReader::with_options(rdr, DecodeOptions::default())
	}

	pub fn with_options(mut rdr :R, options :DecodeOptions) -> Result<Self, VorbisError> {
		let mut dec = OggVorbisDecoder::new(options);
		let mut buf = vec![0; options.read_chunk_size.max(1)];
		while !dec.headers_ready()? {
			if !fill(&mut rdr, &mut buf, &mut dec)? {
				return Err(HeaderReadError::EndOfPacket.into());
			}
		}
		let (ident_hdr, comment_hdr) = match dec.session() {
			Some(s) => (s.ident().clone(), s.comment().clone()),
			None => return Err(HeaderReadError::EndOfPacket.into()),
		};
		Ok(OggStreamReader {
			rdr,
			dec,
			buf,
			eof : false,
			ident_hdr,
			comment_hdr,
		})
	}

	/// Reads and decompresses audio until the next samples are ready.
	///
	/// Returns `None` at the end of the stream.
	pub fn read_dec_packet_generic<S :Samples>(&mut self) -> Result<Option<S>, VorbisError> {
		loop {
			match self.dec.decode()? {
				DecodeStatus::PcmReady(n) => {
					let samples = S::from_planar(&self.dec.pcm_planar());
					self.dec.consumed(n);
					return Ok(Some(samples));
				},
				DecodeStatus::EndOfStream => return Ok(None),
				DecodeStatus::NeedMoreData => {
					if self.eof {
						return Ok(None);
					}
					if !fill(&mut self.rdr, &mut self.buf, &mut self.dec)? {
						self.eof = true;
					}
				},
			}
		}
	}

	/// Like `read_dec_packet_generic`, with one `Vec` per channel
	pub fn read_dec_packet(&mut self) -> Result<Option<Vec<Vec<f32>>>, VorbisError> {
		self.read_dec_packet_generic::<Vec<Vec<f32>>>()
	}

	/// Like `read_dec_packet_generic`, with interleaved samples
	pub fn read_dec_packet_itl(&mut self) -> Result<Option<Vec<f32>>, VorbisError> {
		Ok(self.read_dec_packet_generic::<InterleavedSamples<f32>>()?
			.map(|s| s.samples))
	}

	/// Granule position of the last decoded packet, if known
	pub fn get_last_absgp(&self) -> Option<i64> {
		self.dec.session().and_then(|s| s.granule_position())
	}

	pub fn into_inner(self) -> R {
		self.rdr
	}
}

/// Reads one chunk into the decoder. Returns `false` at the end of input.
fn fill<R :Read>(rdr :&mut R, buf :&mut [u8], dec :&mut OggVorbisDecoder)
		-> Result<bool, VorbisError> {
	loop {
		match rdr.read(buf) {
			Ok(0) => return Ok(false),
			Ok(n) => {
				dec.feed_bytes(&buf[.. n]);
				return Ok(true);
			},
			Err(ref e) if e.kind() == io::ErrorKind::Interrupted => (),
			Err(e) => return Err(e.into()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::header::test_packets::{comment, ident, mono_audio, mono_setup};
	use crate::ogg::test_pages::{packets_page, BOS, EOS};

	const SERIAL :u32 = 0x1234;

	fn short() -> Vec<u8> {
		mono_audio(false, (false, false), Some((120, 100)), &|i| i % 3 == 0)
	}

	fn header_pages(serial :u32) -> Vec<u8> {
		let mut data = packets_page(BOS, 0, serial, 0, &[&ident(1, 44100, 8, 11)]);
		data.extend(packets_page(0, 0, serial, 1,
			&[&comment("synth", &[&b"TITLE=test"[..]]), &mono_setup(0)]));
		data
	}

	/// Headers, four short blocks, then a last one cut to 100 samples
	fn stream() -> Vec<u8> {
		let p = short();
		let mut data = header_pages(SERIAL);
		data.extend(packets_page(0, 384, SERIAL, 2, &[&p, &p, &p, &p]));
		data.extend(packets_page(EOS, 484, SERIAL, 3, &[&p]));
		data
	}

	fn drain(dec :&mut OggVorbisDecoder) -> Result<(Vec<f32>, DecodeStatus), VorbisError> {
		let mut pcm = Vec::new();
		loop {
			match dec.decode()? {
				DecodeStatus::PcmReady(n) => {
					pcm.extend_from_slice(dec.pcm_out(n));
					assert_eq!(dec.consumed(n), n);
				},
				status => return Ok((pcm, status)),
			}
		}
	}

	#[test]
	fn test_whole_stream() {
		let mut dec = OggVorbisDecoder::from_bytes(&stream(), DecodeOptions::default()).unwrap();
		assert_eq!(dec.channels(), Some(1));
		assert_eq!(dec.sample_rate(), Some(44100));
		let comment = dec.comment().unwrap();
		assert_eq!(comment.vendor, "synth");
		assert_eq!(comment.comment_list, vec![("TITLE".to_string(), "test".to_string())]);

		let (pcm, status) = drain(&mut dec).unwrap();
		assert_eq!(status, DecodeStatus::EndOfStream);
		assert_eq!(pcm.len(), 484);
		assert!(pcm.iter().any(|v| *v != 0.));
		assert!(dec.is_end_of_stream());
	}

	#[test]
	fn test_chunked_feeding_matches() {
		let data = stream();
		let mut whole = OggVorbisDecoder::new(DecodeOptions::default());
		whole.feed_bytes(&data);
		let (expected, _) = drain(&mut whole).unwrap();

		let mut dec = OggVorbisDecoder::new(DecodeOptions::default());
		assert_eq!(dec.ident(), None);
		let mut pcm = Vec::new();
		for chunk in data.chunks(13) {
			dec.feed_bytes(chunk);
			let (p, _) = drain(&mut dec).unwrap();
			pcm.extend(p);
		}
		assert_eq!(pcm, expected);
		assert!(dec.is_end_of_stream());
	}

	#[test]
	fn test_missing_bos() {
		let mut data = packets_page(0, 0, SERIAL, 0, &[&ident(1, 44100, 8, 11)]);
		data.extend(stream());
		let mut dec = OggVorbisDecoder::new(DecodeOptions::default());
		dec.feed_bytes(&data);
		match dec.decode() {
			Err(VorbisError::Ogg(OggError::MissingBeginOfStream)) => (),
			r => panic!("{:?}", r),
		}
	}

	#[test]
	fn test_foreign_stream_is_skipped() {
		let p = short();
		let mut data = header_pages(SERIAL);
		data.extend(header_pages(99));
		data.extend(packets_page(0, 256, SERIAL, 2, &[&p, &p, &p]));
		data.extend(packets_page(0, 256, 99, 2, &[&p, &p, &p]));
		data.extend(packets_page(EOS, 384, SERIAL, 3, &[&p]));
		let mut dec = OggVorbisDecoder::from_bytes(&data, DecodeOptions::default()).unwrap();
		let (pcm, status) = drain(&mut dec).unwrap();
		assert_eq!(status, DecodeStatus::EndOfStream);
		assert_eq!(pcm.len(), 384);
	}

	#[test]
	fn test_lost_header_page() {
		let mut data = packets_page(BOS, 0, SERIAL, 0, &[&ident(1, 44100, 8, 11)]);
		data.extend(packets_page(0, 0, SERIAL, 2, &[&mono_setup(0)]));
		let mut dec = OggVorbisDecoder::new(DecodeOptions::default());
		dec.feed_bytes(&data);
		match dec.decode() {
			Err(VorbisError::Ogg(OggError::HeaderDiscontinuity)) => (),
			r => panic!("{:?}", r),
		}
		// The identification header got through
		assert_eq!(dec.channels(), Some(1));
	}

	#[test]
	fn test_lost_audio_page_restarts() {
		let p = short();
		let mut data = header_pages(SERIAL);
		data.extend(packets_page(0, 128, SERIAL, 2, &[&p, &p]));
		data.extend(packets_page(0, 1000, SERIAL, 4, &[&p, &p]));
		let mut dec = OggVorbisDecoder::from_bytes(&data, DecodeOptions::default()).unwrap();
		let (pcm, status) = drain(&mut dec).unwrap();
		assert_eq!(status, DecodeStatus::NeedMoreData);
		// The first block after the gap only primes the overlap
		assert_eq!(pcm.len(), 256);
	}

	#[test]
	fn test_bad_audio_packet_skipped() {
		let p = short();
		let mut data = header_pages(SERIAL);
		data.extend(packets_page(0, -1, SERIAL, 2, &[&p, &[], &p, &p]));
		let mut dec = OggVorbisDecoder::from_bytes(&data, DecodeOptions::default()).unwrap();
		let (pcm, _) = drain(&mut dec).unwrap();
		assert_eq!(pcm.len(), 256);
	}

	#[test]
	fn test_not_vorbis() {
		let data = packets_page(BOS, 0, SERIAL, 0, &[b"\x01opus\0\0 and more bytes"]);
		match OggVorbisDecoder::from_bytes(&data, DecodeOptions::default()) {
			Err(VorbisError::BadHeader(HeaderReadError::NotVorbisHeader)) => (),
			r => panic!("{:?}", r.map(|_| ())),
		}
	}

	#[test]
	fn test_stream_reader() {
		let options = DecodeOptions {
			read_chunk_size : 7,
			.. DecodeOptions::default()
		};
		let mut rdr = OggStreamReader::with_options(io::Cursor::new(stream()), options).unwrap();
		assert_eq!(rdr.ident_hdr.audio_channels, 1);
		assert_eq!(rdr.comment_hdr.vendor, "synth");
		let mut total = 0;
		while let Some(pck) = rdr.read_dec_packet_generic::<InterleavedSamples<i16>>().unwrap() {
			assert_eq!(pck.channel_count, 1);
			total += pck.num_samples();
		}
		assert_eq!(total, 484);
		assert_eq!(rdr.get_last_absgp(), Some(484));
	}

	#[test]
	fn test_stream_reader_without_headers() {
		let data = packets_page(BOS, 0, SERIAL, 0, &[&ident(1, 44100, 8, 11)]);
		match OggStreamReader::new(io::Cursor::new(data)) {
			Err(VorbisError::BadHeader(HeaderReadError::EndOfPacket)) => (),
			Err(e) => panic!("{:?}", e),
			Ok(_) => panic!("headers can't be complete"),
		}
	}
}
