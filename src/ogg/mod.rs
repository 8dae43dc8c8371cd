// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Ogg demuxing

Two layers: `sync` finds pages in a byte stream, and `stream`
reassembles the packets of one logical stream from its pages.
Both are push based: hand them data, then ask for output until
they report that they need more.
*/

use thiserror::Error;

pub mod crc;
pub mod stream;
pub mod sync;

pub use self::stream::{LogicalStream, Packet, PacketOutcome};
pub use self::sync::{OggSync, Page, PageOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OggError {
	#[error("unsupported ogg version {0}")]
	UnsupportedVersion(u8),
	/// The page belongs to a different logical stream
	#[error("page of a different logical stream")]
	SerialMismatch,
	/// Data was lost while the header packets were read
	#[error("discontinuity within the header packets")]
	HeaderDiscontinuity,
	/// The first page of the stream lacks the begin of stream flag
	#[error("missing begin of stream page")]
	MissingBeginOfStream,
}

/// Builders for raw pages
#[cfg(test)]
pub(crate) mod test_pages {
	use byteorder::{ByteOrder, LittleEndian};

	pub const CONTINUED :u8 = 1;
	pub const BOS :u8 = 2;
	pub const EOS :u8 = 4;

	/// Segment lengths of a packet of `len` bytes
	pub fn lacing(len :usize) -> Vec<u8> {
		let mut l = vec![255; len / 255];
		l.push((len % 255) as u8);
		l
	}

	pub fn page(flags :u8, granule :i64, serial :u32, seq :u32,
			segments :&[u8], body :&[u8]) -> Vec<u8> {
		let mut header = vec![0; 27];
		header[.. 4].copy_from_slice(b"OggS");
		header[5] = flags;
		LittleEndian::write_i64(&mut header[6 .. 14], granule);
		LittleEndian::write_u32(&mut header[14 .. 18], serial);
		LittleEndian::write_u32(&mut header[18 .. 22], seq);
		header[26] = segments.len() as u8;
		header.extend_from_slice(segments);
		let crc = super::crc::page_checksum(&header, body);
		LittleEndian::write_u32(&mut header[22 .. 26], crc);
		header.extend_from_slice(body);
		header
	}

	/// A page holding complete packets
	pub fn packets_page(flags :u8, granule :i64, serial :u32, seq :u32,
			packets :&[&[u8]]) -> Vec<u8> {
		let mut segments = Vec::new();
		let mut body = Vec::new();
		for p in packets {
			segments.extend(lacing(p.len()));
			body.extend_from_slice(p);
		}
		page(flags, granule, serial, seq, &segments, &body)
	}
}
