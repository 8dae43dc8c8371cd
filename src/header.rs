// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Header decoding

This module takes care of decoding of the three vorbis headers:

1. Identification
2. Comment
3. Setup

The setup header references codebooks, floors, residues and mappings,
whose unpacking lives in the respective modules; this module only
drives them and checks that the tables fit together.

`HeaderParser` assembles the three headers from consecutive packets
and makes sure they arrive in the right order.
*/

use std::io::{self, Cursor, Read};
use std::string::FromUtf8Error;
use byteorder::{ReadBytesExt, LittleEndian};
use log::debug;
use thiserror::Error;

use crate::bitpacking::{BitpackCursor, OutOfData};
use crate::codebook::{self, Codebook};
use crate::floor::FloorConfig;
use crate::mapping::MappingConfig;
use crate::residue::ResidueConfig;

/// Upper bounds of the setup header tables
pub(crate) const MAX_CODEBOOKS :usize = 256;
pub(crate) const MAX_FLOORS :usize = 64;
pub(crate) const MAX_RESIDUES :usize = 64;
pub(crate) const MAX_MAPPINGS :usize = 64;
pub(crate) const MAX_MODES :usize = 64;

/// Errors that can occur during Header decoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderReadError {
	#[error("end of packet reached")]
	EndOfPacket,
	/// If the passed data don't start with the "vorbis"
	/// capture pattern, this error is returned.
	#[error("the packet is not a vorbis header")]
	NotVorbisHeader,
	#[error("the vorbis version is not supported")]
	UnsupportedVorbisVersion,
	/// If the header violates the vorbis spec
	#[error("invalid header")]
	HeaderBadFormat,
	/// The given packet indeed seems to be a vorbis header,
	/// but it looks like it is a different header type than
	/// the function it was passed to.
	///
	/// It is not guaranteed that the type is a valid header type.
	#[error("invalid or unexpected header type {0}")]
	HeaderBadType(u8),
	/// The given packet does not seem to be a header as per vorbis spec,
	/// instead it seems to be an audio packet.
	#[error("packet seems to be audio")]
	HeaderIsAudio,
	#[error("UTF-8 decoding error")]
	Utf8DecodeError,
	/// If the needed memory isn't addressable by us
	///
	/// This error is returned if a length declared inside a header
	/// exceeds what the packet can possibly hold.
	#[error("requested to create buffer of non-addressable size")]
	BufferNotAddressable,
	/// A header arrived in the wrong position of the stream,
	/// or a header was repeated.
	#[error("header packet out of order")]
	OutOfOrder,
}

impl From<OutOfData> for HeaderReadError {
	fn from(_ :OutOfData) -> HeaderReadError {
		HeaderReadError::EndOfPacket
	}
}

impl From<io::Error> for HeaderReadError {
	fn from(_ :io::Error) -> HeaderReadError {
		// Reading from a Cursor over a slice can only fail at its end
		HeaderReadError::EndOfPacket
	}
}

impl From<FromUtf8Error> for HeaderReadError {
	fn from(_ :FromUtf8Error) -> HeaderReadError {
		HeaderReadError::Utf8DecodeError
	}
}

// Internal function, tries to find out whether the
// data returned by rdr belong to a vorbis header
// On success it returns Some(n) with n as packet type
// (you must check that n from 1,3,5)
macro_rules! read_header_begin_body {
( $rdr:expr ) => { {
	let res = $rdr.read_u8()?;
	if res & 1 == 0 {
		// This is an audio packet per vorbis spec, if anything.
		// (audio packets have their first bit set to 0,
		// header packets have it set to 1)
		return Err(HeaderReadError::HeaderIsAudio);
	}
	let mut tag = [0u8; 6];
	for b in tag.iter_mut() {
		*b = $rdr.read_u8()?;
	}
	if &tag != b"vorbis" {
		return Err(HeaderReadError::NotVorbisHeader);
	}
	Ok(res)
}}
}
fn read_header_begin(rdr :&mut BitpackCursor) -> Result<u8, HeaderReadError> {
	read_header_begin_body!(rdr)
}
fn read_header_begin_cursor(rdr :&mut Cursor<&[u8]>) -> Result<u8, HeaderReadError> {
	read_header_begin_body!(rdr)
}


#[test]
fn test_read_hdr_begin() {
	// Only tests flawed header begins, correct headers
	// are tested later by the test methods for the headers

	// Flawed ident header (see char before the /**/)
	let test_arr = &[0x01, 0x76, 0x6f, 0x72,
	0x62, 0x69, 0x72, /**/ 0x00, 0x00, 0x00, 0x00, 0x02,
	0x44, 0xac, 0x00,      0x00, 0x00, 0x00, 0x00, 0x00,
	0x80, 0xb5, 0x01,      0x00, 0x00, 0x00, 0x00, 0x00,
	0xb8, 0x01];
	let mut rdr :BitpackCursor = BitpackCursor::new(test_arr);
	assert_eq!(read_header_begin(&mut rdr), Err(HeaderReadError::NotVorbisHeader));

	let mut rdr = BitpackCursor::new(&[0x00, 0x76]);
	assert_eq!(read_header_begin(&mut rdr), Err(HeaderReadError::HeaderIsAudio));
	let mut rdr = BitpackCursor::new(&[0x05, 0x76, 0x6f]);
	assert_eq!(read_header_begin(&mut rdr), Err(HeaderReadError::EndOfPacket));
}

/// The set of the three Vorbis headers
pub type HeaderSet = (IdentHeader, CommentHeader, SetupHeader);

/**
Representation for the identification header

The identification header is the first of the three
headers inside each vorbis stream.

It covers basic information about the stream.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentHeader {
	/// The number of audio channels in the stream
	pub audio_channels :u8,
	/// The sample rate of the stream
	pub audio_sample_rate :u32,
	/// The maximum bit rate of the stream
	///
	/// Note that this value is only a hint
	/// and may be off by a large amount.
	pub bitrate_maximum :i32,
	/// The nominal bit rate of the stream
	///
	/// Note that this value is only a hint
	/// and may be off by a large amount.
	pub bitrate_nominal :i32,
	/// The minimum bit rate of the stream
	///
	/// Note that this value is only a hint
	/// and may be off by a large amount.
	pub bitrate_minimum :i32,
	/// Binary logarithm of the short block size
	pub blocksize_0 :u8,
	/// Binary logarithm of the long block size
	pub blocksize_1 :u8,
}

impl IdentHeader {
	/// The short (`false`) or long (`true`) block size in samples
	pub fn blocksize(&self, long :bool) -> usize {
		1 << if long { self.blocksize_1 } else { self.blocksize_0 }
	}
}

/**
Reading the Identification header

If it returns Err(sth) when being called with the first packet in a stream,
the whole stream is to be considered undecodable as per the Vorbis spec.
The function returns Err(`HeaderReadError::HeaderBadType`) if the header type
doesn't match the ident header.
*/
pub fn read_header_ident(packet :&[u8]) -> Result<IdentHeader, HeaderReadError> {
	let mut rdr = BitpackCursor::new(packet);
	let hd_id = read_header_begin(&mut rdr)?;
	if hd_id != 1 {
		return Err(HeaderReadError::HeaderBadType(hd_id));
	}
	let vorbis_version = rdr.read_u32()?;
	if vorbis_version != 0 {
		return Err(HeaderReadError::UnsupportedVorbisVersion);
	}
	let audio_channels = rdr.read_u8()?;
	let audio_sample_rate = rdr.read_u32()?;
	let bitrate_maximum = rdr.read_i32()?;
	let bitrate_nominal = rdr.read_i32()?;
	let bitrate_minimum = rdr.read_i32()?;
	let blocksize_0 = rdr.read_u4()?;
	let blocksize_1 = rdr.read_u4()?;
	let framing = rdr.read_bit_flag()?;
	if blocksize_0 < 6 || blocksize_0 > 13 ||
			blocksize_1 < 6 || blocksize_1 > 13 ||
			!framing || blocksize_0 > blocksize_1 ||
			audio_channels == 0 || audio_sample_rate == 0 {
		return Err(HeaderReadError::HeaderBadFormat);
	}
	Ok(IdentHeader {
		audio_channels,
		audio_sample_rate,
		bitrate_maximum,
		bitrate_nominal,
		bitrate_minimum,
		blocksize_0,
		blocksize_1,
	})
}

#[test]
fn test_read_header_ident() {
	// Valid ident header
	let test_arr = &[0x01, 0x76, 0x6f, 0x72,
	0x62, 0x69, 0x73, 0x00, 0x00, 0x00, 0x00, 0x02,
	0x44, 0xac, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
	0x80, 0xb5, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
	0xb8, 0x01];
	let hdr = read_header_ident(test_arr).unwrap();
	assert_eq!(hdr.audio_channels, 2);
	assert_eq!(hdr.audio_sample_rate, 0x0000ac44);
	assert_eq!(hdr.bitrate_maximum, 0);
	assert_eq!(hdr.bitrate_nominal, 0x0001b580);
	assert_eq!(hdr.bitrate_minimum, 0);
	assert_eq!(hdr.blocksize_0, 8);
	assert_eq!(hdr.blocksize_1, 11);
	assert_eq!(hdr.blocksize(false), 256);
	assert_eq!(hdr.blocksize(true), 2048);

	// Short block larger than the long one
	let mut bad = test_arr.to_vec();
	bad[28] = 0x8b;
	assert_eq!(read_header_ident(&bad), Err(HeaderReadError::HeaderBadFormat));
	// Missing framing bit
	let mut bad = test_arr.to_vec();
	bad[29] = 0x00;
	assert_eq!(read_header_ident(&bad), Err(HeaderReadError::HeaderBadFormat));
	// Block size of 32 samples
	let mut bad = test_arr.to_vec();
	bad[28] = 0xb5;
	assert_eq!(read_header_ident(&bad), Err(HeaderReadError::HeaderBadFormat));
	// Zero channels
	let mut bad = test_arr.to_vec();
	bad[11] = 0;
	assert_eq!(read_header_ident(&bad), Err(HeaderReadError::HeaderBadFormat));
	// Version 1
	let mut bad = test_arr.to_vec();
	bad[7] = 1;
	assert_eq!(read_header_ident(&bad), Err(HeaderReadError::UnsupportedVorbisVersion));
	assert_eq!(read_header_ident(&test_arr[.. 20]), Err(HeaderReadError::EndOfPacket));
}

/**
Representation of the comment header

The comment header is the second of the three
headers inside each vorbis stream.

It contains text comment metadata
about the stream, encoded as key-value pairs,
and the vendor name.
*/
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct CommentHeader {
	/// An identification string of the
	/// software/library that encoded
	/// the stream.
	pub vendor :String,
	/// A key-value list of the comments
	/// attached to the stream.
	pub comment_list :Vec<(String, String)>,
}

/// Reads a length prefixed byte string, checking the
/// declared length against what's left in the packet first
fn read_length_prefixed(rdr :&mut Cursor<&[u8]>) -> Result<Vec<u8>, HeaderReadError> {
	let len = rdr.read_u32::<LittleEndian>()? as usize;
	let left = rdr.get_ref().len().saturating_sub(rdr.position() as usize);
	if len > left {
		return Err(HeaderReadError::BufferNotAddressable);
	}
	let mut buf = vec![0; len];
	rdr.read_exact(&mut buf)?;
	Ok(buf)
}

/**
Reading the Comment header

You should call this function with the second packet in the stream.

The function does not check whether the comment field names consist
of characters `0x20` through `0x7D` (`0x3D` excluded), as the vorbis
spec requires.
*/
pub fn read_header_comment(packet :&[u8]) -> Result<CommentHeader, HeaderReadError> {
	let mut rdr = Cursor::new(packet);
	let hd_id = read_header_begin_cursor(&mut rdr)?;
	if hd_id != 3 {
		return Err(HeaderReadError::HeaderBadType(hd_id));
	}
	// First read the vendor string
	let vendor = String::from_utf8(read_length_prefixed(&mut rdr)?)?;

	// Now read the comments
	let comment_count = rdr.read_u32::<LittleEndian>()? as usize;
	// Every comment takes at least its length field
	let mut comment_list = Vec::with_capacity(comment_count.min(packet.len() / 4));
	for _ in 0 .. comment_count {
		let comment = match String::from_utf8(read_length_prefixed(&mut rdr)?) {
			Ok(comment) => comment,
			// The spec states that the comment entries
			// should be UTF-8 formatted, however other
			// decoder libraries tolerate non-UTF-8 formatted strings
			// in comments, and files with such entries exist.
			Err(_) => continue,
		};
		let eq_idx = match comment.find('=') {
			Some(k) => k,
			// Some files have fields without a = sign in the comments.
			None => continue,
		};
		let (key, val) = comment.split_at(eq_idx);
		comment_list.push((String::from(key), String::from(&val[1 ..])));
	}
	let framing = rdr.read_u8()?;
	if framing != 1 {
		return Err(HeaderReadError::HeaderBadFormat);
	}
	Ok(CommentHeader {
		vendor,
		comment_list,
	})
}

#[test]
fn test_read_header_comment() {
	let packet = test_packets::comment("Xiph.Org libVorbis I 20200704 (Reducing Environment)",
		&[&b"TITLE=Foo"[..], &b"no equals sign"[..], &[0x41, 0x3d, 0xff, 0xfe], &b"ARTIST=A=B"[..]]);
	let hdr = read_header_comment(&packet).unwrap();
	assert_eq!(hdr.vendor, "Xiph.Org libVorbis I 20200704 (Reducing Environment)");
	assert_eq!(hdr.comment_list, vec![
		("TITLE".to_string(), "Foo".to_string()),
		("ARTIST".to_string(), "A=B".to_string()),
	]);

	// Declared vendor length beyond the packet end
	let mut bad = test_packets::comment("abc", &[]);
	bad[7] = 0xff;
	bad[8] = 0xff;
	assert_eq!(read_header_comment(&bad), Err(HeaderReadError::BufferNotAddressable));

	// Missing framing
	let mut bad = test_packets::comment("abc", &[]);
	bad.pop();
	assert_eq!(read_header_comment(&bad), Err(HeaderReadError::EndOfPacket));

	let ident = test_packets::ident(1, 44100, 8, 11);
	assert_eq!(read_header_comment(&ident), Err(HeaderReadError::HeaderBadType(1)));
}

/// Window and mapping selection of a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ModeInfo {
	/// Whether the mode uses long blocks
	pub blockflag :bool,
	pub mapping :u8,
}

/// Reads a ModeInfo which is part of the setup header packet.
fn read_mode_info(rdr :&mut BitpackCursor, mapping_count :usize) -> Result<ModeInfo, HeaderReadError> {
	let blockflag = rdr.read_bit_flag()?;
	let windowtype = rdr.read_u16()?;
	let transformtype = rdr.read_u16()?;
	let mapping = rdr.read_u8()?;
	// Verifying ranges
	if windowtype != 0 ||
			transformtype != 0 ||
			mapping as usize >= mapping_count {
		// Undecodable per spec
		return Err(HeaderReadError::HeaderBadFormat);
	}
	Ok(ModeInfo {
		blockflag,
		mapping,
	})
}

/// The setup header
///
/// Holds the codebooks and the floor, residue, mapping and mode
/// tables of a stream. All indices between the tables have been
/// checked to be in range.
#[derive(Debug, Clone)]
pub struct SetupHeader {
	pub(crate) codebooks :Vec<Codebook>,
	pub(crate) floors :Vec<FloorConfig>,
	pub(crate) residues :Vec<ResidueConfig>,
	pub(crate) mappings :Vec<MappingConfig>,
	pub(crate) modes :Vec<ModeInfo>,
}

impl SetupHeader {
	/// Number of modes the stream declares
	pub fn mode_count(&self) -> usize {
		self.modes.len()
	}
	/// Number of codebooks the stream declares
	pub fn codebook_count(&self) -> usize {
		self.codebooks.len()
	}
}

/// Reading the setup header.
///
/// The audio channel and blocksize info needed by the function
/// can be obtained from the ident header.
pub fn read_header_setup(packet :&[u8], audio_channels :u8, blocksizes :(u8, u8)) ->
		Result<SetupHeader, HeaderReadError> {
	let mut rdr = BitpackCursor::new(packet);
	let hd_id = read_header_begin(&mut rdr)?;
	if hd_id != 5 {
		return Err(HeaderReadError::HeaderBadType(hd_id));
	}
	if audio_channels == 0 || blocksizes.0 > blocksizes.1 {
		return Err(HeaderReadError::HeaderBadFormat);
	}

	// 1. Read the codebooks
	let codebook_count = rdr.read_u8()? as usize + 1;
	debug_assert!(codebook_count <= MAX_CODEBOOKS);
	let mut codebooks = Vec::with_capacity(codebook_count);
	for _ in 0 .. codebook_count {
		let book = codebook::unpack_static(&mut rdr)?;
		codebooks.push(Codebook::from_static(&book)?);
	}

	// 2. Read the time domain transforms
	let time_count = rdr.read_u6()? + 1;
	for _ in 0 .. time_count {
		if rdr.read_u16()? != 0 {
			return Err(HeaderReadError::HeaderBadFormat);
		}
	}

	// 3. Read the floor values
	let floor_count = rdr.read_u6()? as usize + 1;
	debug_assert!(floor_count <= MAX_FLOORS);
	let mut floors = Vec::with_capacity(floor_count);
	for _ in 0 .. floor_count {
		let floor_type = rdr.read_u16()?;
		floors.push(FloorConfig::unpack(&mut rdr, floor_type, &codebooks)?);
	}

	// 4. Read the residue values
	let residue_count = rdr.read_u6()? as usize + 1;
	debug_assert!(residue_count <= MAX_RESIDUES);
	let mut residues = Vec::with_capacity(residue_count);
	for _ in 0 .. residue_count {
		let residue_type = rdr.read_u16()?;
		residues.push(ResidueConfig::unpack(&mut rdr, residue_type, &codebooks)?);
	}

	// 5. Read the mappings
	let mapping_count = rdr.read_u6()? as usize + 1;
	debug_assert!(mapping_count <= MAX_MAPPINGS);
	let mut mappings = Vec::with_capacity(mapping_count);
	for _ in 0 .. mapping_count {
		if rdr.read_u16()? != 0 {
			return Err(HeaderReadError::HeaderBadFormat);
		}
		mappings.push(MappingConfig::unpack(&mut rdr, audio_channels,
			floor_count, residue_count)?);
	}

	// 6. Read the modes
	let mode_count = rdr.read_u6()? as usize + 1;
	debug_assert!(mode_count <= MAX_MODES);
	let mut modes = Vec::with_capacity(mode_count);
	for _ in 0 .. mode_count {
		modes.push(read_mode_info(&mut rdr, mapping_count)?);
	}

	// Now we only have to make sure the framing bit is set,
	// and we can successfully return the setup header!
	let framing :bool = rdr.read_bit_flag()?;
	if !framing {
		return Err(HeaderReadError::HeaderBadFormat);
	}

	debug!("setup header: {} codebooks, {} floors, {} residues, {} mappings, {} modes",
		codebook_count, floor_count, residue_count, mapping_count, mode_count);
	Ok(SetupHeader {
		codebooks,
		floors,
		residues,
		mappings,
		modes,
	})
}

#[test]
fn test_read_header_setup() {
	let packet = test_packets::mono_setup(0);
	let setup = read_header_setup(&packet, 1, (8, 11)).unwrap();
	assert_eq!(setup.codebook_count(), 2);
	assert_eq!(setup.floors.len(), 1);
	assert_eq!(setup.residues.len(), 1);
	assert_eq!(setup.mappings.len(), 1);
	assert_eq!(setup.mode_count(), 2);
	assert_eq!(setup.modes[0], ModeInfo { blockflag : false, mapping : 0 });
	assert_eq!(setup.modes[1], ModeInfo { blockflag : true, mapping : 0 });

	// Truncating anywhere makes it fail
	for len in [7, 20, packet.len() / 2, packet.len() - 1].iter() {
		assert!(read_header_setup(&packet[.. *len], 1, (8, 11)).is_err());
	}

	// Mode referring to a non existing mapping
	let packet = test_packets::mono_setup(1);
	assert_eq!(read_header_setup(&packet, 1, (8, 11)).err(),
		Some(HeaderReadError::HeaderBadFormat));

	let comment = test_packets::comment("x", &[]);
	assert_eq!(read_header_setup(&comment, 1, (8, 11)).err(),
		Some(HeaderReadError::HeaderBadType(3)));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderStage {
	Ident,
	Comment,
	Setup,
	Done,
}

/**
Assembles the three headers of a stream

Feed the first packets of a logical stream to `push`, in order.
Once the setup header has been read, the complete `HeaderSet` is
returned. Headers arriving in the wrong order, a repeated header or
an identification header without the begin of stream flag are
reported as `HeaderReadError::OutOfOrder`.
*/
pub struct HeaderParser {
	stage :HeaderStage,
	ident :Option<IdentHeader>,
	comment :Option<CommentHeader>,
}

impl HeaderParser {
	pub fn new() -> Self {
		HeaderParser {
			stage : HeaderStage::Ident,
			ident : None,
			comment : None,
		}
	}

	/// The identification header, once it has been read
	pub fn ident(&self) -> Option<&IdentHeader> {
		self.ident.as_ref()
	}

	/// Whether all three headers have been read
	pub fn is_done(&self) -> bool {
		self.stage == HeaderStage::Done
	}

	/// Processes the next header packet.
	///
	/// `bos` is the begin of stream flag of the packet.
	/// Returns `Ok(None)` while more headers are needed.
	pub fn push(&mut self, packet :&[u8], bos :bool) -> Result<Option<HeaderSet>, HeaderReadError> {
		let expected = match self.stage {
			HeaderStage::Ident => 1,
			HeaderStage::Comment => 3,
			HeaderStage::Setup => 5,
			HeaderStage::Done => return Err(HeaderReadError::OutOfOrder),
		};
		match packet.first() {
			Some(&t) if t & 1 == 1 && t != expected => {
				return Err(HeaderReadError::OutOfOrder);
			},
			_ => (),
		}
		if bos != (self.stage == HeaderStage::Ident) {
			return Err(HeaderReadError::OutOfOrder);
		}
		match self.stage {
			HeaderStage::Ident => {
				let ident = read_header_ident(packet)?;
				debug!("ident header: {} channels, {} Hz, block sizes {}/{}",
					ident.audio_channels, ident.audio_sample_rate,
					ident.blocksize(false), ident.blocksize(true));
				self.ident = Some(ident);
				self.stage = HeaderStage::Comment;
				Ok(None)
			},
			HeaderStage::Comment => {
				let comment = read_header_comment(packet)?;
				debug!("comment header: vendor {:?}, {} comments",
					comment.vendor, comment.comment_list.len());
				self.comment = Some(comment);
				self.stage = HeaderStage::Setup;
				Ok(None)
			},
			_ => {
				let (channels, bs) = match self.ident.as_ref() {
					Some(i) => (i.audio_channels, (i.blocksize_0, i.blocksize_1)),
					None => return Err(HeaderReadError::OutOfOrder),
				};
				let setup = read_header_setup(packet, channels, bs)?;
				match (self.ident.take(), self.comment.take()) {
					(Some(ident), Some(comment)) => {
						self.stage = HeaderStage::Done;
						Ok(Some((ident, comment, setup)))
					},
					_ => Err(HeaderReadError::OutOfOrder),
				}
			},
		}
	}
}

impl Default for HeaderParser {
	fn default() -> Self {
		HeaderParser::new()
	}
}

#[test]
fn test_header_parser_order() {
	let ident = test_packets::ident(1, 44100, 8, 11);
	let comment = test_packets::comment("vendor", &[&b"A=b"[..]]);
	let setup = test_packets::mono_setup(0);

	let mut parser = HeaderParser::new();
	assert!(matches!(parser.push(&ident, true), Ok(None)));
	assert_eq!(parser.ident().map(|i| i.audio_sample_rate), Some(44100));
	assert!(matches!(parser.push(&comment, false), Ok(None)));
	let (i, c, s) = parser.push(&setup, false).unwrap().unwrap();
	assert_eq!(i.audio_channels, 1);
	assert_eq!(c.vendor, "vendor");
	assert_eq!(s.mode_count(), 2);
	assert!(parser.is_done());
	assert_eq!(parser.push(&setup, false).err(), Some(HeaderReadError::OutOfOrder));

	// Setup before comment
	let mut parser = HeaderParser::new();
	parser.push(&ident, true).unwrap();
	assert_eq!(parser.push(&setup, false).err(), Some(HeaderReadError::OutOfOrder));

	// Repeated ident
	let mut parser = HeaderParser::new();
	parser.push(&ident, true).unwrap();
	assert_eq!(parser.push(&ident, false).err(), Some(HeaderReadError::OutOfOrder));

	// Ident without begin of stream flag
	let mut parser = HeaderParser::new();
	assert_eq!(parser.push(&ident, false).err(), Some(HeaderReadError::OutOfOrder));

	// Audio instead of a header
	let mut parser = HeaderParser::new();
	parser.push(&ident, true).unwrap();
	assert_eq!(parser.push(&[0x00], false).err(), Some(HeaderReadError::HeaderIsAudio));
}

/// Builders for synthetic header and audio packets
#[cfg(test)]
pub(crate) mod test_packets {
	use crate::bitpacking::BitpackWriter;

	fn begin(w :&mut BitpackWriter, kind :u32) {
		w.write(kind, 8);
		for b in b"vorbis" {
			w.write(*b as u32, 8);
		}
	}

	pub fn ident(channels :u8, rate :u32, bs0 :u8, bs1 :u8) -> Vec<u8> {
		let mut w = BitpackWriter::new();
		begin(&mut w, 1);
		w.write(0, 32);
		w.write(channels as u32, 8);
		w.write(rate, 32);
		w.write(0, 32).write(0, 32).write(0, 32);
		w.write(bs0 as u32, 4).write(bs1 as u32, 4);
		w.write(1, 8);
		w.into_inner()
	}

	pub fn comment(vendor :&str, comments :&[&[u8]]) -> Vec<u8> {
		let mut w = BitpackWriter::new();
		begin(&mut w, 3);
		w.write(vendor.len() as u32, 32);
		for b in vendor.bytes() {
			w.write(b as u32, 8);
		}
		w.write(comments.len() as u32, 32);
		for c in comments {
			w.write(c.len() as u32, 32);
			for b in c.iter() {
				w.write(*b as u32, 8);
			}
		}
		w.write(1, 8);
		w.into_inner()
	}

	/// Setup header for a mono stream.
	///
	/// Book 0 has a single entry, book 1 two entries valued -1 and 1.
	/// One floor 1 without partitions, one residue 1 covering the
	/// first 128 bins in partitions of 32, one mapping, and a short
	/// and a long mode. The long mode refers to mapping `bad_mapping`,
	/// so anything but 0 makes the header invalid.
	pub fn mono_setup(bad_mapping :u32) -> Vec<u8> {
		let mut w = BitpackWriter::new();
		begin(&mut w, 5);
		w.write(1, 8);
		// book 0
		w.write(0x564342, 24).write(1, 16).write(1, 24);
		w.write_flag(false).write_flag(false);
		w.write(0, 5);
		w.write(0, 4);
		// book 1
		w.write(0x564342, 24).write(1, 16).write(2, 24);
		w.write_flag(false).write_flag(false);
		w.write(0, 5).write(0, 5);
		w.write(1, 4);
		w.write(0xE280_0001, 32).write(0x62A0_0001, 32);
		w.write(0, 4).write_flag(false);
		w.write(0, 1).write(1, 1);
		// time
		w.write(0, 6).write(0, 16);
		// floor 1: no partitions, multiplier 1, range bits 7
		w.write(0, 6).write(1, 16);
		w.write(0, 5);
		w.write(0, 2).write(7, 4);
		// residue 1
		w.write(0, 6).write(1, 16);
		w.write(0, 24).write(128, 24).write(31, 24);
		w.write(0, 6).write(0, 8);
		w.write(1, 3).write_flag(false);
		w.write(1, 8);
		// mapping
		w.write(0, 6).write(0, 16);
		w.write_flag(false).write_flag(false).write(0, 2);
		w.write(0, 8).write(0, 8).write(0, 8);
		// modes
		w.write(1, 6);
		w.write_flag(false).write(0, 16).write(0, 16).write(0, 8);
		w.write_flag(true).write(0, 16).write(0, 16).write(bad_mapping, 8);
		w.write_flag(true);
		w.into_inner()
	}

	/// Audio packet for `mono_setup`.
	///
	/// `long` selects the mode, `flags` are the previous and
	/// next window flags of long blocks. `floor` is `None` for
	/// a silent block, otherwise the two floor posts, and
	/// `signs` gives the residue value of each of the 128 bins.
	pub fn mono_audio(long :bool, flags :(bool, bool),
			floor :Option<(u8, u8)>, signs :&dyn Fn(usize) -> bool) -> Vec<u8> {
		let mut w = BitpackWriter::new();
		w.write(0, 1);
		w.write_flag(long);
		if long {
			w.write_flag(flags.0).write_flag(flags.1);
		}
		if let Some((y0, y1)) = floor {
			w.write_flag(true);
			w.write(y0 as u32, 8).write(y1 as u32, 8);
			for part in 0 .. 4 {
				// phrase of the single entry book
				w.write(0, 1);
				for i in 0 .. 32 {
					w.write_flag(signs(part * 32 + i));
				}
			}
		} else {
			w.write_flag(false);
		}
		w.into_inner()
	}
}
