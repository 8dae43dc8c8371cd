// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Decoder configuration
*/

/// Options for decoding a stream
///
/// ```
/// use vorbis_core::DecodeOptions;
/// let opts = DecodeOptions {
/// 	verify_crc : false,
/// 	.. DecodeOptions::default()
/// };
/// assert!(opts.trim_granule);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
	/// Check the CRC of each Ogg page.
	///
	/// Pages with a mismatching checksum are treated like lost
	/// data, and the demuxer resyncs on the next page.
	pub verify_crc :bool,
	/// Use the granule positions to cut off the samples of partial
	/// first and last blocks.
	pub trim_granule :bool,
	/// Bytes requested per `read` call by `OggStreamReader`
	pub read_chunk_size :usize,
}

impl Default for DecodeOptions {
	fn default() -> Self {
		DecodeOptions {
			verify_crc : true,
			trim_granule : true,
			read_chunk_size : 65536,
		}
	}
}
