// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

mod common;

use std::io::Cursor;

use vorbis_core::samples::InterleavedSamples;
use vorbis_core::{DecodeOptions, DecodeStatus, OggStreamReader, OggVorbisDecoder};

use common::*;

#[test]
fn samples_only_after_overlap() {
	init_logger();
	let mut pw = PageWriter::new(SERIAL, 255);
	pw.write(&[(&ident(1, 44100, 8, 11)[..], 0)], true, false);
	pw.write(&[(&comment("synth", &[])[..], 0), (&setup(1)[..], 0)], false, false);
	let headers = pw.out.split_off(0);

	let mut dec = OggVorbisDecoder::new(DecodeOptions::default());
	dec.feed_bytes(&headers);
	assert_eq!(dec.decode().unwrap(), DecodeStatus::NeedMoreData);
	assert_eq!(dec.channels(), Some(1));
	assert_eq!(dec.sample_rate(), Some(44100));

	pw.write(&[(&audio(1, false, (false, false), 0)[..], 0)], false, false);
	dec.feed_bytes(&pw.out.split_off(0));
	assert_eq!(dec.decode().unwrap(), DecodeStatus::NeedMoreData);
	assert!(dec.pcm_out(4096).is_empty());

	pw.write(&[(&audio(1, false, (false, false), 1)[..], 128)], false, false);
	dec.feed_bytes(&pw.out.split_off(0));
	assert_eq!(dec.decode().unwrap(), DecodeStatus::PcmReady(128));
	assert_eq!(dec.pcm_out(4096).len(), 128);
	assert_eq!(dec.consumed(128), 128);
	assert_eq!(dec.decode().unwrap(), DecodeStatus::NeedMoreData);

	pw.write(&[(&audio(1, false, (false, false), 2)[..], 256)], false, false);
	dec.feed_bytes(&pw.out.split_off(0));
	assert_eq!(dec.decode().unwrap(), DecodeStatus::PcmReady(128));
	dec.consumed(128);

	// Short to long
	pw.write(&[(&audio(1, true, (false, false), 3)[..], 256 + 576)], false, true);
	dec.feed_bytes(&pw.out.split_off(0));
	assert_eq!(dec.decode().unwrap(), DecodeStatus::PcmReady(576));
	dec.consumed(576);
	assert_eq!(dec.decode().unwrap(), DecodeStatus::EndOfStream);
}

#[test]
fn chunked_equals_single_shot() {
	init_logger();
	let pattern = [false, false, true, true, false, true, false, false, true, true, true];
	let (data, total) = synth_stream(2, &pattern, 300, 2);
	let whole = decode_chunked(&data, data.len(), DecodeOptions::default()).unwrap();
	assert_eq!(whole.len() as i64, total * 2);
	assert!(whole.iter().any(|v| *v != 0.));
	for &chunk in [1, 7, 64, 1000].iter() {
		let pcm = decode_chunked(&data, chunk, DecodeOptions::default()).unwrap();
		assert_eq!(pcm, whole, "chunk size {}", chunk);
	}
}

#[test]
fn end_is_trimmed_to_granule() {
	init_logger();
	let pattern = [false; 9];
	for &cut in [0, 1, 50, 127].iter() {
		let (data, total) = synth_stream(1, &pattern, cut, 255);
		assert_eq!(total, 8 * 128 - cut);
		let pcm = decode_chunked(&data, 4096, DecodeOptions::default()).unwrap();
		assert_eq!(pcm.len() as i64, total);

		let untrimmed = DecodeOptions {
			trim_granule : false,
			.. DecodeOptions::default()
		};
		let pcm_all = decode_chunked(&data, 4096, untrimmed).unwrap();
		assert_eq!(pcm_all.len(), 8 * 128);
		assert_eq!(&pcm_all[.. pcm.len()], &pcm[..]);
	}
}

#[test]
fn leading_garbage_is_skipped() {
	init_logger();
	let (data, total) = synth_stream(1, &[false, true, true, false, false], 0, 255);
	let mut garbage = b"not an ogg page, but Oh so close: Ogg".to_vec();
	garbage.extend_from_slice(&data);
	let clean = decode_chunked(&data, 100, DecodeOptions::default()).unwrap();
	let pcm = decode_chunked(&garbage, 100, DecodeOptions::default()).unwrap();
	assert_eq!(pcm.len() as i64, total);
	assert_eq!(pcm, clean);
}

#[test]
fn corrupted_page_is_dropped() {
	init_logger();
	let pattern = [false; 16];
	let (mut data, total) = synth_stream(1, &pattern, 0, 255);

	// Locate the second audio page: the fourth page overall
	let mut starts = Vec::new();
	for i in 0 .. data.len() - 4 {
		if &data[i .. i + 4] == b"OggS" {
			starts.push(i);
		}
	}
	assert_eq!(starts.len(), 2 + 4);
	let pos = starts[3] + 40;
	data[pos] ^= 0x55;

	let pcm = decode_chunked(&data, 512, DecodeOptions::default()).unwrap();
	// Four packets are lost, and the one after the gap primes the overlap
	assert_eq!(pcm.len() as i64, total - 5 * 128);

	let unchecked = DecodeOptions {
		verify_crc : false,
		.. DecodeOptions::default()
	};
	let pcm = decode_chunked(&data, 512, unchecked).unwrap();
	assert_eq!(pcm.len() as i64, total);
}

#[test]
fn stream_reader_pulls_from_read() {
	init_logger();
	let pattern = [true, false, false, true, true];
	let (data, total) = synth_stream(2, &pattern, 10, 255);
	let options = DecodeOptions {
		read_chunk_size : 33,
		.. DecodeOptions::default()
	};
	let mut rdr = OggStreamReader::with_options(Cursor::new(&data[..]), options).unwrap();
	assert_eq!(rdr.ident_hdr.audio_channels, 2);
	assert_eq!(rdr.ident_hdr.audio_sample_rate, 44100);
	assert_eq!(rdr.comment_hdr.vendor, "synth");
	assert_eq!(rdr.comment_hdr.comment_list[0], ("TITLE".to_string(), "noise".to_string()));

	let mut itl = Vec::new();
	while let Some(pck) = rdr.read_dec_packet_generic::<InterleavedSamples<f32>>().unwrap() {
		assert_eq!(pck.channel_count, 2);
		itl.extend(pck.samples);
	}
	assert_eq!(itl.len() as i64, total * 2);
	assert_eq!(rdr.get_last_absgp(), Some(total));
	assert_eq!(itl, decode_chunked(&data, 4096, DecodeOptions::default()).unwrap());
}

#[test]
fn whole_buffer_front_end() {
	init_logger();
	let (data, total) = synth_stream(2, &[false, false, false], 0, 255);
	let mut dec = OggVorbisDecoder::from_bytes(&data, DecodeOptions::default()).unwrap();
	assert_eq!(dec.channels(), Some(2));
	let session = dec.session().unwrap();
	assert_eq!(session.setup().mode_count(), 2);
	let mut n = 0;
	while let DecodeStatus::PcmReady(avail) = dec.decode().unwrap() {
		let planar = dec.pcm_planar();
		assert_eq!(planar.len(), 2);
		assert_eq!(planar[0].len(), avail);
		for v in planar.iter().flat_map(|p| p.iter()) {
			assert!(v.is_finite());
		}
		n += dec.consumed(avail);
	}
	assert_eq!(n as i64, total);
	assert!(dec.is_end_of_stream());
	assert!(dec.session().unwrap().bit_counters().residue > 0);
}
