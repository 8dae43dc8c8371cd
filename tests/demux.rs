// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

mod common;

use std::io::Cursor;

use ogg::reading::PacketReader;
use vorbis_core::ogg::{LogicalStream, OggSync, PacketOutcome, PageOutcome};

use common::*;

/// (data, bos, eos, granule)
type PacketSummary = (Vec<u8>, bool, bool, Option<i64>);

fn demux(data :&[u8], chunk :usize) -> Vec<PacketSummary> {
	let mut sync = OggSync::new(true);
	let mut stream = LogicalStream::new(SERIAL);
	let mut packets = Vec::new();
	for c in data.chunks(chunk) {
		sync.submit(c);
		loop {
			match sync.next_page() {
				PageOutcome::Ready(page) => stream.push_page(&page).unwrap(),
				PageOutcome::NeedMoreData => break,
				PageOutcome::Resynced(n) => panic!("lost sync, skipped {}", n),
			}
			loop {
				match stream.pop_packet() {
					PacketOutcome::Packet(p) => packets.push((p.data.to_vec(), p.bos, p.eos, p.granule_pos)),
					PacketOutcome::NeedMoreData => break,
					PacketOutcome::Discontinuity => panic!("discontinuity"),
				}
			}
		}
	}
	packets
}

#[test]
fn matches_reference_demuxer() {
	init_logger();
	let pattern = [false, true, true, false, false, false, true];
	for &max_segments in [1, 2, 255].iter() {
		let (data, total) = synth_stream(2, &pattern, 5, max_segments);

		let mut rdr = PacketReader::new(Cursor::new(&data[..]));
		let mut reference = Vec::new();
		while let Some(pck) = rdr.read_packet().unwrap() {
			assert_eq!(pck.stream_serial(), SERIAL);
			let granule = if pck.last_in_page() {
				Some(pck.absgp_page() as i64)
			} else {
				None
			};
			reference.push((pck.data.clone(), pck.first_in_stream(), pck.last_in_stream(), granule));
		}

		let ours = demux(&data, 50);
		assert_eq!(ours.len(), 3 + pattern.len());
		assert_eq!(ours.len(), reference.len());
		for (i, (a, b)) in ours.iter().zip(reference.iter()).enumerate() {
			assert_eq!(a.0, b.0, "packet {} data", i);
			assert_eq!(a.1, b.1, "packet {} bos", i);
			assert_eq!(a.2, b.2, "packet {} eos", i);
			// Our granule is only set when the packet completes the page
			if let Some(g) = a.3 {
				assert_eq!(Some(g), b.3, "packet {} granule", i);
			}
		}
		assert_eq!(ours.last().and_then(|p| p.3), Some(total));
	}
}

#[test]
fn packet_numbers_count_gaps() {
	init_logger();
	let (data, _) = synth_stream(1, &[false; 12], 0, 255);
	let mut sync = OggSync::new(true);
	sync.submit(&data);
	let mut stream = LogicalStream::new(SERIAL);
	let mut seen = Vec::new();
	let mut page_no = 0;
	loop {
		match sync.next_page() {
			PageOutcome::Ready(page) => {
				// Drop the second audio page
				if page_no != 3 {
					stream.push_page(&page).unwrap();
				}
				page_no += 1;
			},
			_ => break,
		}
		loop {
			match stream.pop_packet() {
				PacketOutcome::Packet(p) => seen.push(Some(p.packet_no)),
				PacketOutcome::Discontinuity => seen.push(None),
				PacketOutcome::NeedMoreData => break,
			}
		}
	}
	let mut expected = (0 .. 7).map(Some).collect::<Vec<_>>();
	expected.push(None);
	expected.extend((8 .. 12).map(Some));
	assert_eq!(seen, expected);
	assert!(stream.is_eos());
}
