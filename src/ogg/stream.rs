// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Packet reassembly

Collects the pages of one logical stream and hands out the packets
they contain. Packets may span pages; if a page goes missing, the
partial packet is dropped and a discontinuity is reported in place
of the lost data.
*/

use log::{debug, warn};

use super::sync::Page;
use super::OggError;

#[derive(Debug, Clone, Copy)]
struct Lacing {
	size :u8,
	/// Marker for lost data, carries no bytes
	gap :bool,
	bos :bool,
	eos :bool,
	/// Granule position of the page, set on the last packet completed on it
	granule :i64,
}

/// A packet, borrowed from the stream's buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
	pub data :&'a [u8],
	pub bos :bool,
	pub eos :bool,
	pub granule_pos :Option<i64>,
	pub packet_no :u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome<'a> {
	Packet(Packet<'a>),
	NeedMoreData,
	/// Data was lost before the next packet
	Discontinuity,
}

/// State of a single logical stream
pub struct LogicalStream {
	serial :u32,
	body :Vec<u8>,
	body_returned :usize,
	lacing :Vec<Lacing>,
	lacing_returned :usize,
	/// Number of lacing entries that belong to complete packets
	lacing_packet :usize,
	next_sequence :Option<u32>,
	packet_no :u64,
	eos :bool,
}

impl LogicalStream {
	pub fn new(serial :u32) -> Self {
		LogicalStream {
			serial,
			body : Vec::new(),
			body_returned : 0,
			lacing : Vec::new(),
			lacing_returned : 0,
			lacing_packet : 0,
			next_sequence : None,
			packet_no : 0,
			eos : false,
		}
	}

	pub fn serial(&self) -> u32 {
		self.serial
	}

	/// Whether a page with the end of stream flag was seen
	pub fn is_eos(&self) -> bool {
		self.eos
	}

	/// Forgets all buffered data, keeping the serial
	pub fn reset(&mut self) {
		*self = LogicalStream::new(self.serial);
	}

	fn compact(&mut self) {
		if self.body_returned > 0 {
			self.body.drain(.. self.body_returned);
			self.body_returned = 0;
		}
		if self.lacing_returned > 0 {
			self.lacing.drain(.. self.lacing_returned);
			self.lacing_packet -= self.lacing_returned;
			self.lacing_returned = 0;
		}
	}

	/// Drops the segments of a packet that was not completed
	fn drop_partial(&mut self) {
		let partial :usize = self.lacing[self.lacing_packet ..].iter()
			.map(|l| l.size as usize)
			.sum();
		let len = self.body.len() - partial;
		self.body.truncate(len);
		self.lacing.truncate(self.lacing_packet);
	}

	/// Adds a page to the stream
	pub fn push_page(&mut self, page :&Page) -> Result<(), OggError> {
		self.compact();

		if page.version() > 0 {
			return Err(OggError::UnsupportedVersion(page.version()));
		}
		if page.serial() != self.serial {
			return Err(OggError::SerialMismatch);
		}

		let sequence = page.sequence();
		let segments = page.segments();
		let mut body = page.body();
		let mut bos = page.bos();

		if self.next_sequence != Some(sequence) {
			self.drop_partial();
			if let Some(expected) = self.next_sequence {
				warn!("page sequence gap: expected {}, got {}", expected, sequence);
				self.lacing.push(Lacing {
					size : 0,
					gap : true,
					bos : false,
					eos : false,
					granule : -1,
				});
				self.lacing_packet += 1;
			}
		} else if !page.continued() && self.lacing.len() > self.lacing_packet {
			debug!("unterminated packet before page {}, dropping it", sequence);
			self.drop_partial();
		}

		let mut seg_start = 0;
		if page.continued() {
			let starts_fresh = match self.lacing.last() {
				None => true,
				Some(l) => l.gap || l.size < 255,
			};
			if starts_fresh {
				// Nothing to continue, skip the tail of the packet
				bos = false;
				for &val in segments {
					body = &body[val as usize ..];
					seg_start += 1;
					if val < 255 {
						break;
					}
				}
			}
		}

		self.body.extend_from_slice(body);

		let mut last_complete = None;
		for &val in &segments[seg_start ..] {
			self.lacing.push(Lacing {
				size : val,
				gap : false,
				bos,
				eos : false,
				granule : -1,
			});
			bos = false;
			if val < 255 {
				last_complete = Some(self.lacing.len() - 1);
				self.lacing_packet = self.lacing.len();
			}
		}
		if let Some(idx) = last_complete {
			self.lacing[idx].granule = page.granule_pos();
		}

		if page.eos() {
			self.eos = true;
			if let Some(l) = self.lacing.last_mut() {
				l.eos = true;
			}
		}

		self.next_sequence = Some(sequence.wrapping_add(1));
		Ok(())
	}

	/// Returns the next complete packet
	pub fn pop_packet(&mut self) -> PacketOutcome<'_> {
		if self.lacing_packet <= self.lacing_returned {
			return PacketOutcome::NeedMoreData;
		}
		let mut ptr = self.lacing_returned;
		let first = self.lacing[ptr];
		if first.gap {
			self.lacing_returned += 1;
			self.packet_no += 1;
			return PacketOutcome::Discontinuity;
		}

		let mut size = first.size;
		let mut bytes = size as usize;
		let mut eos = first.eos;
		while size == 255 {
			ptr += 1;
			size = self.lacing[ptr].size;
			eos |= self.lacing[ptr].eos;
			bytes += size as usize;
		}
		let granule = self.lacing[ptr].granule;

		let start = self.body_returned;
		self.body_returned += bytes;
		self.lacing_returned = ptr + 1;
		let packet_no = self.packet_no;
		self.packet_no += 1;

		PacketOutcome::Packet(Packet {
			data : &self.body[start .. start + bytes],
			bos : first.bos,
			eos,
			granule_pos : if granule == -1 { None } else { Some(granule) },
			packet_no,
		})
	}
}

#[cfg(test)]
use super::test_pages::{page, packets_page, BOS, CONTINUED, EOS};

#[cfg(test)]
fn push(stream :&mut LogicalStream, bytes :&[u8]) -> Result<(), OggError> {
	use super::sync::{OggSync, PageOutcome};
	let mut sync = OggSync::new(false);
	sync.submit(bytes);
	match sync.next_page() {
		PageOutcome::Ready(p) => stream.push_page(&p),
		o => panic!("no page: {:?}", o),
	}
}

#[cfg(test)]
fn pop(stream :&mut LogicalStream) -> Option<(Vec<u8>, Option<i64>, u64)> {
	match stream.pop_packet() {
		PacketOutcome::Packet(p) => Some((p.data.to_vec(), p.granule_pos, p.packet_no)),
		PacketOutcome::NeedMoreData => None,
		PacketOutcome::Discontinuity => panic!("unexpected discontinuity"),
	}
}

#[test]
fn test_flags_and_numbers() {
	let mut s = LogicalStream::new(5);
	push(&mut s, &packets_page(BOS, 0, 5, 0, &[b"one"])).unwrap();
	push(&mut s, &packets_page(EOS, 20, 5, 1, &[b"two", b"three"])).unwrap();
	match s.pop_packet() {
		PacketOutcome::Packet(p) => {
			assert_eq!(p.data, b"one");
			assert!(p.bos);
			assert!(!p.eos);
			assert_eq!(p.granule_pos, Some(0));
			assert_eq!(p.packet_no, 0);
		},
		o => panic!("{:?}", o),
	}
	assert_eq!(pop(&mut s), Some((b"two".to_vec(), None, 1)));
	match s.pop_packet() {
		PacketOutcome::Packet(p) => {
			assert_eq!(p.data, b"three");
			assert!(!p.bos);
			assert!(p.eos);
			assert_eq!(p.granule_pos, Some(20));
		},
		o => panic!("{:?}", o),
	}
	assert_eq!(s.pop_packet(), PacketOutcome::NeedMoreData);
	assert!(s.is_eos());
}

#[test]
fn test_continuation() {
	let long :Vec<u8> = (0 .. 300).map(|v| v as u8).collect();
	let mut s = LogicalStream::new(1);
	push(&mut s, &page(0, -1, 1, 0, &[255], &long[.. 255])).unwrap();
	assert_eq!(pop(&mut s), None);

	let mut body = long[255 ..].to_vec();
	body.extend(b"end");
	push(&mut s, &page(CONTINUED, 100, 1, 1, &[45, 3], &body)).unwrap();
	// The granule belongs to the last packet completed on the page
	assert_eq!(pop(&mut s), Some((long, None, 0)));
	assert_eq!(pop(&mut s), Some((b"end".to_vec(), Some(100), 1)));
	assert_eq!(pop(&mut s), None);
}

#[test]
fn test_gap_reported_once() {
	let mut s = LogicalStream::new(1);
	push(&mut s, &packets_page(0, 10, 1, 0, &[b"a"])).unwrap();
	push(&mut s, &packets_page(0, 30, 1, 2, &[b"b"])).unwrap();
	assert_eq!(pop(&mut s), Some((b"a".to_vec(), Some(10), 0)));
	assert_eq!(s.pop_packet(), PacketOutcome::Discontinuity);
	assert_eq!(pop(&mut s), Some((b"b".to_vec(), Some(30), 2)));
	assert_eq!(s.pop_packet(), PacketOutcome::NeedMoreData);
}

#[test]
fn test_continued_page_after_gap() {
	let mut s = LogicalStream::new(1);
	push(&mut s, &page(0, -1, 1, 0, &[255], &[7; 255])).unwrap();
	let mut body = vec![8; 10];
	body.extend(b"fresh");
	// Page 1 is lost, the partial packet can't be completed
	push(&mut s, &page(CONTINUED, 50, 1, 2, &[10, 5], &body)).unwrap();
	assert_eq!(s.pop_packet(), PacketOutcome::Discontinuity);
	assert_eq!(pop(&mut s), Some((b"fresh".to_vec(), Some(50), 1)));
	assert_eq!(pop(&mut s), None);
}

#[test]
fn test_first_continued_page_skipped() {
	// Joining a stream in the middle of a packet
	let mut s = LogicalStream::new(1);
	let mut body = vec![0; 255 + 4];
	body.extend(b"xy");
	push(&mut s, &page(CONTINUED, 9, 1, 40, &[255, 4, 2], &body)).unwrap();
	assert_eq!(pop(&mut s), Some((b"xy".to_vec(), Some(9), 0)));
	assert_eq!(pop(&mut s), None);
}

#[test]
fn test_rejected_pages() {
	let mut s = LogicalStream::new(1);
	assert_eq!(push(&mut s, &packets_page(BOS, 0, 2, 0, &[b"x"])),
		Err(OggError::SerialMismatch));
	let mut p = packets_page(BOS, 0, 1, 0, &[b"x"]);
	p[4] = 1;
	assert_eq!(push(&mut s, &p), Err(OggError::UnsupportedVersion(1)));
	assert_eq!(pop(&mut s), None);
	push(&mut s, &packets_page(BOS, 0, 1, 0, &[b"x"])).unwrap();
	assert_eq!(pop(&mut s), Some((b"x".to_vec(), Some(0), 0)));
}

#[test]
fn test_packet_spanning_three_pages() {
	let data = vec![3u8; 600];
	let mut s = LogicalStream::new(1);
	push(&mut s, &page(0, -1, 1, 0, &[255], &data[.. 255])).unwrap();
	push(&mut s, &page(CONTINUED, -1, 1, 1, &[255], &data[255 .. 510])).unwrap();
	assert_eq!(pop(&mut s), None);
	push(&mut s, &page(CONTINUED, 600, 1, 2, &[90], &data[510 ..])).unwrap();
	assert_eq!(pop(&mut s), Some((data, Some(600), 0)));
}
