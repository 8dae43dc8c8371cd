// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Page synchronisation

Finds Ogg pages in a byte stream that is handed over in arbitrary chunks.
*/

use byteorder::{ByteOrder, LittleEndian};
use log::{trace, warn};

use super::crc;

const CAPTURE_PATTERN :&[u8; 4] = b"OggS";
/// Length of the fixed part of a page header
const HEADER_FIXED_LEN :usize = 27;

/// A complete page, borrowed from the sync buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page<'a> {
	header :&'a [u8],
	body :&'a [u8],
}

impl<'a> Page<'a> {
	pub fn version(&self) -> u8 {
		self.header[4]
	}
	/// Whether the first packet of the page continues one of the previous page
	pub fn continued(&self) -> bool {
		self.header[5] & 0x01 != 0
	}
	pub fn bos(&self) -> bool {
		self.header[5] & 0x02 != 0
	}
	pub fn eos(&self) -> bool {
		self.header[5] & 0x04 != 0
	}
	/// Granule position, -1 if no packet ends on this page
	pub fn granule_pos(&self) -> i64 {
		LittleEndian::read_i64(&self.header[6 .. 14])
	}
	pub fn serial(&self) -> u32 {
		LittleEndian::read_u32(&self.header[14 .. 18])
	}
	pub fn sequence(&self) -> u32 {
		LittleEndian::read_u32(&self.header[18 .. 22])
	}
	pub fn checksum(&self) -> u32 {
		LittleEndian::read_u32(&self.header[22 .. 26])
	}
	/// The segment lengths
	pub fn segments(&self) -> &'a [u8] {
		&self.header[HEADER_FIXED_LEN ..]
	}
	pub fn body(&self) -> &'a [u8] {
		self.body
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome<'a> {
	Ready(Page<'a>),
	/// No complete page is buffered
	NeedMoreData,
	/// Bytes were skipped to find the next page.
	///
	/// Reported once for each stretch of lost data,
	/// with the number of bytes skipped at first.
	Resynced(usize),
}

enum Seek {
	Page { header_len :usize, body_len :usize },
	NeedMoreData,
	Skipped(usize),
}

/// Buffers incoming bytes and splits them into pages
pub struct OggSync {
	data :Vec<u8>,
	/// Start of the bytes not yet returned as part of a page
	returned :usize,
	/// Header and body length of the page at `returned`,
	/// once its segment table was seen
	header_len :usize,
	body_len :usize,
	unsynced :bool,
	verify_crc :bool,
}

impl OggSync {
	pub fn new(verify_crc :bool) -> Self {
		OggSync {
			data : Vec::new(),
			returned : 0,
			header_len : 0,
			body_len : 0,
			unsynced : false,
			verify_crc,
		}
	}

	/// Appends bytes to the buffer
	pub fn submit(&mut self, bytes :&[u8]) {
		if self.returned > 0 {
			self.data.drain(.. self.returned);
			self.returned = 0;
		}
		self.data.extend_from_slice(bytes);
	}

	/// Bytes that have been submitted but not returned in a page
	pub fn buffered(&self) -> usize {
		self.data.len() - self.returned
	}

	/// Drops all buffered data
	pub fn reset(&mut self) {
		self.data.clear();
		self.returned = 0;
		self.header_len = 0;
		self.body_len = 0;
		self.unsynced = false;
	}

	fn seek(&mut self) -> Seek {
		let page = &self.data[self.returned ..];
		let bytes = page.len();

		if self.header_len == 0 {
			if bytes < HEADER_FIXED_LEN {
				return Seek::NeedMoreData;
			}
			if &page[.. 4] != CAPTURE_PATTERN {
				return self.sync_fail();
			}
			let header_len = HEADER_FIXED_LEN + page[26] as usize;
			if bytes < header_len {
				return Seek::NeedMoreData;
			}
			self.body_len = page[HEADER_FIXED_LEN .. header_len].iter()
				.map(|s| *s as usize)
				.sum();
			self.header_len = header_len;
		}
		if self.header_len + self.body_len > bytes {
			return Seek::NeedMoreData;
		}

		if self.verify_crc {
			let header = &page[.. self.header_len];
			let body = &page[self.header_len .. self.header_len + self.body_len];
			let stored = LittleEndian::read_u32(&header[22 .. 26]);
			let computed = crc::page_checksum(header, body);
			if stored != computed {
				warn!("page checksum mismatch: stored {:08x}, computed {:08x}",
					stored, computed);
				return self.sync_fail();
			}
		}

		let res = Seek::Page {
			header_len : self.header_len,
			body_len : self.body_len,
		};
		self.unsynced = false;
		self.header_len = 0;
		self.body_len = 0;
		res
	}

	/// Skips to the next byte that may start a page
	fn sync_fail(&mut self) -> Seek {
		self.header_len = 0;
		self.body_len = 0;
		let page = &self.data[self.returned ..];
		let skip = page[1 ..].iter()
			.position(|b| *b == CAPTURE_PATTERN[0])
			.map(|p| p + 1)
			.unwrap_or(page.len());
		self.returned += skip;
		Seek::Skipped(skip)
	}

	/// Returns the next page
	pub fn next_page(&mut self) -> PageOutcome<'_> {
		let (start, header_len, body_len) = loop {
			let start = self.returned;
			match self.seek() {
				Seek::Page { header_len, body_len } => break (start, header_len, body_len),
				Seek::NeedMoreData => return PageOutcome::NeedMoreData,
				Seek::Skipped(n) => {
					if !self.unsynced {
						self.unsynced = true;
						warn!("lost sync, skipped {} bytes", n);
						return PageOutcome::Resynced(n);
					}
				},
			}
		};
		self.returned = start + header_len + body_len;
		let page = Page {
			header : &self.data[start .. start + header_len],
			body : &self.data[start + header_len .. start + header_len + body_len],
		};
		trace!("page: serial {:08x}, sequence {}, {} body bytes",
			page.serial(), page.sequence(), body_len);
		PageOutcome::Ready(page)
	}
}

#[cfg(test)]
use super::test_pages::{page, BOS};

#[cfg(test)]
fn expect_page(sync :&mut OggSync) -> (u32, Vec<u8>) {
	match sync.next_page() {
		PageOutcome::Ready(p) => (p.sequence(), p.body().to_vec()),
		o => panic!("expected a page, got {:?}", o),
	}
}

#[test]
fn test_page_fields() {
	let data = page(BOS, 1234, 0xdead_beef, 7, &[3, 2], b"abcde");
	let mut sync = OggSync::new(true);
	sync.submit(&data);
	match sync.next_page() {
		PageOutcome::Ready(p) => {
			assert_eq!(p.version(), 0);
			assert!(p.bos());
			assert!(!p.eos());
			assert!(!p.continued());
			assert_eq!(p.granule_pos(), 1234);
			assert_eq!(p.serial(), 0xdead_beef);
			assert_eq!(p.sequence(), 7);
			assert_eq!(p.segments(), &[3, 2]);
			assert_eq!(p.body(), b"abcde");
		},
		o => panic!("{:?}", o),
	}
	assert_eq!(sync.next_page(), PageOutcome::NeedMoreData);
	assert_eq!(sync.buffered(), 0);
}

#[test]
fn test_chunked_feeding() {
	let mut data = page(BOS, 0, 1, 0, &[10], &[1; 10]);
	data.extend(page(0, 0, 1, 1, &[255, 0], &[2; 255]));
	let mut sync = OggSync::new(true);
	let mut pages = Vec::new();
	for chunk in data.chunks(7) {
		sync.submit(chunk);
		while let PageOutcome::Ready(p) = sync.next_page() {
			pages.push((p.sequence(), p.body().len()));
		}
	}
	assert_eq!(pages, &[(0, 10), (1, 255)]);
}

#[test]
fn test_empty_body_needs_more_data() {
	let data = page(0, 0, 1, 0, &[20], &[9; 20]);
	let mut sync = OggSync::new(true);
	// Header and segment table, but no body
	sync.submit(&data[.. 28]);
	assert_eq!(sync.next_page(), PageOutcome::NeedMoreData);
	assert_eq!(sync.next_page(), PageOutcome::NeedMoreData);
	sync.submit(&data[28 ..]);
	assert_eq!(expect_page(&mut sync), (0, vec![9; 20]));
}

#[test]
fn test_resync_reported_once() {
	let mut data = b"xxOxxO".to_vec();
	data.extend(page(0, 0, 1, 0, &[1], &[42]));
	data.extend(b"garbage");
	data.extend(page(0, 0, 1, 1, &[1], &[43]));
	let mut sync = OggSync::new(true);
	sync.submit(&data);
	assert_eq!(sync.next_page(), PageOutcome::Resynced(2));
	assert_eq!(expect_page(&mut sync), (0, vec![42]));
	assert_eq!(sync.next_page(), PageOutcome::Resynced(7));
	assert_eq!(expect_page(&mut sync), (1, vec![43]));
	assert_eq!(sync.next_page(), PageOutcome::NeedMoreData);
}

#[test]
fn test_bad_checksum() {
	let mut data = page(0, 0, 1, 0, &[4], b"abcd");
	data.extend(page(0, 0, 1, 1, &[4], b"efgh"));
	// Corrupt the first body
	data[28] = b'X';

	let mut sync = OggSync::new(true);
	sync.submit(&data);
	assert_eq!(sync.next_page(), PageOutcome::Resynced(32));
	assert_eq!(expect_page(&mut sync), (1, b"efgh".to_vec()));

	let mut sync = OggSync::new(false);
	sync.submit(&data);
	assert_eq!(expect_page(&mut sync), (0, b"Xbcd".to_vec()));
	assert_eq!(expect_page(&mut sync), (1, b"efgh".to_vec()));
}
