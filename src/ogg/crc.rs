// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Ogg page checksums

CRC-32 with the polynomial 0x04C11DB7, no reflection,
an initial value of zero and no final xor.
*/

const CRC_POLY :u32 = 0x04c1_1db7;

const fn make_table() -> [u32; 256] {
	let mut table = [0u32; 256];
	let mut i = 0;
	while i < 256 {
		let mut r = (i as u32) << 24;
		let mut j = 0;
		while j < 8 {
			r = if r & 0x8000_0000 != 0 {
				(r << 1) ^ CRC_POLY
			} else {
				r << 1
			};
			j += 1;
		}
		table[i] = r;
		i += 1;
	}
	table
}

static CRC_LOOKUP :[u32; 256] = make_table();

/// Continues the checksum `crc` over `data`
pub fn update(crc :u32, data :&[u8]) -> u32 {
	data.iter().fold(crc, |crc, b| {
		(crc << 8) ^ CRC_LOOKUP[((crc >> 24) as u8 ^ *b) as usize]
	})
}

/// Checksum of a page, with the checksum field counted as zero
pub fn page_checksum(header :&[u8], body :&[u8]) -> u32 {
	let crc = update(0, &header[.. 22]);
	let crc = update(crc, &[0; 4]);
	let crc = update(crc, &header[26 ..]);
	update(crc, body)
}

#[test]
fn test_crc_vectors() {
	assert_eq!(update(0, b""), 0);
	assert_eq!(update(0, b"123456789"), 0x89a1_897f);
	assert_eq!(update(0, b"OggS"), 0x5fb0_a94f);
	// Incremental
	assert_eq!(update(update(0, b"1234"), b"56789"), 0x89a1_897f);
}
