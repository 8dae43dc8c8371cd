// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Codebook handling

A codebook is first read from the setup header into a `StaticCodebook`,
which stores the declared codeword lengths and the optional VQ value
mapping as-is. From that, a decode-optimized `Codebook` is built:

* the codewords get assigned canonically, lowest free codeword per length
* every codeword is bit reversed, as the bitpacking layer is LSb first
  while the codewords are defined MSb first
* the codewords are sorted by their reversed value, which allows
  a treeless decode: a small direct lookup table resolves the short
  codewords in one step, for the longer ones the table stores
  hints for a binary search on the sorted list.

All per-entry tables of the runtime codebook (lengths, VQ values,
entry numbers) are indexed by the position in the sorted list.
*/

use crate::bitpacking::{BitpackCursor, OutOfData};
use crate::header::HeaderReadError;
use crate::{bit_reverse, ilog};

const CODEBOOK_SYNC_PATTERN :u32 = 0x564342;

/// VQ value mapping of a codebook as declared in the setup header
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VqLookup {
	/// 1: values derived from one shared axis per dimension,
	/// 2: values stored explicitly per entry and dimension
	pub lookup_type :u8,
	pub minimum_value :f32,
	pub delta_value :f32,
	pub sequence_p :bool,
	pub multiplicands :Vec<u32>,
}

/// A codebook as read from the setup header
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StaticCodebook {
	pub dimensions :u16,
	pub entries :u32,
	/// Codeword length for each entry, 0 means the entry is unused
	pub codeword_lengths :Vec<u8>,
	pub vq_lookup :Option<VqLookup>,
}

impl StaticCodebook {
	pub fn map_type(&self) -> u8 {
		self.vq_lookup.as_ref().map(|l| l.lookup_type).unwrap_or(0)
	}
	fn used_entries(&self) -> usize {
		self.codeword_lengths.iter().filter(|l| **l > 0).count()
	}
}

/// Unpacks the float format used by the codebook VQ headers.
pub(crate) fn float32_unpack(val :u32) -> f32 {
	let sgn = val & 0x80000000;
	let exp = ((val & 0x7fe00000) >> 21) as i32;
	let mut mantissa = (val & 0x1fffff) as f64;
	if sgn != 0 {
		mantissa = -mantissa;
	}
	// Clamp exponents that would leave the range of the float format
	let exp = (exp - 788).max(-63).min(63);
	return (mantissa * 2f64.powi(exp)) as f32;
}

#[test]
fn test_float_32_unpack() {
	assert_eq!(float32_unpack(1611661312), 1.000000);
	assert_eq!(float32_unpack(1616117760), 5.000000);
	assert_eq!(float32_unpack(1618345984), 11.000000);
	assert_eq!(float32_unpack(1620115456), 17.000000);
	assert_eq!(float32_unpack(1627381760), 255.000000);
	assert_eq!(float32_unpack(3759144960), -1.000000);
	assert_eq!(float32_unpack(3761242112), -2.000000);
	assert_eq!(float32_unpack(3763339264), -4.000000);
	assert_eq!(float32_unpack(3763601408), -5.000000);
	assert_eq!(float32_unpack(3765436416), -8.000000);
	assert_eq!(float32_unpack(3765829632), -11.000000);
	assert_eq!(float32_unpack(3775397888), -128.000000);
}

/// Returns the greatest integer whose `dimensions`-th power
/// is less than or equal to `entries`.
///
/// The float estimate is only used as starting point, the result
/// is verified with integer arithmetic.
pub(crate) fn lookup1_values(entries :u32, dimensions :u16) -> u32 {
	if entries < 1 {
		return 0;
	}
	if dimensions == 0 {
		return u32::max_value();
	}
	let entries = entries as u64;
	let mut vals = (entries as f64).powf(1.0 / dimensions as f64).floor() as u64;
	if vals < 1 {
		vals = 1;
	}
	loop {
		let mut acc :u64 = 1;
		let mut acc1 :u64 = 1;
		let mut i = 0;
		while i < dimensions {
			if entries / vals < acc {
				break;
			}
			acc *= vals;
			acc1 = acc1.saturating_mul(vals + 1);
			i += 1;
		}
		if i >= dimensions && acc <= entries && acc1 > entries {
			return vals as u32;
		} else if i < dimensions || acc > entries {
			vals -= 1;
		} else {
			vals += 1;
		}
	}
}

#[test]
fn test_lookup1_values() {
	// First, with base two:
	// 2 ^ 10 = 1024
	assert_eq!(lookup1_values(1025, 10), 2);
	assert_eq!(lookup1_values(1024, 10), 2);
	assert_eq!(lookup1_values(1023, 10), 1);

	// Now, the searched base is five:
	// 5 ^ 5 = 3125
	assert_eq!(lookup1_values(3126, 5), 5);
	assert_eq!(lookup1_values(3125, 5), 5);
	assert_eq!(lookup1_values(3124, 5), 4);

	// Edge cases
	assert_eq!(lookup1_values(1, 1), 1);
	assert_eq!(lookup1_values(0, 15), 0);
	assert_eq!(lookup1_values(0, 0), 0);
	assert_eq!(lookup1_values(1, 40), 1);
	assert_eq!(lookup1_values(0xffffff, 1), 0xffffff);
	assert_eq!(lookup1_values(0xffffff, 2), 4095);
}

/// Reads a codebook which is part of the setup header packet.
///
/// Besides the bitstream layout, this validates that the codeword
/// lengths form a complete prefix code, so a `StaticCodebook` returned
/// from here can always be turned into a runtime `Codebook`.
pub(crate) fn unpack_static(rdr :&mut BitpackCursor) -> Result<StaticCodebook, HeaderReadError> {
	if rdr.read_u24()? != CODEBOOK_SYNC_PATTERN {
		return Err(HeaderReadError::HeaderBadFormat);
	}
	let dimensions = rdr.read_u16()?;
	let entries = rdr.read_u24()?;
	if ilog(dimensions as u64) + ilog(entries as u64) > 24 {
		return Err(HeaderReadError::HeaderBadFormat);
	}

	let ordered = rdr.read_bit_flag()?;
	let mut codeword_lengths = Vec::new();
	if !ordered {
		let sparse = rdr.read_bit_flag()?;
		// Reject length lists that can't possibly fit into the packet
		// before allocating for them.
		let min_bits = entries as usize * if sparse { 1 } else { 5 };
		if min_bits > rdr.bits_left() {
			return Err(HeaderReadError::HeaderBadFormat);
		}
		codeword_lengths.reserve(entries as usize);
		for _ in 0 .. entries {
			let present = if sparse { rdr.read_bit_flag()? } else { true };
			if present {
				codeword_lengths.push(rdr.read_u5()? + 1);
			} else {
				codeword_lengths.push(0);
			}
		}
	} else {
		let mut current_length = rdr.read_u5()? as u32 + 1;
		codeword_lengths.reserve(entries as usize);
		let mut current_entry :u32 = 0;
		while current_entry < entries {
			let left = entries - current_entry;
			let number = rdr.read(ilog(left as u64))?;
			if current_length > 32 || number > left ||
					(number > 0 && ((number - 1) >> (current_length - 1)) > 1) {
				return Err(HeaderReadError::HeaderBadFormat);
			}
			for _ in 0 .. number {
				codeword_lengths.push(current_length as u8);
			}
			current_entry += number;
			current_length += 1;
		}
	}

	let lookup_type = rdr.read_u4()?;
	let vq_lookup = match lookup_type {
		0 => None,
		1 | 2 => {
			if dimensions < 1 {
				return Err(HeaderReadError::HeaderBadFormat);
			}
			let minimum_value = float32_unpack(rdr.read_u32()?);
			let delta_value = float32_unpack(rdr.read_u32()?);
			let value_bits = rdr.read_u4()? + 1;
			let sequence_p = rdr.read_bit_flag()?;
			let lookup_values = if lookup_type == 1 {
				lookup1_values(entries, dimensions) as usize
			} else {
				entries as usize * dimensions as usize
			};
			if lookup_values.saturating_mul(value_bits as usize) > rdr.bits_left() {
				return Err(HeaderReadError::HeaderBadFormat);
			}
			let mut multiplicands = Vec::with_capacity(lookup_values);
			for _ in 0 .. lookup_values {
				multiplicands.push(rdr.read(value_bits)?);
			}
			Some(VqLookup {
				lookup_type,
				minimum_value,
				delta_value,
				sequence_p,
				multiplicands,
			})
		},
		_ => return Err(HeaderReadError::HeaderBadFormat),
	};

	let book = StaticCodebook {
		dimensions,
		entries,
		codeword_lengths,
		vq_lookup,
	};
	if book.used_entries() > 0 && make_words(&book.codeword_lengths).is_none() {
		return Err(HeaderReadError::HeaderBadFormat);
	}
	Ok(book)
}

/// Assigns canonical codewords to the used entries
///
/// The returned codewords are MSb first, in the lowest bits of the u32,
/// one for each used entry, in entry order.
/// Returns `None` if the lengths describe an over- or underpopulated tree.
/// A single used entry of length 1 is allowed as special case.
fn make_words(lengths :&[u8]) -> Option<Vec<u32>> {
	// marker[len] is the next free codeword of length len
	let mut marker = [0u32; 33];
	let mut words = Vec::with_capacity(lengths.len());
	for &length in lengths {
		if length == 0 {
			continue;
		}
		let length = length as usize;
		let mut entry = marker[length];
		if length < 32 && (entry >> length) != 0 {
			// Overpopulated
			return None;
		}
		words.push(entry);

		// Move the markers of this and the shorter lengths on
		// if they pointed at a node that is now taken.
		for j in (1 ..= length).rev() {
			if marker[j] & 1 != 0 {
				if j == 1 {
					marker[1] = marker[1].wrapping_add(1);
				} else {
					marker[j] = marker[j - 1] << 1;
				}
				break;
			}
			marker[j] = marker[j].wrapping_add(1);
		}

		// The longer markers dangled from the node we just took,
		// make them dangle from the new one.
		for j in length + 1 .. 33 {
			if (marker[j] >> 1) == entry {
				entry = marker[j];
				marker[j] = marker[j - 1] << 1;
			} else {
				break;
			}
		}
	}

	let single_entry = words.len() == 1 && marker[2] == 2;
	if !single_entry {
		for (i, m) in marker.iter().enumerate().skip(1) {
			if m & (0xffff_ffffu32 >> (32 - i)) != 0 {
				// Underpopulated
				return None;
			}
		}
	}
	Some(words)
}

#[test]
fn test_make_words() {
	// Official example from the vorbis spec (section 3.2.1)
	let words = make_words(&[2, 4, 4, 4, 4, 2, 3, 3]).unwrap();
	assert_eq!(words, &[0b00, 0b0100, 0b0101, 0b0110, 0b0111, 0b10, 0b110, 0b111]);

	// Unused entries don't get a codeword
	let words = make_words(&[2, 0, 4, 4, 0, 4, 4, 2, 3, 3]).unwrap();
	assert_eq!(words, &[0b00, 0b0100, 0b0101, 0b0110, 0b0111, 0b10, 0b110, 0b111]);

	// Underpopulated
	assert!(make_words(&[2, 4, 4, 4, 4, 2, 3]).is_none());
	assert!(make_words(&[1, 2]).is_none());
	assert!(make_words(&[2]).is_none());

	// Overpopulated
	assert!(make_words(&[2, 4, 4, 4, 4, 2, 3, 3, 3]).is_none());
	assert!(make_words(&[1, 1, 1]).is_none());

	// The single entry special case
	assert_eq!(make_words(&[1]).unwrap(), &[0]);
	assert_eq!(make_words(&[0, 0, 1, 0]).unwrap(), &[0]);

	// Long codewords
	let mut lengths :Vec<u8> = (1 .. 32).collect();
	lengths.push(31);
	let words = make_words(&lengths).unwrap();
	assert_eq!(words[0], 0);
	assert_eq!(words[30], 0x7fff_fffe);
	assert_eq!(words[31], 0x7fff_ffff);
}

/// A codebook prepared for decoding
#[derive(Debug, Clone)]
pub(crate) struct Codebook {
	pub dimensions :u16,
	pub entries :u32,
	pub map_type :u8,
	used_entries :usize,
	/// Bit reversed codewords (MSb first, left aligned), sorted
	codelist :Vec<u32>,
	/// Maps the sorted position to the entry number
	dec_index :Vec<u32>,
	dec_codelengths :Vec<u8>,
	dec_maxlength :u8,
	dec_firsttablen :u8,
	/// 0: no hit, `1 + pos`: direct hit at sorted position `pos`,
	/// high bit set: search hints in the lower bits
	dec_firsttable :Vec<u32>,
	/// VQ values, `dimensions` many per sorted position
	valuelist :Option<Vec<f32>>,
}

impl Codebook {
	/// Builds the decode tables for a static codebook
	pub fn from_static(book :&StaticCodebook) -> Result<Codebook, HeaderReadError> {
		let n = book.used_entries();
		let mut cb = Codebook {
			dimensions : book.dimensions,
			entries : book.entries,
			map_type : book.map_type(),
			used_entries : n,
			codelist : Vec::new(),
			dec_index : Vec::new(),
			dec_codelengths : Vec::new(),
			dec_maxlength : 0,
			dec_firsttablen : 0,
			dec_firsttable : Vec::new(),
			valuelist : None,
		};
		if n == 0 {
			return Ok(cb);
		}

		let words = make_words(&book.codeword_lengths)
			.ok_or(HeaderReadError::HeaderBadFormat)?;
		let used_lengths = book.codeword_lengths.iter()
			.cloned()
			.filter(|l| *l > 0)
			.collect::<Vec<u8>>();
		let codes = words.iter().zip(used_lengths.iter())
			.map(|(w, l)| w << (32 - *l as u32))
			.collect::<Vec<u32>>();

		// sort_index[i] is the sorted position of the i-th used entry
		let mut order = (0 .. n).collect::<Vec<usize>>();
		order.sort_by_key(|i| codes[*i]);
		let mut sort_index = vec![0; n];
		for (pos, i) in order.iter().enumerate() {
			sort_index[*i] = pos;
		}

		cb.codelist = vec![0; n];
		cb.dec_codelengths = vec![0; n];
		cb.dec_index = vec![0; n];
		let mut used = 0;
		for (entry, &len) in book.codeword_lengths.iter().enumerate() {
			if len == 0 {
				continue;
			}
			let pos = sort_index[used];
			cb.codelist[pos] = codes[used];
			cb.dec_codelengths[pos] = len;
			cb.dec_index[pos] = entry as u32;
			used += 1;
		}
		cb.dec_maxlength = used_lengths.iter().cloned().max().unwrap_or(0);
		cb.valuelist = unquantize(book, &sort_index);

		if n == 1 && cb.dec_maxlength == 1 {
			// Single entry codebook: one bit table that always
			// yields the entry, so the regular decode path works.
			cb.dec_firsttablen = 1;
			cb.dec_firsttable = vec![1, 1];
			return Ok(cb);
		}

		let tablen = (ilog(n as u64) as i32 - 4).max(4).min(8) as u8;
		cb.dec_firsttablen = tablen;
		let tabn = 1usize << tablen;
		cb.dec_firsttable = vec![0; tabn];
		for pos in 0 .. n {
			let len = cb.dec_codelengths[pos];
			if len <= tablen {
				let orig = bit_reverse(cb.codelist[pos]) as usize;
				for j in 0 .. 1usize << (tablen - len) {
					cb.dec_firsttable[orig | (j << len)] = pos as u32 + 1;
				}
			}
		}

		// Fill the slots without a direct hit with hi/lo
		// bounds for the binary search.
		let mask = 0xffff_fffeu32 << (31 - tablen as u32);
		let mut lo = 0;
		let mut hi = 0;
		for i in 0 .. tabn {
			let word = (i as u32) << (32 - tablen as u32);
			let slot = bit_reverse(word) as usize;
			if cb.dec_firsttable[slot] != 0 {
				continue;
			}
			while lo + 1 < n && cb.codelist[lo + 1] <= word {
				lo += 1;
			}
			while hi < n && word >= (cb.codelist[hi] & mask) {
				hi += 1;
			}
			// 15 bits per hint; on overflow the search just gets slower
			let loval = (lo as u32).min(0x7fff);
			let hival = ((n - hi) as u32).min(0x7fff);
			cb.dec_firsttable[slot] = 0x8000_0000 | (loval << 15) | hival;
		}
		Ok(cb)
	}

	/// Number of entries that have a codeword
	pub fn used_entries(&self) -> usize {
		self.used_entries
	}

	/// Decodes a codeword, returning its sorted position.
	///
	/// A codeword that doesn't match any entry is treated
	/// like the end of the packet, as both mean that decoding
	/// of the current vector has to stop.
	fn decode_packed(&self, rdr :&mut BitpackCursor) -> Result<usize, OutOfData> {
		if self.used_entries == 0 {
			return Err(OutOfData);
		}
		let n = self.used_entries;
		let (mut lo, mut hi) = match rdr.peek(self.dec_firsttablen) {
			Ok(bits) => {
				let entry = self.dec_firsttable[bits as usize];
				if entry & 0x8000_0000 == 0 {
					let pos = entry as usize - 1;
					rdr.advance(self.dec_codelengths[pos] as usize)?;
					return Ok(pos);
				}
				let lo = ((entry >> 15) & 0x7fff) as usize;
				let hi = n - (entry & 0x7fff) as usize;
				(lo, hi)
			},
			Err(_) => (0, n),
		};

		// Near the end of the packet fewer bits than the
		// longest codeword may be left.
		let mut read = self.dec_maxlength;
		let mut lok = rdr.peek(read);
		while lok.is_err() && read > 1 {
			read -= 1;
			lok = rdr.peek(read);
		}
		let lok = match lok {
			Ok(v) => v,
			Err(_) => {
				rdr.advance(rdr.bits_left() + 1).ok();
				return Err(OutOfData);
			},
		};

		let testword = bit_reverse(lok);
		while hi - lo > 1 {
			let p = (hi - lo) >> 1;
			if self.codelist[lo + p] > testword {
				hi -= p;
			} else {
				lo += p;
			}
		}
		if self.dec_codelengths[lo] <= read {
			rdr.advance(self.dec_codelengths[lo] as usize)?;
			return Ok(lo);
		}
		rdr.advance(read as usize)?;
		Err(OutOfData)
	}

	/// Decodes a codeword, returning the entry number
	pub fn decode_entry(&self, rdr :&mut BitpackCursor) -> Result<u32, OutOfData> {
		let pos = self.decode_packed(rdr)?;
		Ok(self.dec_index[pos])
	}

	/// Decodes a codeword, returning the VQ vector of the entry
	pub fn decode_vector(&self, rdr :&mut BitpackCursor) -> Result<&[f32], OutOfData> {
		let values = self.valuelist.as_ref().ok_or(OutOfData)?;
		let pos = self.decode_packed(rdr)?;
		let dim = self.dimensions as usize;
		Ok(&values[pos * dim .. (pos + 1) * dim])
	}

	/// Decodes `n / dimensions` vectors and adds them into `a`,
	/// interleaved with a stride of `n / dimensions`.
	pub fn decodevs_add(&self, a :&mut [f32], rdr :&mut BitpackCursor, n :usize)
			-> Result<(), OutOfData> {
		if self.used_entries == 0 {
			return Ok(());
		}
		let dim = self.dimensions as usize;
		let step = n / dim;
		let mut vectors = Vec::with_capacity(step);
		for _ in 0 .. step {
			vectors.push(self.decode_vector(rdr)?);
		}
		for i in 0 .. dim {
			let o = i * step;
			for (j, v) in vectors.iter().enumerate() {
				if o + j >= n {
					break;
				}
				a[o + j] += v[i];
			}
		}
		Ok(())
	}

	/// Decodes vectors and adds them contiguously into the first `n` values of `a`
	pub fn decodev_add(&self, a :&mut [f32], rdr :&mut BitpackCursor, n :usize)
			-> Result<(), OutOfData> {
		if self.used_entries == 0 {
			return Ok(());
		}
		let mut i = 0;
		while i < n {
			let v = self.decode_vector(rdr)?;
			for val in v.iter() {
				if i >= n {
					break;
				}
				a[i] += *val;
				i += 1;
			}
		}
		Ok(())
	}

	/// Decodes vectors and stores them contiguously into the first `n` values of `a`
	pub fn decodev_set(&self, a :&mut [f32], rdr :&mut BitpackCursor, n :usize)
			-> Result<(), OutOfData> {
		if self.used_entries == 0 {
			for v in a[.. n].iter_mut() {
				*v = 0.;
			}
			return Ok(());
		}
		let mut i = 0;
		while i < n {
			let v = self.decode_vector(rdr)?;
			for val in v.iter() {
				if i >= n {
					break;
				}
				a[i] = *val;
				i += 1;
			}
		}
		Ok(())
	}

	/// Decodes vectors and adds them into a set of channels
	/// as if they were interleaved into a single vector.
	///
	/// `offset` and `n` are positions in the interleaved vector.
	pub fn decodevv_add(&self, a :&mut [&mut [f32]], offset :usize,
			rdr :&mut BitpackCursor, n :usize) -> Result<(), OutOfData> {
		if self.used_entries == 0 {
			return Ok(());
		}
		let ch = a.len();
		let m = (offset + n) / ch;
		let mut i = offset / ch;
		let mut chptr = 0;
		while i < m {
			let v = self.decode_vector(rdr)?;
			for val in v.iter() {
				if i >= m {
					break;
				}
				a[chptr][i] += *val;
				chptr += 1;
				if chptr == ch {
					chptr = 0;
					i += 1;
				}
			}
		}
		Ok(())
	}
}

/// Computes the VQ value vectors of the used entries
///
/// `sort_index` gives the sorted position of each used entry,
/// which is where its vector is stored.
fn unquantize(book :&StaticCodebook, sort_index :&[usize]) -> Option<Vec<f32>> {
	let lup = book.vq_lookup.as_ref()?;
	let dim = book.dimensions as usize;
	let mut values = vec![0.; sort_index.len() * dim];
	let quantvals = lup.multiplicands.len();
	let mut count = 0;
	for (j, &len) in book.codeword_lengths.iter().enumerate() {
		if len == 0 {
			continue;
		}
		let base = sort_index[count] * dim;
		let mut last = 0.;
		let mut index_divisor = 1usize;
		for k in 0 .. dim {
			let multiplicand = if lup.lookup_type == 1 {
				let v = lup.multiplicands[(j / index_divisor) % quantvals];
				index_divisor = index_divisor.saturating_mul(quantvals);
				v
			} else {
				lup.multiplicands[j * dim + k]
			};
			let val = multiplicand as f32 * lup.delta_value + lup.minimum_value + last;
			if lup.sequence_p {
				last = val;
			}
			values[base + k] = val;
		}
		count += 1;
	}
	Some(values)
}

#[cfg(test)]
fn codebook_from_lengths(lengths :&[u8]) -> Codebook {
	let book = StaticCodebook {
		dimensions : 1,
		entries : lengths.len() as u32,
		codeword_lengths : lengths.to_vec(),
		vq_lookup : None,
	};
	Codebook::from_static(&book).unwrap()
}

#[cfg(test)]
fn roundtrip(lengths :&[u8], sequence :&[usize]) {
	use crate::bitpacking::BitpackWriter;
	let cb = codebook_from_lengths(lengths);
	let words = make_words(lengths).unwrap();
	// words are in order of the used entries
	let mut word_of_entry = vec![None; lengths.len()];
	let mut used = 0;
	for (e, &l) in lengths.iter().enumerate() {
		if l > 0 {
			word_of_entry[e] = Some(words[used]);
			used += 1;
		}
	}
	let mut w = BitpackWriter::new();
	for &e in sequence {
		w.write_codeword(word_of_entry[e].unwrap(), lengths[e]);
	}
	let data = w.into_inner();
	let mut rdr = BitpackCursor::new(&data);
	for &e in sequence {
		assert_eq!(cb.decode_entry(&mut rdr), Ok(e as u32));
	}
}

#[test]
fn test_codebook_roundtrip() {
	let lengths = &[2, 4, 4, 4, 4, 2, 3, 3];
	roundtrip(lengths, &[0, 1, 2, 3, 4, 5, 6, 7, 7, 6, 5, 0, 0, 4]);

	// Sparse book
	let lengths = &[0, 2, 0, 4, 4, 4, 4, 2, 3, 0, 3];
	roundtrip(lengths, &[1, 3, 10, 8, 7, 6, 5, 4, 1]);

	// Codewords longer than the direct lookup table
	let lengths = &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 12];
	roundtrip(lengths, &[12, 0, 11, 1, 10, 2, 9, 3, 8, 4, 7, 5, 6]);

	// Flat book wide enough to need search hints
	let lengths = vec![9u8; 512];
	let seq = (0 .. 512).rev().step_by(7).collect::<Vec<usize>>();
	roundtrip(&lengths, &seq);

	// Mixed, in unsorted declaration order
	let mut lengths = vec![10u8; 256];
	lengths.extend_from_slice(&[3, 2, 3, 2, 0, 0]);
	let seq = vec![256, 0, 257, 255, 258, 128, 259, 3];
	roundtrip(&lengths, &seq);
}

#[test]
fn test_codebook_single_entry() {
	let cb = codebook_from_lengths(&[0, 0, 1, 0]);
	let data = [0b10];
	let mut rdr = BitpackCursor::new(&data);
	assert_eq!(cb.decode_entry(&mut rdr), Ok(2));
	assert_eq!(cb.decode_entry(&mut rdr), Ok(2));
	assert_eq!(rdr.bits_read(), 2);
}

#[test]
fn test_codebook_end_of_packet() {
	let cb = codebook_from_lengths(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 12]);
	// Entry 12 needs 12 bits, only 8 are there
	let data = [0xff];
	let mut rdr = BitpackCursor::new(&data);
	assert_eq!(cb.decode_entry(&mut rdr), Err(OutOfData));
	assert_eq!(rdr.bits_left(), 0);

	// Short codewords still decode near the end
	let data = [0b0110];
	let mut rdr = BitpackCursor::new(&data);
	assert_eq!(cb.decode_entry(&mut rdr), Ok(0));
	assert_eq!(cb.decode_entry(&mut rdr), Ok(2));
	for _ in 0 .. 4 {
		assert_eq!(cb.decode_entry(&mut rdr), Ok(0));
	}
	assert_eq!(cb.decode_entry(&mut rdr), Err(OutOfData));
}

#[cfg(test)]
fn write_length_list(w :&mut crate::bitpacking::BitpackWriter, lengths :&[u8]) {
	w.write(CODEBOOK_SYNC_PATTERN, 24);
	w.write(1, 16);
	w.write(lengths.len() as u32, 24);
	// unordered, sparse
	w.write_flag(false);
	w.write_flag(true);
	for &l in lengths {
		if l == 0 {
			w.write_flag(false);
		} else {
			w.write_flag(true);
			w.write(l as u32 - 1, 5);
		}
	}
}

#[test]
fn test_unpack_static_rejects_incomplete() {
	use crate::bitpacking::BitpackWriter;
	// Underpopulated: 0, 10, but no 11
	let mut w = BitpackWriter::new();
	write_length_list(&mut w, &[1, 0, 2]);
	w.write(0, 4);
	let data = w.into_inner();
	let mut rdr = BitpackCursor::new(&data);
	assert_eq!(unpack_static(&mut rdr), Err(HeaderReadError::HeaderBadFormat));

	// Overpopulated
	let mut w = BitpackWriter::new();
	write_length_list(&mut w, &[1, 1, 1]);
	w.write(0, 4);
	let data = w.into_inner();
	let mut rdr = BitpackCursor::new(&data);
	assert_eq!(unpack_static(&mut rdr), Err(HeaderReadError::HeaderBadFormat));

	// A lone codeword of length 2 doesn't get the single entry exemption
	let mut w = BitpackWriter::new();
	write_length_list(&mut w, &[0, 2]);
	w.write(0, 4);
	let data = w.into_inner();
	let mut rdr = BitpackCursor::new(&data);
	assert_eq!(unpack_static(&mut rdr), Err(HeaderReadError::HeaderBadFormat));

	// But a lone codeword of length 1 does
	let mut w = BitpackWriter::new();
	write_length_list(&mut w, &[0, 1]);
	w.write(0, 4);
	let data = w.into_inner();
	let mut rdr = BitpackCursor::new(&data);
	let book = unpack_static(&mut rdr).unwrap();
	assert_eq!(book.codeword_lengths, &[0, 1]);

	// Bad sync pattern
	let data = [0x42, 0x43, 0x57, 0, 0, 0, 0, 0, 0, 0];
	let mut rdr = BitpackCursor::new(&data);
	assert_eq!(unpack_static(&mut rdr), Err(HeaderReadError::HeaderBadFormat));
}

#[test]
fn test_unpack_static_ordered_vq() {
	use crate::bitpacking::BitpackWriter;
	let mut w = BitpackWriter::new();
	w.write(CODEBOOK_SYNC_PATTERN, 24);
	// 4 entries of 2 dimensions
	w.write(2, 16);
	w.write(4, 24);
	// ordered: starting at length 2, 4 entries of that length
	w.write_flag(true);
	w.write(1, 5);
	w.write(4, ilog(4));
	// lookup type 1: -1 + 2 * {0, 1}
	w.write(1, 4);
	w.write(0xE280_0001, 32);
	w.write(0x62A0_0001, 32);
	w.write(0, 4);
	w.write_flag(false);
	w.write(0, 1);
	w.write(1, 1);
	let data = w.into_inner();
	let mut rdr = BitpackCursor::new(&data);
	let book = unpack_static(&mut rdr).unwrap();
	assert_eq!(book.codeword_lengths, &[2, 2, 2, 2]);
	assert_eq!(book.map_type(), 1);
	assert_eq!(book.vq_lookup.as_ref().unwrap().minimum_value, -1.);
	assert_eq!(book.vq_lookup.as_ref().unwrap().delta_value, 2.);

	let cb = Codebook::from_static(&book).unwrap();
	// Codewords are 00, 01, 10, 11, written MSb first
	let mut w = BitpackWriter::new();
	w.write_codeword(0b11, 2).write_codeword(0b01, 2).write_codeword(0b10, 2);
	let data = w.into_inner();
	let mut rdr = BitpackCursor::new(&data);
	assert_eq!(cb.decode_vector(&mut rdr).unwrap(), &[1., 1.]);
	assert_eq!(cb.decode_vector(&mut rdr).unwrap(), &[1., -1.]);
	assert_eq!(cb.decode_vector(&mut rdr).unwrap(), &[-1., 1.]);
}

#[test]
fn test_unquantize_sequence_p() {
	let book = StaticCodebook {
		dimensions : 3,
		entries : 2,
		codeword_lengths : vec![1, 1],
		vq_lookup : Some(VqLookup {
			lookup_type : 2,
			minimum_value : 0.5,
			delta_value : 1.,
			sequence_p : true,
			multiplicands : vec![0, 1, 2, 3, 0, 1],
		}),
	};
	let values = unquantize(&book, &[0, 1]).unwrap();
	assert_eq!(values, &[0.5, 2., 4.5, 3.5, 4., 5.5]);
}

#[test]
fn test_vector_decode_layouts() {
	use crate::bitpacking::BitpackWriter;
	// Two entries, dim 2: entry 0 = (1, 2), entry 1 = (3, 4)
	let book = StaticCodebook {
		dimensions : 2,
		entries : 2,
		codeword_lengths : vec![1, 1],
		vq_lookup : Some(VqLookup {
			lookup_type : 2,
			minimum_value : 0.,
			delta_value : 1.,
			sequence_p : false,
			multiplicands : vec![1, 2, 3, 4],
		}),
	};
	let cb = Codebook::from_static(&book).unwrap();
	let mut w = BitpackWriter::new();
	w.write_codeword(0, 1).write_codeword(1, 1);
	let data = w.into_inner();

	let mut a = [0.; 4];
	cb.decodev_add(&mut a, &mut BitpackCursor::new(&data), 4).unwrap();
	assert_eq!(a, [1., 2., 3., 4.]);

	let mut a = [10.; 4];
	cb.decodevs_add(&mut a, &mut BitpackCursor::new(&data), 4).unwrap();
	assert_eq!(a, [11., 13., 12., 14.]);

	let mut a = [10.; 4];
	cb.decodev_set(&mut a, &mut BitpackCursor::new(&data), 3).unwrap();
	assert_eq!(a, [1., 2., 3., 10.]);

	let mut ch0 = [0.; 2];
	let mut ch1 = [0.; 2];
	{
		let mut chans :[&mut [f32]; 2] = [&mut ch0, &mut ch1];
		cb.decodevv_add(&mut chans, 0, &mut BitpackCursor::new(&data), 4).unwrap();
	}
	assert_eq!(ch0, [1., 3.]);
	assert_eq!(ch1, [2., 4.]);

	// Truncation leaves what was decoded so far
	let mut a = [0.; 6];
	let res = cb.decodev_add(&mut a, &mut BitpackCursor::new(&data[.. 0]), 6);
	assert_eq!(res, Err(OutOfData));
	assert_eq!(a, [0.; 6]);
}
