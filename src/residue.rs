// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Residue decoding

The residue is the spectral fine structure that gets multiplied with
the floor. It is split into partitions of `grouping` values. A "phrase"
codebook codes, for several partitions at once, which class each
partition belongs to, and the class decides which books (if any) the
partition is decoded with in each of up to eight passes.

The three residue types only differ in how the decoded vectors are
laid out into the channels.
*/

use tinyvec::TinyVec;

use crate::bitpacking::BitpackCursor;
use crate::codebook::Codebook;
use crate::header::HeaderReadError;
use crate::ilog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResidueType {
	/// Vectors interleaved within a partition
	Zero,
	/// Vectors laid out contiguously
	One,
	/// All channels interleaved into one vector
	Two,
}

#[derive(Debug, Clone)]
pub(crate) struct ResidueConfig {
	pub residue_type :ResidueType,
	pub begin :u32,
	pub end :u32,
	pub grouping :u32,
	pub partitions :u8,
	pub groupbook :u8,
	/// Bit `s` set means the partition class is coded in pass `s`
	pub cascade :Vec<u8>,
	pub booklist :Vec<u8>,
}

impl ResidueConfig {
	pub fn unpack(rdr :&mut BitpackCursor, residue_type :u16, codebooks :&[Codebook])
			-> Result<Self, HeaderReadError> {
		let residue_type = match residue_type {
			0 => ResidueType::Zero,
			1 => ResidueType::One,
			2 => ResidueType::Two,
			_ => return Err(HeaderReadError::HeaderBadFormat),
		};
		let begin = rdr.read_u24()?;
		let end = rdr.read_u24()?;
		let grouping = rdr.read_u24()? + 1;
		let partitions = rdr.read_u6()? + 1;
		let groupbook = rdr.read_u8()?;

		let mut cascade = Vec::with_capacity(partitions as usize);
		let mut book_count = 0;
		for _ in 0 .. partitions {
			let mut c = rdr.read_u3()?;
			if rdr.read_bit_flag()? {
				c |= rdr.read_u5()? << 3;
			}
			book_count += c.count_ones();
			cascade.push(c);
		}
		let mut booklist = Vec::with_capacity(book_count as usize);
		for _ in 0 .. book_count {
			booklist.push(rdr.read_u8()?);
		}

		let phrasebook = codebooks.get(groupbook as usize)
			.ok_or(HeaderReadError::HeaderBadFormat)?;
		for book in booklist.iter() {
			match codebooks.get(*book as usize) {
				Some(cb) if cb.map_type != 0 => (),
				_ => return Err(HeaderReadError::HeaderBadFormat),
			}
		}
		// The phrase book must be able to code every class combination
		if phrasebook.dimensions < 1 {
			return Err(HeaderReadError::HeaderBadFormat);
		}
		let mut partvals = 1u64;
		for _ in 0 .. phrasebook.dimensions {
			partvals *= partitions as u64;
			if partvals > phrasebook.entries as u64 {
				return Err(HeaderReadError::HeaderBadFormat);
			}
		}

		Ok(ResidueConfig {
			residue_type,
			begin,
			end,
			grouping,
			partitions,
			groupbook,
			cascade,
			booklist,
		})
	}
}

#[derive(Debug, Clone)]
pub(crate) struct ResidueLookup {
	config :ResidueConfig,
	/// Book per partition class and pass
	partbooks :Vec<[Option<u8>; 8]>,
	/// Number of passes
	stages :usize,
	/// Number of phrase book entries that map to class combinations
	partvals :usize,
	/// Classes for each phrase book entry
	decodemap :Vec<Vec<u8>>,
}

impl ResidueLookup {
	pub fn new(config :&ResidueConfig, codebooks :&[Codebook]) -> Self {
		let parts = config.partitions as usize;
		let dim = codebooks.get(config.groupbook as usize)
			.map(|b| b.dimensions as usize)
			.unwrap_or(1);

		let mut books = config.booklist.iter();
		let mut stages = 0;
		let partbooks = config.cascade.iter().map(|&c| {
			let mut pb = [None; 8];
			let st = ilog(c as u64) as usize;
			stages = stages.max(st);
			for (k, b) in pb[.. st].iter_mut().enumerate() {
				if c & (1 << k) != 0 {
					*b = books.next().cloned();
				}
			}
			pb
		}).collect();

		let partvals = parts.pow(dim as u32);
		let decodemap = (0 .. partvals).map(|j| {
			let mut val = j;
			let mut mult = partvals / parts;
			(0 .. dim).map(|_| {
				let deco = val / mult;
				val -= deco * mult;
				mult /= parts;
				deco as u8
			}).collect()
		}).collect();

		ResidueLookup {
			config : config.clone(),
			partbooks,
			stages,
			partvals,
			decodemap,
		}
	}

	/// Decodes the residue of the channels `channels`, adding into them.
	///
	/// Each channel slice holds the first half of the block. Channels
	/// whose `nonzero` flag is cleared are not coded. Running out of
	/// data ends decoding early, keeping what was decoded so far.
	pub fn inverse(&self, codebooks :&[Codebook], rdr :&mut BitpackCursor,
			channels :&mut [&mut [f32]], nonzero :&[bool], blocksize :usize) {
		match self.config.residue_type {
			ResidueType::Zero | ResidueType::One => {
				let mut used = channels.iter_mut()
					.zip(nonzero.iter())
					.filter(|(_, nz)| **nz)
					.map(|(c, _)| &mut **c)
					.collect::<Vec<&mut [f32]>>();
				if !used.is_empty() {
					self.inverse_01(codebooks, rdr, &mut used, blocksize / 2);
				}
			},
			ResidueType::Two => {
				if nonzero.iter().any(|nz| *nz) {
					let max = blocksize * channels.len() / 2;
					self.inverse_2(codebooks, rdr, channels, max);
				}
			},
		}
	}

	/// Number of partitions to decode, limited by `max` values
	fn partition_count(&self, max :usize) -> usize {
		let end = (self.config.end as usize).min(max);
		end.saturating_sub(self.config.begin as usize) / self.config.grouping as usize
	}

	/// Classes of the next group of partitions
	fn read_phrase(&self, codebooks :&[Codebook], rdr :&mut BitpackCursor) -> Option<&[u8]> {
		let phrasebook = &codebooks[self.config.groupbook as usize];
		let temp = phrasebook.decode_entry(rdr).ok()? as usize;
		if temp >= self.partvals {
			return None;
		}
		Some(&self.decodemap[temp])
	}

	fn inverse_01(&self, codebooks :&[Codebook], rdr :&mut BitpackCursor,
			channels :&mut [&mut [f32]], max :usize) {
		let partvals = self.partition_count(max);
		if partvals == 0 {
			return;
		}
		let grouping = self.config.grouping as usize;
		let begin = self.config.begin as usize;
		let per_word = self.decodemap.first().map(|d| d.len()).unwrap_or(1);
		let words = (partvals + per_word - 1) / per_word;
		let mut partword :Vec<Vec<&[u8]>> = vec![Vec::with_capacity(words); channels.len()];

		for s in 0 .. self.stages {
			let mut i = 0;
			let mut l = 0;
			while i < partvals {
				if s == 0 {
					for pw in partword.iter_mut() {
						match self.read_phrase(codebooks, rdr) {
							Some(classes) => pw.push(classes),
							None => return,
						}
					}
				}
				let mut k = 0;
				while k < per_word && i < partvals {
					let offset = begin + i * grouping;
					for (ch, pw) in channels.iter_mut().zip(partword.iter()) {
						let class = pw[l][k] as usize;
						if self.config.cascade[class] & (1 << s) == 0 {
							continue;
						}
						if let Some(book) = self.partbooks[class][s] {
							let book = &codebooks[book as usize];
							let res = match self.config.residue_type {
								ResidueType::Zero => book.decodevs_add(&mut ch[offset ..], rdr, grouping),
								_ => book.decodev_add(&mut ch[offset ..], rdr, grouping),
							};
							if res.is_err() {
								return;
							}
						}
					}
					k += 1;
					i += 1;
				}
				l += 1;
			}
		}
	}

	fn inverse_2(&self, codebooks :&[Codebook], rdr :&mut BitpackCursor,
			channels :&mut [&mut [f32]], max :usize) {
		let partvals = self.partition_count(max);
		if partvals == 0 {
			return;
		}
		let grouping = self.config.grouping as usize;
		let begin = self.config.begin as usize;
		let per_word = self.decodemap.first().map(|d| d.len()).unwrap_or(1);
		let mut partword :Vec<&[u8]> = Vec::with_capacity((partvals + per_word - 1) / per_word);

		for s in 0 .. self.stages {
			let mut i = 0;
			let mut l = 0;
			while i < partvals {
				if s == 0 {
					match self.read_phrase(codebooks, rdr) {
						Some(classes) => partword.push(classes),
						None => return,
					}
				}
				let mut k = 0;
				while k < per_word && i < partvals {
					let class = partword[l][k] as usize;
					if self.config.cascade[class] & (1 << s) != 0 {
						if let Some(book) = self.partbooks[class][s] {
							let offset = begin + i * grouping;
							let res = codebooks[book as usize]
								.decodevv_add(channels, offset, rdr, grouping);
							if res.is_err() {
								return;
							}
						}
					}
					k += 1;
					i += 1;
				}
				l += 1;
			}
		}
	}
}

/// Nonzero flags of a channel bundle
pub(crate) type NonzeroFlags = TinyVec<[bool; 32]>;

#[cfg(test)]
fn test_books() -> Vec<Codebook> {
	use crate::codebook::{StaticCodebook, VqLookup};
	let phrase = Codebook::from_static(&StaticCodebook {
		dimensions : 1,
		entries : 2,
		codeword_lengths : vec![1, 1],
		vq_lookup : None,
	}).unwrap();
	// entry 0 = (1, 2), entry 1 = (3, 4)
	let values = Codebook::from_static(&StaticCodebook {
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
	}).unwrap();
	vec![phrase, values]
}

#[cfg(test)]
fn test_lookup(residue_type :ResidueType, end :u32) -> ResidueLookup {
	// Class 0 is silent, class 1 is coded with book 1 in the first pass
	let cfg = ResidueConfig {
		residue_type,
		begin : 0,
		end,
		grouping : 4,
		partitions : 2,
		groupbook : 0,
		cascade : vec![0, 1],
		booklist : vec![1],
	};
	ResidueLookup::new(&cfg, &test_books())
}

#[cfg(test)]
fn phrase_stream() -> Vec<u8> {
	use crate::bitpacking::BitpackWriter;
	let mut w = BitpackWriter::new();
	// class 1 with both vectors, then class 0
	w.write_codeword(1, 1).write_codeword(0, 1).write_codeword(1, 1);
	w.write_codeword(0, 1);
	w.into_inner()
}

#[test]
fn test_residue_lookup() {
	let look = test_lookup(ResidueType::One, 8);
	assert_eq!(look.stages, 1);
	assert_eq!(look.partvals, 2);
	assert_eq!(look.partbooks[0], [None; 8]);
	assert_eq!(look.partbooks[1][0], Some(1));
	assert_eq!(look.decodemap, vec![vec![0], vec![1]]);

	// Three classes per phrase: entry 5 is 1 * 4 + 0 * 2 + 1
	let cfg = ResidueConfig {
		residue_type : ResidueType::One,
		begin : 0,
		end : 8,
		grouping : 4,
		partitions : 2,
		groupbook : 0,
		cascade : vec![0b101, 0b10],
		booklist : vec![1, 1, 1],
	};
	let mut books = test_books();
	books[0].dimensions = 3;
	let look = ResidueLookup::new(&cfg, &books);
	assert_eq!(look.partvals, 8);
	assert_eq!(look.decodemap[5], &[1, 0, 1]);
	assert_eq!(look.stages, 3);
	assert_eq!(look.partbooks[0][.. 3], [Some(1), None, Some(1)]);
	assert_eq!(look.partbooks[1][.. 3], [None, Some(1), None]);
}

#[test]
fn test_residue_layouts() {
	let books = test_books();
	let data = phrase_stream();

	let mut ch = [0.; 8];
	test_lookup(ResidueType::One, 8).inverse(&books, &mut BitpackCursor::new(&data),
		&mut [&mut ch[..]], &[true], 16);
	assert_eq!(ch, [1., 2., 3., 4., 0., 0., 0., 0.]);

	let mut ch = [0.; 8];
	test_lookup(ResidueType::Zero, 8).inverse(&books, &mut BitpackCursor::new(&data),
		&mut [&mut ch[..]], &[true], 16);
	assert_eq!(ch, [1., 3., 2., 4., 0., 0., 0., 0.]);

	let mut ch0 = [0.; 8];
	let mut ch1 = [0.; 8];
	test_lookup(ResidueType::Two, 8).inverse(&books, &mut BitpackCursor::new(&data),
		&mut [&mut ch0[..], &mut ch1[..]], &[false, true], 16);
	assert_eq!(ch0, [1., 3., 0., 0., 0., 0., 0., 0.]);
	assert_eq!(ch1, [2., 4., 0., 0., 0., 0., 0., 0.]);
}

#[test]
fn test_residue_skips_zero_channels() {
	let books = test_books();
	let data = phrase_stream();

	// Only the second channel is coded
	let mut ch0 = [0.; 8];
	let mut ch1 = [0.; 8];
	let mut rdr = BitpackCursor::new(&data);
	test_lookup(ResidueType::One, 8).inverse(&books, &mut rdr,
		&mut [&mut ch0[..], &mut ch1[..]], &[false, true], 16);
	assert_eq!(ch0, [0.; 8]);
	assert_eq!(ch1, [1., 2., 3., 4., 0., 0., 0., 0.]);

	for &t in [ResidueType::One, ResidueType::Two].iter() {
		let mut ch0 = [0.; 8];
		let mut rdr = BitpackCursor::new(&data);
		test_lookup(t, 8).inverse(&books, &mut rdr, &mut [&mut ch0[..]], &[false], 16);
		assert_eq!(rdr.bits_read(), 0);
	}

	// begin past end
	let mut ch0 = [0.; 8];
	let mut rdr = BitpackCursor::new(&data);
	test_lookup(ResidueType::One, 0).inverse(&books, &mut rdr, &mut [&mut ch0[..]], &[true], 16);
	assert_eq!(rdr.bits_read(), 0);
}

#[test]
fn test_residue_truncated() {
	use crate::bitpacking::BitpackWriter;
	let books = test_books();
	// Exactly one byte: the third partition runs out after one vector
	let mut w = BitpackWriter::new();
	w.write(0b101, 3).write(0b111, 3).write(0b01, 2);
	let data = w.into_inner();
	assert_eq!(data.len(), 1);

	let mut ch = [0.; 16];
	test_lookup(ResidueType::One, 16).inverse(&books, &mut BitpackCursor::new(&data),
		&mut [&mut ch[..]], &[true], 32);
	assert_eq!(ch, [1., 2., 3., 4., 3., 4., 3., 4., 1., 2., 0., 0., 0., 0., 0., 0.]);
}

#[test]
fn test_residue_unpack() {
	use crate::bitpacking::BitpackWriter;
	let books = test_books();
	let write = |groupbook :u32, book :u32| {
		let mut w = BitpackWriter::new();
		w.write(0, 24).write(128, 24).write(31, 24).write(1, 6).write(groupbook, 8);
		// class 0: no passes; class 1: pass 0 and pass 4
		w.write(0, 3).write_flag(false);
		w.write(1, 3).write_flag(true).write(0b10, 5);
		w.write(book, 8).write(book, 8);
		w.into_inner()
	};

	let data = write(0, 1);
	let cfg = ResidueConfig::unpack(&mut BitpackCursor::new(&data), 2, &books).unwrap();
	assert_eq!(cfg.residue_type, ResidueType::Two);
	assert_eq!(cfg.end, 128);
	assert_eq!(cfg.grouping, 32);
	assert_eq!(cfg.partitions, 2);
	assert_eq!(cfg.cascade, &[0, 0b10001]);
	assert_eq!(cfg.booklist, &[1, 1]);

	let look = ResidueLookup::new(&cfg, &books);
	assert_eq!(look.stages, 5);
	assert_eq!(look.partbooks[1][.. 5], [Some(1), None, None, None, Some(1)]);

	// groupbook out of range, book without VQ values
	for &(gb, b) in [(2, 1), (0, 0)].iter() {
		let data = write(gb, b);
		let res = ResidueConfig::unpack(&mut BitpackCursor::new(&data), 1, &books);
		assert_eq!(res.err(), Some(HeaderReadError::HeaderBadFormat));
	}

	// The phrase book has only one entry for two classes
	let mut few = books.clone();
	few[0].entries = 1;
	let data = write(0, 1);
	let res = ResidueConfig::unpack(&mut BitpackCursor::new(&data), 0, &few);
	assert_eq!(res.err(), Some(HeaderReadError::HeaderBadFormat));

	let res = ResidueConfig::unpack(&mut BitpackCursor::new(&data), 3, &books);
	assert_eq!(res.err(), Some(HeaderReadError::HeaderBadFormat));
}
