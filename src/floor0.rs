// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Floor type 0

The envelope is coded as a set of line spectral pair coefficients
and evaluated on a Bark scale. Hardly any encoder emits this floor,
but decoders still need to support it.
*/

use std::cell::OnceCell;

use crate::bitpacking::BitpackCursor;
use crate::codebook::Codebook;
use crate::header::HeaderReadError;
use crate::ilog;

#[derive(Debug, Clone)]
pub(crate) struct Floor0Config {
	pub order :u8,
	pub rate :u16,
	pub bark_map_size :u16,
	pub amplitude_bits :u8,
	pub amplitude_offset :u8,
	pub books :Vec<u8>,
}

impl Floor0Config {
	pub fn unpack(rdr :&mut BitpackCursor, codebooks :&[Codebook])
			-> Result<Self, HeaderReadError> {
		let order = rdr.read_u8()?;
		let rate = rdr.read_u16()?;
		let bark_map_size = rdr.read_u16()?;
		let amplitude_bits = rdr.read_u6()?;
		let amplitude_offset = rdr.read_u8()?;
		let book_count = rdr.read_u4()? + 1;
		if order < 1 || rate < 1 || bark_map_size < 1 {
			return Err(HeaderReadError::HeaderBadFormat);
		}
		let mut books = Vec::with_capacity(book_count as usize);
		for _ in 0 .. book_count {
			let book = rdr.read_u8()?;
			let cb = codebooks.get(book as usize)
				.ok_or(HeaderReadError::HeaderBadFormat)?;
			if cb.map_type == 0 || cb.dimensions < 1 {
				return Err(HeaderReadError::HeaderBadFormat);
			}
			books.push(book);
		}
		Ok(Floor0Config {
			order,
			rate,
			bark_map_size,
			amplitude_bits,
			amplitude_offset,
			books,
		})
	}
}

#[derive(Debug, Clone)]
pub(crate) struct Floor0Lookup {
	config :Floor0Config,
	blocksizes :(usize, usize),
	/// Bark map per block size, built on first use
	maps :[OnceCell<Vec<i32>>; 2],
}

fn to_bark(f :f32) -> f32 {
	13.1 * (0.00074 * f).atan() + 2.24 * (f * f * 1.85e-8).atan() + 1e-4 * f
}

impl Floor0Lookup {
	pub fn new(config :&Floor0Config, blocksizes :(usize, usize)) -> Self {
		Floor0Lookup {
			config : config.clone(),
			blocksizes,
			maps : [OnceCell::new(), OnceCell::new()],
		}
	}

	/// Maps each of the `n` spectral bins to a Bark map position
	fn bark_map(&self, long :bool) -> &[i32] {
		let bs = if long { self.blocksizes.1 } else { self.blocksizes.0 };
		self.maps[long as usize].get_or_init(|| {
			let n = bs / 2;
			let ln = self.config.bark_map_size as i32;
			let nyquist = self.config.rate as f32 / 2.;
			let scale = ln as f32 / to_bark(nyquist);
			(0 .. n).map(|j| {
				let val = (to_bark(nyquist / n as f32 * j as f32) * scale).floor() as i32;
				val.min(ln - 1)
			}).collect()
		})
	}

	/// Reads the LSP coefficients of a block.
	///
	/// The returned vector holds the `order` coefficients followed
	/// by the amplitude. `None` means silence, or an early end of
	/// the packet.
	pub fn decode(&self, codebooks :&[Codebook], rdr :&mut BitpackCursor) -> Option<Vec<f32>> {
		let cfg = &self.config;
		if cfg.amplitude_bits > 32 {
			return None;
		}
		let amp_raw = rdr.read(cfg.amplitude_bits).ok()?;
		if amp_raw == 0 {
			return None;
		}
		let max_val = ((1u64 << cfg.amplitude_bits) - 1) as f32;
		let amp = amp_raw as f32 / max_val * cfg.amplitude_offset as f32;
		let book_num = rdr.read(ilog(cfg.books.len() as u64)).ok()? as usize;
		let book = &codebooks[*cfg.books.get(book_num)? as usize];

		let m = cfg.order as usize;
		let mut lsp = vec![0.; m + 1];
		book.decodev_set(&mut lsp, rdr, m).ok()?;
		// Each vector is relative to the last value of its predecessor
		let dim = book.dimensions as usize;
		let mut last = 0.;
		for chunk in lsp[.. m].chunks_mut(dim) {
			for v in chunk.iter_mut() {
				*v += last;
			}
			last = chunk[chunk.len() - 1];
		}
		lsp[m] = amp;
		Some(lsp)
	}

	/// Multiplies the floor curve into `out`,
	/// or zeroes it if there is no curve for this block.
	pub fn apply(&self, memo :Option<&[f32]>, out :&mut [f32], long :bool) {
		match memo {
			Some(lsp) => {
				let map = self.bark_map(long);
				lsp_to_curve(out, map, self.config.bark_map_size as usize,
					lsp, self.config.amplitude_offset as f32);
			},
			None => {
				for v in out.iter_mut() {
					*v = 0.;
				}
			},
		}
	}
}

/// Evaluates the LSP filter at every bin and multiplies it into `curve`.
///
/// `lsp` holds the coefficients followed by the amplitude.
fn lsp_to_curve(curve :&mut [f32], map :&[i32], ln :usize,
		lsp :&[f32], amp_offset :f32) {
	let m = lsp.len() - 1;
	let amp = lsp[m];
	let wdel = ::std::f32::consts::PI / ln as f32;
	let coeffs = lsp[.. m].iter().map(|l| 2. * l.cos()).collect::<Vec<f32>>();
	let n = curve.len().min(map.len());

	let mut i = 0;
	while i < n {
		let k = map[i];
		let mut p = 0.5;
		let mut q = 0.5;
		let w = 2. * (wdel * k as f32).cos();
		let mut j = 1;
		while j < m {
			q *= w - coeffs[j - 1];
			p *= w - coeffs[j];
			j += 2;
		}
		if j == m {
			// odd order, the last coefficient is on its own
			q *= w - coeffs[j - 1];
			p *= p * (4. - w * w);
			q *= q;
		} else {
			p *= p * (2. - w);
			q *= q * (2. + w);
		}
		let q = ((amp / (p + q).sqrt() - amp_offset) * 0.11512925).exp();
		while i < n && map[i] == k {
			curve[i] *= q;
			i += 1;
		}
	}
}

#[cfg(test)]
fn test_config(order :u8) -> Floor0Config {
	Floor0Config {
		order,
		rate : 44100,
		bark_map_size : 256,
		amplitude_bits : 4,
		amplitude_offset : 80,
		books : vec![0],
	}
}

#[cfg(test)]
fn lsp_book() -> Codebook {
	use crate::codebook::{StaticCodebook, VqLookup};
	// Both entries are (0.25, 0.5)
	Codebook::from_static(&StaticCodebook {
		dimensions : 2,
		entries : 2,
		codeword_lengths : vec![1, 1],
		vq_lookup : Some(VqLookup {
			lookup_type : 2,
			minimum_value : 0.,
			delta_value : 0.25,
			sequence_p : false,
			multiplicands : vec![1, 2, 1, 2],
		}),
	}).unwrap()
}

#[test]
fn test_bark_map() {
	let look = Floor0Lookup::new(&test_config(4), (256, 2048));
	for &long in [false, true].iter() {
		let map = look.bark_map(long).to_vec();
		assert_eq!(map.len(), if long { 1024 } else { 128 });
		assert_eq!(map[0], 0);
		assert!(map.windows(2).all(|w| w[0] <= w[1]));
		assert!(map.iter().all(|v| *v >= 0 && *v < 256));
		// Cached
		assert_eq!(look.bark_map(long).as_ptr(), look.bark_map(long).as_ptr());
	}
}

#[test]
fn test_floor0_unpack() {
	use crate::bitpacking::BitpackWriter;
	use crate::codebook::StaticCodebook;
	let scalar = Codebook::from_static(&StaticCodebook {
		dimensions : 1,
		entries : 2,
		codeword_lengths : vec![1, 1],
		vq_lookup : None,
	}).unwrap();
	let books = vec![lsp_book(), scalar];
	let write = |order :u32, book :u32| {
		let mut w = BitpackWriter::new();
		w.write(order, 8).write(44100, 16).write(256, 16);
		w.write(4, 6).write(80, 8).write(0, 4).write(book, 8);
		w.into_inner()
	};

	let data = write(16, 0);
	let cfg = Floor0Config::unpack(&mut BitpackCursor::new(&data), &books).unwrap();
	assert_eq!(cfg.order, 16);
	assert_eq!(cfg.rate, 44100);
	assert_eq!(cfg.bark_map_size, 256);
	assert_eq!(cfg.books, &[0]);

	for &(order, book) in [(0, 0), (16, 1), (16, 2)].iter() {
		let data = write(order, book);
		let res = Floor0Config::unpack(&mut BitpackCursor::new(&data), &books);
		assert_eq!(res.err(), Some(HeaderReadError::HeaderBadFormat));
	}
}

#[test]
fn test_floor0_decode() {
	use crate::bitpacking::BitpackWriter;
	let look = Floor0Lookup::new(&test_config(4), (256, 2048));
	let books = [lsp_book()];

	let mut w = BitpackWriter::new();
	w.write(15, 4).write(0, 1).write_codeword(0, 1).write_codeword(1, 1);
	let data = w.into_inner();
	let lsp = look.decode(&books, &mut BitpackCursor::new(&data)).unwrap();
	assert_eq!(lsp, &[0.25, 0.5, 0.75, 1., 80.]);

	// Zero amplitude is silence
	let data = [0];
	assert_eq!(look.decode(&books, &mut BitpackCursor::new(&data)), None);

	// Book number out of range
	let mut cfg = test_config(4);
	cfg.books = vec![0, 0, 0];
	let look3 = Floor0Lookup::new(&cfg, (256, 2048));
	let mut w = BitpackWriter::new();
	w.write(15, 4).write(3, 2);
	let data = w.into_inner();
	assert_eq!(look3.decode(&books, &mut BitpackCursor::new(&data)), None);

	// Truncated coefficients: one byte holds three of the five vectors
	let look10 = Floor0Lookup::new(&test_config(10), (256, 2048));
	let mut w = BitpackWriter::new();
	w.write(15, 4).write(0, 1).write_codeword(0, 1);
	let data = w.into_inner();
	assert_eq!(look10.decode(&books, &mut BitpackCursor::new(&data)), None);
}

#[test]
fn test_floor0_apply() {
	let look = Floor0Lookup::new(&test_config(4), (256, 2048));
	let lsp = [0.4f32, 1.2, 2., 2.8, 20.];
	let mut out = vec![1.; 128];
	look.apply(Some(&lsp), &mut out, false);
	assert!(out.iter().all(|v| *v > 0. && v.is_finite()));

	// Bins sharing a Bark position share the value
	let map = look.bark_map(false).to_vec();
	for i in 1 .. 128 {
		if map[i] == map[i - 1] {
			assert_eq!(out[i], out[i - 1]);
		}
	}

	// First bin against the filter formula, with w = 2 at k = 0
	let c = lsp[.. 4].iter().map(|l| 2. * (*l as f64).cos()).collect::<Vec<f64>>();
	let q = 0.5 * (2. - c[0]) * (2. - c[2]);
	let q = q * q * 4.;
	let expected = ((20. / q.sqrt() - 80.) * 0.11512925).exp();
	assert!((out[0] as f64 - expected).abs() < expected * 1e-4, "{} {}", out[0], expected);

	look.apply(None, &mut out, false);
	assert!(out.iter().all(|v| *v == 0.));
}
