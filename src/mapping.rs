// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Channel mappings

A mapping assigns every channel to a submap, which in turn names the
floor and residue used for the channel. It also lists the coupling
steps, pairs of channels that are coded as magnitude and angle.

The inverse of a mapping turns the spectral data of a packet into
time domain blocks, one per channel.
*/

use crate::audio::BitCounters;
use crate::bitpacking::BitpackCursor;
use crate::codebook::Codebook;
use crate::header::HeaderReadError;
use crate::header_cached::StreamLookups;
use crate::ilog;
use crate::residue::NonzeroFlags;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MappingConfig {
	/// (magnitude, angle) channel pairs
	pub coupling :Vec<(u8, u8)>,
	/// Submap of each channel
	pub mux :Vec<u8>,
	pub submap_floors :Vec<u8>,
	pub submap_residues :Vec<u8>,
}

impl MappingConfig {
	/// Reads a type 0 mapping, the only type there is
	pub fn unpack(rdr :&mut BitpackCursor, audio_channels :u8,
			floor_count :usize, residue_count :usize) -> Result<Self, HeaderReadError> {
		let submaps = if rdr.read_bit_flag()? {
			rdr.read_u4()? + 1
		} else {
			1
		};

		let mut coupling = Vec::new();
		if rdr.read_bit_flag()? {
			let steps = rdr.read_u8()? as usize + 1;
			let bits = ilog(audio_channels as u64 - 1);
			for _ in 0 .. steps {
				let magnitude = rdr.read(bits)?;
				let angle = rdr.read(bits)?;
				if magnitude == angle || magnitude >= audio_channels as u32
						|| angle >= audio_channels as u32 {
					return Err(HeaderReadError::HeaderBadFormat);
				}
				coupling.push((magnitude as u8, angle as u8));
			}
		}

		// Reserved
		if rdr.read_u2()? != 0 {
			return Err(HeaderReadError::HeaderBadFormat);
		}

		let mux = if submaps > 1 {
			let mut mux = Vec::with_capacity(audio_channels as usize);
			for _ in 0 .. audio_channels {
				let m = rdr.read_u4()?;
				if m >= submaps {
					return Err(HeaderReadError::HeaderBadFormat);
				}
				mux.push(m);
			}
			mux
		} else {
			vec![0; audio_channels as usize]
		};

		let mut submap_floors = Vec::with_capacity(submaps as usize);
		let mut submap_residues = Vec::with_capacity(submaps as usize);
		for _ in 0 .. submaps {
			// Unused time configuration
			rdr.read_u8()?;
			let floor = rdr.read_u8()?;
			if floor as usize >= floor_count {
				return Err(HeaderReadError::HeaderBadFormat);
			}
			let residue = rdr.read_u8()?;
			if residue as usize >= residue_count {
				return Err(HeaderReadError::HeaderBadFormat);
			}
			submap_floors.push(floor);
			submap_residues.push(residue);
		}
		Ok(MappingConfig {
			coupling,
			mux,
			submap_floors,
			submap_residues,
		})
	}

	/// Decodes the spectra of all channels and transforms them.
	///
	/// Each buffer in `pcm` is as long as the block. On return it holds
	/// the block's time domain data. The returned counters hold the
	/// bits spent on the floors and on the residues.
	pub fn inverse(&self, codebooks :&[Codebook], look :&StreamLookups,
			rdr :&mut BitpackCursor, pcm :&mut [Vec<f32>], long :bool) -> BitCounters {
		let n = look.blocksizes[long as usize].mdct.size();
		let half = n / 2;
		let mut bits = BitCounters::default();

		// Floors
		let start = rdr.bits_read();
		let mut memos = Vec::with_capacity(pcm.len());
		let mut nonzero = NonzeroFlags::new();
		for (ch, buf) in pcm.iter_mut().enumerate() {
			let floor = &look.floors[self.submap_floor(ch)];
			let memo = floor.decode_envelope(codebooks, rdr);
			nonzero.push(memo.is_some());
			memos.push(memo);
			for v in buf[.. half].iter_mut() {
				*v = 0.;
			}
		}
		bits.floor = (rdr.bits_read() - start) as u64;

		// A coupled channel has to be decoded if its partner has energy
		for &(m, a) in self.coupling.iter() {
			let (m, a) = (m as usize, a as usize);
			if nonzero[m] || nonzero[a] {
				nonzero[m] = true;
				nonzero[a] = true;
			}
		}

		// Residues
		let start = rdr.bits_read();
		for (submap, &residue) in self.submap_residues.iter().enumerate() {
			let mut bundle = Vec::with_capacity(pcm.len());
			let mut bundle_nonzero = NonzeroFlags::new();
			for ((buf, &mux), &nz) in pcm.iter_mut().zip(self.mux.iter()).zip(nonzero.iter()) {
				if mux as usize == submap {
					bundle.push(&mut buf[.. half]);
					bundle_nonzero.push(nz);
				}
			}
			look.residues[residue as usize].inverse(codebooks, rdr,
				&mut bundle, &bundle_nonzero, n);
		}
		bits.residue = (rdr.bits_read() - start) as u64;

		// Coupling, in reverse order
		for &(m, a) in self.coupling.iter().rev() {
			if let Some((mag, ang)) = dual_mut_idx(pcm, m as usize, a as usize) {
				for (m, a) in mag[.. half].iter_mut().zip(ang[.. half].iter_mut()) {
					let (new_m, new_a) = inverse_couple(*m, *a);
					*m = new_m;
					*a = new_a;
				}
			}
		}

		// Envelope and transform
		let mdct = &look.blocksizes[long as usize].mdct;
		for (ch, buf) in pcm.iter_mut().enumerate() {
			let floor = &look.floors[self.submap_floor(ch)];
			floor.apply(memos[ch].as_ref(), &mut buf[.. half], long);
			mdct.backward(buf);
		}
		bits
	}

	fn submap_floor(&self, ch :usize) -> usize {
		self.submap_floors[self.mux[ch] as usize] as usize
	}
}

/// Turns a magnitude and angle pair back into two channel values
#[inline]
fn inverse_couple(m :f32, a :f32) -> (f32, f32) {
	if m > 0. {
		if a > 0. {
			(m, m - a)
		} else {
			(m + a, m)
		}
	} else {
		if a > 0. {
			(m, m + a)
		} else {
			(m - a, m)
		}
	}
}

fn dual_mut_idx<T>(v :&mut [T], idx_a :usize, idx_b :usize)
		-> Option<(&mut T, &mut T)> {
	if idx_a == idx_b || idx_a.max(idx_b) >= v.len() {
		return None;
	}
	if idx_a < idx_b {
		let (l, r) = v.split_at_mut(idx_b);
		Some((&mut l[idx_a], &mut r[0]))
	} else {
		let (l, r) = v.split_at_mut(idx_a);
		Some((&mut r[0], &mut l[idx_b]))
	}
}

#[test]
fn test_inverse_couple() {
	assert_eq!(inverse_couple(2., 1.), (2., 1.));
	assert_eq!(inverse_couple(2., -1.), (1., 2.));
	assert_eq!(inverse_couple(-2., 1.), (-2., -1.));
	assert_eq!(inverse_couple(-2., -1.), (-1., -2.));
	assert_eq!(inverse_couple(0., 0.), (0., 0.));
}

#[test]
fn test_dual_mut_idx() {
	let mut v = [1, 2, 3, 4];
	{
		let (a, b) = dual_mut_idx(&mut v, 3, 1).unwrap();
		*a += 10;
		*b += 20;
	}
	assert_eq!(v, [1, 22, 3, 14]);
	assert!(dual_mut_idx(&mut v, 2, 2).is_none());
	assert!(dual_mut_idx(&mut v, 0, 4).is_none());
}

#[test]
fn test_mapping_unpack() {
	use crate::bitpacking::BitpackWriter;

	// Two submaps, one coupling step, stereo
	let mut w = BitpackWriter::new();
	w.write_flag(true).write(1, 4);
	w.write_flag(true).write(0, 8).write(0, 1).write(1, 1);
	w.write(0, 2);
	w.write(1, 4).write(0, 4);
	w.write(0, 8).write(1, 8).write(0, 8);
	w.write(0, 8).write(0, 8).write(1, 8);
	let data = w.into_inner();
	let map = MappingConfig::unpack(&mut BitpackCursor::new(&data), 2, 2, 2).unwrap();
	assert_eq!(map, MappingConfig {
		coupling : vec![(0, 1)],
		mux : vec![1, 0],
		submap_floors : vec![1, 0],
		submap_residues : vec![0, 1],
	});
	assert_eq!(map.submap_floor(0), 0);
	assert_eq!(map.submap_floor(1), 1);

	// Only one floor
	let res = MappingConfig::unpack(&mut BitpackCursor::new(&data), 2, 1, 2);
	assert_eq!(res, Err(HeaderReadError::HeaderBadFormat));

	// Coupling a channel with itself
	let mut w = BitpackWriter::new();
	w.write_flag(false);
	w.write_flag(true).write(0, 8).write(1, 1).write(1, 1);
	w.write(0, 2);
	w.write(0, 8).write(0, 8).write(0, 8);
	let data = w.into_inner();
	let res = MappingConfig::unpack(&mut BitpackCursor::new(&data), 2, 1, 1);
	assert_eq!(res, Err(HeaderReadError::HeaderBadFormat));

	// Reserved bits set
	let mut w = BitpackWriter::new();
	w.write_flag(false).write_flag(false).write(1, 2);
	w.write(0, 8).write(0, 8).write(0, 8);
	let data = w.into_inner();
	let res = MappingConfig::unpack(&mut BitpackCursor::new(&data), 1, 1, 1);
	assert_eq!(res, Err(HeaderReadError::HeaderBadFormat));

	// Mono has no coupling
	let mut w = BitpackWriter::new();
	w.write_flag(false).write_flag(false).write(0, 2);
	w.write(0, 8).write(0, 8).write(0, 8);
	let data = w.into_inner();
	let map = MappingConfig::unpack(&mut BitpackCursor::new(&data), 1, 1, 1).unwrap();
	assert_eq!(map.mux, &[0]);
	assert!(map.coupling.is_empty());
}
