// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Window slopes and overlap-add

Each decoded block is overlapped with its predecessor: the trailing half
of the previous block is faded out while the leading half of the new one
is faded in, using the slope that belongs to the smaller of the two
blocks. The region outside the slopes needs no multiplication, as the
window is flat there (zero parts are simply never returned).

The output history lives in a buffer of one long block per channel that
is split into two halves; `center_w` says which half holds the most
recent block's trailing part.
*/

/// Computes the rising window slope for a block of `2 * half` samples
pub(crate) fn window_slope(half :usize) -> Vec<f32> {
	let pi_2 = ::std::f64::consts::FRAC_PI_2;
	(0 .. half).map(|i| {
		let v = ((i as f64 + 0.5) / half as f64 * pi_2).sin();
		(pi_2 * v * v).sin() as f32
	}).collect()
}

/// Overlap-add history for all channels of a stream
pub(crate) struct OverlapBuffer {
	pcm :Vec<Vec<f32>>,
	center_w :bool,
	/// Half of the short and the long block size
	n0 :usize,
	n1 :usize,
}

/// Where the samples of a freshly added block are in the history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Centers {
	pub prev :usize,
	pub this :usize,
}

impl OverlapBuffer {
	pub fn new(channels :usize, blocksizes :(usize, usize)) -> Self {
		OverlapBuffer {
			pcm : vec![vec![0.; blocksizes.1]; channels],
			center_w : false,
			n0 : blocksizes.0 / 2,
			n1 : blocksizes.1 / 2,
		}
	}

	/// Clears the history
	pub fn reset(&mut self) {
		for ch in self.pcm.iter_mut() {
			for v in ch.iter_mut() {
				*v = 0.;
			}
		}
		self.center_w = false;
	}

	/// Overlaps a decoded block into the history.
	///
	/// `block` holds the time domain data of every channel,
	/// each `2 * n` samples long where `n` is half of the block
	/// size selected by `w`. `lw` is the size flag of the
	/// previous block. `slopes` are the short and long window slopes.
	pub fn add_block(&mut self, block :&[Vec<f32>], lw :bool, w :bool,
			slopes :[&[f32]; 2]) -> Centers {
		let n0 = self.n0;
		let n1 = self.n1;
		let n = if w { n1 } else { n0 };
		let (this_center, prev_center) = if self.center_w {
			(n1, 0)
		} else {
			(0, n1)
		};

		for (pcm, p) in self.pcm.iter_mut().zip(block.iter()) {
			match (lw, w) {
				(true, true) => {
					overlap(&mut pcm[prev_center .. prev_center + n1],
						&p[.. n1], slopes[1]);
				},
				(true, false) => {
					let start = prev_center + n1 / 2 - n0 / 2;
					overlap(&mut pcm[start .. start + n0], &p[.. n0], slopes[0]);
				},
				(false, true) => {
					let off = n1 / 2 - n0 / 2;
					overlap(&mut pcm[prev_center .. prev_center + n0],
						&p[off .. off + n0], slopes[0]);
					let end = n1 / 2 + n0 / 2;
					pcm[prev_center + n0 .. prev_center + end]
						.copy_from_slice(&p[off + n0 .. off + end]);
				},
				(false, false) => {
					overlap(&mut pcm[prev_center .. prev_center + n0],
						&p[.. n0], slopes[0]);
				},
			}
			pcm[this_center .. this_center + n].copy_from_slice(&p[n .. 2 * n]);
		}
		self.center_w = !self.center_w;
		Centers {
			prev : prev_center,
			this : this_center,
		}
	}

	/// Samples of channel `ch` in the range `start .. end`
	pub fn samples(&self, ch :usize, start :usize, end :usize) -> &[f32] {
		&self.pcm[ch][start .. end]
	}

	pub fn channels(&self) -> usize {
		self.pcm.len()
	}
}

/// Fades out `pcm` and fades in `p`, both as long as `slope`
fn overlap(pcm :&mut [f32], p :&[f32], slope :&[f32]) {
	let len = slope.len();
	for i in 0 .. len {
		pcm[i] = pcm[i] * slope[len - i - 1] + p[i] * slope[i];
	}
}

#[test]
fn test_window_power_complementary() {
	for &half in [32usize, 128, 1024, 4096].iter() {
		let w = window_slope(half);
		assert_eq!(w.len(), half);
		for i in 0 .. half {
			let s = w[i] * w[i] + w[half - 1 - i] * w[half - 1 - i];
			assert!((s - 1.).abs() < 1e-5, "half {} i {}: {}", half, i, s);
		}
		// Rising and in range
		assert!(w.windows(2).all(|p| p[0] <= p[1]));
		assert!(w[0] > 0. && w[half - 1] <= 1.);
	}
}

#[cfg(test)]
fn windowed_ones(slope :&[f32]) -> Vec<f32> {
	// A block of constant signal as it comes out of the
	// transform: faded in and faded out by the window
	let n = slope.len();
	let mut v = slope.to_vec();
	v.extend((0 .. n).map(|i| slope[n - 1 - i]));
	v
}

#[test]
fn test_overlap_same_size_reconstructs() {
	let short = window_slope(4);
	let long = window_slope(16);
	let mut buf = OverlapBuffer::new(1, (8, 32));
	let block = vec![windowed_ones(&short)];
	let c = buf.add_block(&block, false, false, [&short[..], &long[..]]);
	assert_eq!(c, Centers { prev : 16, this : 0 });
	let c = buf.add_block(&block, false, false, [&short[..], &long[..]]);
	assert_eq!(c, Centers { prev : 0, this : 16 });
	for v in buf.samples(0, 0, 4) {
		assert!((v - 1.).abs() < 1e-5);
	}
	// The left part of a long block after a short one is zero,
	// then follows the short slope, then it is flat
	let mut long_block = windowed_ones(&long);
	for i in 0 .. 16 {
		long_block[i] = if i < 6 {
			0.
		} else if i < 10 {
			short[i - 6]
		} else {
			1.
		};
	}
	let c = buf.add_block(&[long_block], false, true, [&short[..], &long[..]]);
	assert_eq!(c.prev, 16);
	for v in buf.samples(0, 16, 16 + 8 + 2) {
		assert!((v - 1.).abs() < 1e-5, "{}", v);
	}
}

#[test]
fn test_overlap_long_to_short() {
	let short = window_slope(4);
	let long = window_slope(16);
	let mut buf = OverlapBuffer::new(2, (8, 32));
	let mut long_block = windowed_ones(&long);
	// The right part of a long block next to a short one
	// is flat for n1/2 - n0/2 samples, then slopes down
	for i in 0 .. 16 {
		long_block[16 + i] = if i < 6 {
			1.
		} else if i < 10 {
			short[3 - (i - 6)]
		} else {
			0.
		};
	}
	let blocks = vec![long_block.clone(), long_block];
	buf.add_block(&blocks, true, true, [&short[..], &long[..]]);
	let c = buf.add_block(&vec![windowed_ones(&short); 2], true, false, [&short[..], &long[..]]);
	for ch in 0 .. 2 {
		for v in buf.samples(ch, c.prev, c.prev + 8 + 2) {
			assert!((v - 1.).abs() < 1e-5, "{}", v);
		}
	}
}
