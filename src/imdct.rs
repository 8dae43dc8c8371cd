// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Inverse MDCT

In place butterfly implementation of the inverse modified discrete
cosine transform. For a block of `n` samples it takes the `n / 2`
frequency coefficients from the first half of the buffer and
overwrites the whole buffer with

```text
y[i] = sum_j x[j] * cos(pi / (2n) * (2i + 1 + n/2) * (2j + 1))
```

There is no normalisation factor; the window and the encoder side
scaling take care of that.
*/

const PI3_8 :f32 = 0.38268343236508977175;
const PI2_8 :f32 = 0.70710678118654752441;
const PI1_8 :f32 = 0.92387953251128675613;

/// Precomputed tables for one block size
#[derive(Debug, Clone)]
pub(crate) struct MdctLookup {
	n :usize,
	log2n :u8,
	trig :Vec<f32>,
	bitrev :Vec<usize>,
}

impl MdctLookup {
	/// Creates the tables for a block of `1 << log2n` samples.
	///
	/// Block sizes below 64 are not supported by the
	/// fixed size butterflies.
	pub fn new(log2n :u8) -> Self {
		debug_assert!(log2n >= 6);
		let n = 1usize << log2n;
		let n2 = n >> 1;
		let nf = n as f64;
		let pi = ::std::f64::consts::PI;
		let mut trig = vec![0.; n + n / 4];
		for i in 0 .. n / 4 {
			let fi = i as f64;
			trig[i * 2] = (pi / nf * (4. * fi)).cos() as f32;
			trig[i * 2 + 1] = -(pi / nf * (4. * fi)).sin() as f32;
			trig[n2 + i * 2] = (pi / (2. * nf) * (2. * fi + 1.)).cos() as f32;
			trig[n2 + i * 2 + 1] = (pi / (2. * nf) * (2. * fi + 1.)).sin() as f32;
		}
		for i in 0 .. n / 8 {
			let fi = i as f64;
			trig[n + i * 2] = ((pi / nf * (4. * fi + 2.)).cos() * 0.5) as f32;
			trig[n + i * 2 + 1] = (-(pi / nf * (4. * fi + 2.)).sin() * 0.5) as f32;
		}

		let mask = (1usize << (log2n - 1)) - 1;
		let msb = 1usize << (log2n - 2);
		let mut bitrev = vec![0; n / 4];
		for i in 0 .. n / 8 {
			let mut acc = 0;
			let mut j = 0;
			while msb >> j != 0 {
				if (msb >> j) & i != 0 {
					acc |= 1 << j;
				}
				j += 1;
			}
			bitrev[i * 2] = ((!acc) & mask) - 1;
			bitrev[i * 2 + 1] = acc;
		}
		MdctLookup {
			n,
			log2n,
			trig,
			bitrev,
		}
	}

	/// Number of time domain samples the transform produces
	pub fn size(&self) -> usize {
		self.n
	}

	/// Runs the inverse transform in place.
	///
	/// The coefficients are taken from `buf[.. n / 2]`,
	/// and the `n` output samples are written to `buf[.. n]`.
	pub fn backward(&self, buf :&mut [f32]) {
		let n = self.n;
		let n2 = n >> 1;
		let n4 = n >> 2;
		let t = &self.trig;
		let x = &mut buf[.. n];

		// rotate
		let mut ix = n2 as isize - 7;
		let mut ox = n2 + n4;
		let mut ti = n4;
		while ix >= 0 {
			let i = ix as usize;
			ox -= 4;
			x[ox] = -x[i + 2] * t[ti + 3] - x[i] * t[ti + 2];
			x[ox + 1] = x[i] * t[ti + 3] - x[i + 2] * t[ti + 2];
			x[ox + 2] = -x[i + 6] * t[ti + 1] - x[i + 4] * t[ti];
			x[ox + 3] = x[i + 4] * t[ti + 1] - x[i + 6] * t[ti];
			ix -= 8;
			ti += 4;
		}

		let mut ix = n2 as isize - 8;
		let mut ox = n2 + n4;
		let mut ti = n4;
		while ix >= 0 {
			let i = ix as usize;
			ti -= 4;
			x[ox] = x[i + 4] * t[ti + 3] + x[i + 6] * t[ti + 2];
			x[ox + 1] = x[i + 4] * t[ti + 2] - x[i + 6] * t[ti + 3];
			x[ox + 2] = x[i] * t[ti + 1] + x[i + 2] * t[ti];
			x[ox + 3] = x[i] * t[ti] - x[i + 2] * t[ti + 1];
			ix -= 8;
			ox += 4;
		}

		self.butterflies(&mut x[n2 ..]);
		self.bitreverse(x);

		// rotate + window
		let mut ox1 = n2 + n4;
		let mut ox2 = n2 + n4;
		let mut ix = 0;
		let mut ti = n2;
		loop {
			ox1 -= 4;
			x[ox1 + 3] = x[ix] * t[ti + 1] - x[ix + 1] * t[ti];
			x[ox2] = -(x[ix] * t[ti] + x[ix + 1] * t[ti + 1]);
			x[ox1 + 2] = x[ix + 2] * t[ti + 3] - x[ix + 3] * t[ti + 2];
			x[ox2 + 1] = -(x[ix + 2] * t[ti + 2] + x[ix + 3] * t[ti + 3]);
			x[ox1 + 1] = x[ix + 4] * t[ti + 5] - x[ix + 5] * t[ti + 4];
			x[ox2 + 2] = -(x[ix + 4] * t[ti + 4] + x[ix + 5] * t[ti + 5]);
			x[ox1] = x[ix + 6] * t[ti + 7] - x[ix + 7] * t[ti + 6];
			x[ox2 + 3] = -(x[ix + 6] * t[ti + 6] + x[ix + 7] * t[ti + 7]);
			ox2 += 4;
			ix += 8;
			ti += 8;
			if ix >= ox1 {
				break;
			}
		}

		let mut ix = n2 + n4;
		let mut ox1 = n4;
		let mut ox2 = n4;
		loop {
			ox1 -= 4;
			ix -= 4;
			for k in 0 .. 4 {
				x[ox1 + 3 - k] = x[ix + 3 - k];
				x[ox2 + k] = -x[ix + 3 - k];
			}
			ox2 += 4;
			if ox2 >= ix {
				break;
			}
		}

		let mut ix = n2 + n4;
		let mut ox1 = n2 + n4;
		loop {
			ox1 -= 4;
			x[ox1] = x[ix + 3];
			x[ox1 + 1] = x[ix + 2];
			x[ox1 + 2] = x[ix + 1];
			x[ox1 + 3] = x[ix];
			ix += 4;
			if ox1 <= n2 {
				break;
			}
		}
	}

	fn butterflies(&self, x :&mut [f32]) {
		let points = x.len();
		let t = &self.trig;
		let mut stages = self.log2n as i32 - 5;

		stages -= 1;
		if stages > 0 {
			butterfly_generic(t, x, 4);
		}
		let mut i = 1;
		loop {
			stages -= 1;
			if stages <= 0 {
				break;
			}
			let span = points >> i;
			for j in 0 .. 1 << i {
				butterfly_generic(t, &mut x[span * j .. span * (j + 1)], 4 << i);
			}
			i += 1;
		}
		for chunk in x.chunks_mut(32) {
			butterfly_32(chunk);
		}
	}

	fn bitreverse(&self, x :&mut [f32]) {
		let n = self.n;
		let t = &self.trig;
		let bit = &self.bitrev;
		let xo = n >> 1;
		let mut w0 = 0;
		let mut w1 = n >> 1;
		let mut ti = n;
		let mut b = 0;
		loop {
			let x0 = xo + bit[b];
			let x1 = xo + bit[b + 1];
			let r0 = x[x0 + 1] - x[x1 + 1];
			let r1 = x[x0] + x[x1];
			let r2 = r1 * t[ti] + r0 * t[ti + 1];
			let r3 = r1 * t[ti + 1] - r0 * t[ti];

			w1 -= 4;

			let r0 = (x[x0 + 1] + x[x1 + 1]) * 0.5;
			let r1 = (x[x0] - x[x1]) * 0.5;
			x[w0] = r0 + r2;
			x[w1 + 2] = r0 - r2;
			x[w0 + 1] = r1 + r3;
			x[w1 + 3] = r3 - r1;

			let x0 = xo + bit[b + 2];
			let x1 = xo + bit[b + 3];
			let r0 = x[x0 + 1] - x[x1 + 1];
			let r1 = x[x0] + x[x1];
			let r2 = r1 * t[ti + 2] + r0 * t[ti + 3];
			let r3 = r1 * t[ti + 3] - r0 * t[ti + 2];

			let r0 = (x[x0 + 1] + x[x1 + 1]) * 0.5;
			let r1 = (x[x0] - x[x1]) * 0.5;
			x[w0 + 2] = r0 + r2;
			x[w1] = r0 - r2;
			x[w0 + 3] = r1 + r3;
			x[w1 + 1] = r3 - r1;

			ti += 4;
			b += 4;
			w0 += 4;
			if w0 >= w1 {
				break;
			}
		}
	}
}

/// Radix 2 butterfly stage over all of `x`, stepping through
/// the twiddle table by `trigint`
fn butterfly_generic(t :&[f32], x :&mut [f32], trigint :usize) {
	let points = x.len();
	let mut x1 = points - 8;
	let mut x2 = (points >> 1) - 8;
	let mut ti = 0;
	loop {
		for &k in [6, 4, 2, 0].iter() {
			let r0 = x[x1 + k] - x[x2 + k];
			let r1 = x[x1 + k + 1] - x[x2 + k + 1];
			x[x1 + k] += x[x2 + k];
			x[x1 + k + 1] += x[x2 + k + 1];
			x[x2 + k] = r1 * t[ti + 1] + r0 * t[ti];
			x[x2 + k + 1] = r1 * t[ti] - r0 * t[ti + 1];
			ti += trigint;
		}
		if x2 < 8 {
			break;
		}
		x1 -= 8;
		x2 -= 8;
	}
}

fn butterfly_8(x :&mut [f32]) {
	let r0 = x[6] + x[2];
	let r1 = x[6] - x[2];
	let r2 = x[4] + x[0];
	let r3 = x[4] - x[0];

	x[6] = r0 + r2;
	x[4] = r0 - r2;

	let r0 = x[5] - x[1];
	let r2 = x[7] - x[3];
	x[0] = r1 + r0;
	x[2] = r1 - r0;

	let r0 = x[5] + x[1];
	let r1 = x[7] + x[3];
	x[3] = r2 + r3;
	x[1] = r2 - r3;
	x[7] = r1 + r0;
	x[5] = r1 - r0;
}

fn butterfly_16(x :&mut [f32]) {
	let r0 = x[1] - x[9];
	let r1 = x[0] - x[8];
	x[8] += x[0];
	x[9] += x[1];
	x[0] = (r0 + r1) * PI2_8;
	x[1] = (r0 - r1) * PI2_8;

	let r0 = x[3] - x[11];
	let r1 = x[10] - x[2];
	x[10] += x[2];
	x[11] += x[3];
	x[2] = r0;
	x[3] = r1;

	let r0 = x[12] - x[4];
	let r1 = x[13] - x[5];
	x[12] += x[4];
	x[13] += x[5];
	x[4] = (r0 - r1) * PI2_8;
	x[5] = (r0 + r1) * PI2_8;

	let r0 = x[14] - x[6];
	let r1 = x[15] - x[7];
	x[14] += x[6];
	x[15] += x[7];
	x[6] = r0;
	x[7] = r1;

	let (lo, hi) = x.split_at_mut(8);
	butterfly_8(lo);
	butterfly_8(hi);
}

fn butterfly_32(x :&mut [f32]) {
	let r0 = x[30] - x[14];
	let r1 = x[31] - x[15];
	x[30] += x[14];
	x[31] += x[15];
	x[14] = r0;
	x[15] = r1;

	let r0 = x[28] - x[12];
	let r1 = x[29] - x[13];
	x[28] += x[12];
	x[29] += x[13];
	x[12] = r0 * PI1_8 - r1 * PI3_8;
	x[13] = r0 * PI3_8 + r1 * PI1_8;

	let r0 = x[26] - x[10];
	let r1 = x[27] - x[11];
	x[26] += x[10];
	x[27] += x[11];
	x[10] = (r0 - r1) * PI2_8;
	x[11] = (r0 + r1) * PI2_8;

	let r0 = x[24] - x[8];
	let r1 = x[25] - x[9];
	x[24] += x[8];
	x[25] += x[9];
	x[8] = r0 * PI3_8 - r1 * PI1_8;
	x[9] = r1 * PI3_8 + r0 * PI1_8;

	let r0 = x[22] - x[6];
	let r1 = x[7] - x[23];
	x[22] += x[6];
	x[23] += x[7];
	x[6] = r1;
	x[7] = r0;

	let r0 = x[4] - x[20];
	let r1 = x[5] - x[21];
	x[20] += x[4];
	x[21] += x[5];
	x[4] = r1 * PI1_8 + r0 * PI3_8;
	x[5] = r1 * PI3_8 - r0 * PI1_8;

	let r0 = x[2] - x[18];
	let r1 = x[3] - x[19];
	x[18] += x[2];
	x[19] += x[3];
	x[2] = (r1 + r0) * PI2_8;
	x[3] = (r1 - r0) * PI2_8;

	let r0 = x[0] - x[16];
	let r1 = x[1] - x[17];
	x[16] += x[0];
	x[17] += x[1];
	x[0] = r1 * PI3_8 + r0 * PI1_8;
	x[1] = r1 * PI1_8 - r0 * PI3_8;

	let (lo, hi) = x.split_at_mut(16);
	butterfly_16(lo);
	butterfly_16(hi);
}

#[cfg(test)]
fn inverse_mdct_naive(input :&[f32]) -> Vec<f32> {
	let n = input.len() * 2;
	let pi = ::std::f64::consts::PI;
	(0 .. n).map(|i| {
		input.iter().enumerate().map(|(j, v)| {
			let arg = pi / (2. * n as f64) * (2. * i as f64 + 1. + (n / 2) as f64)
				* (2. * j as f64 + 1.);
			*v as f64 * arg.cos()
		}).sum::<f64>() as f32
	}).collect()
}

#[cfg(test)]
fn pseudo_random_input(len :usize, seed :u32) -> Vec<f32> {
	let mut state = seed;
	(0 .. len).map(|_| {
		state = state.wrapping_mul(1103515245).wrapping_add(12345);
		((state >> 16) & 0x7fff) as f32 / 16384. - 1.
	}).collect()
}

#[test]
fn test_imdct_matches_direct_formula() {
	for &log2n in [6, 7, 8, 9, 11].iter() {
		let lookup = MdctLookup::new(log2n);
		let n = lookup.size();
		let input = pseudo_random_input(n / 2, log2n as u32);
		let expected = inverse_mdct_naive(&input);
		let mut buf = input.clone();
		buf.resize(n, 0.);
		lookup.backward(&mut buf);
		let tolerance = 1e-5 * n as f32;
		for (i, (a, b)) in buf.iter().zip(expected.iter()).enumerate() {
			assert!((a - b).abs() < tolerance,
				"n = {}, i = {}: {} vs {}", n, i, a, b);
		}
	}
}

#[test]
fn test_imdct_zero_input() {
	for &log2n in [6, 8, 13].iter() {
		let lookup = MdctLookup::new(log2n);
		let mut buf = vec![0.; lookup.size()];
		lookup.backward(&mut buf);
		assert!(buf.iter().all(|v| *v == 0.));
	}
}

#[test]
fn test_imdct_impulse_energy() {
	// Every basis function of the transform carries n / 2 energy
	let lookup = MdctLookup::new(8);
	let n = lookup.size();
	for &bin in [0, 3, 77, 127].iter() {
		let mut buf = vec![0.; n];
		buf[bin] = 1.;
		lookup.backward(&mut buf);
		let energy :f32 = buf.iter().map(|v| v * v).sum();
		assert!((energy - (n / 2) as f32).abs() < 1e-2, "bin {}: {}", bin, energy);
	}
}
