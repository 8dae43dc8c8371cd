// Vorbis decoder written in Rust
//
// Copyright (c) 2019 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Traits for sample formats
*/

/// Trait for a packet of multiple samples
pub trait Samples {
	/// Samples per channel
	fn num_samples(&self) -> usize;
	/// Converts one slice of samples per channel
	fn from_planar(planes :&[&[f32]]) -> Self;
}

impl<S :Sample> Samples for Vec<Vec<S>> {
	fn num_samples(&self) -> usize {
		self.first().map(|ch| ch.len()).unwrap_or(0)
	}

	fn from_planar(planes :&[&[f32]]) -> Self {
		planes.iter()
			.map(|samples| {
				samples.iter()
					.map(|s| S::from_float(*s))
					.collect()
			}).collect()
	}
}

/// A packet of multi-channel interleaved samples
#[derive(Debug, Clone, PartialEq)]
pub struct InterleavedSamples<S :Sample> {
	pub samples :Vec<S>,
	pub channel_count :usize,
}

impl<S :Sample> Samples for InterleavedSamples<S> {
	fn num_samples(&self) -> usize {
		if self.channel_count == 0 {
			return 0;
		}
		self.samples.len() / self.channel_count
	}

	fn from_planar(planes :&[&[f32]]) -> Self {
		let channel_count = planes.len();
		let len = planes.iter().map(|p| p.len()).min().unwrap_or(0);
		let mut samples = Vec::with_capacity(len * channel_count);
		for i in 0 .. len {
			for chan in planes.iter() {
				samples.push(S::from_float(chan[i]));
			}
		}
		Self {
			samples,
			channel_count,
		}
	}
}

/// Trait representing a single sample
pub trait Sample {
	fn from_float(fl :f32) -> Self;
}

impl Sample for f32 {
	fn from_float(fl :f32) -> Self {
		fl
	}
}

impl Sample for i16 {
	fn from_float(fl :f32) -> Self {
		let fl = fl * 32768.0;
		if fl > 32767. {
			32767
		} else if fl < -32768. {
			-32768
		} else {
			fl as i16
		}
	}
}

#[test]
fn test_i16_saturates() {
	assert_eq!(i16::from_float(0.), 0);
	assert_eq!(i16::from_float(0.5), 16384);
	assert_eq!(i16::from_float(-1.), -32768);
	assert_eq!(i16::from_float(1.), 32767);
	assert_eq!(i16::from_float(3.), 32767);
	assert_eq!(i16::from_float(-3.), -32768);
}

#[test]
fn test_interleave() {
	let l = [0.25f32, 0.5];
	let r = [-0.25f32, -0.5];
	let s = InterleavedSamples::<f32>::from_planar(&[&l[..], &r[..]]);
	assert_eq!(s.samples, vec![0.25, -0.25, 0.5, -0.5]);
	assert_eq!(s.channel_count, 2);
	assert_eq!(s.num_samples(), 2);

	let p = <Vec<Vec<i16>> as Samples>::from_planar(&[&l[..], &r[..]]);
	assert_eq!(p, vec![vec![8192, 16384], vec![-8192, -16384]]);
	assert_eq!(p.num_samples(), 2);
}
