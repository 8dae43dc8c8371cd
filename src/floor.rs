// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Floor dispatch

Selects between the two floor types a setup header may declare.
*/

use crate::bitpacking::BitpackCursor;
use crate::codebook::Codebook;
use crate::floor0::{Floor0Config, Floor0Lookup};
use crate::floor1::{Floor1Config, Floor1Lookup};
use crate::header::HeaderReadError;

#[derive(Debug, Clone)]
pub(crate) enum FloorConfig {
	Zero(Floor0Config),
	One(Floor1Config),
}

impl FloorConfig {
	pub fn unpack(rdr :&mut BitpackCursor, floor_type :u16, codebooks :&[Codebook])
			-> Result<Self, HeaderReadError> {
		match floor_type {
			0 => Ok(FloorConfig::Zero(Floor0Config::unpack(rdr, codebooks)?)),
			1 => Ok(FloorConfig::One(Floor1Config::unpack(rdr, codebooks)?)),
			_ => Err(HeaderReadError::HeaderBadFormat),
		}
	}
}

#[derive(Debug, Clone)]
pub(crate) enum FloorLookup {
	Zero(Floor0Lookup),
	One(Floor1Lookup),
}

/// Per channel result of reading the floor of a block
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FloorMemo {
	Zero(Vec<f32>),
	One(Vec<i32>),
}

impl FloorLookup {
	pub fn new(config :&FloorConfig, blocksizes :(usize, usize)) -> Self {
		match config {
			FloorConfig::Zero(c) => FloorLookup::Zero(Floor0Lookup::new(c, blocksizes)),
			FloorConfig::One(c) => FloorLookup::One(Floor1Lookup::new(c)),
		}
	}

	/// Reads the floor of one channel.
	///
	/// `None` means the channel carries no energy in this block.
	pub fn decode_envelope(&self, codebooks :&[Codebook], rdr :&mut BitpackCursor)
			-> Option<FloorMemo> {
		match self {
			FloorLookup::Zero(l) => l.decode(codebooks, rdr).map(FloorMemo::Zero),
			FloorLookup::One(l) => l.decode(codebooks, rdr).map(FloorMemo::One),
		}
	}

	/// Multiplies the envelope into the spectrum `out` of one channel
	pub fn apply(&self, memo :Option<&FloorMemo>, out :&mut [f32], long :bool) {
		match (self, memo) {
			(FloorLookup::Zero(l), Some(FloorMemo::Zero(m))) => l.apply(Some(m), out, long),
			(FloorLookup::One(l), Some(FloorMemo::One(m))) => l.apply(Some(m), out),
			(FloorLookup::Zero(l), _) => l.apply(None, out, long),
			(FloorLookup::One(l), _) => l.apply(None, out),
		}
	}
}

#[test]
fn test_floor_type_dispatch() {
	use crate::bitpacking::BitpackWriter;
	let mut w = BitpackWriter::new();
	// floor 1 without partitions, multiplier 1, 7 range bits
	w.write(0, 5).write(0, 2).write(7, 4);
	let data = w.into_inner();
	let cfg = FloorConfig::unpack(&mut BitpackCursor::new(&data), 1, &[]).unwrap();
	let look = FloorLookup::new(&cfg, (256, 2048));

	// Flag, then both end posts at 128
	let mut w = BitpackWriter::new();
	w.write_flag(true).write(128, 8).write(128, 8);
	let data = w.into_inner();
	let memo = look.decode_envelope(&[], &mut BitpackCursor::new(&data));
	assert_eq!(memo, Some(FloorMemo::One(vec![128, 128])));
	let mut out = vec![1.; 64];
	look.apply(memo.as_ref(), &mut out, false);
	assert!(out.iter().all(|v| *v == out[0] && *v > 0.));
	look.apply(None, &mut out, false);
	assert!(out.iter().all(|v| *v == 0.));

	let res = FloorConfig::unpack(&mut BitpackCursor::new(&data), 2, &[]);
	assert_eq!(res.err(), Some(HeaderReadError::HeaderBadFormat));
}
