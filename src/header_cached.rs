// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Cached header info

This mod contains logic to generate and deal with
data derived from header information
that's used later in the decode process.

Everything in here is computed once per stream, right after
the setup header has been read, and is read-only afterwards.
*/

use crate::floor::FloorLookup;
use crate::header::{IdentHeader, SetupHeader};
use crate::imdct::MdctLookup;
use crate::residue::ResidueLookup;
use crate::window::window_slope;

/// Tables that depend on one of the two block sizes
pub(crate) struct CachedBlocksizeDerived {
	pub mdct :MdctLookup,
	pub window_slope :Vec<f32>,
}

impl CachedBlocksizeDerived {
	pub fn from_blocksize(bs :u8) -> Self {
		CachedBlocksizeDerived {
			mdct : MdctLookup::new(bs),
			window_slope : window_slope((1usize << bs) >> 1),
		}
	}
}

/// Stream scoped decode state derived from the headers
pub(crate) struct StreamLookups {
	pub blocksizes :[CachedBlocksizeDerived; 2],
	pub floors :Vec<FloorLookup>,
	pub residues :Vec<ResidueLookup>,
	/// Bits needed to encode a mode number
	pub mode_bits :u8,
}

impl StreamLookups {
	pub fn new(ident :&IdentHeader, setup :&SetupHeader) -> Self {
		let blocksizes = (ident.blocksize(false), ident.blocksize(true));
		StreamLookups {
			blocksizes : [
				CachedBlocksizeDerived::from_blocksize(ident.blocksize_0),
				CachedBlocksizeDerived::from_blocksize(ident.blocksize_1),
			],
			floors : setup.floors.iter()
				.map(|f| FloorLookup::new(f, blocksizes))
				.collect(),
			residues : setup.residues.iter()
				.map(|r| ResidueLookup::new(r, &setup.codebooks))
				.collect(),
			mode_bits : crate::ilog(setup.modes.len() as u64 - 1),
		}
	}

	pub fn window_slopes(&self) -> [&[f32]; 2] {
		[&self.blocksizes[0].window_slope, &self.blocksizes[1].window_slope]
	}
}
