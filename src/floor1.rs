// Vorbis decoder written in Rust
//
// Copyright (c) 2016 est31 <MTest31@outlook.com>
// and contributors. All rights reserved.
// Licensed under MIT license, or Apache 2 license,
// at your option. Please see the LICENSE file
// attached to this source distribution for details.

/*!
Floor type 1

The envelope is a piecewise linear curve in the dB domain, described
by the y values of a list of "posts" at fixed x positions. Each post
is coded as the difference to the value predicted by interpolating its
two already known neighbours.
*/

use crate::bitpacking::BitpackCursor;
use crate::codebook::Codebook;
use crate::header::HeaderReadError;
use crate::ilog;

pub(crate) const FLOOR1_MAX_PARTITIONS :usize = 31;
pub(crate) const FLOOR1_MAX_CLASSES :usize = 16;
/// Posts besides the two end points
const FLOOR1_MAX_POSTS :usize = 63;

/// Set on fit values that were predicted instead of coded
const UNCODED_FLAG :i32 = 0x8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Floor1Class {
	/// Number of posts of a partition of this class
	pub dimensions :u8,
	pub subclass_bits :u8,
	/// Book for the subclass selector, only if `subclass_bits > 0`
	pub masterbook :u8,
	/// `None` means the posts of the subclass are zero
	pub subbooks :[Option<u8>; 8],
}

#[derive(Debug, Clone)]
pub(crate) struct Floor1Config {
	pub partition_class :Vec<u8>,
	pub classes :Vec<Floor1Class>,
	pub multiplier :u8,
	pub range_bits :u8,
	/// x positions of the posts, in coding order
	pub postlist :Vec<u32>,
}

impl Floor1Config {
	pub fn unpack(rdr :&mut BitpackCursor, codebooks :&[Codebook])
			-> Result<Self, HeaderReadError> {
		let books = codebooks.len();
		let partitions = rdr.read_u5()? as usize;
		debug_assert!(partitions <= FLOOR1_MAX_PARTITIONS);
		let mut partition_class = Vec::with_capacity(partitions);
		let mut class_count = 0;
		for _ in 0 .. partitions {
			let class = rdr.read_u4()?;
			class_count = class_count.max(class as usize + 1);
			partition_class.push(class);
		}
		debug_assert!(class_count <= FLOOR1_MAX_CLASSES);

		let mut classes = Vec::with_capacity(class_count);
		for _ in 0 .. class_count {
			let dimensions = rdr.read_u3()? + 1;
			let subclass_bits = rdr.read_u2()?;
			let masterbook = if subclass_bits > 0 {
				rdr.read_u8()?
			} else {
				0
			};
			if masterbook as usize >= books {
				return Err(HeaderReadError::HeaderBadFormat);
			}
			let mut subbooks = [None; 8];
			for sb in subbooks[.. 1 << subclass_bits].iter_mut() {
				let book = rdr.read_u8()? as usize;
				if book > books {
					return Err(HeaderReadError::HeaderBadFormat);
				}
				*sb = book.checked_sub(1).map(|b| b as u8);
			}
			classes.push(Floor1Class {
				dimensions,
				subclass_bits,
				masterbook,
				subbooks,
			});
		}

		let multiplier = rdr.read_u2()? + 1;
		let range_bits = rdr.read_u4()?;
		let mut postlist = vec![0, 1 << range_bits];
		for class in partition_class.iter() {
			let dim = classes[*class as usize].dimensions as usize;
			if postlist.len() - 2 + dim > FLOOR1_MAX_POSTS {
				return Err(HeaderReadError::HeaderBadFormat);
			}
			for _ in 0 .. dim {
				postlist.push(rdr.read(range_bits)?);
			}
		}

		// Repeated x values would result in zero length segments
		let mut sorted = postlist.clone();
		sorted.sort_unstable();
		if sorted.windows(2).any(|w| w[0] == w[1]) {
			return Err(HeaderReadError::HeaderBadFormat);
		}
		Ok(Floor1Config {
			partition_class,
			classes,
			multiplier,
			range_bits,
			postlist,
		})
	}
}

#[derive(Debug, Clone)]
pub(crate) struct Floor1Lookup {
	config :Floor1Config,
	/// Post indices in order of increasing x
	sorted_index :Vec<usize>,
	/// Neighbours of the posts from index 2 on
	lo_neighbor :Vec<usize>,
	hi_neighbor :Vec<usize>,
	quant_q :i32,
}

impl Floor1Lookup {
	pub fn new(config :&Floor1Config) -> Self {
		let posts = &config.postlist;
		let mut sorted_index = (0 .. posts.len()).collect::<Vec<_>>();
		sorted_index.sort_by_key(|i| posts[*i]);
		let quant_q = match config.multiplier {
			1 => 256,
			2 => 128,
			3 => 86,
			_ => 64,
		};

		// The neighbours of a post are the closest ones below and
		// above it among the posts coded before it.
		let n = posts[1];
		let mut lo_neighbor = Vec::with_capacity(posts.len() - 2);
		let mut hi_neighbor = Vec::with_capacity(posts.len() - 2);
		for i in 2 .. posts.len() {
			let current = posts[i];
			let (mut lo, mut hi) = (0, 1);
			let (mut lx, mut hx) = (0, n);
			for (j, &x) in posts[.. i].iter().enumerate() {
				if x > lx && x < current {
					lo = j;
					lx = x;
				}
				if x < hx && x > current {
					hi = j;
					hx = x;
				}
			}
			lo_neighbor.push(lo);
			hi_neighbor.push(hi);
		}
		Floor1Lookup {
			config : config.clone(),
			sorted_index,
			lo_neighbor,
			hi_neighbor,
			quant_q,
		}
	}

	/// Reads the post values of a block.
	///
	/// Returns `None` if the floor is unused in this block,
	/// or if the packet ended early.
	pub fn decode(&self, codebooks :&[Codebook], rdr :&mut BitpackCursor) -> Option<Vec<i32>> {
		if !rdr.read_bit_flag().ok()? {
			return None;
		}
		let cfg = &self.config;
		let posts = &cfg.postlist;
		let mut fit = vec![0i32; posts.len()];
		let ybits = ilog(self.quant_q as u64 - 1);
		fit[0] = rdr.read(ybits).ok()? as i32;
		fit[1] = rdr.read(ybits).ok()? as i32;

		let mut j = 2;
		for class in cfg.partition_class.iter() {
			let class = &cfg.classes[*class as usize];
			let cdim = class.dimensions as usize;
			let csubbits = class.subclass_bits;
			let csub = 1u32 << csubbits;
			let mut cval = if csubbits > 0 {
				codebooks[class.masterbook as usize].decode_entry(rdr).ok()?
			} else {
				0
			};
			for k in 0 .. cdim {
				let book = class.subbooks[(cval & (csub - 1)) as usize];
				cval >>= csubbits;
				fit[j + k] = match book {
					Some(b) => codebooks[b as usize].decode_entry(rdr).ok()? as i32,
					None => 0,
				};
			}
			j += cdim;
		}

		// Unwrap the values and add the predictions
		for i in 2 .. posts.len() {
			let lo = self.lo_neighbor[i - 2];
			let hi = self.hi_neighbor[i - 2];
			let predicted = render_point(posts[lo], fit[lo], posts[hi], fit[hi], posts[i]);
			let hiroom = self.quant_q - predicted;
			let loroom = predicted;
			let room = hiroom.min(loroom) << 1;
			let mut val = fit[i];
			if val != 0 {
				if val >= room {
					if hiroom > loroom {
						val -= loroom;
					} else {
						val = -1 - (val - hiroom);
					}
				} else if val & 1 == 1 {
					val = -((val + 1) >> 1);
				} else {
					val >>= 1;
				}
				fit[i] = (val + predicted) & 0x7fff;
				fit[lo] &= 0x7fff;
				fit[hi] &= 0x7fff;
			} else {
				fit[i] = predicted | UNCODED_FLAG;
			}
		}
		Some(fit)
	}

	/// Multiplies the floor curve into `out`,
	/// or zeroes it if there is no curve for this block.
	pub fn apply(&self, fit :Option<&[i32]>, out :&mut [f32]) {
		let fit = match fit {
			Some(f) => f,
			None => {
				for v in out.iter_mut() {
					*v = 0.;
				}
				return;
			},
		};
		let mult = self.config.multiplier as i32;
		let posts = &self.config.postlist;
		let mut hx = 0;
		let mut lx = 0;
		let mut ly = (fit[0] * mult).max(0).min(255);
		for &current in self.sorted_index[1 ..].iter() {
			let hy = fit[current] & 0x7fff;
			if hy == fit[current] {
				hx = posts[current] as usize;
				let hy = (hy * mult).max(0).min(255);
				render_line(lx, ly, hx, hy, out);
				lx = hx;
				ly = hy;
			}
		}
		for v in out.iter_mut().skip(hx) {
			*v *= FLOOR1_INVERSE_DB_TABLE[ly as usize];
		}
	}
}

/// Interpolates the y value at `x` on the line between two posts
fn render_point(x0 :u32, y0 :i32, x1 :u32, y1 :i32, x :u32) -> i32 {
	let y0 = y0 & 0x7fff;
	let y1 = y1 & 0x7fff;
	let dy = y1 - y0;
	let adx = (x1 - x0) as i32;
	let ady = dy.abs();
	let err = ady * (x - x0) as i32;
	let off = err / adx;
	if dy < 0 {
		y0 - off
	} else {
		y0 + off
	}
}

#[test]
fn test_render_point() {
	// Test data taken from real life ogg/vorbis file.
	assert_eq!(render_point(0, 28, 128, 67, 12), 31);
	assert_eq!(render_point(12, 38, 128, 67, 46), 46);
	assert_eq!(render_point(0, 28, 12, 38, 4), 31);
	assert_eq!(render_point(4, 33, 12, 38, 8), 35);
	assert_eq!(render_point(12, 38, 46, 31, 16), 38);
	assert_eq!(render_point(16, 30, 46, 31, 23), 30);
	assert_eq!(render_point(23, 40, 46, 31, 33), 37);
	assert_eq!(render_point(46, 31, 128, 67, 70), 41);
	assert_eq!(render_point(0, 28, 4, 33, 2), 30);
	assert_eq!(render_point(4, 33, 8, 43, 6), 38);
	assert_eq!(render_point(8, 43, 12, 38, 10), 41);
	assert_eq!(render_point(12, 38, 16, 30, 14), 34);
	assert_eq!(render_point(16, 30, 23, 40, 19), 34);
	assert_eq!(render_point(23, 40, 33, 26, 28), 33);
	assert_eq!(render_point(33, 26, 46, 31, 39), 28);
	assert_eq!(render_point(46, 31, 70, 20, 58), 26);
	assert_eq!(render_point(70, 20, 128, 67, 90), 36);
	// The uncoded flag is ignored
	assert_eq!(render_point(0, 28 | 0x8000, 128, 67, 12), 31);
}

/// Multiplies the segment `x0 .. x1` of `d` with the dB curve between
/// `y0` and `y1`, stepping along integer y values.
///
/// Positions at or beyond the end of `d` are left alone.
fn render_line(x0 :usize, y0 :i32, x1 :usize, y1 :i32, d :&mut [f32]) {
	let dy = y1 - y0;
	let adx = (x1 - x0) as i32;
	let base = dy / adx;
	let sy = if dy < 0 { base - 1 } else { base + 1 };
	let ady = dy.abs() - (base * adx).abs();
	let n = d.len().min(x1);
	let mut y = y0;
	let mut err = 0;
	if x0 < n {
		d[x0] *= FLOOR1_INVERSE_DB_TABLE[y as usize];
	}
	for v in d[.. n].iter_mut().skip(x0 + 1) {
		err += ady;
		if err >= adx {
			err -= adx;
			y += sy;
		} else {
			y += base;
		}
		*v *= FLOOR1_INVERSE_DB_TABLE[y as usize];
	}
}

#[cfg(test)]
fn db_table_index(v :f32) -> usize {
	FLOOR1_INVERSE_DB_TABLE.iter().position(|t| *t == v).unwrap()
}

#[test]
fn test_render_line() {
	let mut d = vec![1.; 10];
	render_line(0, 10, 8, 14, &mut d);
	let ys = d.iter().map(|v| db_table_index(*v)).collect::<Vec<_>>();
	assert_eq!(&ys[.. 8], &[10, 10, 11, 11, 12, 12, 13, 13]);
	// Beyond x1 untouched
	assert_eq!(d[8], 1.);

	// Steep and falling
	let mut d = vec![1.; 4];
	render_line(0, 200, 4, 10, &mut d);
	let ys = d.iter().map(|v| db_table_index(*v)).collect::<Vec<_>>();
	assert_eq!(ys, &[200, 153, 105, 58]);

	// Clipped to the buffer
	let mut d = vec![1.; 3];
	render_line(1, 0, 128, 0, &mut d);
	assert_eq!(d[0], 1.);
	assert_eq!(d[1], FLOOR1_INVERSE_DB_TABLE[0]);
	assert_eq!(d[2], FLOOR1_INVERSE_DB_TABLE[0]);
}

#[cfg(test)]
fn lookup_from_postlist(postlist :&[u32]) -> Floor1Lookup {
	Floor1Lookup::new(&Floor1Config {
		partition_class : Vec::new(),
		classes : Vec::new(),
		multiplier : 1,
		range_bits : 7,
		postlist : postlist.to_vec(),
	})
}

#[test]
fn test_neighbors() {
	// Data extracted from example file
	let look = lookup_from_postlist(&[0, 128, 12, 46, 4, 8, 16, 23,
		33, 70, 2, 6, 10, 14, 19, 28, 39, 58, 90]);
	assert_eq!(look.lo_neighbor, &[0, 2, 0, 4, 2, 6, 7, 3, 0, 4, 5, 2, 6, 7, 8, 3, 9]);
	assert_eq!(look.hi_neighbor, &[1, 1, 2, 2, 3, 3, 3, 1, 4, 5, 2, 6, 7, 8, 3, 9, 1]);
	assert_eq!(look.sorted_index, &[0, 10, 4, 11, 5, 12, 2, 13, 6,
		14, 7, 15, 8, 16, 3, 17, 9, 18, 1]);
}

#[test]
fn test_floor1_decode_and_apply() {
	use crate::bitpacking::BitpackWriter;
	use crate::codebook::StaticCodebook;

	let book = Codebook::from_static(&StaticCodebook {
		dimensions : 1,
		entries : 4,
		codeword_lengths : vec![2; 4],
		vq_lookup : None,
	}).unwrap();
	let mut subbooks = [None; 8];
	subbooks[0] = Some(0);
	let look = Floor1Lookup::new(&Floor1Config {
		partition_class : vec![0],
		classes : vec![Floor1Class {
			dimensions : 2,
			subclass_bits : 0,
			masterbook : 0,
			subbooks,
		}],
		multiplier : 1,
		range_bits : 7,
		postlist : vec![0, 128, 64, 32],
	});

	let mut w = BitpackWriter::new();
	w.write_flag(true).write(100, 8).write(100, 8);
	w.write_codeword(3, 2).write_codeword(0, 2);
	let data = w.into_inner();
	let mut rdr = BitpackCursor::new(&data);
	let fit = look.decode(&[book.clone()], &mut rdr).unwrap();
	// 3 is odd and below the room: -2 off the prediction of 100.
	// The last post is uncoded and predicted from 100 and 98.
	assert_eq!(fit, &[100, 100, 98, 99 | UNCODED_FLAG]);

	let mut out = vec![1.; 128];
	look.apply(Some(&fit), &mut out);
	assert_eq!(out[0], FLOOR1_INVERSE_DB_TABLE[100]);
	assert_eq!(out[64], FLOOR1_INVERSE_DB_TABLE[98]);
	assert_eq!(out[96], FLOOR1_INVERSE_DB_TABLE[99]);
	assert_eq!(out[127], FLOOR1_INVERSE_DB_TABLE[99]);

	// Unused floor
	let data = [0u8];
	let mut rdr = BitpackCursor::new(&data);
	assert_eq!(look.decode(&[book.clone()], &mut rdr), None);
	look.apply(None, &mut out);
	assert!(out.iter().all(|v| *v == 0.));

	// Packet ends within the posts
	let data = [0xff, 0x01];
	let mut rdr = BitpackCursor::new(&data);
	assert_eq!(look.decode(&[book], &mut rdr), None);
}

#[test]
fn test_floor1_unpack() {
	use crate::bitpacking::BitpackWriter;
	use crate::codebook::StaticCodebook;

	let book = Codebook::from_static(&StaticCodebook {
		dimensions : 1,
		entries : 2,
		codeword_lengths : vec![1; 2],
		vq_lookup : None,
	}).unwrap();
	let books = vec![book.clone(), book];

	let write = |posts :&[u32]| {
		let mut w = BitpackWriter::new();
		// two partitions of class 0
		w.write(2, 5).write(0, 4).write(0, 4);
		// class 0: dim 2, one subclass bit, masterbook 1, subbooks none and 0
		w.write(1, 3).write(1, 2).write(1, 8);
		w.write(0, 8).write(1, 8);
		// multiplier 2, range bits 8
		w.write(1, 2).write(8, 4);
		for p in posts {
			w.write(*p, 8);
		}
		w.into_inner()
	};
	let data = write(&[10, 20, 30, 40]);
	let mut rdr = BitpackCursor::new(&data);
	let cfg = Floor1Config::unpack(&mut rdr, &books).unwrap();
	assert_eq!(cfg.postlist, &[0, 256, 10, 20, 30, 40]);
	assert_eq!(cfg.multiplier, 2);
	assert_eq!(cfg.classes[0].subbooks[.. 2], [None, Some(0)]);
	assert_eq!(Floor1Lookup::new(&cfg).quant_q, 128);

	// Repeated post
	let data = write(&[10, 20, 10, 40]);
	let mut rdr = BitpackCursor::new(&data);
	assert_eq!(Floor1Config::unpack(&mut rdr, &books).err(),
		Some(HeaderReadError::HeaderBadFormat));

	// Masterbook out of range
	let mut w = BitpackWriter::new();
	w.write(1, 5).write(0, 4);
	w.write(0, 3).write(1, 2).write(2, 8);
	let data = w.into_inner();
	let mut rdr = BitpackCursor::new(&data);
	assert_eq!(Floor1Config::unpack(&mut rdr, &books).err(),
		Some(HeaderReadError::HeaderBadFormat));
}

/// Linear amplitudes of the 256 floor 1 dB steps
static FLOOR1_INVERSE_DB_TABLE :[f32; 256] = [
	1.0649863e-07, 1.1341951e-07, 1.2079015e-07, 1.2863978e-07,
	1.3699951e-07, 1.4590251e-07, 1.5538408e-07, 1.6548181e-07,
	1.7623575e-07, 1.8768855e-07, 1.9988561e-07, 2.1287530e-07,
	2.2670913e-07, 2.4144197e-07, 2.5713223e-07, 2.7384213e-07,
	2.9163793e-07, 3.1059021e-07, 3.3077411e-07, 3.5226968e-07,
	3.7516214e-07, 3.9954229e-07, 4.2550680e-07, 4.5315863e-07,
	4.8260743e-07, 5.1396998e-07, 5.4737065e-07, 5.8294187e-07,
	6.2082472e-07, 6.6116941e-07, 7.0413592e-07, 7.4989464e-07,
	7.9862701e-07, 8.5052630e-07, 9.0579828e-07, 9.6466216e-07,
	1.0273513e-06, 1.0941144e-06, 1.1652161e-06, 1.2409384e-06,
	1.3215816e-06, 1.4074654e-06, 1.4989305e-06, 1.5963394e-06,
	1.7000785e-06, 1.8105592e-06, 1.9282195e-06, 2.0535261e-06,
	2.1869758e-06, 2.3290978e-06, 2.4804557e-06, 2.6416497e-06,
	2.8133190e-06, 2.9961443e-06, 3.1908506e-06, 3.3982101e-06,
	3.6190449e-06, 3.8542308e-06, 4.1047004e-06, 4.3714470e-06,
	4.6555282e-06, 4.9580707e-06, 5.2802740e-06, 5.6234160e-06,
	5.9888572e-06, 6.3780469e-06, 6.7925283e-06, 7.2339451e-06,
	7.7040476e-06, 8.2047000e-06, 8.7378876e-06, 9.3057248e-06,
	9.9104632e-06, 1.0554501e-05, 1.1240392e-05, 1.1970856e-05,
	1.2748789e-05, 1.3577278e-05, 1.4459606e-05, 1.5399272e-05,
	1.6400004e-05, 1.7465768e-05, 1.8600792e-05, 1.9809576e-05,
	2.1096914e-05, 2.2467911e-05, 2.3928002e-05, 2.5482978e-05,
	2.7139006e-05, 2.8902651e-05, 3.0780908e-05, 3.2781225e-05,
	3.4911534e-05, 3.7180282e-05, 3.9596466e-05, 4.2169667e-05,
	4.4910090e-05, 4.7828601e-05, 5.0936773e-05, 5.4246931e-05,
	5.7772202e-05, 6.1526565e-05, 6.5524908e-05, 6.9783085e-05,
	7.4317983e-05, 7.9147585e-05, 8.4291040e-05, 8.9768747e-05,
	9.5602426e-05, 0.00010181521, 0.00010843174, 0.00011547824,
	0.00012298267, 0.00013097477, 0.00013948625, 0.00014855085,
	0.00015820453, 0.00016848555, 0.00017943469, 0.00019109536,
	0.00020351382, 0.00021673929, 0.00023082423, 0.00024582449,
	0.00026179955, 0.00027881276, 0.00029693158, 0.00031622787,
	0.00033677814, 0.00035866388, 0.00038197188, 0.00040679456,
	0.00043323036, 0.00046138411, 0.00049136745, 0.00052329927,
	0.00055730621, 0.00059352311, 0.00063209358, 0.00067317058,
	0.00071691700, 0.00076350630, 0.00081312324, 0.00086596457,
	0.00092223983, 0.00098217216, 0.0010459992,  0.0011139742,
	0.0011863665,  0.0012634633,  0.0013455702,  0.0014330129,
	0.0015261382,  0.0016253153,  0.0017309374,  0.0018434235,
	0.0019632195,  0.0020908006,  0.0022266726,  0.0023713743,
	0.0025254795,  0.0026895994,  0.0028643847,  0.0030505286,
	0.0032487691,  0.0034598925,  0.0036847358,  0.0039241906,
	0.0041792066,  0.0044507950,  0.0047400328,  0.0050480668,
	0.0053761186,  0.0057254891,  0.0060975636,  0.0064938176,
	0.0069158225,  0.0073652516,  0.0078438871,  0.0083536271,
	0.0088964928,  0.009474637,   0.010090352,   0.010746080,
	0.011444421,   0.012188144,   0.012980198,   0.013823725,
	0.014722068,   0.015678791,   0.016697687,   0.017782797,
	0.018938423,   0.020169149,   0.021479854,   0.022875735,
	0.024362330,   0.025945531,   0.027631618,   0.029427276,
	0.031339626,   0.033376252,   0.035545228,   0.037855157,
	0.040315199,   0.042935108,   0.045725273,   0.048696758,
	0.051861348,   0.055231591,   0.058820850,   0.062643361,
	0.066714279,   0.071049749,   0.075666962,   0.080584227,
	0.085821044,   0.091398179,   0.097337747,   0.10366330,
	0.11039993,    0.11757434,    0.12521498,    0.13335215,
	0.14201813,    0.15124727,    0.16107617,    0.17154380,
	0.18269168,    0.19456402,    0.20720788,    0.22067342,
	0.23501402,    0.25028656,    0.26655159,    0.28387361,
	0.30232132,    0.32196786,    0.34289114,    0.36517414,
	0.38890521,    0.41417847,    0.44109412,    0.46975890,
	0.50028648,    0.53279791,    0.56742212,    0.60429640,
	0.64356699,    0.68538959,    0.72993007,    0.77736504,
	0.82788260,    0.88168307,    0.9389798,     1.];
