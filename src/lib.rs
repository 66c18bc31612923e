#![warn(clippy::pedantic, elided_lifetimes_in_paths, explicit_outlives_requirements)]
#![allow(non_snake_case)]

//! Condenses the 128KB vertical-shrink line ROM into a 32-entry "magic table"
//! that a tile-based sprite renderer can use to reproduce the same per-line
//! shrinking, and proves the table by rebuilding the ROM from it.

pub const WINDOW_LEN: usize = 256;
pub const SLOTS: usize = 16;
pub const LINES_PER_TILE: usize = 16;
pub const SHRINK_LEVELS: usize = 16;
pub const EXTRACT_LEN: usize = SHRINK_LEVELS * WINDOW_LEN;
pub const VSHRINK_CODES: usize = 256;
pub const HALF_ROM_LEN: usize = VSHRINK_CODES * WINDOW_LEN;
pub const ROM_LEN: usize = 2 * HALF_ROM_LEN;
pub const MAGIC_LEN: usize = 2 * SLOTS;

/// Ends the entries of a window; everything after it is padding.
pub const SENTINEL: u8 = 0xFF;

pub use error::{Error, Result};

pub mod error {
	use thiserror::Error;

	pub type Result<T, E = Error> = core::result::Result<T, E>;

	#[derive(Debug, Error)]
	pub enum Error {
		#[error("malformed line ROM: {len} bytes, at least {} are required", crate::EXTRACT_LEN)]
		TooShort { len: usize },

		#[error("malformed line ROM: window {level} has no entries before its sentinel")]
		EmptyWindow { level: usize },

		#[error("malformed line ROM: window {level} reveals no new tile slot")]
		NoNewSlot { level: usize },

		#[error("malformed line ROM: window {level} reveals new tile slots {slots:?}, exactly one was expected")]
		AmbiguousNewSlots { level: usize, slots: Vec<u8> },

		#[error("malformed line ROM: tile slot {slot} of the previous window is missing from window {level}")]
		SlotVanished { level: usize, slot: u8 },

		#[error("invalid shrink sequence: tile slot {slot} is out of range")]
		SlotOutOfRange { slot: u8 },

		#[error("invalid shrink sequence: tile slot {slot} appears more than once")]
		DuplicateSlot { slot: u8 },

		#[error("invalid magic table: entry {index} is {found}, its mirror requires {expected}")]
		MirrorMismatch { index: usize, expected: u8, found: u8 },

		#[error("invalid magic table report: shrinkSequence {found:?} does not match the table, which gives {expected:?}")]
		SequenceMismatch { expected: [u8; crate::SLOTS], found: [u8; crate::SLOTS] },

		#[error(
			"verification failed, the derived magic table does not reproduce the line ROM (derivation bug, not \
			 bad input): {0}"
		)]
		VerificationFailed(Mismatch),

		#[error("invalid magic table report")]
		ReportSyntax(#[from] toml::de::Error),

		#[error("cannot render magic table report")]
		ReportRender(#[from] toml::ser::Error),
	}

	impl Error {
		#[must_use]
		pub fn isMalformedRom(&self) -> bool {
			matches!(
				self,
				Error::TooShort { .. }
					| Error::EmptyWindow { .. }
					| Error::NoNewSlot { .. }
					| Error::AmbiguousNewSlots { .. }
					| Error::SlotVanished { .. }
			)
		}
	}

	#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
	pub enum Mismatch {
		#[error("line ROM is {rom} bytes, the reconstruction is {rebuilt}")]
		Length { rom: usize, rebuilt: usize },

		#[error("byte {offset:#07X} is {rom:#04X} in the line ROM but {rebuilt:#04X} in the reconstruction")]
		Byte { offset: usize, rom: u8, rebuilt: u8 },
	}
}

pub mod magic {
	use {
		crate::{Error, Result, LINES_PER_TILE, MAGIC_LEN, SLOTS},
		array_macro::array,
		core::mem,
	};

	/// Tile slots in the order they become visible, one per shrink level.
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct ShrinkSequence(pub [u8; SLOTS]);

	/// Entries `0..16` hold the shrink position of each tile slot, entries `16..32` the same values
	/// mirrored, for sprites addressing the line ROM backwards.
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct MagicTable([u8; MAGIC_LEN]);

	fn checkPermutation(values: &[u8; SLOTS]) -> Result<()> {
		let mut seen = [false; SLOTS];
		for &slot in values {
			let seenSlot = seen.get_mut(slot as usize).ok_or(Error::SlotOutOfRange { slot })?;
			if mem::replace(seenSlot, true) {
				return Err(Error::DuplicateSlot { slot });
			}
		}
		Ok(())
	}

	impl MagicTable {
		pub fn fromSequence(sequence: &ShrinkSequence) -> Result<MagicTable> {
			let ShrinkSequence(slots) = sequence;
			checkPermutation(slots)?;
			let mut half = [0_u8; SLOTS];
			for (position, &slot) in slots.iter().enumerate() {
				half[slot as usize] = position as _;
			}
			Ok(MagicTable(array![i => if i < SLOTS { half[i] } else { half[MAGIC_LEN - 1 - i] }; MAGIC_LEN]))
		}

		/// Accepts a table from outside, e.g. a compiled-in constant or a TOML report.
		pub fn fromEntries(entries: [u8; MAGIC_LEN]) -> Result<MagicTable> {
			checkPermutation(&array![i => entries[i]; SLOTS])?;
			for index in SLOTS..MAGIC_LEN {
				let (expected, found) = (entries[MAGIC_LEN - 1 - index], entries[index]);
				if expected != found {
					return Err(Error::MirrorMismatch { index, expected, found });
				}
			}
			Ok(MagicTable(entries))
		}

		#[must_use]
		pub fn entries(&self) -> &[u8; MAGIC_LEN] {
			&self.0
		}

		#[must_use]
		pub fn sequence(&self) -> ShrinkSequence {
			let mut slots = [0_u8; SLOTS];
			for (slot, &position) in self.0[..SLOTS].iter().enumerate() {
				slots[position as usize] = slot as _;
			}
			ShrinkSequence(slots)
		}

		/// Height in pixels of tile `tile` of a sprite drawn with shrink code `vshrink`,
		/// e.g. 12 means the tile is shrunk from 16 lines to 12.
		/// Tiles `16..32` read the mirrored half.
		///
		/// # Panics
		/// When `tile >= 32`.
		#[must_use]
		pub fn tileHeight(&self, vshrink: u8, tile: usize) -> u8 {
			const LINES: u16 = LINES_PER_TILE as _;
			let v = u16::from(vshrink) + 1;
			let mut height = v / LINES;
			if v % LINES > u16::from(self.0[tile]) {
				height += 1;
			}
			height as _
		}

		/// Whether line `line` (`0..16`) of a tile `height` pixels tall is drawn.
		///
		/// # Panics
		/// When `line >= 32`.
		#[must_use]
		pub fn lineIsDrawn(&self, height: u8, line: usize) -> bool {
			height > self.0[line]
		}

		/// Bit `y` is set when line `y` is drawn.
		#[must_use]
		pub fn drawnLines(&self, height: u8) -> u16 {
			(0..LINES_PER_TILE).filter(|&line| self.lineIsDrawn(height, line)).fold(0, |mask, line| mask | 1 << line)
		}
	}

}

pub mod rom {
	use {
		crate::{
			error::Mismatch,
			magic::{MagicTable, ShrinkSequence},
			Error, Result, EXTRACT_LEN, LINES_PER_TILE, ROM_LEN, SENTINEL, SLOTS, WINDOW_LEN,
		},
		memchr::memchr,
		tracing::{debug, error, info},
	};

	/// Finds which tile slot shows up first at each of the 16 smallest shrink levels.
	///
	/// A table whose sequence starts with slot 15 cannot be recovered: its only entry at level 0 is
	/// `(15 << 4) | 15`, which equals `SENTINEL`, so window 0 reads as empty.
	pub fn extractSequence(rom: &[u8]) -> Result<ShrinkSequence> {
		if rom.len() < EXTRACT_LEN {
			return Err(Error::TooShort { len: rom.len() });
		}
		let (mut sequence, mut previous) = ([0_u8; SLOTS], [false; SLOTS]);
		for (level, window) in rom[..EXTRACT_LEN].chunks_exact(WINDOW_LEN).enumerate() {
			let entries = &window[..memchr(SENTINEL, window).unwrap_or(window.len())];
			if entries.is_empty() {
				return Err(Error::EmptyWindow { level });
			}
			let mut present = [false; SLOTS];
			for &entry in entries {
				present[(entry >> 4) as usize] = true;
			}
			if let Some(slot) = (0..SLOTS).find(|&slot| previous[slot] && !present[slot]) {
				return Err(Error::SlotVanished { level, slot: slot as _ });
			}
			let newSlots: Vec<u8> =
				(0..SLOTS).filter(|&slot| present[slot] && !previous[slot]).map(|slot| slot as _).collect();
			match newSlots.len() {
				0 => return Err(Error::NoNewSlot { level }),
				1 => sequence[level] = newSlots[0],
				_ => return Err(Error::AmbiguousNewSlots { level, slots: newSlots }),
			}
			debug!(level, entries = entries.len(), newSlot = sequence[level], "scanned shrink window");
			previous = present;
		}
		Ok(ShrinkSequence(sequence))
	}

	/// Extracts the shrink sequence and inverts it into the magic table, without verifying it.
	pub fn magicTable(rom: &[u8]) -> Result<MagicTable> {
		let sequence = extractSequence(rom)?;
		info!(sequence = ?sequence.0, "extracted shrink sequence");
		MagicTable::fromSequence(&sequence)
	}

	/// Rebuilds the whole line ROM: one window per shrink code, every visible `(tile << 4) | line`
	/// pair in tile then line order, padded with the sentinel, the whole thing twice.
	#[must_use]
	pub fn reconstruct(magic: &MagicTable) -> Vec<u8> {
		let mut rom = Vec::with_capacity(ROM_LEN);
		for vshrink in 0..=u8::MAX {
			for tile in 0..SLOTS {
				let height = magic.tileHeight(vshrink, tile);
				if height == 0 {
					continue;
				}
				rom.extend(
					(0..LINES_PER_TILE)
						.filter(|&line| magic.lineIsDrawn(height, line))
						.map(|line| (tile << 4 | line) as u8),
				);
			}
			rom.resize(rom.len().next_multiple_of(WINDOW_LEN), SENTINEL);
		}
		rom.extend_from_within(..);
		rom
	}

	pub fn verify(rom: &[u8], magic: &MagicTable) -> Result<()> {
		let rebuilt = reconstruct(magic);
		let mismatch = match rom.iter().zip(&rebuilt).position(|(a, b)| a != b) {
			Some(offset) => Mismatch::Byte { offset, rom: rom[offset], rebuilt: rebuilt[offset] },
			None if rom.len() != rebuilt.len() => Mismatch::Length { rom: rom.len(), rebuilt: rebuilt.len() },
			None => {
				info!(bytes = rom.len(), "reconstruction matches the line ROM");
				return Ok(());
			}
		};
		error!(%mismatch, "reconstruction differs from the line ROM");
		Err(Error::VerificationFailed(mismatch))
	}

}

pub mod report {
	use {
		crate::{
			magic::{MagicTable, ShrinkSequence},
			Error, Result, MAGIC_LEN, SLOTS,
		},
		clap::ValueEnum,
		const_format::formatcp,
		serde::{Deserialize, Serialize},
	};

	pub const RUST_CONST_PREFIX: &str = formatcp!("pub const VSHRINK_MAGIC: [u8; {}] = ", MAGIC_LEN);

	#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
	pub enum Format {
		/// `[a, b, ...]`
		List,
		/// A Rust constant to compile in
		Rust,
		/// TOML, readable by `magicTOML_into_lineRom`
		Toml,
	}

	#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
	pub struct Report {
		pub shrinkSequence: [u8; SLOTS],
		pub magic: [u8; MAGIC_LEN],
	}

	impl Report {
		#[must_use]
		pub fn new(magic: &MagicTable) -> Report {
			Report { shrinkSequence: magic.sequence().0, magic: *magic.entries() }
		}

		pub fn render(&self, format: Format) -> Result<String> {
			Ok(match format {
				Format::List => format!("{:?}", self.magic),
				Format::Rust => format!("{RUST_CONST_PREFIX}{:?};", self.magic),
				Format::Toml => toml::to_string(self)?,
			})
		}

		/// Reads a TOML report back, checking both halves of the table and that the sequence agrees.
		pub fn parse(toml: &str) -> Result<MagicTable> {
			let Report { shrinkSequence, magic } = toml::from_str(toml)?;
			let magic = MagicTable::fromEntries(magic)?;
			let ShrinkSequence(expected) = magic.sequence();
			if expected != shrinkSequence {
				return Err(Error::SequenceMismatch { expected, found: shrinkSequence });
			}
			Ok(magic)
		}
	}

	#[cfg(test)]
	mod tests {
		use super::*;

		fn table() -> MagicTable {
			MagicTable::fromSequence(&ShrinkSequence([5, 12, 0, 7, 3, 15, 9, 1, 14, 6, 10, 2, 13, 8, 4, 11])).unwrap()
		}

		#[test]
		fn list_and_rust() {
			let report = Report::new(&table());
			let list = "[2, 7, 11, 4, 14, 0, 9, 3, 13, 6, 10, 15, 1, 12, 8, 5, \
			            5, 8, 12, 1, 15, 10, 6, 13, 3, 9, 0, 14, 4, 11, 7, 2]";
			assert_eq!(report.render(Format::List).unwrap(), list);
			assert_eq!(
				report.render(Format::Rust).unwrap(),
				format!("pub const VSHRINK_MAGIC: [u8; 32] = {list};")
			);
		}

		#[test]
		fn toml_is_read_back() {
			let toml = Report::new(&table()).render(Format::Toml).unwrap();
			assert!(toml.contains("shrinkSequence = [5, 12, 0, 7"));
			assert_eq!(Report::parse(&toml).unwrap(), table());
		}

		#[test]
		fn toml_with_a_stale_sequence() {
			let mut report = Report::new(&table());
			report.shrinkSequence.swap(0, 1);
			let toml = report.render(Format::Toml).unwrap();
			assert!(matches!(Report::parse(&toml), Err(Error::SequenceMismatch { .. })));
			assert!(matches!(Report::parse("magic = 3"), Err(Error::ReportSyntax(_))));
		}
	}
}

/// Logs go to stderr, so stdout carries nothing but output; `RUST_LOG` overrides the `info` default.
pub fn initLogging() {
	use tracing_subscriber::EnvFilter;
	tracing_subscriber::fmt()
		.with_writer(std::io::stderr)
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();
}
