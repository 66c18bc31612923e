#![warn(clippy::pedantic, elided_lifetimes_in_paths, explicit_outlives_requirements)]
#![allow(non_snake_case)]

use {
	anyhow::Context,
	clap::Parser,
	std::{
		fs,
		io::{self, Write},
		path::PathBuf,
	},
	tracing::info,
	vshrink_magic::{
		report::{Format, Report},
		rom,
	},
};

fn main() -> anyhow::Result<()> {
	/// Derives the vertical-shrink magic table from the 128KB line ROM (000-lo.lo) and checks that
	/// the table rebuilds the ROM byte for byte.
	#[derive(Parser)]
	#[clap(version)]
	struct Args {
		/// Line ROM image
		#[clap(value_parser)]
		rom: PathBuf,

		#[clap(long, value_enum, default_value = "list")]
		format: Format,
	}
	let Args { rom: romPath, format } = Args::parse();
	vshrink_magic::initLogging();

	let lineRom = fs::read(&romPath).with_context(|| format!("{romPath:?}: cannot read the line ROM"))?;
	info!(path = ?romPath, bytes = lineRom.len(), "read line ROM");
	let magic = rom::magicTable(&lineRom)?;
	rom::verify(&lineRom, &magic)?;

	let stdout = &mut io::stdout().lock();
	writeln!(stdout, "{}", Report::new(&magic).render(format)?)?;
	Ok(())
}
