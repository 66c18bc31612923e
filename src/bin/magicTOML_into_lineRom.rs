#![warn(clippy::pedantic, elided_lifetimes_in_paths, explicit_outlives_requirements)]
#![allow(non_snake_case)]

use {
	anyhow::Context,
	std::io::{self, Read, Write},
	tracing::info,
	vshrink_magic::{report::Report, rom},
};

fn main() -> anyhow::Result<()> {
	vshrink_magic::initLogging();
	let toml = &mut String::new();
	io::stdin().read_to_string(toml).context("cannot read the TOML report from stdin")?;
	let magic = Report::parse(toml)?;
	let lineRom = rom::reconstruct(&magic);
	info!(bytes = lineRom.len(), "rebuilt line ROM");
	let stdout = &mut io::stdout().lock();
	stdout.write_all(&lineRom)?;
	stdout.flush()?;
	Ok(())
}
