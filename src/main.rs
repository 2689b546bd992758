use clap::Parser;

use opengled::cli::Args;

fn main() -> anyhow::Result<()> {
    opengled::run(Args::parse())
}
