use clap::Parser;
use workshop_operator::cli;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    cli.run()
}
