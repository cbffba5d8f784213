use clap::Parser;
use miette::Result;

use s7k_tool::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();
    log::debug!("s7k-tool {}", s7k_tool::VERSION);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let summaries = s7k_tool::run(&cli, &mut out).map_err(|e| miette::miette!("{:#}", e))?;

    if summaries.iter().any(|s| s.stats.pings == 0 && !cli.records) {
        log::warn!("Some files produced no pings");
    }
    Ok(())
}
