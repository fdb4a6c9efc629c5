use clap::Parser;
use tracing::{error, info};

use aquatone::{setup_logging, runner, Cli};

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    setup_logging(args.verbose).map_err(|err| anyhow::anyhow!("{err}"))?;

    let config = args.to_config();
    if let Err(err) = config.validate() {
        error!("{err}");
        std::process::exit(1);
    }

    info!("Starting {} v{}", aquatone::NAME, aquatone::VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.threads)
        .enable_all()
        .build()?;

    if let Err(err) = runtime.block_on(runner::run(config)) {
        error!("{err}");
        std::process::exit(1);
    }

    Ok(())
}
