use clap::Parser;
use xdcc_get::{app, args::Args, config_io};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = match args.config.clone() {
        Some(path) => path,
        None => config_io::default_config_path()?,
    };
    let cfg = config_io::load_or_create_config(&config_path).await?;

    let settings = app::Settings::resolve(args, cfg)?;
    xdcc_get::config::init_tracing(&settings.log_level);
    tracing::debug!(config = %config_path.display(), "xdcc-get booted");

    app::run(settings).await
}
