use std::path::PathBuf;

use ffmpeg_mux::job::MuxJob;

mod config;

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("ffmpeg_mux", log::LevelFilter::Debug)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    ffmpeg_mux::init()?;

    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = config::load(path.as_deref())?;
    let output = config.output.path.clone();

    let summary = tokio::task::spawn_blocking(move || MuxJob::new(config).run())
        .await?
        .inspect_err(|e| log::error!("mux job failed: {}", e))?;

    log::info!(
        "wrote {}: {} packets, {} bytes",
        output,
        summary.packets(),
        summary.bytes()
    );
    Ok(())
}
