use std::path::Path;

use anyhow::Context;
use ffmpeg_mux::config::MuxConfig;

/// Reads a JSON job description. Missing fields keep their defaults; no path
/// runs the default job.
pub fn load(path: Option<&Path>) -> anyhow::Result<MuxConfig> {
    let Some(path) = path else {
        log::info!("no config given, using defaults");
        return Ok(MuxConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: MuxConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    log::info!("loaded config from {}", path.display());
    Ok(config)
}
