/// Registers FFmpeg components. Call once at startup before building a job.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

pub mod adapter;
pub mod adts;
pub mod audio_adapter;
pub mod bsf;
pub mod config;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod job;
pub mod muxer;
pub mod output;
pub mod pacer;
pub mod packet;
pub mod pipeline;
pub mod scaler;
pub mod sink;
pub mod source;
pub mod stream;
pub mod timestamp;
pub mod video_adapter;

#[cfg(test)]
mod testing;

pub use error::{MuxError, Result};
