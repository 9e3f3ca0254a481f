use std::fs::File;
use std::io::BufWriter;

use ffmpeg_next::codec::Id;
use ffmpeg_next::format::Pixel;

use crate::adts::AdtsFramer;
use crate::audio_adapter::{AudioAdapter, AudioLayout};
use crate::bsf::{AnnexBFramer, BitstreamFramer, ParameterSetPolicy};
use crate::config::{AudioConfig, ContainerFormat, MuxConfig, VideoConfig};
use crate::encoder::{EncoderSession, FfmpegEncoder};
use crate::error::{MuxError, Result, Stage};
use crate::output::{Container, FfmpegOutput};
use crate::pacer::Pacer;
use crate::pipeline::{Pipeline, RunSummary, StreamContext};
use crate::scaler::PictureLayout;
use crate::sink::{ElementarySink, UnitStreamSink};
use crate::source::{PatternSource, SineSource};
use crate::stream::{MediaKind, StreamSpec};
use crate::video_adapter::VideoAdapter;

fn configure_error(what: &str, err: anyhow::Error) -> MuxError {
    MuxError::configuration(format!("{}: {:#}", what, err))
}

/// Builds and runs one encode-and-mux job from a [`MuxConfig`], using the
/// synthetic sources.
pub struct MuxJob {
    config: MuxConfig,
}

impl MuxJob {
    pub fn new(config: MuxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    pub fn run(self) -> Result<RunSummary> {
        self.config.validate()?;
        let path = self.config.output.path.clone();
        log::info!(
            "mux job: {:?} output to {}, {} s",
            self.config.output.format,
            path,
            self.config.duration
        );
        match self.config.output.format {
            ContainerFormat::Mpegts => self.run_with(FfmpegOutput::new(&path, Some("mpegts"))?),
            ContainerFormat::Units => self.run_with(UnitStreamSink::new(create(&path)?)),
            ContainerFormat::Elementary => self.run_with(ElementarySink::new(create(&path)?)),
        }
    }

    /// Runs against any container. Every stream is configured before the
    /// header is written.
    pub fn run_with<C: Container>(&self, container: C) -> Result<RunSummary> {
        self.config.validate()?;
        let global_header = self
            .config
            .output
            .global_header
            .unwrap_or(container.wants_global_header());
        let mut pipeline = Pipeline::new(container, Pacer::new(self.config.priority.clone()));

        if let Some(video) = &self.config.video {
            self.add_video(&mut pipeline, video, global_header)?;
        }
        if let Some(audio) = &self.config.audio {
            self.add_audio(&mut pipeline, audio, global_header)?;
        }

        let summary = pipeline.run()?;
        for stream in &summary.streams {
            log::info!(
                "stream {} ({}): {} packets, {} bytes, {:.3} s",
                stream.index,
                stream.kind,
                stream.packets,
                stream.bytes,
                stream.duration_secs()
            );
        }
        Ok(summary)
    }

    fn add_audio<C: Container>(
        &self,
        pipeline: &mut Pipeline<C>,
        config: &AudioConfig,
        global_header: bool,
    ) -> Result<usize> {
        let index = pipeline.next_stream_index();
        let backend =
            FfmpegEncoder::audio(config, global_header).map_err(|e| configure_error("audio", e))?;
        let codec_id = backend.codec_id();
        let framer = if codec_id == Id::AAC && !global_header {
            let adts = AdtsFramer::new(config.sample_rate, config.profile, config.channels)
                .map_err(|e| MuxError::configuration(format!("audio: {}", e)))?;
            Some(BitstreamFramer::Audio(adts))
        } else {
            None
        };
        let mut session = EncoderSession::new(index, backend);
        let info = session.open()?;

        let format = session
            .backend()
            .sample_format()
            .ok_or_else(|| MuxError::configuration("audio encoder has no sample format"))?;
        let target = AudioLayout::new(format, config.channels, config.sample_rate);
        let source = AudioLayout::new(
            config.source_format.to_ffmpeg(),
            config.channels,
            config.source_rate(),
        );
        let frame_size = info.frame_size.unwrap_or(1024);
        let adapter = AudioAdapter::new(source, target, frame_size, !info.small_last_frame)
            .map_err(|e| configure_error("audio adapter", e))?;
        let sine = SineSource::new(source, frame_size, self.config.duration)
            .map_err(|e| configure_error("audio source", e))?;

        let mut spec = StreamSpec::new(MediaKind::Audio, codec_id, info.time_base)
            .with_output_time_base(self.config.output.time_base());
        if let Some(parameters) = info.parameters {
            spec = spec.with_parameters(parameters);
        }
        let lane = StreamContext::new(MediaKind::Audio, sine, adapter, session, framer);
        pipeline.add_stream(spec, lane)
    }

    fn add_video<C: Container>(
        &self,
        pipeline: &mut Pipeline<C>,
        config: &VideoConfig,
        global_header: bool,
    ) -> Result<usize> {
        let index = pipeline.next_stream_index();
        let backend =
            FfmpegEncoder::video(config, global_header).map_err(|e| configure_error("video", e))?;
        let codec_id = backend.codec_id();
        let mut session = EncoderSession::new(index, backend);
        let info = session.open()?;

        let (source_width, source_height) = config.source_size();
        let pattern = PatternSource::new(
            source_width,
            source_height,
            config.frame_rate(),
            self.config.duration,
        )
        .map_err(|e| configure_error("video source", e))?;
        let adapter = VideoAdapter::new(
            PictureLayout::new(Pixel::YUV420P, source_width, source_height),
            PictureLayout::new(config.pixel_format.to_ffmpeg(), config.width, config.height),
        )
        .map_err(|e| configure_error("video adapter", e))?;

        let framer = if codec_id == Id::H264 {
            let policy = if global_header {
                ParameterSetPolicy::Once
            } else {
                ParameterSetPolicy::EveryKeyframe
            };
            let annexb = AnnexBFramer::new(
                &info.extradata,
                info.nal_framing.unwrap_or_default(),
                policy,
            )
            .map_err(|e| MuxError::configuration(format!("video: {}", e)))?;
            Some(BitstreamFramer::Video(annexb))
        } else {
            None
        };

        let mut spec = StreamSpec::new(MediaKind::Video, codec_id, info.time_base)
            .with_output_time_base(self.config.output.time_base());
        if let Some(parameters) = info.parameters {
            spec = spec.with_parameters(parameters);
        }
        let lane = StreamContext::new(MediaKind::Video, pattern, adapter, session, framer);
        pipeline.add_stream(spec, lane)
    }
}

fn create(path: &str) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| MuxError::io(None, Stage::Configure, 0, 0, format!("cannot create {}: {}", path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    #[test]
    fn test_unmapped_aac_rate_fails_before_header() -> anyhow::Result<()> {
        ffmpeg_next::init()?;
        if ffmpeg_next::encoder::find(Id::AAC).is_none() {
            eprintln!("skip: no AAC encoder");
            return Ok(());
        }
        let config = MuxConfig {
            audio: Some(AudioConfig {
                sample_rate: 7350,
                ..Default::default()
            }),
            video: None,
            ..Default::default()
        };
        let mut sink = MemorySink::new();
        let err = MuxJob::new(config).run_with(&mut sink).unwrap_err();
        assert!(matches!(err, MuxError::Configuration(_)), "{}", err);
        assert_eq!(err.stage(), Stage::Configure);
        assert!(!sink.header_written);
        assert!(sink.units.is_empty());
        Ok(())
    }
}
