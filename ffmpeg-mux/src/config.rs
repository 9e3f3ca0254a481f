use ffmpeg_next::Rational;
use ffmpeg_next::format::{Pixel, Sample, sample::Type};
use serde::{Deserialize, Serialize};

use crate::adts::AacProfile;
use crate::error::{MuxError, Result};
use crate::stream::MediaKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    Flt,
    Dbl,
    U8p,
    S16p,
    S32p,
    Fltp,
    Dblp,
}

impl SampleFormat {
    pub fn to_ffmpeg(self) -> Sample {
        match self {
            SampleFormat::U8 => Sample::U8(Type::Packed),
            SampleFormat::S16 => Sample::I16(Type::Packed),
            SampleFormat::S32 => Sample::I32(Type::Packed),
            SampleFormat::Flt => Sample::F32(Type::Packed),
            SampleFormat::Dbl => Sample::F64(Type::Packed),
            SampleFormat::U8p => Sample::U8(Type::Planar),
            SampleFormat::S16p => Sample::I16(Type::Planar),
            SampleFormat::S32p => Sample::I32(Type::Planar),
            SampleFormat::Fltp => Sample::F32(Type::Planar),
            SampleFormat::Dblp => Sample::F64(Type::Planar),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Yuv420p,
    Yuv422p,
    Yuv444p,
    Nv12,
    Rgb24,
}

impl PixelFormat {
    pub fn to_ffmpeg(self) -> Pixel {
        match self {
            PixelFormat::Yuv420p => Pixel::YUV420P,
            PixelFormat::Yuv422p => Pixel::YUV422P,
            PixelFormat::Yuv444p => Pixel::YUV444P,
            PixelFormat::Nv12 => Pixel::NV12,
            PixelFormat::Rgb24 => Pixel::RGB24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Encoder name; `None` selects the default AAC encoder.
    pub codec: Option<String>,
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_rate: usize,
    pub profile: AacProfile,
    /// Encoder input format; `None` takes the first format the codec lists.
    pub sample_format: Option<SampleFormat>,
    /// Rate of the raw source; defaults to `sample_rate`.
    pub source_sample_rate: Option<u32>,
    pub source_format: SampleFormat,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            codec: None,
            channels: 2,
            sample_rate: 44100,
            bit_rate: 64_000,
            profile: AacProfile::Lc,
            sample_format: None,
            source_sample_rate: None,
            source_format: SampleFormat::S16,
        }
    }
}

impl AudioConfig {
    pub fn source_rate(&self) -> u32 {
        self.source_sample_rate.unwrap_or(self.sample_rate)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(MuxError::configuration("audio needs at least one channel"));
        }
        if self.sample_rate == 0 || self.source_rate() == 0 {
            return Err(MuxError::configuration("audio sample rate must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    /// Frames per second as `[num, den]`.
    pub frame_rate: (i32, i32),
    pub gop_size: u32,
    pub max_b_frames: usize,
    pub bit_rate: usize,
    pub preset: Option<String>,
    pub profile: Option<String>,
    pub tune: Option<String>,
    pub pixel_format: PixelFormat,
    /// Size of the raw source; defaults to the encoder size.
    pub source_width: Option<u32>,
    pub source_height: Option<u32>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            width: 352,
            height: 288,
            frame_rate: (25, 1),
            gop_size: 12,
            max_b_frames: 1,
            bit_rate: 400_000,
            preset: Some("medium".to_string()),
            profile: Some("main".to_string()),
            tune: None,
            pixel_format: PixelFormat::Yuv420p,
            source_width: None,
            source_height: None,
        }
    }
}

impl VideoConfig {
    pub fn frame_rate(&self) -> Rational {
        Rational::new(self.frame_rate.0, self.frame_rate.1)
    }

    pub fn time_base(&self) -> Rational {
        Rational::new(self.frame_rate.1, self.frame_rate.0)
    }

    pub fn source_size(&self) -> (u32, u32) {
        (
            self.source_width.unwrap_or(self.width),
            self.source_height.unwrap_or(self.height),
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MuxError::configuration(format!(
                "invalid video size {}x{}",
                self.width, self.height
            )));
        }
        let (sw, sh) = self.source_size();
        if sw == 0 || sh == 0 {
            return Err(MuxError::configuration(format!(
                "invalid source size {}x{}",
                sw, sh
            )));
        }
        if self.frame_rate.0 <= 0 || self.frame_rate.1 <= 0 {
            return Err(MuxError::configuration(format!(
                "invalid frame rate {}/{}",
                self.frame_rate.0, self.frame_rate.1
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// MPEG transport stream through libavformat.
    #[default]
    Mpegts,
    /// Length-delimited unit stream with a stream table header.
    Units,
    /// Raw elementary stream of a single track (.aac or .h264).
    Elementary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: String,
    pub format: ContainerFormat,
    /// Keep codec configuration out of band. `None` follows the container.
    pub global_header: Option<bool>,
    /// Stream clock for the unit and elementary sinks as `[num, den]`.
    pub time_base: (i32, i32),
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: "output.ts".to_string(),
            format: ContainerFormat::default(),
            global_header: None,
            time_base: (1, 1000),
        }
    }
}

impl OutputConfig {
    pub fn time_base(&self) -> Rational {
        Rational::new(self.time_base.0, self.time_base.1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    pub output: OutputConfig,
    pub audio: Option<AudioConfig>,
    pub video: Option<VideoConfig>,
    /// Length of the synthetic sources, in seconds.
    pub duration: f64,
    /// Tie-break order when two streams are due at the same instant.
    pub priority: Vec<MediaKind>,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            audio: Some(AudioConfig::default()),
            video: Some(VideoConfig::default()),
            duration: 5.0,
            priority: vec![MediaKind::Video, MediaKind::Audio],
        }
    }
}

impl MuxConfig {
    pub fn validate(&self) -> Result<()> {
        if self.audio.is_none() && self.video.is_none() {
            return Err(MuxError::configuration("no audio or video stream configured"));
        }
        if !(self.duration > 0.0) {
            return Err(MuxError::configuration(format!(
                "duration must be positive, got {}",
                self.duration
            )));
        }
        if self.output.format == ContainerFormat::Elementary
            && self.audio.is_some()
            && self.video.is_some()
        {
            return Err(MuxError::configuration(
                "elementary output carries exactly one stream",
            ));
        }
        let (num, den) = self.output.time_base;
        if num <= 0 || den <= 0 {
            return Err(MuxError::configuration(format!(
                "invalid output time base {}/{}",
                num, den
            )));
        }
        if let Some(audio) = &self.audio {
            audio.validate()?;
        }
        if let Some(video) = &self.video {
            video.validate()?;
        }
        Ok(())
    }
}
