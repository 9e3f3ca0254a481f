use ffmpeg_next::format::{Pixel, Sample};
use ffmpeg_next::ChannelLayout;

/// An uncompressed frame in the layout the target encoder expects.
#[derive(Clone)]
pub enum RawFrame {
    Video(RawVideoFrame),
    Audio(RawAudioFrame),
}

impl RawFrame {
    pub fn pts(&self) -> Option<i64> {
        match self {
            RawFrame::Video(frame) => frame.pts(),
            RawFrame::Audio(frame) => frame.pts(),
        }
    }
}

#[derive(Clone)]
pub struct RawAudioFrame {
    frame: ffmpeg_next::frame::Audio,
}

impl RawAudioFrame {
    pub fn pts(&self) -> Option<i64> {
        self.frame.pts()
    }

    pub fn samples(&self) -> usize {
        self.frame.samples()
    }

    pub fn rate(&self) -> u32 {
        self.frame.rate()
    }

    pub fn format(&self) -> Sample {
        self.frame.format()
    }

    pub fn channel_layout(&self) -> ChannelLayout {
        self.frame.channel_layout()
    }

    pub fn as_audio(&self) -> &ffmpeg_next::frame::Audio {
        &self.frame
    }
}

impl From<ffmpeg_next::frame::Audio> for RawAudioFrame {
    fn from(frame: ffmpeg_next::frame::Audio) -> Self {
        Self { frame }
    }
}

#[derive(Clone)]
pub struct RawVideoFrame {
    frame: ffmpeg_next::frame::Video,
}

impl RawVideoFrame {
    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub fn format(&self) -> Pixel {
        self.frame.format()
    }

    pub fn pts(&self) -> Option<i64> {
        self.frame.pts()
    }

    pub fn as_video(&self) -> &ffmpeg_next::frame::Video {
        &self.frame
    }
}

impl From<ffmpeg_next::frame::Video> for RawVideoFrame {
    fn from(frame: ffmpeg_next::frame::Video) -> Self {
        Self { frame }
    }
}

impl From<ffmpeg_next::frame::Audio> for RawFrame {
    fn from(frame: ffmpeg_next::frame::Audio) -> Self {
        RawFrame::Audio(frame.into())
    }
}

impl From<ffmpeg_next::frame::Video> for RawFrame {
    fn from(frame: ffmpeg_next::frame::Video) -> Self {
        RawFrame::Video(frame.into())
    }
}
