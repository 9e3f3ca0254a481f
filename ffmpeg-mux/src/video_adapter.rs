use ffmpeg_next::frame::Video;

use crate::adapter::FrameAdapter;
use crate::frame::RawFrame;
use crate::scaler::{PictureLayout, Scaler};

/// Brings source pictures to the encoder's pixel format and size and numbers
/// them on the 1/frame_rate timeline.
pub struct VideoAdapter {
    source: PictureLayout,
    scaler: Option<Scaler>,
    next_pts: i64,
}

impl VideoAdapter {
    pub fn new(source: PictureLayout, target: PictureLayout) -> anyhow::Result<Self> {
        let scaler = if source == target {
            None
        } else {
            log::info!(
                "video scaler: {:?} {}x{} -> {:?} {}x{}",
                source.format,
                source.width,
                source.height,
                target.format,
                target.width,
                target.height
            );
            Some(Scaler::new(source, target)?)
        };
        Ok(Self {
            source,
            scaler,
            next_pts: 0,
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.scaler.is_none()
    }
}

impl FrameAdapter for VideoAdapter {
    type Input = Video;
    type Output = RawFrame;

    fn normalize(&mut self, frame: Video) -> anyhow::Result<Option<RawFrame>> {
        let layout = PictureLayout::new(frame.format(), frame.width(), frame.height());
        if layout != self.source {
            anyhow::bail!(
                "picture {:?} {}x{} does not match the declared source {:?} {}x{}",
                layout.format,
                layout.width,
                layout.height,
                self.source.format,
                self.source.width,
                self.source.height
            );
        }
        let mut out = match self.scaler.as_mut() {
            Some(scaler) => scaler.run(&frame)?,
            None => frame,
        };
        out.set_pts(Some(self.next_pts));
        self.next_pts += 1;
        Ok(Some(RawFrame::from(out)))
    }

    fn next_pts(&self) -> i64 {
        self.next_pts
    }
}

#[cfg(test)]
mod tests {
    use ffmpeg_next::format::Pixel;

    use super::*;

    fn picture(layout: PictureLayout) -> Video {
        Video::new(layout.format, layout.width, layout.height)
    }

    #[test]
    fn test_passthrough_numbers_frames() -> anyhow::Result<()> {
        ffmpeg_next::init()?;
        let layout = PictureLayout::new(Pixel::YUV420P, 64, 48);
        let mut adapter = VideoAdapter::new(layout, layout)?;
        assert!(adapter.is_passthrough());
        for expected in 0..3 {
            let out = adapter.normalize(picture(layout))?.unwrap();
            assert_eq!(out.pts(), Some(expected));
        }
        assert_eq!(adapter.next_pts(), 3);
        assert!(adapter.flush()?.is_none());
        Ok(())
    }

    #[test]
    fn test_scaler_converts_format_and_size() -> anyhow::Result<()> {
        ffmpeg_next::init()?;
        let source = PictureLayout::new(Pixel::RGB24, 64, 48);
        let target = PictureLayout::new(Pixel::YUV420P, 32, 24);
        let mut adapter = VideoAdapter::new(source, target)?;
        assert!(!adapter.is_passthrough());
        match adapter.normalize(picture(source))? {
            Some(RawFrame::Video(frame)) => {
                assert_eq!(frame.format(), Pixel::YUV420P);
                assert_eq!((frame.width(), frame.height()), (32, 24));
                assert_eq!(frame.pts(), Some(0));
            }
            _ => panic!("expected a video frame"),
        }
        Ok(())
    }

    #[test]
    fn test_mismatched_picture_is_rejected() -> anyhow::Result<()> {
        ffmpeg_next::init()?;
        let layout = PictureLayout::new(Pixel::YUV420P, 64, 48);
        let mut adapter = VideoAdapter::new(layout, layout)?;
        let wrong = picture(PictureLayout::new(Pixel::YUV420P, 32, 16));
        assert!(adapter.normalize(wrong).is_err());
        assert_eq!(adapter.next_pts(), 0);
        Ok(())
    }
}
