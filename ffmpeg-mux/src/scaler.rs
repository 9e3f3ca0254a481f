use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;

/// Geometry and pixel format of one side of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureLayout {
    pub format: Pixel,
    pub width: u32,
    pub height: u32,
}

impl PictureLayout {
    pub fn new(format: Pixel, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
        }
    }
}

pub struct Scaler {
    context: scaling::Context,
    target: PictureLayout,
}

impl Scaler {
    pub fn new(source: PictureLayout, target: PictureLayout) -> anyhow::Result<Self> {
        let context = scaling::Context::get(
            source.format,
            source.width,
            source.height,
            target.format,
            target.width,
            target.height,
            scaling::flag::Flags::BICUBIC,
        )
        .map_err(|e| {
            anyhow::anyhow!(
                "unsupported picture conversion {:?} {}x{} -> {:?} {}x{}: {}",
                source.format,
                source.width,
                source.height,
                target.format,
                target.width,
                target.height,
                e
            )
        })?;
        Ok(Self { context, target })
    }

    /// Converts into a freshly allocated frame so the encoder may keep a
    /// reference to the previous one.
    pub fn run(&mut self, frame: &ffmpeg_next::frame::Video) -> anyhow::Result<ffmpeg_next::frame::Video> {
        let mut dst =
            ffmpeg_next::frame::Video::new(self.target.format, self.target.width, self.target.height);
        self.context.run(frame, &mut dst)?;
        Ok(dst)
    }
}
