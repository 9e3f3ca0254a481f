use std::cmp::Ordering;

use ffmpeg_next::format::{Pixel, Sample};
use ffmpeg_next::frame::{Audio, Video};
use ffmpeg_next::Rational;

use crate::audio_adapter::AudioLayout;
use crate::timestamp::compare;

/// Produces raw frames for one stream. The layout is fixed for the lifetime
/// of the source.
pub trait FrameSource {
    type Frame;

    /// Returns `None` once the source is exhausted.
    fn next_frame(&mut self) -> anyhow::Result<Option<Self::Frame>>;
}

const MILLIS: Rational = Rational(1, 1000);

fn duration_millis(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

/// Swept sine tone in interleaved or planar s16 / flt.
pub struct SineSource {
    layout: AudioLayout,
    chunk: usize,
    t: f64,
    tincr: f64,
    tincr2: f64,
    produced: i64,
    duration_ms: i64,
}

impl SineSource {
    pub fn new(layout: AudioLayout, chunk: usize, duration: f64) -> anyhow::Result<Self> {
        match layout.format {
            Sample::I16(_) | Sample::F32(_) => {}
            other => anyhow::bail!("sine source cannot produce {:?}", other),
        }
        if chunk == 0 {
            anyhow::bail!("sine source chunk size must be positive");
        }
        let tincr = 2.0 * std::f64::consts::PI * 110.0 / layout.rate as f64;
        Ok(Self {
            layout,
            chunk,
            t: 0.0,
            tincr,
            // sweeps 110 Hz upward by 110 Hz per second
            tincr2: tincr / layout.rate as f64,
            produced: 0,
            duration_ms: duration_millis(duration),
        })
    }

    fn fill(&mut self, frame: &mut Audio) {
        let channels = self.layout.channels();
        let planar = self.layout.format.is_planar();
        let width = self.layout.format.bytes();
        for i in 0..frame.samples() {
            let v = self.t.sin();
            self.t += self.tincr;
            self.tincr += self.tincr2;
            for c in 0..channels {
                let (plane, offset) = if planar {
                    (c, i * width)
                } else {
                    (0, (i * channels + c) * width)
                };
                let dst = &mut frame.data_mut(plane)[offset..offset + width];
                match self.layout.format {
                    Sample::I16(_) => dst.copy_from_slice(&((v * 10000.0) as i16).to_ne_bytes()),
                    _ => dst.copy_from_slice(&((v * 0.3) as f32).to_ne_bytes()),
                }
            }
        }
    }
}

impl FrameSource for SineSource {
    type Frame = Audio;

    fn next_frame(&mut self) -> anyhow::Result<Option<Audio>> {
        let time_base = Rational::new(1, self.layout.rate as i32);
        if compare(self.produced, time_base, self.duration_ms, MILLIS) != Ordering::Less {
            return Ok(None);
        }
        let mut frame = Audio::new(self.layout.format, self.chunk, self.layout.channel_layout);
        frame.set_rate(self.layout.rate);
        self.fill(&mut frame);
        frame.set_pts(Some(self.produced));
        self.produced += self.chunk as i64;
        Ok(Some(frame))
    }
}

/// Moving YUV420P gradient.
pub struct PatternSource {
    width: u32,
    height: u32,
    time_base: Rational,
    index: i64,
    duration_ms: i64,
}

impl PatternSource {
    pub fn new(width: u32, height: u32, frame_rate: Rational, duration: f64) -> anyhow::Result<Self> {
        if width == 0 || height == 0 || frame_rate.numerator() <= 0 {
            anyhow::bail!("invalid pattern {}x{} @ {}", width, height, frame_rate);
        }
        Ok(Self {
            width,
            height,
            time_base: frame_rate.invert(),
            index: 0,
            duration_ms: duration_millis(duration),
        })
    }
}

impl FrameSource for PatternSource {
    type Frame = Video;

    fn next_frame(&mut self) -> anyhow::Result<Option<Video>> {
        if compare(self.index, self.time_base, self.duration_ms, MILLIS) != Ordering::Less {
            return Ok(None);
        }
        let mut frame = Video::new(Pixel::YUV420P, self.width, self.height);
        let i = self.index as usize;
        let (w, h) = (self.width as usize, self.height as usize);

        let stride = frame.stride(0);
        let luma = frame.data_mut(0);
        for y in 0..h {
            for x in 0..w {
                luma[y * stride + x] = (x + y + i * 3) as u8;
            }
        }
        for (plane, base, step) in [(1usize, 128usize, 2usize), (2, 64, 5)] {
            let stride = frame.stride(plane);
            let chroma = frame.data_mut(plane);
            for y in 0..h / 2 {
                for x in 0..w / 2 {
                    let offset = if plane == 1 { y } else { x };
                    chroma[y * stride + x] = (base + offset + i * step) as u8;
                }
            }
        }

        frame.set_pts(Some(self.index));
        self.index += 1;
        Ok(Some(frame))
    }
}
