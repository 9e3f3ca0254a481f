use bytes::Bytes;
use ffmpeg_next::{ChannelLayout, format::Sample, frame::Audio, software::resampling};

use crate::adapter::{FrameAdapter, SampleQueue};
use crate::frame::RawFrame;
use crate::timestamp::output_capacity;

/// Sample format, channel layout and rate of one side of a conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioLayout {
    pub format: Sample,
    pub channel_layout: ChannelLayout,
    pub rate: u32,
}

impl AudioLayout {
    pub fn new(format: Sample, channels: u16, rate: u32) -> Self {
        Self {
            format,
            channel_layout: ChannelLayout::default(channels as i32),
            rate,
        }
    }

    pub fn channels(&self) -> usize {
        self.channel_layout.channels().max(0) as usize
    }

    pub fn planes(&self) -> usize {
        if self.format.is_planar() {
            self.channels()
        } else {
            1
        }
    }

    /// Bytes per sample within one plane.
    pub fn stride(&self) -> usize {
        if self.format.is_planar() {
            self.format.bytes()
        } else {
            self.format.bytes() * self.channels()
        }
    }

    fn silence(&self) -> u8 {
        match self.format {
            Sample::U8(_) => 0x80,
            _ => 0,
        }
    }
}

struct Resampler {
    context: resampling::Context,
    buffer: Audio,
    capacity: usize,
}

impl Resampler {
    fn delay(&self) -> i64 {
        let rate = self.context.input().rate as i64;
        unsafe { ffmpeg_next::ffi::swr_get_delay(self.context.as_ptr() as *mut _, rate) }
    }
}

/// Re-chunks PCM into encoder-sized frames, converting format, layout and
/// rate through swresample when the source differs from the encoder.
pub struct AudioAdapter {
    source: AudioLayout,
    target: AudioLayout,
    frame_size: usize,
    pad_final_block: bool,
    resampler: Option<Resampler>,
    queue: SampleQueue,
    next_pts: i64,
    drained: bool,
}

impl AudioAdapter {
    /// `pad_final_block` fills the last partial frame with silence, for
    /// codecs that cannot take a short final frame.
    pub fn new(
        source: AudioLayout,
        target: AudioLayout,
        frame_size: usize,
        pad_final_block: bool,
    ) -> anyhow::Result<Self> {
        if frame_size == 0 {
            anyhow::bail!("encoder frame size must be positive");
        }
        if source.channels() == 0 || target.channels() == 0 {
            anyhow::bail!("audio layout without channels");
        }
        let resampler = if source == target {
            None
        } else {
            let context = resampling::Context::get(
                source.format,
                source.channel_layout,
                source.rate,
                target.format,
                target.channel_layout,
                target.rate,
            )
            .map_err(|e| {
                anyhow::anyhow!(
                    "unsupported audio conversion {:?}/{}ch/{}Hz -> {:?}/{}ch/{}Hz: {}",
                    source.format,
                    source.channels(),
                    source.rate,
                    target.format,
                    target.channels(),
                    target.rate,
                    e
                )
            })?;
            log::info!(
                "audio resampler: {:?} {}Hz -> {:?} {}Hz",
                source.format,
                source.rate,
                target.format,
                target.rate
            );
            Some(Resampler {
                context,
                buffer: Audio::empty(),
                capacity: 0,
            })
        };

        Ok(Self {
            source,
            target,
            frame_size,
            pad_final_block,
            resampler,
            queue: SampleQueue::new(target.planes(), target.stride()),
            next_pts: 0,
            drained: false,
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    fn check_source(&self, frame: &Audio) -> anyhow::Result<()> {
        if frame.format() != self.source.format
            || frame.rate() != self.source.rate
            || frame.channel_layout() != self.source.channel_layout
        {
            anyhow::bail!(
                "frame layout {:?}/{}Hz/{}ch does not match the declared source {:?}/{}Hz/{}ch",
                frame.format(),
                frame.rate(),
                frame.channel_layout().channels(),
                self.source.format,
                self.source.rate,
                self.source.channels()
            );
        }
        Ok(())
    }

    /// Runs one conversion step; `None` drains the resampler. Returns the
    /// number of samples queued.
    fn convert(&mut self, frame: Option<&Audio>) -> anyhow::Result<usize> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(0);
        };
        let input = frame.map_or(0, |f| f.samples());
        let mut capacity =
            output_capacity(resampler.delay(), input, self.source.rate, self.target.rate);
        if frame.is_none() {
            capacity = capacity.max(self.frame_size);
        }
        if capacity == 0 {
            return Ok(0);
        }
        if capacity > resampler.capacity {
            log::debug!(
                "growing resample buffer {} -> {} samples",
                resampler.capacity,
                capacity
            );
            resampler.buffer = Audio::new(self.target.format, capacity, self.target.channel_layout);
            resampler.buffer.set_rate(self.target.rate);
            resampler.capacity = capacity;
        }
        resampler.buffer.set_samples(capacity);

        match frame {
            Some(frame) => resampler.context.run(frame, &mut resampler.buffer)?,
            None => resampler.context.flush(&mut resampler.buffer)?,
        };

        let produced = resampler.buffer.samples();
        if produced > 0 {
            let planes: Vec<&[u8]> = (0..self.target.planes())
                .map(|p| resampler.buffer.data(p))
                .collect();
            self.queue.push(&planes, produced)?;
        }
        Ok(produced)
    }

    fn build_frame(&mut self, planes: Vec<Bytes>, samples: usize) -> RawFrame {
        let mut out = Audio::new(self.target.format, samples, self.target.channel_layout);
        out.set_rate(self.target.rate);
        for (p, data) in planes.iter().enumerate() {
            out.data_mut(p)[..data.len()].copy_from_slice(data);
        }
        out.set_pts(Some(self.next_pts));
        self.next_pts += samples as i64;
        RawFrame::from(out)
    }

    fn pop_block(&mut self) -> Option<RawFrame> {
        let planes = self.queue.pop(self.frame_size)?;
        Some(self.build_frame(planes, self.frame_size))
    }
}

impl FrameAdapter for AudioAdapter {
    type Input = Audio;
    type Output = RawFrame;

    fn normalize(&mut self, frame: Audio) -> anyhow::Result<Option<RawFrame>> {
        if self.drained {
            anyhow::bail!("audio frame after flush");
        }
        self.check_source(&frame)?;
        if self.resampler.is_some() {
            self.convert(Some(&frame))?;
        } else {
            let planes: Vec<&[u8]> = (0..self.source.planes()).map(|p| frame.data(p)).collect();
            self.queue.push(&planes, frame.samples())?;
        }
        Ok(self.pop_block())
    }

    fn pending(&mut self) -> anyhow::Result<Option<RawFrame>> {
        Ok(self.pop_block())
    }

    fn flush(&mut self) -> anyhow::Result<Option<RawFrame>> {
        if !self.drained {
            self.drained = true;
            while self.convert(None)? > 0 {}
        }
        if let Some(frame) = self.pop_block() {
            return Ok(Some(frame));
        }
        let pad_to = self.pad_final_block.then_some(self.frame_size);
        let silence = self.target.silence();
        Ok(self
            .queue
            .pop_remaining(pad_to, silence)
            .map(|(planes, samples)| self.build_frame(planes, samples)))
    }

    fn next_pts(&self) -> i64 {
        self.next_pts
    }
}
