use bytes::{Bytes, BytesMut};

/// Converts source frames into the exact layout an encoder accepts and
/// stamps them on the encoder timeline.
pub trait FrameAdapter {
    type Input;
    type Output;

    /// Feeds one source frame. May return nothing while samples accumulate.
    fn normalize(&mut self, frame: Self::Input) -> anyhow::Result<Option<Self::Output>>;

    /// Returns further ready output without consuming new input.
    fn pending(&mut self) -> anyhow::Result<Option<Self::Output>> {
        Ok(None)
    }

    /// Drains internal buffers at end of stream. Call until it returns None.
    fn flush(&mut self) -> anyhow::Result<Option<Self::Output>> {
        Ok(None)
    }

    /// Timestamp the next output frame will carry.
    fn next_pts(&self) -> i64;
}

/// FIFO of audio samples kept per plane, so encoder-sized blocks can be cut
/// from arbitrarily sized conversions.
#[derive(Debug)]
pub struct SampleQueue {
    planes: Vec<BytesMut>,
    /// Bytes one sample occupies in each plane.
    stride: usize,
    samples: usize,
}

impl SampleQueue {
    pub fn new(planes: usize, stride: usize) -> Self {
        Self {
            planes: (0..planes).map(|_| BytesMut::new()).collect(),
            stride,
            samples: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    pub fn planes(&self) -> usize {
        self.planes.len()
    }

    /// Appends `samples` from each plane slice. Slices may be longer than
    /// needed (FFmpeg line sizes are padded).
    pub fn push(&mut self, data: &[&[u8]], samples: usize) -> anyhow::Result<()> {
        if data.len() != self.planes.len() {
            anyhow::bail!(
                "expected {} planes, got {}",
                self.planes.len(),
                data.len()
            );
        }
        let bytes = samples * self.stride;
        for (plane, src) in self.planes.iter_mut().zip(data) {
            if src.len() < bytes {
                anyhow::bail!("plane holds {} bytes, need {}", src.len(), bytes);
            }
            plane.extend_from_slice(&src[..bytes]);
        }
        self.samples += samples;
        Ok(())
    }

    /// Removes exactly `samples` from the front, or nothing if fewer are queued.
    pub fn pop(&mut self, samples: usize) -> Option<Vec<Bytes>> {
        if samples == 0 || self.samples < samples {
            return None;
        }
        let bytes = samples * self.stride;
        self.samples -= samples;
        Some(
            self.planes
                .iter_mut()
                .map(|plane| plane.split_to(bytes).freeze())
                .collect(),
        )
    }

    /// Removes everything that is left, padded with `fill` up to `pad_to`
    /// samples when requested.
    pub fn pop_remaining(&mut self, pad_to: Option<usize>, fill: u8) -> Option<(Vec<Bytes>, usize)> {
        if self.samples == 0 {
            return None;
        }
        let queued = self.samples;
        let target = pad_to.map_or(queued, |n| n.max(queued));
        let mut out = self.pop(queued)?;
        if target > queued {
            let extra = (target - queued) * self.stride;
            out = out
                .into_iter()
                .map(|plane| {
                    let mut padded = BytesMut::with_capacity(plane.len() + extra);
                    padded.extend_from_slice(&plane);
                    padded.resize(plane.len() + extra, fill);
                    padded.freeze()
                })
                .collect();
        }
        Some((out, target))
    }
}
