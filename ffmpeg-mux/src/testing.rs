//! In-process doubles for the encoder, source and adapter seams.

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};
use ffmpeg_next::Rational;

use crate::adapter::FrameAdapter;
use crate::bsf::NalFraming;
use crate::encoder::{EncodeStep, EncoderBackend, EncoderInfo, SendOutcome};
use crate::packet::EncodedPacket;
use crate::source::FrameSource;
use crate::stream::MediaKind;

pub(crate) const SPS: &[u8] = &[0x67, 0x42, 0xC0, 0x1E];
pub(crate) const PPS: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];

pub(crate) fn avcc_record() -> Vec<u8> {
    let mut record = vec![0x01, 0x42, 0xC0, 0x1E, 0xFF, 0xE1];
    record.extend_from_slice(&(SPS.len() as u16).to_be_bytes());
    record.extend_from_slice(SPS);
    record.push(0x01);
    record.extend_from_slice(&(PPS.len() as u16).to_be_bytes());
    record.extend_from_slice(PPS);
    record
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FakeFrame {
    pub pts: i64,
    pub samples: usize,
}

impl FakeFrame {
    pub fn new(pts: i64, samples: usize) -> Self {
        Self { pts, samples }
    }
}

/// Encoder that holds back `lookahead` frames before releasing packets.
/// Video packets are AVCC framed with an `avcC` extradata record.
pub(crate) struct FakeEncoder {
    kind: MediaKind,
    lookahead: usize,
    time_base: Rational,
    frame_size: Option<usize>,
    gop: u64,
    fail_at: Option<u64>,
    queued: VecDeque<(FakeFrame, u64)>,
    ready: VecDeque<EncodedPacket>,
    sent: u64,
    flushed: bool,
}

impl FakeEncoder {
    pub fn audio(lookahead: usize) -> Self {
        Self {
            kind: MediaKind::Audio,
            lookahead,
            time_base: Rational::new(1, 48000),
            frame_size: Some(1024),
            gop: 1,
            fail_at: None,
            queued: VecDeque::new(),
            ready: VecDeque::new(),
            sent: 0,
            flushed: false,
        }
    }

    pub fn video(lookahead: usize, gop: u64) -> Self {
        Self {
            kind: MediaKind::Video,
            time_base: Rational::new(1, 25),
            frame_size: None,
            gop: gop.max(1),
            ..Self::audio(lookahead)
        }
    }

    pub fn with_time_base(mut self, time_base: Rational) -> Self {
        self.time_base = time_base;
        self
    }

    /// Fails the send of frame number `n` (zero based).
    pub fn failing_at(mut self, n: u64) -> Self {
        self.fail_at = Some(n);
        self
    }

    fn encode(&self, frame: FakeFrame, number: u64) -> EncodedPacket {
        match self.kind {
            MediaKind::Audio => {
                let mut packet = EncodedPacket::new(vec![0x21; 16], frame.pts, self.time_base);
                packet.duration = frame.samples as i64;
                packet.is_key = true;
                packet
            }
            MediaKind::Video => {
                let is_key = number % self.gop == 0;
                let header = if is_key { 0x65 } else { 0x41 };
                let mut data = BytesMut::new();
                data.put_u32(4);
                data.put_slice(&[header, 0x88, 0x84, 0x80 | (frame.pts & 0x7F) as u8]);
                let mut packet = EncodedPacket::new(data.freeze(), frame.pts, self.time_base);
                packet.is_key = is_key;
                packet
            }
        }
    }

    fn release(&mut self, keep: usize) {
        while self.queued.len() > keep {
            if let Some((frame, number)) = self.queued.pop_front() {
                let packet = self.encode(frame, number);
                self.ready.push_back(packet);
            }
        }
    }
}

impl EncoderBackend for FakeEncoder {
    type Frame = FakeFrame;

    fn open(&mut self) -> anyhow::Result<EncoderInfo> {
        let (frame_duration, extradata, nal_framing) = match self.kind {
            MediaKind::Audio => (self.frame_size.unwrap_or(1024) as i64, Bytes::new(), None),
            MediaKind::Video => (
                1,
                Bytes::from(avcc_record()),
                Some(NalFraming::default()),
            ),
        };
        Ok(EncoderInfo {
            time_base: self.time_base,
            frame_size: self.frame_size,
            frame_duration,
            extradata,
            parameters: None,
            small_last_frame: true,
            nal_framing,
        })
    }

    fn send_frame(&mut self, frame: Option<&FakeFrame>) -> anyhow::Result<SendOutcome> {
        if self.flushed {
            return Ok(SendOutcome::EndOfStream);
        }
        match frame {
            Some(frame) => {
                if self.fail_at == Some(self.sent) {
                    anyhow::bail!("fake encoder failure at frame {}", self.sent);
                }
                self.queued.push_back((*frame, self.sent));
                self.sent += 1;
                self.release(self.lookahead);
            }
            None => {
                self.flushed = true;
                self.release(0);
            }
        }
        Ok(SendOutcome::Accepted)
    }

    fn receive_packet(&mut self) -> anyhow::Result<EncodeStep> {
        Ok(match self.ready.pop_front() {
            Some(packet) => EncodeStep::Packet(packet),
            None if self.flushed => EncodeStep::EndOfStream,
            None => EncodeStep::NeedsInput,
        })
    }
}

/// Yields `count` frames of `samples` each.
pub(crate) struct CountingSource {
    remaining: usize,
    samples: usize,
}

impl CountingSource {
    pub fn new(count: usize, samples: usize) -> Self {
        Self {
            remaining: count,
            samples,
        }
    }
}

impl FrameSource for CountingSource {
    type Frame = FakeFrame;

    fn next_frame(&mut self) -> anyhow::Result<Option<FakeFrame>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(FakeFrame::new(-1, self.samples)))
    }
}

/// Stamps frames on a timeline advancing by the sample count, or by one for
/// video frames.
pub(crate) struct StampingAdapter {
    next_pts: i64,
}

impl StampingAdapter {
    pub fn new() -> Self {
        Self { next_pts: 0 }
    }
}

impl FrameAdapter for StampingAdapter {
    type Input = FakeFrame;
    type Output = FakeFrame;

    fn normalize(&mut self, mut frame: FakeFrame) -> anyhow::Result<Option<FakeFrame>> {
        frame.pts = self.next_pts;
        self.next_pts += frame.samples.max(1) as i64;
        Ok(Some(frame))
    }

    fn next_pts(&self) -> i64 {
        self.next_pts
    }
}
