use bytes::Bytes;
use ffmpeg_next::codec::{self, Parameters, capabilities::Capabilities};
use ffmpeg_next::format::{Sample, sample::Type};
use ffmpeg_next::{ChannelLayout, Dictionary, Rational};

use crate::bsf::{NalFraming, get_extradata};
use crate::config::{AudioConfig, VideoConfig};
use crate::error::{MuxError, Result, Stage};
use crate::frame::RawFrame;
use crate::packet::EncodedPacket;
use crate::stream::MediaKind;

/// Result of pushing input into an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Accepted,
    /// The encoder holds output that must be pulled before it takes more
    /// input.
    OutputPending,
    /// The encoder was already flushed.
    EndOfStream,
}

/// Result of pulling output from an encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeStep {
    NeedsInput,
    Packet(EncodedPacket),
    EndOfStream,
}

/// What an opened encoder reports about its output.
#[derive(Clone)]
pub struct EncoderInfo {
    pub time_base: Rational,
    /// Samples per frame for audio encoders with a fixed frame size.
    pub frame_size: Option<usize>,
    /// Duration assigned to packets the encoder leaves unset.
    pub frame_duration: i64,
    pub extradata: Bytes,
    pub parameters: Option<Parameters>,
    pub small_last_frame: bool,
    /// NAL delimiting of video packets, when known.
    pub nal_framing: Option<NalFraming>,
}

/// The push/pull surface of a concrete encoder.
pub trait EncoderBackend {
    type Frame;

    fn open(&mut self) -> anyhow::Result<EncoderInfo>;

    /// `None` signals end of stream.
    fn send_frame(&mut self, frame: Option<&Self::Frame>) -> anyhow::Result<SendOutcome>;

    fn receive_packet(&mut self) -> anyhow::Result<EncodeStep>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Idle,
    Open,
    Encoding,
    Draining,
    Closed,
}

/// Drives one encoder through open, encode, drain and close, enforcing the
/// send/receive protocol.
pub struct EncoderSession<B: EncoderBackend> {
    stream_index: usize,
    backend: B,
    state: EncoderState,
    time_base: Rational,
    frame_duration: i64,
    frames_sent: u64,
    packets_received: u64,
    protocol_violations: u64,
    logged_first_packet: bool,
}

impl<B: EncoderBackend> EncoderSession<B> {
    pub fn new(stream_index: usize, backend: B) -> Self {
        Self {
            stream_index,
            backend,
            state: EncoderState::Idle,
            time_base: Rational::new(1, 1),
            frame_duration: 0,
            frames_sent: 0,
            packets_received: 0,
            protocol_violations: 0,
            logged_first_packet: false,
        }
    }

    pub fn open(&mut self) -> Result<EncoderInfo> {
        if self.state != EncoderState::Idle {
            return Err(MuxError::protocol(self.stream_index, "encoder opened twice"));
        }
        let info = self.backend.open().map_err(|e| {
            MuxError::configuration(format!("stream {}: {:#}", self.stream_index, e))
        })?;
        self.time_base = info.time_base;
        self.frame_duration = info.frame_duration;
        self.state = EncoderState::Open;
        log::info!(
            "stream {} encoder opened, time base {}, frame size {:?}",
            self.stream_index,
            self.time_base,
            info.frame_size
        );
        Ok(info)
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }

    pub fn protocol_violations(&self) -> u64 {
        self.protocol_violations
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Sends one frame, or end of stream for `None`, and collects every
    /// packet the encoder can release afterwards.
    pub fn submit(&mut self, frame: Option<&B::Frame>) -> Result<Vec<EncodedPacket>> {
        match (self.state, frame.is_some()) {
            (EncoderState::Idle, _) => {
                return Err(MuxError::protocol(
                    self.stream_index,
                    "frame submitted before the encoder was opened",
                ));
            }
            (EncoderState::Draining | EncoderState::Closed, true) => {
                return Err(MuxError::protocol(
                    self.stream_index,
                    "frame submitted after end of stream",
                ));
            }
            (EncoderState::Closed, false) => return Ok(Vec::new()),
            _ => {}
        }

        let mut packets = Vec::new();
        self.state = if frame.is_some() {
            EncoderState::Encoding
        } else {
            EncoderState::Draining
        };

        match self.send(frame)? {
            SendOutcome::Accepted => {}
            SendOutcome::OutputPending => {
                self.protocol_violations += 1;
                log::warn!(
                    "stream {}: input submitted while output was pending, draining first",
                    self.stream_index
                );
                self.drain_into(&mut packets)?;
                match self.send(frame)? {
                    SendOutcome::Accepted => {}
                    SendOutcome::OutputPending => {
                        return Err(MuxError::encoding(
                            self.stream_index,
                            Stage::Encode,
                            "encoder refused input after its output was drained",
                        ));
                    }
                    SendOutcome::EndOfStream => return self.finish_early(frame, packets),
                }
            }
            SendOutcome::EndOfStream => return self.finish_early(frame, packets),
        }

        if frame.is_some() {
            self.frames_sent += 1;
        }
        self.drain_into(&mut packets)?;
        Ok(packets)
    }

    fn send(&mut self, frame: Option<&B::Frame>) -> Result<SendOutcome> {
        self.backend
            .send_frame(frame)
            .map_err(|e| MuxError::encoding(self.stream_index, Stage::Encode, format!("{:#}", e)))
    }

    fn finish_early(
        &mut self,
        frame: Option<&B::Frame>,
        packets: Vec<EncodedPacket>,
    ) -> Result<Vec<EncodedPacket>> {
        if frame.is_some() {
            return Err(MuxError::encoding(
                self.stream_index,
                Stage::Encode,
                "encoder reached end of stream while frames were still arriving",
            ));
        }
        self.close();
        Ok(packets)
    }

    fn close(&mut self) {
        if self.state != EncoderState::Closed {
            self.state = EncoderState::Closed;
            log::info!(
                "stream {} encoder closed: {} frames in, {} packets out",
                self.stream_index,
                self.frames_sent,
                self.packets_received
            );
        }
    }

    fn drain_into(&mut self, packets: &mut Vec<EncodedPacket>) -> Result<()> {
        loop {
            let step = self.backend.receive_packet().map_err(|e| {
                MuxError::encoding(self.stream_index, Stage::Encode, format!("{:#}", e))
            })?;
            match step {
                EncodeStep::Packet(packet) => packets.push(self.stamp(packet)),
                EncodeStep::NeedsInput => {
                    if self.state == EncoderState::Draining {
                        return Err(MuxError::encoding(
                            self.stream_index,
                            Stage::Encode,
                            "encoder asked for input while draining",
                        ));
                    }
                    return Ok(());
                }
                EncodeStep::EndOfStream => {
                    self.close();
                    return Ok(());
                }
            }
        }
    }

    fn stamp(&mut self, mut packet: EncodedPacket) -> EncodedPacket {
        packet.stream_index = self.stream_index;
        packet.time_base = self.time_base;
        if packet.duration <= 0 {
            packet.duration = self.frame_duration;
        }
        self.packets_received += 1;
        if !self.logged_first_packet {
            self.logged_first_packet = true;
            log::info!(
                "stream {} first packet: pts {}, dts {}, {} bytes, key {}",
                self.stream_index,
                packet.pts,
                packet.dts,
                packet.size(),
                packet.is_key
            );
        }
        log::debug!(
            "stream {} packet pts {} dts {} duration {} size {}",
            self.stream_index,
            packet.pts,
            packet.dts,
            packet.duration,
            packet.size()
        );
        packet
    }
}

pub enum EncoderType {
    Video(ffmpeg_next::codec::encoder::Video),
    Audio(ffmpeg_next::codec::encoder::Audio),
}

impl EncoderType {
    pub fn send_frame(&mut self, frame: &RawFrame) -> anyhow::Result<SendOutcome> {
        let result = match (self, frame) {
            (EncoderType::Video(encoder), RawFrame::Video(frame)) => {
                encoder.send_frame(frame.as_video())
            }
            (EncoderType::Audio(encoder), RawFrame::Audio(frame)) => {
                encoder.send_frame(frame.as_audio())
            }
            _ => anyhow::bail!("invalid frame type"),
        };
        classify_send(result)
    }

    pub fn send_eof(&mut self) -> anyhow::Result<SendOutcome> {
        let result = match self {
            EncoderType::Video(encoder) => encoder.send_eof(),
            EncoderType::Audio(encoder) => encoder.send_eof(),
        };
        classify_send(result)
    }

    pub fn encoder_receive_packet(&mut self, time_base: Rational) -> anyhow::Result<EncodeStep> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        let encode_result = match self {
            EncoderType::Video(encoder) => encoder.receive_packet(&mut packet),
            EncoderType::Audio(encoder) => encoder.receive_packet(&mut packet),
        };

        match encode_result {
            Ok(()) => EncodedPacket::from_ffmpeg(&packet, time_base)
                .map(EncodeStep::Packet)
                .ok_or_else(|| anyhow::anyhow!("encoder produced a packet without timestamps")),
            Err(ffmpeg_next::Error::Other { errno })
                if errno == ffmpeg_next::util::error::EAGAIN =>
            {
                Ok(EncodeStep::NeedsInput)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(EncodeStep::EndOfStream),
            Err(err) => Err(err.into()),
        }
    }

    pub fn time_base(&self) -> Rational {
        unsafe {
            match self {
                EncoderType::Video(encoder) => (*encoder.0.as_ptr()).time_base.into(),
                EncoderType::Audio(encoder) => (*encoder.0.as_ptr()).time_base.into(),
            }
        }
    }

    pub fn parameters(&self) -> Parameters {
        match self {
            EncoderType::Video(encoder) => Parameters::from(encoder),
            EncoderType::Audio(encoder) => Parameters::from(encoder),
        }
    }
}

fn classify_send(result: std::result::Result<(), ffmpeg_next::Error>) -> anyhow::Result<SendOutcome> {
    match result {
        Ok(()) => Ok(SendOutcome::Accepted),
        Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
            Ok(SendOutcome::OutputPending)
        }
        Err(ffmpeg_next::Error::Eof) => Ok(SendOutcome::EndOfStream),
        Err(err) => Err(err.into()),
    }
}

enum PendingEncoder {
    Video(ffmpeg_next::codec::encoder::video::Video),
    Audio(ffmpeg_next::codec::encoder::audio::Audio),
}

enum EncoderSlot {
    Pending {
        encoder: PendingEncoder,
        options: Dictionary<'static>,
    },
    Open(EncoderType),
    Released,
}

/// libavcodec encoder configured from [`AudioConfig`] or [`VideoConfig`].
/// Settings are validated against the codec's capabilities on construction;
/// the codec itself is opened by [`EncoderBackend::open`].
pub struct FfmpegEncoder {
    kind: MediaKind,
    codec_name: String,
    codec_id: codec::Id,
    slot: EncoderSlot,
    time_base: Rational,
    small_last_frame: bool,
    sample_format: Option<Sample>,
}

impl FfmpegEncoder {
    pub fn audio(config: &AudioConfig, global_header: bool) -> anyhow::Result<Self> {
        let codec = match &config.codec {
            Some(name) => ffmpeg_next::encoder::find_by_name(name)
                .ok_or(anyhow::anyhow!("codec not found: {}", name))?,
            None => ffmpeg_next::encoder::find(codec::Id::AAC)
                .ok_or(anyhow::anyhow!("no AAC encoder available"))?,
        };
        let capabilities = codec.audio()?;

        let format = match config.sample_format {
            Some(format) => format.to_ffmpeg(),
            None => capabilities
                .formats()
                .and_then(|mut formats| formats.next())
                .unwrap_or(Sample::F32(Type::Planar)),
        };
        if let Some(mut formats) = capabilities.formats() {
            if !formats.any(|f| f == format) {
                anyhow::bail!("{} does not support sample format {:?}", codec.name(), format);
            }
        }
        if let Some(mut rates) = capabilities.rates() {
            if !rates.any(|r| r == config.sample_rate as i32) {
                anyhow::bail!(
                    "{} does not support sample rate {}",
                    codec.name(),
                    config.sample_rate
                );
            }
        }
        // unsupported layouts are rejected when the codec is opened
        let layout = ChannelLayout::default(config.channels as i32);

        let mut encoder = codec::Context::new_with_codec(codec).encoder().audio()?;
        encoder.set_rate(config.sample_rate as i32);
        encoder.set_channel_layout(layout);
        encoder.set_format(format);
        encoder.set_bit_rate(config.bit_rate);
        let time_base = Rational::new(1, config.sample_rate as i32);
        encoder.set_time_base(time_base);
        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut options = Dictionary::new();
        if codec.id() == codec::Id::AAC {
            options.set("profile", config.profile.ffmpeg_option());
        }

        log::info!(
            "configured audio encoder {}: {}Hz, {} channels, {:?}, {} bps",
            codec.name(),
            config.sample_rate,
            config.channels,
            format,
            config.bit_rate
        );

        Ok(Self {
            kind: MediaKind::Audio,
            codec_name: codec.name().to_string(),
            codec_id: codec.id(),
            slot: EncoderSlot::Pending {
                encoder: PendingEncoder::Audio(encoder),
                options,
            },
            time_base,
            small_last_frame: codec.capabilities().contains(Capabilities::SMALL_LAST_FRAME),
            sample_format: Some(format),
        })
    }

    pub fn video(config: &VideoConfig, global_header: bool) -> anyhow::Result<Self> {
        let codec = ffmpeg_next::encoder::find_by_name(&config.codec)
            .ok_or(anyhow::anyhow!("codec not found: {}", config.codec))?;
        let capabilities = codec.video()?;
        let format = config.pixel_format.to_ffmpeg();
        if let Some(mut formats) = capabilities.formats() {
            if !formats.any(|f| f == format) {
                anyhow::bail!("{} does not support pixel format {:?}", codec.name(), format);
            }
        }

        let mut encoder = codec::Context::new_with_codec(codec).encoder().video()?;
        encoder.set_width(config.width);
        encoder.set_height(config.height);
        encoder.set_format(format);
        encoder.set_frame_rate(Some(config.frame_rate()));
        let time_base = config.time_base();
        encoder.set_time_base(time_base);
        encoder.set_gop(config.gop_size);
        encoder.set_max_b_frames(config.max_b_frames);
        encoder.set_bit_rate(config.bit_rate);
        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut options = Dictionary::new();
        if let Some(preset) = &config.preset {
            options.set("preset", preset);
        }
        if let Some(tune) = &config.tune {
            options.set("tune", tune);
        }
        if let Some(profile) = &config.profile {
            options.set("profile", profile);
        }

        log::info!(
            "configured video encoder {}: {}x{} @ {}/{} fps, gop {}, {} bps",
            codec.name(),
            config.width,
            config.height,
            config.frame_rate.0,
            config.frame_rate.1,
            config.gop_size,
            config.bit_rate
        );

        Ok(Self {
            kind: MediaKind::Video,
            codec_name: codec.name().to_string(),
            codec_id: codec.id(),
            slot: EncoderSlot::Pending {
                encoder: PendingEncoder::Video(encoder),
                options,
            },
            time_base,
            small_last_frame: false,
            sample_format: None,
        })
    }

    pub fn codec_id(&self) -> codec::Id {
        self.codec_id
    }

    /// Input sample format chosen for an audio encoder.
    pub fn sample_format(&self) -> Option<Sample> {
        self.sample_format
    }

    fn opened(&mut self) -> anyhow::Result<&mut EncoderType> {
        match &mut self.slot {
            EncoderSlot::Open(encoder) => Ok(encoder),
            _ => anyhow::bail!("{} encoder is not open", self.codec_name),
        }
    }
}

impl EncoderBackend for FfmpegEncoder {
    type Frame = RawFrame;

    fn open(&mut self) -> anyhow::Result<EncoderInfo> {
        let EncoderSlot::Pending { encoder, options } =
            std::mem::replace(&mut self.slot, EncoderSlot::Released)
        else {
            anyhow::bail!("{} encoder already opened", self.codec_name);
        };

        let (opened, frame_size) = match encoder {
            PendingEncoder::Audio(encoder) => {
                let opened = encoder.open_with(options)?;
                let frame_size = match opened.frame_size() {
                    0 => None,
                    n => Some(n as usize),
                };
                (EncoderType::Audio(opened), frame_size)
            }
            PendingEncoder::Video(encoder) => (EncoderType::Video(encoder.open_with(options)?), None),
        };
        log::info!("encoder opened successfully: {}", self.codec_name);

        self.time_base = opened.time_base();
        let parameters = opened.parameters();
        let extradata = get_extradata(&parameters)
            .map(Bytes::copy_from_slice)
            .unwrap_or_default();
        let (frame_duration, nal_framing) = match self.kind {
            MediaKind::Audio => (frame_size.unwrap_or(1024) as i64, None),
            // libavcodec H.264 encoders emit start-code delimited packets
            MediaKind::Video => (1, Some(NalFraming::StartCode)),
        };
        self.slot = EncoderSlot::Open(opened);

        Ok(EncoderInfo {
            time_base: self.time_base,
            frame_size,
            frame_duration,
            extradata,
            parameters: Some(parameters),
            small_last_frame: self.small_last_frame,
            nal_framing,
        })
    }

    fn send_frame(&mut self, frame: Option<&RawFrame>) -> anyhow::Result<SendOutcome> {
        let encoder = self.opened()?;
        match frame {
            Some(frame) => encoder.send_frame(frame),
            None => encoder.send_eof(),
        }
    }

    fn receive_packet(&mut self) -> anyhow::Result<EncodeStep> {
        let time_base = self.time_base;
        self.opened()?.encoder_receive_packet(time_base)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::testing::{FakeEncoder, FakeFrame};

    /// Replays a fixed sequence of backend answers.
    struct ScriptedEncoder {
        sends: VecDeque<anyhow::Result<SendOutcome>>,
        steps: VecDeque<EncodeStep>,
    }

    impl EncoderBackend for ScriptedEncoder {
        type Frame = FakeFrame;

        fn open(&mut self) -> anyhow::Result<EncoderInfo> {
            Ok(EncoderInfo {
                time_base: Rational::new(1, 48000),
                frame_size: Some(1024),
                frame_duration: 1024,
                extradata: Bytes::new(),
                parameters: None,
                small_last_frame: true,
                nal_framing: None,
            })
        }

        fn send_frame(&mut self, _frame: Option<&FakeFrame>) -> anyhow::Result<SendOutcome> {
            self.sends.pop_front().unwrap_or(Ok(SendOutcome::Accepted))
        }

        fn receive_packet(&mut self) -> anyhow::Result<EncodeStep> {
            Ok(self.steps.pop_front().unwrap_or(EncodeStep::NeedsInput))
        }
    }

    fn packet(pts: i64) -> EncodeStep {
        EncodeStep::Packet(EncodedPacket::new(vec![1, 2, 3], pts, Rational::new(1, 48000)))
    }

    fn frame(pts: i64) -> FakeFrame {
        FakeFrame::new(pts, 1024)
    }

    #[test]
    fn test_flush_drains_everything_once() {
        let mut session = EncoderSession::new(3, FakeEncoder::audio(4));
        session.open().unwrap();
        let mut pts = Vec::new();
        for i in 0..20 {
            let out = session.submit(Some(&frame(i * 1024))).unwrap();
            pts.extend(out.iter().map(|p| p.pts));
        }
        // lookahead of four frames holds back the tail
        assert_eq!(pts.len(), 16);
        let tail = session.submit(None).unwrap();
        assert_eq!(tail.len(), 4);
        pts.extend(tail.iter().map(|p| p.pts));

        let expected: Vec<i64> = (0..20).map(|i| i * 1024).collect();
        assert_eq!(pts, expected);
        assert_eq!(session.state(), EncoderState::Closed);
        assert_eq!(session.frames_sent(), 20);
        assert_eq!(session.packets_received(), 20);
        assert!(session.submit(None).unwrap().is_empty());
        assert!(tail.iter().all(|p| p.stream_index == 3 && p.duration == 1024));
    }

    #[test]
    fn test_submit_requires_open() {
        let mut session = EncoderSession::new(0, FakeEncoder::audio(0));
        let err = session.submit(Some(&frame(0))).unwrap_err();
        assert!(matches!(err, MuxError::Protocol { stream: 0, .. }));
    }

    #[test]
    fn test_frame_after_eof_is_protocol_error() {
        let mut session = EncoderSession::new(1, FakeEncoder::audio(0));
        session.open().unwrap();
        session.submit(None).unwrap();
        let err = session.submit(Some(&frame(0))).unwrap_err();
        assert!(matches!(err, MuxError::Protocol { stream: 1, .. }));
    }

    #[test]
    fn test_pending_output_is_drained_and_retried() {
        let backend = ScriptedEncoder {
            sends: VecDeque::from(vec![Ok(SendOutcome::OutputPending), Ok(SendOutcome::Accepted)]),
            steps: VecDeque::from(vec![packet(0), EncodeStep::NeedsInput, packet(1024)]),
        };
        let mut session = EncoderSession::new(0, backend);
        session.open().unwrap();
        let out = session.submit(Some(&frame(2048))).unwrap();
        let pts: Vec<i64> = out.iter().map(|p| p.pts).collect();
        assert_eq!(pts, vec![0, 1024]);
        assert_eq!(session.protocol_violations(), 1);
        assert_eq!(session.frames_sent(), 1);
    }

    #[test]
    fn test_repeated_pending_is_fatal() {
        let backend = ScriptedEncoder {
            sends: VecDeque::from(vec![
                Ok(SendOutcome::OutputPending),
                Ok(SendOutcome::OutputPending),
            ]),
            steps: VecDeque::new(),
        };
        let mut session = EncoderSession::new(2, backend);
        session.open().unwrap();
        let err = session.submit(Some(&frame(0))).unwrap_err();
        assert!(matches!(
            err,
            MuxError::Encoding {
                stream: 2,
                stage: Stage::Encode,
                ..
            }
        ));
    }

    #[test]
    fn test_backend_failure_names_stream() {
        let backend = ScriptedEncoder {
            sends: VecDeque::from(vec![Err(anyhow::anyhow!("device lost"))]),
            steps: VecDeque::new(),
        };
        let mut session = EncoderSession::new(5, backend);
        session.open().unwrap();
        let err = session.submit(Some(&frame(0))).unwrap_err();
        assert_eq!(err.stream(), Some(5));
        assert!(err.to_string().contains("device lost"));
    }

    #[test]
    fn test_needs_input_while_draining_is_fatal() {
        let backend = ScriptedEncoder {
            sends: VecDeque::new(),
            steps: VecDeque::from(vec![packet(0), EncodeStep::NeedsInput]),
        };
        let mut session = EncoderSession::new(0, backend);
        session.open().unwrap();
        assert!(session.submit(None).is_err());
    }

    #[test]
    fn test_missing_duration_is_filled() {
        let mut session = EncoderSession::new(0, FakeEncoder::video(0, 1));
        session.open().unwrap();
        let out = session.submit(Some(&FakeFrame::new(0, 0))).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].duration, 1);
        assert_eq!(out[0].time_base, Rational::new(1, 25));
    }

    #[test]
    fn test_ffmpeg_aac_round_trip() -> anyhow::Result<()> {
        ffmpeg_next::init()?;
        if ffmpeg_next::encoder::find(codec::Id::AAC).is_none() {
            eprintln!("skip: no AAC encoder");
            return Ok(());
        }
        let config = AudioConfig {
            sample_rate: 48000,
            bit_rate: 128_000,
            ..Default::default()
        };
        let mut session = EncoderSession::new(0, FfmpegEncoder::audio(&config, false)?);
        let info = session.open()?;
        let frame_size = info.frame_size.unwrap_or(1024);
        let format = session.backend().sample_format().unwrap_or(Sample::F32(Type::Planar));

        let mut packets = Vec::new();
        for i in 0..10 {
            let mut frame = ffmpeg_next::frame::Audio::new(format, frame_size, ChannelLayout::STEREO);
            frame.set_rate(48000);
            frame.set_pts(Some((i * frame_size) as i64));
            for plane in 0..frame.planes() {
                for b in frame.data_mut(plane) {
                    *b = 0;
                }
            }
            packets.extend(session.submit(Some(&RawFrame::from(frame)))?);
        }
        packets.extend(session.submit(None)?);
        assert_eq!(session.state(), EncoderState::Closed);
        assert!(packets.len() >= 10);
        assert!(packets.windows(2).all(|w| w[0].dts <= w[1].dts));
        Ok(())
    }
}
