use ffmpeg_next::Rational;

use crate::adapter::FrameAdapter;
use crate::bsf::BitstreamFramer;
use crate::encoder::{EncoderBackend, EncoderSession};
use crate::error::{MuxError, Result, Stage};
use crate::muxer::Muxer;
use crate::output::Container;
use crate::pacer::{Candidate, Pacer};
use crate::packet::EncodedPacket;
use crate::source::FrameSource;
use crate::stream::{MediaKind, StreamSpec};
use crate::timestamp::to_seconds;

/// One stream as the control loop drives it.
pub trait PacedStream {
    fn stream_index(&self) -> usize;

    fn kind(&self) -> MediaKind;

    /// Timestamp of the next frame to encode, in [`PacedStream::time_base`].
    fn next_pts(&self) -> i64;

    fn time_base(&self) -> Rational;

    fn is_finished(&self) -> bool;

    /// Moves the stream one step: pull a source frame, adapt, encode and
    /// normalize. Once the source is dry each call drains a little more,
    /// until the encoder is closed.
    fn advance(&mut self) -> Result<Vec<EncodedPacket>>;
}

/// Source, adapter, encoder session and framer of one stream.
pub struct StreamContext<S, A, B>
where
    B: EncoderBackend,
{
    kind: MediaKind,
    source: S,
    adapter: A,
    session: EncoderSession<B>,
    framer: Option<BitstreamFramer>,
    source_done: bool,
    finished: bool,
}

impl<S, A, B> StreamContext<S, A, B>
where
    S: FrameSource,
    A: FrameAdapter<Input = S::Frame, Output = B::Frame>,
    B: EncoderBackend,
{
    /// `session` must already be open.
    pub fn new(
        kind: MediaKind,
        source: S,
        adapter: A,
        session: EncoderSession<B>,
        framer: Option<BitstreamFramer>,
    ) -> Self {
        Self {
            kind,
            source,
            adapter,
            session,
            framer,
            source_done: false,
            finished: false,
        }
    }

    fn adapt_error(&self, err: anyhow::Error) -> MuxError {
        MuxError::encoding(self.session.stream_index(), Stage::Adapt, format!("{:#}", err))
    }

    fn encode(&mut self, frame: Option<&B::Frame>) -> Result<Vec<EncodedPacket>> {
        let packets = self.session.submit(frame)?;
        self.normalize(packets)
    }

    fn normalize(&mut self, packets: Vec<EncodedPacket>) -> Result<Vec<EncodedPacket>> {
        let Some(framer) = self.framer.as_mut() else {
            return Ok(packets);
        };
        let index = self.session.stream_index();
        packets
            .into_iter()
            .map(|packet| framer.apply(packet).map_err(|e| MuxError::framing(index, e)))
            .collect()
    }
}

impl<S, A, B> PacedStream for StreamContext<S, A, B>
where
    S: FrameSource,
    A: FrameAdapter<Input = S::Frame, Output = B::Frame>,
    B: EncoderBackend,
{
    fn stream_index(&self) -> usize {
        self.session.stream_index()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn next_pts(&self) -> i64 {
        self.adapter.next_pts()
    }

    fn time_base(&self) -> Rational {
        self.session.time_base()
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn advance(&mut self) -> Result<Vec<EncodedPacket>> {
        if self.finished {
            return Ok(Vec::new());
        }

        let ready = self.adapter.pending().map_err(|e| self.adapt_error(e))?;
        if let Some(frame) = ready {
            return self.encode(Some(&frame));
        }

        if !self.source_done {
            let next = self
                .source
                .next_frame()
                .map_err(|e| self.adapt_error(e.context("frame source")))?;
            match next {
                Some(raw) => {
                    let frame = self.adapter.normalize(raw).map_err(|e| self.adapt_error(e))?;
                    return match frame {
                        Some(frame) => self.encode(Some(&frame)),
                        None => Ok(Vec::new()),
                    };
                }
                None => {
                    self.source_done = true;
                    log::debug!("stream {} source exhausted", self.stream_index());
                }
            }
        }

        let tail = self.adapter.flush().map_err(|e| self.adapt_error(e))?;
        match tail {
            Some(frame) => self.encode(Some(&frame)),
            None => {
                let packets = self.encode(None)?;
                self.finished = true;
                Ok(packets)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSummary {
    pub index: usize,
    pub kind: MediaKind,
    pub packets: u64,
    pub bytes: u64,
    /// Largest pts + duration, in `time_base`.
    pub end: i64,
    pub time_base: Rational,
}

impl StreamSummary {
    pub fn duration_secs(&self) -> f64 {
        to_seconds(self.end, self.time_base)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub streams: Vec<StreamSummary>,
}

impl RunSummary {
    pub fn packets(&self) -> u64 {
        self.streams.iter().map(|s| s.packets).sum()
    }

    pub fn bytes(&self) -> u64 {
        self.streams.iter().map(|s| s.bytes).sum()
    }
}

/// Single-threaded control loop: the pacer picks a stream, the stream
/// advances, and its packets go straight to the muxer.
pub struct Pipeline<C: Container> {
    muxer: Muxer<C>,
    pacer: Pacer,
    lanes: Vec<Box<dyn PacedStream>>,
}

impl<C: Container> Pipeline<C> {
    pub fn new(container: C, pacer: Pacer) -> Self {
        Self {
            muxer: Muxer::new(container),
            pacer,
            lanes: Vec::new(),
        }
    }

    /// Index the next stream will be assigned. Build the stream's session
    /// with it before calling [`Pipeline::add_stream`].
    pub fn next_stream_index(&self) -> usize {
        self.muxer.next_stream_index()
    }

    pub fn add_stream<L: PacedStream + 'static>(&mut self, spec: StreamSpec, lane: L) -> Result<usize> {
        if lane.stream_index() != self.muxer.next_stream_index() {
            return Err(MuxError::configuration(format!(
                "stream built for index {}, next index is {}",
                lane.stream_index(),
                self.muxer.next_stream_index()
            )));
        }
        if lane.kind() != spec.kind() {
            return Err(MuxError::configuration(format!(
                "{} stream declared with a {} encoder",
                spec.kind(),
                lane.kind()
            )));
        }
        let index = self.muxer.add_stream(spec)?;
        self.lanes.push(Box::new(lane));
        Ok(index)
    }

    pub fn muxer(&self) -> &Muxer<C> {
        &self.muxer
    }

    pub fn run(&mut self) -> Result<RunSummary> {
        self.muxer.start()?;
        loop {
            let candidates: Vec<Candidate> = self
                .lanes
                .iter()
                .enumerate()
                .filter(|(_, lane)| !lane.is_finished())
                .map(|(index, lane)| Candidate {
                    index,
                    kind: lane.kind(),
                    next_pts: lane.next_pts(),
                    time_base: lane.time_base(),
                })
                .collect();
            let Some(index) = self.pacer.select(&candidates) else {
                break;
            };
            for packet in self.lanes[index].advance()? {
                self.muxer.write_unit(packet)?;
            }
        }
        self.muxer.finish()?;

        let streams = self
            .muxer
            .streams()
            .iter()
            .enumerate()
            .map(|(index, stats)| StreamSummary {
                index,
                kind: stats.kind,
                packets: stats.packets,
                bytes: stats.bytes,
                end: stats.end,
                time_base: stats.time_base,
            })
            .collect();
        Ok(RunSummary { streams })
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
