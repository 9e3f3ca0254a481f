use ffmpeg_next::Rational;

use crate::error::{MuxError, Result, Stage};
use crate::output::Container;
use crate::packet::EncodedPacket;
use crate::stream::{MediaKind, StreamSpec};
use crate::timestamp::rescale;

/// Per-stream bookkeeping kept by the muxer, in the container time base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamStats {
    pub kind: MediaKind,
    pub time_base: Rational,
    pub packets: u64,
    pub bytes: u64,
    /// Largest `pts + duration` written so far.
    pub end: i64,
    pub last_dts: Option<i64>,
}

/// Interleaves normalized packets into a container, rescaling timestamps
/// and keeping dts monotonic per stream.
pub struct Muxer<C: Container> {
    container: C,
    streams: Vec<StreamStats>,
    started: bool,
    finished: bool,
    trailer_failed: bool,
}

impl<C: Container> Muxer<C> {
    pub fn new(container: C) -> Self {
        Self {
            container,
            streams: Vec::new(),
            started: false,
            finished: false,
            trailer_failed: false,
        }
    }

    /// Index the next [`Muxer::add_stream`] call will return.
    pub fn next_stream_index(&self) -> usize {
        self.streams.len()
    }

    pub fn add_stream(&mut self, spec: StreamSpec) -> Result<usize> {
        if self.started {
            return Err(MuxError::configuration("stream added after the header was written"));
        }
        let index = self.container.add_stream(&spec)?;
        if index != self.streams.len() {
            return Err(MuxError::configuration(format!(
                "container assigned stream index {}, expected {}",
                index,
                self.streams.len()
            )));
        }
        log::info!(
            "stream {}: {} {:?}, encoder time base {}",
            index,
            spec.kind(),
            spec.codec_id(),
            spec.encoder_time_base()
        );
        self.streams.push(StreamStats {
            kind: spec.kind(),
            time_base: spec.output_time_base(),
            packets: 0,
            bytes: 0,
            end: 0,
            last_dts: None,
        });
        Ok(index)
    }

    /// Writes the container header and picks up the time bases the container
    /// settled on.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        if self.streams.is_empty() {
            return Err(MuxError::configuration("no streams to mux"));
        }
        self.container.write_header()?;
        self.started = true;
        for (index, stream) in self.streams.iter_mut().enumerate() {
            if let Some(time_base) = self.container.time_base(index) {
                if time_base != stream.time_base {
                    log::debug!(
                        "stream {}: container time base {} replaces {}",
                        index,
                        time_base,
                        stream.time_base
                    );
                }
                stream.time_base = time_base;
            }
        }
        Ok(())
    }

    pub fn write_unit(&mut self, mut packet: EncodedPacket) -> Result<()> {
        let index = packet.stream_index;
        if !self.started {
            return Err(MuxError::protocol(index, "packet written before the header"));
        }
        if self.finished || self.trailer_failed {
            return Err(MuxError::protocol(index, "packet written after the trailer"));
        }
        let Some(stream) = self.streams.get_mut(index) else {
            return Err(MuxError::protocol(index, "packet for an undeclared stream"));
        };

        let from = packet.time_base;
        let to = stream.time_base;
        packet.pts = rescale(packet.pts, from, to);
        packet.dts = rescale(packet.dts, from, to);
        packet.duration = rescale(packet.duration, from, to);
        packet.time_base = to;

        if let Some(previous) = stream.last_dts {
            if packet.dts < previous {
                return Err(MuxError::Ordering {
                    stream: index,
                    previous,
                    current: packet.dts,
                });
            }
        }

        self.container.write_packet(&packet)?;

        stream.last_dts = Some(packet.dts);
        stream.packets += 1;
        stream.bytes += packet.size() as u64;
        stream.end = stream.end.max(packet.end());
        Ok(())
    }

    /// Writes the trailer. Once it succeeds, later calls have no effect; once
    /// it fails, later calls fail too.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        if self.trailer_failed {
            return Err(MuxError::io(
                None,
                Stage::Finalize,
                0,
                0,
                "trailer write already failed",
            ));
        }
        if !self.started {
            self.start()?;
        }
        if let Err(e) = self.container.write_trailer() {
            self.trailer_failed = true;
            return Err(e);
        }
        self.finished = true;
        for (index, stream) in self.streams.iter().enumerate() {
            log::info!(
                "stream {} finished: {} packets, {} bytes, ends at {}/{}",
                index,
                stream.packets,
                stream.bytes,
                stream.end,
                stream.time_base
            );
        }
        Ok(())
    }

    pub fn stream_stats(&self, index: usize) -> Option<&StreamStats> {
        self.streams.get(index)
    }

    pub fn streams(&self) -> &[StreamStats] {
        &self.streams
    }

    /// True once the trailer has been written.
    pub fn is_complete(&self) -> bool {
        self.finished
    }

    pub fn container(&self) -> &C {
        &self.container
    }
}

impl<C: Container> Drop for Muxer<C> {
    fn drop(&mut self) {
        if self.started && !self.finished {
            log::warn!("muxer dropped before the trailer was written, output is incomplete");
        }
    }
}
