use std::io::{ErrorKind, Write};

use bytes::{Buf, BufMut, BytesMut};
use ffmpeg_next::Rational;

use crate::error::{MuxError, Result, Stage};
use crate::output::Container;
use crate::packet::EncodedPacket;
use crate::stream::{MediaKind, StreamSpec};

pub const UNIT_STREAM_MAGIC: &[u8; 4] = b"AVMX";
pub const UNIT_STREAM_TRAILER: &[u8; 4] = b"AVMT";
pub const UNIT_STREAM_VERSION: u8 = 1;

const FLAG_KEY: u8 = 0x01;

fn kind_code(kind: MediaKind) -> u8 {
    match kind {
        MediaKind::Audio => 0,
        MediaKind::Video => 1,
    }
}

/// Writes `buf` fully, reporting how far it got on failure.
fn write_counted<W: Write>(
    writer: &mut W,
    stream: Option<usize>,
    stage: Stage,
    buf: &[u8],
) -> Result<()> {
    let mut written = 0;
    while written < buf.len() {
        match writer.write(&buf[written..]) {
            Ok(0) => {
                return Err(MuxError::io(
                    stream,
                    stage,
                    buf.len(),
                    written,
                    "writer accepted no bytes",
                ));
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(MuxError::io(stream, stage, buf.len(), written, e.to_string())),
        }
    }
    Ok(())
}

fn flush<W: Write>(writer: &mut W, stage: Stage) -> Result<()> {
    writer
        .flush()
        .map_err(|e| MuxError::io(None, stage, 0, 0, format!("flush: {}", e)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamEntry {
    pub index: usize,
    pub kind: MediaKind,
    pub time_base: Rational,
}

/// Self-describing stream of length-delimited units.
///
/// Header: `AVMX`, version `u8`, stream count `u8`, then per stream index
/// `u8`, kind `u8` (0 audio, 1 video), time base num/den as `i32`. Each unit:
/// index `u8`, pts/dts/duration `i64`, flags `u8` (bit 0 key), payload length
/// `u32`, payload. Trailer: `AVMT` and the unit count as `u64`. All integers
/// are big-endian.
pub struct UnitStreamSink<W: Write> {
    writer: W,
    streams: Vec<StreamEntry>,
    units: u64,
    have_written_header: bool,
    have_written_trailer: bool,
}

impl<W: Write> UnitStreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            streams: Vec::new(),
            units: 0,
            have_written_header: false,
            have_written_trailer: false,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn units(&self) -> u64 {
        self.units
    }
}

impl<W: Write> Container for UnitStreamSink<W> {
    fn add_stream(&mut self, spec: &StreamSpec) -> Result<usize> {
        if self.have_written_header {
            return Err(MuxError::configuration("stream added after the header was written"));
        }
        if self.streams.len() >= u8::MAX as usize {
            return Err(MuxError::configuration("too many streams for a unit stream"));
        }
        let index = self.streams.len();
        self.streams.push(StreamEntry {
            index,
            kind: spec.kind(),
            time_base: spec.output_time_base(),
        });
        Ok(index)
    }

    fn write_header(&mut self) -> Result<()> {
        let mut header = BytesMut::with_capacity(6 + self.streams.len() * 10);
        header.put_slice(UNIT_STREAM_MAGIC);
        header.put_u8(UNIT_STREAM_VERSION);
        header.put_u8(self.streams.len() as u8);
        for stream in &self.streams {
            header.put_u8(stream.index as u8);
            header.put_u8(kind_code(stream.kind));
            header.put_i32(stream.time_base.numerator());
            header.put_i32(stream.time_base.denominator());
        }
        write_counted(&mut self.writer, None, Stage::Mux, &header)?;
        self.have_written_header = true;
        Ok(())
    }

    fn time_base(&self, index: usize) -> Option<Rational> {
        self.streams.get(index).map(|s| s.time_base)
    }

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()> {
        let mut unit = BytesMut::with_capacity(30 + packet.size());
        unit.put_u8(packet.stream_index as u8);
        unit.put_i64(packet.pts);
        unit.put_i64(packet.dts);
        unit.put_i64(packet.duration);
        unit.put_u8(if packet.is_key { FLAG_KEY } else { 0 });
        unit.put_u32(packet.size() as u32);
        unit.put_slice(&packet.data);
        write_counted(&mut self.writer, Some(packet.stream_index), Stage::Mux, &unit)?;
        self.units += 1;
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        if self.have_written_trailer {
            return Ok(());
        }
        self.have_written_trailer = true;
        let mut trailer = BytesMut::with_capacity(12);
        trailer.put_slice(UNIT_STREAM_TRAILER);
        trailer.put_u64(self.units);
        write_counted(&mut self.writer, None, Stage::Finalize, &trailer)?;
        flush(&mut self.writer, Stage::Finalize)
    }
}

/// Contents of a complete unit stream.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitStream {
    pub streams: Vec<StreamEntry>,
    pub units: Vec<EncodedPacket>,
}

/// Parses a unit stream written by [`UnitStreamSink`]. Fails on a missing
/// trailer or a unit count that disagrees with it.
pub fn read_unit_stream(mut data: &[u8]) -> anyhow::Result<UnitStream> {
    if data.len() < 6 || &data[..4] != UNIT_STREAM_MAGIC {
        anyhow::bail!("not a unit stream");
    }
    data.advance(4);
    let version = data.get_u8();
    if version != UNIT_STREAM_VERSION {
        anyhow::bail!("unsupported unit stream version {}", version);
    }
    let count = data.get_u8() as usize;
    if data.remaining() < count * 10 {
        anyhow::bail!("stream table truncated");
    }
    let mut streams = Vec::with_capacity(count);
    for _ in 0..count {
        let index = data.get_u8() as usize;
        let kind = match data.get_u8() {
            0 => MediaKind::Audio,
            1 => MediaKind::Video,
            other => anyhow::bail!("unknown stream kind {}", other),
        };
        let num = data.get_i32();
        let den = data.get_i32();
        streams.push(StreamEntry {
            index,
            kind,
            time_base: Rational::new(num, den),
        });
    }

    let mut units = Vec::new();
    loop {
        if data.remaining() >= 12 && &data[..4] == UNIT_STREAM_TRAILER {
            data.advance(4);
            let declared = data.get_u64();
            if declared != units.len() as u64 {
                anyhow::bail!("trailer counts {} units, found {}", declared, units.len());
            }
            return Ok(UnitStream { streams, units });
        }
        if data.remaining() < 30 {
            anyhow::bail!("unit stream ends without a trailer");
        }
        let stream_index = data.get_u8() as usize;
        let pts = data.get_i64();
        let dts = data.get_i64();
        let duration = data.get_i64();
        let flags = data.get_u8();
        let len = data.get_u32() as usize;
        if data.remaining() < len {
            anyhow::bail!("unit declares {} bytes, {} remain", len, data.remaining());
        }
        let time_base = streams
            .iter()
            .find(|s| s.index == stream_index)
            .map(|s| s.time_base)
            .ok_or_else(|| anyhow::anyhow!("unit for undeclared stream {}", stream_index))?;
        units.push(EncodedPacket {
            data: data.copy_to_bytes(len),
            pts,
            dts,
            duration,
            is_key: flags & FLAG_KEY != 0,
            stream_index,
            time_base,
        });
    }
}

/// Payloads of a single stream back to back: an `.aac` ADTS file or an
/// `.h264` Annex B file.
pub struct ElementarySink<W: Write> {
    writer: W,
    stream: Option<StreamEntry>,
    bytes: usize,
}

impl<W: Write> ElementarySink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            stream: None,
            bytes: 0,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes
    }
}

impl<W: Write> Container for ElementarySink<W> {
    fn add_stream(&mut self, spec: &StreamSpec) -> Result<usize> {
        if self.stream.is_some() {
            return Err(MuxError::configuration(
                "elementary output carries exactly one stream",
            ));
        }
        self.stream = Some(StreamEntry {
            index: 0,
            kind: spec.kind(),
            time_base: spec.output_time_base(),
        });
        Ok(0)
    }

    fn write_header(&mut self) -> Result<()> {
        Ok(())
    }

    fn time_base(&self, index: usize) -> Option<Rational> {
        self.stream.filter(|s| s.index == index).map(|s| s.time_base)
    }

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()> {
        write_counted(&mut self.writer, Some(packet.stream_index), Stage::Mux, &packet.data)?;
        self.bytes += packet.size();
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        flush(&mut self.writer, Stage::Finalize)
    }
}

/// Records everything it is given. Optionally forces every stream onto one
/// clock, the way MPEG-TS does with 90 kHz, and fails on a chosen packet.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub streams: Vec<StreamEntry>,
    pub header_written: bool,
    pub units: Vec<EncodedPacket>,
    pub trailer_count: usize,
    fixed_time_base: Option<Rational>,
    fail_at: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_base(time_base: Rational) -> Self {
        Self {
            fixed_time_base: Some(time_base),
            ..Self::default()
        }
    }

    /// Rejects packet number `n` (zero based) with an I/O error.
    pub fn failing_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    pub fn units_for(&self, index: usize) -> impl Iterator<Item = &EncodedPacket> {
        self.units.iter().filter(move |u| u.stream_index == index)
    }
}

impl Container for MemorySink {
    fn add_stream(&mut self, spec: &StreamSpec) -> Result<usize> {
        if self.header_written {
            return Err(MuxError::configuration("stream added after the header was written"));
        }
        let index = self.streams.len();
        self.streams.push(StreamEntry {
            index,
            kind: spec.kind(),
            time_base: spec.output_time_base(),
        });
        Ok(index)
    }

    fn write_header(&mut self) -> Result<()> {
        if let Some(time_base) = self.fixed_time_base {
            for stream in &mut self.streams {
                stream.time_base = time_base;
            }
        }
        self.header_written = true;
        Ok(())
    }

    fn time_base(&self, index: usize) -> Option<Rational> {
        self.streams.get(index).map(|s| s.time_base)
    }

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()> {
        if self.fail_at == Some(self.units.len()) {
            return Err(MuxError::io(
                Some(packet.stream_index),
                Stage::Mux,
                packet.size(),
                0,
                "injected write failure",
            ));
        }
        self.units.push(packet.clone());
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.trailer_count += 1;
        Ok(())
    }
}
