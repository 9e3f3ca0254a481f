use ffmpeg_next::Rational;
use ffmpeg_next::format::flag::Flags;

use crate::error::{MuxError, Result, Stage};
use crate::packet::EncodedPacket;
use crate::stream::StreamSpec;

/// A container that accepts a header, packets already rescaled to its own
/// stream time bases, and a trailer.
pub trait Container {
    /// Declares a stream and returns its container index.
    fn add_stream(&mut self, spec: &StreamSpec) -> Result<usize>;

    fn write_header(&mut self) -> Result<()>;

    /// Stream time base in effect after the header was written. Containers
    /// with a fixed clock may replace the requested one.
    fn time_base(&self, index: usize) -> Option<Rational>;

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()>;

    fn write_trailer(&mut self) -> Result<()>;

    /// Whether codec configuration belongs in stream extradata rather than
    /// in band.
    fn wants_global_header(&self) -> bool {
        false
    }
}

impl<C: Container + ?Sized> Container for &mut C {
    fn add_stream(&mut self, spec: &StreamSpec) -> Result<usize> {
        (**self).add_stream(spec)
    }

    fn write_header(&mut self) -> Result<()> {
        (**self).write_header()
    }

    fn time_base(&self, index: usize) -> Option<Rational> {
        (**self).time_base(index)
    }

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()> {
        (**self).write_packet(packet)
    }

    fn write_trailer(&mut self) -> Result<()> {
        (**self).write_trailer()
    }

    fn wants_global_header(&self) -> bool {
        (**self).wants_global_header()
    }
}

/// libavformat output context.
pub struct FfmpegOutput {
    inner: ffmpeg_next::format::context::Output,
    url: String,
    have_written_header: bool,
    have_written_trailer: bool,
}

impl FfmpegOutput {
    /// `format` forces a muxer by short name; `None` guesses from the url.
    pub fn new(url: &str, format: Option<&str>) -> Result<Self> {
        let output = match format {
            Some(format) => ffmpeg_next::format::output_as(url, format),
            None => ffmpeg_next::format::output(url),
        }
        .map_err(|e| MuxError::configuration(format!("cannot open output {}: {}", url, e)))?;
        log::info!("opened output {} ({})", url, output.format().name());
        Ok(Self {
            inner: output,
            url: url.to_string(),
            have_written_header: false,
            have_written_trailer: false,
        })
    }
}

impl Container for FfmpegOutput {
    fn add_stream(&mut self, spec: &StreamSpec) -> Result<usize> {
        if self.have_written_header {
            return Err(MuxError::configuration("stream added after the header was written"));
        }
        let mut writer_stream = self
            .inner
            .add_stream(ffmpeg_next::encoder::find(spec.codec_id()))
            .map_err(|e| MuxError::configuration(format!("cannot add {} stream: {}", spec.kind(), e)))?;
        if let Some(parameters) = spec.parameters() {
            writer_stream.set_parameters(parameters.clone());
        }
        // let the muxer pick its own tag for the codec
        unsafe {
            (*(*writer_stream.as_mut_ptr()).codecpar).codec_tag = 0;
        }
        writer_stream.set_time_base(spec.output_time_base());
        Ok(writer_stream.index())
    }

    fn write_header(&mut self) -> Result<()> {
        if self.have_written_header {
            return Ok(());
        }
        self.inner
            .write_header()
            .map_err(|e| MuxError::io(None, Stage::Mux, 0, 0, format!("{}: header: {}", self.url, e)))?;
        self.have_written_header = true;
        Ok(())
    }

    fn time_base(&self, index: usize) -> Option<Rational> {
        self.inner.stream(index).map(|stream| stream.time_base())
    }

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()> {
        let p = packet.to_ffmpeg();
        p.write(&mut self.inner).map_err(|e| {
            MuxError::io(
                Some(packet.stream_index),
                Stage::Mux,
                packet.size(),
                0,
                format!("{}: {}", self.url, e),
            )
        })?;
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        if self.have_written_header && !self.have_written_trailer {
            self.have_written_trailer = true;
            self.inner.write_trailer().map_err(|e| {
                MuxError::io(None, Stage::Finalize, 0, 0, format!("{}: trailer: {}", self.url, e))
            })?;
        }
        Ok(())
    }

    fn wants_global_header(&self) -> bool {
        self.inner.format().flags().contains(Flags::GLOBAL_HEADER)
    }
}
