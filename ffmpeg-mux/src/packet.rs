use bytes::Bytes;
use ffmpeg_next::Rational;

/// One compressed unit on its way from an encoder to the container.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPacket {
    pub data: Bytes,
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
    pub is_key: bool,
    pub stream_index: usize,
    pub time_base: Rational,
}

impl EncodedPacket {
    pub fn new(data: impl Into<Bytes>, pts: i64, time_base: Rational) -> Self {
        Self {
            data: data.into(),
            pts,
            dts: pts,
            duration: 0,
            is_key: false,
            stream_index: 0,
            time_base,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// End of the unit on its stream timeline.
    pub fn end(&self) -> i64 {
        self.pts + self.duration
    }

    /// Copies an encoder packet out of FFmpeg. Returns None when the packet
    /// carries neither pts nor dts.
    pub fn from_ffmpeg(packet: &ffmpeg_next::Packet, time_base: Rational) -> Option<Self> {
        let pts = packet.pts().or(packet.dts())?;
        let dts = packet.dts().unwrap_or(pts);
        Some(Self {
            data: packet
                .data()
                .map(Bytes::copy_from_slice)
                .unwrap_or_default(),
            pts,
            dts,
            duration: packet.duration(),
            is_key: packet.is_key(),
            stream_index: packet.stream(),
            time_base,
        })
    }

    pub fn to_ffmpeg(&self) -> ffmpeg_next::Packet {
        let mut packet = ffmpeg_next::Packet::copy(&self.data);
        packet.set_pts(Some(self.pts));
        packet.set_dts(Some(self.dts));
        packet.set_duration(self.duration);
        packet.set_stream(self.stream_index);
        packet.set_position(-1);
        if self.is_key {
            packet.set_flags(ffmpeg_next::codec::packet::Flags::KEY);
        }
        packet
    }
}
