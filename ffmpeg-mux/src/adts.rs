use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::FramingError;

/// Size of an ADTS header without CRC.
pub const ADTS_HEADER_LEN: usize = 7;

/// Largest value the 13-bit frame length field can carry.
pub const MAX_FRAME_LEN: usize = 0x1FFF;

/// Sampling frequencies indexed by the 4-bit ADTS frequency index.
pub const SAMPLING_FREQUENCIES: [u32; 12] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000,
];

/// AAC object type as signalled in the 2-bit ADTS profile field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AacProfile {
    Main,
    #[default]
    Lc,
    Ssr,
    Ltp,
}

impl AacProfile {
    pub fn adts_bits(self) -> u8 {
        match self {
            AacProfile::Main => 0,
            AacProfile::Lc => 1,
            AacProfile::Ssr => 2,
            AacProfile::Ltp => 3,
        }
    }

    pub fn from_adts_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => AacProfile::Main,
            1 => AacProfile::Lc,
            2 => AacProfile::Ssr,
            _ => AacProfile::Ltp,
        }
    }

    /// Value of the libavcodec `profile` option.
    pub fn ffmpeg_option(self) -> &'static str {
        match self {
            AacProfile::Main => "aac_main",
            AacProfile::Lc => "aac_low",
            AacProfile::Ssr => "aac_ssr",
            AacProfile::Ltp => "aac_ltp",
        }
    }
}

pub fn frequency_index(sample_rate: u32) -> Result<u8, FramingError> {
    SAMPLING_FREQUENCIES
        .iter()
        .position(|&rate| rate == sample_rate)
        .map(|i| i as u8)
        .ok_or(FramingError::UnsupportedSampleRate(sample_rate))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    pub profile: AacProfile,
    pub frequency_index: u8,
    pub channel_config: u8,
    /// Header plus payload, in bytes.
    pub frame_length: u16,
}

impl AdtsHeader {
    pub fn new(
        sample_rate: u32,
        profile: AacProfile,
        channels: u16,
        payload_len: usize,
    ) -> Result<Self, FramingError> {
        let frequency_index = frequency_index(sample_rate)?;
        if channels == 0 || channels > 7 {
            return Err(FramingError::InvalidChannelConfig(channels));
        }
        let frame_length = payload_len + ADTS_HEADER_LEN;
        if frame_length > MAX_FRAME_LEN {
            return Err(FramingError::FrameTooLarge(frame_length));
        }
        Ok(Self {
            profile,
            frequency_index,
            channel_config: channels as u8,
            frame_length: frame_length as u16,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        SAMPLING_FREQUENCIES[self.frequency_index as usize]
    }

    pub fn payload_len(&self) -> usize {
        self.frame_length as usize - ADTS_HEADER_LEN
    }

    /// Sync word 0xFFF, MPEG-4, layer 0, protection absent, one raw data
    /// block, buffer fullness 0x7FF (VBR).
    pub fn to_bytes(&self) -> [u8; ADTS_HEADER_LEN] {
        let len = self.frame_length as usize;
        let ch = self.channel_config;
        [
            0xFF,
            0xF1,
            (self.profile.adts_bits() << 6) | (self.frequency_index << 2) | ((ch >> 2) & 0x01),
            ((ch & 0x03) << 6) | ((len >> 11) & 0x03) as u8,
            ((len >> 3) & 0xFF) as u8,
            (((len & 0x07) << 5) as u8) | 0x1F,
            0xFC,
        ]
    }

    pub fn parse(data: &[u8]) -> Result<Self, FramingError> {
        if data.len() < ADTS_HEADER_LEN {
            return Err(FramingError::MalformedHeader("fewer than 7 bytes"));
        }
        if data[0] != 0xFF || data[1] & 0xF0 != 0xF0 {
            return Err(FramingError::MalformedHeader("missing sync word"));
        }
        let frequency_index = (data[2] >> 2) & 0x0F;
        if frequency_index as usize >= SAMPLING_FREQUENCIES.len() {
            return Err(FramingError::MalformedHeader("reserved frequency index"));
        }
        let channel_config = ((data[2] & 0x01) << 2) | (data[3] >> 6);
        let frame_length = (((data[3] & 0x03) as u16) << 11)
            | ((data[4] as u16) << 3)
            | ((data[5] >> 5) as u16);
        if (frame_length as usize) < ADTS_HEADER_LEN {
            return Err(FramingError::MalformedHeader("frame length below header size"));
        }
        Ok(Self {
            profile: AacProfile::from_adts_bits(data[2] >> 6),
            frequency_index,
            channel_config,
            frame_length,
        })
    }
}

/// Prefixes raw AAC access units with ADTS headers.
#[derive(Debug, Clone)]
pub struct AdtsFramer {
    sample_rate: u32,
    profile: AacProfile,
    channels: u16,
}

impl AdtsFramer {
    /// Fails up front when the stream parameters can never produce a valid
    /// header.
    pub fn new(sample_rate: u32, profile: AacProfile, channels: u16) -> Result<Self, FramingError> {
        AdtsHeader::new(sample_rate, profile, channels, 0)?;
        Ok(Self {
            sample_rate,
            profile,
            channels,
        })
    }

    pub fn frame(&self, payload: &[u8]) -> Result<Bytes, FramingError> {
        let header = AdtsHeader::new(self.sample_rate, self.profile, self.channels, payload.len())?;
        let mut out = BytesMut::with_capacity(header.frame_length as usize);
        out.put_slice(&header.to_bytes());
        out.put_slice(payload);
        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bytes_44100_stereo() {
        let header = AdtsHeader::new(44100, AacProfile::Lc, 2, 100).unwrap();
        assert_eq!(
            header.to_bytes(),
            [0xFF, 0xF1, 0x50, 0x80, 0x0D, 0x7F, 0xFC]
        );
    }

    #[test]
    fn test_round_trip_all_rates() {
        let profiles = [AacProfile::Main, AacProfile::Lc, AacProfile::Ssr, AacProfile::Ltp];
        for (index, &rate) in SAMPLING_FREQUENCIES.iter().enumerate() {
            for profile in profiles {
                for channels in [1u16, 2, 6] {
                    let payload_len = 371 + index * 13;
                    let header = AdtsHeader::new(rate, profile, channels, payload_len).unwrap();
                    let parsed = AdtsHeader::parse(&header.to_bytes()).unwrap();
                    assert_eq!(parsed, header);
                    assert_eq!(parsed.sample_rate(), rate);
                    assert_eq!(parsed.channel_config as u16, channels);
                    assert_eq!(parsed.payload_len(), payload_len);
                    assert_eq!(parsed.profile, profile);
                }
            }
        }
    }

    #[test]
    fn test_unsupported_rate_is_rejected() {
        for rate in [7350, 44000, 0, 192000] {
            assert_eq!(
                AdtsHeader::new(rate, AacProfile::Lc, 2, 10),
                Err(FramingError::UnsupportedSampleRate(rate))
            );
            assert!(AdtsFramer::new(rate, AacProfile::Lc, 2).is_err());
        }
    }

    #[test]
    fn test_frame_length_limit() {
        let max_payload = MAX_FRAME_LEN - ADTS_HEADER_LEN;
        let header = AdtsHeader::new(48000, AacProfile::Lc, 2, max_payload).unwrap();
        assert_eq!(header.frame_length as usize, MAX_FRAME_LEN);
        assert_eq!(AdtsHeader::parse(&header.to_bytes()).unwrap(), header);
        assert_eq!(
            AdtsHeader::new(48000, AacProfile::Lc, 2, max_payload + 1),
            Err(FramingError::FrameTooLarge(MAX_FRAME_LEN + 1))
        );
    }

    #[test]
    fn test_channel_config_range() {
        assert!(AdtsHeader::new(48000, AacProfile::Lc, 0, 1).is_err());
        assert!(AdtsHeader::new(48000, AacProfile::Lc, 8, 1).is_err());
        let header = AdtsHeader::new(48000, AacProfile::Main, 7, 1).unwrap();
        let parsed = AdtsHeader::parse(&header.to_bytes()).unwrap();
        assert_eq!(parsed.channel_config, 7);
        assert_eq!(parsed.profile, AacProfile::Main);
    }

    #[test]
    fn test_framer_prefixes_payload() {
        let framer = AdtsFramer::new(48000, AacProfile::Lc, 2).unwrap();
        let payload = [0x21, 0x10, 0x04, 0x60, 0x8C];
        let framed = framer.frame(&payload).unwrap();
        assert_eq!(framed.len(), ADTS_HEADER_LEN + payload.len());
        assert_eq!(&framed[ADTS_HEADER_LEN..], &payload[..]);
        let header = AdtsHeader::parse(&framed).unwrap();
        assert_eq!(header.frame_length as usize, framed.len());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(AdtsHeader::parse(&[0xFF, 0xF1]).is_err());
        assert!(AdtsHeader::parse(&[0x00, 0xF1, 0x50, 0x80, 0x0D, 0x7F, 0xFC]).is_err());
        // frequency index 12 (7350 Hz) is not accepted
        assert!(AdtsHeader::parse(&[0xFF, 0xF1, 0x70, 0x80, 0x0D, 0x7F, 0xFC]).is_err());
    }
}
