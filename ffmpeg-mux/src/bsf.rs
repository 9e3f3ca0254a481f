use bytes::{BufMut, Bytes, BytesMut};
use ffmpeg_next::codec::Parameters;

use crate::adts::AdtsFramer;
use crate::error::FramingError;
use crate::packet::EncodedPacket;

/// Annex B start code (4-byte)
pub const START_CODE: &[u8] = &[0x00, 0x00, 0x00, 0x01];

pub const NAL_IDR: u8 = 5;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;

/// Reads extradata from codec parameters via the raw AVCodecParameters pointer.
/// Returns None if extradata is null or empty.
pub fn get_extradata(codec_params: &Parameters) -> Option<&[u8]> {
    unsafe {
        let p = codec_params.as_ptr() as *const ffmpeg_next::ffi::AVCodecParameters;
        let extradata_ptr = (*p).extradata;
        if extradata_ptr.is_null() {
            return None;
        }
        let size = (*p).extradata_size;
        if size <= 0 {
            return None;
        }
        Some(std::slice::from_raw_parts(extradata_ptr, size as usize))
    }
}

pub fn nal_type(nal: &[u8]) -> u8 {
    nal.first().map(|b| b & 0x1F).unwrap_or(0)
}

/// How an encoder delimits NAL units inside a packet. Decided once when the
/// stream is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalFraming {
    /// Big-endian length prefix of 1, 2 or 4 bytes (AVCC).
    LengthPrefixed { length_size: usize },
    /// Already start-code delimited (Annex B).
    StartCode,
}

impl Default for NalFraming {
    fn default() -> Self {
        NalFraming::LengthPrefixed { length_size: 4 }
    }
}

/// When SPS/PPS are written in front of an access unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterSetPolicy {
    /// Parameter sets live in out-of-band extradata (global header); emit
    /// them once ahead of the first access unit.
    Once,
    /// Emit them ahead of every keyframe.
    EveryKeyframe,
}

/// SPS/PPS extracted from encoder extradata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSets {
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
    /// NAL length size declared by an `avcC` record.
    pub length_size: Option<usize>,
}

impl ParameterSets {
    /// Accepts an `avcC` decoder configuration record or Annex B extradata.
    pub fn from_extradata(extradata: &[u8]) -> Result<Self, FramingError> {
        if extradata.is_empty() {
            return Ok(Self::default());
        }
        if extradata[0] == 0x01 {
            return Self::parse_avcc(extradata);
        }
        let mut sets = Self::default();
        for nal in split_start_codes(extradata)? {
            match nal_type(nal) {
                NAL_SPS => sets.sps.push(Bytes::copy_from_slice(nal)),
                NAL_PPS => sets.pps.push(Bytes::copy_from_slice(nal)),
                _ => {}
            }
        }
        Ok(sets)
    }

    fn parse_avcc(record: &[u8]) -> Result<Self, FramingError> {
        if record.len() < 7 {
            return Err(FramingError::InvalidExtradata(format!(
                "avcC record of {} bytes is too short",
                record.len()
            )));
        }
        let length_size = (record[4] & 0x03) as usize + 1;
        if length_size == 3 {
            return Err(FramingError::InvalidExtradata(
                "avcC declares a 3-byte NAL length".to_string(),
            ));
        }

        let mut pos = 5;
        let read_sets = |count: usize, pos: &mut usize| -> Result<Vec<Bytes>, FramingError> {
            let mut sets = Vec::with_capacity(count);
            for _ in 0..count {
                if *pos + 2 > record.len() {
                    return Err(FramingError::InvalidExtradata(
                        "avcC parameter set length missing".to_string(),
                    ));
                }
                let len = u16::from_be_bytes([record[*pos], record[*pos + 1]]) as usize;
                *pos += 2;
                if *pos + len > record.len() {
                    return Err(FramingError::Truncated {
                        declared: len,
                        available: record.len() - *pos,
                    });
                }
                sets.push(Bytes::copy_from_slice(&record[*pos..*pos + len]));
                *pos += len;
            }
            Ok(sets)
        };

        let num_sps = (record[pos] & 0x1F) as usize;
        pos += 1;
        let sps = read_sets(num_sps, &mut pos)?;
        let pps = if pos < record.len() {
            let num_pps = record[pos] as usize;
            pos += 1;
            read_sets(num_pps, &mut pos)?
        } else {
            Vec::new()
        };

        Ok(Self {
            sps,
            pps,
            length_size: Some(length_size),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.sps.is_empty() && self.pps.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.sps.iter().chain(self.pps.iter())
    }
}

/// Splits a length-prefixed buffer into NAL units. A declared length that
/// runs past the end of the buffer is an error, never a silent stop.
pub fn split_length_prefixed(data: &[u8], length_size: usize) -> Result<Vec<&[u8]>, FramingError> {
    let mut nals = Vec::new();
    let mut i = 0;
    while i < data.len() {
        if i + length_size > data.len() {
            return Err(FramingError::Truncated {
                declared: length_size,
                available: data.len() - i,
            });
        }
        let len = data[i..i + length_size]
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize);
        i += length_size;
        if i + len > data.len() {
            return Err(FramingError::Truncated {
                declared: len,
                available: data.len() - i,
            });
        }
        if len > 0 {
            nals.push(&data[i..i + len]);
        }
        i += len;
    }
    Ok(nals)
}

fn find_start_code(data: &[u8], from: usize) -> Option<usize> {
    if data.len() < 3 {
        return None;
    }
    (from..data.len() - 2).find(|&i| data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1)
}

/// Splits an Annex B buffer into NAL units without their start codes.
pub fn split_start_codes(data: &[u8]) -> Result<Vec<&[u8]>, FramingError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let first = match find_start_code(data, 0) {
        Some(p) if data[..p].iter().all(|&b| b == 0) && p <= 1 => p,
        _ => return Err(FramingError::MissingStartCode),
    };

    let mut nals = Vec::new();
    let mut start = first + 3;
    loop {
        match find_start_code(data, start) {
            Some(next) => {
                let mut end = next;
                while end > start && data[end - 1] == 0 {
                    end -= 1;
                }
                if end > start {
                    nals.push(&data[start..end]);
                }
                start = next + 3;
            }
            None => {
                if start < data.len() {
                    nals.push(&data[start..]);
                }
                break;
            }
        }
    }
    Ok(nals)
}

/// Converts AVCC (4-byte length + NAL) to Annex B (start code + NAL).
pub fn convert_avcc_to_annexb(avcc: &[u8]) -> Result<Bytes, FramingError> {
    let nals = split_length_prefixed(avcc, 4)?;
    let mut out = BytesMut::with_capacity(avcc.len());
    for nal in nals {
        out.put_slice(START_CODE);
        out.put_slice(nal);
    }
    Ok(out.freeze())
}

/// Rewrites H.264 access units into Annex B and keeps parameter sets in band.
#[derive(Debug, Clone)]
pub struct AnnexBFramer {
    input: NalFraming,
    parameter_sets: ParameterSets,
    policy: ParameterSetPolicy,
    sent_parameter_sets: bool,
}

impl AnnexBFramer {
    /// `declared` is the framing the encoder claims to emit. An `avcC`
    /// record in `extradata` overrides it.
    pub fn new(
        extradata: &[u8],
        declared: NalFraming,
        policy: ParameterSetPolicy,
    ) -> Result<Self, FramingError> {
        let parameter_sets = ParameterSets::from_extradata(extradata)?;
        let input = match parameter_sets.length_size {
            Some(length_size) => NalFraming::LengthPrefixed { length_size },
            None => declared,
        };
        Ok(Self {
            input,
            parameter_sets,
            policy,
            sent_parameter_sets: false,
        })
    }

    pub fn input(&self) -> NalFraming {
        self.input
    }

    pub fn frame(&mut self, data: &[u8], is_key: bool) -> Result<Bytes, FramingError> {
        let nals = match self.input {
            NalFraming::LengthPrefixed { length_size } => split_length_prefixed(data, length_size)?,
            NalFraming::StartCode => split_start_codes(data)?,
        };

        let carries_sps = nals.iter().any(|nal| nal_type(nal) == NAL_SPS);
        let wanted = match self.policy {
            ParameterSetPolicy::Once => !self.sent_parameter_sets,
            ParameterSetPolicy::EveryKeyframe => is_key || !self.sent_parameter_sets,
        };

        let mut out = BytesMut::with_capacity(data.len() + 64);
        if wanted && !carries_sps && !self.parameter_sets.is_empty() {
            for set in self.parameter_sets.iter() {
                out.put_slice(START_CODE);
                out.put_slice(set);
            }
            self.sent_parameter_sets = true;
        }
        if carries_sps {
            self.sent_parameter_sets = true;
        }
        for nal in nals {
            out.put_slice(START_CODE);
            out.put_slice(nal);
        }
        Ok(out.freeze())
    }
}

/// Per-stream payload normalization, chosen when the stream is configured.
#[derive(Debug, Clone)]
pub enum BitstreamFramer {
    Audio(AdtsFramer),
    Video(AnnexBFramer),
}

impl BitstreamFramer {
    pub fn apply(&mut self, mut packet: EncodedPacket) -> Result<EncodedPacket, FramingError> {
        packet.data = match self {
            BitstreamFramer::Audio(adts) => adts.frame(&packet.data)?,
            BitstreamFramer::Video(annexb) => annexb.frame(&packet.data, packet.is_key)?,
        };
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: &[u8] = &[0x67, 0x42, 0xC0, 0x1E];
    const PPS: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];

    fn avcc_record() -> Vec<u8> {
        let mut record = vec![0x01, 0x42, 0xC0, 0x1E, 0xFF, 0xE1];
        record.extend_from_slice(&(SPS.len() as u16).to_be_bytes());
        record.extend_from_slice(SPS);
        record.push(0x01);
        record.extend_from_slice(&(PPS.len() as u16).to_be_bytes());
        record.extend_from_slice(PPS);
        record
    }

    fn count_sps(annexb: &[u8]) -> usize {
        split_start_codes(annexb)
            .unwrap()
            .iter()
            .filter(|nal| nal_type(nal) == NAL_SPS)
            .count()
    }

    #[test]
    fn test_avcc_to_annexb() {
        let avcc = [0, 0, 0, 5, 0xA, 0xB, 0xC, 0xD, 0xE];
        let out = convert_avcc_to_annexb(&avcc).unwrap();
        assert_eq!(&out[..], &[0, 0, 0, 1, 0xA, 0xB, 0xC, 0xD, 0xE][..]);
    }

    #[test]
    fn test_avcc_truncated_is_error() {
        let avcc = [0, 0, 0, 10, 0xA, 0xB, 0xC, 0xD, 0xE];
        assert_eq!(
            convert_avcc_to_annexb(&avcc),
            Err(FramingError::Truncated {
                declared: 10,
                available: 5
            })
        );
        // dangling partial length prefix
        let avcc = [0, 0, 0, 1, 0x65, 0, 0];
        assert!(convert_avcc_to_annexb(&avcc).is_err());
    }

    #[test]
    fn test_avcc_multiple_nals() {
        let avcc = [0, 0, 0, 2, 0x09, 0xF0, 0, 0, 0, 3, 0x65, 0x88, 0x84];
        let out = convert_avcc_to_annexb(&avcc).unwrap();
        assert_eq!(
            &out[..],
            &[0, 0, 0, 1, 0x09, 0xF0, 0, 0, 0, 1, 0x65, 0x88, 0x84][..]
        );
    }

    #[test]
    fn test_split_start_codes() {
        let data = [0, 0, 0, 1, 0x67, 0x42, 0, 0, 1, 0x68, 0xCE, 0, 0, 0, 1, 0x65, 0x88];
        let nals = split_start_codes(&data).unwrap();
        assert_eq!(nals, vec![&[0x67, 0x42][..], &[0x68, 0xCE][..], &[0x65, 0x88][..]]);
        assert_eq!(
            split_start_codes(&[0x65, 0x88, 0, 0, 1, 0x41]),
            Err(FramingError::MissingStartCode)
        );
    }

    #[test]
    fn test_parse_avcc_record() {
        let sets = ParameterSets::from_extradata(&avcc_record()).unwrap();
        assert_eq!(sets.length_size, Some(4));
        assert_eq!(sets.sps, vec![Bytes::from_static(SPS)]);
        assert_eq!(sets.pps, vec![Bytes::from_static(PPS)]);

        let mut truncated = avcc_record();
        truncated.truncate(10);
        assert!(ParameterSets::from_extradata(&truncated).is_err());
    }

    #[test]
    fn test_parse_annexb_extradata() {
        let mut extradata = START_CODE.to_vec();
        extradata.extend_from_slice(SPS);
        extradata.extend_from_slice(START_CODE);
        extradata.extend_from_slice(PPS);
        let sets = ParameterSets::from_extradata(&extradata).unwrap();
        assert_eq!(sets.length_size, None);
        assert_eq!(sets.sps.len(), 1);
        assert_eq!(sets.pps.len(), 1);
    }

    #[test]
    fn test_parameter_sets_once() {
        let mut framer = AnnexBFramer::new(
            &avcc_record(),
            NalFraming::StartCode,
            ParameterSetPolicy::Once,
        )
        .unwrap();
        assert_eq!(framer.input(), NalFraming::LengthPrefixed { length_size: 4 });

        let idr = [0, 0, 0, 2, 0x65, 0x88];
        let first = framer.frame(&idr, true).unwrap();
        assert_eq!(count_sps(&first), 1);
        let mut expected = START_CODE.to_vec();
        expected.extend_from_slice(SPS);
        expected.extend_from_slice(START_CODE);
        expected.extend_from_slice(PPS);
        expected.extend_from_slice(&[0, 0, 0, 1, 0x65, 0x88]);
        assert_eq!(&first[..], &expected[..]);

        let second = framer.frame(&idr, true).unwrap();
        assert_eq!(count_sps(&second), 0);
    }

    #[test]
    fn test_parameter_sets_every_keyframe() {
        let mut framer = AnnexBFramer::new(
            &avcc_record(),
            NalFraming::default(),
            ParameterSetPolicy::EveryKeyframe,
        )
        .unwrap();
        let idr = [0, 0, 0, 2, 0x65, 0x88];
        let p_slice = [0, 0, 0, 2, 0x41, 0x9A];
        assert_eq!(count_sps(&framer.frame(&idr, true).unwrap()), 1);
        assert_eq!(count_sps(&framer.frame(&p_slice, false).unwrap()), 0);
        assert_eq!(count_sps(&framer.frame(&idr, true).unwrap()), 1);
    }

    #[test]
    fn test_inband_parameter_sets_are_not_duplicated() {
        let mut extradata = START_CODE.to_vec();
        extradata.extend_from_slice(SPS);
        extradata.extend_from_slice(START_CODE);
        extradata.extend_from_slice(PPS);
        let mut framer = AnnexBFramer::new(
            &extradata,
            NalFraming::StartCode,
            ParameterSetPolicy::EveryKeyframe,
        )
        .unwrap();

        let mut au = extradata.clone();
        au.extend_from_slice(&[0, 0, 1, 0x65, 0x88]);
        let out = framer.frame(&au, true).unwrap();
        assert_eq!(count_sps(&out), 1);
    }

    #[test]
    fn test_framer_rejects_truncated_packet() {
        let mut framer =
            AnnexBFramer::new(&[], NalFraming::default(), ParameterSetPolicy::Once).unwrap();
        assert!(framer.frame(&[0, 0, 0, 10, 0xA, 0xB], true).is_err());
    }
}
