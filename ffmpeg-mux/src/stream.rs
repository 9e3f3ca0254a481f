use std::fmt;

use ffmpeg_next::{Rational, codec::Parameters};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// Everything a container needs to declare one output stream.
#[derive(Clone)]
pub struct StreamSpec {
    kind: MediaKind,
    codec_id: ffmpeg_next::codec::Id,
    encoder_time_base: Rational,
    output_time_base: Rational,
    parameters: Option<Parameters>,
}

impl StreamSpec {
    pub fn new(
        kind: MediaKind,
        codec_id: ffmpeg_next::codec::Id,
        encoder_time_base: Rational,
    ) -> Self {
        Self {
            kind,
            codec_id,
            encoder_time_base,
            output_time_base: encoder_time_base,
            parameters: None,
        }
    }

    /// Time base requested for the container stream. Containers with a fixed
    /// clock (MPEG-TS) may override it when the header is written.
    pub fn with_output_time_base(mut self, time_base: Rational) -> Self {
        self.output_time_base = time_base;
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn codec_id(&self) -> ffmpeg_next::codec::Id {
        self.codec_id
    }

    pub fn encoder_time_base(&self) -> Rational {
        self.encoder_time_base
    }

    pub fn output_time_base(&self) -> Rational {
        self.output_time_base
    }

    pub fn parameters(&self) -> Option<&Parameters> {
        self.parameters.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use ffmpeg_next::codec::Id;

    use super::*;

    #[test]
    fn test_output_time_base_defaults_to_encoder() {
        let spec = StreamSpec::new(MediaKind::Audio, Id::AAC, Rational::new(1, 48000));
        assert_eq!(spec.output_time_base(), Rational::new(1, 48000));

        let copy = spec.clone().with_output_time_base(Rational::new(1, 1000));
        assert_eq!(copy.output_time_base(), Rational::new(1, 1000));
        assert_eq!(copy.encoder_time_base(), spec.encoder_time_base());
        assert_eq!(copy.codec_id(), Id::AAC);
        assert_eq!(copy.kind(), MediaKind::Audio);
        assert!(copy.parameters().is_none());
    }
}
