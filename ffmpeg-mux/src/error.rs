use std::fmt;

pub type Result<T> = std::result::Result<T, MuxError>;

/// Pipeline stage an error surfaced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configure,
    Adapt,
    Encode,
    Normalize,
    Mux,
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configure => "configure",
            Stage::Adapt => "adapt",
            Stage::Encode => "encode",
            Stage::Normalize => "normalize",
            Stage::Mux => "mux",
            Stage::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// Errors produced while re-framing compressed payloads.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("sample rate {0} has no ADTS frequency index")]
    UnsupportedSampleRate(u32),

    #[error("channel configuration {0} cannot be signalled in ADTS")]
    InvalidChannelConfig(u16),

    #[error("ADTS frame of {0} bytes exceeds the 13-bit length field")]
    FrameTooLarge(usize),

    #[error("ADTS header is malformed: {0}")]
    MalformedHeader(&'static str),

    #[error("NAL unit declares {declared} bytes but only {available} remain")]
    Truncated { declared: usize, available: usize },

    #[error("access unit does not begin with a start code")]
    MissingStartCode,

    #[error("invalid codec extradata: {0}")]
    InvalidExtradata(String),
}

#[derive(thiserror::Error, Debug)]
pub enum MuxError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("protocol violation on stream {stream}: {detail}")]
    Protocol { stream: usize, detail: String },

    #[error("encoding error on stream {stream} during {stage}: {detail}")]
    Encoding {
        stream: usize,
        stage: Stage,
        detail: String,
    },

    #[error("framing error on stream {stream}: {source}")]
    Framing {
        stream: usize,
        #[source]
        source: FramingError,
    },

    #[error("i/o error during {stage}: {detail} (requested {requested} bytes, wrote {written})")]
    Io {
        stream: Option<usize>,
        stage: Stage,
        requested: usize,
        written: usize,
        detail: String,
    },

    #[error("timestamp order violation on stream {stream}: dts {current} after {previous}")]
    Ordering {
        stream: usize,
        previous: i64,
        current: i64,
    },
}

impl MuxError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn protocol(stream: usize, detail: impl Into<String>) -> Self {
        Self::Protocol {
            stream,
            detail: detail.into(),
        }
    }

    /// Wraps an error from an adapter, encoder backend or frame source.
    pub fn encoding(stream: usize, stage: Stage, err: impl fmt::Display) -> Self {
        Self::Encoding {
            stream,
            stage,
            detail: err.to_string(),
        }
    }

    pub fn framing(stream: usize, source: FramingError) -> Self {
        Self::Framing { stream, source }
    }

    pub fn io(
        stream: Option<usize>,
        stage: Stage,
        requested: usize,
        written: usize,
        detail: impl Into<String>,
    ) -> Self {
        Self::Io {
            stream,
            stage,
            requested,
            written,
            detail: detail.into(),
        }
    }

    pub fn stream(&self) -> Option<usize> {
        match self {
            MuxError::Configuration(_) => None,
            MuxError::Protocol { stream, .. }
            | MuxError::Encoding { stream, .. }
            | MuxError::Framing { stream, .. }
            | MuxError::Ordering { stream, .. } => Some(*stream),
            MuxError::Io { stream, .. } => *stream,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            MuxError::Configuration(_) => Stage::Configure,
            MuxError::Protocol { .. } => Stage::Encode,
            MuxError::Encoding { stage, .. } | MuxError::Io { stage, .. } => *stage,
            MuxError::Framing { .. } => Stage::Normalize,
            MuxError::Ordering { .. } => Stage::Mux,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            MuxError::configuration("x")
                .to_string()
                .contains("configuration error:")
        );
        assert!(
            MuxError::protocol(1, "x")
                .to_string()
                .contains("protocol violation on stream 1")
        );
        assert!(
            MuxError::encoding(0, Stage::Adapt, "boom")
                .to_string()
                .contains("during adapt: boom")
        );
    }

    #[test]
    fn io_error_reports_byte_counts() {
        let err = MuxError::io(Some(2), Stage::Mux, 128, 64, "short write");
        let msg = err.to_string();
        assert!(msg.contains("requested 128 bytes"));
        assert!(msg.contains("wrote 64"));
        assert_eq!(err.stream(), Some(2));
        assert_eq!(err.stage(), Stage::Mux);
    }

    #[test]
    fn framing_error_keeps_source() {
        let err = MuxError::framing(
            1,
            FramingError::Truncated {
                declared: 10,
                available: 5,
            },
        );
        assert_eq!(err.stage(), Stage::Normalize);
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(
            source.as_deref(),
            Some("NAL unit declares 10 bytes but only 5 remain")
        );
    }
}
