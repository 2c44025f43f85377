pub type FramecutResult<T> = Result<T, FramecutError>;

/// One frame that could not be composed during a render pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameFailure {
    /// Output frame index.
    pub index: u64,
    /// Rendered error message.
    pub message: String,
}

#[derive(thiserror::Error, Debug)]
pub enum FramecutError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("data error: clips '{first}' and '{second}' share layer {layer} at frame {frame}")]
    SameLayer {
        layer: u32,
        frame: u64,
        first: String,
        second: String,
    },

    #[error("data error: frame {target} is not in clip '{clip}' range [{start}, {end})")]
    FrameOutOfRange {
        clip: String,
        target: u64,
        start: u64,
        end: u64,
    },

    #[error(
        "data error: frame size mismatch: got {got_w}x{got_h}, expected {expected_w}x{expected_h}"
    )]
    FrameSizeMismatch {
        got_w: u32,
        got_h: u32,
        expected_w: u32,
        expected_h: u32,
    },

    #[error("data error: frame {index} was already appended")]
    DuplicateFrame { index: u64 },

    #[error("data error: frame {index} is beyond the declared duration of {duration} frames")]
    FrameBeyondDuration { index: u64, duration: u64 },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("render pass cancelled")]
    Cancelled,

    #[error("{} frame(s) failed to render: {}", .0.len(), summarize_failures(.0))]
    FrameFailures(Vec<FrameFailure>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FramecutError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn size_mismatch(got: (u32, u32), expected: (u32, u32)) -> Self {
        Self::FrameSizeMismatch {
            got_w: got.0,
            got_h: got.1,
            expected_w: expected.0,
            expected_h: expected.1,
        }
    }

    /// `true` for errors raised by malformed timeline data rather than by the runtime.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::Data(_)
                | Self::SameLayer { .. }
                | Self::FrameOutOfRange { .. }
                | Self::FrameSizeMismatch { .. }
                | Self::DuplicateFrame { .. }
                | Self::FrameBeyondDuration { .. }
        )
    }
}

fn summarize_failures(failures: &[FrameFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("#{}: {}", f.index, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}
