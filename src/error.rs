use thiserror::Error;

/// Fatal conditions for a single document. Everything else in the pipeline
/// degrades to best-effort output instead of failing.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("document is not valid UTF-8 (first bad byte at offset {offset})")]
    Parse { offset: usize },

    #[error("malformed block markup at byte {at}: {reason}")]
    Markup { at: usize, reason: String },
}

impl ConvertError {
    pub(crate) fn markup(at: usize, reason: impl Into<String>) -> Self {
        ConvertError::Markup {
            at,
            reason: reason.into(),
        }
    }
}

pub type ConvertResult<T> = Result<T, ConvertError>;
