use derive_more::From;

pub type EmitterResult<T> = std::result::Result<T, EmitterError>;

#[derive(From, Debug)]
pub enum EmitterError {
    /// The response head was finalized before the emitter ran, `file` and
    /// `line` point at where the host saw the first head write.
    #[from(ignore)]
    HeadersAlreadySent {
        file: Option<String>,
        line: Option<u32>,
    },

    /// Bytes already reached the output channel before the emitter ran.
    OutputAlreadySent,

    /// An emitter strategy name that does not resolve to any known emitter.
    #[from(ignore)]
    InvalidEmitter(String),

    #[from(ignore)]
    IndexOutOfRange { index: usize, len: usize },

    #[from(ignore)]
    BodyReadFailed(std::io::Error),

    #[from(ignore)]
    OutputFailed(std::io::Error),
}

impl std::error::Error for EmitterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::BodyReadFailed(err) | Self::OutputFailed(err) => Some(err),
            _ => None,
        }
    }
}

impl core::fmt::Display for EmitterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HeadersAlreadySent { file, line } => write!(
                f,
                "Unable to emit response; headers already sent in {}:{}",
                file.as_deref().unwrap_or("unknown"),
                line.unwrap_or(0)
            ),
            Self::OutputAlreadySent => {
                write!(f, "Output has been emitted previously; cannot emit response")
            }
            Self::InvalidEmitter(name) => write!(
                f,
                "Invalid emitter provided ({name}); must resolve to a known emitter strategy"
            ),
            Self::IndexOutOfRange { index, len } => write!(
                f,
                "Emitter index {index} is out of range for a chain of {len} emitters"
            ),
            Self::BodyReadFailed(err) => write!(f, "Failed reading response body: {err}"),
            Self::OutputFailed(err) => write!(f, "Failed writing to output channel: {err}"),
        }
    }
}

#[cfg(test)]
mod error_messages {
    use super::*;

    #[test]
    fn headers_already_sent_names_origin() {
        let err = EmitterError::HeadersAlreadySent {
            file: Some("src/handlers.rs".into()),
            line: Some(42),
        };
        assert_eq!(
            err.to_string(),
            "Unable to emit response; headers already sent in src/handlers.rs:42"
        );
    }

    #[test]
    fn output_already_sent_message() {
        assert_eq!(
            EmitterError::OutputAlreadySent.to_string(),
            "Output has been emitted previously; cannot emit response"
        );
    }
}
