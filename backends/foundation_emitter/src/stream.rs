use crate::emitter::{
    assert_no_previous_output, emit_headers_with_length, emit_status_line, Emitter,
};
use crate::errors::{EmitterError, EmitterResult};
use crate::host::HostEnvironment;
use crate::message::{BodyStream, OutgoingResponse, SimpleHeader};
use regex::Regex;
use std::io::SeekFrom;
use std::sync::{Arc, LazyLock};

pub const DEFAULT_MAX_BUFFER_LENGTH: usize = 8192;

static CONTENT_RANGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<unit>\w+)\s+(?P<first>\d+)-(?P<last>\d+)/(?P<length>\d+|\*)$")
        .expect("content range pattern is valid")
});

/// Parsed `Content-Range` header value: `<unit> <first>-<last>/<length>`,
/// with `length` left as `None` for `*`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentRange {
    pub unit: String,
    pub first: u64,
    pub last: u64,
    pub length: Option<u64>,
}

impl ContentRange {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let captures = CONTENT_RANGE_PATTERN.captures(value.trim())?;

        let first = captures["first"].parse::<u64>().ok()?;
        let last = captures["last"].parse::<u64>().ok()?;
        if last < first {
            return None;
        }

        let length = match &captures["length"] {
            "*" => None,
            digits => Some(digits.parse::<u64>().ok()?),
        };

        Some(Self {
            unit: captures["unit"].to_string(),
            first,
            last,
            length,
        })
    }

    #[must_use]
    pub fn is_bytes(&self) -> bool {
        self.unit.eq_ignore_ascii_case("bytes")
    }

    /// Number of bytes covered, both ends inclusive.
    #[must_use]
    pub fn span(&self) -> u64 {
        (self.last - self.first).saturating_add(1)
    }

    /// Bytes of a body of `size` bytes this range actually covers.
    #[must_use]
    pub fn span_within(&self, size: u64) -> u64 {
        self.span().min(size.saturating_sub(self.first))
    }
}

/// Emitter for large or partial bodies.
///
/// The head goes out exactly like [`crate::ResponseEmitter`] does and is
/// flushed, then the body is copied in reads of at most `max_buffer_length`
/// bytes. A `bytes` unit `Content-Range` header limits output to that
/// range, otherwise the body is rewound and sent whole.
pub struct StreamEmitter<H: HostEnvironment> {
    host: Arc<H>,
    max_buffer_length: usize,
}

impl<H: HostEnvironment> StreamEmitter<H> {
    /// A zero `max_buffer_length` falls back to [`DEFAULT_MAX_BUFFER_LENGTH`].
    pub fn new(host: Arc<H>, max_buffer_length: usize) -> Self {
        let max_buffer_length = if max_buffer_length == 0 {
            DEFAULT_MAX_BUFFER_LENGTH
        } else {
            max_buffer_length
        };
        Self {
            host,
            max_buffer_length,
        }
    }

    #[must_use]
    pub fn max_buffer_length(&self) -> usize {
        self.max_buffer_length
    }

    fn emit_body(&self, body: &mut dyn BodyStream) -> EmitterResult<()> {
        body.rewind().map_err(EmitterError::BodyReadFailed)?;

        let mut buffer = vec![0u8; self.max_buffer_length];
        loop {
            let read = body
                .read(&mut buffer)
                .map_err(EmitterError::BodyReadFailed)?;
            if read == 0 {
                return Ok(());
            }
            self.host
                .write_output(&buffer[..read])
                .map_err(EmitterError::OutputFailed)?;
        }
    }

    fn emit_body_range(&self, body: &mut dyn BodyStream, range: &ContentRange) -> EmitterResult<()> {
        body.seek(SeekFrom::Start(range.first))
            .map_err(EmitterError::BodyReadFailed)?;

        let mut remaining = range.span();
        let mut buffer = vec![0u8; self.max_buffer_length];
        while remaining > 0 {
            let wanted = usize::try_from(remaining)
                .map_or(self.max_buffer_length, |left| left.min(self.max_buffer_length));

            let read = body
                .read(&mut buffer[..wanted])
                .map_err(EmitterError::BodyReadFailed)?;
            if read == 0 {
                tracing::debug!(
                    "Body ended with {} bytes of the requested range left",
                    remaining
                );
                return Ok(());
            }

            self.host
                .write_output(&buffer[..read])
                .map_err(EmitterError::OutputFailed)?;
            remaining -= read as u64;
        }
        Ok(())
    }
}

impl<H: HostEnvironment> Emitter for StreamEmitter<H> {
    fn emit(&self, response: &mut OutgoingResponse) -> EmitterResult<bool> {
        assert_no_previous_output(self.host.as_ref())?;

        let range = response
            .headers
            .get(&SimpleHeader::CONTENT_RANGE)
            .and_then(|values| values.first())
            .and_then(|value| ContentRange::parse(value))
            .filter(ContentRange::is_bytes);

        let content_length = match &range {
            Some(range) => response.body_size().map(|size| range.span_within(size)),
            None => response.body_size(),
        };

        emit_headers_with_length(self.host.as_ref(), response, content_length);
        emit_status_line(self.host.as_ref(), response);
        self.host.flush_output().map_err(EmitterError::OutputFailed)?;

        let Some(body) = response.body_mut() else {
            return Ok(true);
        };

        match range {
            Some(range) => {
                tracing::debug!("Streaming body range {}-{}", range.first, range.last);
                self.emit_body_range(body, &range)?;
            }
            None => {
                tracing::debug!(
                    "Streaming body in chunks of {} bytes",
                    self.max_buffer_length
                );
                self.emit_body(body)?;
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod content_range_tests {
    use super::*;

    #[test]
    fn parses_byte_ranges() {
        assert_eq!(
            ContentRange::parse("bytes 0-2/6"),
            Some(ContentRange {
                unit: "bytes".into(),
                first: 0,
                last: 2,
                length: Some(6),
            })
        );
    }

    #[test]
    fn parses_unknown_total_length() {
        let range = ContentRange::parse("bytes 3-5/*").expect("should parse");
        assert_eq!(range.length, None);
        assert_eq!(range.span(), 3);
    }

    #[test]
    fn rejects_malformed_ranges() {
        assert_eq!(ContentRange::parse("bytes 5-3/10"), None);
        assert_eq!(ContentRange::parse("bytes -3/10"), None);
        assert_eq!(ContentRange::parse("garbage"), None);
    }

    #[test]
    fn span_is_clamped_to_the_body() {
        let range = ContentRange::parse("bytes 3-100/*").expect("should parse");
        assert_eq!(range.span_within(8), 5);
        assert_eq!(range.span_within(2), 0);

        let range = ContentRange::parse("bytes 6-10/11").expect("should parse");
        assert_eq!(range.span_within(11), 5);
    }

    #[test]
    fn only_bytes_unit_counts() {
        let range = ContentRange::parse("items 0-2/6").expect("should parse");
        assert!(!range.is_bytes());
    }
}
