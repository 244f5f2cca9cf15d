use derive_more::From;
use std::borrow::Cow;
use std::io::{Cursor, Read, Seek, SeekFrom};

// -- HTTP Artefacts

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Proto {
    HTTP10,
    HTTP11,
    HTTP20,
    HTTP30,
    Custom(String),
}

impl Proto {
    /// The bare protocol version as it appears after `HTTP/` in a status line.
    #[must_use]
    pub fn version(&self) -> &str {
        match self {
            Self::HTTP10 => "1.0",
            Self::HTTP11 => "1.1",
            Self::HTTP20 => "2",
            Self::HTTP30 => "3",
            Self::Custom(inner) => inner.trim_start_matches("HTTP/"),
        }
    }
}

impl From<&str> for Proto {
    fn from(value: &str) -> Self {
        match value.trim_start_matches("HTTP/") {
            "1.0" => Self::HTTP10,
            "1.1" => Self::HTTP11,
            "2" | "2.0" => Self::HTTP20,
            "3" | "3.0" => Self::HTTP30,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl core::fmt::Display for Proto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP/{}", self.version())
    }
}

macro_rules! http_statuses {
    ($($variant:ident => ($code:literal, $reason:literal),)+) => {
        /// HTTP status
        ///
        /// Known statuses carry their standard reason phrase, anything else
        /// is kept as [`Status::Numbered`] with whatever phrase it came with.
        #[derive(Debug, Eq, PartialEq, Clone)]
        pub enum Status {
            $($variant,)+
            Numbered(u16, String),
        }

        impl Status {
            #[must_use]
            pub fn code(&self) -> u16 {
                match self {
                    $(Self::$variant => $code,)+
                    Self::Numbered(code, _) => *code,
                }
            }

            #[must_use]
            pub fn reason_phrase(&self) -> &str {
                match self {
                    $(Self::$variant => $reason,)+
                    Self::Numbered(_, reason) => reason.as_str(),
                }
            }
        }

        impl From<u16> for Status {
            fn from(code: u16) -> Self {
                match code {
                    $($code => Self::$variant,)+
                    other => Self::Numbered(other, String::new()),
                }
            }
        }
    };
}

http_statuses! {
    Continue => (100, "Continue"),
    SwitchingProtocols => (101, "Switching Protocols"),
    Processing => (102, "Processing"),
    OK => (200, "OK"),
    Created => (201, "Created"),
    Accepted => (202, "Accepted"),
    NonAuthoritativeInformation => (203, "Non-Authoritative Information"),
    NoContent => (204, "No Content"),
    ResetContent => (205, "Reset Content"),
    PartialContent => (206, "Partial Content"),
    MultiStatus => (207, "Multi-Status"),
    MultipleChoices => (300, "Multiple Choices"),
    MovedPermanently => (301, "Moved Permanently"),
    Found => (302, "Found"),
    SeeOther => (303, "See Other"),
    NotModified => (304, "Not Modified"),
    UseProxy => (305, "Use Proxy"),
    TemporaryRedirect => (307, "Temporary Redirect"),
    PermanentRedirect => (308, "Permanent Redirect"),
    BadRequest => (400, "Bad Request"),
    Unauthorized => (401, "Unauthorized"),
    PaymentRequired => (402, "Payment Required"),
    Forbidden => (403, "Forbidden"),
    NotFound => (404, "Not Found"),
    MethodNotAllowed => (405, "Method Not Allowed"),
    NotAcceptable => (406, "Not Acceptable"),
    ProxyAuthenticationRequired => (407, "Proxy Authentication Required"),
    RequestTimeout => (408, "Request Timeout"),
    Conflict => (409, "Conflict"),
    Gone => (410, "Gone"),
    LengthRequired => (411, "Length Required"),
    PreconditionFailed => (412, "Precondition Failed"),
    PayloadTooLarge => (413, "Payload Too Large"),
    UriTooLong => (414, "URI Too Long"),
    UnsupportedMediaType => (415, "Unsupported Media Type"),
    RangeNotSatisfiable => (416, "Range Not Satisfiable"),
    ExpectationFailed => (417, "Expectation Failed"),
    ImATeapot => (418, "I'm a teapot"),
    UnprocessableEntity => (422, "Unprocessable Entity"),
    Locked => (423, "Locked"),
    FailedDependency => (424, "Failed Dependency"),
    UpgradeRequired => (426, "Upgrade Required"),
    PreconditionRequired => (428, "Precondition Required"),
    TooManyRequests => (429, "Too Many Requests"),
    RequestHeaderFieldsTooLarge => (431, "Request Header Fields Too Large"),
    InternalServerError => (500, "Internal Server Error"),
    NotImplemented => (501, "Not Implemented"),
    BadGateway => (502, "Bad Gateway"),
    ServiceUnavailable => (503, "Service Unavailable"),
    GatewayTimeout => (504, "Gateway Timeout"),
    HttpVersionNotSupported => (505, "HTTP Version Not Supported"),
    InsufficientStorage => (507, "Insufficient Storage"),
    NetworkAuthenticationRequired => (511, "Network Authentication Required"),
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = self.reason_phrase();
        if reason.is_empty() {
            write!(f, "{}", self.code())
        } else {
            write!(f, "{} {reason}", self.code())
        }
    }
}

/// HTTP header name.
///
/// Comparison ignores ASCII case, rendering always goes through
/// [`SimpleHeader::canonical`] so `content-type` is emitted as `Content-Type`.
#[derive(Clone, Debug)]
pub struct SimpleHeader(Cow<'static, str>);

impl SimpleHeader {
    pub const CACHE_CONTROL: SimpleHeader = SimpleHeader(Cow::Borrowed("Cache-Control"));
    pub const CONTENT_LENGTH: SimpleHeader = SimpleHeader(Cow::Borrowed("Content-Length"));
    pub const CONTENT_RANGE: SimpleHeader = SimpleHeader(Cow::Borrowed("Content-Range"));
    pub const CONTENT_TYPE: SimpleHeader = SimpleHeader(Cow::Borrowed("Content-Type"));
    pub const LOCATION: SimpleHeader = SimpleHeader(Cow::Borrowed("Location"));
    pub const SET_COOKIE: SimpleHeader = SimpleHeader(Cow::Borrowed("Set-Cookie"));

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Upper-cases the first letter of every `-` separated word, leaving the
    /// rest of each word as given.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.0
            .split('-')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl PartialEq for SimpleHeader {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for SimpleHeader {}

impl From<String> for SimpleHeader {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl From<&str> for SimpleHeader {
    fn from(value: &str) -> Self {
        Self(Cow::Owned(value.to_string()))
    }
}

impl core::fmt::Display for SimpleHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// Ordered header table, names keep their first insertion position and
/// each name holds one or more values in the order they were added.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimpleHeaders(Vec<(SimpleHeader, Vec<String>)>);

impl SimpleHeaders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` to the values of `key`, adding the name at the end
    /// of the table when it is not present yet.
    pub fn add<H: Into<SimpleHeader>, S: Into<String>>(&mut self, key: H, value: S) {
        let key = key.into();
        if let Some(values) = self.get_mut(&key) {
            values.push(value.into());
        } else {
            self.0.push((key, vec![value.into()]));
        }
    }

    #[must_use]
    pub fn get(&self, key: &SimpleHeader) -> Option<&[String]> {
        self.0
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, values)| values.as_slice())
    }

    pub fn get_mut(&mut self, key: &SimpleHeader) -> Option<&mut Vec<String>> {
        self.0
            .iter_mut()
            .find(|(name, _)| name == key)
            .map(|(_, values)| values)
    }

    #[must_use]
    pub fn contains(&self, key: &SimpleHeader) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SimpleHeader, &[String])> {
        self.0.iter().map(|(name, values)| (name, values.as_slice()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A readable, seekable response body that may know its total size.
pub trait BodyStream: Read + Seek + Send {
    /// Total size of the body in bytes, `None` when it cannot be known
    /// without consuming the stream.
    fn size(&self) -> Option<u64>;
}

impl<T: AsRef<[u8]> + Send> BodyStream for Cursor<T> {
    fn size(&self) -> Option<u64> {
        u64::try_from(self.get_ref().as_ref().len()).ok()
    }
}

impl BodyStream for std::fs::File {
    fn size(&self) -> Option<u64> {
        self.metadata().ok().map(|meta| meta.len())
    }
}

/// Wraps a stream and hides its size, for bodies whose length is only
/// known once fully read.
pub struct UnsizedBody<R>(R);

impl<R> UnsizedBody<R> {
    pub fn new(inner: R) -> Self {
        Self(inner)
    }

    pub fn into_inner(self) -> R {
        self.0
    }
}

impl<R: Read> Read for UnsizedBody<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Seek> Seek for UnsizedBody<R> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.0.seek(pos)
    }
}

impl<R: Read + Seek + Send> BodyStream for UnsizedBody<R> {
    fn size(&self) -> Option<u64> {
        None
    }
}

pub struct OutgoingResponse {
    pub proto: Proto,
    pub status: Status,
    pub headers: SimpleHeaders,
    pub body: Option<Box<dyn BodyStream>>,
}

impl OutgoingResponse {
    #[must_use]
    pub fn builder() -> OutgoingResponseBuilder {
        OutgoingResponseBuilder::default()
    }

    /// `HTTP/<version> <code> <reason>`, without a trailing space when the
    /// reason phrase is empty.
    #[must_use]
    pub fn status_line(&self) -> String {
        format!("{} {}", self.proto, self.status)
    }

    /// Size reported by the body, `None` for a missing body or one of
    /// unknown length.
    #[must_use]
    pub fn body_size(&self) -> Option<u64> {
        self.body.as_ref().and_then(|body| body.size())
    }

    pub fn body_mut(&mut self) -> Option<&mut (dyn BodyStream + 'static)> {
        self.body.as_deref_mut()
    }
}

impl core::fmt::Debug for OutgoingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutgoingResponse")
            .field("proto", &self.proto)
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_size", &self.body_size())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct OutgoingResponseBuilder {
    proto: Option<Proto>,
    status: Option<Status>,
    headers: Option<SimpleHeaders>,
    body: Option<Box<dyn BodyStream>>,
}

pub type SimpleResponseResult<T> = std::result::Result<T, SimpleResponseError>;

#[derive(From, Debug)]
pub enum SimpleResponseError {
    StatusIsRequired,
}

impl std::error::Error for SimpleResponseError {}

impl core::fmt::Display for SimpleResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl OutgoingResponseBuilder {
    #[must_use]
    pub fn with_proto(mut self, proto: Proto) -> Self {
        self.proto = Some(proto);
        self
    }

    #[must_use]
    pub fn with_status<S: Into<Status>>(mut self, status: S) -> Self {
        self.status = Some(status.into());
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: SimpleHeaders) -> Self {
        self.headers = Some(headers);
        self
    }

    #[must_use]
    pub fn add_header<H: Into<SimpleHeader>, S: Into<String>>(mut self, key: H, value: S) -> Self {
        let mut headers = self.headers.unwrap_or_default();
        headers.add(key, value);
        self.headers = Some(headers);
        self
    }

    #[must_use]
    pub fn with_body_stream<B: BodyStream + 'static>(mut self, body: B) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    #[must_use]
    pub fn with_body_bytes<S: Into<Vec<u8>>>(self, body: S) -> Self {
        self.with_body_stream(Cursor::new(body.into()))
    }

    #[must_use]
    pub fn with_body_string<S: Into<String>>(self, body: S) -> Self {
        self.with_body_stream(Cursor::new(body.into().into_bytes()))
    }

    /// Builds the outgoing HTTP response.
    ///
    /// # Errors
    /// Returns an error if the status is not set.
    pub fn build(self) -> SimpleResponseResult<OutgoingResponse> {
        let Some(status) = self.status else {
            return Err(SimpleResponseError::StatusIsRequired);
        };

        Ok(OutgoingResponse {
            proto: self.proto.unwrap_or(Proto::HTTP11),
            headers: self.headers.unwrap_or_default(),
            body: self.body,
            status,
        })
    }
}

#[cfg(test)]
mod message_tests {
    use super::*;

    #[test]
    fn header_names_compare_without_case() {
        let mut headers = SimpleHeaders::new();
        headers.add("content-type", "text/plain");
        assert!(headers.contains(&SimpleHeader::CONTENT_TYPE));
        assert_eq!(
            headers.get(&SimpleHeader::from("CONTENT-TYPE")),
            Some(&["text/plain".to_string()][..])
        );
    }

    #[test]
    fn header_names_render_canonical() {
        assert_eq!(SimpleHeader::from("x-request-id").to_string(), "X-Request-Id");
        assert_eq!(SimpleHeader::from("x-XSS-protection").to_string(), "X-XSS-Protection");
    }

    #[test]
    fn repeated_headers_keep_table_position() {
        let mut headers = SimpleHeaders::new();
        headers.add(SimpleHeader::SET_COOKIE, "foo=bar");
        headers.add(SimpleHeader::CONTENT_TYPE, "text/plain");
        headers.add("set-cookie", "bar=baz");

        let names: Vec<String> = headers.iter().map(|(name, _)| name.to_string()).collect();
        assert_eq!(names, vec!["Set-Cookie", "Content-Type"]);
        assert_eq!(
            headers.get(&SimpleHeader::SET_COOKIE),
            Some(&["foo=bar".to_string(), "bar=baz".to_string()][..])
        );
    }

    #[test]
    fn builder_keeps_prepared_header_table() {
        let mut headers = SimpleHeaders::new();
        headers.add(SimpleHeader::CACHE_CONTROL, "no-cache");

        let response = OutgoingResponse::builder()
            .with_status(Status::OK)
            .with_headers(headers)
            .add_header(SimpleHeader::LOCATION, "/next")
            .build()
            .expect("should build");

        let names: Vec<String> = response
            .headers
            .iter()
            .map(|(name, _)| name.to_string())
            .collect();
        assert_eq!(names, vec!["Cache-Control", "Location"]);
    }

    #[test]
    fn status_line_uses_reason_phrase() {
        let response = OutgoingResponse::builder()
            .with_status(Status::Accepted)
            .build()
            .expect("should build");
        assert_eq!(response.status_line(), "HTTP/1.1 202 Accepted");
    }

    #[test]
    fn status_line_without_reason_has_no_trailing_space() {
        let response = OutgoingResponse::builder()
            .with_status(Status::Numbered(299, String::new()))
            .with_proto(Proto::HTTP20)
            .build()
            .expect("should build");
        assert_eq!(response.status_line(), "HTTP/2 299");
    }

    #[test]
    fn known_codes_resolve_to_named_status() {
        assert_eq!(Status::from(404), Status::NotFound);
        assert_eq!(Status::from(599), Status::Numbered(599, String::new()));
    }

    #[test]
    fn builder_requires_status() {
        assert!(matches!(
            OutgoingResponse::builder().build(),
            Err(SimpleResponseError::StatusIsRequired)
        ));
    }

    #[test]
    fn unsized_body_hides_length() {
        let response = OutgoingResponse::builder()
            .with_status(Status::OK)
            .with_body_stream(UnsizedBody::new(Cursor::new(b"Content!".to_vec())))
            .build()
            .expect("should build");
        assert_eq!(response.body_size(), None);
    }
}
