use std::io::Write;
use std::panic::Location;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Whether the response head was already finalized by the host, with the
/// location of the write that finalized it when the host tracks one.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum HeadState {
    #[default]
    NotSent,
    Sent {
        file: Option<String>,
        line: Option<u32>,
    },
}

/// `HostEnvironment` is the boundary between emitters and the server
/// that actually owns the response head and the output channel.
///
/// Implementations hold process or request wide state, so every method
/// takes `&self` and uses interior mutability.
pub trait HostEnvironment: Send + Sync {
    /// Adds one line to the outgoing response head. `replace` supersedes
    /// any earlier line carrying the same header name, `status_code` is
    /// advisory for hosts that report the final status on their own.
    fn send_response_head(&self, line: &str, replace: bool, status_code: Option<u16>);

    /// True once any byte reached the output channel.
    fn is_output_already_produced(&self) -> bool;

    fn response_head_state(&self) -> HeadState;

    /// Appends bytes to the output channel.
    ///
    /// # Errors
    /// Returns the underlying I/O error when the sink rejects the write.
    fn write_output(&self, bytes: &[u8]) -> std::io::Result<()>;

    /// Pushes anything buffered by the host out to the client.
    ///
    /// # Errors
    /// Returns the underlying I/O error when the sink fails to flush.
    fn flush_output(&self) -> std::io::Result<()> {
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One call to [`HostEnvironment::send_response_head`] as seen by a
/// [`RecordingHost`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadLine {
    pub line: String,
    pub replace: bool,
    pub status_code: Option<u16>,
}

impl HeadLine {
    pub fn new<S: Into<String>>(line: S, replace: bool, status_code: Option<u16>) -> Self {
        Self {
            line: line.into(),
            replace,
            status_code,
        }
    }
}

#[derive(Default)]
struct Recorded {
    head: Vec<HeadLine>,
    body: Vec<u8>,
    head_state: HeadState,
    output_produced: bool,
    fail_writes: bool,
    calls: usize,
    flushes: usize,
}

/// In-memory host that records every head line and body byte instead of
/// producing real output. Its guard state is set by hand.
#[derive(Default)]
pub struct RecordingHost {
    state: Mutex<Recorded>,
}

impl RecordingHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_headers_sent<S: Into<String>>(&self, file: S, line: u32) {
        lock(&self.state).head_state = HeadState::Sent {
            file: Some(file.into()),
            line: Some(line),
        };
    }

    pub fn mark_output_produced(&self) {
        lock(&self.state).output_produced = true;
    }

    /// Makes every following [`HostEnvironment::write_output`] fail.
    pub fn fail_writes(&self) {
        lock(&self.state).fail_writes = true;
    }

    pub fn reset(&self) {
        *lock(&self.state) = Recorded::default();
    }

    #[must_use]
    pub fn head_lines(&self) -> Vec<HeadLine> {
        lock(&self.state).head.clone()
    }

    #[must_use]
    pub fn has_head_line(&self, line: &str) -> bool {
        lock(&self.state).head.iter().any(|item| item.line == line)
    }

    #[must_use]
    pub fn body(&self) -> Vec<u8> {
        lock(&self.state).body.clone()
    }

    /// Number of trait calls received, guard queries included.
    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.state).calls
    }

    #[must_use]
    pub fn flush_count(&self) -> usize {
        lock(&self.state).flushes
    }
}

impl HostEnvironment for RecordingHost {
    fn send_response_head(&self, line: &str, replace: bool, status_code: Option<u16>) {
        let mut state = lock(&self.state);
        state.calls += 1;
        state.head.push(HeadLine::new(line, replace, status_code));
    }

    fn is_output_already_produced(&self) -> bool {
        let mut state = lock(&self.state);
        state.calls += 1;
        state.output_produced
    }

    fn response_head_state(&self) -> HeadState {
        let mut state = lock(&self.state);
        state.calls += 1;
        state.head_state.clone()
    }

    fn write_output(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut state = lock(&self.state);
        state.calls += 1;
        if state.fail_writes {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "output channel closed",
            ));
        }
        state.body.extend_from_slice(bytes);
        Ok(())
    }

    fn flush_output(&self) -> std::io::Result<()> {
        let mut state = lock(&self.state);
        state.calls += 1;
        state.flushes += 1;
        Ok(())
    }
}

struct CgiState<W> {
    writer: W,
    status: Option<String>,
    status_code: Option<u16>,
    headers: Vec<(String, String)>,
    head_state: HeadState,
    output_produced: bool,
}

/// Host writing CGI style output into any [`Write`] sink.
///
/// Head lines are held back until the first body write or flush, at which
/// point a `Status:` line, the header lines and the blank separator line
/// are written out. Later head lines are dropped.
pub struct CgiHost<W: Write + Send> {
    state: Mutex<CgiState<W>>,
}

impl<W: Write + Send> CgiHost<W> {
    pub fn new(writer: W) -> Self {
        Self {
            state: Mutex::new(CgiState {
                writer,
                status: None,
                status_code: None,
                headers: Vec::new(),
                head_state: HeadState::NotSent,
                output_produced: false,
            }),
        }
    }

    pub fn into_inner(self) -> W {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .writer
    }

    #[track_caller]
    fn finalize_head(state: &mut CgiState<W>) -> std::io::Result<()> {
        if state.head_state != HeadState::NotSent {
            return Ok(());
        }

        let status = match (&state.status, state.status_code) {
            (Some(status), _) => status.clone(),
            (None, Some(code)) => crate::Status::from(code).to_string(),
            (None, None) => crate::Status::OK.to_string(),
        };

        let mut head = format!("Status: {status}\r\n");
        for (_, line) in &state.headers {
            head.push_str(line);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");

        let origin = Location::caller();
        state.head_state = HeadState::Sent {
            file: Some(origin.file().to_string()),
            line: Some(origin.line()),
        };

        state.writer.write_all(head.as_bytes())
    }
}

impl<W: Write + Send> HostEnvironment for CgiHost<W> {
    fn send_response_head(&self, line: &str, replace: bool, status_code: Option<u16>) {
        let mut state = lock(&self.state);
        if let HeadState::Sent { file, line: at } = &state.head_state {
            tracing::warn!(
                "Dropping head line {:?}, head already sent at {:?}:{:?}",
                line,
                file,
                at
            );
            return;
        }

        if status_code.is_some() {
            state.status_code = status_code;
        }

        if let Some(rest) = line.strip_prefix("HTTP/") {
            state.status = rest
                .split_once(' ')
                .map(|(_, status)| status.trim().to_string());
            return;
        }

        let name = line
            .split_once(':')
            .map_or(line, |(name, _)| name)
            .trim()
            .to_string();

        if replace {
            state
                .headers
                .retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        }
        state.headers.push((name, line.to_string()));
    }

    fn is_output_already_produced(&self) -> bool {
        lock(&self.state).output_produced
    }

    fn response_head_state(&self) -> HeadState {
        lock(&self.state).head_state.clone()
    }

    #[track_caller]
    fn write_output(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut state = lock(&self.state);
        Self::finalize_head(&mut state)?;
        if bytes.is_empty() {
            return Ok(());
        }
        state.output_produced = true;
        state.writer.write_all(bytes)
    }

    #[track_caller]
    fn flush_output(&self) -> std::io::Result<()> {
        let mut state = lock(&self.state);
        Self::finalize_head(&mut state)?;
        state.writer.flush()
    }
}

#[cfg(test)]
mod cgi_host_tests {
    use super::*;

    #[test]
    fn renders_status_and_headers_before_body() {
        let host = CgiHost::new(Vec::new());
        host.send_response_head("Content-Type: text/plain", true, Some(202));
        host.send_response_head("HTTP/1.1 202 Accepted", true, Some(202));
        host.write_output(b"Content!").expect("should write");

        let output = String::from_utf8(host.into_inner()).expect("should be utf8");
        assert_eq!(
            output,
            "Status: 202 Accepted\r\nContent-Type: text/plain\r\n\r\nContent!"
        );
    }

    #[test]
    fn replace_supersedes_same_named_lines() {
        let host = CgiHost::new(Vec::new());
        host.send_response_head("Set-Cookie: foo=bar", true, None);
        host.send_response_head("Set-Cookie: bar=baz", false, None);
        host.send_response_head("Cache-Control: no-cache", true, None);
        host.send_response_head("cache-control: private", true, None);
        host.flush_output().expect("should flush");

        let output = String::from_utf8(host.into_inner()).expect("should be utf8");
        assert_eq!(
            output,
            "Status: 200 OK\r\nSet-Cookie: foo=bar\r\nSet-Cookie: bar=baz\r\ncache-control: private\r\n\r\n"
        );
    }

    #[test]
    fn records_where_the_head_was_sent() {
        let host = CgiHost::new(Vec::new());
        assert_eq!(host.response_head_state(), HeadState::NotSent);

        host.write_output(b"early").expect("should write");

        assert!(host.is_output_already_produced());
        match host.response_head_state() {
            HeadState::Sent { file, line } => {
                assert!(file.is_some_and(|file| file.ends_with("host.rs")));
                assert!(line.is_some());
            }
            HeadState::NotSent => panic!("head should be marked as sent"),
        }
    }
}
