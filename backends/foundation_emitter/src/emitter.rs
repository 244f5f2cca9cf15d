use crate::errors::{EmitterError, EmitterResult};
use crate::host::{HeadState, HostEnvironment};
use crate::message::{OutgoingResponse, SimpleHeader};
use std::sync::Arc;

/// `Emitter` delivers an [`OutgoingResponse`] to the hosting environment.
///
/// `Ok(true)` means the response was fully handled and nothing else should
/// try to emit it, `Ok(false)` means the emitter declined and the next one
/// in an [`crate::EmitterChain`] gets a go. Errors abort emission outright.
pub trait Emitter: Send + Sync {
    /// # Errors
    /// Returns an [`EmitterError`] when emission cannot start or the body
    /// cannot be delivered.
    fn emit(&self, response: &mut OutgoingResponse) -> EmitterResult<bool>;
}

impl<E: Emitter + ?Sized> Emitter for Box<E> {
    fn emit(&self, response: &mut OutgoingResponse) -> EmitterResult<bool> {
        (**self).emit(response)
    }
}

impl<E: Emitter + ?Sized> Emitter for Arc<E> {
    fn emit(&self, response: &mut OutgoingResponse) -> EmitterResult<bool> {
        (**self).emit(response)
    }
}

type EmitFn = dyn Fn(&mut OutgoingResponse) -> EmitterResult<bool> + Send + Sync;

/// Adapts a closure into an [`Emitter`].
pub struct FnEmitter(Box<EmitFn>);

impl FnEmitter {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&mut OutgoingResponse) -> EmitterResult<bool> + Send + Sync + 'static,
    {
        Self(Box::new(func))
    }
}

impl Emitter for FnEmitter {
    fn emit(&self, response: &mut OutgoingResponse) -> EmitterResult<bool> {
        (self.0)(response)
    }
}

/// Fails when the host already produced output or already sent the head.
/// Output takes priority since it implies the head is gone too.
pub(crate) fn assert_no_previous_output<H: HostEnvironment + ?Sized>(
    host: &H,
) -> EmitterResult<()> {
    if host.is_output_already_produced() {
        tracing::warn!("Refusing to emit response, output was already produced");
        return Err(EmitterError::OutputAlreadySent);
    }

    if let HeadState::Sent { file, line } = host.response_head_state() {
        tracing::warn!(
            "Refusing to emit response, headers already sent in {:?}:{:?}",
            &file,
            &line
        );
        return Err(EmitterError::HeadersAlreadySent { file, line });
    }

    Ok(())
}

/// Sends each header value as its own head line. The first value of a name
/// replaces whatever the host holds for it, the rest are appended so
/// repeatable headers such as `Set-Cookie` all survive.
///
/// A `Content-Length` line is added from the body size when the response
/// has none and the size is known.
pub(crate) fn emit_headers<H: HostEnvironment + ?Sized>(host: &H, response: &OutgoingResponse) {
    emit_headers_with_length(host, response, response.body_size());
}

/// Same as [`emit_headers`] with `content_length` standing in for the body
/// size, for emitters that send only part of the body.
pub(crate) fn emit_headers_with_length<H: HostEnvironment + ?Sized>(
    host: &H,
    response: &OutgoingResponse,
    content_length: Option<u64>,
) {
    let status_code = Some(response.status.code());

    for (name, values) in response.headers.iter() {
        let name = name.canonical();
        let mut replace = true;
        for value in values {
            host.send_response_head(&format!("{name}: {value}"), replace, status_code);
            replace = false;
        }
    }

    if response.headers.contains(&SimpleHeader::CONTENT_LENGTH) {
        return;
    }

    if let Some(size) = content_length {
        tracing::debug!("Injecting content length of {} bytes", size);
        host.send_response_head(
            &format!("{}: {size}", SimpleHeader::CONTENT_LENGTH),
            true,
            status_code,
        );
    }
}

/// Sent after the headers so it is the last word the host gets on status.
pub(crate) fn emit_status_line<H: HostEnvironment + ?Sized>(
    host: &H,
    response: &OutgoingResponse,
) {
    host.send_response_head(&response.status_line(), true, Some(response.status.code()));
}

/// Emits the response head through the host and writes the body, from its
/// current position to the end, into the output channel in one go.
pub struct ResponseEmitter<H: HostEnvironment> {
    host: Arc<H>,
}

impl<H: HostEnvironment> ResponseEmitter<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self { host }
    }

    fn emit_body(&self, response: &mut OutgoingResponse) -> EmitterResult<()> {
        let Some(body) = response.body_mut() else {
            return Ok(());
        };

        let mut content = Vec::new();
        body.read_to_end(&mut content)
            .map_err(EmitterError::BodyReadFailed)?;

        if content.is_empty() {
            return Ok(());
        }

        self.host
            .write_output(&content)
            .map_err(EmitterError::OutputFailed)
    }
}

impl<H: HostEnvironment> Emitter for ResponseEmitter<H> {
    fn emit(&self, response: &mut OutgoingResponse) -> EmitterResult<bool> {
        assert_no_previous_output(self.host.as_ref())?;

        tracing::debug!("Emitting response with status: {}", &response.status);

        emit_headers(self.host.as_ref(), response);
        emit_status_line(self.host.as_ref(), response);
        self.emit_body(response)?;

        Ok(true)
    }
}
