//! Per-connection request pipeline.
//!
//! One read loop per connection reads frames in wire order and hands each
//! decoded request to its own worker task. Workers write their response
//! through the connection's single writer lock, so frames never interleave,
//! but they finish in any order; the echoed `Seq` is what correlates.
//!
//! ```text
//! ReadingHeader -> ReadingBody -> Dispatched -> ResponseSent
//!        \ EOF / fatal read
//!         Draining -> Closed
//! ```
//!
//! Anything that goes wrong after a header was read is answered with exactly
//! one error-tagged response carrying that header and a sentinel body.
//! Only failures that lose the stream position (the body could not be read)
//! end the loop; a body that fails to decode, an unknown method or an
//! overloaded connection are answered and the loop moves on.
//!
//! When the loop ends, the connection waits for every in-flight worker before
//! closing the codec, so no response is truncated.

use crate::config::OverloadPolicy;
use crate::core::codec::{Codec, CodecWriter};
use crate::core::frame::{Body, Header};
use crate::core::serialization::SerializationFormat;
use crate::error::{constants, RpcError};
use crate::service::{Invocation, ServiceRegistry};
use crate::utils::metrics::{Metrics, Timer};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

type SharedWriter = Arc<Mutex<Box<dyn CodecWriter>>>;

/// What every connection of a server shares
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub services: Arc<ServiceRegistry>,
    pub metrics: Arc<Metrics>,
    /// Bound on concurrently running workers per connection
    pub max_in_flight: usize,
    pub overload_policy: OverloadPolicy,
    /// Replies larger than this are answered with an error instead
    pub max_frame_size: usize,
}

/// A fully read request. The argument lives inside the bound invocation;
/// the reply is what the invocation resolves to.
struct Request {
    header: Header,
    invocation: Invocation,
}

/// Drive one negotiated connection until the peer goes away, then drain and
/// close the codec.
pub async fn serve_codec(codec: Codec, ctx: PipelineContext) {
    let format = codec.format();
    let (mut reader, writer) = codec.into_split();
    let writer: SharedWriter = Arc::new(Mutex::new(writer));
    let workers = TaskTracker::new();
    let permits = Arc::new(Semaphore::new(ctx.max_in_flight));

    loop {
        let mut header = match reader.read_header().await {
            Ok(header) => header,
            Err(e) if e.is_disconnect() => {
                debug!("rpc server: peer closed connection");
                break;
            }
            Err(e) => {
                error!(error = %e, "rpc server: read header error");
                break;
            }
        };
        ctx.metrics.request_received();
        // Error is response-only; whatever the client put there is dropped.
        header.error.clear();

        let args = match reader.read_body().await {
            Ok(args) => args,
            Err(e) => {
                warn!(
                    error = %e,
                    seq = header.seq,
                    method = %header.service_method,
                    "rpc server: read body error"
                );
                send_error(&writer, header, &e, format, &ctx).await;
                break;
            }
        };

        let invocation = match ctx.services.bind(&header.service_method, format, &args) {
            Ok(invocation) => invocation,
            Err(e) => {
                debug!(
                    error = %e,
                    seq = header.seq,
                    method = %header.service_method,
                    "rpc server: request rejected"
                );
                send_error(&writer, header, &e, format, &ctx).await;
                continue;
            }
        };

        let Some(permit) = admit(&permits, ctx.overload_policy).await else {
            ctx.metrics.request_rejected();
            send_error(&writer, header, &RpcError::ServerBusy, format, &ctx).await;
            continue;
        };

        let request = Request { header, invocation };
        workers.spawn(handle_request(
            request,
            Arc::clone(&writer),
            permit,
            format,
            ctx.clone(),
        ));
    }

    workers.close();
    if !workers.is_empty() {
        debug!(in_flight = workers.len(), "rpc server: draining in-flight requests");
    }
    workers.wait().await;

    let mut writer = writer.lock().await;
    if let Err(e) = writer.close().await {
        debug!(error = %e, "rpc server: error closing codec");
    }
}

async fn admit(
    permits: &Arc<Semaphore>,
    policy: OverloadPolicy,
) -> Option<OwnedSemaphorePermit> {
    match policy {
        OverloadPolicy::Queue => Arc::clone(permits).acquire_owned().await.ok(),
        OverloadPolicy::Reject => Arc::clone(permits).try_acquire_owned().ok(),
    }
}

/// Worker body: run the invocation and write exactly one response. The
/// permit is released only after the write.
async fn handle_request(
    request: Request,
    writer: SharedWriter,
    _permit: OwnedSemaphorePermit,
    format: SerializationFormat,
    ctx: PipelineContext,
) {
    let _timer = Timer::start("rpc_request");
    let Request {
        mut header,
        invocation,
    } = request;

    let body = match AssertUnwindSafe(invocation).catch_unwind().await {
        Ok(Ok(reply)) if reply.len() <= ctx.max_frame_size => reply,
        Ok(Ok(reply)) => {
            header.error = RpcError::OversizedFrame(reply.len()).to_string();
            format.sentinel_body()
        }
        Ok(Err(e)) => {
            header.error = e.to_string();
            format.sentinel_body()
        }
        Err(_) => {
            error!(
                seq = header.seq,
                method = %header.service_method,
                "rpc server: handler panicked"
            );
            header.error = constants::ERR_HANDLER_PANICKED.to_string();
            format.sentinel_body()
        }
    };

    send_response(&writer, header, &body, format, &ctx).await;
}

async fn send_error(
    writer: &SharedWriter,
    mut header: Header,
    err: &RpcError,
    format: SerializationFormat,
    ctx: &PipelineContext,
) {
    header.error = err.to_string();
    send_response(writer, header, &format.sentinel_body(), format, ctx).await;
}

async fn send_response(
    writer: &SharedWriter,
    mut header: Header,
    body: &Body,
    format: SerializationFormat,
    ctx: &PipelineContext,
) {
    if header.is_error() {
        bound_header(&mut header, format, ctx.max_frame_size);
    }

    let mut writer = writer.lock().await;
    match writer.write(&header, body).await {
        Ok(()) => ctx.metrics.response_sent(header.is_error()),
        Err(e) => {
            ctx.metrics.write_failed();
            error!(error = %e, seq = header.seq, "rpc server: write response error");
        }
    }
}

/// Shorten the echoed method name and error text until the encoded header
/// fits in one segment. An error header that could not be written would
/// poison the writer for every other request on the connection.
///
/// Success headers need no check: they are the request header with `Error`
/// cleared, and the request header already fit.
fn bound_header(header: &mut Header, format: SerializationFormat, max_frame_size: usize) {
    loop {
        match format.to_bytes(&*header) {
            Ok(encoded) if encoded.len() > max_frame_size => {}
            _ => return,
        }
        if !header.service_method.is_empty() {
            truncate_half(&mut header.service_method);
        } else if header.error.len() > 1 {
            truncate_half(&mut header.error);
        } else {
            return;
        }
    }
}

fn truncate_half(text: &mut String) {
    let mut cut = text.len() / 2;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}
