//! Stream bridge: pumps upstream SSE bytes through a [`StreamReframer`] into
//! the downstream response body.
//!
//! The pump runs in its own task and talks to the body through a bounded
//! channel, so a slow client applies backpressure all the way to the upstream
//! socket. If the client goes away the channel closes, the pump stops, and
//! dropping the upstream byte stream aborts the upstream request.

use std::convert::Infallible;

use axum::body::Body;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::proxy::stream::StreamReframer;

/// Framed records buffered between the pump and the client socket.
const CHANNEL_CAPACITY: usize = 16;

/// How a pumped stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Upstream reached end-of-stream and the sentinel was delivered.
    Completed,
    /// Upstream transport failed mid-stream; the body was closed without a sentinel.
    UpstreamFailed,
    /// The downstream client disconnected.
    ClientGone,
}

/// Reframe a live upstream response into a client-schema SSE body.
pub fn reframe_sse_stream(upstream_resp: reqwest::Response, client_model: String) -> Body {
    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(CHANNEL_CAPACITY);
    let reframer = StreamReframer::new(client_model);

    tokio::spawn(
        async move {
            let outcome = pump(upstream_resp.bytes_stream(), reframer, tx).await;
            tracing::debug!(?outcome, "Stream finished");
        }
        .instrument(tracing::Span::current()),
    );

    Body::from_stream(tokio_stream::wrappers::ReceiverStream::new(rx))
}

/// Drive `upstream` through `reframer`, sending each framed record to `tx`
/// in order. Generic over the byte source so it can be driven without a
/// live HTTP connection.
pub async fn pump<S, E>(
    upstream: S,
    mut reframer: StreamReframer,
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
) -> StreamOutcome
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    futures::pin_mut!(upstream);

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                tracing::info!("Client disconnected mid-stream; aborting upstream");
                return StreamOutcome::ClientGone;
            }
            next = upstream.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                for event in reframer.feed(&bytes) {
                    if tx.send(Ok(event.to_sse_bytes())).await.is_err() {
                        tracing::info!("Client disconnected mid-stream; aborting upstream");
                        return StreamOutcome::ClientGone;
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!("Upstream stream failed: {}", e);
                return StreamOutcome::UpstreamFailed;
            }
            None => {
                if let Some(done) = reframer.finish() {
                    if tx.send(Ok(done.to_sse_bytes())).await.is_err() {
                        return StreamOutcome::ClientGone;
                    }
                }
                return StreamOutcome::Completed;
            }
        }
    }
}
