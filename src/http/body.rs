//! Streaming the response body through an installed transform chain.
//!
//! Each data chunk from the handler is written into the chain and whatever
//! the chain has produced for the wire is emitted as the next frame. When the
//! handler's body ends the chain is finished and its trailer becomes the final
//! frame. Any failure ends the stream with an error so the server aborts the
//! response instead of sending a truncated body as if it were complete.

use std::io::Write;

use axum::body::Body;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use tracing::error;

use crate::observability::metrics;
use crate::pipeline::{PipelineError, TransformChain};

/// Wrap `body` so every byte passes through `chain`.
pub fn transform_body(body: Body, chain: TransformChain<Vec<u8>>) -> Body {
    let data = body.into_data_stream();

    let frames = stream::unfold(Some((data, chain)), |state| async move {
        let (mut data, mut chain) = match state {
            Some(state) => state,
            None => return None,
        };
        loop {
            match data.next().await {
                Some(Ok(chunk)) => {
                    if let Err(e) = chain.write_all(&chunk) {
                        return Some((Err(failed(e.into())), None));
                    }
                    let produced = std::mem::take(chain.sink_mut());
                    if !produced.is_empty() {
                        return Some((Ok(Bytes::from(produced)), Some((data, chain))));
                    }
                }
                Some(Err(e)) => return Some((Err(failed(e.into())), None)),
                None => {
                    let rewrites = chain.rewrites();
                    return match chain.finish() {
                        Ok(tail) => {
                            metrics::record_rewrites(rewrites);
                            if tail.is_empty() {
                                None
                            } else {
                                Some((Ok(Bytes::from(tail)), None))
                            }
                        }
                        Err(e) => Some((Err(failed(e.into())), None)),
                    };
                }
            }
        }
    });

    Body::from_stream(frames)
}

fn failed(e: PipelineError) -> PipelineError {
    error!(error = %e, "Response transform failed, aborting body");
    metrics::record_transform_error();
    e
}
