use bytes::Bytes;
use futures::channel::mpsc;
use futures_util::StreamExt;
use streamgate_core::http::{HeaderMap, StatusCode};
use worker::{Error as WorkerError, Response as CfResponse};

use crate::writer::NULL_BODY_STATUSES;

/// Builds the runtime response around the live body channel. Multi-valued headers are appended,
/// not overwritten.
pub fn into_cf_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: mpsc::Receiver<Bytes>,
) -> Result<CfResponse, WorkerError> {
    let cf_response = if NULL_BODY_STATUSES.contains(&status.as_u16()) {
        CfResponse::empty()?
    } else {
        CfResponse::from_stream(body.map(|chunk| Ok::<Vec<u8>, WorkerError>(chunk.to_vec())))?
    };

    let mut cf_response = cf_response.with_status(status.as_u16());
    let cf_headers = cf_response.headers_mut();
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            cf_headers.append(name.as_str(), value)?;
        }
    }
    Ok(cf_response)
}
