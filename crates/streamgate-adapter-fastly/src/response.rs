use fastly::Response as FastlyResponse;
use streamgate_core::error::GatewayError;

use crate::writer::BufferedWriter;

/// Turns the recorded response into the one Compute sends back. Repeated headers are appended.
pub fn from_buffered(writer: BufferedWriter) -> Result<FastlyResponse, GatewayError> {
    let (status, headers, body) = writer.into_parts().ok_or_else(|| {
        GatewayError::internal(anyhow::anyhow!("gateway ended without a response"))
    })?;

    let mut fastly_response = FastlyResponse::from_status(status.as_u16());
    for (name, value) in headers.iter() {
        fastly_response.append_header(name.as_str(), value.as_bytes());
    }
    if !body.is_empty() {
        fastly_response.set_body(body.to_vec());
    }
    Ok(fastly_response)
}
