use async_trait::async_trait;

use crate::error::CallError;

/// Destination for a finished call recording, attached with
/// [`Coordinator::with_recording_sink`](crate::Coordinator::with_recording_sink).
/// Not part of negotiation; callers hand the blob over after hang-up.
#[async_trait]
pub trait RecordingSink: Send + Sync {
    /// Stores `blob` for the session and returns where it can be fetched.
    async fn store(&self, session_id: &str, blob: Vec<u8>) -> Result<String, CallError>;
}
