use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use signal_proto::{
    CandidatePost, ErrorBody, IceCandidateRecord, SessionDescription, SignalRequest, SignalRole,
    SignalingRoom,
};
use tracing::trace;
use url::Url;

use crate::error::CallError;

/// Upper bound on any single mailbox request made by the default client.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One participant's view of one session's mailbox.
#[async_trait]
pub trait SignalingMailbox: Send + Sync {
    async fn get_room(&self) -> Result<Option<SignalingRoom>, CallError>;
    async fn post_offer(&self, offer: &SessionDescription) -> Result<(), CallError>;
    async fn post_answer(&self, answer: &SessionDescription) -> Result<(), CallError>;
    async fn add_candidate(
        &self,
        role: SignalRole,
        candidate: &IceCandidateRecord,
    ) -> Result<(), CallError>;
    async fn end_room(&self) -> Result<(), CallError>;
}

/// `signal-road` over HTTP, authenticated with the caller's bearer token.
#[derive(Clone)]
pub struct HttpMailbox {
    client: reqwest::Client,
    room_url: Url,
    signal_url: Url,
    token: String,
}

impl HttpMailbox {
    pub fn new(base: &str, session_id: &str, token: impl Into<String>) -> Result<Self, CallError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Self::with_client(client, base, session_id, token)
    }

    pub fn with_client(
        client: reqwest::Client,
        base: &str,
        session_id: &str,
        token: impl Into<String>,
    ) -> Result<Self, CallError> {
        let base = Url::parse(base)?;
        Ok(Self {
            client,
            room_url: session_url(&base, session_id, &["room"])?,
            signal_url: session_url(&base, session_id, &["signal"])?,
            token: token.into(),
        })
    }

    async fn signal(&self, request: SignalRequest) -> Result<(), CallError> {
        trace!(url = %self.signal_url, "posting signal");
        let response = self
            .client
            .post(self.signal_url.clone())
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }
}

fn session_url(base: &Url, session_id: &str, tail: &[&str]) -> Result<Url, CallError> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| CallError::Malformed(format!("{base} cannot be a base url")))?;
        segments.pop_if_empty().push("sessions").push(session_id);
        segments.extend(tail);
    }
    Ok(url)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CallError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(signal_error(status, &text))
}

fn signal_error(status: StatusCode, body: &str) -> CallError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(body) => CallError::Signal {
            status: status.as_u16(),
            code: body.error,
            message: body.message,
        },
        Err(_) => CallError::Signal {
            status: status.as_u16(),
            code: "http".to_string(),
            message: if body.is_empty() {
                status.to_string()
            } else {
                body.to_string()
            },
        },
    }
}

#[async_trait]
impl SignalingMailbox for HttpMailbox {
    async fn get_room(&self) -> Result<Option<SignalingRoom>, CallError> {
        let response = self
            .client
            .get(self.room_url.clone())
            .bearer_auth(&self.token)
            .send()
            .await?;
        let response = check_status(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn post_offer(&self, offer: &SessionDescription) -> Result<(), CallError> {
        self.signal(SignalRequest::CreateOffer(offer.clone())).await
    }

    async fn post_answer(&self, answer: &SessionDescription) -> Result<(), CallError> {
        self.signal(SignalRequest::CreateAnswer(answer.clone())).await
    }

    async fn add_candidate(
        &self,
        role: SignalRole,
        candidate: &IceCandidateRecord,
    ) -> Result<(), CallError> {
        self.signal(SignalRequest::AddCandidate(CandidatePost {
            role,
            candidate: candidate.clone(),
        }))
        .await
    }

    async fn end_room(&self) -> Result<(), CallError> {
        self.signal(SignalRequest::End).await
    }
}
