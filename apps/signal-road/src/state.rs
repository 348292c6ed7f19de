use std::sync::Arc;

use axum::http::HeaderMap;

use crate::auth::{bearer_token, CallerTokens};
use crate::bookings::BookingDirectory;
use crate::config::Config;
use crate::error::SignalError;
use crate::feed::RoomFeed;
use crate::lifecycle::LifecycleBridge;
use crate::mailbox::MailboxStore;
use crate::service::MailboxService;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    service: MailboxService,
    bookings: Arc<dyn BookingDirectory>,
    tokens: CallerTokens,
    admin_token: Option<String>,
}

impl AppState {
    pub fn new(
        config: &Config,
        mailbox: Arc<dyn MailboxStore>,
        bookings: Arc<dyn BookingDirectory>,
    ) -> Self {
        let feed = RoomFeed::new();
        let bridge = LifecycleBridge::new(
            Arc::clone(&bookings),
            Arc::clone(&mailbox),
            feed.clone(),
            config.require_accepted,
        );
        let service = MailboxService::new(mailbox, bridge, feed);
        Self {
            inner: Arc::new(AppStateInner {
                service,
                bookings,
                tokens: CallerTokens::new(config.jwt_secret.as_bytes()),
                admin_token: config.admin_token.clone(),
            }),
        }
    }

    pub fn service(&self) -> &MailboxService {
        &self.inner.service
    }

    pub fn bridge(&self) -> &LifecycleBridge {
        self.inner.service.bridge()
    }

    pub fn feed(&self) -> &RoomFeed {
        self.inner.service.feed()
    }

    pub fn bookings(&self) -> &Arc<dyn BookingDirectory> {
        &self.inner.bookings
    }

    pub fn tokens(&self) -> &CallerTokens {
        &self.inner.tokens
    }

    pub fn caller(&self, headers: &HeaderMap) -> Option<String> {
        self.inner.tokens.caller_from_headers(headers)
    }

    /// Booking management is service-to-service only. With no admin token
    /// configured those routes stay closed.
    pub fn require_admin(&self, headers: &HeaderMap) -> Result<(), SignalError> {
        let expected = self
            .inner
            .admin_token
            .as_deref()
            .ok_or(SignalError::Forbidden)?;
        match bearer_token(headers) {
            Some(token) if token == expected => Ok(()),
            Some(_) => Err(SignalError::Forbidden),
            None => Err(SignalError::Unauthenticated),
        }
    }
}
