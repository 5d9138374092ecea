//! Fakes for the backend and location ports, shared by the unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rallypoint_core::{Credential, Position, RawEventRecord, UserAddress};
use rallypoint_store::{PositionCache, StoreError};

use crate::backend::{BackendError, Feed, MapBackend};
use crate::location::{LocationError, LocationProvider, Permission};

#[derive(Debug, Clone)]
pub(crate) enum Reply<T> {
    Ok(T),
    Status(u16),
}

impl<T: Clone> Reply<T> {
    fn resolve(&self, feed: Feed) -> Result<T, BackendError> {
        match self {
            Self::Ok(value) => Ok(value.clone()),
            Self::Status(status) => Err(BackendError::from_status(feed, *status, String::new())),
        }
    }
}

pub(crate) struct FakeBackend {
    help: Mutex<Reply<Vec<RawEventRecord>>>,
    safe: Mutex<Reply<Vec<RawEventRecord>>>,
    address: Mutex<Reply<Option<UserAddress>>>,
    help_delay: Duration,
    calls: AtomicUsize,
    help_in_flight: AtomicUsize,
    max_help_in_flight: AtomicUsize,
    tokens: Mutex<Vec<String>>,
    log: Mutex<Vec<&'static str>>,
}

impl FakeBackend {
    /// Two help calls, one safe report, a registered address.
    pub(crate) fn healthy() -> Self {
        let mut help = RawEventRecord::new(1, 37.001, 35.321);
        help.message = Some("Enkaz altındayım".into());
        help.created_at = Some("2026-02-21 10:00:00".into());
        Self {
            help: Mutex::new(Reply::Ok(vec![help, RawEventRecord::new(2, 37.003, 35.318)])),
            safe: Mutex::new(Reply::Ok(vec![RawEventRecord::new(1, 37.002, 35.322)])),
            address: Mutex::new(Reply::Ok(Some(UserAddress {
                latitude: Some(36.9182),
                longitude: Some(34.8931),
                neighborhood_name: Some("Cumhuriyet".into()),
                street: Some("1012. Sokak".into()),
                ..Default::default()
            }))),
            help_delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            help_in_flight: AtomicUsize::new(0),
            max_help_in_flight: AtomicUsize::new(0),
            tokens: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_help_delay(mut self, delay: Duration) -> Self {
        self.help_delay = delay;
        self
    }

    pub(crate) fn set_help(&self, reply: Reply<Vec<RawEventRecord>>) {
        *self.help.lock().unwrap() = reply;
    }

    pub(crate) fn set_safe(&self, reply: Reply<Vec<RawEventRecord>>) {
        *self.safe.lock().unwrap() = reply;
    }

    pub(crate) fn set_address(&self, reply: Reply<Option<UserAddress>>) {
        *self.address.lock().unwrap() = reply;
    }

    /// Total backend calls across all feeds.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_help_in_flight(&self) -> usize {
        self.max_help_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn seen_tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    /// `help:start` / `help:end` entries in call order.
    pub(crate) fn log(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, credential: &Credential) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .lock()
            .unwrap()
            .push(credential.as_str().to_string());
    }
}

#[async_trait]
impl MapBackend for FakeBackend {
    async fn help_calls(
        &self,
        credential: &Credential,
    ) -> Result<Vec<RawEventRecord>, BackendError> {
        self.record(credential);
        let now = self.help_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_help_in_flight.fetch_max(now, Ordering::SeqCst);
        self.log.lock().unwrap().push("help:start");

        if !self.help_delay.is_zero() {
            tokio::time::sleep(self.help_delay).await;
        }

        self.log.lock().unwrap().push("help:end");
        self.help_in_flight.fetch_sub(1, Ordering::SeqCst);
        let reply = self.help.lock().unwrap().clone();
        reply.resolve(Feed::HelpCalls)
    }

    async fn safe_statuses(
        &self,
        credential: &Credential,
    ) -> Result<Vec<RawEventRecord>, BackendError> {
        self.record(credential);
        let reply = self.safe.lock().unwrap().clone();
        reply.resolve(Feed::SafeStatus)
    }

    async fn user_address(
        &self,
        credential: &Credential,
    ) -> Result<Option<UserAddress>, BackendError> {
        self.record(credential);
        let reply = self.address.lock().unwrap().clone();
        reply.resolve(Feed::Address)
    }
}

/// Location provider with scripted permission and fix.
pub(crate) struct FakeLocation {
    permission: Mutex<Permission>,
    permission_delay: Duration,
    fix: Result<Position, LocationError>,
    delay: Duration,
    requests: AtomicUsize,
}

impl FakeLocation {
    pub(crate) fn live(position: Position) -> Self {
        Self {
            permission: Mutex::new(Permission::Granted),
            permission_delay: Duration::ZERO,
            fix: Ok(position),
            delay: Duration::ZERO,
            requests: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fix: Err(LocationError::Unavailable("gps off".into())),
            ..Self::live(Position::new(0.0, 0.0))
        }
    }

    pub(crate) fn denied() -> Self {
        Self {
            permission: Mutex::new(Permission::Denied),
            ..Self::failing()
        }
    }

    pub(crate) fn hanging() -> Self {
        Self {
            delay: Duration::from_secs(3600),
            ..Self::live(Position::new(38.0, 36.0))
        }
    }

    /// The permission prompt is never answered.
    pub(crate) fn unanswered_prompt() -> Self {
        Self {
            permission_delay: Duration::from_secs(3600),
            ..Self::live(Position::new(38.0, 36.0))
        }
    }

    /// Change the answer to later permission requests.
    pub(crate) fn set_permission(&self, permission: Permission) {
        *self.permission.lock().unwrap() = permission;
    }

    pub(crate) fn position_requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationProvider for FakeLocation {
    async fn request_permission(&self) -> Permission {
        if !self.permission_delay.is_zero() {
            tokio::time::sleep(self.permission_delay).await;
        }
        *self.permission.lock().unwrap()
    }

    async fn current_position(&self, _timeout: Duration) -> Result<Position, LocationError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.fix.clone()
    }
}

/// Position cache that never holds anything and refuses every write.
pub(crate) struct UnwritablePositionCache;

impl PositionCache for UnwritablePositionCache {
    fn load(&self) -> Result<Option<Position>, StoreError> {
        Ok(None)
    }

    fn save(&self, _position: &Position) -> Result<(), StoreError> {
        Err(StoreError::Poisoned)
    }
}
