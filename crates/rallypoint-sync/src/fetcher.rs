//! Concurrent fetch of all map feeds with per-feed failure isolation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rallypoint_core::{AssemblyArea, Credential, RawEventRecord, UserAddress};
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{BackendError, Feed, MapBackend};

/// A feed that failed this cycle. The other feeds are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("{feed} unavailable: {reason}")]
    SourceUnavailable { feed: Feed, reason: String },
}

impl FetchError {
    pub fn feed(&self) -> Feed {
        match self {
            Self::SourceUnavailable { feed, .. } => *feed,
        }
    }
}

/// The backend rejected the credential. Must be handled like a missing
/// credential: redirect to login, never retry silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("session expired: {feed} answered HTTP {status}")]
pub struct SessionExpired {
    pub feed: Feed,
    pub status: u16,
}

/// Everything one fetch produced, including what failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    pub help: Vec<RawEventRecord>,
    pub safe: Vec<RawEventRecord>,
    pub areas: Vec<AssemblyArea>,
    pub address: Option<UserAddress>,
    pub errors: Vec<FetchError>,
}

impl FetchOutcome {
    /// True when no network feed produced data this cycle.
    pub fn all_feeds_failed(&self) -> bool {
        Feed::ALL
            .iter()
            .all(|feed| self.errors.iter().any(|e| e.feed() == *feed))
    }
}

pub struct EventFetcher {
    backend: Arc<dyn MapBackend>,
    areas: Vec<AssemblyArea>,
    request_timeout: Duration,
}

impl EventFetcher {
    /// `areas` is the static assembly-area list served with every fetch.
    pub fn new(
        backend: Arc<dyn MapBackend>,
        areas: Vec<AssemblyArea>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            areas,
            request_timeout,
        }
    }

    /// Fetch help calls, safe statuses and the user address concurrently.
    ///
    /// Failures are collected per feed. A 401/403 from any feed wins over
    /// everything else and is returned as [`SessionExpired`].
    pub async fn fetch_all(&self, credential: &Credential) -> Result<FetchOutcome, SessionExpired> {
        let (help, safe, address) = futures::join!(
            self.bounded(Feed::HelpCalls, self.backend.help_calls(credential)),
            self.bounded(Feed::SafeStatus, self.backend.safe_statuses(credential)),
            self.bounded(Feed::Address, self.backend.user_address(credential)),
        );

        let mut outcome = FetchOutcome {
            areas: self.areas.clone(),
            ..Default::default()
        };
        let mut expired = None;

        match help {
            Ok(records) => outcome.help = records,
            Err(err) => collect(err, &mut outcome.errors, &mut expired),
        }
        match safe {
            Ok(records) => outcome.safe = records,
            Err(err) => collect(err, &mut outcome.errors, &mut expired),
        }
        match address {
            Ok(address) => outcome.address = address,
            Err(err) => collect(err, &mut outcome.errors, &mut expired),
        }

        if let Some(expired) = expired {
            warn!(feed = %expired.feed, status = expired.status, "session expired");
            return Err(expired);
        }

        info!(
            help = outcome.help.len(),
            safe = outcome.safe.len(),
            address = outcome.address.is_some(),
            failed = outcome.errors.len(),
            "fetched map feeds"
        );
        Ok(outcome)
    }

    async fn bounded<T>(
        &self,
        feed: Feed,
        request: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                feed,
                after: self.request_timeout,
            }),
        }
    }
}

fn collect(err: BackendError, errors: &mut Vec<FetchError>, expired: &mut Option<SessionExpired>) {
    match err {
        BackendError::Unauthorized { feed, status } => {
            // Keep the first one; any of them ends the session.
            expired.get_or_insert(SessionExpired { feed, status });
        }
        other => {
            warn!(feed = %other.feed(), error = %other, "feed unavailable");
            errors.push(FetchError::SourceUnavailable {
                feed: other.feed(),
                reason: other.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, Reply};

    fn credential() -> Credential {
        Credential::new("tok").unwrap()
    }

    fn fetcher(backend: Arc<FakeBackend>) -> EventFetcher {
        EventFetcher::new(
            backend,
            vec![AssemblyArea::new("A1", 37.002, 35.322)],
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn all_feeds_succeed() {
        let backend = Arc::new(FakeBackend::healthy());
        let outcome = fetcher(backend.clone()).fetch_all(&credential()).await.unwrap();
        assert_eq!(outcome.help.len(), 2);
        assert_eq!(outcome.safe.len(), 1);
        assert_eq!(outcome.areas.len(), 1);
        assert!(outcome.address.is_some());
        assert!(outcome.errors.is_empty());
        assert_eq!(backend.calls(), 3);
        assert_eq!(backend.seen_tokens(), vec!["tok", "tok", "tok"]);
    }

    #[tokio::test]
    async fn help_500_degrades_to_partial_data() {
        let backend = Arc::new(FakeBackend::healthy());
        backend.set_help(Reply::Status(500));

        let outcome = fetcher(backend).fetch_all(&credential()).await.unwrap();
        assert!(outcome.help.is_empty());
        assert_eq!(outcome.safe.len(), 1);
        assert!(outcome.address.is_some());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].feed(), Feed::HelpCalls);
        assert!(!outcome.all_feeds_failed());
    }

    #[tokio::test]
    async fn safe_401_expires_session_regardless_of_others() {
        let backend = Arc::new(FakeBackend::healthy());
        backend.set_safe(Reply::Status(401));
        let err = fetcher(backend.clone()).fetch_all(&credential()).await.unwrap_err();
        assert_eq!(
            err,
            SessionExpired {
                feed: Feed::SafeStatus,
                status: 401
            }
        );

        backend.set_help(Reply::Status(500));
        backend.set_address(Reply::Status(503));
        let err = fetcher(backend).fetch_all(&credential()).await.unwrap_err();
        assert_eq!(err.feed, Feed::SafeStatus);
    }

    #[tokio::test]
    async fn forbidden_also_expires_session() {
        let backend = Arc::new(FakeBackend::healthy());
        backend.set_address(Reply::Status(403));
        let err = fetcher(backend).fetch_all(&credential()).await.unwrap_err();
        assert_eq!(err.status, 403);
    }

    #[tokio::test]
    async fn missing_address_is_not_an_error() {
        let backend = Arc::new(FakeBackend::healthy());
        backend.set_address(Reply::Ok(None));
        let outcome = fetcher(backend).fetch_all(&credential()).await.unwrap();
        assert!(outcome.address.is_none());
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn every_feed_down() {
        let backend = Arc::new(FakeBackend::healthy());
        backend.set_help(Reply::Status(502));
        backend.set_safe(Reply::Status(502));
        backend.set_address(Reply::Status(502));
        let outcome = fetcher(backend).fetch_all(&credential()).await.unwrap();
        assert!(outcome.all_feeds_failed());
        assert_eq!(outcome.areas.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_feed_times_out_alone() {
        let backend = Arc::new(FakeBackend::healthy().with_help_delay(Duration::from_secs(60)));
        let outcome = fetcher(backend).fetch_all(&credential()).await.unwrap();
        assert!(outcome.help.is_empty());
        assert_eq!(outcome.safe.len(), 1);
        assert!(matches!(
            &outcome.errors[..],
            [FetchError::SourceUnavailable { feed: Feed::HelpCalls, reason }] if reason.contains("did not answer")
        ));
    }
}
