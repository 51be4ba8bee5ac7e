//! Digit Source
//!
//! TigerStyle: Resolve the digit string once and cache it for the process.
//!
//! Resolution states:
//! - Unresolved: nothing cached, no fetch running
//! - InFlight: one fetch running; late callers wait on its outcome
//! - Resolved: cached forever, never re-fetched
//!
//! A failed fetch with no embedded fallback is reported to every waiter
//! and leaves the source Unresolved, so the next call tries again.

use crate::config::Config;
use crate::fetch::{fetcher_for, DigitFetcher, FetchError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

// =============================================================================
// Digit String
// =============================================================================

/// Immutable sequence of ASCII decimal digits, cheap to clone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitString(Arc<str>);

impl DigitString {
    /// Strip all whitespace (including a byte-order mark) from `raw` and
    /// check that only digits remain
    pub fn normalize(raw: &str) -> Result<Self, InvalidDigit> {
        let digits: String = raw.chars().filter(|c| !is_blank(*c)).collect();

        if let Some((offset, found)) = digits
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
        {
            return Err(InvalidDigit { offset, found });
        }

        Ok(Self(Arc::from(digits)))
    }

    /// Number of digits
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no digits
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Digit at a 0-based index
    pub fn digit_at(&self, index: usize) -> Option<char> {
        self.0.as_bytes().get(index).map(|b| char::from(*b))
    }

    /// Digits in `[start, end)`, clipped to the string
    pub fn slice(&self, start: usize, end: usize) -> &str {
        let end = end.min(self.len());
        let start = start.min(end);
        &self.0[start..end]
    }

    /// The digits as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Whitespace as text resources see it; U+FEFF is not `char::is_whitespace`
fn is_blank(c: char) -> bool {
    c.is_whitespace() || c == '\u{FEFF}'
}

impl fmt::Display for DigitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Resolution State
// =============================================================================

type InFlightResult = Result<DigitString, SourceError>;

type InFlightSender = Arc<watch::Sender<Option<InFlightResult>>>;

enum ResolutionState {
    Unresolved,
    InFlight(InFlightSender),
    Resolved(DigitString),
}

/// What a caller should do after inspecting the state
enum Claim {
    Ready(DigitString),
    Wait(watch::Receiver<Option<InFlightResult>>),
    Fetch(InFlightSender),
}

// =============================================================================
// Digit Source
// =============================================================================

/// Lazily resolved, process-wide digit cache
pub struct DigitSource {
    fetcher: Arc<dyn DigitFetcher>,
    /// Non-empty embedded digits, if configured
    embedded: Option<DigitString>,
    /// Resolve from `embedded` without touching the fetcher
    prefer_local: bool,
    state: Mutex<ResolutionState>,
    fetches: AtomicU64,
}

impl DigitSource {
    /// Create an unresolved source.
    ///
    /// An empty `embedded` string is treated as absent.
    pub fn new(
        fetcher: Arc<dyn DigitFetcher>,
        embedded: Option<DigitString>,
        prefer_local: bool,
    ) -> Self {
        Self {
            fetcher,
            embedded: embedded.filter(|digits| !digits.is_empty()),
            prefer_local,
            state: Mutex::new(ResolutionState::Unresolved),
            fetches: AtomicU64::new(0),
        }
    }

    /// Create a source from configuration
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Ok(Self::new(
            fetcher_for(config)?,
            config.embedded.clone(),
            config.prefer_local_source,
        ))
    }

    /// Resolve the digit string, fetching it at most once at a time.
    ///
    /// Callers that arrive while a fetch is running wait for it and observe
    /// the same value or the same error.
    pub async fn resolve(&self) -> Result<DigitString, SourceError> {
        loop {
            let rx = match self.claim() {
                Claim::Ready(digits) => return Ok(digits),
                Claim::Fetch(tx) => return self.run_fetch(tx).await,
                Claim::Wait(rx) => rx,
            };

            tracing::debug!("joining in-flight digit resolution");
            match wait_for(rx).await {
                Some(result) => return result,
                // Fetcher was dropped before finishing; claim again.
                None => continue,
            }
        }
    }

    /// The cached digits, without suspending or fetching
    pub fn cached(&self) -> Option<DigitString> {
        match &*self.lock_state() {
            ResolutionState::Resolved(digits) => Some(digits.clone()),
            _ => None,
        }
    }

    /// True once the digits are cached
    pub fn is_resolved(&self) -> bool {
        self.cached().is_some()
    }

    /// True while a fetch is running
    pub fn is_in_flight(&self) -> bool {
        matches!(&*self.lock_state(), ResolutionState::InFlight(_))
    }

    /// How many times the underlying fetcher has been invoked
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    fn lock_state(&self) -> MutexGuard<'_, ResolutionState> {
        // State transitions are single assignments, so a poisoned lock still
        // holds a consistent value.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self) -> Claim {
        let mut state = self.lock_state();

        if let ResolutionState::Resolved(digits) = &*state {
            return Claim::Ready(digits.clone());
        }

        if self.prefer_local {
            if let Some(embedded) = &self.embedded {
                tracing::info!(digits = embedded.len(), "using embedded digits");
                *state = ResolutionState::Resolved(embedded.clone());
                return Claim::Ready(embedded.clone());
            }
        }

        if let ResolutionState::InFlight(tx) = &*state {
            return Claim::Wait(tx.subscribe());
        }

        let (tx, _rx) = watch::channel(None::<InFlightResult>);
        let tx = Arc::new(tx);
        *state = ResolutionState::InFlight(tx.clone());
        Claim::Fetch(tx)
    }

    async fn run_fetch(&self, tx: InFlightSender) -> InFlightResult {
        let guard = InFlightGuard::new(self, tx);
        let attempt = self.fetches.fetch_add(1, Ordering::Relaxed) + 1;

        tracing::info!(
            resource = %self.fetcher.describe(),
            attempt = attempt,
            "resolving digit source"
        );

        let fetched = self.fetcher.fetch().await.and_then(|body| {
            let digits = DigitString::normalize(&body)?;
            if digits.is_empty() {
                return Err(FetchError::Empty);
            }
            Ok(digits)
        });

        let result = match fetched {
            Ok(digits) => {
                tracing::info!(digits = digits.len(), "digit source resolved");
                Ok(digits)
            }
            Err(err) => match &self.embedded {
                Some(embedded) => {
                    tracing::warn!(
                        error = %err,
                        digits = embedded.len(),
                        "fetch failed, falling back to embedded digits"
                    );
                    Ok(embedded.clone())
                }
                None => {
                    tracing::error!(error = %err, "digit source unavailable");
                    Err(SourceError::Unavailable {
                        reason: err.to_string(),
                    })
                }
            },
        };

        guard.finish(&result);
        result
    }
}

impl fmt::Debug for DigitSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigitSource")
            .field("resource", &self.fetcher.describe())
            .field("embedded", &self.embedded.as_ref().map(DigitString::len))
            .field("prefer_local", &self.prefer_local)
            .field("resolved", &self.is_resolved())
            .field("fetches", &self.fetch_count())
            .finish()
    }
}

/// Wait for the in-flight outcome; `None` if the fetcher went away
async fn wait_for(mut rx: watch::Receiver<Option<InFlightResult>>) -> Option<InFlightResult> {
    loop {
        if let Some(result) = rx.borrow_and_update().as_ref() {
            return Some(result.clone());
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone();
        }
    }
}

/// Resets an abandoned in-flight state.
///
/// If the fetching future is dropped mid-fetch the state goes back to
/// Unresolved and the sender is dropped, so waiters wake up and claim again.
struct InFlightGuard<'a> {
    source: &'a DigitSource,
    tx: InFlightSender,
    finished: bool,
}

impl<'a> InFlightGuard<'a> {
    fn new(source: &'a DigitSource, tx: InFlightSender) -> Self {
        Self {
            source,
            tx,
            finished: false,
        }
    }

    fn finish(mut self, result: &InFlightResult) {
        {
            let mut state = self.source.lock_state();
            *state = match result {
                Ok(digits) => ResolutionState::Resolved(digits.clone()),
                Err(_) => ResolutionState::Unresolved,
            };
        }
        // send_replace stores the value even with no receivers.
        self.tx.send_replace(Some(result.clone()));
        self.finished = true;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.source.lock_state();
        let ours = matches!(
            &*state,
            ResolutionState::InFlight(current) if Arc::ptr_eq(current, &self.tx)
        );
        if ours {
            tracing::warn!("digit fetch abandoned before completion");
            *state = ResolutionState::Unresolved;
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Neither the resource nor an embedded fallback produced digits
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("digit source unavailable: {reason}")]
    Unavailable { reason: String },
}

/// A non-digit character survived whitespace normalization
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unexpected {found:?} at offset {offset}")]
pub struct InvalidDigit {
    pub offset: usize,
    pub found: char,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio_test::{assert_pending, assert_ready, task};

    /// Fetcher that blocks until opened and counts calls
    struct GatedFetcher {
        body: Result<String, u16>,
        gate: tokio::sync::Semaphore,
        calls: AtomicU64,
    }

    impl GatedFetcher {
        fn new(body: Result<&str, u16>) -> Arc<Self> {
            Arc::new(Self {
                body: body.map(str::to_string),
                gate: tokio::sync::Semaphore::new(0),
                calls: AtomicU64::new(0),
            })
        }

        fn open(&self) {
            self.gate.add_permits(1);
        }
    }

    #[async_trait]
    impl DigitFetcher for GatedFetcher {
        async fn fetch(&self) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let _permit = self.gate.acquire().await;
            match &self.body {
                Ok(body) => Ok(body.clone()),
                Err(status) => Err(FetchError::Status {
                    url: "test://digits".to_string(),
                    status: *status,
                }),
            }
        }

        fn describe(&self) -> String {
            "test://digits".to_string()
        }
    }

    fn digits(s: &str) -> DigitString {
        DigitString::normalize(s).unwrap()
    }

    #[test]
    fn test_normalize_strips_whitespace() {
        let d = digits("27182\n81828 4\t5\r\n");
        assert_eq!(d.as_str(), "271828182845");
        assert_eq!(d.len(), 12);
    }

    #[test]
    fn test_normalize_strips_byte_order_mark() {
        let d = digits("\u{FEFF}2718281828\n");
        assert_eq!(d.as_str(), "2718281828");
        assert_eq!(d.len(), 10);
    }

    #[test]
    fn test_normalize_rejects_non_digits() {
        let err = DigitString::normalize("2.718").unwrap_err();
        assert_eq!(err, InvalidDigit { offset: 1, found: '.' });
    }

    #[test]
    fn test_digit_at_and_slice() {
        let d = digits("271828");
        assert_eq!(d.digit_at(0), Some('2'));
        assert_eq!(d.digit_at(5), Some('8'));
        assert_eq!(d.digit_at(6), None);
        assert_eq!(d.slice(1, 4), "718");
        assert_eq!(d.slice(4, 100), "28");
    }

    #[test]
    fn test_waiters_share_one_fetch() {
        let fetcher = GatedFetcher::new(Ok("2718 2818"));
        let source = DigitSource::new(fetcher.clone(), None, false);

        let mut first = task::spawn(source.resolve());
        let mut second = task::spawn(source.resolve());
        assert_pending!(first.poll());
        assert_pending!(second.poll());
        assert!(source.is_in_flight());
        assert_eq!(source.fetch_count(), 1);

        fetcher.open();
        assert!(first.is_woken());
        let a = assert_ready!(first.poll()).unwrap();
        assert!(second.is_woken());
        let b = assert_ready!(second.poll()).unwrap();

        assert_eq!(a.as_str(), "27182818");
        assert_eq!(a, b);
        assert_eq!(fetcher.calls.load(Ordering::Relaxed), 1);
        assert!(source.is_resolved());
    }

    #[test]
    fn test_abandoned_fetch_is_reclaimed() {
        let fetcher = GatedFetcher::new(Ok("271828"));
        let source = DigitSource::new(fetcher.clone(), None, false);

        let mut fetching = task::spawn(source.resolve());
        let mut waiting = task::spawn(source.resolve());
        assert_pending!(fetching.poll());
        assert_pending!(waiting.poll());

        drop(fetching);
        assert!(!source.is_in_flight());
        assert!(waiting.is_woken());

        // The waiter claims a fresh fetch rather than hanging.
        assert_pending!(waiting.poll());
        assert_eq!(source.fetch_count(), 2);

        fetcher.open();
        let d = assert_ready!(waiting.poll()).unwrap();
        assert_eq!(d.as_str(), "271828");
    }

    #[tokio::test]
    async fn test_prefer_local_skips_fetch() {
        let fetcher = GatedFetcher::new(Ok("999"));
        let source = DigitSource::new(fetcher.clone(), Some(digits("271828")), true);

        let d = source.resolve().await.unwrap();
        assert_eq!(d.as_str(), "271828");
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_embedded_is_ignored() {
        let fetcher = GatedFetcher::new(Err(404));
        fetcher.open();
        let source = DigitSource::new(fetcher, Some(digits("")), true);

        let err = source.resolve().await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_body_uses_fallback() {
        let fetcher = GatedFetcher::new(Ok(" \n "));
        fetcher.open();
        let source = DigitSource::new(fetcher, Some(digits("271828")), false);

        let d = source.resolve().await.unwrap();
        assert_eq!(d.as_str(), "271828");
    }

    #[tokio::test]
    async fn test_malformed_body_without_fallback_fails() {
        let fetcher = GatedFetcher::new(Ok("<html>not found</html>"));
        fetcher.open();
        let source = DigitSource::new(fetcher, None, false);

        let err = source.resolve().await.unwrap_err();
        assert!(err.to_string().contains("not a digit string"));
        assert!(!source.is_resolved());
    }
}
