//! E-Digit Finder
//!
//! TigerStyle: Look up the digit of e at a requested position.
//!
//! The digit string is large, so it is loaded lazily and cached for the
//! lifetime of the process. Concurrent callers that arrive before the first
//! successful load share one in-flight fetch.
//!
//! ```text
//! ┌──────────────┐   resolve()   ┌─────────────┐   fetch()   ┌─────────────┐
//! │ LookupService│ ────────────▶ │ DigitSource │ ──────────▶ │ DigitFetcher│
//! └──────────────┘               └─────────────┘             └─────────────┘
//!        │                        cache + single-flight        http / file
//!        ▼                        embedded fallback
//!   LookupResult (digit + context window)
//! ```

pub mod config;
pub mod fetch;
pub mod http;
pub mod lookup;
pub mod source;

pub use config::{Config, ConfigError, ResourceLocation};
pub use fetch::{fetcher_for, DigitFetcher, FetchError, FileFetcher, HttpFetcher};
pub use lookup::{ContextWindow, LookupError, LookupResult, LookupService};
pub use source::{DigitSource, DigitString, InvalidDigit, SourceError};

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Maximum position a caller may ask for
pub const DIGITS_COUNT_MAX: usize = 1_000_020;

/// Default location of the digit resource
pub const DIGITS_RESOURCE_DEFAULT: &str = "e-digits.txt";

/// Digits shown before the queried position in the context window
pub const CONTEXT_DIGITS_BEFORE: usize = 5;

/// Digits shown after the queried position in the context window
pub const CONTEXT_DIGITS_AFTER: usize = 5;

/// Marker rendered where the context window is clipped
pub const TRUNCATION_MARKER: &str = "...";

/// Delay before the server preloads digits in the background
pub const PRELOAD_DELAY_MS_DEFAULT: u64 = 1_000;

/// Default HTTP bind address
pub const HTTP_BIND_ADDRESS_DEFAULT: &str = "127.0.0.1:8285";

/// Application name
pub const APP_NAME: &str = "edigits";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
