//! Lookup Service
//!
//! TigerStyle: Validate a position and return its digit with context.
//!
//! Positions are 1-indexed. The configured maximum is checked before the
//! digit source is touched, so an oversized request never causes a fetch.

use crate::source::{DigitSource, DigitString, SourceError};
use crate::{CONTEXT_DIGITS_AFTER, CONTEXT_DIGITS_BEFORE, TRUNCATION_MARKER};
use serde::Serialize;
use std::num::IntErrorKind;
use std::sync::Arc;

// =============================================================================
// Types
// =============================================================================

/// Surrounding digits of a queried position, clipped to the string
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextWindow {
    /// 0-based start index (inclusive)
    pub start: usize,
    /// 0-based end index (exclusive)
    pub end: usize,
    /// Digits in `[start, end)`
    pub digits: String,
    /// Offset of the queried digit within `digits`
    pub highlight: usize,
    /// Digits exist before `start`
    pub truncated_left: bool,
    /// Digits exist after `end`
    pub truncated_right: bool,
}

impl ContextWindow {
    fn around(digits: &DigitString, position: usize) -> Self {
        let index = position - 1;
        let start = index.saturating_sub(CONTEXT_DIGITS_BEFORE);
        let end = (position + CONTEXT_DIGITS_AFTER).min(digits.len());

        Self {
            start,
            end,
            digits: digits.slice(start, end).to_string(),
            highlight: index - start,
            truncated_left: start > 0,
            truncated_right: end < digits.len(),
        }
    }

    /// Render as text, e.g. `...718[2]818...`
    pub fn render(&self) -> String {
        let (before, rest) = self.digits.split_at(self.highlight);
        let (current, after) = rest.split_at(rest.len().min(1));
        let marker = |on: bool| if on { TRUNCATION_MARKER } else { "" };

        format!(
            "{}{}[{}]{}{}",
            marker(self.truncated_left),
            before,
            current,
            after,
            marker(self.truncated_right)
        )
    }
}

/// A successful lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupResult {
    /// 1-based position that was queried
    pub position: usize,
    /// Digit at that position
    pub digit: char,
    /// Surrounding digits
    pub window: ContextWindow,
}

/// Extract the digit at a 1-based `position` from resolved digits
pub fn locate(digits: &DigitString, position: usize) -> Result<LookupResult, LookupError> {
    if position == 0 {
        return Err(LookupError::InvalidPosition {
            input: position.to_string(),
        });
    }

    let digit = digits
        .digit_at(position - 1)
        .ok_or(LookupError::PositionBeyondAvailableData {
            available: digits.len(),
        })?;

    Ok(LookupResult {
        position,
        digit,
        window: ContextWindow::around(digits, position),
    })
}

/// Parse user input into a position.
///
/// Only whole numbers are accepted. Values too large for `i64` saturate so
/// the range check reports them as too large rather than invalid.
pub fn parse_position(input: &str) -> Result<i64, LookupError> {
    let trimmed = input.trim();
    trimmed.parse::<i64>().or_else(|e| match e.kind() {
        IntErrorKind::PosOverflow => Ok(i64::MAX),
        IntErrorKind::NegOverflow => Ok(i64::MIN),
        _ => Err(LookupError::InvalidPosition {
            input: trimmed.to_string(),
        }),
    })
}

// =============================================================================
// Lookup Service
// =============================================================================

/// Stateless per-call lookups over a shared digit source
#[derive(Debug, Clone)]
pub struct LookupService {
    source: Arc<DigitSource>,
    digits_count_max: usize,
}

impl LookupService {
    /// Create a service accepting positions up to `digits_count_max`
    pub fn new(source: Arc<DigitSource>, digits_count_max: usize) -> Self {
        Self {
            source,
            digits_count_max,
        }
    }

    /// The shared digit source
    pub fn source(&self) -> &Arc<DigitSource> {
        &self.source
    }

    /// Highest position accepted
    pub fn digits_count_max(&self) -> usize {
        self.digits_count_max
    }

    /// Number of digits available, if already resolved
    pub fn available(&self) -> Option<usize> {
        self.source.cached().map(|digits| digits.len())
    }

    /// Look up a raw user-supplied position
    pub async fn lookup_input(&self, input: &str) -> Result<LookupResult, LookupError> {
        self.lookup(parse_position(input)?).await
    }

    /// Look up the digit at a 1-based position
    pub async fn lookup(&self, position: i64) -> Result<LookupResult, LookupError> {
        let position = self.validate(position)?;
        let digits = self.source.resolve().await?;

        let result = locate(&digits, position);
        match &result {
            Ok(found) => tracing::debug!(position, digit = %found.digit, "digit found"),
            Err(err) => tracing::debug!(position, error = %err, "lookup rejected"),
        }
        result
    }

    fn validate(&self, position: i64) -> Result<usize, LookupError> {
        if position < 1 {
            return Err(LookupError::InvalidPosition {
                input: position.to_string(),
            });
        }
        match usize::try_from(position) {
            Ok(position) if position <= self.digits_count_max => Ok(position),
            _ => Err(LookupError::PositionTooLarge {
                max: self.digits_count_max,
            }),
        }
    }
}

/// Format with space-separated thousands, e.g. `1 000 020`
pub fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

// =============================================================================
// Errors
// =============================================================================

/// Lookup errors, each with a display-ready message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("enter a whole number greater than 0 (got {input:?})")]
    InvalidPosition { input: String },

    #[error("maximum position: {}", group_thousands(*.max))]
    PositionTooLarge { max: usize },

    #[error("available: {} digits", group_thousands(*.available))]
    PositionBeyondAvailableData { available: usize },

    #[error("failed to load digits")]
    SourceUnavailable(#[from] SourceError),
}

impl LookupError {
    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPosition { .. } => "invalid_position",
            Self::PositionTooLarge { .. } => "position_too_large",
            Self::PositionBeyondAvailableData { .. } => "position_beyond_available_data",
            Self::SourceUnavailable(_) => "source_unavailable",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
