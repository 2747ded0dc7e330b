//! Utility functions for amounts, text truncation and Telegram retries.

// lazy_regex! uses once_cell internally
#![allow(clippy::non_std_lazy_statics)]

use crate::config::SUN_PER_TRX;
use anyhow::Result;
use lazy_regex::lazy_regex;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

/// Decimal TRX amount with at most six fractional digits
static RE_TRX_AMOUNT: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"^(\d{1,12})(?:\.(\d{1,6}))?$");

/// Parse a user-entered TRX amount into sun.
///
/// Accepts plain decimals only: no sign, no exponent, at most six
/// fractional digits. Zero parses; callers decide whether it is allowed.
///
/// # Examples
///
/// ```
/// use tron_wallet_bot::utils::parse_trx_amount;
/// assert_eq!(parse_trx_amount("8.000001"), Some(8_000_001));
/// assert_eq!(parse_trx_amount("8.0000001"), None);
/// assert_eq!(parse_trx_amount("-1"), None);
/// ```
#[must_use]
pub fn parse_trx_amount(input: &str) -> Option<u64> {
    let caps = RE_TRX_AMOUNT.captures(input.trim())?;
    let whole: u64 = caps.get(1)?.as_str().parse().ok()?;
    let fraction = caps.get(2).map_or("", |m| m.as_str());

    let mut fraction_sun: u64 = 0;
    for (i, digit) in fraction.bytes().enumerate() {
        let place = 10u64.pow(5 - u32::try_from(i).ok()?);
        fraction_sun += u64::from(digit - b'0') * place;
    }

    whole.checked_mul(SUN_PER_TRX)?.checked_add(fraction_sun)
}

/// Format sun as a TRX decimal without trailing zeros
///
/// # Examples
///
/// ```
/// use tron_wallet_bot::utils::format_trx;
/// assert_eq!(format_trx(8_000_000), "8");
/// assert_eq!(format_trx(8_500_010), "8.50001");
/// ```
#[must_use]
pub fn format_trx(sun: u64) -> String {
    let whole = sun / SUN_PER_TRX;
    let fraction = sun % SUN_PER_TRX;
    if fraction == 0 {
        return whole.to_string();
    }
    let fraction = format!("{fraction:06}");
    format!("{whole}.{}", fraction.trim_end_matches('0'))
}

/// Truncate a string to at most `max_chars` characters
///
/// # Examples
///
/// ```
/// use tron_wallet_bot::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Number of user-perceived characters in `s`
#[must_use]
pub fn grapheme_len(s: &str) -> usize {
    s.graphemes(true).count()
}

/// Truncate to at most `max` user-perceived characters, never splitting a
/// grapheme cluster
#[must_use]
pub fn truncate_graphemes(s: &str, max: usize) -> &str {
    match s.grapheme_indices(true).nth(max) {
        Some((pos, _)) => &s[..pos],
        None => s,
    }
}

/// Retry a Telegram API operation with exponential backoff.
///
/// Used for message delivery only; flow steps are never retried.
///
/// # Errors
///
/// Returns the last error once all attempts are exhausted.
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    use crate::config::{
        TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} attempts: {}",
            TELEGRAM_API_MAX_RETRIES, e
        );
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_parse_trx_amount_boundaries() {
        assert_eq!(parse_trx_amount("8"), Some(8_000_000));
        assert_eq!(parse_trx_amount(" 8.000000 "), Some(8_000_000));
        assert_eq!(parse_trx_amount("0.000001"), Some(1));
        assert_eq!(parse_trx_amount("0"), Some(0));
        assert_eq!(parse_trx_amount("1.5"), Some(1_500_000));
    }

    #[test]
    fn test_parse_trx_amount_rejects_garbage() {
        for input in ["", ".5", "5.", "1e6", "+1", "-0.5", "1,5", "1.2.3", "abc", "0x10"] {
            assert_eq!(parse_trx_amount(input), None, "{input:?}");
        }
    }

    #[test]
    fn test_format_trx() {
        assert_eq!(format_trx(0), "0");
        assert_eq!(format_trx(1), "0.000001");
        assert_eq!(format_trx(10_000_000), "10");
    }

    #[test]
    fn test_truncate_str_unicode() {
        let s = "Привет, мир!";
        assert_eq!(truncate_str(s, 6), "Привет");
        assert_eq!(truncate_str(s, 50), "Привет, мир!");
    }

    #[test]
    fn test_truncate_graphemes_keeps_clusters() {
        let family = "👨‍👩‍👧";
        let s = format!("ab{family}cd");
        assert_eq!(grapheme_len(&s), 5);
        assert_eq!(truncate_graphemes(&s, 3), format!("ab{family}"));
        assert_eq!(truncate_graphemes("abc", 10), "abc");
    }

    #[tokio::test]
    async fn test_retry_telegram_operation_recovers() -> Result<()> {
        let attempts = AtomicUsize::new(0);
        let value = retry_telegram_operation(|| async {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("transient");
            }
            Ok(42)
        })
        .await?;

        assert_eq!(value, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        Ok(())
    }
}
