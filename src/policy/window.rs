//! Validation window resolution and expiry checks.

use crate::policy::{OriginPolicy, ValidationWindow, ANY_REFERRER};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// Resolve the validation window for `origin` + `referrer`.
///
/// Precedence, first match wins: exact referrer key, `origin + "/*"`, the
/// global `*` key. `None` means the tenant has no payment-proof window
/// configured at all, which callers must treat as a configuration gap
/// distinct from an expired window.
#[must_use]
pub fn resolve_window(
    policy: &OriginPolicy,
    origin: &str,
    referrer: &str,
) -> Option<ValidationWindow> {
    let windows = &policy.validation_windows;
    if windows.is_empty() {
        return None;
    }

    let origin_wildcard = format!("{origin}/*");
    windows
        .get(referrer)
        .or_else(|| windows.get(&origin_wildcard))
        .or_else(|| windows.get(ANY_REFERRER))
        .copied()
}

/// Whether a payload resolved at `resolved_at` is still within `window`.
///
/// A missing or unparseable resolution instant counts as already expired.
#[must_use]
pub fn is_within_window(resolved_at: Option<DateTime<Utc>>, window: ValidationWindow) -> bool {
    if window == ValidationWindow::Never {
        return true;
    }

    let Some(resolved_at) = resolved_at else {
        debug!("Missing resolution instant, treating proof as expired");
        return false;
    };

    match window {
        ValidationWindow::Never => true,
        ValidationWindow::Millis(ms) => {
            // Windows beyond the representable time range cannot expire.
            let Ok(ms) = i64::try_from(ms) else {
                return true;
            };
            resolved_at
                .checked_add_signed(Duration::milliseconds(ms))
                .map_or(true, |deadline| Utc::now() <= deadline)
        }
    }
}
