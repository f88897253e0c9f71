//! Cached `Date` header values.
//!
//! Formatting the date on every response is wasted work when thousands of
//! responses share the same second. [`DateService`] keeps the rendered value
//! of the current second and re-renders it only when the second changes.

use arc_swap::ArcSwap;
use bytes::Bytes;
use http::HeaderValue;
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

static DATE_SERVICE: Lazy<DateService> = Lazy::new(DateService::new);

pub struct DateService {
    current: ArcSwap<Option<(u64, HeaderValue)>>,
}

impl DateService {
    fn new() -> Self {
        Self { current: ArcSwap::from_pointee(None) }
    }

    /// Returns the process wide instance.
    pub fn global() -> &'static DateService {
        &DATE_SERVICE
    }

    /// The `Date` header value for the current second.
    pub fn http_date(&self) -> Option<HeaderValue> {
        let now = SystemTime::now();
        let second = now.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default();

        if let Some((cached_second, value)) = &**self.current.load() {
            if *cached_second == second {
                return Some(value.clone());
            }
        }

        let value = render(now)?;
        self.current.store(Arc::new(Some((second, value.clone()))));
        Some(value)
    }
}

fn render(now: SystemTime) -> Option<HeaderValue> {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);

    match HeaderValue::from_maybe_shared(Bytes::copy_from_slice(&buf[..])) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(cause = %e, "fast date rendering failed, fall back to httpdate");
            HeaderValue::from_str(&httpdate::fmt_http_date(now)).ok()
        }
    }
}
