//! Cached `Date` header value.
//!
//! Formatting an HTTP date on every response is wasteful, the value only
//! changes once per second. The current value is kept in an [`ArcSwap`] and
//! regenerated by whichever response first notices the second has rolled over.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use bytes::Bytes;
use http::HeaderValue;
use once_cell::sync::Lazy;

struct CachedDate {
    second: u64,
    value: Option<HeaderValue>,
}

static CURRENT: Lazy<ArcSwap<CachedDate>> = Lazy::new(|| ArcSwap::from_pointee(render(now_second())));

fn now_second() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_secs())
}

fn render(second: u64) -> CachedDate {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    let value = HeaderValue::from_maybe_shared(Bytes::from_owner(buf)).ok();
    CachedDate { second, value }
}

/// Current HTTP date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date() -> Option<HeaderValue> {
    let second = now_second();
    let cached = CURRENT.load();
    if cached.second == second {
        return cached.value.clone();
    }

    let fresh = Arc::new(render(second));
    CURRENT.store(Arc::clone(&fresh));
    fresh.value.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_looks_like_an_imf_fixdate() {
        let date = http_date().unwrap();
        let text = date.to_str().unwrap();
        assert!(text.ends_with("GMT"), "{text}");
        assert_eq!(text.len(), 29);
    }
}
