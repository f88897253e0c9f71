//! Request filters that pick among handlers registered on the same route.
//!
//! Filters can match on the HTTP method, on header values or on any closure,
//! and they compose with AND/OR logic.
//!
//! # Examples
//!
//! ```
//! use edge_web::router::filter::{all_filter, get_method, header};
//! use http::HeaderValue;
//! use http::header::ACCEPT;
//!
//! let mut combined = all_filter();
//! combined.and(get_method()).and(header(ACCEPT, HeaderValue::from_static("application/json")));
//! ```

use crate::request::EdgeRequest;
use http::{HeaderName, HeaderValue, Method};

/// Core trait for request filtering.
pub trait Filter: Send + Sync {
    /// Returns `true` if the request should reach the handler.
    fn matches(&self, req: &EdgeRequest) -> bool;
}

struct FnFilter<F: Fn(&EdgeRequest) -> bool>(F);

impl<F: Fn(&EdgeRequest) -> bool + Send + Sync> Filter for FnFilter<F> {
    fn matches(&self, req: &EdgeRequest) -> bool {
        (self.0)(req)
    }
}

/// Creates a new filter from a closure.
///
/// ```
/// use edge_web::router::filter::fn_filter;
///
/// let api_only = fn_filter(|req| req.uri().path().starts_with("/api"));
/// ```
pub fn fn_filter<F>(f: F) -> impl Filter
where
    F: Fn(&EdgeRequest) -> bool + Send + Sync,
{
    FnFilter(f)
}

/// Creates a new OR-composed filter chain.
pub fn any_filter() -> AnyFilter {
    AnyFilter::new()
}

/// Compose filters with OR logic.
///
/// An empty chain matches every request.
pub struct AnyFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl AnyFilter {
    fn new() -> Self {
        Self { filters: vec![] }
    }

    pub fn or<F: Filter + 'static>(&mut self, filter: F) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl Filter for AnyFilter {
    fn matches(&self, req: &EdgeRequest) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|filter| filter.matches(req))
    }
}

/// Creates a new AND-composed filter chain.
pub fn all_filter() -> AllFilter {
    AllFilter::new()
}

/// Compose filters with AND logic.
///
/// An empty chain matches every request.
pub struct AllFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl AllFilter {
    fn new() -> Self {
        Self { filters: vec![] }
    }

    pub fn and<F: Filter + 'static>(&mut self, filter: F) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl Filter for AllFilter {
    fn matches(&self, req: &EdgeRequest) -> bool {
        self.filters.iter().all(|filter| filter.matches(req))
    }
}

/// A filter that matches HTTP methods.
pub struct MethodFilter(Method);

impl Filter for MethodFilter {
    fn matches(&self, req: &EdgeRequest) -> bool {
        self.0.eq(req.method())
    }
}

macro_rules! method_filter {
    ($method:ident, $upper_case_method:ident) => {
        #[doc = concat!("Creates a filter that matches HTTP ", stringify!($upper_case_method), " requests.")]
        #[inline]
        pub fn $method() -> MethodFilter {
            MethodFilter(Method::$upper_case_method)
        }
    };
}

method_filter!(get_method, GET);
method_filter!(post_method, POST);
method_filter!(put_method, PUT);
method_filter!(delete_method, DELETE);
method_filter!(head_method, HEAD);
method_filter!(options_method, OPTIONS);
method_filter!(patch_method, PATCH);

/// Creates a filter that matches a specific header name and value.
#[inline]
pub fn header(name: HeaderName, value: HeaderValue) -> HeaderFilter {
    HeaderFilter(name, value)
}

/// A filter that matches HTTP headers.
pub struct HeaderFilter(HeaderName, HeaderValue);

impl Filter for HeaderFilter {
    fn matches(&self, req: &EdgeRequest) -> bool {
        req.headers().get(&self.0).is_some_and(|value| self.1.eq(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request;
    use http::header::CONTENT_TYPE;

    fn request(method: Method, content_type: Option<&str>) -> EdgeRequest {
        let mut builder = Request::builder().method(method).uri("/api/items");
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        builder.body(Bytes::new()).unwrap().into()
    }

    #[test]
    fn test_method_filter() {
        assert!(get_method().matches(&request(Method::GET, None)));
        assert!(!get_method().matches(&request(Method::POST, None)));
    }

    #[test]
    fn test_header_filter() {
        let filter = header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(filter.matches(&request(Method::POST, Some("text/plain"))));
        assert!(!filter.matches(&request(Method::POST, Some("application/json"))));
        assert!(!filter.matches(&request(Method::POST, None)));
    }

    #[test]
    fn test_composition() {
        let mut all = all_filter();
        all.and(post_method()).and(fn_filter(|req| req.uri().path().starts_with("/api")));
        assert!(all.matches(&request(Method::POST, None)));
        assert!(!all.matches(&request(Method::GET, None)));

        let mut any = any_filter();
        any.or(get_method()).or(head_method());
        assert!(any.matches(&request(Method::HEAD, None)));
        assert!(!any.matches(&request(Method::PUT, None)));

        assert!(all_filter().matches(&request(Method::DELETE, None)));
        assert!(any_filter().matches(&request(Method::DELETE, None)));
    }
}
