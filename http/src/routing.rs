//! Routes of requests and their rate-limit buckets.

use hyper::Method;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Route of a single request.
///
/// A route pairs a concrete URI path with the *bucket* the request is
/// rate limited under: the method plus the path template with IDs masked
/// out. Two requests whose paths only differ in IDs share a bucket.
///
/// The endpoint catalog providing the templates lives outside this crate;
/// routes are constructed from both forms directly.
///
/// # Examples
///
/// ```
/// use concord_http::Route;
/// use hyper::Method;
///
/// let a = Route::new(Method::GET, "users/111/messages", "users/{user_id}/messages");
/// let b = Route::new(Method::GET, "users/222/messages", "users/{user_id}/messages");
///
/// assert_eq!(a.bucket(), b.bucket());
/// assert_ne!(a.path(), b.path());
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Route {
    bucket: Box<str>,
    method: Method,
    path: String,
}

impl Route {
    /// Create a route from a method, a concrete path, and the path template
    /// the endpoint is rate limited under.
    pub fn new(method: Method, path: impl Into<String>, template: impl AsRef<str>) -> Self {
        let bucket = format!("{} {}", method, template.as_ref()).into_boxed_str();

        Self {
            bucket,
            method,
            path: path.into(),
        }
    }

    /// The rate-limit bucket key: method plus masked path template.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// HTTP method of the route.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Concrete URI path of the route, relative to the API root.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Display for Route {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.method, f)?;
        f.write_str(" ")?;

        f.write_str(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::Route;
    use hyper::Method;
    use static_assertions::assert_impl_all;
    use std::fmt::{Debug, Display};

    assert_impl_all!(Route: Clone, Debug, Display, Eq, PartialEq, Send, Sync);

    #[test]
    fn bucket_masks_ids() {
        let route = Route::new(Method::GET, "users/111/messages", "users/{user_id}/messages");

        assert_eq!("GET users/{user_id}/messages", route.bucket());
    }

    #[test]
    fn bucket_distinguishes_methods() {
        let get = Route::new(Method::GET, "channels/1", "channels/{channel_id}");
        let delete = Route::new(Method::DELETE, "channels/1", "channels/{channel_id}");

        assert_ne!(get.bucket(), delete.bucket());
    }

    #[test]
    fn display() {
        let route = Route::new(Method::POST, "channels/3/messages", "channels/{channel_id}/messages");

        assert_eq!("POST channels/3/messages", route.to_string());
    }
}
