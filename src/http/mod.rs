//! HTTP/1.1 protocol types and parsing.
//!
//! This module provides the core HTTP primitives used by the storefront:
//! [`Method`], [`StatusCode`], [`Headers`], [`Request`], and [`Response`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::Request;
pub use response::Response;

/// A numeric status code with no [`StatusCode`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unsupported status code {0}")]
pub struct UnknownStatus(pub u16);

macro_rules! status_codes {
    ($($variant:ident = $code:literal => $reason:literal),* $(,)?) => {
        /// An HTTP response status code.
        ///
        /// Serializes as its numeric code.
        ///
        /// # Examples
        ///
        /// ```
        /// use storefront::http::StatusCode;
        ///
        /// let status = StatusCode::Created;
        /// assert_eq!(status.as_u16(), 201);
        /// assert_eq!(status.canonical_reason(), "Created");
        /// assert!(status.is_success());
        /// assert_eq!(StatusCode::try_from(201), Ok(status));
        /// ```
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(into = "u16", try_from = "u16")]
        #[repr(u16)]
        pub enum StatusCode {
            $($variant = $code,)*
        }

        impl StatusCode {
            /// Returns the canonical reason phrase for this status code.
            pub fn canonical_reason(self) -> &'static str {
                match self {
                    $(Self::$variant => $reason,)*
                }
            }
        }

        impl TryFrom<u16> for StatusCode {
            type Error = UnknownStatus;

            fn try_from(code: u16) -> Result<Self, Self::Error> {
                match code {
                    $($code => Ok(Self::$variant),)*
                    other => Err(UnknownStatus(other)),
                }
            }
        }
    };
}

status_codes! {
    Continue = 100 => "Continue",
    Ok = 200 => "OK",
    Created = 201 => "Created",
    Accepted = 202 => "Accepted",
    NoContent = 204 => "No Content",
    MovedPermanently = 301 => "Moved Permanently",
    Found = 302 => "Found",
    NotModified = 304 => "Not Modified",
    BadRequest = 400 => "Bad Request",
    Unauthorized = 401 => "Unauthorized",
    Forbidden = 403 => "Forbidden",
    NotFound = 404 => "Not Found",
    MethodNotAllowed = 405 => "Method Not Allowed",
    Conflict = 409 => "Conflict",
    PayloadTooLarge = 413 => "Payload Too Large",
    UnprocessableEntity = 422 => "Unprocessable Entity",
    TooManyRequests = 429 => "Too Many Requests",
    InternalServerError = 500 => "Internal Server Error",
    NotImplemented = 501 => "Not Implemented",
    ServiceUnavailable = 503 => "Service Unavailable",
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// `true` for `2xx` codes.
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.as_u16())
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.canonical_reason())
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

/// An HTTP request method. Anything non-standard lands in `Custom`.
///
/// ```
/// use storefront::http::Method;
///
/// let method: Method = "GET".parse().unwrap();
/// assert_eq!(method, Method::Get);
/// assert_eq!(method.to_string(), "GET");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Custom(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Custom(other) => other.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            "OPTIONS" => Self::Options,
            other => Self::Custom(other.to_owned()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_as_number() {
        assert_eq!(serde_json::to_string(&StatusCode::NotFound).unwrap(), "404");
        let status: StatusCode = serde_json::from_str("201").unwrap();
        assert_eq!(status, StatusCode::Created);
        assert!(serde_json::from_str::<StatusCode>("299").is_err());
    }

    #[test]
    fn status_try_from_rejects_unknown_codes() {
        assert_eq!(StatusCode::try_from(503), Ok(StatusCode::ServiceUnavailable));
        assert_eq!(StatusCode::try_from(418), Err(UnknownStatus(418)));
    }

    #[test]
    fn status_display_includes_reason() {
        assert_eq!(StatusCode::NoContent.to_string(), "204 No Content");
        assert!(!StatusCode::NotModified.is_success());
    }

    #[test]
    fn unknown_method_is_kept_verbatim() {
        let method: Method = "PURGE".parse().unwrap();
        assert_eq!(method, Method::Custom("PURGE".into()));
        assert_eq!(method.as_str(), "PURGE");
    }
}
