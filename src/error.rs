//! Error types for lc.
//!
//! Every failure the transport or the conversation store can produce is a
//! variant of [`Error`].  Transport calls never surface these as panics; they
//! are carried inside a [`ChatCompletionResult`](crate::ChatCompletionResult)
//! or returned through [`Result`].

use std::error;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// The main error type for lc.
#[derive(Clone, Debug)]
pub enum Error {
    /// The configured base URL does not have the form `scheme://host[/path]`.
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Human-readable error message.
        message: String,
        /// The underlying parse error, when the URL parser produced one.
        source: Option<url::ParseError>,
    },

    /// The request timed out while connecting or waiting for data.
    Timeout {
        /// Human-readable error message.
        message: String,
        /// Duration of the timeout in seconds.
        duration: Option<f64>,
    },

    /// The connection could not be established.
    Connection {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Any other HTTP client failure (DNS, TLS, request construction).
    HttpClient {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// The response body failed while it was being streamed.
    Streaming {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// The server answered with a status other than 200.
    HttpStatus {
        /// HTTP status code.
        status_code: u16,
        /// Raw response body, often the provider's structured error.
        body: String,
    },

    /// The server answered 308; almost always a missing trailing slash.
    PermanentRedirect {
        /// The normalized base URL the request was built from.
        base_url: String,
        /// The `Location` header, if the server sent one.
        location: Option<String>,
    },

    /// A 200 response whose body does not have the expected shape.
    InvalidResponseFormat {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// A JSON value that is not a `{role, content}` message.
    MalformedMessage {
        /// Human-readable error message.
        message: String,
    },

    /// The persisted conversation file could not be parsed.
    CorruptHistory {
        /// Path of the history file.
        path: PathBuf,
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Error during JSON or YAML serialization.
    Serialization {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// An invalid configuration key or value.
    Config {
        /// Human-readable error message.
        message: String,
        /// The configuration key involved, if any.
        key: Option<String>,
    },

    /// I/O error.
    Io {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Arc<io::Error>,
    },
}

impl Error {
    /// Creates a new invalid URL error.
    pub fn invalid_url(
        url: impl Into<String>,
        message: impl Into<String>,
        source: Option<url::ParseError>,
    ) -> Self {
        Error::InvalidUrl {
            url: url.into(),
            message: message.into(),
            source,
        }
    }

    /// Creates a new timeout error.
    pub fn timeout(message: impl Into<String>, duration: Option<f64>) -> Self {
        Error::Timeout {
            message: message.into(),
            duration,
        }
    }

    /// Creates a new connection error.
    pub fn connection(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Connection {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new HTTP client error.
    pub fn http_client(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::HttpClient {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new streaming error.
    pub fn streaming(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Streaming {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new HTTP status error.
    pub fn http_status(status_code: u16, body: impl Into<String>) -> Self {
        Error::HttpStatus {
            status_code,
            body: body.into(),
        }
    }

    /// Creates a new permanent redirect error.
    pub fn permanent_redirect(base_url: impl Into<String>, location: Option<String>) -> Self {
        Error::PermanentRedirect {
            base_url: base_url.into(),
            location,
        }
    }

    /// Creates a new invalid response format error.
    pub fn invalid_response_format(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::InvalidResponseFormat {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new malformed message error.
    pub fn malformed_message(message: impl Into<String>) -> Self {
        Error::MalformedMessage {
            message: message.into(),
        }
    }

    /// Creates a new corrupt history error.
    pub fn corrupt_history(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::CorruptHistory {
            path: path.into(),
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new serialization error.
    pub fn serialization(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Serialization {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new configuration error.
    pub fn config(message: impl Into<String>, key: Option<String>) -> Self {
        Error::Config {
            message: message.into(),
            key,
        }
    }

    /// Creates a new I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Returns true if this error is an invalid base URL.
    pub fn is_invalid_url(&self) -> bool {
        matches!(self, Error::InvalidUrl { .. })
    }

    /// Returns true if the request never produced a usable HTTP exchange.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. }
                | Error::Connection { .. }
                | Error::HttpClient { .. }
                | Error::Streaming { .. }
        )
    }

    /// Returns true if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Returns true if the server answered with an unexpected status.
    pub fn is_http_status(&self) -> bool {
        matches!(
            self,
            Error::HttpStatus { .. } | Error::PermanentRedirect { .. }
        )
    }

    /// Returns true if this error is a permanent redirect.
    pub fn is_permanent_redirect(&self) -> bool {
        matches!(self, Error::PermanentRedirect { .. })
    }

    /// Returns true if a 200 response had an unexpected shape.
    pub fn is_invalid_response_format(&self) -> bool {
        matches!(self, Error::InvalidResponseFormat { .. })
    }

    /// Returns true if this error is a malformed message.
    pub fn is_malformed_message(&self) -> bool {
        matches!(self, Error::MalformedMessage { .. })
    }

    /// Returns true if the history file could not be parsed.
    pub fn is_corrupt_history(&self) -> bool {
        matches!(self, Error::CorruptHistory { .. })
    }

    /// Returns true if this error is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config { .. })
    }

    /// Returns the status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status_code, .. } => Some(*status_code),
            Error::PermanentRedirect { .. } => Some(308),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidUrl { url, message, .. } => {
                write!(f, "Invalid base URL: {url} ({message})")
            }
            Error::Timeout { message, duration } => {
                if let Some(duration) = duration {
                    write!(f, "HTTP request timed out: {message} ({duration} seconds)")
                } else {
                    write!(f, "HTTP request timed out: {message}")
                }
            }
            Error::Connection { message, .. } => {
                write!(f, "HTTP request failed: connection error: {message}")
            }
            Error::HttpClient { message, .. } => {
                write!(f, "HTTP request failed: {message}")
            }
            Error::Streaming { message, .. } => {
                write!(f, "Streaming error: {message}")
            }
            Error::HttpStatus { status_code, body } => {
                write!(f, "API request failed with status {status_code}: {body}")
            }
            Error::PermanentRedirect { base_url, location } => {
                write!(
                    f,
                    "API request failed with status 308 (Permanent Redirect). \
                     Please check your openai_base_url setting. \
                     Try adding a trailing slash: {base_url}"
                )?;
                if let Some(location) = location {
                    write!(f, " (server redirected to {location})")?;
                }
                Ok(())
            }
            Error::InvalidResponseFormat { message, .. } => {
                write!(f, "Invalid API response format: {message}")
            }
            Error::MalformedMessage { message } => {
                write!(f, "Malformed message: {message}")
            }
            Error::CorruptHistory { path, message, .. } => {
                write!(
                    f,
                    "Corrupt conversation history at {}: {message}",
                    path.display()
                )
            }
            Error::Serialization { message, .. } => {
                write!(f, "Serialization error: {message}")
            }
            Error::Config { message, key } => {
                if let Some(key) = key {
                    write!(f, "Configuration error: {message} (key: {key})")
                } else {
                    write!(f, "Configuration error: {message}")
                }
            }
            Error::Io { message, .. } => {
                write!(f, "I/O error: {message}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::InvalidUrl { source, .. } => {
                source.as_ref().map(|e| e as &(dyn error::Error + 'static))
            }
            Error::Connection { source, .. }
            | Error::HttpClient { source, .. }
            | Error::Streaming { source, .. }
            | Error::InvalidResponseFormat { source, .. }
            | Error::CorruptHistory { source, .. }
            | Error::Serialization { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {err}"), Some(Box::new(err)))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::serialization(format!("YAML error: {err}"), Some(Box::new(err)))
    }
}

/// A specialized Result type for lc operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_carries_code_and_body() {
        let err = Error::http_status(401, r#"{"error":"bad key"}"#);
        let text = err.to_string();
        assert!(text.contains("401"));
        assert!(text.contains("bad key"));
        assert_eq!(err.status_code(), Some(401));
        assert!(err.is_http_status());
        assert!(!err.is_transport());
    }

    #[test]
    fn permanent_redirect_names_the_setting() {
        let err = Error::permanent_redirect("https://proxy.example.com/v1/", None);
        let text = err.to_string();
        assert!(text.contains("308"));
        assert!(text.contains("openai_base_url"));
        assert!(text.contains("trailing slash"));
        assert!(text.contains("https://proxy.example.com/v1/"));
        assert!(err.is_permanent_redirect());
        assert_eq!(err.status_code(), Some(308));
    }

    #[test]
    fn transport_classification() {
        assert!(Error::timeout("read", Some(120.0)).is_transport());
        assert!(Error::connection("refused", None).is_transport());
        assert!(Error::http_client("dns", None).is_transport());
        assert!(Error::streaming("reset", None).is_transport());
        assert!(!Error::malformed_message("role").is_transport());
    }

    #[test]
    fn io_error_converts_with_source() {
        let err: Error = io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert!(matches!(err, Error::Io { .. }));
        assert!(error::Error::source(&err).is_some());
    }
}
