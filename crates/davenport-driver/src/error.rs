use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// HTTP-status-space codes used to classify client and server failures.
pub mod status {
    /// Resolution result for the absence of an error.
    pub const NO_ERROR: u16 = 0;
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const CONFLICT: u16 = 409;
    /// Synthesized by the client when a cancellation scope fires.
    pub const REQUEST_TIMEOUT: u16 = 408;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
    pub const NOT_IMPLEMENTED: u16 = 501;

    /// Canonical reason phrase for a status code.
    pub fn text(code: u16) -> &'static str {
        match code {
            200 => "OK",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            408 => "Request Timeout",
            409 => "Conflict",
            412 => "Precondition Failed",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            _ => "Unknown",
        }
    }
}

/// A status-coded error.
///
/// Carries an HTTP-status-space classification, an optional human message, an
/// optional wrapped cause, and whether the status was reported by the server
/// or synthesized by the client. Never mutated after construction.
///
/// Rendering has three fidelity levels:
/// * [`Error::message`] — just the innermost message, for terse logs,
/// * `{}` — status text plus the innermost message,
/// * `{:#}` — status text, origin (server vs. client), and the message.
#[derive(Debug, Clone)]
pub struct Error {
    status: u16,
    message: Option<String>,
    from_server: bool,
    source: Option<Arc<dyn StdError + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            from_server: false,
            source: None,
        }
    }

    /// An error whose status was reported by the backend server.
    pub fn from_server(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            from_server: true,
            source: None,
        }
    }

    /// A client-synthesized status wrapping an underlying cause.
    pub fn with_source(status: u16, source: impl StdError + Send + Sync + 'static) -> Self {
        Self {
            status,
            message: None,
            from_server: false,
            source: Some(Arc::new(source)),
        }
    }

    /// A client-synthesized status with both a message and a cause.
    pub fn wrap(
        status: u16,
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            status,
            message: Some(message.into()),
            from_server: false,
            source: Some(Arc::new(source)),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(status::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(status::NOT_FOUND, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(status::NOT_IMPLEMENTED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(status::INTERNAL_SERVER_ERROR, message)
    }

    /// The error recorded when a cancellation scope fires mid-operation.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(status::REQUEST_TIMEOUT, message)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_from_server(&self) -> bool {
        self.from_server
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == status::REQUEST_TIMEOUT && !self.from_server
    }

    /// Short rendering: the innermost message, without status decoration.
    pub fn message(&self) -> String {
        match (&self.message, &self.source) {
            (Some(msg), Some(src)) => format!("{msg}: {src}"),
            (Some(msg), None) => msg.clone(),
            (None, Some(src)) => src.to_string(),
            (None, None) => status::text(self.status).to_string(),
        }
    }

    fn fmt_verbose(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = self
            .message
            .as_deref()
            .unwrap_or_else(|| status::text(self.status));
        let origin = if self.from_server {
            "server responded with"
        } else {
            "client generated"
        };
        write!(
            f,
            "{head}:\n    {origin} {} / {}",
            self.status,
            status::text(self.status)
        )?;
        if let Some(src) = &self.source {
            write!(f, "\n  - {src}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            return self.fmt_verbose(f);
        }
        let head = self
            .message
            .as_deref()
            .unwrap_or_else(|| status::text(self.status));
        match &self.source {
            Some(src) => write!(f, "{head}: {src}"),
            None => f.write_str(head),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|src| src as &(dyn StdError + 'static))
    }
}

/// Resolves the status code carried by an error value, however deeply the
/// status-coded error is buried under generic wrapping layers.
///
/// The chain is walked through [`StdError::source`], so any wrapper that
/// participates in the standard error protocol is transparent. An error with
/// no discoverable status resolves to 500; `None` resolves to
/// [`status::NO_ERROR`].
pub fn status_code(err: Option<&(dyn StdError + 'static)>) -> u16 {
    let mut cursor = match err {
        None => return status::NO_ERROR,
        Some(err) => Some(err),
    };
    while let Some(err) = cursor {
        if let Some(coded) = err.downcast_ref::<Error>() {
            return coded.status();
        }
        cursor = err.source();
    }
    status::INTERNAL_SERVER_ERROR
}
