//! Classification of vendor HTTP outcomes

use serde_json::Value;
use thiserror::Error;

/// Statuses the orchestrators may reclassify as limiter signals
pub const LIMITER_STATUSES: [u16; 4] = [429, 500, 502, 504];

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    /// DNS, TLS or socket failure before a response was read
    #[error("HTTP Request Error: {message}")]
    Network {
        message: String,
        connection_reset: bool,
    },

    #[error("PassiveTotal rejected the configured username or API key (HTTP 401)")]
    Unauthorized,

    #[error("PassiveTotal quota exceeded (HTTP 402): {message}")]
    QuotaExceeded { message: String },

    /// Rate limit (429) or gateway failure (500, 502, 504)
    #[error("PassiveTotal is throttling requests (HTTP {status})")]
    Throttled { status: u16, body: Option<Value> },

    #[error("Unexpected HTTP status {status}: {message}")]
    UnexpectedStatus {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    #[error("Failed to parse PassiveTotal response: {message}")]
    Decode { message: String },
}

impl GatewayError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            GatewayError::Unauthorized => Some(401),
            GatewayError::QuotaExceeded { .. } => Some(402),
            GatewayError::Throttled { status, .. } | GatewayError::UnexpectedStatus { status, .. } => {
                Some(*status)
            }
            GatewayError::Network { .. } | GatewayError::Decode { .. } => None,
        }
    }

    /// Short category shown to operators
    pub fn detail(&self) -> &'static str {
        match self {
            GatewayError::Network { .. } => "HTTP Request Error",
            GatewayError::Unauthorized => "Invalid PassiveTotal credentials",
            GatewayError::QuotaExceeded { .. } => "PassiveTotal quota exceeded",
            GatewayError::Throttled { .. } => "PassiveTotal search limit reached",
            GatewayError::UnexpectedStatus { .. } => "Unexpected HTTP status code",
            GatewayError::Decode { .. } => "Invalid PassiveTotal response",
        }
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            GatewayError::Throttled { body, .. } | GatewayError::UnexpectedStatus { body, .. } => {
                body.as_ref()
            }
            _ => None,
        }
    }
}

/// Classify a completed HTTP exchange.
///
/// `Ok(None)` is the "no result" path (404, or 200 with nothing in it).
pub fn classify_response(status: u16, body: &str) -> Result<Option<Value>, GatewayError> {
    match status {
        200 => parse_success_body(body),
        404 => Ok(None),
        401 => Err(GatewayError::Unauthorized),
        402 => Err(GatewayError::QuotaExceeded {
            message: vendor_message(status, body),
        }),
        status if LIMITER_STATUSES.contains(&status) => Err(GatewayError::Throttled {
            status,
            body: parse_json(body),
        }),
        status => Err(GatewayError::UnexpectedStatus {
            status,
            message: vendor_message(status, body),
            body: parse_json(body),
        }),
    }
}

fn parse_success_body(body: &str) -> Result<Option<Value>, GatewayError> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(body).map_err(|e| GatewayError::Decode {
        message: e.to_string(),
    })?;

    let empty_results = value
        .get("results")
        .and_then(Value::as_array)
        .is_some_and(|results| results.is_empty());

    if value.is_null() || empty_results {
        return Ok(None);
    }

    Ok(Some(value))
}

fn parse_json(body: &str) -> Option<Value> {
    serde_json::from_str(body).ok().filter(|v: &Value| !v.is_null())
}

/// Pull the vendor's own message out of an error body
fn vendor_message(status: u16, body: &str) -> String {
    let parsed = parse_json(body);
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    match (field("error"), field("message")) {
        (Some(error), Some(message)) => format!("{}: {}", error, message),
        (None, Some(message)) | (Some(message), None) => message,
        (None, None) if !body.trim().is_empty() => body.trim().to_string(),
        (None, None) => format!("HTTP {}", status),
    }
}
