//! Mapping of failed exchanges to diagnostic categories.
//!
//! Rules are checked in order and the first match wins. They overlap (a 403
//! page can also carry a CSRF marker), so the order is part of the contract.

use reqwest::StatusCode;

use crate::error::{ClassifiedError, ErrorCategory, GatewayError};
use crate::transport::{truncate_chars, HttpOutcome, HttpResponse, TransportFailure};

/// Marker found in HTML pages served by the GitHub web UI rather than the API.
pub const CSRF_MARKER: &str = "CSRF";

const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";
const BODY_EXCERPT: usize = 500;

pub fn classify(prefix: &str, outcome: &HttpOutcome) -> ClassifiedError {
    match outcome {
        Ok(response) => classify_response(prefix, response),
        Err(failure) => classify_transport(prefix, failure),
    }
}

/// Return the response if it is a 2xx, otherwise its classified error.
pub fn ensure_success(prefix: &str, outcome: HttpOutcome) -> Result<HttpResponse, GatewayError> {
    match outcome {
        Ok(response) if response.status.is_success() => Ok(response),
        other => Err(classify(prefix, &other).into()),
    }
}

fn rate_limit_value(response: &HttpResponse, name: &str) -> Option<u64> {
    response.header(name).and_then(|v| v.trim().parse().ok())
}

fn show(value: Option<u64>) -> String {
    value.map_or_else(|| "unknown".to_string(), |v| v.to_string())
}

pub fn classify_response(prefix: &str, response: &HttpResponse) -> ClassifiedError {
    let code = response.status.as_u16();
    let remaining = rate_limit_value(response, RATE_LIMIT_REMAINING);
    let reset = rate_limit_value(response, RATE_LIMIT_RESET);
    let base = format!("{}: {}", prefix, code);

    let (category, message) = match response.status {
        StatusCode::MOVED_PERMANENTLY
        | StatusCode::FOUND
        | StatusCode::TEMPORARY_REDIRECT
        | StatusCode::PERMANENT_REDIRECT => {
            let location = response
                .header("location")
                .map(|l| format!(" (Location: {})", l))
                .unwrap_or_default();
            (
                ErrorCategory::UnexpectedRedirect,
                format!(
                    "{} - Redirect detected{}. The base URL probably points at the web UI, not the API",
                    base, location
                ),
            )
        }
        _ if response.body.contains(CSRF_MARKER) => (
            ErrorCategory::WrongDomain,
            format!("{} - CSRF error. Wrong domain: the base URL is not an API host", base),
        ),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => (
            ErrorCategory::AuthFailure,
            format!(
                "{} - Invalid or expired API key. RL={}, reset={}",
                base,
                show(remaining),
                show(reset)
            ),
        ),
        _ => (
            ErrorCategory::ApiError,
            format!(
                "{} - {} RL={}, reset={}",
                base,
                truncate_chars(&response.body, BODY_EXCERPT),
                show(remaining),
                show(reset)
            ),
        ),
    };

    tracing::warn!(category = %category, status = code, "{}", message);
    ClassifiedError {
        category,
        http_status: Some(code),
        message,
        rate_remaining: remaining,
        rate_reset: reset,
    }
}

pub fn classify_transport(prefix: &str, failure: &TransportFailure) -> ClassifiedError {
    let message = format!("{}: {}", prefix, failure);
    tracing::warn!(category = %ErrorCategory::TransportError, "{}", message);
    ClassifiedError {
        category: ErrorCategory::TransportError,
        http_status: None,
        message,
        rate_remaining: None,
        rate_reset: None,
    }
}
