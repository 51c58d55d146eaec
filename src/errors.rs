// ABOUTME: Centralized error handling and error types for the PowerPulse API
// ABOUTME: Defines error codes, HTTP status mapping, and sanitized client responses
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! # Unified Error Handling System
//!
//! Standard error types, error codes, and HTTP response formatting shared by
//! the ingestion pipeline, the job scheduler, and the route handlers.
//! Transient LLM failures are distinguished from structural ones so the
//! scheduler can decide what to retry.

use std::fmt::{self, Display};

use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error as ThisError;
use tracing::warn;

use crate::constants::http_status::{
    BAD_GATEWAY, BAD_REQUEST, CONFLICT, INTERNAL_SERVER_ERROR, NOT_FOUND, PAYLOAD_TOO_LARGE,
    SERVICE_UNAVAILABLE, TOO_MANY_REQUESTS,
};

/// Standard error codes used throughout the application
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation
    /// Input validation failed
    InvalidInput,
    /// Data format is invalid
    InvalidFormat,
    /// Value is outside acceptable range
    ValueOutOfRange,
    /// Payload exceeds the configured size guardrail
    PayloadTooLarge,

    // Resource Management
    /// Requested resource was not found
    ResourceNotFound,
    /// Resource already exists (conflict)
    ResourceAlreadyExists,

    // External Services
    /// LLM provider returned an error
    ExternalServiceError,
    /// LLM provider is unavailable (timeout, connection reset, 5xx)
    ExternalServiceUnavailable,
    /// LLM provider rate limited our request
    ExternalRateLimited,

    // Configuration
    /// Configuration error occurred
    ConfigError,

    // Internal Errors
    /// Internal server error
    InternalError,
    /// Database operation failed
    DatabaseError,
    /// Serialization/deserialization failed
    SerializationError,
}

impl ErrorCode {
    /// Get the `HTTP` status code for this error
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidInput | Self::InvalidFormat | Self::ValueOutOfRange => BAD_REQUEST,
            Self::PayloadTooLarge => PAYLOAD_TOO_LARGE,
            Self::ResourceNotFound => NOT_FOUND,
            Self::ResourceAlreadyExists => CONFLICT,
            Self::ExternalServiceError => BAD_GATEWAY,
            Self::ExternalRateLimited => TOO_MANY_REQUESTS,
            Self::ExternalServiceUnavailable => SERVICE_UNAVAILABLE,
            Self::ConfigError
            | Self::InternalError
            | Self::DatabaseError
            | Self::SerializationError => INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::InvalidInput => "The provided input is invalid",
            Self::InvalidFormat => "The data format is invalid",
            Self::ValueOutOfRange => "The provided value is outside the acceptable range",
            Self::PayloadTooLarge => "The uploaded file exceeds the maximum allowed size",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::ResourceAlreadyExists => "A resource with this identifier already exists",
            Self::ExternalServiceError => "The AI service encountered an error",
            Self::ExternalServiceUnavailable => "The AI service is currently unavailable",
            Self::ExternalRateLimited => "AI service rate limit exceeded",
            Self::ConfigError => "Configuration error encountered",
            Self::InternalError => "An internal server error occurred",
            Self::DatabaseError => "Database operation failed",
            Self::SerializationError => "Data serialization/deserialization failed",
        }
    }

    /// Whether a failure with this code is worth retrying with backoff.
    ///
    /// Transient codes cover timeouts, connection resets, 5xx responses,
    /// and rate limits. Everything else, including 4xx provider responses
    /// and schema violations, fails the same way on retry.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::ExternalServiceUnavailable | Self::ExternalRateLimited
        )
    }
}

// Simple serialization - just use the debug representation
impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("{self:?}"))
    }
}

/// Simplified error type for the application
#[derive(Debug, Clone, ThisError)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the `HTTP` status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Whether the underlying failure is transient and retryable
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.code.is_transient()
    }

    /// Get sanitized message safe for client exposure
    ///
    /// Internal error details are replaced with generic messages; validation
    /// and rate-limit messages pass through because they help the caller.
    #[must_use]
    pub fn sanitized_message(&self) -> String {
        match self.code {
            ErrorCode::InvalidInput
            | ErrorCode::InvalidFormat
            | ErrorCode::ValueOutOfRange
            | ErrorCode::PayloadTooLarge
            | ErrorCode::ResourceNotFound
            | ErrorCode::ExternalRateLimited => self.message.clone(),
            _ => self.code.description().to_owned(),
        }
    }

    /// Get full error details for internal logging.
    /// Never send this to clients.
    #[must_use]
    pub fn internal_details(&self) -> String {
        format!("{:?}: {}", self.code, self.message)
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Convert `AppError` to an Axum `Response`
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        use axum::http::StatusCode;
        use axum::Json;

        let status = StatusCode::from_u16(self.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let response = ErrorResponse::from(self);

        (status, Json(response)).into_response()
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Simplified `HTTP` error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code identifying the type of error
    pub code: ErrorCode,
    /// Human-readable error message (sanitized for client)
    pub message: String,
    /// RFC3339 timestamp when the error occurred
    pub timestamp: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        // Log full details internally before sanitizing
        warn!("API error: {}", error.internal_details());

        Self {
            code: error.code,
            message: error.sanitized_message(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Convenience functions for creating common errors
impl AppError {
    /// Invalid input
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Invalid data format
    #[must_use]
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFormat, message)
    }

    /// Payload exceeds the size guardrail
    #[must_use]
    pub fn payload_too_large(max_bytes: usize) -> Self {
        Self::new(
            ErrorCode::PayloadTooLarge,
            format!("File too large. Maximum size: {max_bytes} bytes"),
        )
    }

    /// Resource not found
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        let resource_str = resource.into();
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{resource_str} not found"),
        )
    }

    /// Configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Internal server error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database operation failure
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// LLM provider error (5xx and protocol-level failures; transient)
    #[must_use]
    pub fn external_service(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalServiceError, message)
    }

    /// LLM provider unavailable (timeouts, connection resets; transient)
    #[must_use]
    pub fn external_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalServiceUnavailable, message)
    }

    /// LLM provider rate limited the request (transient)
    #[must_use]
    pub fn external_rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalRateLimited, message)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(
            ErrorCode::SerializationError,
            format!("JSON serialization failed: {err}"),
        )
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(ErrorCode::DatabaseError, format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_codes_cover_provider_failures_only() {
        assert!(ErrorCode::ExternalRateLimited.is_transient());
        assert!(ErrorCode::ExternalServiceUnavailable.is_transient());
        assert!(!ErrorCode::ExternalServiceError.is_transient());
        assert!(!ErrorCode::InvalidInput.is_transient());
        assert!(!ErrorCode::ConfigError.is_transient());
        assert!(!ErrorCode::DatabaseError.is_transient());
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(ErrorCode::InvalidInput.http_status(), 400);
        assert_eq!(ErrorCode::PayloadTooLarge.http_status(), 413);
        assert_eq!(ErrorCode::ResourceNotFound.http_status(), 404);
        assert_eq!(ErrorCode::ExternalRateLimited.http_status(), 429);
        assert_eq!(ErrorCode::DatabaseError.http_status(), 500);
    }

    #[test]
    fn internal_messages_are_sanitized() {
        let err = AppError::database("UNIQUE constraint failed: users.email");
        assert_eq!(err.sanitized_message(), "Database operation failed");

        let err = AppError::invalid_input("force_reprocess must be a boolean");
        assert_eq!(err.sanitized_message(), "force_reprocess must be a boolean");
    }
}
