// ABOUTME: Shared constants for HTTP status codes, configuration defaults, and service identity
// ABOUTME: Single source of truth for magic values referenced across modules
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! Shared constants used throughout the application

/// Service identity strings
pub mod service_names {
    /// Canonical service name for logging and health endpoints
    pub const POWERPULSE: &str = "powerpulse";
}

/// `HTTP` status codes used by the error mapping layer
pub mod http_status {
    /// 400 Bad Request
    pub const BAD_REQUEST: u16 = 400;
    /// 404 Not Found
    pub const NOT_FOUND: u16 = 404;
    /// 409 Conflict
    pub const CONFLICT: u16 = 409;
    /// 413 Payload Too Large
    pub const PAYLOAD_TOO_LARGE: u16 = 413;
    /// 429 Too Many Requests
    pub const TOO_MANY_REQUESTS: u16 = 429;
    /// 500 Internal Server Error
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
    /// 502 Bad Gateway
    pub const BAD_GATEWAY: u16 = 502;
    /// 503 Service Unavailable
    pub const SERVICE_UNAVAILABLE: u16 = 503;
}

/// Pipeline configuration defaults, overridable via environment variables
pub mod defaults {
    /// Cap on estimated prompt tokens per job (`MAX_TOKENS_PER_JOB`)
    pub const MAX_TOKENS_PER_JOB: u64 = 16_000;

    /// Hard cap on daily-analysis units per job (`BATCH_SIZE`)
    pub const BATCH_SIZE: usize = 20;

    /// Semaphore capacity for in-flight LLM calls (`AI_CONCURRENCY`)
    pub const AI_CONCURRENCY: usize = 2;

    /// Minimum delay before each LLM call, in seconds (`MIN_INTER_CALL_DELAY`)
    pub const MIN_INTER_CALL_DELAY_SECS: f64 = 1.0;

    /// Upload size guardrail in bytes (`MAX_FILE_SIZE`), 50 MiB
    pub const MAX_FILE_SIZE: usize = 52_428_800;

    /// Per-attempt timeout for LLM calls, in seconds
    pub const LLM_REQUEST_TIMEOUT_SECS: u64 = 60;

    /// Total-upload timeout, in seconds (30 minutes)
    pub const UPLOAD_TIMEOUT_SECS: u64 = 1_800;

    /// Local file-backed SQL endpoint (`DATABASE_URL`)
    pub const DATABASE_URL: &str = "sqlite:./powerpulse.db";

    /// `HTTP` listen port
    pub const HTTP_PORT: u16 = 8000;

    /// Exact auto-reply sentence filtered during validation
    /// (`AUTORESPONSE_SENTENCE`)
    pub const AUTORESPONSE_SENTENCE: &str = "Thank you for reaching out! Did you know that you can now dial *977# to report a power outage or get your last three tokens instantly?";

    /// Substring matched when `AUTORESPONSE_SUBSTRING_MATCH` is enabled
    pub const AUTORESPONSE_SUBSTRING: &str = "*977#";
}
