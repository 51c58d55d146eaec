// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Loads pipeline, LLM, and server settings from environment variables with defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! Environment-based configuration management
//!
//! All keys are read at startup and overridable via environment variables
//! (a `.env` file is honored if present). `validate()` rejects combinations
//! that would fail at runtime, such as a selected LLM provider without its
//! API key.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::types::{AiServiceType, Environment, LogLevel};
use crate::constants::defaults;
use crate::errors::{AppError, AppResult};
use crate::logging::LoggingConfig;

/// Top-level server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `HTTP` listen port
    pub http_port: u16,
    /// Server host
    pub host: String,
    /// Deployment environment
    pub environment: Environment,
    /// Log level
    pub log_level: LogLevel,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Persistence endpoint (`DATABASE_URL`)
    pub database_url: String,
    /// Upload size guardrail in bytes (`MAX_FILE_SIZE`)
    pub max_file_size: usize,
    /// LLM provider configuration
    pub ai: AiConfig,
    /// Batching and scheduling parameters
    pub pipeline: PipelineConfig,
    /// Auto-reply filtering configuration
    pub autoresponse: AutoResponseConfig,
}

/// LLM provider configuration
#[derive(Debug, Clone)]
pub struct AiConfig {
    /// Which provider adapter to use (`AI_SERVICE`)
    pub service: AiServiceType,
    /// Gemini API key (`GEMINI_API_KEY`)
    pub gemini_api_key: Option<String>,
    /// `OpenAI` API key (`OPENAI_API_KEY`)
    pub openai_api_key: Option<String>,
    /// Gemini model name (`GEMINI_MODEL`)
    pub gemini_model: String,
    /// `OpenAI` model name (`OPENAI_MODEL`)
    pub openai_model: String,
    /// Per-attempt request timeout (`LLM_REQUEST_TIMEOUT_SECS`)
    pub request_timeout: Duration,
}

/// Batching and job-scheduling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Cap on estimated prompt tokens per job (`MAX_TOKENS_PER_JOB`)
    pub max_tokens_per_job: u64,
    /// Hard cap on daily-analysis units per job (`BATCH_SIZE`)
    pub batch_size: usize,
    /// Semaphore capacity for in-flight LLM calls (`AI_CONCURRENCY`)
    pub ai_concurrency: usize,
    /// Minimum delay before each LLM call (`MIN_INTER_CALL_DELAY`, seconds)
    pub min_inter_call_delay_secs: f64,
    /// Total-upload timeout (`UPLOAD_TIMEOUT_SECS`)
    pub upload_timeout_secs: u64,
}

impl PipelineConfig {
    /// Minimum delay before each LLM call as a `Duration`
    #[must_use]
    pub fn min_inter_call_delay(&self) -> Duration {
        Duration::from_secs_f64(self.min_inter_call_delay_secs.max(0.0))
    }

    /// Total-upload timeout as a `Duration`
    #[must_use]
    pub const fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_job: defaults::MAX_TOKENS_PER_JOB,
            batch_size: defaults::BATCH_SIZE,
            ai_concurrency: defaults::AI_CONCURRENCY,
            min_inter_call_delay_secs: defaults::MIN_INTER_CALL_DELAY_SECS,
            upload_timeout_secs: defaults::UPLOAD_TIMEOUT_SECS,
        }
    }
}

/// Auto-reply filtering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoResponseConfig {
    /// Exact sentence filtered during validation (`AUTORESPONSE_SENTENCE`)
    pub sentence: String,
    /// When enabled, match by substring instead of exact sentence
    /// (`AUTORESPONSE_SUBSTRING_MATCH`, default off)
    pub substring_match: bool,
}

impl Default for AutoResponseConfig {
    fn default() -> Self {
        Self {
            sentence: defaults::AUTORESPONSE_SENTENCE.to_owned(),
            substring_match: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values or
    /// required configuration is missing
    pub fn from_env() -> AppResult<Self> {
        Self::initialize_environment();

        let config = Self {
            http_port: env_parsed("HTTP_PORT", defaults::HTTP_PORT),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_owned()),
            environment: Environment::from_str_or_default(
                &env::var("ENVIRONMENT").unwrap_or_default(),
            ),
            log_level: LogLevel::from_str_or_default(
                &env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned()),
            ),
            logging: LoggingConfig::from_env(),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| defaults::DATABASE_URL.to_owned()),
            max_file_size: env_parsed("MAX_FILE_SIZE", defaults::MAX_FILE_SIZE),
            ai: AiConfig::from_env(),
            pipeline: PipelineConfig::from_env(),
            autoresponse: AutoResponseConfig::from_env(),
        };

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Initialize environment by loading .env file
    fn initialize_environment() {
        if let Err(e) = dotenvy::dotenv() {
            warn!("No .env file found or failed to load: {}", e);
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error if configuration values are invalid or conflicting
    pub fn validate(&self) -> AppResult<()> {
        match self.ai.service {
            AiServiceType::Gemini if self.ai.gemini_api_key.is_none() => Err(AppError::config(
                "GEMINI_API_KEY is required when AI_SERVICE is 'gemini'",
            )),
            AiServiceType::OpenAi if self.ai.openai_api_key.is_none() => Err(AppError::config(
                "OPENAI_API_KEY is required when AI_SERVICE is 'openai'",
            )),
            _ => {
                if self.pipeline.batch_size == 0 {
                    return Err(AppError::config("BATCH_SIZE must be at least 1"));
                }
                if self.pipeline.ai_concurrency == 0 {
                    return Err(AppError::config("AI_CONCURRENCY must be at least 1"));
                }
                if self.pipeline.max_tokens_per_job == 0 {
                    return Err(AppError::config("MAX_TOKENS_PER_JOB must be at least 1"));
                }
                Ok(())
            }
        }
    }
}

impl AiConfig {
    /// Load LLM provider settings from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            service: AiServiceType::from_env(),
            gemini_api_key: env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            gemini_model: env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_owned()),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_owned()),
            request_timeout: Duration::from_secs(env_parsed(
                "LLM_REQUEST_TIMEOUT_SECS",
                defaults::LLM_REQUEST_TIMEOUT_SECS,
            )),
        }
    }
}

impl PipelineConfig {
    /// Load batching and scheduling parameters from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_tokens_per_job: env_parsed("MAX_TOKENS_PER_JOB", defaults::MAX_TOKENS_PER_JOB),
            batch_size: env_parsed("BATCH_SIZE", defaults::BATCH_SIZE),
            ai_concurrency: env_parsed("AI_CONCURRENCY", defaults::AI_CONCURRENCY),
            min_inter_call_delay_secs: env_parsed(
                "MIN_INTER_CALL_DELAY",
                defaults::MIN_INTER_CALL_DELAY_SECS,
            ),
            upload_timeout_secs: env_parsed("UPLOAD_TIMEOUT_SECS", defaults::UPLOAD_TIMEOUT_SECS),
        }
    }
}

impl AutoResponseConfig {
    /// Load auto-reply filtering settings from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            sentence: env::var("AUTORESPONSE_SENTENCE")
                .unwrap_or_else(|_| defaults::AUTORESPONSE_SENTENCE.to_owned()),
            substring_match: env::var("AUTORESPONSE_SUBSTRING_MATCH")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

/// Parse an environment variable, falling back to a default on absence or
/// parse failure
fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
