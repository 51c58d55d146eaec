// ABOUTME: Configuration module aggregating environment loading and core config types
// ABOUTME: Re-exports ServerConfig and the strongly typed enums used across the crate
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! Configuration management for deployment-specific settings

/// Environment-based configuration loading
pub mod environment;

/// Core configuration type definitions
pub mod types;

pub use environment::{
    AiConfig, AutoResponseConfig, PipelineConfig, ServerConfig,
};
pub use types::{AiServiceType, Environment, LogLevel};
