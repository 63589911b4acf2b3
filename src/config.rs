// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::analysis::AnalysisConfig;

const DEFAULT_API_URL: &str = "http://localhost:5000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryBackend {
    File { path: PathBuf },
    Redis { url: String, key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub api_url: String,
    pub request_timeout: Duration,
    pub health_interval: Duration,
    pub progress_step: Duration,
    pub history: HistoryBackend,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen_addr: SocketAddr = lookup("COMPOST_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string())
            .parse()
            .context("invalid COMPOST_ADDR")?;

        let api_url = lookup("COMPOST_API_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            bail!("COMPOST_API_URL must be an http(s) URL, got {api_url}");
        }

        let request_timeout = parse_duration(&lookup, "COMPOST_REQUEST_TIMEOUT_SECS", 30)?;
        let health_interval = parse_duration(&lookup, "COMPOST_HEALTH_INTERVAL_SECS", 10)?;
        let progress_step =
            Duration::from_millis(parse_u64(&lookup, "COMPOST_PROGRESS_STEP_MS", 400)?);

        let history = match lookup("COMPOST_HISTORY_BACKEND")
            .unwrap_or_else(|| "file".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "file" => HistoryBackend::File {
                path: lookup("COMPOST_HISTORY_PATH")
                    .unwrap_or_else(|| "compost_history.json".to_string())
                    .into(),
            },
            "redis" => HistoryBackend::Redis {
                url: lookup("COMPOST_REDIS_URL")
                    .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
                key: lookup("COMPOST_HISTORY_KEY").unwrap_or_else(|| "compostHistory".to_string()),
            },
            other => bail!("COMPOST_HISTORY_BACKEND must be 'file' or 'redis', got '{other}'"),
        };

        let log_format = match lookup("COMPOST_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            listen_addr,
            api_url,
            request_timeout,
            health_interval,
            progress_step,
            history,
            log_format,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn health_interval(&self) -> Duration {
        self.health_interval
    }

    pub fn analysis(&self) -> AnalysisConfig {
        AnalysisConfig {
            base_url: self.api_url.clone(),
            timeout: self.request_timeout,
        }
    }
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, env_key: &str, default: u64) -> Result<u64> {
    let raw = lookup(env_key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .with_context(|| format!("{env_key} must be a non-negative integer"))
}

fn parse_duration(
    lookup: &impl Fn(&str) -> Option<String>,
    env_key: &str,
    default_secs: u64,
) -> Result<Duration> {
    parse_u64(lookup, env_key, default_secs).map(Duration::from_secs)
}
