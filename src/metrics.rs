// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics collection for the analyzer companion.
//!
//! Tracks submissions, upstream behaviour and history size.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

use crate::error::AppError;
use crate::model::ServiceStatus;

fn metric_error(e: prometheus::Error) -> AppError {
    AppError::Internal(anyhow::anyhow!("Failed to create metric: {}", e))
}

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,

    // Submission metrics
    pub submissions: IntCounter,
    pub rejected_inputs: IntCounter,
    pub analyses_completed: IntCounter,
    pub analysis_failures: IntCounterVec,

    // Upstream metrics
    pub upstream_latency: Histogram,
    pub upstream_online: IntGauge,

    // History metrics
    pub history_entries: IntGauge,
    pub persistence_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, AppError> {
        let registry = Registry::new();

        let submissions = IntCounter::with_opts(Opts::new(
            "compost_submissions_total",
            "Total number of analysis submissions received",
        ))
        .map_err(metric_error)?;

        let rejected_inputs = IntCounter::with_opts(Opts::new(
            "compost_rejected_inputs_total",
            "Submissions rejected by input validation",
        ))
        .map_err(metric_error)?;

        let analyses_completed = IntCounter::with_opts(Opts::new(
            "compost_analyses_completed_total",
            "Analyses that returned a complete result",
        ))
        .map_err(metric_error)?;

        let analysis_failures = IntCounterVec::new(
            Opts::new(
                "compost_analysis_failures_total",
                "Analyses that failed, by failure kind",
            ),
            &["kind"],
        )
        .map_err(metric_error)?;

        let upstream_latency = Histogram::with_opts(
            HistogramOpts::new(
                "compost_upstream_latency_seconds",
                "Duration of analysis service requests in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        )
        .map_err(metric_error)?;

        let upstream_online = IntGauge::with_opts(Opts::new(
            "compost_upstream_online",
            "1 when the last health check reached the analysis service",
        ))
        .map_err(metric_error)?;

        let history_entries = IntGauge::with_opts(Opts::new(
            "compost_history_entries",
            "Current number of archived analyses",
        ))
        .map_err(metric_error)?;

        let persistence_failures = IntCounter::with_opts(Opts::new(
            "compost_persistence_failures_total",
            "History writes that did not reach storage",
        ))
        .map_err(metric_error)?;

        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(submissions.clone()),
            Box::new(rejected_inputs.clone()),
            Box::new(analyses_completed.clone()),
            Box::new(analysis_failures.clone()),
            Box::new(upstream_latency.clone()),
            Box::new(upstream_online.clone()),
            Box::new(history_entries.clone()),
            Box::new(persistence_failures.clone()),
        ];
        for collector in collectors {
            registry.register(collector).map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to register metric: {}", e))
            })?;
        }

        Ok(Self {
            registry: Arc::new(registry),
            submissions,
            rejected_inputs,
            analyses_completed,
            analysis_failures,
            upstream_latency,
            upstream_online,
            history_entries,
            persistence_failures,
        })
    }

    pub fn record_submission(&self) {
        self.submissions.inc();
    }

    pub fn record_rejected_input(&self) {
        self.rejected_inputs.inc();
    }

    pub fn record_analysis_completed(&self, seconds: f64) {
        self.analyses_completed.inc();
        self.upstream_latency.observe(seconds);
    }

    pub fn record_analysis_failure(&self, kind: &str, seconds: f64) {
        self.analysis_failures.with_label_values(&[kind]).inc();
        self.upstream_latency.observe(seconds);
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures.inc();
    }

    pub fn update_history_size(&self, size: usize) {
        self.history_entries.set(size as i64);
    }

    pub fn update_upstream_status(&self, status: ServiceStatus) {
        self.upstream_online
            .set(i64::from(status == ServiceStatus::Online));
    }

    /// Export metrics in Prometheus format
    pub fn export(&self) -> Result<String, AppError> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer).map_err(|e| {
            AppError::Internal(anyhow::anyhow!(
                "Failed to convert metrics to string: {}",
                e
            ))
        })
    }
}
