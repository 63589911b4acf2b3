// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Background liveness polling of the analysis service.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::analysis::AnalysisService;
use crate::metrics::Metrics;
use crate::model::ServiceStatus;

/// Owns the polling task. Stopping or dropping it cancels the timer.
pub struct HealthMonitor {
    status: watch::Receiver<ServiceStatus>,
    task: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    pub fn spawn(service: Arc<dyn AnalysisService>, metrics: Metrics, interval: Duration) -> Self {
        let (tx, status) = watch::channel(ServiceStatus::Unknown);

        if interval.is_zero() {
            tracing::warn!("health polling disabled; upstream status will stay unknown");
            return Self { status, task: None };
        }

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let current = service.check_health().await;
                metrics.update_upstream_status(current);

                let previous = *tx.borrow();
                if previous != current {
                    tracing::info!(?previous, ?current, "analysis service status changed");
                }
                if tx.send(current).is_err() {
                    break;
                }
            }
        });

        Self {
            status,
            task: Some(task),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ServiceStatus> {
        self.status.clone()
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("health polling stopped");
        }
    }
}

#[cfg(test)]
impl HealthMonitor {
    fn status(&self) -> ServiceStatus {
        *self.status.borrow()
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
