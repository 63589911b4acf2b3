// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Cosmetic progress notifications for in-flight analyses.
//!
//! The stages are driven by a timer, not by the analysis service, so they
//! only feed a spinner. A ticker is started next to the real request and
//! stopped as soon as the request settles; the request never waits on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStage {
    Connecting,
    Parsing,
    Scoring,
    CrossReferencing,
    GeneratingImprovements,
}

impl ProgressStage {
    pub const SEQUENCE: [ProgressStage; 5] = [
        ProgressStage::Connecting,
        ProgressStage::Parsing,
        ProgressStage::Scoring,
        ProgressStage::CrossReferencing,
        ProgressStage::GeneratingImprovements,
    ];

    pub fn message(self) -> &'static str {
        match self {
            ProgressStage::Connecting => "Connecting to inference engine...",
            ProgressStage::Parsing => "Parsing chemical profile...",
            ProgressStage::Scoring => "Running regression model...",
            ProgressStage::CrossReferencing => "Cross-referencing plant database...",
            ProgressStage::GeneratingImprovements => "Generating improvements...",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Stage {
        run: u64,
        stage: ProgressStage,
        message: &'static str,
    },
    Finished {
        run: u64,
        success: bool,
    },
}

/// Fan-out point for progress events.
#[derive(Clone)]
pub struct ProgressHub {
    tx: broadcast::Sender<ProgressEvent>,
    step: Duration,
    next_run: Arc<AtomicU64>,
}

impl ProgressHub {
    pub fn new(step: Duration) -> Self {
        let (tx, _) = broadcast::channel(32);
        Self {
            tx,
            step,
            next_run: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Start emitting stages for a new run.
    pub fn start(&self) -> ProgressTicker {
        let run = self.next_run.fetch_add(1, Ordering::Relaxed);
        let tx = self.tx.clone();
        let step = self.step;

        let task = tokio::spawn(async move {
            for (index, stage) in ProgressStage::SEQUENCE.into_iter().enumerate() {
                if index > 0 {
                    tokio::time::sleep(step).await;
                }
                // no subscribers is fine
                let _ = tx.send(ProgressEvent::Stage {
                    run,
                    stage,
                    message: stage.message(),
                });
            }
        });

        ProgressTicker {
            run,
            tx: self.tx.clone(),
            task: Some(task),
        }
    }

    /// Live feed of events. Slow consumers skip what they missed.
    pub fn subscribe(&self) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        let rx = self.tx.subscribe();
        stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "progress subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }
}

/// Handle on one run's timer. Dropping it stops the timer.
pub struct ProgressTicker {
    run: u64,
    tx: broadcast::Sender<ProgressEvent>,
    task: Option<JoinHandle<()>>,
}

impl ProgressTicker {
    pub fn run(&self) -> u64 {
        self.run
    }

    pub fn finish(mut self, success: bool) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let _ = self.tx.send(ProgressEvent::Finished {
            run: self.run,
            success,
        });
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
