// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Submission pipeline: validate the form, ask the analysis service, archive
//! the result. Only a complete result is ever archived.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::analysis::AnalysisService;
use crate::error::AppError;
use crate::history::HistoryStore;
use crate::metrics::Metrics;
use crate::model::HistoryEntry;
use crate::parameters;
use crate::progress::ProgressHub;

pub struct Submission {
    pub entry: HistoryEntry,
    /// Present when the entry is only held in memory.
    pub warning: Option<String>,
}

#[derive(Clone)]
pub struct Workflow {
    service: Arc<dyn AnalysisService>,
    history: HistoryStore,
    progress: ProgressHub,
    metrics: Metrics,
    in_flight: Arc<Mutex<()>>,
}

impl Workflow {
    pub fn new(
        service: Arc<dyn AnalysisService>,
        history: HistoryStore,
        progress: ProgressHub,
        metrics: Metrics,
    ) -> Self {
        Self {
            service,
            history,
            progress,
            metrics,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn progress(&self) -> &ProgressHub {
        &self.progress
    }

    /// Run one analysis. A second call while one is in flight fails with
    /// [`AppError::Busy`] rather than racing to create a duplicate entry.
    pub async fn submit(&self, raw: &HashMap<String, String>) -> Result<Submission, AppError> {
        let _in_flight = self.in_flight.try_lock().map_err(|_| AppError::Busy)?;
        self.metrics.record_submission();

        let params = parameters::validate(raw).map_err(|error| {
            self.metrics.record_rejected_input();
            tracing::debug!(
                parameter = error.parameter,
                reason = %error.reason,
                "submission rejected"
            );
            error
        })?;

        let ticker = self.progress.start();
        let run = ticker.run();
        let started = Instant::now();

        let result = match self.service.analyze(&params).await {
            Ok(result) => {
                ticker.finish(true);
                self.metrics
                    .record_analysis_completed(started.elapsed().as_secs_f64());
                result
            }
            Err(error) => {
                ticker.finish(false);
                self.metrics
                    .record_analysis_failure(error.kind(), started.elapsed().as_secs_f64());
                tracing::warn!(%error, run, kind = error.kind(), "analysis failed");
                return Err(error.into());
            }
        };

        tracing::info!(
            run,
            score = result.assessment.predicted_score,
            stage = %result.assessment.maturity_stage,
            "analysis completed"
        );

        let outcome = self.history.append(params, result).await;
        self.metrics.update_history_size(self.history.len().await);

        let warning = outcome.persist_error.map(|error| {
            self.metrics.record_persistence_failure();
            format!("analysis saved for this session only: {error}")
        });

        Ok(Submission {
            entry: outcome.entry,
            warning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisConfig, HttpAnalysisClient, MockAnalysisService};
    use crate::error::{AnalysisError, ValidationReason};
    use crate::history::FileStorage;
    use crate::model::AnalysisResult;
    use crate::parameters::{sample, SampleKind};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        workflow: Workflow,
        _dir: tempfile::TempDir,
    }

    async fn fixture(service: Arc<dyn AnalysisService>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryStore::open(FileStorage::new(dir.path().join("history.json"))).await;
        let workflow = Workflow::new(
            service,
            history,
            ProgressHub::new(Duration::from_millis(5)),
            Metrics::new().unwrap(),
        );
        Fixture {
            workflow,
            _dir: dir,
        }
    }

    fn http_service(server: &MockServer, timeout: Duration) -> Arc<dyn AnalysisService> {
        Arc::new(
            HttpAnalysisClient::try_new(AnalysisConfig {
                base_url: server.uri(),
                timeout,
            })
            .unwrap(),
        )
    }

    fn stub_result() -> serde_json::Value {
        json!({
            "Compost_Quality_Assessment": {
                "Predicted_Score": 88,
                "Quality_Status": "High",
                "Maturity_Stage": "Mature",
                "Days_to_Maturity": 5,
                "Overall_Recommendation": "Ready",
                "Parameter_Improvements": []
            },
            "Plant_Usability_Guide": {
                "Suitable_Plants_For_Use": [],
                "Conditionally_Usable_Plants": []
            }
        })
    }

    #[tokio::test]
    async fn successful_analysis_creates_exactly_one_entry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_json(stub_result()))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(http_service(&server, Duration::from_secs(5))).await;
        let submission = fx
            .workflow
            .submit(&sample(SampleKind::Mature))
            .await
            .unwrap();

        assert!(submission.warning.is_none());
        let entries = fx.workflow.history().list().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, submission.entry.id);
        assert_eq!(entries[0].result.assessment.predicted_score, 88.0);
        assert_eq!(entries[0].inputs.get("pH"), Some(7.2));
    }

    #[tokio::test]
    async fn service_error_surfaces_message_without_entry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({ "error": "model unavailable" })),
            )
            .mount(&server)
            .await;

        let fx = fixture(http_service(&server, Duration::from_secs(5))).await;
        let err = fx
            .workflow
            .submit(&sample(SampleKind::Mature))
            .await
            .err()
            .unwrap();

        assert_eq!(err.to_string(), "model unavailable");
        assert!(fx.workflow.history().list().await.is_empty());
    }

    #[tokio::test]
    async fn silent_service_is_a_transport_error_without_entry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let fx = fixture(http_service(&server, Duration::from_millis(200))).await;
        let err = fx
            .workflow
            .submit(&sample(SampleKind::Mature))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, AppError::Analysis(AnalysisError::Transport(_))));
        assert!(fx.workflow.history().list().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_service() {
        let mut service = MockAnalysisService::new();
        service.expect_analyze().never();
        let fx = fixture(Arc::new(service)).await;

        let mut raw = sample(SampleKind::Mature);
        raw.insert("TOC(%)".into(), "lots".into());

        match fx.workflow.submit(&raw).await {
            Err(AppError::Validation(error)) => {
                assert_eq!(error.parameter, "TOC(%)");
                assert_eq!(error.reason, ValidationReason::NotANumber);
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("expected validation failure"),
        }
        assert!(fx.workflow.history().list().await.is_empty());
    }

    #[tokio::test]
    async fn overlapping_submission_is_rejected_as_busy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(stub_result())
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(http_service(&server, Duration::from_secs(5))).await;
        let raw = sample(SampleKind::Mature);

        let first = fx.workflow.submit(&raw);
        let second = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            fx.workflow.submit(&raw).await
        };
        let (first, second) = tokio::join!(first, second);

        assert!(first.is_ok());
        assert!(matches!(second, Err(AppError::Busy)));
        assert_eq!(fx.workflow.history().len().await, 1);
    }

    #[tokio::test]
    async fn progress_run_finishes_with_outcome() {
        use crate::progress::ProgressEvent;
        use futures_util::StreamExt;

        let mut service = MockAnalysisService::new();
        service
            .expect_analyze()
            .times(1)
            .returning(|_| Err(AnalysisError::Transport("connection refused".into())));
        let fx = fixture(Arc::new(service)).await;

        let events = fx.workflow.progress().subscribe();
        tokio::pin!(events);

        assert!(fx.workflow.submit(&sample(SampleKind::Mature)).await.is_err());

        let mut finished = None;
        while let Some(event) = events.next().await {
            if let ProgressEvent::Finished { success, .. } = event {
                finished = Some(success);
                break;
            }
        }
        assert_eq!(finished, Some(false));
    }

    #[tokio::test]
    async fn mocked_result_is_archived_verbatim() {
        let mut expected = AnalysisResult::default();
        expected.assessment.predicted_score = 42.5;
        expected.assessment.quality_status = "Poor".into();
        let returned = expected.clone();

        let mut service = MockAnalysisService::new();
        service
            .expect_analyze()
            .times(1)
            .returning(move |_| Ok(returned.clone()));
        let fx = fixture(Arc::new(service)).await;

        let submission = fx
            .workflow
            .submit(&sample(SampleKind::Immature))
            .await
            .unwrap();
        assert_eq!(submission.entry.result, expected);
    }
}
