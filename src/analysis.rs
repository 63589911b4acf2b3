// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Client for the external compost analysis service.
//!
//! One request per call and no retries: the user is waiting on the answer,
//! so failures go straight back as a precise [`AnalysisError`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::AnalysisError;
use crate::model::{AnalysisResult, ServiceStatus};
use crate::parameters::ParameterSet;

const GENERIC_FAILURE: &str = "Analysis failed";

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub base_url: String,
    pub timeout: Duration,
}

/// The scoring service as seen by the rest of the crate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, params: &ParameterSet) -> Result<AnalysisResult, AnalysisError>;

    /// Liveness probe. Never fails; any problem reads as offline.
    async fn check_health(&self) -> ServiceStatus;
}

#[derive(Deserialize)]
struct ServiceErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for `POST /api/analyze` and `GET /api/health`.
#[derive(Clone)]
pub struct HttpAnalysisClient {
    base_url: String,
    client: Client,
}

impl HttpAnalysisClient {
    pub fn try_new(config: AnalysisConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build analysis client: {}", e))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisClient {
    async fn analyze(&self, params: &ParameterSet) -> Result<AnalysisResult, AnalysisError> {
        let response = self
            .client
            .post(self.endpoint("/api/analyze"))
            .json(params)
            .send()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ServiceErrorBody>(&body)
                .ok()
                .and_then(|payload| payload.error)
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| GENERIC_FAILURE.to_string());

            tracing::debug!(%status, %message, "analysis service declined request");
            return Err(AnalysisError::Service { message });
        }

        serde_json::from_slice::<AnalysisResult>(&body).map_err(|e| {
            tracing::warn!(error = %e, "analysis service returned an undecodable body");
            AnalysisError::service(format!("{GENERIC_FAILURE}: malformed response"))
        })
    }

    async fn check_health(&self) -> ServiceStatus {
        match self.client.get(self.endpoint("/api/health")).send().await {
            Ok(response) if response.status().is_success() => ServiceStatus::Online,
            Ok(response) => {
                tracing::debug!(
                    status = %response.status(),
                    "analysis service health check failed"
                );
                ServiceStatus::Offline
            }
            Err(error) => {
                tracing::debug!(%error, "analysis service unreachable");
                ServiceStatus::Offline
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{sample, validate, SampleKind};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, timeout: Duration) -> HttpAnalysisClient {
        HttpAnalysisClient::try_new(AnalysisConfig {
            base_url: format!("{}/", server.uri()),
            timeout,
        })
        .unwrap()
    }

    fn mature() -> ParameterSet {
        validate(&sample(SampleKind::Mature)).unwrap()
    }

    #[tokio::test]
    async fn posts_flat_parameter_object_and_decodes_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({
                "Temperature": 55.0, "MC(%)": 50.0, "pH": 7.2, "C/N Ratio": 25.0,
                "Ammonia(mg/kg)": 45.0, "Nitrate(mg/kg)": 850.0, "TN(%)": 1.85,
                "TOC(%)": 35.5, "EC(ms/cm)": 2.1, "OM(%)": 55.0, "T Value": 0.5,
                "GI(%)": 95.0
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
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
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let result = client.analyze(&mature()).await.unwrap();
        assert_eq!(result.assessment.predicted_score, 88.0);
        assert_eq!(result.assessment.days_to_maturity, 5);
    }

    #[tokio::test]
    async fn service_error_message_is_surfaced_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({ "error": "model unavailable" })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_secs(5))
            .analyze(&mature())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Service { ref message } if message == "model unavailable"
        ));
    }

    #[tokio::test]
    async fn unparseable_error_body_falls_back_to_generic_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_secs(5))
            .analyze(&mature())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Analysis failed");
    }

    #[tokio::test]
    async fn malformed_success_body_is_not_a_partial_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_secs(5))
            .analyze(&mature())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "service");
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpAnalysisClient::try_new(AnalysisConfig {
            base_url: format!("http://{addr}"),
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        let err = client.analyze(&mature()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Transport(_)));
        assert_eq!(client.check_health().await, ServiceStatus::Offline);
    }

    #[tokio::test]
    async fn timeout_maps_to_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_millis(200))
            .analyze(&mature())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "transport");
    }

    #[tokio::test]
    async fn health_reflects_status_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "healthy" })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        assert_eq!(client.check_health().await, ServiceStatus::Online);
        assert_eq!(client.check_health().await, ServiceStatus::Offline);
    }
}
