// ABOUTME: HTTP-backed fallback workout classifier
// ABOUTME: Posts batches of titles to a configured endpoint and decodes one verdict per title
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use runbase_core::errors::{AppError, AppResult};
use runbase_intelligence::{ClassifierVerdict, WorkoutClassifier};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::ClassifierConfig;

const SERVICE: &str = "workout-classifier";

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    names: &'a [String],
}

#[derive(Deserialize)]
struct ClassifyResponse {
    verdicts: Vec<Option<ClassifierVerdict>>,
}

/// Classifier speaking a small JSON protocol
///
/// Request: `{"names": [...]}`. Response: `{"verdicts": [...]}` with one
/// entry (or `null`) per name, in order.
#[derive(Debug, Clone)]
pub struct HttpWorkoutClassifier {
    client: Client,
    url: String,
}

impl HttpWorkoutClassifier {
    /// Create a classifier for an endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Build from configuration; `None` when no endpoint is configured
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn from_config(config: &ClassifierConfig) -> AppResult<Option<Self>> {
        config
            .url
            .as_deref()
            .map(|url| Self::new(url, Duration::from_secs(config.timeout_secs)))
            .transpose()
    }
}

#[async_trait]
impl WorkoutClassifier for HttpWorkoutClassifier {
    fn name(&self) -> &'static str {
        "http"
    }

    #[instrument(skip(self, names), fields(classifier = "http", batch = names.len()))]
    async fn classify_batch(&self, names: &[String]) -> AppResult<Vec<Option<ClassifierVerdict>>> {
        let response = self
            .client
            .post(&self.url)
            .json(&ClassifyRequest { names })
            .send()
            .await
            .map_err(|e| AppError::external_unavailable(SERVICE, format!("Failed to send request: {e}")))?;

        let status = response.status();
        debug!("Classifier response status: {status}");
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::external_service(
                SERVICE,
                format!("Classifier returned {status}: {text}"),
            ));
        }

        let body: ClassifyResponse = response.json().await.map_err(|e| {
            AppError::external_service(SERVICE, format!("Failed to parse classifier response: {e}"))
        })?;
        if body.verdicts.len() != names.len() {
            return Err(AppError::external_service(
                SERVICE,
                format!(
                    "Classifier returned {} verdicts for {} names",
                    body.verdicts.len(),
                    names.len()
                ),
            ));
        }
        Ok(body.verdicts)
    }
}
