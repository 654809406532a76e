use std::time;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::client::{build_client, endpoint, with_credentials};
use crate::config::IndexConfig;
use crate::document::{IndexDocument, StatusPatch};
use crate::error::IndexError;

/// Error type the search engine answers with when a partial update targets no document.
const DOCUMENT_MISSING_ERROR: &str = "document_missing_exception";

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorCause,
}

#[derive(Deserialize)]
struct ErrorCause {
    #[serde(rename = "type")]
    kind: String,
}

/// Writes talk documents to a single index of the search engine.
#[derive(Clone)]
pub struct IndexWriter {
    client: Client,
    config: IndexConfig,
}

impl IndexWriter {
    pub fn new(config: IndexConfig, request_timeout: time::Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client(request_timeout)?,
            config,
        })
    }

    fn url(&self, talk_id: &str, action: &str) -> Result<url::Url, IndexError> {
        endpoint(
            &self.config.base_url,
            &[self.config.index.as_str(), action, talk_id],
        )
        .ok_or_else(|| IndexError::InvalidUrl {
            talk_id: talk_id.to_owned(),
        })
    }

    async fn send(&self, talk_id: &str, request: RequestBuilder) -> Result<Response, IndexError> {
        with_credentials(request, &self.config.username, &self.config.password)
            .send()
            .await
            .map_err(|error| IndexError::RequestError {
                talk_id: talk_id.to_owned(),
                error,
            })
    }

    /// Create or fully replace the document stored under `talk_id`.
    pub async fn upsert(&self, talk_id: &str, document: &IndexDocument) -> Result<(), IndexError> {
        let url = self.url(talk_id, "_doc")?;
        debug!("writing document {} to {}", talk_id, url);

        let response = self.send(talk_id, self.client.put(url).json(document)).await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            status => Err(rejected(talk_id, status, response).await),
        }
    }

    /// Change only the `status` field of an existing document.
    /// Fails with `IndexError::DocumentMissing` if the index exists but holds no such document;
    /// a missing index is a rejection like any other.
    pub async fn patch_status(&self, talk_id: &str, status: &str) -> Result<(), IndexError> {
        let url = self.url(talk_id, "_update")?;
        debug!("setting status of document {} to {}", talk_id, status);

        let response = self
            .send(talk_id, self.client.post(url).json(&StatusPatch::new(status)))
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                let body = response.text().await.unwrap_or_default();
                match serde_json::from_str::<ErrorResponse>(&body) {
                    Ok(response) if response.error.kind == DOCUMENT_MISSING_ERROR => {
                        Err(IndexError::DocumentMissing {
                            talk_id: talk_id.to_owned(),
                        })
                    }
                    _ => Err(IndexError::Rejected {
                        talk_id: talk_id.to_owned(),
                        status: StatusCode::NOT_FOUND,
                        body,
                    }),
                }
            }
            status => Err(rejected(talk_id, status, response).await),
        }
    }
}

async fn rejected(talk_id: &str, status: StatusCode, response: Response) -> IndexError {
    IndexError::Rejected {
        talk_id: talk_id.to_owned(),
        status,
        body: response.text().await.unwrap_or_default(),
    }
}
