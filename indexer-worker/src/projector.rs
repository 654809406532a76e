use std::time;

use reqwest::Client;
use tracing::debug;

use crate::client::{build_client, endpoint, with_credentials};
use crate::config::SourceConfig;
use crate::document::{IndexDocument, TalkRecord};
use crate::error::{DecodeError, FetchError, ProjectionError};

/// Reads talks from the source system and turns them into search documents.
#[derive(Clone)]
pub struct TalkProjector {
    client: Client,
    config: SourceConfig,
}

impl TalkProjector {
    pub fn new(config: SourceConfig, request_timeout: time::Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client(request_timeout)?,
            config,
        })
    }

    /// Fetch the current state of a talk.
    pub async fn fetch(&self, talk_id: &str) -> Result<TalkRecord, ProjectionError> {
        let url = endpoint(&self.config.base_url, &["data", "session", talk_id]).ok_or_else(
            || FetchError::InvalidUrl {
                talk_id: talk_id.to_owned(),
            },
        )?;

        debug!("fetching talk {} from {}", talk_id, url);

        let request = with_credentials(
            self.client.get(url),
            &self.config.username,
            &self.config.password,
        );
        let response = request.send().await.map_err(|error| FetchError::RequestError {
            talk_id: talk_id.to_owned(),
            error,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::StatusError {
                talk_id: talk_id.to_owned(),
                status,
                body,
            }
            .into());
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| FetchError::RequestError {
                talk_id: talk_id.to_owned(),
                error,
            })?;

        serde_json::from_slice(&body).map_err(|error| {
            DecodeError {
                talk_id: talk_id.to_owned(),
                error,
            }
            .into()
        })
    }

    /// Compute the search document for a talk from its current state in the source system.
    pub async fn project(&self, talk_id: &str) -> Result<IndexDocument, ProjectionError> {
        let talk = self.fetch(talk_id).await?;
        Ok(IndexDocument::from(talk))
    }
}
