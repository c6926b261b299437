//! # Uploader Integration (CLI <-> Core)
//!
//! Wires the core [`Uploader`] trait to the RAG ingestion API over HTTP.
//!
//! - Construct [`RagClient`] from the `rag` config section with
//!   [`RagClient::from_section`]; the bearer token comes from `RAG_API_TOKEN`.
//! - `upload` sends a multipart `POST {base_url}/v1/search/profile/{profile}/document`
//!   with the document as the `file` part and its metadata as a JSON `metadata` field.
//! - `delete` sends `DELETE {base_url}/v1/search/profile/{profile}/document/{id}`.
//! - `check_profile` sends `GET {base_url}/v1/search/profile/{profile}` before a run.
//!
//! Non-2xx responses become [`UploadError::Rejected`]; anything that fails before a
//! response arrives becomes [`UploadError::Transport`].

use std::env;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rag_sync_core::contract::{NewDocument, UploadedDocument, Uploader};
use rag_sync_core::error::UploadError;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::load_config::RagSection;

pub const ENV_API_TOKEN: &str = "RAG_API_TOKEN";

pub struct RagClient {
    http: reqwest::Client,
    base_url: String,
    profile: String,
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentResponse {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    index_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    description: Option<String>,
}

impl RagClient {
    pub fn new(
        base_url: impl Into<String>,
        profile: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(RagClient {
            http,
            base_url,
            profile: profile.into(),
            token: token.into(),
        })
    }

    /// Build a client from the `rag` config section and `RAG_API_TOKEN`.
    pub fn from_section(rag: &RagSection) -> Result<Self> {
        let base_url = rag.base_url.clone().ok_or_else(|| {
            tracing::error!("rag.base_url missing from config and environment");
            anyhow!("rag.base_url is not configured (set it in the config or RAG_BASE_URL)")
        })?;
        let profile = rag.profile.clone().ok_or_else(|| {
            tracing::error!("rag.profile missing from config and environment");
            anyhow!("rag.profile is not configured (set it in the config or RAG_PROFILE)")
        })?;
        let token = env::var(ENV_API_TOKEN).map_err(|e| {
            tracing::error!(error = ?e, "{ENV_API_TOKEN} missing in environment");
            anyhow!("{ENV_API_TOKEN} must be set")
        })?;
        tracing::info!(
            %base_url,
            %profile,
            timeout_secs = rag.timeout_secs,
            token_set = !token.is_empty(),
            "Initialized RagClient"
        );
        Self::new(base_url, profile, token, Duration::from_secs(rag.timeout_secs))
    }

    fn profile_url(&self) -> String {
        format!("{}/v1/search/profile/{}", self.base_url, self.profile)
    }

    fn documents_url(&self) -> String {
        format!("{}/document", self.profile_url())
    }

    async fn rejection(response: reqwest::Response) -> UploadError {
        let status = response.status().as_u16();
        let raw = response.text().await.unwrap_or_default();
        let body = match serde_json::from_str::<ErrorResponse>(&raw) {
            Ok(parsed) if !parsed.errors.is_empty() => parsed
                .errors
                .iter()
                .map(|e| {
                    let id = e.id.as_ref().map(|v| v.to_string()).unwrap_or_default();
                    format!("{id}: {}", e.description.as_deref().unwrap_or(""))
                })
                .collect::<Vec<_>>()
                .join("; "),
            _ => raw,
        };
        UploadError::Rejected { status, body }
    }
}

#[async_trait]
impl Uploader for RagClient {
    async fn upload<'a>(&self, doc: NewDocument<'a>) -> Result<UploadedDocument, UploadError> {
        let url = self.documents_url();
        tracing::info!(%url, file_name = doc.file_name, size = doc.content.len(), "Uploading document");

        let metadata = serde_json::to_string(doc.metadata)
            .map_err(|e| UploadError::Transport(format!("encoding metadata: {e}")))?;
        let file = Part::bytes(doc.content.to_vec())
            .file_name(doc.file_name.to_string())
            .mime_str(doc.content_type)
            .map_err(|e| UploadError::Transport(format!("invalid content type: {e}")))?;
        let form = Form::new().part("file", file).text("metadata", metadata);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("filename", doc.file_name)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, file_name = doc.file_name, "Upload request failed");
                UploadError::Transport(e.to_string())
            })?;

        if !response.status().is_success() {
            let err = Self::rejection(response).await;
            tracing::error!(error = %err, file_name = doc.file_name, "Upload rejected");
            return Err(err);
        }
        let body: DocumentResponse = response
            .json()
            .await
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;
        tracing::info!(
            document_id = %body.id,
            name = ?body.name,
            index_status = ?body.index_status,
            "Document accepted"
        );
        Ok(UploadedDocument {
            document_id: body.id,
            index_status: body.index_status,
        })
    }

    async fn delete(&self, document_id: &str) -> Result<(), UploadError> {
        let url = format!("{}/{}", self.documents_url(), document_id);
        tracing::info!(%url, document_id, "Deleting document");
        let response = self
            .http
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, document_id, "Delete request failed");
                UploadError::Transport(e.to_string())
            })?;
        if !response.status().is_success() {
            let err = Self::rejection(response).await;
            tracing::error!(error = %err, document_id, "Delete rejected");
            return Err(err);
        }
        tracing::info!(document_id, "Successfully deleted document");
        Ok(())
    }

    async fn check_profile(&self) -> Result<(), UploadError> {
        let url = self.profile_url();
        tracing::info!(%url, profile = %self.profile, "Checking profile");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, profile = %self.profile, "Profile check request failed");
                UploadError::Transport(e.to_string())
            })?;
        if !response.status().is_success() {
            let err = Self::rejection(response).await;
            tracing::error!(error = %err, profile = %self.profile, "Profile check rejected");
            return Err(err);
        }
        tracing::info!(profile = %self.profile, "Profile is valid");
        Ok(())
    }
}
