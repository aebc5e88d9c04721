//! Minimal InstantDB admin API client.
//!
//! Admin requests bypass the permission rules, so only the server holds the
//! admin token. Queries are InstaQL documents; writes are transaction steps
//! of the form `["update", <entity>, <id>, {attrs}]`.

use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::InstantCredentials;

#[derive(Debug, Error)]
pub enum InstantError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("InstantDB error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Fields of a `library_materials` record created by the server.
#[derive(Debug, Clone)]
pub struct NewLibraryMaterial<'a> {
    pub user_id: &'a str,
    pub title: &'a str,
    pub kind: &'a str,
    pub content: &'a str,
    pub description: Option<&'a str>,
    pub tags: &'a [&'a str],
}

#[derive(Debug, Clone)]
pub struct InstantAdmin {
    http: Client,
    api_url: String,
    credentials: InstantCredentials,
}

impl InstantAdmin {
    pub fn new(api_url: impl Into<String>, credentials: InstantCredentials) -> Self {
        Self {
            http: Client::new(),
            api_url: api_url.into(),
            credentials,
        }
    }

    /// Run an InstaQL query, e.g. `{"library_materials": {"$": {"where": {"user_id": "..."}}}}`.
    pub async fn query(&self, query: &Value) -> Result<Value, InstantError> {
        self.post("/admin/query", &json!({ "query": query })).await
    }

    pub async fn transact(&self, steps: Vec<Value>) -> Result<Value, InstantError> {
        debug!(steps = steps.len(), "Submitting InstantDB transaction");
        self.post("/admin/transact", &json!({ "steps": steps })).await
    }

    /// Write the library entry `id`. The step is an upsert, so repeating it
    /// with the same id leaves a single record.
    pub async fn save_library_material(
        &self,
        id: Uuid,
        material: &NewLibraryMaterial<'_>,
    ) -> Result<Uuid, InstantError> {
        self.transact(vec![library_material_step(id, material)]).await?;
        Ok(id)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, InstantError> {
        let resp = self
            .http
            .post(format!("{}{}", self.api_url, path))
            .bearer_auth(&self.credentials.admin_token)
            .header("App-Id", &self.credentials.app_id)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(InstantError::Api {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }
        Ok(resp.json().await?)
    }
}

fn library_material_step(id: Uuid, material: &NewLibraryMaterial<'_>) -> Value {
    let now = Utc::now().to_rfc3339();
    json!([
        "update",
        "library_materials",
        id.to_string(),
        {
            "user_id": material.user_id,
            "title": material.title,
            "type": material.kind,
            "content": material.content,
            "description": material.description,
            "tags": material.tags,
            "source": "ai_generated",
            "is_favorite": false,
            "created_at": now,
            "updated_at": now,
        }
    ])
}
