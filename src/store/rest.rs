//! Hosted REST backend — talks to a PostgREST-style endpoint
//! (`{base}/rest/v1/<table>`) authenticated with a project API key.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::PersistError;
use crate::store::traits::{IdentityRecord, PartialStoredRecord, PersistenceGateway, StoredRecord};

const RECORDS_TABLE: &str = "questionnaire_records";
const IDENTITIES_TABLE: &str = "identities";

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Gateway backed by a hosted PostgREST API.
pub struct RestGateway {
    base_url: String,
    api_key: SecretString,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct IdentityRow {
    identity_id: String,
}

impl RestGateway {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        let key = self.api_key.expose_secret();
        self.client
            .request(method, self.table_url(table))
            .header("apikey", key)
            .bearer_auth(key)
    }

    async fn send(&self, op: &str, req: reqwest::RequestBuilder) -> Result<reqwest::Response, PersistError> {
        let resp = req
            .send()
            .await
            .map_err(|e| PersistError::Transient(format!("{op}: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(classify_status(op, status, &body))
    }

    async fn find_identity(&self, column: &str, value: &str) -> Result<Option<String>, PersistError> {
        let req = self.request(reqwest::Method::GET, IDENTITIES_TABLE).query(&[
            ("select", "identity_id".to_string()),
            (column, format!("eq.{value}")),
            ("order", "created_at.asc".to_string()),
            ("limit", "1".to_string()),
        ]);
        let rows: Vec<IdentityRow> = self
            .send("find_identity", req)
            .await?
            .json()
            .await
            .map_err(|e| PersistError::Transient(format!("find_identity decode: {e}")))?;
        Ok(rows.into_iter().next().map(|r| r.identity_id))
    }
}

/// Throttling, timeouts and server faults may clear up; other client errors
/// will not.
fn classify_status(op: &str, status: StatusCode, body: &str) -> PersistError {
    let message = format!("{op}: HTTP {status}: {body}");
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        PersistError::Transient(message)
    } else {
        PersistError::Permanent(message)
    }
}

#[async_trait]
impl PersistenceGateway for RestGateway {
    async fn write(&self, record: &PartialStoredRecord) -> Result<(), PersistError> {
        record.validate()?;
        let mut body = serde_json::to_value(record)
            .map_err(|e| PersistError::Permanent(format!("serialize record: {e}")))?;
        body["updated_at"] = serde_json::Value::String(Utc::now().to_rfc3339());

        let req = self
            .request(reqwest::Method::POST, RECORDS_TABLE)
            .query(&[("on_conflict", "owner_id,step")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&body);
        self.send("write", req).await?;

        debug!(owner_id = %record.owner_id, step = record.step, final_flag = record.final_flag, "Record upserted via REST");
        Ok(())
    }

    async fn records_for_owner(&self, owner_id: &str) -> Result<Vec<StoredRecord>, PersistError> {
        let req = self.request(reqwest::Method::GET, RECORDS_TABLE).query(&[
            ("select", "record_id:id,owner_id,step,answers,contact_info,final_flag,created_at,updated_at".to_string()),
            ("owner_id", format!("eq.{owner_id}")),
            ("order", "step.asc".to_string()),
        ]);
        self.send("records_for_owner", req)
            .await?
            .json()
            .await
            .map_err(|e| PersistError::Permanent(format!("records_for_owner decode: {e}")))
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<String>, PersistError> {
        self.find_identity("email", email).await
    }

    async fn find_identity_by_phone(&self, phone: &str) -> Result<Option<String>, PersistError> {
        self.find_identity("phone", phone).await
    }

    async fn register_identity(&self, identity: &IdentityRecord) -> Result<(), PersistError> {
        if identity.identity_id.trim().is_empty() {
            return Err(PersistError::Permanent("identity_id is required".to_string()));
        }
        let req = self
            .request(reqwest::Method::POST, IDENTITIES_TABLE)
            .query(&[("on_conflict", "identity_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(identity);
        self.send("register_identity", req).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        let transient = [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::REQUEST_TIMEOUT,
        ];
        for status in transient {
            assert!(classify_status("op", status, "").is_retryable(), "{status}");
        }

        let permanent = [
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::CONFLICT,
            StatusCode::UNPROCESSABLE_ENTITY,
        ];
        for status in permanent {
            assert!(!classify_status("op", status, "").is_retryable(), "{status}");
        }
    }

    #[test]
    fn table_urls_ignore_trailing_slash() {
        let gw = RestGateway::new("https://project.example.co/", SecretString::from("anon"));
        assert_eq!(
            gw.table_url(RECORDS_TABLE),
            "https://project.example.co/rest/v1/questionnaire_records"
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_transient() {
        let gw = RestGateway::new("http://127.0.0.1:9", SecretString::from("anon"));
        let err = gw.find_identity_by_email("a@b.com").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
