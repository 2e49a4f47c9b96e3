//! Role lookups against the managed backend's REST interface.

use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use crate::roles::{Role, RoleRecord, RoleStore};
use crate::{AuthConfig, AuthError};

/// `RoleStore` backed by the row-level-secured roles table.
pub struct RestRoleStore {
    client: reqwest::Client,
    api_url: String,
    anon_key: String,
    roles_table: String,
    access_token: Option<String>,
}

impl RestRoleStore {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        if config.api_url.trim().is_empty() {
            return Err(AuthError::Config("api_url cannot be empty".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.role_lookup_timeout())
            .build()
            .map_err(|e| AuthError::Http(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            roles_table: config.roles_table.clone(),
            access_token: None,
        })
    }

    /// Send the user's access token so row-level security sees their identity.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn roles_url(&self, user_id: &str) -> Result<Url, AuthError> {
        let base = format!("{}/rest/v1/{}", self.api_url, self.roles_table);
        Url::parse_with_params(
            &base,
            &[
                ("select", "role,patient_id".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("limit", "1".to_string()),
            ],
        )
        .map_err(|e| AuthError::Config(format!("invalid roles URL {base}: {e}")))
    }
}

#[derive(Deserialize)]
struct RoleRow {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    patient_id: Option<Value>,
}

impl From<RoleRow> for RoleRecord {
    fn from(row: RoleRow) -> Self {
        let patient_id = match row.patient_id {
            Some(Value::String(id)) if !id.trim().is_empty() => Some(id.trim().to_string()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        Self {
            role: row.role.as_deref().map(Role::parse).unwrap_or_default(),
            patient_id,
        }
    }
}

impl RoleStore for RestRoleStore {
    async fn fetch_role(&self, user_id: &str) -> Result<Option<RoleRecord>, AuthError> {
        let url = self.roles_url(user_id)?;
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);

        let response = self
            .client
            .get(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::Http("role lookup timed out".into())
                } else {
                    AuthError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<RoleRow> = response
            .json()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))?;

        Ok(rows.into_iter().next().map(RoleRecord::from))
    }
}
