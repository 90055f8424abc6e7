//! Contact Energy HTTP client
//!
//! Implements [`UsageSource`] against the Contact Energy customer API and
//! [`Reauthenticate`] so the background service can refresh an expired
//! session. Every call sends the `x-api-key` header; calls after login also
//! carry the session token in both `session` and `authorization`.

use crate::config::ApiConfig;
use crate::error::{MeterbookError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::record::{Resolution, UsageRecord};
use crate::source::{Reauthenticate, UsageSource};
use async_trait::async_trait;
use chrono::NaiveDate;
use chrono_tz::Tz;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tokio::sync::RwLock;

mod types;

pub use types::{
    AccountSummary, AccountsResponse, ApiUsagePoint, ContractRef, ContractSummary, LoginResponse,
    UsageResponse,
};

/// Client for the Contact Energy API
pub struct ContactClient {
    base_url: String,
    api_key: String,
    email: String,
    password: String,
    account_id: RwLock<String>,
    timezone: Tz,
    account_http: reqwest::Client,
    usage_http: reqwest::Client,
    token: RwLock<Option<String>>,
    logger: StructuredLogger,
}

impl ContactClient {
    /// Build a client; `account_id` may be empty until it is resolved
    pub fn new(config: &ApiConfig, account_id: &str, timezone: Tz) -> Result<Self> {
        let account_http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.account_timeout_secs))
            .build()?;
        let usage_http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.usage_timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            email: config.email.clone(),
            password: config.password.clone(),
            account_id: RwLock::new(account_id.to_string()),
            timezone,
            account_http,
            usage_http,
            token: RwLock::new(None),
            logger: get_logger("contact"),
        })
    }

    fn has_credentials(&self) -> bool {
        !self.email.trim().is_empty() && !self.password.is_empty()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Use an existing session token instead of logging in
    pub async fn set_token(&self, token: &str) {
        *self.token.write().await = Some(token.to_string());
    }

    pub async fn set_account_id(&self, account_id: &str) {
        *self.account_id.write().await = account_id.to_string();
    }

    pub async fn account_id(&self) -> String {
        self.account_id.read().await.clone()
    }

    /// Exchange email and password for a session token
    pub async fn authenticate(&self) -> Result<()> {
        if !self.has_credentials() {
            return Err(MeterbookError::auth(
                "Email and password are required for authentication",
            ));
        }

        let body = serde_json::json!({
            "username": self.email,
            "password": self.password,
        });
        let resp = self
            .account_http
            .post(format!("{}/login/v2", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                self.logger
                    .warn(&format!("Login rejected for {} ({})", self.email, status));
                return Err(MeterbookError::auth(format!("Login rejected ({})", status)));
            }
            s if !s.is_success() => {
                return Err(MeterbookError::network(format!(
                    "Login failed with status {}",
                    status
                )));
            }
            _ => {}
        }

        let login: LoginResponse = resp
            .json()
            .await
            .map_err(|e| MeterbookError::api(format!("Unexpected login response: {}", e)))?;
        let token = login
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MeterbookError::auth("No authentication token received"))?;

        *self.token.write().await = Some(token);
        self.logger.debug(&format!("Authenticated as {}", self.email));
        Ok(())
    }

    async fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .token
            .read()
            .await
            .clone()
            .ok_or_else(|| MeterbookError::auth("Not authenticated"))?;
        Ok(builder
            .header("x-api-key", &self.api_key)
            .header("session", &token)
            .header("authorization", &token))
    }

    /// Account summary of the authenticated user
    pub async fn get_accounts(&self) -> Result<AccountsResponse> {
        let account_id = self.account_id().await;
        let builder = self
            .account_http
            .get(format!("{}/accounts/v2", self.base_url))
            .query(&[("ba", account_id.as_str())]);
        let resp = self.authorized(builder).await?.send().await?;
        let resp = check_status(resp, "accounts").await?;

        resp.json::<AccountsResponse>()
            .await
            .map_err(|e| MeterbookError::api(format!("Unexpected accounts response: {}", e)))
    }

    /// First contract listed in the account summary
    pub async fn first_contract(&self) -> Result<ContractRef> {
        self.get_accounts()
            .await?
            .first_contract()
            .ok_or_else(|| MeterbookError::api("No contracts found in account summary"))
    }

    async fn request_usage(
        &self,
        contract_id: &str,
        resolution: Resolution,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Response> {
        let account_id = self.account_id().await;
        let from = from.format("%Y-%m-%d").to_string();
        let to = to.format("%Y-%m-%d").to_string();
        let builder = self
            .usage_http
            .post(format!("{}/usage/v2/{}", self.base_url, contract_id))
            .query(&[
                ("ba", account_id.as_str()),
                ("interval", resolution.as_str()),
                ("from", from.as_str()),
                ("to", to.as_str()),
            ]);
        Ok(self.authorized(builder).await?.send().await?)
    }
}

/// Map an HTTP status to the error taxonomy
async fn check_status(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let detail: String = body.chars().take(200).collect();
    Err(match status {
        StatusCode::UNAUTHORIZED => {
            MeterbookError::auth(format!("{} request unauthorized: session expired", what))
        }
        StatusCode::FORBIDDEN => MeterbookError::auth(format!("{} request forbidden", what)),
        s if s.is_client_error() => {
            MeterbookError::api(format!("{} request rejected ({}): {}", what, s, detail))
        }
        s => MeterbookError::network(format!("{} request failed ({}): {}", what, s, detail)),
    })
}

#[async_trait]
impl UsageSource for ContactClient {
    async fn get_usage(
        &self,
        contract_id: &str,
        resolution: Resolution,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<UsageRecord>> {
        if !self.is_authenticated().await {
            self.authenticate().await?;
        }

        let mut resp = self.request_usage(contract_id, resolution, from, to).await?;
        if resp.status() == StatusCode::UNAUTHORIZED && self.has_credentials() {
            self.logger
                .info("Session expired during usage request, logging in again");
            *self.token.write().await = None;
            self.authenticate().await?;
            resp = self.request_usage(contract_id, resolution, from, to).await?;
        }
        let resp = check_status(resp, "usage").await?;

        let points = resp
            .json::<UsageResponse>()
            .await
            .map_err(|e| MeterbookError::api(format!("Unexpected usage response: {}", e)))?
            .into_points();

        self.logger.debug(&format!(
            "Fetched {} {} points for {} to {}",
            points.len(),
            resolution,
            from,
            to
        ));
        Ok(points
            .iter()
            .map(|point| point.to_record(self.timezone))
            .collect())
    }
}

#[async_trait]
impl Reauthenticate for ContactClient {
    async fn reauthenticate(&self) -> Result<()> {
        *self.token.write().await = None;
        self.authenticate().await
    }
}
