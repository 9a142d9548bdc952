//! Minimal HTTP client for the facegated REST API.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// Response envelope shared by every endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    message: Option<String>,
    error: Option<String>,
}

pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("facegate-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn authed(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| anyhow!("a token is required: pass --token or set FACEGATE_TOKEN"))?;
        Ok(req.bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<(T, Option<String>)> {
        let resp = req.send().await.context("request to facegated failed")?;
        let status = resp.status();
        tracing::debug!(url = %resp.url(), status = status.as_u16(), "facegated responded");
        let body: Envelope<T> = resp
            .json()
            .await
            .with_context(|| format!("unexpected response from facegated (HTTP {status})"))?;
        if !body.success {
            bail!(
                "{} (HTTP {})",
                body.error.unwrap_or_else(|| "request failed".to_string()),
                status.as_u16()
            );
        }
        let data = body.data.ok_or_else(|| anyhow!("response carried no data"))?;
        Ok((data, body.message))
    }

    pub async fn health(&self) -> Result<Value> {
        let req = self.http.get(format!("{}/health", self.base_url));
        Ok(self.send(req).await?.0)
    }

    /// Returns the session token.
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let req = self
            .http
            .post(format!("{}/api/auth/login", self.base_url))
            .json(&serde_json::json!({ "email": email, "password": password }));
        let (data, _): (Value, _) = self.send(req).await?;
        data["token"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| anyhow!("login response carried no token"))
    }

    pub async fn enroll(&self, user_id: i64, image_b64: &str) -> Result<Value> {
        let req = self
            .http
            .post(format!("{}/api/users/{user_id}/faces", self.base_url))
            .json(&serde_json::json!({ "image": image_b64 }));
        Ok(self.send(self.authed(req)?).await?.0)
    }

    pub async fn verify(&self, point_id: i64, image_b64: &str, check_liveness: bool) -> Result<Value> {
        let req = self
            .http
            .post(format!("{}/api/access/verify", self.base_url))
            .json(&serde_json::json!({
                "point_id": point_id,
                "image": image_b64,
                "check_liveness": check_liveness,
            }));
        Ok(self.send(self.authed(req)?).await?.0)
    }
}
