//! HTTP client for the external face-recognition service.
//!
//! The service identifies and checks liveness; it never decides access.

use crate::error::ApiError;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceServiceError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("service answered {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl From<FaceServiceError> for ApiError {
    fn from(err: FaceServiceError) -> Self {
        ApiError::FaceService(err.to_string())
    }
}

/// Best match for a probe image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    #[serde(default)]
    pub user_id: Option<i64>,
    pub confidence: f32,
    #[serde(default)]
    pub liveness_ok: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Outcome of a face enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredFace {
    #[serde(default)]
    pub quality: Option<f64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub external_ref: Option<String>,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    image: &'a str,
    user_id: i64,
}

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    image: &'a str,
    point_id: i64,
    check_liveness: bool,
}

#[derive(Clone)]
pub struct FaceClient {
    http: Client,
    base_url: String,
}

impl FaceClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, FaceServiceError> {
        let http = Client::builder()
            .user_agent(concat!("facegated/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Whether the service answers its health probe.
    pub async fn health(&self) -> Result<(), FaceServiceError> {
        let resp = self.http.get(self.url("/health")).send().await?;
        check_status(resp).await.map(|_| ())
    }

    pub async fn register_face(&self, user_id: i64, image_b64: &str) -> Result<RegisteredFace, FaceServiceError> {
        let resp = self
            .http
            .post(self.url("/register-face"))
            .json(&RegisterRequest {
                image: image_b64,
                user_id,
            })
            .send()
            .await?;
        read_json(resp).await
    }

    pub async fn recognize(
        &self,
        image_b64: &str,
        point_id: i64,
        check_liveness: bool,
    ) -> Result<Recognition, FaceServiceError> {
        let resp = self
            .http
            .post(self.url("/recognize-face"))
            .json(&RecognizeRequest {
                image: image_b64,
                point_id,
                check_liveness,
            })
            .send()
            .await?;
        let rec: Recognition = read_json(resp).await?;
        tracing::debug!(
            point_id,
            user_id = ?rec.user_id,
            confidence = rec.confidence,
            liveness_ok = rec.liveness_ok,
            "face service answered"
        );
        Ok(rec)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, FaceServiceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(FaceServiceError::Status { status, body })
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, FaceServiceError> {
    Ok(check_status(resp).await?.json().await?)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn rec(user_id: Option<i64>, confidence: f32) -> Recognition {
        Recognition {
            user_id,
            confidence,
            liveness_ok: true,
            message: None,
        }
    }

    #[tokio::test]
    async fn test_recognize_and_register() {
        let svc = fake::spawn(rec(Some(3), 0.91)).await;
        let client = FaceClient::new(&svc.url, 5).unwrap();
        client.health().await.unwrap();

        let r = client.recognize("aGVsbG8=", 1, true).await.unwrap();
        assert_eq!(r.user_id, Some(3));
        assert!((r.confidence - 0.91).abs() < 1e-6);

        let face = client.register_face(3, "aGVsbG8=").await.unwrap();
        assert_eq!(face.external_ref.as_deref(), Some("face-3"));
        assert_eq!(face.model.as_deref(), Some("ArcFace"));
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        // Nothing listens on port 9 on loopback.
        let client = FaceClient::new("http://127.0.0.1:9", 1).unwrap();
        let err = client.recognize("aGVsbG8=", 1, false).await.unwrap_err();
        assert!(matches!(err, FaceServiceError::Transport(_)));
        assert_eq!(
            ApiError::from(err).status(),
            axum::http::StatusCode::BAD_GATEWAY
        );
    }
}
