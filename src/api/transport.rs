use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::api::error::Error;

const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one portal call. Transport errors and non-2xx statuses both
/// end up as `success: false`, they never propagate as errors.
#[derive(Debug, Clone)]
pub struct CallResult {
    pub success: bool,
    pub status_code: Option<http::StatusCode>,
    pub content: Option<Value>,
}

impl CallResult {
    pub fn failure() -> CallResult {
        CallResult {
            success: false,
            status_code: None,
            content: None,
        }
    }
}

/// Decouples the portal client from the HTTP implementation so tests can
/// script responses.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get_json(&self, url: &str, params: &[(&str, String)]) -> CallResult;

    async fn post_form(&self, url: &str, params: &[(&str, String)]) -> CallResult;
}

/// Production transport. The portal session lives in the cookie store, so
/// one client instance must serve all calls of a session.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<ReqwestTransport, Error> {
        let client = reqwest::ClientBuilder::new()
            .cookie_store(true)
            .timeout(CALL_TIMEOUT)
            .build()
            .or(Err(Error::InternalError))?;
        Ok(ReqwestTransport { client })
    }

    async fn read_response(response: reqwest::Response) -> CallResult {
        let status_code = response.status();
        let content = response.json::<Value>().await.ok();
        CallResult {
            success: status_code == http::StatusCode::OK && content.is_some(),
            status_code: Some(status_code),
            content,
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_json(&self, url: &str, params: &[(&str, String)]) -> CallResult {
        match self.client.get(url).query(params).send().await {
            Ok(response) => Self::read_response(response).await,
            Err(err) => {
                log::debug!("GET {} failed: {}", url, err);
                CallResult::failure()
            }
        }
    }

    async fn post_form(&self, url: &str, params: &[(&str, String)]) -> CallResult {
        match self.client.post(url).form(params).send().await {
            Ok(response) => Self::read_response(response).await,
            Err(err) => {
                log::debug!("POST {} failed: {}", url, err);
                CallResult::failure()
            }
        }
    }
}
