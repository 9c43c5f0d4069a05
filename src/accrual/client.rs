//! HTTP client for the accrual system
//!
//! One `GET {base}/api/orders/{number}` per call, no retries: rate limiting
//! is reported upward and the reconciler owns the back-off.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

use super::types::{AccrualError, AccrualOutcome, AccrualSource, ScoreReply, parse_reply};

pub struct HttpAccrualClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAccrualClient {
    /// `address` may omit the scheme (`localhost:8080` means `http://localhost:8080`)
    pub fn new(address: &str, request_timeout: Duration) -> Result<Self, AccrualError> {
        let base_url = normalize_base_url(address)?;
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn order_url(&self, order: &str) -> String {
        format!("{}/api/orders/{}", self.base_url, order)
    }
}

fn normalize_base_url(address: &str) -> Result<String, AccrualError> {
    let address = address.trim().trim_end_matches('/');
    if address.is_empty() {
        return Err(AccrualError::InvalidAddress(address.to_string()));
    }
    if address.contains("://") {
        Ok(address.to_string())
    } else {
        Ok(format!("http://{}", address))
    }
}

#[async_trait]
impl AccrualSource for HttpAccrualClient {
    async fn get_score(&self, order: &str) -> Result<ScoreReply, AccrualError> {
        let response = self.http.get(self.order_url(order)).send().await?;
        let status = response.status();
        debug!(order, status = status.as_u16(), "Accrual system replied");

        match status {
            StatusCode::TOO_MANY_REQUESTS => Ok(ScoreReply::RateLimited),
            StatusCode::NO_CONTENT => Ok(ScoreReply::Scored(AccrualOutcome::Unregistered)),
            StatusCode::OK => {
                let body = response.bytes().await?;
                Ok(ScoreReply::Scored(parse_reply(order, &body)?))
            }
            other => Err(AccrualError::UnexpectedStatus(other.as_u16())),
        }
    }
}
