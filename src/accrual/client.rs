use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::error::AccrualError;
use crate::ledger::models::{MinorUnits, OrderStatus};

/// Used when a 429 carries no usable Retry-After header.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Order status in the accrual authority's vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccrualStatus {
    Registered,
    Invalid,
    Processing,
    Processed,
}

impl From<AccrualStatus> for OrderStatus {
    fn from(status: AccrualStatus) -> Self {
        match status {
            AccrualStatus::Registered => OrderStatus::Registered,
            AccrualStatus::Invalid => OrderStatus::Invalid,
            AccrualStatus::Processing => OrderStatus::Processing,
            AccrualStatus::Processed => OrderStatus::Processed,
        }
    }
}

/// Response body of `GET /api/orders/{number}`
#[derive(Debug, Clone, Deserialize)]
pub struct AccrualResponse {
    pub order: String,
    pub status: AccrualStatus,
    /// Whole currency units; absent when there is no payout
    #[serde(default)]
    pub accrual: Option<Decimal>,
}

/// Verdict for one order, already in ledger terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccrualVerdict {
    pub status: OrderStatus,
    pub accrual: MinorUnits,
}

impl AccrualVerdict {
    fn from_response(requested: &str, response: AccrualResponse) -> Result<Self, AccrualError> {
        if response.order != requested {
            return Err(AccrualError::Malformed(format!(
                "asked for order {}, got {}",
                requested, response.order
            )));
        }

        let accrual = match response.accrual {
            Some(amount) if amount.is_sign_negative() => {
                return Err(AccrualError::Malformed(format!(
                    "negative accrual {} for order {}",
                    amount, requested
                )))
            }
            Some(amount) => MinorUnits::from_decimal_truncated(amount).ok_or_else(|| {
                AccrualError::Malformed(format!("accrual {} out of range", amount))
            })?,
            None => MinorUnits::ZERO,
        };

        Ok(Self {
            status: response.status.into(),
            accrual,
        })
    }
}

/// Source of accrual verdicts.
///
/// Implementations hold no per-call state and are shared across concurrent
/// lookups.
#[async_trait]
pub trait AccrualClient: Send + Sync {
    /// One lookup for one order. Any error leaves the ledger untouched.
    async fn fetch_verdict(&self, order_id: &str) -> Result<AccrualVerdict, AccrualError>;
}

/// HTTP client for the external accrual authority
pub struct HttpAccrualClient {
    client: Client,
    base_url: String,
}

impl HttpAccrualClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AccrualError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn order_url(&self, order_id: &str) -> String {
        format!("{}/api/orders/{}", self.base_url, order_id)
    }
}

#[async_trait]
impl AccrualClient for HttpAccrualClient {
    async fn fetch_verdict(&self, order_id: &str) -> Result<AccrualVerdict, AccrualError> {
        let response = self.client.get(self.order_url(order_id)).send().await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.bytes().await?;
                let parsed: AccrualResponse = serde_json::from_slice(&body)
                    .map_err(|e| AccrualError::Malformed(e.to_string()))?;
                debug!("Accrual verdict for {}: {:?}", order_id, parsed);
                AccrualVerdict::from_response(order_id, parsed)
            }
            StatusCode::NO_CONTENT => Err(AccrualError::NotRegistered(order_id.to_string())),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                Err(AccrualError::RateLimited { retry_after })
            }
            other => Err(AccrualError::UnexpectedStatus(other.as_u16())),
        }
    }
}
