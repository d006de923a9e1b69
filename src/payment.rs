use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{errors::AppError, fees::Cents};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub transaction_id: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    /// The gateway answered and refused the operation.
    #[error("{0}")]
    Declined(String),
    /// The gateway could not be reached or answered garbage.
    #[error("{0}")]
    Unavailable(String),
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Declined(msg) => AppError::PaymentDeclined(msg),
            PaymentError::Unavailable(msg) => AppError::PaymentGateway(msg),
        }
    }
}

/// External service that charges and refunds late fees.
#[mockall::automock]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn process_payment(
        &self,
        patron_id: &str,
        amount: Cents,
        description: &str,
    ) -> Result<PaymentReceipt, PaymentError>;

    async fn refund_payment(&self, transaction_id: &str, amount: Cents)
    -> Result<String, PaymentError>;
}

#[derive(Serialize)]
struct ChargeBody<'a> {
    patron_id: &'a str,
    amount: Cents,
    description: &'a str,
}

#[derive(Serialize)]
struct RefundBody<'a> {
    transaction_id: &'a str,
    amount: Cents,
}

#[derive(Deserialize)]
struct GatewayReply {
    success: bool,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    message: String,
}

/// Talks to a JSON payment gateway at `base_url` (`POST /payments`, `POST /refunds`).
#[derive(Clone, Debug)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPaymentGateway {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<GatewayReply, PaymentError> {
        let res = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| PaymentError::Unavailable(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            return Err(PaymentError::Unavailable(format!(
                "payment gateway returned status {status}"
            )));
        }

        res.json::<GatewayReply>()
            .await
            .map_err(|e| PaymentError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn process_payment(
        &self,
        patron_id: &str,
        amount: Cents,
        description: &str,
    ) -> Result<PaymentReceipt, PaymentError> {
        let reply = self
            .post(
                "/payments",
                &ChargeBody {
                    patron_id,
                    amount,
                    description,
                },
            )
            .await?;

        match (reply.success, reply.transaction_id) {
            (true, Some(transaction_id)) => Ok(PaymentReceipt {
                transaction_id,
                message: reply.message,
            }),
            (true, None) => Err(PaymentError::Unavailable(
                "payment gateway reported success without a transaction id".into(),
            )),
            (false, _) => Err(PaymentError::Declined(reply.message)),
        }
    }

    async fn refund_payment(&self, transaction_id: &str, amount: Cents) -> Result<String, PaymentError> {
        let reply = self
            .post("/refunds", &RefundBody { transaction_id, amount })
            .await?;
        if reply.success {
            Ok(reply.message)
        } else {
            Err(PaymentError::Declined(reply.message))
        }
    }
}
