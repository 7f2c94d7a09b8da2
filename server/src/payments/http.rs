//! Client for a hosted payment provider speaking a small JSON API.
//! Authorization is the `X-Api-Key` header.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    verify_signed_callback, CallbackError, CallbackEvent, CallbackPayload, Checkout,
    CheckoutRequest, NextStep, PaymentError, PaymentProvider,
};
use crate::models::PaymentMethod;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct CreateCheckoutBody<'a> {
    reference: &'a str,
    amount: String,
    method: PaymentMethod,
    #[serde(rename = "customerEmail")]
    customer_email: &'a str,
    #[serde(rename = "returnUrl")]
    return_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct CheckoutResponse {
    id: String,
    #[serde(rename = "paymentUrl")]
    payment_url: Option<String>,
    instructions: Option<String>,
}

#[derive(Debug, Serialize)]
struct RefundBody<'a> {
    #[serde(rename = "transactionId")]
    transaction_id: &'a str,
    amount: String,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
}

pub struct HttpPaymentProvider {
    name: String,
    client: Client,
    base_url: String,
    api_key: String,
    webhook_secret: String,
}

impl HttpPaymentProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        webhook_secret: impl Into<String>,
    ) -> Result<Self, PaymentError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            name: name.into(),
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            webhook_secret: webhook_secret.into(),
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, PaymentError>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let resp = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            warn!(provider = %self.name, path, status = status.as_u16(), "Provider request failed");
            return Err(PaymentError::Api {
                status: status.as_u16(),
                body,
            });
        }

        debug!(provider = %self.name, path, "Provider request succeeded");
        serde_json::from_str::<R>(&body)
            .map_err(|e| PaymentError::InvalidResponse(format!("{e}; body={body}")))
    }
}

fn next_step(response: CheckoutResponse, method: PaymentMethod) -> Result<Checkout, PaymentError> {
    let next_step = match (method, response.payment_url, response.instructions) {
        (PaymentMethod::Card, Some(url), _) => NextStep::Redirect { url },
        (PaymentMethod::BankTransfer, _, Some(text)) => NextStep::Instructions { text },
        (_, Some(url), None) => NextStep::Redirect { url },
        (_, None, Some(text)) => NextStep::Instructions { text },
        (_, _, _) => {
            return Err(PaymentError::InvalidResponse(format!(
                "checkout '{}' has neither paymentUrl nor instructions",
                response.id
            )))
        }
    };

    Ok(Checkout {
        transaction_id: response.id,
        next_step,
    })
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<Checkout, PaymentError> {
        let body = CreateCheckoutBody {
            reference: &request.reference,
            amount: request.amount.to_string(),
            method: request.method,
            customer_email: &request.customer_email,
            return_url: &request.return_url,
        };
        let response: CheckoutResponse = self.post("/api/v1/checkouts", &body).await?;
        next_step(response, request.method)
    }

    async fn refund(&self, transaction_id: &str, amount: Decimal) -> Result<String, PaymentError> {
        let body = RefundBody {
            transaction_id,
            amount: amount.to_string(),
        };
        let response: RefundResponse = self.post("/api/v1/refunds", &body).await?;
        Ok(response.id)
    }

    fn verify_callback(&self, payload: &CallbackPayload) -> Result<CallbackEvent, CallbackError> {
        verify_signed_callback(&self.webhook_secret, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(url: Option<&str>, instructions: Option<&str>) -> CheckoutResponse {
        CheckoutResponse {
            id: "tx_9".to_string(),
            payment_url: url.map(str::to_string),
            instructions: instructions.map(str::to_string),
        }
    }

    #[test]
    fn test_next_step_prefers_method_specific_field() {
        let card = next_step(response(Some("https://pay/x"), Some("wire")), PaymentMethod::Card).unwrap();
        assert_eq!(
            card.next_step,
            NextStep::Redirect {
                url: "https://pay/x".to_string()
            }
        );

        let transfer =
            next_step(response(Some("https://pay/x"), Some("wire")), PaymentMethod::BankTransfer)
                .unwrap();
        assert_eq!(
            transfer.next_step,
            NextStep::Instructions {
                text: "wire".to_string()
            }
        );
    }

    #[test]
    fn test_next_step_requires_something_to_do() {
        assert!(matches!(
            next_step(response(None, None), PaymentMethod::Card),
            Err(PaymentError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_checkout_body_uses_provider_field_names() {
        let body = CreateCheckoutBody {
            reference: "pay_1",
            amount: Decimal::new(1050, 2).to_string(),
            method: PaymentMethod::BankTransfer,
            customer_email: "a@b.co",
            return_url: "http://localhost/done",
        };
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["amount"], "10.50");
        assert_eq!(json["method"], "bank_transfer");
        assert_eq!(json["customerEmail"], "a@b.co");
    }
}
