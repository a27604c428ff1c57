use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};
use turnstile_core::{ChargeRequest, ChargeSession, GatewayError, PaymentGateway};
use turnstile_shared::Masked;

use crate::app_config::GatewayConfig;

/// Client for a Snap-style hosted payment page API.
pub struct HttpPaymentGateway {
    client: Client,
    snap_url: String,
    api_url: String,
    redirect_url: String,
    server_key: Masked<String>,
}

#[derive(Serialize)]
struct SnapRequest<'a> {
    transaction_details: TransactionDetails<'a>,
    customer_details: CustomerDetails<'a>,
    item_details: Vec<ItemDetails<'a>>,
}

#[derive(Serialize)]
struct TransactionDetails<'a> {
    order_id: &'a str,
    gross_amount: i64,
}

#[derive(Serialize)]
struct CustomerDetails<'a> {
    first_name: &'a str,
}

#[derive(Serialize)]
struct ItemDetails<'a> {
    id: &'a str,
    price: i64,
    quantity: u32,
    name: &'a str,
}

#[derive(Deserialize)]
struct SnapResponse {
    token: Option<String>,
    redirect_url: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            snap_url: config.snap_url.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            redirect_url: config.redirect_url.trim_end_matches('/').to_string(),
            server_key: config.server_key.clone(),
        })
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(GatewayError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn transport(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(err.to_string())
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn initiate(&self, charge: &ChargeRequest) -> Result<ChargeSession, GatewayError> {
        let body = SnapRequest {
            transaction_details: TransactionDetails {
                order_id: &charge.order_id,
                gross_amount: charge.amount,
            },
            customer_details: CustomerDetails {
                first_name: &charge.customer,
            },
            item_details: vec![ItemDetails {
                id: &charge.order_id,
                price: charge.amount,
                quantity: 1,
                name: &charge.description,
            }],
        };

        let response = self
            .client
            .post(&self.snap_url)
            .basic_auth(self.server_key.expose(), None::<&str>)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let response = Self::ensure_success(response).await?;

        let snap: SnapResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        let redirect_url = match (snap.redirect_url, snap.token.as_deref()) {
            (Some(url), _) => url,
            (None, Some(token)) => format!("{}/{}", self.redirect_url, token),
            (None, None) => {
                return Err(GatewayError::Decode(
                    "response carries neither token nor redirect_url".into(),
                ))
            }
        };

        info!(order_id = %charge.order_id, "Charge initiated");
        Ok(ChargeSession {
            order_id: charge.order_id.clone(),
            token: snap.token,
            redirect_url,
        })
    }

    async fn cancel(&self, order_id: &str) -> Result<(), GatewayError> {
        let url = format!("{}/{}/cancel", self.api_url, order_id);
        let response = self
            .client
            .post(&url)
            .basic_auth(self.server_key.expose(), None::<&str>)
            .send()
            .await
            .map_err(transport)?;

        // A charge the gateway never saw has nothing to cancel.
        if response.status() == StatusCode::NOT_FOUND {
            warn!(order_id = %order_id, "Gateway has no charge to cancel");
            return Ok(());
        }
        Self::ensure_success(response).await?;

        info!(order_id = %order_id, "Charge cancelled");
        Ok(())
    }
}
