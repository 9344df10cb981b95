//! REST collaborator for order and balance snapshots.
//!
//! Order placement and cancellation are not issued from here; the
//! supervisor only reads the user's orders and balance so that the pushed
//! state can be reconciled against a full snapshot.

use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::Result;
use crate::credentials::Credential;
use crate::models::{ApiResponse, OrderRecord};

const ORDERS_PATH: &str = "/order/all";
const BALANCE_PATH: &str = "/user-panel/get-balance";

/// Thin client over the platform's REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// Creates a client for `base_url` (no trailing slash needed).
    ///
    /// # Errors
    ///
    /// Returns [`TradewireError::Http`](crate::TradewireError::Http) if the
    /// HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tradewire/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Fetches every order of the authenticated user.
    ///
    /// # Errors
    ///
    /// Returns [`TradewireError::CredentialRejected`](crate::TradewireError::CredentialRejected)
    /// on 401/403, [`TradewireError::Api`](crate::TradewireError::Api) on
    /// any other failure status, or a transport/JSON error.
    pub async fn fetch_orders(&self, credential: &Credential) -> Result<Vec<OrderRecord>> {
        let orders: Option<Vec<OrderRecord>> = self.get(ORDERS_PATH, credential).await?;
        let orders = orders.unwrap_or_default();
        info!(count = orders.len(), "Fetched order snapshot");
        Ok(orders)
    }

    /// Fetches the authenticated user's cash balance.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_orders`](Self::fetch_orders).
    pub async fn fetch_balance(&self, credential: &Credential) -> Result<Decimal> {
        let balance: Option<Decimal> = self.get(BALANCE_PATH, credential).await?;
        Ok(balance.unwrap_or_default())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, credential: &Credential) -> Result<Option<T>> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "GET");

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, credential.bearer().as_str())
            .send()
            .await?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(crate::TradewireError::CredentialRejected(format!(
                "GET {path} answered {status}"
            )));
        }

        let body: ApiResponse<T> = if status.is_success() {
            response.json().await?
        } else {
            let message = response
                .json::<ApiResponse<serde_json::Value>>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_default();
            return Err(crate::TradewireError::Api(format!(
                "GET {path} answered {status}: {message}"
            )));
        };

        Ok(body.data)
    }
}
