use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{debug, warn};

use platter_core::cart::{AddLineRequest, CartError, CartGateway, UpdateLineRequest};
use platter_core::catalog::{Catalog, CatalogSource};
use platter_core::config::ApiConfig;
use platter_core::domain::cart::CartItemId;
use platter_core::domain::product::ProductSlug;

use crate::wire::{AddLinePayload, CartResponse, QuantityPayload, UpdateLinePayload, WireCatalog};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not build http client: {0}")]
    Build(#[from] reqwest::Error),
    #[error("invalid storefront base url `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("storefront api at `{url}` is not reachable: {reason}")]
    Unreachable { url: String, reason: String },
}

/// Storefront API client. Reads customization schemas and mutates cart
/// lines; never retries on its own.
#[derive(Clone, Debug)]
pub struct HttpStorefrontClient {
    client: Client,
    base_url: Url,
}

impl HttpStorefrontClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Self::with_client(client, &config.base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidBaseUrl { url: base_url.to_string(), reason };
        let parsed =
            Url::parse(base_url.trim_end_matches('/')).map_err(|error| invalid(error.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("url cannot carry a path".to_string()));
        }
        Ok(Self { client, base_url: parsed })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Appends path segments to the base url, percent-encoding each one so
    /// ids cannot change the request path.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn catalog_url(&self, product_slug: &ProductSlug) -> Url {
        self.endpoint(&["products", &product_slug.0, "customizations"])
    }

    fn line_url(&self, cart_item_id: &CartItemId) -> Url {
        self.endpoint(&["cart", "items", &cart_item_id.0])
    }

    /// One GET against the base url. Any answer below 500 means the API is
    /// up; the status is handed back for reporting.
    pub async fn ping(&self) -> Result<StatusCode, ClientError> {
        let unreachable =
            |reason: String| ClientError::Unreachable { url: self.base_url().to_string(), reason };
        let response = self
            .client
            .get(self.base_url.clone())
            .send()
            .await
            .map_err(|error| unreachable(error.to_string()))?;
        let status = response.status();
        if status.is_server_error() {
            return Err(unreachable(format!("api answered {status}")));
        }
        Ok(status)
    }

    async fn fetch_wire_catalog(&self, product_slug: &ProductSlug) -> Option<WireCatalog> {
        let url = self.catalog_url(product_slug);
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(product_slug = %product_slug.0, error = %error, "catalog request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(
                product_slug = %product_slug.0,
                status = %response.status(),
                "catalog endpoint returned an error status"
            );
            return None;
        }

        match response.json::<WireCatalog>().await {
            Ok(wire) => Some(wire),
            Err(error) => {
                warn!(product_slug = %product_slug.0, error = %error, "catalog payload did not decode");
                None
            }
        }
    }
}

#[async_trait]
impl CatalogSource for HttpStorefrontClient {
    async fn fetch_customizations(&self, product_slug: &ProductSlug) -> Option<Catalog> {
        let wire = self.fetch_wire_catalog(product_slug).await?;
        match wire.into_catalog() {
            Ok(catalog) => Some(catalog),
            Err(error) => {
                warn!(product_slug = %product_slug.0, error = %error, "catalog payload rejected");
                None
            }
        }
    }
}

#[async_trait]
impl CartGateway for HttpStorefrontClient {
    async fn add_cart_line(
        &self,
        request: &AddLineRequest,
        auth_token: &SecretString,
    ) -> Result<(), CartError> {
        let mut builder =
            self.client.post(self.endpoint(&["cart", "items"])).json(&AddLinePayload::from(request));
        let token = auth_token.expose_secret();
        if !token.trim().is_empty() {
            builder = builder.bearer_auth(token);
        }
        send_cart_mutation(builder, "add_cart_line").await
    }

    async fn update_cart_line_customizations(
        &self,
        request: &UpdateLineRequest,
    ) -> Result<(), CartError> {
        let url = self.endpoint(&["cart", "items", &request.cart_item_id.0, "customizations"]);
        let builder = self.client.put(url).json(&UpdateLinePayload::from(request));
        send_cart_mutation(builder, "update_cart_line_customizations").await
    }

    async fn update_quantity(
        &self,
        cart_item_id: &CartItemId,
        quantity: u32,
    ) -> Result<(), CartError> {
        let builder =
            self.client.patch(self.line_url(cart_item_id)).json(&QuantityPayload { quantity });
        send_cart_mutation(builder, "update_quantity").await
    }

    async fn remove_line(&self, cart_item_id: &CartItemId) -> Result<(), CartError> {
        let builder = self.client.delete(self.line_url(cart_item_id));
        send_cart_mutation(builder, "remove_line").await
    }
}

async fn send_cart_mutation(
    builder: RequestBuilder,
    operation: &'static str,
) -> Result<(), CartError> {
    let response = builder
        .send()
        .await
        .map_err(|error| CartError::Transport(format!("{operation}: {error}")))?;

    let status = response.status();
    debug!(operation, status = %status, "cart endpoint responded");

    let body = response
        .text()
        .await
        .map_err(|error| CartError::Transport(format!("{operation}: {error}")))?;
    classify_cart_response(operation, status, &body)
}

/// Maps a cart endpoint's status and body onto the gateway result. Server
/// errors and timeouts are transport failures the caller may retry; any
/// other non-2xx answer is a rejection carrying the backend's message.
fn classify_cart_response(
    operation: &'static str,
    status: StatusCode,
    body: &str,
) -> Result<(), CartError> {
    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        return Err(CartError::Transport(format!("{operation}: cart endpoint returned {status}")));
    }

    if status == StatusCode::NO_CONTENT {
        return Ok(());
    }

    if !status.is_success() {
        let reason = serde_json::from_str::<CartResponse>(body)
            .ok()
            .and_then(|payload| payload.message)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| format!("cart endpoint returned {status}"));
        return Err(CartError::Rejected { reason });
    }

    let payload: CartResponse = serde_json::from_str(body)
        .map_err(|error| CartError::Decode(format!("{operation}: {error}")))?;
    payload.into_result()
}
