use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::cart::{CartItem, CartItemId, CartLineCustomization};
use crate::domain::product::{CatalogId, ProductSlug, StoreId};
use crate::quantity::QuantityCommand;
use crate::session::{FinalizeResolution, SelectionSession, SessionError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("cart rejected the request: {reason}")]
    Rejected { reason: String },
    #[error("cart request failed: {0}")]
    Transport(String),
    #[error("cart response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLineRequest {
    pub store_id: StoreId,
    pub product_slug: ProductSlug,
    pub catalog_id: CatalogId,
    pub quantity: u32,
    pub is_customizable: bool,
    pub customizations: Vec<CartLineCustomization>,
}

/// Reconfigures an existing line. Carries the base price rather than a
/// total: the backend recomputes the line total from the customizations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLineRequest {
    pub cart_item_id: CartItemId,
    pub quantity: u32,
    pub product_slug: ProductSlug,
    pub base_price: Decimal,
    pub customizations: Vec<CartLineCustomization>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinalizeRequest {
    AddLine(AddLineRequest),
    UpdateLine(UpdateLineRequest),
}

/// Write side of the storefront API. A backend that answers "not
/// successful" maps to [`CartError::Rejected`]. Callers may retry; nothing
/// here retries on its own.
#[async_trait]
pub trait CartGateway: Send + Sync {
    async fn add_cart_line(
        &self,
        request: &AddLineRequest,
        auth_token: &SecretString,
    ) -> Result<(), CartError>;

    async fn update_cart_line_customizations(
        &self,
        request: &UpdateLineRequest,
    ) -> Result<(), CartError>;

    async fn update_quantity(&self, cart_item_id: &CartItemId, quantity: u32)
        -> Result<(), CartError>;

    async fn remove_line(&self, cart_item_id: &CartItemId) -> Result<(), CartError>;
}

struct AuditHook {
    sink: Arc<dyn AuditSink>,
    context: AuditContext,
}

/// Turns finished sessions and quantity commands into cart mutations.
pub struct CartIntegrationAdapter<G> {
    gateway: G,
    auth_token: SecretString,
    default_store: Option<StoreId>,
    audit: Option<AuditHook>,
}

impl<G> CartIntegrationAdapter<G>
where
    G: CartGateway,
{
    pub fn new(gateway: G, auth_token: SecretString) -> Self {
        Self { gateway, auth_token, default_store: None, audit: None }
    }

    /// Store used for new lines whose product does not name one.
    pub fn with_default_store(mut self, store_id: StoreId) -> Self {
        if !store_id.0.trim().is_empty() {
            self.default_store = Some(store_id);
        }
        self
    }

    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>, context: AuditContext) -> Self {
        self.audit = Some(AuditHook { sink, context });
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// New customized line; also used when the shopper picks "choose
    /// differently" on a quantity increment.
    pub async fn add_new_line(&self, request: &AddLineRequest) -> Result<(), CartError> {
        let request = self.with_store(request);
        let result = self.gateway.add_cart_line(&request, &self.auth_token).await;
        self.record("cart.line_added", AuditCategory::Cart, None, &result, |event| {
            event
                .with_metadata("store_id", request.store_id.0.clone())
                .with_metadata("product_slug", request.product_slug.0.clone())
                .with_metadata("quantity", request.quantity.to_string())
                .with_metadata("customizations", request.customizations.len().to_string())
        });
        result
    }

    pub async fn update_line(&self, request: &UpdateLineRequest) -> Result<(), CartError> {
        let result = self.gateway.update_cart_line_customizations(request).await;
        let line = Some(&request.cart_item_id);
        self.record("cart.line_updated", AuditCategory::Cart, line, &result, |event| {
            event
                .with_metadata("product_slug", request.product_slug.0.clone())
                .with_metadata("quantity", request.quantity.to_string())
                .with_metadata("customizations", request.customizations.len().to_string())
        });
        result
    }

    /// One more unit of the line exactly as configured. No customization
    /// payload is sent.
    pub async fn repeat_line(&self, cart_item: &CartItem) -> Result<(), CartError> {
        let quantity = cart_item.quantity.saturating_add(1);
        let result = self.gateway.update_quantity(&cart_item.id, quantity).await;
        let line = Some(&cart_item.id);
        self.record("cart.line_repeated", AuditCategory::Quantity, line, &result, |event| {
            event.with_metadata("quantity", quantity.to_string())
        });
        result
    }

    pub async fn submit(&self, request: &FinalizeRequest) -> Result<(), CartError> {
        match request {
            FinalizeRequest::AddLine(request) => self.add_new_line(request).await,
            FinalizeRequest::UpdateLine(request) => self.update_line(request).await,
        }
    }

    /// Begins, submits and resolves a finalize in one go. On a cart failure
    /// the session is reopened and the error is returned.
    pub async fn finalize(
        &self,
        session: &mut SelectionSession,
    ) -> Result<FinalizeResolution, SessionError> {
        let pending = session.begin_finalize()?;
        let result = self.submit(&pending.request).await;
        let resolution = session.resolve_finalize(pending.ticket, &result);
        self.record_session(session, resolution, &result);
        result?;
        Ok(resolution)
    }

    pub async fn apply_quantity(&self, command: &QuantityCommand) -> Result<(), CartError> {
        match command {
            QuantityCommand::SetQuantity { cart_item_id, quantity } => {
                let result = self.gateway.update_quantity(cart_item_id, *quantity).await;
                let line = Some(cart_item_id);
                let event_type = "cart.quantity_updated";
                self.record(event_type, AuditCategory::Quantity, line, &result, |event| {
                    event.with_metadata("quantity", quantity.to_string())
                });
                result
            }
            QuantityCommand::RemoveLine { cart_item_id } => {
                let result = self.gateway.remove_line(cart_item_id).await;
                let line = Some(cart_item_id);
                self.record("cart.line_removed", AuditCategory::Quantity, line, &result, |e| e);
                result
            }
            QuantityCommand::RepeatLine { cart_item } => self.repeat_line(cart_item).await,
        }
    }

    fn with_store<'a>(&self, request: &'a AddLineRequest) -> Cow<'a, AddLineRequest> {
        match &self.default_store {
            Some(store_id) if request.store_id.0.trim().is_empty() => {
                Cow::Owned(AddLineRequest { store_id: store_id.clone(), ..request.clone() })
            }
            _ => Cow::Borrowed(request),
        }
    }

    fn record_session(
        &self,
        session: &SelectionSession,
        resolution: FinalizeResolution,
        result: &Result<(), CartError>,
    ) {
        let Some(hook) = &self.audit else {
            return;
        };
        let event_type = match resolution {
            FinalizeResolution::Completed => "session.completed",
            FinalizeResolution::Reopened => "session.reopened",
            FinalizeResolution::Ignored => return,
        };
        let event = hook
            .context
            .event(event_type, AuditCategory::Session, AuditOutcome::of(result))
            .with_metadata("product_slug", session.product().slug.0.clone())
            .with_metadata("action", session.finalize_action().label())
            .with_metadata("total_price", session.total_price().to_string());
        hook.sink.emit(event);
    }

    fn record<F>(
        &self,
        event_type: &'static str,
        category: AuditCategory,
        cart_item_id: Option<&CartItemId>,
        result: &Result<(), CartError>,
        decorate: F,
    ) where
        F: FnOnce(AuditEvent) -> AuditEvent,
    {
        let item = cart_item_id.map(|id| id.0.as_str()).unwrap_or("new");
        match result {
            Ok(()) => info!(event_name = event_type, cart_item_id = item, "cart mutation applied"),
            Err(error) => warn!(
                event_name = event_type,
                cart_item_id = item,
                error = %error,
                "cart mutation failed"
            ),
        }

        let Some(hook) = &self.audit else {
            return;
        };
        let mut event = hook
            .context
            .event(event_type, category, AuditOutcome::of(result))
            .for_line(cart_item_id);
        if let Err(error) = result {
            event = event.with_metadata("error", error.to_string());
        }
        hook.sink.emit(decorate(event));
    }
}
