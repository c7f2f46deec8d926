use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cart::CartError;
use crate::domain::cart::CartItemId;

/// What part of the storefront flow produced an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    /// A customization session finished or was reopened after a cart failure.
    Session,
    /// A line was added or reconfigured from a session.
    Cart,
    /// A stepper change on an existing line: set, repeat or remove.
    Quantity,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

impl AuditOutcome {
    pub fn of(result: &Result<(), CartError>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(CartError::Rejected { .. }) => Self::Rejected,
            Err(_) => Self::Failed,
        }
    }
}

/// Who is acting and on which line; stamped onto every event built from it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub cart_item_id: Option<CartItemId>,
    pub session_id: Option<String>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        cart_item_id: Option<CartItemId>,
        session_id: Option<String>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            cart_item_id,
            session_id,
            correlation_id: correlation_id.into(),
            actor: actor.into(),
        }
    }

    pub fn event(
        &self,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> AuditEvent {
        AuditEvent {
            event_id: Uuid::new_v4().to_string(),
            cart_item_id: self.cart_item_id.clone(),
            session_id: self.session_id.clone(),
            correlation_id: self.correlation_id.clone(),
            event_type: event_type.into(),
            category,
            actor: self.actor.clone(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub cart_item_id: Option<CartItemId>,
    pub session_id: Option<String>,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Pins the event to a specific line, overriding the context's line.
    pub fn for_line(mut self, cart_item_id: Option<&CartItemId>) -> Self {
        if let Some(id) = cart_item_id {
            self.cart_item_id = Some(id.clone());
        }
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events_in(&self, category: AuditCategory) -> Vec<AuditEvent> {
        self.events().into_iter().filter(|event| event.category == category).collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
