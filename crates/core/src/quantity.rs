use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::cart::{CartItem, CartItemId};
use crate::session::{SelectionSession, SessionMode};

/// A plain quantity mutation, carried out by
/// [`CartIntegrationAdapter::apply_quantity`](crate::cart::CartIntegrationAdapter::apply_quantity).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuantityCommand {
    SetQuantity { cart_item_id: CartItemId, quantity: u32 },
    /// Quantity reached zero; the line goes away rather than persisting at 0.
    RemoveLine { cart_item_id: CartItemId },
    /// One more unit with the line's current customizations.
    RepeatLine { cart_item: CartItem },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatChoice {
    Repeat,
    ChooseDifferently,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IncrementDecision {
    Apply(QuantityCommand),
    /// Ask the shopper whether to repeat the line or configure a new one.
    PromptRepeat(RepeatPrompt),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepeatPrompt {
    cart_item: CartItem,
}

#[derive(Clone, Debug)]
pub enum IncrementResolution {
    Repeat(QuantityCommand),
    /// A fresh session for a brand-new line; it still has to be loaded.
    Customize(SelectionSession),
}

impl RepeatPrompt {
    pub fn cart_item(&self) -> &CartItem {
        &self.cart_item
    }

    pub fn resolve(self, choice: RepeatChoice) -> IncrementResolution {
        debug!(
            event_name = "quantity.repeat_prompt_resolved",
            cart_item_id = %self.cart_item.id.0,
            choice = ?choice,
            "repeat prompt answered"
        );
        match choice {
            RepeatChoice::Repeat => {
                IncrementResolution::Repeat(QuantityCommand::RepeatLine { cart_item: self.cart_item })
            }
            RepeatChoice::ChooseDifferently => IncrementResolution::Customize(
                SelectionSession::new(self.cart_item.product, SessionMode::add_single()),
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct QuantityChangeController;

impl QuantityChangeController {
    pub fn on_increment(&self, cart_item: &CartItem) -> IncrementDecision {
        if !cart_item.product.requires_customization() {
            return IncrementDecision::Apply(QuantityCommand::SetQuantity {
                cart_item_id: cart_item.id.clone(),
                quantity: cart_item.quantity.saturating_add(1),
            });
        }

        IncrementDecision::PromptRepeat(RepeatPrompt { cart_item: cart_item.clone() })
    }

    pub fn on_decrement(&self, cart_item: &CartItem) -> QuantityCommand {
        match cart_item.quantity.saturating_sub(1) {
            0 => QuantityCommand::RemoveLine { cart_item_id: cart_item.id.clone() },
            quantity => QuantityCommand::SetQuantity { cart_item_id: cart_item.id.clone(), quantity },
        }
    }
}
