use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cart::FinalizeRequest;
use crate::domain::cart::{CartItemId, CartLineCustomization};
use crate::domain::customization::{GroupId, Selections};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Loading,
    /// The catalog could not be loaded; the wizard shows an empty state and
    /// may retry the load.
    Unavailable,
    Ready,
    Finalizing,
    Completed,
    Closed,
}

/// One wizard step: the groups shown and the selections in force for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFrame {
    pub groups: Vec<GroupId>,
    pub selections_snapshot: Selections,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionMode {
    /// Configure a brand-new cart line.
    AddNew { quantity: u32 },
    /// Reconfigure a line that is already in the cart.
    Edit { cart_item_id: CartItemId, quantity: u32, customizations: Vec<CartLineCustomization> },
}

impl SessionMode {
    pub fn add_single() -> Self {
        Self::AddNew { quantity: 1 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionChange {
    Replaced,
    Added,
    Removed,
    /// Multi-select group already holds `max` options.
    LimitReached,
    /// The session is not accepting edits in this phase.
    Ignored { phase: SessionPhase },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceOutcome {
    Advanced { step: usize, groups: Vec<GroupId> },
    /// The current selections reveal no further groups.
    Terminal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeAction {
    Add,
    Update,
}

impl FinalizeAction {
    pub fn label(self) -> &'static str {
        match self {
            Self::Add => "Add",
            Self::Update => "Update",
        }
    }
}

/// Identifies one in-flight finalize call so that a late or superseded
/// result can be told apart from the current one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FinalizeTicket {
    pub(crate) generation: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PendingFinalize {
    pub ticket: FinalizeTicket,
    pub request: FinalizeRequest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeResolution {
    Completed,
    /// The cart call failed; selections are intact and finalize is enabled
    /// again.
    Reopened,
    /// The session was closed or the ticket is stale.
    Ignored,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub phase: SessionPhase,
    pub step: usize,
    pub history_len: usize,
    pub current_group_ids: Vec<GroupId>,
    pub selections: Selections,
    pub step_complete: bool,
    pub has_child_groups: bool,
    pub show_finalize_action: bool,
    pub finalize_action: FinalizeAction,
    pub total_price: Decimal,
    pub customizations: Vec<CartLineCustomization>,
}
