use serde::{Deserialize, Serialize};

use crate::domain::customization::{GroupId, OptionId, Selection};
use crate::domain::product::Product;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CartItemId(pub String);

/// The persisted form of one chosen option, as the cart stores it. Ids carry
/// the `cg_`/`ci_` wire prefixes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineCustomization {
    pub group_id: String,
    pub option_id: String,
    pub name: String,
}

impl CartLineCustomization {
    pub fn new(group_id: &GroupId, option_id: &OptionId, name: impl Into<String>) -> Self {
        Self { group_id: group_id.to_wire(), option_id: option_id.to_wire(), name: name.into() }
    }

    pub fn group_id(&self) -> GroupId {
        GroupId::from_wire(&self.group_id)
    }

    pub fn option_id(&self) -> OptionId {
        OptionId::from_wire(&self.option_id)
    }
}

impl From<&Selection> for CartLineCustomization {
    fn from(selection: &Selection) -> Self {
        Self::new(&selection.group_id, &selection.option_id, selection.name.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub product: Product,
    pub quantity: u32,
    #[serde(default)]
    pub customizations: Vec<CartLineCustomization>,
}
