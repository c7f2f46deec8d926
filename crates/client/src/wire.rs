use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use platter_core::cart::{AddLineRequest, CartError, UpdateLineRequest};
use platter_core::catalog::{Catalog, CatalogError, GroupDefinition};
use platter_core::domain::cart::CartLineCustomization;
use platter_core::domain::customization::{
    CustomizationOption, DietType, GroupConfig, GroupId, OptionId,
};

#[derive(Debug, Error)]
pub enum WireDecodeError {
    #[error("catalog payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("catalog payload is inconsistent: {0}")]
    Catalog(#[from] CatalogError),
}

/// Customization schema as the storefront API serves it. Group and option
/// ids carry their `cg_`/`ci_` prefixes here and nowhere else.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCatalog {
    #[serde(default)]
    pub groups: Vec<WireGroup>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireGroup {
    pub id: String,
    pub name: String,
    pub config: WireGroupConfig,
    #[serde(default)]
    pub options: Vec<WireOption>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireGroupConfig {
    pub min: u32,
    pub max: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireOption {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub diet_type: DietType,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub child_group_ids: Vec<String>,
}

impl WireCatalog {
    pub fn into_catalog(self) -> Result<Catalog, CatalogError> {
        let definitions = self.groups.into_iter().map(WireGroup::into_definition).collect();
        Catalog::new(definitions)
    }
}

impl WireGroup {
    fn into_definition(self) -> GroupDefinition {
        GroupDefinition {
            id: GroupId::from_wire(&self.id),
            name: self.name,
            config: GroupConfig { min: self.config.min, max: self.config.max },
            options: self.options.into_iter().map(WireOption::into_option).collect(),
        }
    }
}

impl WireOption {
    fn into_option(self) -> CustomizationOption {
        CustomizationOption {
            id: OptionId::from_wire(&self.id),
            name: self.name,
            price: self.price,
            diet_type: self.diet_type,
            is_default: self.is_default,
            child_group_ids: self.child_group_ids.iter().map(|id| GroupId::from_wire(id)).collect(),
        }
    }
}

pub fn decode_catalog(raw: &str) -> Result<Catalog, WireDecodeError> {
    let wire: WireCatalog = serde_json::from_str(raw)?;
    Ok(wire.into_catalog()?)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLinePayload {
    pub store_id: String,
    pub product_slug: String,
    pub catalog_id: String,
    pub quantity: u32,
    pub is_customizable: bool,
    pub customizations: Vec<CartLineCustomization>,
}

impl From<&AddLineRequest> for AddLinePayload {
    fn from(request: &AddLineRequest) -> Self {
        Self {
            store_id: request.store_id.0.clone(),
            product_slug: request.product_slug.0.clone(),
            catalog_id: request.catalog_id.0.clone(),
            quantity: request.quantity,
            is_customizable: request.is_customizable,
            customizations: request.customizations.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLinePayload {
    pub quantity: u32,
    pub product_slug: String,
    pub base_price: Decimal,
    pub customizations: Vec<CartLineCustomization>,
}

impl From<&UpdateLineRequest> for UpdateLinePayload {
    fn from(request: &UpdateLineRequest) -> Self {
        Self {
            quantity: request.quantity,
            product_slug: request.product_slug.0.clone(),
            base_price: request.base_price,
            customizations: request.customizations.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityPayload {
    pub quantity: u32,
}

/// Envelope every cart mutation answers with.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl CartResponse {
    pub fn into_result(self) -> Result<(), CartError> {
        if self.success {
            return Ok(());
        }
        let reason = self
            .message
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| "cart reported failure".to_string());
        Err(CartError::Rejected { reason })
    }
}
