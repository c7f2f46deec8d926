use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customization::GroupId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductSlug(pub String);

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogId(pub String);

/// A storefront product as the cart and the customization wizard see it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub slug: ProductSlug,
    /// Empty when the product comes without one; the configured store is
    /// used for new lines then.
    #[serde(default)]
    pub store_id: StoreId,
    pub catalog_id: CatalogId,
    pub name: String,
    pub base_price: Decimal,
    #[serde(default)]
    pub is_customizable: bool,
    /// Top-level customization groups attached directly to the product.
    #[serde(default)]
    pub linked_group_ids: Vec<GroupId>,
}

impl Product {
    pub fn has_linked_groups(&self) -> bool {
        !self.linked_group_ids.is_empty()
    }

    /// True when quantity changes on a cart line of this product must go
    /// through the repeat-or-customize prompt.
    pub fn requires_customization(&self) -> bool {
        self.is_customizable && self.has_linked_groups()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{CatalogId, Product, ProductSlug, StoreId};
    use crate::domain::customization::GroupId;

    fn product(is_customizable: bool, groups: &[&str]) -> Product {
        Product {
            slug: ProductSlug("classic-burger".to_owned()),
            store_id: StoreId("store-7".to_owned()),
            catalog_id: CatalogId("cat-1".to_owned()),
            name: "Classic Burger".to_owned(),
            base_price: Decimal::new(14_900, 2),
            is_customizable,
            linked_group_ids: groups.iter().map(|id| GroupId::new(*id)).collect(),
        }
    }

    #[test]
    fn customization_requires_flag_and_linked_groups() {
        assert!(product(true, &["10"]).requires_customization());
        assert!(!product(true, &[]).requires_customization());
        assert!(!product(false, &["10"]).requires_customization());
    }

    #[test]
    fn missing_optional_fields_deserialize_as_plain_product() {
        let raw = r#"{
            "slug": "cola",
            "store_id": "store-7",
            "catalog_id": "cat-2",
            "name": "Cola",
            "base_price": "2.50"
        }"#;

        let product: Product = serde_json::from_str(raw).expect("product json");
        assert!(!product.is_customizable);
        assert!(product.linked_group_ids.is_empty());
        assert_eq!(product.base_price, Decimal::new(250, 2));
    }
}
