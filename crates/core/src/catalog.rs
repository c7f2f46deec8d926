use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::customization::{
    CustomizationGroup, CustomizationOption, GroupConfig, GroupId, OptionId,
};
use crate::domain::product::ProductSlug;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("group {group} is defined more than once")]
    DuplicateGroup { group: GroupId },
    #[error("option {option} is defined more than once in group {group}")]
    DuplicateOption { group: GroupId, option: OptionId },
    #[error("group {group} allows no selections (max = 0)")]
    ZeroMax { group: GroupId },
    #[error("group {group} requires {min} selections but allows only {max}")]
    MinExceedsMax { group: GroupId, min: u32, max: u32 },
    #[error("group {group} allows {max} selections but only has {options} options")]
    MaxExceedsOptions { group: GroupId, max: u32, options: usize },
}

/// Unchecked group definition handed to [`Catalog::new`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupDefinition {
    pub id: GroupId,
    pub name: String,
    pub config: GroupConfig,
    pub options: Vec<CustomizationOption>,
}

/// Customization schema for one product: groups by id, options by id within
/// each group. Read-only once built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Catalog {
    groups: HashMap<GroupId, CustomizationGroup>,
}

impl Catalog {
    /// Validates every group and rejects the schema as a whole on the first
    /// violation.
    pub fn new(definitions: Vec<GroupDefinition>) -> Result<Self, CatalogError> {
        let mut groups = HashMap::with_capacity(definitions.len());

        for definition in definitions {
            let group = build_group(definition)?;
            if groups.contains_key(&group.id) {
                return Err(CatalogError::DuplicateGroup { group: group.id });
            }
            groups.insert(group.id.clone(), group);
        }

        Ok(Self { groups })
    }

    pub fn group(&self, group_id: &GroupId) -> Option<&CustomizationGroup> {
        self.groups.get(group_id)
    }

    pub fn option(&self, group_id: &GroupId, option_id: &OptionId) -> Option<&CustomizationOption> {
        self.groups.get(group_id).and_then(|group| group.option(option_id))
    }

    pub fn contains_group(&self, group_id: &GroupId) -> bool {
        self.groups.contains_key(group_id)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Splits linked group ids into those the catalog defines and those it
    /// does not, deduplicated and in first-seen order.
    pub fn resolve_linked_groups<'a, I>(&self, group_ids: I) -> LinkResolution
    where
        I: IntoIterator<Item = &'a GroupId>,
    {
        let mut seen = HashSet::new();
        let mut resolution = LinkResolution::default();
        for group_id in group_ids {
            if !seen.insert(group_id.clone()) {
                continue;
            }
            if self.contains_group(group_id) {
                resolution.resolved.push(group_id.clone());
            } else {
                resolution.missing.push(group_id.clone());
            }
        }
        resolution
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkResolution {
    pub resolved: Vec<GroupId>,
    /// Links to groups the catalog does not define; callers treat these as
    /// contributing nothing.
    pub missing: Vec<GroupId>,
}

fn build_group(definition: GroupDefinition) -> Result<CustomizationGroup, CatalogError> {
    let GroupDefinition { id, name, config, options } = definition;

    let mut option_order = Vec::with_capacity(options.len());
    let mut by_id = HashMap::with_capacity(options.len());
    for mut option in options {
        if by_id.contains_key(&option.id) {
            return Err(CatalogError::DuplicateOption { group: id, option: option.id });
        }
        option.child_group_ids = dedup_in_order(option.child_group_ids);
        option_order.push(option.id.clone());
        by_id.insert(option.id.clone(), option);
    }

    if config.max == 0 {
        return Err(CatalogError::ZeroMax { group: id });
    }
    if config.min > config.max {
        return Err(CatalogError::MinExceedsMax { group: id, min: config.min, max: config.max });
    }
    if config.max as usize > option_order.len() {
        return Err(CatalogError::MaxExceedsOptions {
            group: id,
            max: config.max,
            options: option_order.len(),
        });
    }

    Ok(CustomizationGroup::assemble(id, name, config, option_order, by_id))
}

fn dedup_in_order(ids: Vec<GroupId>) -> Vec<GroupId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Read side of the storefront API: the customization schema for a product.
/// Implementations return `None` on any failure.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_customizations(&self, product_slug: &ProductSlug) -> Option<Catalog>;
}

/// Loads the schema for one product. A missing or empty schema comes back as
/// `None` and the caller renders an empty state.
pub async fn load<S>(source: &S, product_slug: &ProductSlug) -> Option<Catalog>
where
    S: CatalogSource + ?Sized,
{
    match source.fetch_customizations(product_slug).await {
        Some(catalog) if !catalog.is_empty() => {
            info!(
                event_name = "catalog.loaded",
                product_slug = %product_slug.0,
                group_count = catalog.len(),
                "customization catalog loaded"
            );
            Some(catalog)
        }
        Some(_) => {
            warn!(
                event_name = "catalog.empty",
                product_slug = %product_slug.0,
                "customization catalog contained no groups"
            );
            None
        }
        None => {
            warn!(
                event_name = "catalog.load_failed",
                product_slug = %product_slug.0,
                "customization catalog could not be loaded"
            );
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use rust_decimal::Decimal;

    use super::{Catalog, GroupDefinition};
    use crate::domain::customization::{
        CustomizationOption, DietType, GroupConfig, GroupId, OptionId,
    };
    use crate::domain::product::{CatalogId, Product, ProductSlug, StoreId};

    pub fn option(id: &str, price: i64, is_default: bool, children: &[&str]) -> CustomizationOption {
        CustomizationOption {
            id: OptionId::new(id),
            name: format!("Option {id}"),
            price: Decimal::new(price, 2),
            diet_type: DietType::Veg,
            is_default,
            child_group_ids: children.iter().map(|child| GroupId::new(*child)).collect(),
        }
    }

    pub fn group(id: &str, min: u32, max: u32, options: Vec<CustomizationOption>) -> GroupDefinition {
        GroupDefinition {
            id: GroupId::new(id),
            name: format!("Group {id}"),
            config: GroupConfig { min, max },
            options,
        }
    }

    pub fn product(groups: &[&str]) -> Product {
        Product {
            slug: ProductSlug("classic-burger".to_owned()),
            store_id: StoreId("store-7".to_owned()),
            catalog_id: CatalogId("cat-1".to_owned()),
            name: "Classic Burger".to_owned(),
            base_price: Decimal::new(10_000, 2),
            is_customizable: true,
            linked_group_ids: groups.iter().map(|id| GroupId::new(*id)).collect(),
        }
    }

    /// Size (single, required) -> Combo (X reveals Sides and Drinks) -> Sides (multi).
    pub fn burger_catalog() -> Catalog {
        Catalog::new(vec![
            group(
                "size",
                1,
                1,
                vec![option("regular", 0, true, &[]), option("large", 4_000, false, &[])],
            ),
            group(
                "combo",
                1,
                1,
                vec![
                    option("solo", 0, true, &[]),
                    option("meal", 9_900, false, &["sides", "drinks", "ghost"]),
                ],
            ),
            group(
                "sides",
                1,
                2,
                vec![
                    option("fries", 0, true, &[]),
                    option("wedges", 2_000, false, &[]),
                    option("salad", 3_000, false, &[]),
                ],
            ),
            group(
                "drinks",
                0,
                1,
                vec![option("cola", 0, false, &["ice"]), option("water", 0, false, &[])],
            ),
            group("ice", 1, 1, vec![option("no-ice", 0, true, &[]), option("extra-ice", 0, false, &[])]),
        ])
        .expect("fixture catalog is valid")
    }
}
