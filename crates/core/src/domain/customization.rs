use std::collections::btree_map::{self, BTreeMap};
use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::cart::CartLineCustomization;

/// Prefix the catalog and the cart use to address a group on the wire.
pub const GROUP_WIRE_PREFIX: &str = "cg_";
/// Prefix the catalog and the cart use to address an option on the wire.
pub const OPTION_WIRE_PREFIX: &str = "ci_";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Accepts both `cg_<id>` and a bare id.
    pub fn from_wire(raw: &str) -> Self {
        Self(raw.strip_prefix(GROUP_WIRE_PREFIX).unwrap_or(raw).to_owned())
    }

    pub fn to_wire(&self) -> String {
        format!("{GROUP_WIRE_PREFIX}{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionId(pub String);

impl OptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Accepts both `ci_<id>` and a bare id.
    pub fn from_wire(raw: &str) -> Self {
        Self(raw.strip_prefix(OPTION_WIRE_PREFIX).unwrap_or(raw).to_owned())
    }

    pub fn to_wire(&self) -> String {
        format!("{OPTION_WIRE_PREFIX}{}", self.0)
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display-only dietary marker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DietType {
    #[default]
    Veg,
    #[serde(alias = "non-veg", alias = "nonveg")]
    NonVeg,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomizationOption {
    pub id: OptionId,
    pub name: String,
    pub price: Decimal,
    pub diet_type: DietType,
    pub is_default: bool,
    /// Groups revealed on the next step when this option is chosen.
    pub child_group_ids: Vec<GroupId>,
}

impl CustomizationOption {
    pub fn reveals_groups(&self) -> bool {
        !self.child_group_ids.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub min: u32,
    pub max: u32,
}

impl GroupConfig {
    pub fn is_multi_select(&self) -> bool {
        self.max > 1
    }
}

/// A named set of options. Options keep catalog order for iteration and are
/// indexed by id for lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomizationGroup {
    pub id: GroupId,
    pub name: String,
    pub config: GroupConfig,
    option_order: Vec<OptionId>,
    options: HashMap<OptionId, CustomizationOption>,
}

impl CustomizationGroup {
    /// Builds a group without validating its constraints; see
    /// [`crate::catalog::Catalog::new`] for the checked path.
    pub(crate) fn assemble(
        id: GroupId,
        name: String,
        config: GroupConfig,
        option_order: Vec<OptionId>,
        options: HashMap<OptionId, CustomizationOption>,
    ) -> Self {
        Self { id, name, config, option_order, options }
    }

    pub fn option(&self, option_id: &OptionId) -> Option<&CustomizationOption> {
        self.options.get(option_id)
    }

    /// Options in catalog order.
    pub fn options(&self) -> impl Iterator<Item = &CustomizationOption> + '_ {
        self.option_order.iter().filter_map(|id| self.options.get(id))
    }

    /// First option flagged as default, by catalog order.
    pub fn default_option(&self) -> Option<&CustomizationOption> {
        self.options().find(|option| option.is_default)
    }

    pub fn has_child_groups(&self) -> bool {
        self.options().any(CustomizationOption::reveals_groups)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub group_id: GroupId,
    pub option_id: OptionId,
    pub name: String,
}

impl Selection {
    pub fn of(group_id: &GroupId, option: &CustomizationOption) -> Self {
        Self { group_id: group_id.clone(), option_id: option.id.clone(), name: option.name.clone() }
    }
}

/// The running choice set: group id to the options chosen in it, in the
/// order they were chosen. A group that is absent has not been started; a
/// group mapped to an empty list was started and emptied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selections(BTreeMap<GroupId, Vec<Selection>>);

impl Selections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, group_id: &GroupId) -> Option<&[Selection]> {
        self.0.get(group_id).map(Vec::as_slice)
    }

    pub fn selected_count(&self, group_id: &GroupId) -> usize {
        self.0.get(group_id).map_or(0, Vec::len)
    }

    pub fn has_selection(&self, group_id: &GroupId) -> bool {
        self.selected_count(group_id) > 0
    }

    pub fn contains(&self, group_id: &GroupId, option_id: &OptionId) -> bool {
        self.0
            .get(group_id)
            .is_some_and(|selected| selected.iter().any(|entry| &entry.option_id == option_id))
    }

    pub fn replace(&mut self, group_id: &GroupId, selection: Selection) {
        self.0.insert(group_id.clone(), vec![selection]);
    }

    pub fn push(&mut self, group_id: &GroupId, selection: Selection) {
        self.0.entry(group_id.clone()).or_default().push(selection);
    }

    /// Removes one option from a group, leaving the group present (possibly
    /// empty). Returns whether anything was removed.
    pub fn remove(&mut self, group_id: &GroupId, option_id: &OptionId) -> bool {
        let Some(selected) = self.0.get_mut(group_id) else {
            return false;
        };
        let before = selected.len();
        selected.retain(|entry| &entry.option_id != option_id);
        selected.len() != before
    }

    /// Drops the group key entirely.
    pub fn clear_group(&mut self, group_id: &GroupId) -> bool {
        self.0.remove(group_id).is_some()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Drops every group `keep` rejects and returns the dropped ids.
    pub fn retain_groups<F>(&mut self, mut keep: F) -> Vec<GroupId>
    where
        F: FnMut(&GroupId) -> bool,
    {
        let dropped: Vec<GroupId> =
            self.0.keys().filter(|group_id| !keep(group_id)).cloned().collect();
        for group_id in &dropped {
            self.0.remove(group_id);
        }
        dropped
    }

    pub fn iter(&self) -> btree_map::Iter<'_, GroupId, Vec<Selection>> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    /// Every selection across all groups.
    pub fn all(&self) -> impl Iterator<Item = &Selection> + '_ {
        self.0.values().flatten()
    }

    /// Rebuilds a selection map from persisted cart customizations, stripping
    /// the wire prefixes. Catalog membership is not checked here.
    pub fn from_cart_customizations(customizations: &[CartLineCustomization]) -> Self {
        let mut selections = Self::new();
        for entry in customizations {
            let group_id = entry.group_id();
            let option_id = entry.option_id();
            if selections.contains(&group_id, &option_id) {
                continue;
            }
            selections.push(
                &group_id,
                Selection { group_id: group_id.clone(), option_id, name: entry.name.clone() },
            );
        }
        selections
    }
}
