use std::collections::HashSet;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cart::{AddLineRequest, CartError, FinalizeRequest, UpdateLineRequest};
use crate::catalog::{self, Catalog, CatalogSource, LinkResolution};
use crate::domain::cart::CartLineCustomization;
use crate::domain::customization::{GroupId, OptionId, Selection, Selections};
use crate::domain::product::Product;
use crate::pricing::{self, PriceBreakdown};
use crate::session::states::{
    AdvanceOutcome, FinalizeAction, FinalizeResolution, FinalizeTicket, HistoryFrame,
    PendingFinalize, SelectionChange, SessionMode, SessionPhase, SessionSummary,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("customization catalog for `{product_slug}` is unavailable")]
    CatalogUnavailable { product_slug: String },
    #[error("cannot {action} while the session is {phase:?}")]
    InvalidPhase { phase: SessionPhase, action: &'static str },
    #[error("current step is incomplete; groups below their minimum: {missing:?}")]
    StepIncomplete { missing: Vec<GroupId> },
    #[error("already at the first step")]
    NoPreviousStep,
    #[error("unknown customization group {group}")]
    UnknownGroup { group: GroupId },
    #[error("group {group} is not shown on the current step")]
    GroupNotOnStep { group: GroupId },
    #[error("unknown option {option} in group {group}")]
    UnknownOption { group: GroupId, option: OptionId },
    #[error("finalize is not offered on an intermediate step")]
    FinalizeUnavailable,
    #[error(transparent)]
    FinalizeFailed(#[from] CartError),
}

/// The customization wizard for one product.
///
/// The session walks a linear history of steps. Step 0 shows the product's
/// top-level groups; each [`advance`](Self::advance) shows the groups revealed
/// by the options chosen on the current step. [`retreat`](Self::retreat)
/// moves back one step and restores the selections that were in force when
/// that step was left, so re-advancing without changes lands on the same
/// groups. Re-advancing replaces whatever forward history existed.
#[derive(Clone, Debug)]
pub struct SelectionSession {
    product: Product,
    mode: SessionMode,
    catalog: Option<Catalog>,
    selections: Selections,
    history: Vec<HistoryFrame>,
    step: usize,
    phase: SessionPhase,
    generation: u64,
    in_flight: Option<u64>,
}

impl SelectionSession {
    pub fn new(product: Product, mode: SessionMode) -> Self {
        Self {
            product,
            mode,
            catalog: None,
            selections: Selections::new(),
            history: Vec::new(),
            step: 0,
            phase: SessionPhase::Loading,
            generation: 0,
            in_flight: None,
        }
    }

    /// Builds a ready session from an already loaded catalog.
    pub fn with_catalog(product: Product, mode: SessionMode, catalog: Catalog) -> Self {
        let mut session = Self::new(product, mode);
        session.install(catalog);
        session
    }

    /// Loads the catalog and installs the initial selections. On failure the
    /// session is left `Unavailable` and the load can be retried.
    pub async fn load<S>(&mut self, source: &S) -> Result<(), SessionError>
    where
        S: CatalogSource + ?Sized,
    {
        if !matches!(self.phase, SessionPhase::Loading | SessionPhase::Unavailable) {
            return Err(SessionError::InvalidPhase { phase: self.phase, action: "load" });
        }

        self.phase = SessionPhase::Loading;
        match catalog::load(source, &self.product.slug).await {
            Some(catalog) => {
                self.install(catalog);
                Ok(())
            }
            None => {
                self.phase = SessionPhase::Unavailable;
                Err(SessionError::CatalogUnavailable { product_slug: self.product.slug.0.clone() })
            }
        }
    }

    fn install(&mut self, catalog: Catalog) {
        let mut selections = match &self.mode {
            SessionMode::Edit { customizations, .. } => {
                restore_customizations(&catalog, customizations)
            }
            SessionMode::AddNew { .. } => Selections::new(),
        };

        let top_level = self.product.linked_group_ids.clone();
        let resolution = catalog.resolve_linked_groups(&top_level);
        log_missing_links(&resolution, &self.product);
        install_defaults(&catalog, &mut selections, &resolution.resolved);

        self.selections = selections;
        self.step = 0;
        self.catalog = Some(catalog);
        self.prune_unreachable();
        self.history = vec![HistoryFrame {
            groups: top_level,
            selections_snapshot: self.selections.clone(),
        }];
        self.phase = SessionPhase::Ready;

        info!(
            event_name = "session.ready",
            product_slug = %self.product.slug.0,
            edit = matches!(self.mode, SessionMode::Edit { .. }),
            "customization session ready"
        );
    }

    /// Single-select groups replace their choice; multi-select groups toggle
    /// the option, refusing additions beyond `max`. Only groups on the current
    /// step accept selections. Never moves the step.
    pub fn select_option(
        &mut self,
        group_id: &GroupId,
        option_id: &OptionId,
    ) -> Result<SelectionChange, SessionError> {
        if self.phase != SessionPhase::Ready {
            return Ok(SelectionChange::Ignored { phase: self.phase });
        }
        let catalog = self.catalog.as_ref().ok_or(SessionError::InvalidPhase {
            phase: self.phase,
            action: "select an option",
        })?;

        let group = catalog
            .group(group_id)
            .ok_or_else(|| SessionError::UnknownGroup { group: group_id.clone() })?;
        let option = group.option(option_id).ok_or_else(|| SessionError::UnknownOption {
            group: group_id.clone(),
            option: option_id.clone(),
        })?;
        if !self.current_group_ids().contains(group_id) {
            return Err(SessionError::GroupNotOnStep { group: group_id.clone() });
        }

        let change = if !group.config.is_multi_select() {
            self.selections.replace(group_id, Selection::of(group_id, option));
            SelectionChange::Replaced
        } else if self.selections.contains(group_id, option_id) {
            self.selections.remove(group_id, option_id);
            SelectionChange::Removed
        } else if self.selections.selected_count(group_id) < group.config.max as usize {
            self.selections.push(group_id, Selection::of(group_id, option));
            SelectionChange::Added
        } else {
            SelectionChange::LimitReached
        };
        if matches!(change, SelectionChange::Replaced | SelectionChange::Removed) {
            self.prune_unreachable();
        }

        debug!(
            event_name = "session.option_selected",
            group_id = %group_id,
            option_id = %option_id,
            change = ?change,
            "selection changed"
        );
        Ok(change)
    }

    /// Removes the group from the selection map entirely. Returns whether the
    /// group had been started. Groups off the current step are left alone.
    pub fn clear_group(&mut self, group_id: &GroupId) -> bool {
        if self.phase != SessionPhase::Ready || !self.current_group_ids().contains(group_id) {
            return false;
        }
        let cleared = self.selections.clear_group(group_id);
        self.prune_unreachable();
        cleared
    }

    pub fn current_group_ids(&self) -> &[GroupId] {
        self.history.get(self.step).map(|frame| frame.groups.as_slice()).unwrap_or_default()
    }

    /// Groups on the current step that are below their minimum.
    pub fn missing_groups(&self) -> Vec<GroupId> {
        let Some(catalog) = &self.catalog else {
            return self.current_group_ids().to_vec();
        };

        self.current_group_ids()
            .iter()
            .filter(|group_id| {
                catalog.group(group_id).is_some_and(|group| {
                    self.selections.selected_count(group_id) < group.config.min as usize
                })
            })
            .cloned()
            .collect()
    }

    pub fn is_step_complete(&self) -> bool {
        self.catalog.is_some() && self.missing_groups().is_empty()
    }

    /// Union of child groups of every option selected on the current step,
    /// in first-seen order.
    fn revealed_groups(&self) -> LinkResolution {
        let Some(catalog) = &self.catalog else {
            return LinkResolution::default();
        };

        let children = self
            .current_group_ids()
            .iter()
            .filter_map(|group_id| self.selections.get(group_id))
            .flatten()
            .filter_map(|selection| catalog.option(&selection.group_id, &selection.option_id))
            .flat_map(|option| option.child_group_ids.iter());
        catalog.resolve_linked_groups(children)
    }

    /// Every group the current selections lead to, starting from the
    /// product's top-level groups, breadth first. This is the walked path plus
    /// any deeper groups an edited line already carries choices for.
    fn reachable_groups(&self) -> Vec<GroupId> {
        let Some(catalog) = &self.catalog else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        let mut frontier = catalog.resolve_linked_groups(&self.product.linked_group_ids).resolved;
        while !frontier.is_empty() {
            frontier.retain(|group_id| seen.insert(group_id.clone()));
            let children = frontier
                .iter()
                .filter_map(|group_id| self.selections.get(group_id))
                .flatten()
                .filter_map(|selection| catalog.option(&selection.group_id, &selection.option_id))
                .flat_map(|option| option.child_group_ids.iter());
            let next = catalog.resolve_linked_groups(children).resolved;
            ordered.append(&mut frontier);
            frontier = next;
        }
        ordered
    }

    /// Drops choices in groups the current selections no longer lead to, so
    /// that the price and the cart payload cover the same options.
    fn prune_unreachable(&mut self) {
        let reachable: HashSet<GroupId> = self.reachable_groups().into_iter().collect();
        let dropped = self.selections.retain_groups(|group_id| reachable.contains(group_id));
        if !dropped.is_empty() {
            debug!(
                event_name = "session.selections_pruned",
                groups = ?dropped,
                "dropped choices for groups that are no longer reachable"
            );
        }
    }

    /// Groups the next step would show with the current selections.
    pub fn pending_child_groups(&self) -> Vec<GroupId> {
        self.revealed_groups().resolved
    }

    /// Whether any option on the current step can reveal further groups.
    pub fn has_child_groups(&self) -> bool {
        let Some(catalog) = &self.catalog else {
            return false;
        };
        self.current_group_ids()
            .iter()
            .filter_map(|group_id| catalog.group(group_id))
            .any(|group| group.has_child_groups())
    }

    /// Whether the Add/Update control should be shown on this step. It is
    /// hidden on intermediate steps, i.e. steps whose selections still lead
    /// somewhere and that are not the deepest step reached.
    pub fn show_finalize_action(&self) -> bool {
        let deepest = self.step > 0 && self.step + 1 == self.history.len();
        !self.has_child_groups() || deepest || self.pending_child_groups().is_empty()
    }

    /// Shown and enabled: ready, complete, and not already submitting.
    pub fn can_finalize(&self) -> bool {
        self.phase == SessionPhase::Ready && self.is_step_complete() && self.show_finalize_action()
    }

    pub fn advance(&mut self) -> Result<AdvanceOutcome, SessionError> {
        self.ensure_ready("advance")?;

        let missing = self.missing_groups();
        if !missing.is_empty() {
            return Err(SessionError::StepIncomplete { missing });
        }

        let resolution = self.revealed_groups();
        log_missing_links(&resolution, &self.product);
        let next_groups = resolution.resolved;
        if next_groups.is_empty() {
            return Ok(AdvanceOutcome::Terminal);
        }

        let Some(catalog) = self.catalog.as_ref() else {
            return Err(SessionError::InvalidPhase { phase: self.phase, action: "advance" });
        };

        if let Some(frame) = self.history.get_mut(self.step) {
            frame.selections_snapshot = self.selections.clone();
        }
        install_defaults(catalog, &mut self.selections, &next_groups);

        self.history.truncate(self.step + 1);
        self.history.push(HistoryFrame {
            groups: next_groups.clone(),
            selections_snapshot: self.selections.clone(),
        });
        self.step += 1;

        debug!(
            event_name = "session.advanced",
            step = self.step,
            groups = ?next_groups,
            "moved to next customization step"
        );
        Ok(AdvanceOutcome::Advanced { step: self.step, groups: next_groups })
    }

    pub fn retreat(&mut self) -> Result<(), SessionError> {
        self.ensure_ready("retreat")?;
        if self.step == 0 {
            return Err(SessionError::NoPreviousStep);
        }

        let previous = self.step - 1;
        if let Some(frame) = self.history.get(previous) {
            self.selections = frame.selections_snapshot.clone();
        }
        self.step = previous;

        debug!(event_name = "session.retreated", step = self.step, "moved to previous step");
        Ok(())
    }

    pub fn finalize_action(&self) -> FinalizeAction {
        match self.mode {
            SessionMode::AddNew { .. } => FinalizeAction::Add,
            SessionMode::Edit { .. } => FinalizeAction::Update,
        }
    }

    /// Every priced selection in cart form, ordered along the path from the
    /// top-level groups.
    pub fn customizations(&self) -> Vec<CartLineCustomization> {
        self.reachable_groups()
            .iter()
            .filter_map(|group_id| self.selections.get(group_id))
            .flatten()
            .map(CartLineCustomization::from)
            .collect()
    }

    pub fn total_price(&self) -> Decimal {
        match &self.catalog {
            Some(catalog) => {
                pricing::total_price(self.product.base_price, &self.selections, catalog)
            }
            None => self.product.base_price,
        }
    }

    pub fn price_breakdown(&self) -> PriceBreakdown {
        let empty = Catalog::default();
        let catalog = self.catalog.as_ref().unwrap_or(&empty);
        pricing::price_with_breakdown(self.product.base_price, &self.selections, catalog)
    }

    /// Moves to `Finalizing` and hands back the cart request to submit. While
    /// finalizing, selection and navigation are inert and a second call is
    /// rejected.
    pub fn begin_finalize(&mut self) -> Result<PendingFinalize, SessionError> {
        self.ensure_ready("finalize")?;

        let missing = self.missing_groups();
        if !missing.is_empty() {
            return Err(SessionError::StepIncomplete { missing });
        }
        if !self.show_finalize_action() {
            return Err(SessionError::FinalizeUnavailable);
        }

        let request = self.finalize_request();
        self.generation += 1;
        self.in_flight = Some(self.generation);
        self.phase = SessionPhase::Finalizing;

        Ok(PendingFinalize { ticket: FinalizeTicket { generation: self.generation }, request })
    }

    fn finalize_request(&self) -> FinalizeRequest {
        let customizations = self.customizations();
        match &self.mode {
            SessionMode::AddNew { quantity } => FinalizeRequest::AddLine(AddLineRequest {
                store_id: self.product.store_id.clone(),
                product_slug: self.product.slug.clone(),
                catalog_id: self.product.catalog_id.clone(),
                quantity: *quantity,
                is_customizable: true,
                customizations,
            }),
            SessionMode::Edit { cart_item_id, quantity, .. } => {
                FinalizeRequest::UpdateLine(UpdateLineRequest {
                    cart_item_id: cart_item_id.clone(),
                    quantity: *quantity,
                    product_slug: self.product.slug.clone(),
                    base_price: self.product.base_price,
                    customizations,
                })
            }
        }
    }

    /// Applies the result of a finalize call. Results for a closed session or
    /// for a superseded ticket are dropped.
    pub fn resolve_finalize(
        &mut self,
        ticket: FinalizeTicket,
        outcome: &Result<(), CartError>,
    ) -> FinalizeResolution {
        if self.phase != SessionPhase::Finalizing || self.in_flight != Some(ticket.generation) {
            debug!(
                event_name = "session.finalize_result_ignored",
                phase = ?self.phase,
                "finalize result arrived for an inactive session"
            );
            return FinalizeResolution::Ignored;
        }

        self.in_flight = None;
        match outcome {
            Ok(()) => {
                self.phase = SessionPhase::Completed;
                info!(
                    event_name = "session.completed",
                    product_slug = %self.product.slug.0,
                    action = self.finalize_action().label(),
                    "customization finalized"
                );
                FinalizeResolution::Completed
            }
            Err(error) => {
                self.phase = SessionPhase::Ready;
                warn!(
                    event_name = "session.finalize_failed",
                    product_slug = %self.product.slug.0,
                    error = %error,
                    "finalize failed; session reopened with selections intact"
                );
                FinalizeResolution::Reopened
            }
        }
    }

    /// Cancels the wizard and discards its state.
    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
        self.in_flight = None;
        self.selections.clear();
        self.history.clear();
        self.step = 0;
        self.catalog = None;
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            phase: self.phase,
            step: self.step,
            history_len: self.history.len(),
            current_group_ids: self.current_group_ids().to_vec(),
            selections: self.selections.clone(),
            step_complete: self.is_step_complete(),
            has_child_groups: self.has_child_groups(),
            show_finalize_action: self.show_finalize_action(),
            finalize_action: self.finalize_action(),
            total_price: self.total_price(),
            customizations: self.customizations(),
        }
    }

    pub fn product(&self) -> &Product {
        &self.product
    }

    pub fn mode(&self) -> &SessionMode {
        &self.mode
    }

    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.as_ref()
    }

    pub fn selections(&self) -> &Selections {
        &self.selections
    }

    pub fn history(&self) -> &[HistoryFrame] {
        &self.history
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    fn ensure_ready(&self, action: &'static str) -> Result<(), SessionError> {
        if self.phase == SessionPhase::Ready {
            Ok(())
        } else {
            Err(SessionError::InvalidPhase { phase: self.phase, action })
        }
    }
}

/// Installs each group's default option unless the group already has a
/// non-empty selection.
fn install_defaults(catalog: &Catalog, selections: &mut Selections, group_ids: &[GroupId]) {
    for group_id in group_ids {
        if selections.has_selection(group_id) {
            continue;
        }
        let Some(default) = catalog.group(group_id).and_then(|group| group.default_option())
        else {
            continue;
        };
        selections.replace(group_id, Selection::of(group_id, default));
    }
}

fn restore_customizations(
    catalog: &Catalog,
    customizations: &[CartLineCustomization],
) -> Selections {
    let mut selections = Selections::new();

    for entry in customizations {
        let group_id = entry.group_id();
        let option_id = entry.option_id();
        let Some(group) = catalog.group(&group_id) else {
            warn!(
                event_name = "session.stale_customization",
                group_id = %group_id,
                "existing customization references a group missing from the catalog"
            );
            continue;
        };
        let Some(option) = group.option(&option_id) else {
            warn!(
                event_name = "session.stale_customization",
                group_id = %group_id,
                option_id = %option_id,
                "existing customization references an option missing from the catalog"
            );
            continue;
        };

        if !group.config.is_multi_select() {
            selections.replace(&group_id, Selection::of(&group_id, option));
        } else if !selections.contains(&group_id, &option_id)
            && selections.selected_count(&group_id) < group.config.max as usize
        {
            selections.push(&group_id, Selection::of(&group_id, option));
        }
    }

    selections
}

fn log_missing_links(resolution: &LinkResolution, product: &Product) {
    for group_id in &resolution.missing {
        warn!(
            event_name = "session.missing_linkage",
            product_slug = %product.slug.0,
            group_id = %group_id,
            "linked group is absent from the catalog; treating it as empty"
        );
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use super::{SelectionSession, SessionError};
    use crate::cart::{CartError, FinalizeRequest};
    use crate::catalog::fixtures::{burger_catalog, group, option, product};
    use crate::catalog::{Catalog, CatalogSource};
    use crate::domain::cart::{CartItemId, CartLineCustomization};
    use crate::domain::customization::{GroupId, OptionId};
    use crate::domain::product::ProductSlug;
    use crate::session::states::{
        AdvanceOutcome, FinalizeAction, FinalizeResolution, SelectionChange, SessionMode,
        SessionPhase,
    };

    fn gid(id: &str) -> GroupId {
        GroupId::new(id)
    }

    fn oid(id: &str) -> OptionId {
        OptionId::new(id)
    }

    fn selected(session: &SelectionSession, group: &str) -> Vec<String> {
        session
            .selections()
            .get(&gid(group))
            .map(|entries| entries.iter().map(|entry| entry.option_id.0.clone()).collect())
            .unwrap_or_default()
    }

    fn burger_session() -> SelectionSession {
        SelectionSession::with_catalog(
            product(&["size", "combo"]),
            SessionMode::add_single(),
            burger_catalog(),
        )
    }

    #[test]
    fn single_level_product_can_finalize_immediately() {
        let catalog = Catalog::new(vec![group(
            "size",
            1,
            1,
            vec![option("a", 0, true, &[]), option("b", 500, false, &[])],
        )])
        .expect("catalog");
        let session =
            SelectionSession::with_catalog(product(&["size"]), SessionMode::add_single(), catalog);

        assert_eq!(selected(&session, "size"), vec!["a"]);
        assert!(session.is_step_complete());
        assert!(!session.has_child_groups());
        assert!(session.show_finalize_action());
        assert_eq!(session.step(), 0);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn initial_frame_holds_top_level_groups() {
        let session = burger_session();

        assert_eq!(session.phase(), SessionPhase::Ready);
        assert_eq!(session.current_group_ids(), &[gid("size"), gid("combo")]);
        assert_eq!(session.history()[0].groups, vec![gid("size"), gid("combo")]);
        assert_eq!(selected(&session, "size"), vec!["regular"]);
        assert_eq!(selected(&session, "combo"), vec!["solo"]);
    }

    #[test]
    fn single_select_replaces_and_never_empties() {
        let mut session = burger_session();

        for option_id in ["large", "large", "regular", "large"] {
            let change = session.select_option(&gid("size"), &oid(option_id)).expect("select");
            assert_eq!(change, SelectionChange::Replaced);
            assert_eq!(session.selections().selected_count(&gid("size")), 1);
        }
        assert_eq!(selected(&session, "size"), vec!["large"]);
    }

    #[test]
    fn multi_select_toggles_and_respects_max() {
        let mut session = burger_session();
        session.select_option(&gid("combo"), &oid("meal")).expect("meal");
        session.advance().expect("advance to sides");
        assert_eq!(selected(&session, "sides"), vec!["fries"]);

        let added = session.select_option(&gid("sides"), &oid("wedges")).expect("wedges");
        assert_eq!(added, SelectionChange::Added);
        let blocked = session.select_option(&gid("sides"), &oid("salad")).expect("salad");
        assert_eq!(blocked, SelectionChange::LimitReached);
        assert_eq!(selected(&session, "sides"), vec!["fries", "wedges"]);

        let removed = session.select_option(&gid("sides"), &oid("fries")).expect("fries");
        assert_eq!(removed, SelectionChange::Removed);
        assert_eq!(selected(&session, "sides"), vec!["wedges"]);
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let mut session = burger_session();

        assert!(matches!(
            session.select_option(&gid("nope"), &oid("x")),
            Err(SessionError::UnknownGroup { .. })
        ));
        assert!(matches!(
            session.select_option(&gid("size"), &oid("huge")),
            Err(SessionError::UnknownOption { .. })
        ));
    }

    #[test]
    fn clearing_a_required_group_blocks_the_step() {
        let mut session = burger_session();

        assert!(session.clear_group(&gid("size")));
        assert!(session.selections().get(&gid("size")).is_none());
        assert!(!session.is_step_complete());
        assert_eq!(session.missing_groups(), vec![gid("size")]);
        assert!(matches!(session.advance(), Err(SessionError::StepIncomplete { .. })));
        assert!(matches!(session.begin_finalize(), Err(SessionError::StepIncomplete { .. })));
        assert_eq!(session.total_price(), Decimal::new(10_000, 2));
    }

    #[test]
    fn advance_reveals_child_groups_and_skips_missing_links() {
        let mut session = burger_session();
        session.select_option(&gid("combo"), &oid("meal")).expect("meal");

        let outcome = session.advance().expect("advance");
        assert_eq!(
            outcome,
            AdvanceOutcome::Advanced { step: 1, groups: vec![gid("sides"), gid("drinks")] }
        );
        assert_eq!(session.step(), 1);
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.current_group_ids(), &[gid("sides"), gid("drinks")]);
        assert!(session.selections().get(&gid("drinks")).is_none());
    }

    #[test]
    fn advance_without_children_is_terminal() {
        let mut session = burger_session();

        assert_eq!(session.advance().expect("advance"), AdvanceOutcome::Terminal);
        assert_eq!(session.step(), 0);
        assert_eq!(session.history().len(), 1);
        assert!(session.show_finalize_action());
    }

    #[test]
    fn two_level_scenario_reaches_second_step() {
        let catalog = Catalog::new(vec![
            group("g1", 1, 1, vec![option("x", 0, false, &["g2"]), option("y", 0, false, &[])]),
            group(
                "g2",
                1,
                2,
                vec![option("p", 0, false, &[]), option("q", 0, false, &[])],
            ),
        ])
        .expect("catalog");
        let mut session =
            SelectionSession::with_catalog(product(&["g1"]), SessionMode::add_single(), catalog);

        assert!(!session.is_step_complete());
        assert!(session.has_child_groups());
        session.select_option(&gid("g1"), &oid("x")).expect("x");
        assert!(!session.show_finalize_action());

        session.advance().expect("advance");
        assert_eq!(session.current_group_ids(), &[gid("g2")]);
        assert_eq!(session.step(), 1);
        assert_eq!(session.history().len(), 2);
        assert!(session.show_finalize_action());
        assert!(!session.is_step_complete());
    }

    #[test]
    fn retreat_then_advance_reproduces_the_same_groups() {
        let mut session = burger_session();
        session.select_option(&gid("size"), &oid("large")).expect("large");
        session.select_option(&gid("combo"), &oid("meal")).expect("meal");
        session.advance().expect("advance");
        let before = session.current_group_ids().to_vec();

        session.retreat().expect("retreat");
        assert_eq!(session.step(), 0);
        assert_eq!(session.history().len(), 2);
        assert_eq!(selected(&session, "combo"), vec!["meal"]);
        assert_eq!(selected(&session, "size"), vec!["large"]);
        assert!(session.selections().get(&gid("sides")).is_none());

        session.advance().expect("re-advance");
        assert_eq!(session.current_group_ids(), before.as_slice());
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn re_advancing_with_new_choices_overwrites_forward_history() {
        let mut session = burger_session();
        session.select_option(&gid("combo"), &oid("meal")).expect("meal");
        session.advance().expect("to sides/drinks");
        session.select_option(&gid("drinks"), &oid("cola")).expect("cola");
        session.advance().expect("to ice");
        assert_eq!(session.history().len(), 3);

        session.retreat().expect("back to sides/drinks");
        session.retreat().expect("back to start");
        assert_eq!(session.history().len(), 3);
        assert!(!session.show_finalize_action());

        session.select_option(&gid("combo"), &oid("solo")).expect("solo");
        assert_eq!(session.advance().expect("advance"), AdvanceOutcome::Terminal);

        session.select_option(&gid("combo"), &oid("meal")).expect("meal again");
        session.advance().expect("advance");
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.current_group_ids(), &[gid("sides"), gid("drinks")]);
        assert!(session.show_finalize_action());
    }

    #[test]
    fn retreat_at_first_step_is_rejected() {
        let mut session = burger_session();
        assert_eq!(session.retreat(), Err(SessionError::NoPreviousStep));
    }

    #[test]
    fn price_tracks_every_selection_change() {
        let mut session = burger_session();
        assert_eq!(session.total_price(), Decimal::new(10_000, 2));

        session.select_option(&gid("size"), &oid("large")).expect("large");
        session.select_option(&gid("combo"), &oid("meal")).expect("meal");
        assert_eq!(session.total_price(), Decimal::new(23_900, 2));

        session.advance().expect("advance");
        session.select_option(&gid("sides"), &oid("salad")).expect("salad");
        assert_eq!(session.total_price(), Decimal::new(26_900, 2));

        session.retreat().expect("retreat");
        assert_eq!(session.total_price(), Decimal::new(23_900, 2));
        assert_eq!(session.price_breakdown().total, session.total_price());
    }

    #[test]
    fn edit_mode_restores_existing_customizations() {
        let customizations = vec![
            CartLineCustomization::new(&gid("size"), &oid("large"), "Large"),
            CartLineCustomization::new(&gid("combo"), &oid("meal"), "Meal"),
            CartLineCustomization::new(&gid("sides"), &oid("salad"), "Salad"),
            CartLineCustomization::new(&gid("sides"), &oid("retired"), "Retired"),
        ];
        let mut session = SelectionSession::with_catalog(
            product(&["size", "combo"]),
            SessionMode::Edit {
                cart_item_id: CartItemId("line-1".to_owned()),
                quantity: 2,
                customizations,
            },
            burger_catalog(),
        );

        assert_eq!(selected(&session, "size"), vec!["large"]);
        assert_eq!(selected(&session, "combo"), vec!["meal"]);
        assert_eq!(session.finalize_action(), FinalizeAction::Update);

        session.advance().expect("advance");
        assert_eq!(selected(&session, "sides"), vec!["salad"]);
    }

    #[test]
    fn hiding_a_branch_drops_its_choices_from_price_and_payload() {
        let customizations = vec![
            CartLineCustomization::new(&gid("size"), &oid("large"), "Large"),
            CartLineCustomization::new(&gid("combo"), &oid("meal"), "Meal"),
            CartLineCustomization::new(&gid("sides"), &oid("salad"), "Salad"),
        ];
        let mut session = SelectionSession::with_catalog(
            product(&["size", "combo"]),
            SessionMode::Edit {
                cart_item_id: CartItemId("line-1".to_owned()),
                quantity: 1,
                customizations,
            },
            burger_catalog(),
        );
        assert_eq!(session.total_price(), Decimal::new(26_900, 2));
        assert_eq!(session.customizations().len(), 3);

        session.select_option(&gid("combo"), &oid("solo")).expect("solo");
        assert!(session.selections().get(&gid("sides")).is_none());

        let pending = session.begin_finalize().expect("finalize");
        let FinalizeRequest::UpdateLine(request) = &pending.request else {
            panic!("expected an update-line request");
        };
        let ids: Vec<&str> =
            request.customizations.iter().map(|entry| entry.option_id.as_str()).collect();
        assert_eq!(ids, vec!["ci_large", "ci_solo"]);
        assert_eq!(session.total_price(), Decimal::new(14_000, 2));
        assert_eq!(session.price_breakdown().lines.len(), request.customizations.len());
    }

    #[test]
    fn restored_choices_for_unreachable_groups_are_not_kept() {
        let customizations = vec![
            CartLineCustomization::new(&gid("combo"), &oid("solo"), "Solo"),
            CartLineCustomization::new(&gid("sides"), &oid("salad"), "Salad"),
        ];
        let session = SelectionSession::with_catalog(
            product(&["size", "combo"]),
            SessionMode::Edit {
                cart_item_id: CartItemId("line-1".to_owned()),
                quantity: 1,
                customizations,
            },
            burger_catalog(),
        );

        assert!(session.selections().get(&gid("sides")).is_none());
        assert_eq!(session.total_price(), Decimal::new(10_000, 2));
    }

    #[test]
    fn groups_off_the_current_step_cannot_be_changed() {
        let mut session = burger_session();

        assert_eq!(
            session.select_option(&gid("sides"), &oid("salad")),
            Err(SessionError::GroupNotOnStep { group: gid("sides") })
        );
        assert!(session.selections().get(&gid("sides")).is_none());
        assert_eq!(session.total_price(), Decimal::new(10_000, 2));

        session.select_option(&gid("combo"), &oid("meal")).expect("meal");
        session.advance().expect("advance");
        assert_eq!(
            session.select_option(&gid("size"), &oid("large")),
            Err(SessionError::GroupNotOnStep { group: gid("size") })
        );
        assert!(!session.clear_group(&gid("combo")));
        assert_eq!(selected(&session, "combo"), vec!["meal"]);
    }

    #[test]
    fn edit_mode_falls_back_to_defaults_for_uncovered_groups() {
        let customizations = vec![CartLineCustomization::new(&gid("size"), &oid("large"), "Large")];
        let session = SelectionSession::with_catalog(
            product(&["size", "combo"]),
            SessionMode::Edit {
                cart_item_id: CartItemId("line-1".to_owned()),
                quantity: 1,
                customizations,
            },
            burger_catalog(),
        );

        assert_eq!(selected(&session, "size"), vec!["large"]);
        assert_eq!(selected(&session, "combo"), vec!["solo"]);
    }

    #[test]
    fn finalize_builds_prefixed_add_request_and_blocks_double_submit() {
        let mut session = burger_session();
        session.select_option(&gid("combo"), &oid("meal")).expect("meal");
        session.advance().expect("advance");

        let pending = session.begin_finalize().expect("finalize");
        let FinalizeRequest::AddLine(request) = &pending.request else {
            panic!("expected an add-line request");
        };
        assert_eq!(request.quantity, 1);
        assert!(request.is_customizable);
        let ids: Vec<(&str, &str)> = request
            .customizations
            .iter()
            .map(|entry| (entry.group_id.as_str(), entry.option_id.as_str()))
            .collect();
        assert_eq!(
            ids,
            vec![("cg_size", "ci_regular"), ("cg_combo", "ci_meal"), ("cg_sides", "ci_fries")]
        );

        assert_eq!(session.phase(), SessionPhase::Finalizing);
        assert!(!session.can_finalize());
        assert!(matches!(session.begin_finalize(), Err(SessionError::InvalidPhase { .. })));
        assert!(matches!(
            session.select_option(&gid("sides"), &oid("wedges")),
            Ok(SelectionChange::Ignored { phase: SessionPhase::Finalizing })
        ));
        assert!(matches!(session.retreat(), Err(SessionError::InvalidPhase { .. })));

        let resolution = session.resolve_finalize(pending.ticket, &Ok(()));
        assert_eq!(resolution, FinalizeResolution::Completed);
        assert_eq!(session.phase(), SessionPhase::Completed);
    }

    #[test]
    fn finalize_is_not_offered_on_intermediate_steps() {
        let mut session = burger_session();
        session.select_option(&gid("combo"), &oid("meal")).expect("meal");

        assert!(session.is_step_complete());
        assert!(!session.show_finalize_action());
        assert_eq!(session.begin_finalize(), Err(SessionError::FinalizeUnavailable));
    }

    #[test]
    fn failed_finalize_reopens_with_selections_intact() {
        let mut session = burger_session();
        session.select_option(&gid("size"), &oid("large")).expect("large");
        let before = session.selections().clone();

        let pending = session.begin_finalize().expect("finalize");
        let failure = Err(CartError::Rejected { reason: "store closed".to_owned() });
        assert_eq!(session.resolve_finalize(pending.ticket, &failure), FinalizeResolution::Reopened);

        assert_eq!(session.phase(), SessionPhase::Ready);
        assert_eq!(session.selections(), &before);
        assert!(session.can_finalize());

        let retry = session.begin_finalize().expect("retry");
        assert_eq!(session.resolve_finalize(retry.ticket, &Ok(())), FinalizeResolution::Completed);
    }

    #[test]
    fn late_results_are_ignored_after_close() {
        let mut session = burger_session();
        let pending = session.begin_finalize().expect("finalize");

        session.close();
        assert_eq!(session.resolve_finalize(pending.ticket, &Ok(())), FinalizeResolution::Ignored);
        assert_eq!(session.phase(), SessionPhase::Closed);
        assert!(session.selections().is_empty());
        assert!(session.current_group_ids().is_empty());
    }

    #[test]
    fn stale_tickets_are_ignored() {
        let mut session = burger_session();
        let first = session.begin_finalize().expect("first");
        let failure = Err(CartError::Transport("timeout".to_owned()));
        session.resolve_finalize(first.ticket, &failure);

        let _second = session.begin_finalize().expect("second");
        assert_eq!(session.resolve_finalize(first.ticket, &Ok(())), FinalizeResolution::Ignored);
        assert_eq!(session.phase(), SessionPhase::Finalizing);
    }

    struct FlakySource {
        catalog: std::sync::Mutex<Option<Catalog>>,
    }

    #[async_trait]
    impl CatalogSource for FlakySource {
        async fn fetch_customizations(&self, _product_slug: &ProductSlug) -> Option<Catalog> {
            match self.catalog.lock() {
                Ok(mut slot) => slot.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            }
        }
    }

    #[tokio::test]
    async fn failed_load_leaves_session_unavailable_and_retryable() {
        let source = FlakySource { catalog: std::sync::Mutex::new(None) };
        let mut session = SelectionSession::new(product(&["size"]), SessionMode::add_single());
        assert_eq!(session.phase(), SessionPhase::Loading);

        let error = session.load(&source).await.expect_err("load should fail");
        assert!(matches!(error, SessionError::CatalogUnavailable { .. }));
        assert_eq!(session.phase(), SessionPhase::Unavailable);
        assert!(!session.is_step_complete());
        assert!(matches!(
            session.select_option(&gid("size"), &oid("regular")),
            Ok(SelectionChange::Ignored { phase: SessionPhase::Unavailable })
        ));

        if let Ok(mut slot) = source.catalog.lock() {
            *slot = Some(burger_catalog());
        }
        session.load(&source).await.expect("retry load");
        assert_eq!(session.phase(), SessionPhase::Ready);
        assert_eq!(selected(&session, "size"), vec!["regular"]);
    }
}
