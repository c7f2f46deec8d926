use std::sync::Arc;

use rust_decimal::Decimal;
use secrecy::SecretString;

use platter_client::memory::{CartCall, InMemoryCart, StaticCatalogSource};
use platter_client::wire::decode_catalog;
use platter_core::audit::{AuditCategory, AuditContext, AuditOutcome, InMemoryAuditSink};
use platter_core::cart::{CartError, CartIntegrationAdapter};
use platter_core::catalog::Catalog;
use platter_core::domain::cart::CartItem;
use platter_core::domain::customization::{GroupId, OptionId};
use platter_core::domain::product::{CatalogId, Product, ProductSlug, StoreId};
use platter_core::quantity::{
    IncrementDecision, IncrementResolution, QuantityChangeController, QuantityCommand,
    RepeatChoice,
};
use platter_core::session::{
    AdvanceOutcome, FinalizeResolution, SelectionChange, SelectionSession, SessionError,
    SessionMode, SessionPhase,
};

const BURGER_CATALOG: &str = r#"{
  "groups": [
    {
      "id": "cg_size", "name": "Size", "config": { "min": 1, "max": 1 },
      "options": [
        { "id": "ci_regular", "name": "Regular", "price": 0, "is_default": true },
        { "id": "ci_large", "name": "Large", "price": 40 }
      ]
    },
    {
      "id": "cg_combo", "name": "Make it a meal", "config": { "min": 1, "max": 1 },
      "options": [
        { "id": "ci_solo", "name": "Burger only", "price": 0, "is_default": true },
        { "id": "ci_meal", "name": "Meal", "price": 99, "child_group_ids": ["cg_sides"] }
      ]
    },
    {
      "id": "cg_sides", "name": "Sides", "config": { "min": 1, "max": 2 },
      "options": [
        { "id": "ci_fries", "name": "Fries", "price": 0, "is_default": true },
        { "id": "ci_wedges", "name": "Wedges", "price": 20 },
        { "id": "ci_salad", "name": "Salad", "price": 30, "diet_type": "veg" }
      ]
    }
  ]
}"#;

fn gid(id: &str) -> GroupId {
    GroupId::new(id)
}

fn oid(id: &str) -> OptionId {
    OptionId::new(id)
}

fn burger() -> Product {
    Product {
        slug: ProductSlug("classic-burger".to_string()),
        store_id: StoreId("store-7".to_string()),
        catalog_id: CatalogId("cat-1".to_string()),
        name: "Classic Burger".to_string(),
        base_price: Decimal::new(100, 0),
        is_customizable: true,
        linked_group_ids: vec![gid("size"), gid("combo")],
    }
}

fn catalog() -> Catalog {
    decode_catalog(BURGER_CATALOG).expect("fixture catalog decodes")
}

async fn storefront() -> (StaticCatalogSource, CartIntegrationAdapter<InMemoryCart>) {
    let source = StaticCatalogSource::with_catalog(burger().slug, catalog());
    let cart = InMemoryCart::new();
    cart.register_product(burger(), catalog()).await;
    let adapter = CartIntegrationAdapter::new(cart, SecretString::from("shopper-token".to_string()));
    (source, adapter)
}

async fn add_large_meal(
    source: &StaticCatalogSource,
    adapter: &CartIntegrationAdapter<InMemoryCart>,
) -> CartItem {
    let mut session = SelectionSession::new(burger(), SessionMode::add_single());
    session.load(source).await.expect("catalog loads");

    session.select_option(&gid("size"), &oid("large")).expect("size selectable");
    session.select_option(&gid("combo"), &oid("meal")).expect("combo selectable");
    assert!(!session.show_finalize_action(), "meal still reveals sides");

    let outcome = session.advance().expect("step complete");
    assert_eq!(outcome, AdvanceOutcome::Advanced { step: 1, groups: vec![gid("sides")] });
    assert_eq!(
        session.select_option(&gid("sides"), &oid("wedges")),
        Ok(SelectionChange::Added)
    );

    let resolution = adapter.finalize(&mut session).await.expect("line added");
    assert_eq!(resolution, FinalizeResolution::Completed);
    assert_eq!(session.phase(), SessionPhase::Completed);

    let lines = adapter.gateway().lines().await;
    lines.last().cloned().expect("cart holds the new line")
}

#[tokio::test]
async fn new_line_carries_path_ordered_prefixed_customizations() {
    let (source, adapter) = storefront().await;

    let line = add_large_meal(&source, &adapter).await;

    let pairs: Vec<(&str, &str)> = line
        .customizations
        .iter()
        .map(|entry| (entry.group_id.as_str(), entry.option_id.as_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("cg_size", "ci_large"),
            ("cg_combo", "ci_meal"),
            ("cg_sides", "ci_fries"),
            ("cg_sides", "ci_wedges"),
        ]
    );
    assert_eq!(adapter.gateway().line_total(&line.id).await, Some(Decimal::new(259, 0)));
    assert!(matches!(
        adapter.gateway().calls().await.as_slice(),
        [CartCall::AddLine { authenticated: true, quantity: 1, .. }]
    ));
}

#[tokio::test]
async fn failed_update_keeps_selections_and_retry_succeeds() {
    let (source, adapter) = storefront().await;
    let line = add_large_meal(&source, &adapter).await;

    let mode = SessionMode::Edit {
        cart_item_id: line.id.clone(),
        quantity: line.quantity,
        customizations: line.customizations.clone(),
    };
    let mut session = SelectionSession::new(line.product.clone(), mode);
    session.load(&source).await.expect("catalog loads");
    assert!(session.selections().contains(&gid("combo"), &oid("meal")));

    session.advance().expect("restored selections complete step 0");
    assert_eq!(
        session.select_option(&gid("sides"), &oid("wedges")),
        Ok(SelectionChange::Removed)
    );
    let expected_total = Decimal::new(239, 0);
    assert_eq!(session.total_price(), expected_total);

    adapter.gateway().reject_next(CartError::Transport("connection reset".to_string())).await;
    let failure = adapter.finalize(&mut session).await;
    assert_eq!(
        failure,
        Err(SessionError::FinalizeFailed(CartError::Transport("connection reset".to_string())))
    );
    assert_eq!(session.phase(), SessionPhase::Ready);
    assert!(session.can_finalize());
    assert_eq!(session.total_price(), expected_total);

    let retried = adapter.finalize(&mut session).await.expect("retry succeeds");
    assert_eq!(retried, FinalizeResolution::Completed);
    assert_eq!(adapter.gateway().line_total(&line.id).await, Some(expected_total));

    let updates = adapter
        .gateway()
        .calls()
        .await
        .into_iter()
        .filter(|call| matches!(call, CartCall::UpdateCustomizations { .. }))
        .count();
    assert_eq!(updates, 2);
}

#[tokio::test]
async fn repeat_and_choose_differently_take_separate_paths() {
    let (source, adapter) = storefront().await;
    let line = add_large_meal(&source, &adapter).await;
    let controller = QuantityChangeController;

    let IncrementDecision::PromptRepeat(prompt) = controller.on_increment(&line) else {
        panic!("customized product must prompt");
    };
    let IncrementResolution::Repeat(command) = prompt.clone().resolve(RepeatChoice::Repeat) else {
        panic!("repeat resolves to a quantity command");
    };
    adapter.apply_quantity(&command).await.expect("repeat applied");

    let repeated = adapter.gateway().line(&line.id).await.expect("line still present");
    assert_eq!(repeated.quantity, 2);
    assert_eq!(repeated.customizations, line.customizations);
    assert_eq!(adapter.gateway().line_total(&line.id).await, Some(Decimal::new(518, 0)));

    let IncrementResolution::Customize(mut session) =
        prompt.resolve(RepeatChoice::ChooseDifferently)
    else {
        panic!("choose differently opens a fresh session");
    };
    assert_eq!(session.phase(), SessionPhase::Loading);
    session.load(&source).await.expect("catalog loads");
    assert!(session.show_finalize_action(), "defaults reveal nothing further");
    adapter.finalize(&mut session).await.expect("second line added");

    let lines = adapter.gateway().lines().await;
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|item| item.quantity <= 2));
    assert_eq!(adapter.gateway().line(&line.id).await.map(|item| item.quantity), Some(2));
}

#[tokio::test]
async fn decrement_to_zero_removes_the_line_and_is_audited() {
    let (source, adapter) = storefront().await;
    let sink = Arc::new(InMemoryAuditSink::default());
    let adapter = adapter.with_audit(
        sink.clone(),
        AuditContext::new(None, Some("session-1".to_string()), "corr-1", "shopper"),
    );
    let line = add_large_meal(&source, &adapter).await;

    let command = QuantityChangeController.on_decrement(&line);
    assert_eq!(command, QuantityCommand::RemoveLine { cart_item_id: line.id.clone() });
    adapter.apply_quantity(&command).await.expect("line removed");
    assert!(adapter.gateway().lines().await.is_empty());

    let second_removal = adapter.apply_quantity(&command).await;
    assert!(matches!(second_removal, Err(CartError::Rejected { .. })));

    let events = sink.events();
    let kinds: Vec<(&str, AuditOutcome)> =
        events.iter().map(|event| (event.event_type.as_str(), event.outcome.clone())).collect();
    assert_eq!(
        kinds,
        vec![
            ("cart.line_added", AuditOutcome::Success),
            ("session.completed", AuditOutcome::Success),
            ("cart.line_removed", AuditOutcome::Success),
            ("cart.line_removed", AuditOutcome::Rejected),
        ]
    );
    assert_eq!(sink.events_in(AuditCategory::Quantity).len(), 2);
    assert!(events.iter().all(|event| event.correlation_id == "corr-1"));
}

#[tokio::test]
async fn catalog_outage_leaves_session_retryable() {
    let (source, _adapter) = storefront().await;
    source.fail_next(1).await;

    let mut session = SelectionSession::new(burger(), SessionMode::add_single());
    let error = session.load(&source).await.expect_err("first fetch fails");
    assert!(matches!(error, SessionError::CatalogUnavailable { .. }));
    assert_eq!(session.phase(), SessionPhase::Unavailable);

    session.load(&source).await.expect("retry loads");
    assert_eq!(session.phase(), SessionPhase::Ready);
    assert_eq!(session.current_group_ids(), &[gid("size"), gid("combo")]);
    assert!(session.selections().contains(&gid("size"), &oid("regular")));
}
