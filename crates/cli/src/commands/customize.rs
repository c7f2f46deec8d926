use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use platter_client::memory::{InMemoryCart, StaticCatalogSource};
use platter_client::wire::decode_catalog;
use platter_core::audit::{AuditContext, InMemoryAuditSink};
use platter_core::cart::CartIntegrationAdapter;
use platter_core::catalog::Catalog;
use platter_core::config::{AppConfig, LoadOptions};
use platter_core::domain::cart::CartItem;
use platter_core::domain::customization::{GroupId, OptionId};
use platter_core::domain::product::{Product, StoreId};
use platter_core::errors::ApplicationError;
use platter_core::session::{SelectionSession, SessionError, SessionMode, SessionPhase};

use crate::commands::CommandResult;

const COMMAND: &str = "customize";

#[derive(Debug, Clone, Args)]
pub struct CustomizeArgs {
    #[arg(long, help = "Customization catalog in storefront wire format (JSON)")]
    pub catalog: PathBuf,
    #[arg(long, help = "Product definition (JSON)")]
    pub product: PathBuf,
    #[arg(long, help = "Actions to replay, as a JSON array")]
    pub script: Option<PathBuf>,
    #[arg(long, help = "Existing cart line (JSON) to edit instead of adding a new one")]
    pub edit: Option<PathBuf>,
}

/// One scripted shopper action. Group and option ids may carry their wire
/// prefixes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptAction {
    Select { group: String, option: String },
    Clear { group: String },
    Advance,
    Retreat,
    Finalize,
    Close,
}

#[derive(Debug, Serialize)]
struct StepRecord {
    action: ScriptAction,
    outcome: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<String>,
}

struct Fixtures {
    product: Product,
    catalog: Catalog,
    editing: Option<CartItem>,
    script: Vec<ScriptAction>,
}

pub fn run(args: &CustomizeArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            let error = ApplicationError::from(error);
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2);
        }
    };

    let fixtures = match load_fixtures(args) {
        Ok(fixtures) => fixtures,
        Err(error) => {
            return CommandResult::failure(COMMAND, "fixture_validation", format!("{error:#}"), 2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    match runtime.block_on(replay(&config, fixtures)) {
        Ok(report) => CommandResult::success(COMMAND, "customization session replayed", report),
        Err(error) => CommandResult::failure(COMMAND, "catalog_unavailable", error.to_string(), 3),
    }
}

fn load_fixtures(args: &CustomizeArgs) -> Result<Fixtures> {
    let catalog = decode_catalog(&read(&args.catalog)?)
        .with_context(|| format!("invalid catalog `{}`", args.catalog.display()))?;
    let product: Product = serde_json::from_str(&read(&args.product)?)
        .with_context(|| format!("invalid product `{}`", args.product.display()))?;

    let editing = match &args.edit {
        Some(path) => Some(
            serde_json::from_str::<CartItem>(&read(path)?)
                .with_context(|| format!("invalid cart line `{}`", path.display()))?,
        ),
        None => None,
    };

    let script = match &args.script {
        Some(path) => serde_json::from_str::<Vec<ScriptAction>>(&read(path)?)
            .with_context(|| format!("invalid script `{}`", path.display()))?,
        None => Vec::new(),
    };

    Ok(Fixtures { product, catalog, editing, script })
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("could not read `{}`", path.display()))
}

async fn replay(config: &AppConfig, fixtures: Fixtures) -> Result<Value, SessionError> {
    let Fixtures { product, catalog, editing, script } = fixtures;

    let source = StaticCatalogSource::with_catalog(product.slug.clone(), catalog.clone());
    let cart = InMemoryCart::new();
    cart.register_product(product.clone(), catalog).await;

    let mode = match &editing {
        Some(line) => {
            cart.insert_line(line.clone()).await;
            SessionMode::Edit {
                cart_item_id: line.id.clone(),
                quantity: line.quantity,
                customizations: line.customizations.clone(),
            }
        }
        None => SessionMode::add_single(),
    };

    let audit = Arc::new(InMemoryAuditSink::default());
    let context = AuditContext::new(
        editing.as_ref().map(|line| line.id.clone()),
        None,
        "cli-customize",
        "platter-cli",
    );
    let adapter = CartIntegrationAdapter::new(cart, config.api.auth_token.clone())
        .with_default_store(StoreId(config.storefront.store_id.clone()))
        .with_audit(audit.clone(), context);

    let mut session = SelectionSession::new(product, mode);
    session.load(&source).await?;

    let mut steps = Vec::with_capacity(script.len());
    for action in script {
        let (outcome, notice) = match apply(&mut session, &adapter, &action).await {
            Ok(outcome) => (outcome, None),
            Err(error) => {
                let detail = error.to_string();
                let notice = ApplicationError::from(error).into_interface("cli-customize");
                (json!({ "error": detail }), Some(notice.user_message().to_string()))
            }
        };
        steps.push(StepRecord { action, outcome, notice });
    }

    let gateway = adapter.gateway();
    let mut cart_lines = Vec::new();
    for line in gateway.lines().await {
        let total = gateway.line_total(&line.id).await;
        cart_lines.push(json!({ "line": line, "line_total": total }));
    }
    let audit_events: Vec<String> =
        audit.events().into_iter().map(|event| event.event_type).collect();

    Ok(json!({
        "currency": config.storefront.currency,
        "summary": session.summary(),
        "price_breakdown": session.price_breakdown(),
        "steps": steps,
        "cart": cart_lines,
        "audit_events": audit_events,
    }))
}

async fn apply(
    session: &mut SelectionSession,
    adapter: &CartIntegrationAdapter<InMemoryCart>,
    action: &ScriptAction,
) -> Result<Value, SessionError> {
    let outcome = match action {
        ScriptAction::Select { group, option } => {
            let change =
                session.select_option(&GroupId::from_wire(group), &OptionId::from_wire(option))?;
            json!(change)
        }
        ScriptAction::Clear { group } => {
            json!({ "cleared": session.clear_group(&GroupId::from_wire(group)) })
        }
        ScriptAction::Advance => json!(session.advance()?),
        ScriptAction::Retreat => {
            session.retreat()?;
            json!({ "step": session.step() })
        }
        ScriptAction::Finalize => json!(adapter.finalize(session).await?),
        ScriptAction::Close => {
            session.close();
            json!({ "phase": SessionPhase::Closed })
        }
    };
    Ok(outcome)
}
