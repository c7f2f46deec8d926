pub mod audit;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod pricing;
pub mod quantity;
pub mod session;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use cart::{
    AddLineRequest, CartError, CartGateway, CartIntegrationAdapter, FinalizeRequest,
    UpdateLineRequest,
};
pub use catalog::{Catalog, CatalogError, CatalogSource, GroupDefinition, LinkResolution};
pub use domain::cart::{CartItem, CartItemId, CartLineCustomization};
pub use domain::customization::{
    CustomizationGroup, CustomizationOption, DietType, GroupConfig, GroupId, OptionId, Selection,
    Selections,
};
pub use domain::product::{CatalogId, Product, ProductSlug, StoreId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use pricing::{PriceBreakdown, PriceLine};
pub use quantity::{
    IncrementDecision, IncrementResolution, QuantityChangeController, QuantityCommand,
    RepeatChoice, RepeatPrompt,
};
pub use session::{
    AdvanceOutcome, FinalizeAction, FinalizeResolution, FinalizeTicket, HistoryFrame,
    PendingFinalize, SelectionChange, SelectionSession, SessionError, SessionMode, SessionPhase,
    SessionSummary,
};
