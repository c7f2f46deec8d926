use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;

use platter_core::cart::{AddLineRequest, CartError, CartGateway, UpdateLineRequest};
use platter_core::catalog::{Catalog, CatalogSource};
use platter_core::domain::cart::{CartItem, CartItemId, CartLineCustomization};
use platter_core::domain::customization::Selections;
use platter_core::domain::product::{Product, ProductSlug, StoreId};
use platter_core::pricing::total_price;

/// Serves catalogs from memory. `fail_next` makes the next fetches answer
/// `None`, the way a flaky network would.
#[derive(Default)]
pub struct StaticCatalogSource {
    catalogs: RwLock<HashMap<ProductSlug, Catalog>>,
    failures_remaining: RwLock<usize>,
    fetches: RwLock<usize>,
}

impl StaticCatalogSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(product_slug: ProductSlug, catalog: Catalog) -> Self {
        let mut catalogs = HashMap::new();
        catalogs.insert(product_slug, catalog);
        Self { catalogs: RwLock::new(catalogs), ..Self::default() }
    }

    pub async fn insert(&self, product_slug: ProductSlug, catalog: Catalog) {
        self.catalogs.write().await.insert(product_slug, catalog);
    }

    pub async fn fail_next(&self, count: usize) {
        *self.failures_remaining.write().await = count;
    }

    pub async fn fetch_count(&self) -> usize {
        *self.fetches.read().await
    }
}

#[async_trait]
impl CatalogSource for StaticCatalogSource {
    async fn fetch_customizations(&self, product_slug: &ProductSlug) -> Option<Catalog> {
        *self.fetches.write().await += 1;

        {
            let mut failures = self.failures_remaining.write().await;
            if *failures > 0 {
                *failures -= 1;
                return None;
            }
        }

        self.catalogs.read().await.get(product_slug).cloned()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CartCall {
    AddLine {
        store_id: StoreId,
        product_slug: ProductSlug,
        quantity: u32,
        authenticated: bool,
        customizations: Vec<CartLineCustomization>,
    },
    UpdateCustomizations {
        cart_item_id: CartItemId,
        quantity: u32,
        base_price: Decimal,
        customizations: Vec<CartLineCustomization>,
    },
    UpdateQuantity {
        cart_item_id: CartItemId,
        quantity: u32,
    },
    RemoveLine {
        cart_item_id: CartItemId,
    },
}

#[derive(Default)]
struct CartState {
    lines: BTreeMap<CartItemId, CartItem>,
    menu: HashMap<ProductSlug, (Product, Catalog)>,
    next_line: u64,
    calls: Vec<CartCall>,
    rejections: VecDeque<CartError>,
}

impl CartState {
    fn unit_price(
        &self,
        product: &Product,
        base_price: Decimal,
        customizations: &[CartLineCustomization],
    ) -> Decimal {
        match self.menu.get(&product.slug) {
            Some((_, catalog)) => {
                let selections = Selections::from_cart_customizations(customizations);
                total_price(base_price, &selections, catalog)
            }
            None => base_price,
        }
    }

    fn take_rejection(&mut self) -> Result<(), CartError> {
        match self.rejections.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// A cart that lives in memory and recomputes line totals from the
/// customizations it stores, the way the storefront backend does.
#[derive(Default)]
pub struct InMemoryCart {
    state: RwLock<CartState>,
}

impl InMemoryCart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a product orderable. Add requests for unknown products are
    /// rejected.
    pub async fn register_product(&self, product: Product, catalog: Catalog) {
        let mut state = self.state.write().await;
        state.menu.insert(product.slug.clone(), (product, catalog));
    }

    pub async fn insert_line(&self, item: CartItem) {
        let mut state = self.state.write().await;
        state.lines.insert(item.id.clone(), item);
    }

    /// Queues a failure for the next mutation, whatever it is.
    pub async fn reject_next(&self, error: CartError) {
        self.state.write().await.rejections.push_back(error);
    }

    pub async fn lines(&self) -> Vec<CartItem> {
        self.state.read().await.lines.values().cloned().collect()
    }

    pub async fn line(&self, cart_item_id: &CartItemId) -> Option<CartItem> {
        self.state.read().await.lines.get(cart_item_id).cloned()
    }

    pub async fn line_total(&self, cart_item_id: &CartItemId) -> Option<Decimal> {
        let state = self.state.read().await;
        let item = state.lines.get(cart_item_id)?;
        let unit = state.unit_price(&item.product, item.product.base_price, &item.customizations);
        Some(unit * Decimal::from(item.quantity))
    }

    pub async fn calls(&self) -> Vec<CartCall> {
        self.state.read().await.calls.clone()
    }
}

#[async_trait]
impl CartGateway for InMemoryCart {
    async fn add_cart_line(
        &self,
        request: &AddLineRequest,
        auth_token: &SecretString,
    ) -> Result<(), CartError> {
        let mut state = self.state.write().await;
        state.calls.push(CartCall::AddLine {
            store_id: request.store_id.clone(),
            product_slug: request.product_slug.clone(),
            quantity: request.quantity,
            authenticated: !auth_token.expose_secret().is_empty(),
            customizations: request.customizations.clone(),
        });
        state.take_rejection()?;

        let Some((product, _)) = state.menu.get(&request.product_slug) else {
            return Err(CartError::Rejected {
                reason: format!("unknown product `{}`", request.product_slug.0),
            });
        };
        let product = Product { store_id: request.store_id.clone(), ..product.clone() };

        state.next_line += 1;
        let id = CartItemId(format!("line-{}", state.next_line));
        state.lines.insert(
            id.clone(),
            CartItem {
                id,
                product,
                quantity: request.quantity,
                customizations: request.customizations.clone(),
            },
        );
        Ok(())
    }

    async fn update_cart_line_customizations(
        &self,
        request: &UpdateLineRequest,
    ) -> Result<(), CartError> {
        let mut state = self.state.write().await;
        state.calls.push(CartCall::UpdateCustomizations {
            cart_item_id: request.cart_item_id.clone(),
            quantity: request.quantity,
            base_price: request.base_price,
            customizations: request.customizations.clone(),
        });
        state.take_rejection()?;

        let line = state
            .lines
            .get_mut(&request.cart_item_id)
            .ok_or_else(|| missing_line(&request.cart_item_id))?;
        line.quantity = request.quantity;
        line.customizations = request.customizations.clone();
        Ok(())
    }

    async fn update_quantity(
        &self,
        cart_item_id: &CartItemId,
        quantity: u32,
    ) -> Result<(), CartError> {
        let mut state = self.state.write().await;
        state
            .calls
            .push(CartCall::UpdateQuantity { cart_item_id: cart_item_id.clone(), quantity });
        state.take_rejection()?;

        if quantity == 0 {
            state.lines.remove(cart_item_id).ok_or_else(|| missing_line(cart_item_id))?;
            return Ok(());
        }
        let line = state.lines.get_mut(cart_item_id).ok_or_else(|| missing_line(cart_item_id))?;
        line.quantity = quantity;
        Ok(())
    }

    async fn remove_line(&self, cart_item_id: &CartItemId) -> Result<(), CartError> {
        let mut state = self.state.write().await;
        state.calls.push(CartCall::RemoveLine { cart_item_id: cart_item_id.clone() });
        state.take_rejection()?;

        state.lines.remove(cart_item_id).ok_or_else(|| missing_line(cart_item_id))?;
        Ok(())
    }
}

fn missing_line(cart_item_id: &CartItemId) -> CartError {
    CartError::Rejected { reason: format!("cart line `{}` does not exist", cart_item_id.0) }
}
