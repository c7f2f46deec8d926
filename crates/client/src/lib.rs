//! Storefront network layer for the customization engine: the HTTP client,
//! the wire shapes it speaks, and in-memory stand-ins.

pub mod http;
pub mod memory;
pub mod wire;

pub use http::{ClientError, HttpStorefrontClient};
pub use memory::{CartCall, InMemoryCart, StaticCatalogSource};
pub use wire::{WireCatalog, WireDecodeError};
