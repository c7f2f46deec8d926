pub mod cart;
pub mod customization;
pub mod product;
