//! Fixtures shared across the storefront demo.

/// The demo product dataset, in the external catalog's wire shape.
pub static PRODUCTS_JSON: &str = include_str!("products.json");
