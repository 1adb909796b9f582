//! Product data model and the demo catalog client.
//!
//! Product payloads are display attributes, passed through opaquely and not
//! validated. The catalog client fetches the external dataset and falls back
//! to the bundled one on any failure; catalog errors never reach the caller.

use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

// --- ProductId ---

/// Unique product identifier, the cart's map key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ProductId(pub u64);

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ProductId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// --- Product ---

/// Star rating attached to catalog entries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub rate: f64,
    pub count: u64,
}

/// One catalog entry.
///
/// Only `id` and `price` carry meaning for the cart; everything else is an
/// opaque display payload, so all of it defaults when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(default)]
    pub title: String,
    pub price: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
}

// --- CatalogError ---

/// Failure modes of the external product fetch.
///
/// All of them are recovered locally by the bundled dataset; none propagate.
#[derive(Debug, Clone)]
pub enum CatalogError {
    /// Transport-level failure (offline, DNS, aborted request).
    Network(String),
    /// Non-2xx response.
    Status(u16),
    /// Body was not the expected JSON array of products.
    Malformed(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Network(message) => write!(f, "network failure: {message}"),
            CatalogError::Status(code) => write!(f, "unexpected status {code}"),
            CatalogError::Malformed(message) => write!(f, "malformed product payload: {message}"),
        }
    }
}

// --- Catalog ---

/// Transport strategy for the product dataset.
pub trait ProductFetcher {
    fn fetch_products(&self) -> LocalBoxFuture<'static, Result<Vec<Product>, CatalogError>>;
}

/// Catalog client with the mandatory mock fallback.
pub struct Catalog {
    fetcher: Rc<dyn ProductFetcher>,
}

impl Catalog {
    pub fn new(fetcher: Rc<dyn ProductFetcher>) -> Self {
        Self { fetcher }
    }

    /// Full product list.
    ///
    /// Any fetch failure serves the bundled dataset instead; the failure is
    /// logged and swallowed.
    pub async fn products(&self) -> Vec<Product> {
        match self.fetcher.fetch_products().await {
            Ok(products) => products,
            Err(error) => {
                eprintln!("Product fetch failed ({error}), serving the bundled catalog");
                mock_products()
            }
        }
    }

    /// Single product lookup by id, `None` when the id is not in the list.
    pub async fn product(&self, id: ProductId) -> Option<Product> {
        self.products().await.into_iter().find(|product| product.id == id)
    }
}

/// The bundled catalog served when the external source is unreachable.
pub fn mock_products() -> Vec<Product> {
    fn product(
        id: u64,
        title: &str,
        price: f64,
        description: &str,
        image: &str,
        category: &str,
        rating: Option<Rating>,
    ) -> Product {
        Product {
            id: ProductId(id),
            title: title.to_owned(),
            price,
            description: description.to_owned(),
            image: image.to_owned(),
            category: category.to_owned(),
            rating,
        }
    }

    vec![
        product(
            1,
            "Fjallraven - Foldsack No. 1 Backpack, Fits 15 Laptops",
            109.95,
            "Your perfect pack for everyday use and walks in the forest.",
            "https://fakestoreapi.com/img/81fPKd-2AYL._AC_SL1500_.jpg",
            "men's clothing",
            Some(Rating { rate: 3.9, count: 120 }),
        ),
        product(
            2,
            "Mens Casual Premium Slim Fit T-Shirts",
            22.3,
            "Slim-fitting style, contrast raglan long sleeve.",
            "https://fakestoreapi.com/img/71-3HjGNDUL._AC_SY879._SX._UX._SY._UY_.jpg",
            "men's clothing",
            Some(Rating { rate: 4.1, count: 259 }),
        ),
        product(
            3,
            "Mens Cotton Jacket",
            55.99,
            "Great outerwear jackets for Spring/Autumn/Winter.",
            "https://fakestoreapi.com/img/71li-ujtlUL._AC_UX679_.jpg",
            "men's clothing",
            Some(Rating { rate: 4.7, count: 500 }),
        ),
        product(
            4,
            "John Hardy Women's Legends Naga Gold & Silver Dragon Bracelet",
            695.0,
            "From our Legends Collection, the Naga was inspired by the mythical water dragon.",
            "https://fakestoreapi.com/img/71pWzhdJNwL._AC_UL640_QL65_ML3_.jpg",
            "jewelery",
            Some(Rating { rate: 4.6, count: 400 }),
        ),
        product(
            5,
            "WD 2TB Elements Portable External Hard Drive - USB 3.0",
            64.0,
            "USB 3.0 and USB 2.0 compatibility, fast data transfers.",
            "https://fakestoreapi.com/img/61IBBVJvSDL._AC_SY879_.jpg",
            "electronics",
            Some(Rating { rate: 3.3, count: 203 }),
        ),
        product(
            6,
            "Acer SB220Q bi 21.5 inches Full HD IPS Ultra-Thin Monitor",
            599.0,
            "21.5 inches Full HD widescreen IPS display.",
            "https://fakestoreapi.com/img/81QpkIctqPL._AC_SX679_.jpg",
            "electronics",
            Some(Rating { rate: 2.9, count: 250 }),
        ),
    ]
}
