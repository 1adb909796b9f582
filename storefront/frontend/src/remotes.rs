//! The storefront's remote bundles, compiled in-process.
//!
//! In a deployed federation each page would be a separately built script
//! adopted through `ScriptFetcher`. The demo keeps the container protocol
//! but serves the containers from memory, so the whole loop (registry,
//! shared-scope negotiation, mount, teardown) runs without a second build
//! pipeline. The pages render through raw DOM calls instead of zoon: to the
//! host they are foreign components.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use fresco::adapter::{Anchor, ComponentFactory, ForeignInstance, MountError, Props};
use fresco::bus::Subscription;
use fresco::cart::CartStore;
use fresco::loader::{LocalContainer, StaticFetcher};
use fresco::products::{Product, ProductId};
use fresco::registry::{RemoteDescriptor, RemoteRegistry, SharedDependency};
use fresco::version::{Version, VersionReq};

// --- Federation wiring ---

/// The host's view of the federation: three page remotes, one shared
/// styling library negotiated as a singleton.
pub fn storefront_registry() -> RemoteRegistry {
    let mut registry = RemoteRegistry::new("storefront");
    registry.add_shared(SharedDependency::new("design-tokens", Version::new(1, 0, 0)).singleton());
    registry.add_remote(
        RemoteDescriptor::new("catalog", "local://catalog")
            .exposing("CatalogPage")
            .sharing(
                SharedDependency::new("design-tokens", Version::new(1, 0, 0))
                    .singleton()
                    .requiring(VersionReq::Compatible(Version::new(1, 0, 0))),
            ),
    );
    registry.add_remote(RemoteDescriptor::new("product", "local://product").exposing("ProductPage"));
    registry.add_remote(RemoteDescriptor::new("cart", "local://cart").exposing("CartPage"));
    registry
}

/// Containers for the three remotes, keyed the way the registry names them.
///
/// `view_product` is how the catalog hands navigation back to the host; the
/// pages themselves never touch the router.
pub fn storefront_fetcher(cart: &CartStore, view_product: Rc<dyn Fn(ProductId)>) -> StaticFetcher {
    let fetcher = StaticFetcher::new();
    fetcher.provide(
        "catalog",
        Rc::new(LocalContainer::new().expose(
            "CatalogPage",
            catalog_page_factory(cart.clone(), view_product),
        )),
    );
    fetcher.provide(
        "product",
        Rc::new(LocalContainer::new().expose("ProductPage", product_page_factory(cart.clone()))),
    );
    fetcher.provide(
        "cart",
        Rc::new(LocalContainer::new().expose("CartPage", cart_page_factory(cart.clone()))),
    );
    fetcher
}

// --- DOM plumbing ---

type ClickHandler = Closure<dyn FnMut(web_sys::Event)>;

fn document() -> Option<web_sys::Document> {
    web_sys::window()?.document()
}

/// Re-query the anchor's element through its `data-fresco-anchor` marker.
fn anchor_element(anchor: &dyn Anchor) -> Result<web_sys::Element, MountError> {
    let selector = format!("[data-fresco-anchor=\"{}\"]", anchor.anchor_id());
    document()
        .and_then(|document| document.query_selector(&selector).ok().flatten())
        .ok_or(MountError::AnchorDetached)
}

fn make_el(tag: &str, class: &str, text: &str) -> Option<web_sys::Element> {
    let element = document()?.create_element(tag).ok()?;
    element.set_class_name(class);
    if !text.is_empty() {
        element.set_text_content(Some(text));
    }
    Some(element)
}

/// Attach a click listener; the returned closure must outlive the element.
fn on_click(element: &web_sys::Element, mut action: impl FnMut() + 'static) -> ClickHandler {
    let handler =
        Closure::wrap(Box::new(move |_: web_sys::Event| action()) as Box<dyn FnMut(web_sys::Event)>);
    let _ = element.add_event_listener_with_callback("click", handler.as_ref().unchecked_ref());
    handler
}

fn mount_root(anchor: &dyn Anchor, class: &str) -> Result<web_sys::Element, MountError> {
    let slot = anchor_element(anchor)?;
    let root = make_el("section", class, "")
        .ok_or_else(|| MountError::FactoryFailed("createElement failed".to_owned()))?;
    slot.append_child(&root)
        .map_err(|_| MountError::FactoryFailed("appendChild failed".to_owned()))?;
    Ok(root)
}

// --- Catalog page ---

struct CatalogPage {
    root: web_sys::Element,
    listeners: Vec<ClickHandler>,
    cart: CartStore,
    view_product: Rc<dyn Fn(ProductId)>,
}

impl CatalogPage {
    fn render(&mut self, props: &Props) {
        self.listeners.clear();
        self.root.set_inner_html("");
        let products = props
            .get("products")
            .and_then(|value| serde_json::from_value::<Vec<Product>>(value.clone()).ok())
            .unwrap_or_default();
        if products.is_empty() {
            if let Some(note) = make_el("p", "catalog-empty", "Loading products...") {
                let _ = self.root.append_child(&note);
            }
            return;
        }
        for product in products {
            let Some(card) = make_el("article", "product-card", "") else {
                continue;
            };
            if let Some(title) = make_el("h3", "product-title", &product.title) {
                let _ = card.append_child(&title);
            }
            if let Some(price) = make_el("p", "product-price", &format!("${:.2}", product.price)) {
                let _ = card.append_child(&price);
            }
            if let Some(view) = make_el("button", "product-view", "View") {
                let id = product.id;
                let view_product = self.view_product.clone();
                self.listeners.push(on_click(&view, move || view_product(id)));
                let _ = card.append_child(&view);
            }
            if let Some(add) = make_el("button", "product-add", "Add to cart") {
                let cart = self.cart.clone();
                self.listeners.push(on_click(&add, move || cart.add(&product)));
                let _ = card.append_child(&add);
            }
            let _ = self.root.append_child(&card);
        }
    }
}

impl ForeignInstance for CatalogPage {
    fn update(&mut self, props: &Props) {
        self.render(props);
    }

    fn destroy(&mut self) {
        self.listeners.clear();
        self.root.remove();
    }
}

fn catalog_page_factory(cart: CartStore, view_product: Rc<dyn Fn(ProductId)>) -> ComponentFactory {
    Rc::new(move |anchor, props| {
        let mut page = CatalogPage {
            root: mount_root(anchor, "catalog-page")?,
            listeners: Vec::new(),
            cart: cart.clone(),
            view_product: view_product.clone(),
        };
        page.render(props);
        Ok(Box::new(page) as Box<dyn ForeignInstance>)
    })
}

// --- Product page ---

struct ProductPage {
    root: web_sys::Element,
    listeners: Vec<ClickHandler>,
    cart: CartStore,
}

impl ProductPage {
    fn render(&mut self, props: &Props) {
        self.listeners.clear();
        self.root.set_inner_html("");
        let Some(product) = props
            .get("product")
            .and_then(|value| serde_json::from_value::<Product>(value.clone()).ok())
        else {
            if let Some(note) =
                make_el("p", "product-missing", "This product is no longer available.")
            {
                let _ = self.root.append_child(&note);
            }
            return;
        };
        if let Some(title) = make_el("h2", "product-title", &product.title) {
            let _ = self.root.append_child(&title);
        }
        if let Some(category) = make_el("p", "product-category", &product.category) {
            let _ = self.root.append_child(&category);
        }
        if let Some(description) = make_el("p", "product-description", &product.description) {
            let _ = self.root.append_child(&description);
        }
        if let Some(rating) = &product.rating {
            let text = format!("{} stars ({} ratings)", rating.rate, rating.count);
            if let Some(line) = make_el("p", "product-rating", &text) {
                let _ = self.root.append_child(&line);
            }
        }
        if let Some(price) = make_el("p", "product-price", &format!("${:.2}", product.price)) {
            let _ = self.root.append_child(&price);
        }
        if let Some(add) = make_el("button", "product-add", "Add to cart") {
            let cart = self.cart.clone();
            self.listeners.push(on_click(&add, move || cart.add(&product)));
            let _ = self.root.append_child(&add);
        }
    }
}

impl ForeignInstance for ProductPage {
    fn update(&mut self, props: &Props) {
        self.render(props);
    }

    fn destroy(&mut self) {
        self.listeners.clear();
        self.root.remove();
    }
}

fn product_page_factory(cart: CartStore) -> ComponentFactory {
    Rc::new(move |anchor, props| {
        let mut page = ProductPage {
            root: mount_root(anchor, "product-page")?,
            listeners: Vec::new(),
            cart: cart.clone(),
        };
        page.render(props);
        Ok(Box::new(page) as Box<dyn ForeignInstance>)
    })
}

// --- Cart page ---

struct CartView {
    root: web_sys::Element,
    listeners: Vec<ClickHandler>,
    cart: CartStore,
}

impl CartView {
    fn render(&mut self) {
        self.listeners.clear();
        self.root.set_inner_html("");
        let snapshot = self.cart.get();
        if snapshot.is_empty() {
            if let Some(note) = make_el("p", "cart-empty", "Your cart is empty.") {
                let _ = self.root.append_child(&note);
            }
            return;
        }
        for (id, entry) in &snapshot {
            let Some(line) = make_el("div", "cart-line", "") else {
                continue;
            };
            let label = format!("{} x {}", entry.quantity, entry.product.title);
            if let Some(label) = make_el("span", "cart-line-label", &label) {
                let _ = line.append_child(&label);
            }
            let subtotal = format!("${:.2}", entry.subtotal());
            if let Some(subtotal) = make_el("span", "cart-line-subtotal", &subtotal) {
                let _ = line.append_child(&subtotal);
            }
            if let Some(more) = make_el("button", "cart-line-more", "+") {
                let cart = self.cart.clone();
                let product = entry.product.clone();
                self.listeners.push(on_click(&more, move || cart.add(&product)));
                let _ = line.append_child(&more);
            }
            if let Some(fewer) = make_el("button", "cart-line-fewer", "-") {
                let cart = self.cart.clone();
                let id = *id;
                let quantity = entry.quantity;
                self.listeners.push(on_click(&fewer, move || {
                    cart.set_quantity(id, quantity.saturating_sub(1));
                }));
                let _ = line.append_child(&fewer);
            }
            let _ = self.root.append_child(&line);
        }
        let total = format!("Total: ${:.2}", self.cart.total());
        if let Some(total) = make_el("p", "cart-total", &total) {
            let _ = self.root.append_child(&total);
        }
        if let Some(clear) = make_el("button", "cart-clear", "Clear cart") {
            let cart = self.cart.clone();
            self.listeners.push(on_click(&clear, move || cart.clear()));
            let _ = self.root.append_child(&clear);
        }
    }
}

/// The cart page rerenders itself on every cart broadcast, including ones
/// bridged from other tabs, for as long as it stays mounted.
struct CartPage {
    view: Rc<RefCell<CartView>>,
    _feed: Subscription,
}

impl ForeignInstance for CartPage {
    fn update(&mut self, _props: &Props) {
        self.view.borrow_mut().render();
    }

    fn destroy(&mut self) {
        let mut view = self.view.borrow_mut();
        view.listeners.clear();
        view.root.remove();
    }
}

fn cart_page_factory(cart: CartStore) -> ComponentFactory {
    Rc::new(move |anchor, _props| {
        let view = Rc::new(RefCell::new(CartView {
            root: mount_root(anchor, "cart-page")?,
            listeners: Vec::new(),
            cart: cart.clone(),
        }));
        view.borrow_mut().render();
        let feed = {
            let view = view.clone();
            cart.on_change(move |_snapshot| view.borrow_mut().render())
        };
        Ok(Box::new(CartPage { view, _feed: feed }) as Box<dyn ForeignInstance>)
    })
}
