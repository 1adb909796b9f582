use std::rc::Rc;

use zoon::{eprintln, *};
use zoon::{map_ref, Rgba};

use fresco::adapter::Mounter;
use fresco::bus::Subscription;
use fresco::cart::CartStore;
use fresco::loader::Loader;
use fresco::platform::browser::{DomAnchor, LocalStorage, StorageEventBridge};
use fresco::products::{Catalog, CatalogError, Product, ProductFetcher, ProductId};
use fresco::shell::{RouteOutcome, RouteTarget, Shell};
use fresco::{EventBus, Props};

use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;

mod remotes;

static ROUTE_SLOT_DOM_ID: &str = "route-slot";

const APP_BACKGROUND_GRADIENT: &str =
    "linear-gradient(160deg, #1b2437 0%, #121a2b 55%, #0e1422 100%)";

fn shell_surface_color() -> Rgba {
    color!("rgba(13, 18, 30, 0.88)")
}

fn primary_text_color() -> Rgba {
    color!("#f1f4ff")
}

fn active_nav_color() -> Rgba {
    color!("rgba(108, 162, 255, 0.42)")
}

fn hovered_nav_color() -> Rgba {
    color!("rgba(36, 48, 72, 0.6)")
}

fn idle_nav_color() -> Rgba {
    color!("rgba(26, 36, 58, 0.4)")
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Route {
    Catalog,
    Product(ProductId),
    Cart,
}

fn main() {
    start_app("app", Storefront::new);
}

#[derive(Clone)]
struct Storefront {
    route: Mutable<Route>,
    route_error: Mutable<Option<String>>,
    badge_count: Mutable<u64>,
    _cross_tab_bridge: Rc<Option<StorageEventBridge>>,
    _badge_feed: Rc<Subscription>,
    _badge_poll_task: Rc<TaskHandle>,
    _navigation_task: Rc<TaskHandle>,
}

impl Storefront {
    fn new() -> impl Element {
        let cart = CartStore::new(Rc::new(LocalStorage::new()), EventBus::new());
        let cross_tab_bridge = StorageEventBridge::install(cart.bus());
        if cross_tab_bridge.is_none() {
            eprintln!("[STOREFRONT] cross-tab cart sync unavailable");
        }

        let route = Mutable::new(Route::Catalog);
        let route_error: Mutable<Option<String>> = Mutable::new(None);
        let badge_count = Mutable::new(cart.item_count());
        let products: Mutable<Rc<Vec<Product>>> = Mutable::new(Rc::new(Vec::new()));

        // Pages re-mount with fresh product props once the catalog lands.
        {
            let products = products.clone();
            Task::start(async move {
                let catalog = Catalog::new(Rc::new(FixtureFetcher));
                products.set(Rc::new(catalog.products().await));
            });
        }

        let view_product: Rc<dyn Fn(ProductId)> = {
            let route = route.clone();
            Rc::new(move |id| route.set_neq(Route::Product(id)))
        };
        let shell = Rc::new(Shell::new(
            Rc::new(Loader::new(
                Rc::new(remotes::storefront_registry()),
                Rc::new(remotes::storefront_fetcher(&cart, view_product)),
            )),
            Rc::new(Mounter::new()),
        ));

        let _badge_feed = {
            let badge_count = badge_count.clone();
            Rc::new(cart.on_change(move |snapshot| {
                badge_count.set_neq(snapshot.values().map(|entry| entry.quantity).sum());
            }))
        };

        // Other tabs' writes land through the storage bridge; the poll picks
        // up anything that bypassed the bus entirely.
        let _badge_poll_task = {
            let cart = cart.clone();
            let badge_count = badge_count.clone();
            Rc::new(Task::start_droppable(async move {
                loop {
                    Timer::sleep(1_000).await;
                    badge_count.set_neq(cart.item_count());
                }
            }))
        };

        let _navigation_task = {
            let shell = shell.clone();
            let route_error = route_error.clone();
            let navigation = map_ref! {
                let route = route.signal(),
                let products = products.signal_cloned() =>
                (*route, products.clone())
            };
            Rc::new(Task::start_droppable(navigation.for_each(
                move |(route, products)| {
                    let shell = shell.clone();
                    let route_error = route_error.clone();
                    async move {
                        // Let the chrome render once so the slot element is
                        // in the document before mounting into it.
                        Timer::sleep(100).await;
                        let Some(anchor) = DomAnchor::by_element_id(ROUTE_SLOT_DOM_ID) else {
                            eprintln!("[STOREFRONT] route slot is not in the document");
                            return;
                        };
                        match shell.navigate(route_target(route, &products), &anchor).await {
                            RouteOutcome::Mounted => route_error.set_neq(None),
                            // A newer navigation owns the slot; it reports.
                            RouteOutcome::Superseded => (),
                            RouteOutcome::Failed(error) => {
                                route_error.set_neq(Some(error.to_string()));
                            }
                        }
                    }
                },
            )))
        };

        Self {
            route,
            route_error,
            badge_count,
            _cross_tab_bridge: Rc::new(cross_tab_bridge),
            _badge_feed,
            _badge_poll_task,
            _navigation_task,
        }
        .root()
    }

    fn root(&self) -> impl Element + use<> {
        Column::new()
            .s(Width::fill())
            .s(Height::fill())
            .s(Font::new().color(primary_text_color()))
            .update_raw_el(|raw_el| raw_el.style("background", APP_BACKGROUND_GRADIENT))
            .item(self.header_bar())
            .item_signal(self.route_error.signal_cloned().map({
                let this = self.clone();
                move |maybe_error| maybe_error.map(|error| this.error_banner(error))
            }))
            .item(self.route_slot())
    }

    fn header_bar(&self) -> impl Element + use<> {
        Row::new()
            .s(Width::fill())
            .s(Padding::new().x(24).y(14))
            .s(Gap::new().x(10))
            .s(Background::new().color(shell_surface_color()))
            .item(
                El::new()
                    .s(Align::new().center_y())
                    .s(Font::new().size(18).weight(FontWeight::SemiBold).no_wrap())
                    .child("Fresco Storefront"),
            )
            .item(
                Row::new()
                    .s(Align::new().right())
                    .s(Gap::new().x(10))
                    .item(self.nav_button("Catalog", Route::Catalog))
                    .item(self.cart_button()),
            )
    }

    fn nav_button(&self, label: &'static str, target: Route) -> impl Element + use<> {
        let hovered = Mutable::new(false);
        Button::new()
            .s(Padding::new().x(14).y(7))
            .s(RoundedCorners::all(18))
            .s(Font::new().size(14).weight(FontWeight::Medium).no_wrap())
            .s(Background::new().color_signal(map_ref! {
                let hovered = hovered.signal(),
                let route = self.route.signal() =>
                match (*route == target, *hovered) {
                    (true, _) => active_nav_color(),
                    (false, true) => hovered_nav_color(),
                    (false, false) => idle_nav_color(),
                }
            }))
            .label(label)
            .on_hovered_change(move |is_hovered| hovered.set(is_hovered))
            .on_press({
                let route = self.route.clone();
                move || route.set_neq(target)
            })
    }

    fn cart_button(&self) -> impl Element + use<> {
        let hovered = Mutable::new(false);
        Button::new()
            .s(Padding::new().x(14).y(7))
            .s(RoundedCorners::all(18))
            .s(Font::new().size(14).weight(FontWeight::Medium).no_wrap())
            .s(Background::new().color_signal(map_ref! {
                let hovered = hovered.signal(),
                let route = self.route.signal() =>
                match (*route == Route::Cart, *hovered) {
                    (true, _) => active_nav_color(),
                    (false, true) => hovered_nav_color(),
                    (false, false) => idle_nav_color(),
                }
            }))
            .label_signal(
                self.badge_count
                    .signal()
                    .map(|count| format!("Cart ({count})")),
            )
            .on_hovered_change(move |is_hovered| hovered.set(is_hovered))
            .on_press({
                let route = self.route.clone();
                move || route.set_neq(Route::Cart)
            })
    }

    fn error_banner(&self, error: String) -> impl Element + use<> {
        Row::new()
            .s(Width::fill())
            .s(Padding::new().x(24).y(10))
            .s(Gap::new().x(12))
            .s(Background::new().color(color!("rgba(255, 134, 134, 0.12)")))
            .s(Font::new().size(13).color(color!("rgba(255, 199, 199, 0.95)")))
            .item(
                El::new()
                    .s(Align::new().center_y())
                    .child(format!("Route failed: {error}")),
            )
            .item(self.retry_button())
    }

    fn retry_button(&self) -> impl Element + use<> {
        let hovered = Mutable::new(false);
        Button::new()
            .s(Padding::new().x(12).y(5))
            .s(RoundedCorners::all(16))
            .s(Borders::all(
                Border::new()
                    .color(color!("rgba(255, 134, 134, 0.45)"))
                    .width(1),
            ))
            .s(Background::new().color_signal(hovered.signal().map_bool(
                || color!("rgba(255, 134, 134, 0.2)"),
                || color!("rgba(255, 134, 134, 0.08)"),
            )))
            .label("Retry")
            .on_hovered_change(move |is_hovered| hovered.set(is_hovered))
            .on_press({
                // Plain `set` re-emits the route even when it is unchanged,
                // which re-runs the navigation.
                let route = self.route.clone();
                move || route.set(route.get())
            })
    }

    fn route_slot(&self) -> impl Element + use<> {
        El::new()
            .s(Width::fill())
            .s(Height::fill())
            .s(Padding::new().x(24).y(18))
            .s(Scrollbars::both())
            .update_raw_el(|raw_el| raw_el.attr("id", ROUTE_SLOT_DOM_ID))
    }
}

fn route_target(route: Route, products: &[Product]) -> RouteTarget {
    match route {
        Route::Catalog => {
            let listing = serde_json::to_value(products).unwrap_or_default();
            RouteTarget::new("catalog", "CatalogPage")
                .with_props(Props::new().with("products", listing))
        }
        Route::Product(id) => {
            let payload = products
                .iter()
                .find(|product| product.id == id)
                .and_then(|product| serde_json::to_value(product).ok())
                .unwrap_or(serde_json::Value::Null);
            RouteTarget::new("product", "ProductPage")
                .with_props(Props::new().with("product", payload))
        }
        Route::Cart => RouteTarget::new("cart", "CartPage"),
    }
}

// --- Product data ---

/// Serves the bundled dataset; a deployed build would fetch the external
/// catalog service here instead.
struct FixtureFetcher;

impl ProductFetcher for FixtureFetcher {
    fn fetch_products(&self) -> LocalBoxFuture<'static, Result<Vec<Product>, CatalogError>> {
        let parsed = serde_json::from_str::<Vec<Product>>(shared::PRODUCTS_JSON)
            .map_err(|error| CatalogError::Malformed(error.to_string()));
        async move { parsed }.boxed_local()
    }
}
