//! Tests for cart state shared between independently built storefront pieces.

use std::cell::RefCell;
use std::rc::Rc;

use fresco::bus::EventBus;
use fresco::cart::{CartSnapshot, CartStore};
use fresco::products::{Product, ProductId, mock_products};
use fresco::storage::MemoryStorage;
use futures_util::StreamExt;

fn product(id: u64) -> Product {
    mock_products()
        .into_iter()
        .find(|product| product.id == ProductId(id))
        .unwrap()
}

#[test]
fn header_badge_and_cart_page_share_one_cart() {
    // One backend, one bus, two views built over them independently, the
    // way separately loaded bundles come up.
    let backend = Rc::new(MemoryStorage::new());
    let bus = EventBus::new();
    let cart_page = CartStore::new(backend.clone(), bus.clone());
    let header = CartStore::new(backend, bus);

    let badge = Rc::new(RefCell::new(0_u64));
    let _subscription = header.on_change({
        let badge = badge.clone();
        move |snapshot| {
            *badge.borrow_mut() = snapshot.values().map(|entry| entry.quantity).sum();
        }
    });

    cart_page.add(&product(1));
    cart_page.add(&product(1));
    cart_page.add(&product(2));

    assert_eq!(*badge.borrow(), 3);
    assert_eq!(header.item_count(), 3);
    assert_eq!(header.get(), cart_page.get());
}

#[test]
fn a_reloaded_page_resumes_the_persisted_cart() {
    let backend = Rc::new(MemoryStorage::new());
    {
        let cart = CartStore::new(backend.clone(), EventBus::new());
        cart.add(&product(3));
        cart.set_quantity(ProductId(3), 4);
    }

    let reloaded = CartStore::new(backend, EventBus::new());
    assert_eq!(reloaded.item_count(), 4);
    assert_eq!(reloaded.total(), product(3).price * 4.0);
}

#[tokio::test(flavor = "current_thread")]
async fn typed_updates_reach_stream_consumers_in_order() {
    let cart = CartStore::new(Rc::new(MemoryStorage::new()), EventBus::new());
    let mut updates = cart.updates();

    cart.add(&product(5));
    cart.add(&product(5));
    cart.clear();

    let first: CartSnapshot = updates.next().await.unwrap();
    assert_eq!(first.get(&ProductId(5)).unwrap().quantity, 1);
    let second = updates.next().await.unwrap();
    assert_eq!(second.get(&ProductId(5)).unwrap().quantity, 2);
    let third = updates.next().await.unwrap();
    assert!(third.is_empty());
}
