//! Browser backends: localStorage persistence, DOM anchors, cross-tab cart
//! bridging, and script-tag container adoption.
//!
//! The JS side of the contract: a remote's manifest script defines a global
//! object named after the remote with `init(scope)` and `get(name)` methods
//! (both may return promises). `get` resolves to a mount function
//! `(element, props) -> instance`, and instances answer `update`/`destroy`
//! or their Svelte spellings `$set`/`$destroy`.

use std::cell::RefCell;
use std::rc::Rc;

use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::adapter::{
    Anchor, AnchorId, ComponentFactory, ForeignInstance, MountError, Props,
};
use crate::bus::EventBus;
use crate::cart::{CART_STORAGE_KEY, CART_UPDATED_TOPIC};
use crate::loader::{ContainerError, ContainerFetcher, LoadError, RemoteContainer};
use crate::registry::RemoteDescriptor;
use crate::shared_scope::SharedScope;
use crate::storage::{StorageBackend, StorageError};

// --- LocalStorage ---

/// `window.localStorage` behind the storage trait.
#[derive(Default)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }

    fn storage() -> Option<web_sys::Storage> {
        web_sys::window()?.local_storage().ok()?
    }
}

impl StorageBackend for LocalStorage {
    fn load(&self, key: &str) -> Option<String> {
        Self::storage()?.get_item(key).ok()?
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let Some(storage) = Self::storage() else {
            return Err(StorageError::Unavailable);
        };
        // setItem throws on quota exhaustion.
        storage.set_item(key, value).map_err(|_| StorageError::Full)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let Some(storage) = Self::storage() else {
            return Err(StorageError::Unavailable);
        };
        storage
            .remove_item(key)
            .map_err(|error| StorageError::Io(describe_js_error(&error)))
    }
}

// --- DomAnchor ---

/// A DOM element serving as a mount slot. The anchor id is mirrored into a
/// `data-fresco-anchor` attribute so factories can find the element again.
pub struct DomAnchor {
    id: AnchorId,
    element: web_sys::Element,
}

impl DomAnchor {
    pub fn new(element: web_sys::Element) -> Self {
        let id = AnchorId::new();
        let _ = element.set_attribute("data-fresco-anchor", &id.to_string());
        Self { id, element }
    }

    pub fn by_element_id(dom_id: &str) -> Option<Self> {
        let element = web_sys::window()?.document()?.get_element_by_id(dom_id)?;
        Some(Self::new(element))
    }

    pub fn element(&self) -> &web_sys::Element {
        &self.element
    }
}

impl Anchor for DomAnchor {
    fn anchor_id(&self) -> AnchorId {
        self.id
    }

    fn is_attached(&self) -> bool {
        self.element.is_connected()
    }
}

fn element_for(anchor_id: AnchorId) -> Option<web_sys::Element> {
    let selector = format!("[data-fresco-anchor=\"{anchor_id}\"]");
    web_sys::window()?.document()?.query_selector(&selector).ok()?
}

// --- Cross-tab bridge ---

/// Republishes other tabs' cart writes onto this tab's bus.
///
/// The browser fires `storage` events only in tabs that did not perform the
/// write, so local broadcasts and bridged ones never double up.
pub struct StorageEventBridge {
    listener: Closure<dyn FnMut(web_sys::StorageEvent)>,
}

impl StorageEventBridge {
    pub fn install(bus: &EventBus) -> Option<Self> {
        let window = web_sys::window()?;
        let bus = bus.clone();
        let listener = Closure::wrap(Box::new(move |event: web_sys::StorageEvent| {
            if event.key().as_deref() != Some(CART_STORAGE_KEY) {
                return;
            }
            // A removed key means the other tab cleared its cart.
            let payload = event
                .new_value()
                .and_then(|text| serde_json::from_str(&text).ok())
                .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));
            bus.publish(CART_UPDATED_TOPIC, &payload);
        }) as Box<dyn FnMut(web_sys::StorageEvent)>);
        window
            .add_event_listener_with_callback("storage", listener.as_ref().unchecked_ref())
            .ok()?;
        Some(Self { listener })
    }
}

impl Drop for StorageEventBridge {
    fn drop(&mut self) {
        if let Some(window) = web_sys::window() {
            let _ = window.remove_event_listener_with_callback(
                "storage",
                self.listener.as_ref().unchecked_ref(),
            );
        }
    }
}

// --- Script-tag fetching ---

/// Loads a remote by injecting its manifest script, then adopts the global
/// container object the script defines under the remote's name.
#[derive(Default)]
pub struct ScriptFetcher;

impl ScriptFetcher {
    pub fn new() -> Self {
        Self
    }
}

impl ContainerFetcher for ScriptFetcher {
    fn fetch(
        &self,
        descriptor: &RemoteDescriptor,
    ) -> LocalBoxFuture<'static, Result<Rc<dyn RemoteContainer>, LoadError>> {
        let descriptor = descriptor.clone();
        async move { inject_script(&descriptor).await }.boxed_local()
    }
}

async fn inject_script(
    descriptor: &RemoteDescriptor,
) -> Result<Rc<dyn RemoteContainer>, LoadError> {
    let fetch_error = |reason: &str| LoadError::Fetch {
        remote: descriptor.name.clone(),
        reason: reason.to_owned(),
    };

    let window = web_sys::window().ok_or_else(|| fetch_error("no window"))?;
    // The container global may already exist, e.g. preloaded by the page.
    if let Some(container) = adopt_global(&window, &descriptor.name) {
        return Ok(container);
    }

    let document = window.document().ok_or_else(|| fetch_error("no document"))?;
    let script: web_sys::HtmlScriptElement = document
        .create_element("script")
        .map_err(|_| fetch_error("createElement failed"))?
        .unchecked_into();
    script.set_src(&descriptor.manifest_url);
    script.set_type("text/javascript");

    let (loaded_sender, loaded) = futures_channel::oneshot::channel::<bool>();
    let sender = Rc::new(RefCell::new(Some(loaded_sender)));
    let on_load = {
        let sender = sender.clone();
        Closure::wrap(Box::new(move |_: web_sys::Event| {
            if let Some(sender) = sender.borrow_mut().take() {
                let _ = sender.send(true);
            }
        }) as Box<dyn FnMut(web_sys::Event)>)
    };
    let on_error = {
        let sender = sender.clone();
        Closure::wrap(Box::new(move |_: web_sys::Event| {
            if let Some(sender) = sender.borrow_mut().take() {
                let _ = sender.send(false);
            }
        }) as Box<dyn FnMut(web_sys::Event)>)
    };
    script.set_onload(Some(on_load.as_ref().unchecked_ref()));
    script.set_onerror(Some(on_error.as_ref().unchecked_ref()));

    document
        .head()
        .ok_or_else(|| fetch_error("no <head>"))?
        .append_child(&script)
        .map_err(|_| fetch_error("appendChild failed"))?;

    let outcome = loaded.await;
    script.set_onload(None);
    script.set_onerror(None);

    match outcome {
        Ok(true) => adopt_global(&window, &descriptor.name)
            .ok_or_else(|| fetch_error("script defined no container global")),
        Ok(false) => Err(fetch_error("script failed to load")),
        Err(_) => Err(fetch_error("load signal dropped")),
    }
}

fn adopt_global(window: &web_sys::Window, name: &str) -> Option<Rc<dyn RemoteContainer>> {
    let global = js_sys::Reflect::get(window, &JsValue::from_str(name)).ok()?;
    if global.is_undefined() || global.is_null() {
        return None;
    }
    Some(Rc::new(JsContainer::new(global.unchecked_into())))
}

// --- JS containers ---

/// A federation container living on the JS side.
pub struct JsContainer {
    object: js_sys::Object,
}

impl JsContainer {
    pub fn new(object: js_sys::Object) -> Self {
        Self { object }
    }
}

impl RemoteContainer for JsContainer {
    fn init(
        &self,
        scope: Rc<RefCell<SharedScope>>,
    ) -> LocalBoxFuture<'static, Result<(), ContainerError>> {
        // JS containers get a read-only snapshot; negotiation itself is
        // driven by the descriptor on the host side.
        let snapshot = scope_snapshot(&scope);
        let object = self.object.clone();
        async move {
            let Some(function) = object_method(&object, "init") else {
                // Containers without init have nothing to wire.
                return Ok(());
            };
            let value = function
                .call1(&object, &snapshot)
                .map_err(|error| ContainerError::InitFailed(describe_js_error(&error)))?;
            await_if_promise(value)
                .await
                .map_err(|error| ContainerError::InitFailed(describe_js_error(&error)))?;
            Ok(())
        }
        .boxed_local()
    }

    fn get(
        &self,
        exposed: &str,
    ) -> LocalBoxFuture<'static, Result<ComponentFactory, ContainerError>> {
        let object = self.object.clone();
        let exposed = exposed.to_owned();
        async move {
            let function = object_method(&object, "get").ok_or_else(|| {
                ContainerError::InitFailed("container has no get()".to_owned())
            })?;
            let unknown = || ContainerError::UnknownExport {
                exposed: exposed.clone(),
            };
            let value = function
                .call1(&object, &JsValue::from_str(&exposed))
                .map_err(|_| unknown())?;
            let resolved = await_if_promise(value).await.map_err(|_| unknown())?;
            let mount: js_sys::Function = resolved.dyn_into().map_err(|_| unknown())?;
            Ok(js_component_factory(mount))
        }
        .boxed_local()
    }
}

fn js_component_factory(mount: js_sys::Function) -> ComponentFactory {
    Rc::new(move |anchor, props| {
        let element = element_for(anchor.anchor_id()).ok_or_else(|| {
            MountError::FactoryFailed("anchor element is not in the document".to_owned())
        })?;
        let payload = props_to_js(props).unwrap_or_else(|| js_sys::Object::new().into());
        let instance = mount
            .call2(&JsValue::NULL, &element, &payload)
            .map_err(|error| MountError::FactoryFailed(describe_js_error(&error)))?;
        let object: js_sys::Object = instance.dyn_into().map_err(|_| {
            MountError::FactoryFailed("mount returned no instance object".to_owned())
        })?;
        Ok(Box::new(JsInstance { object }) as Box<dyn ForeignInstance>)
    })
}

struct JsInstance {
    object: js_sys::Object,
}

impl ForeignInstance for JsInstance {
    fn update(&mut self, props: &Props) {
        let Some(function) = first_method(&self.object, &["update", "$set"]) else {
            return;
        };
        if let Some(payload) = props_to_js(props) {
            let _ = function.call1(&self.object, &payload);
        }
    }

    fn destroy(&mut self) {
        if let Some(function) = first_method(&self.object, &["destroy", "$destroy"]) {
            let _ = function.call0(&self.object);
        }
    }
}

// --- JS helpers ---

fn object_method(object: &js_sys::Object, name: &str) -> Option<js_sys::Function> {
    js_sys::Reflect::get(object, &JsValue::from_str(name))
        .ok()?
        .dyn_into()
        .ok()
}

fn first_method(object: &js_sys::Object, names: &[&str]) -> Option<js_sys::Function> {
    names.iter().find_map(|name| object_method(object, name))
}

async fn await_if_promise(value: JsValue) -> Result<JsValue, JsValue> {
    match value.dyn_into::<js_sys::Promise>() {
        Ok(promise) => wasm_bindgen_futures::JsFuture::from(promise).await,
        Err(value) => Ok(value),
    }
}

fn props_to_js(props: &Props) -> Option<JsValue> {
    let text = serde_json::to_string(props).ok()?;
    js_sys::JSON::parse(&text).ok()
}

fn scope_snapshot(scope: &Rc<RefCell<SharedScope>>) -> JsValue {
    let mut entries = serde_json::Map::new();
    for (name, entry) in scope.borrow().iter() {
        entries.insert(
            name.to_owned(),
            serde_json::json!({
                "version": entry.version.to_string(),
                "singleton": entry.singleton,
                "provider": entry.provider,
            }),
        );
    }
    let text = serde_json::Value::Object(entries).to_string();
    js_sys::JSON::parse(&text).unwrap_or(JsValue::NULL)
}

fn describe_js_error(error: &JsValue) -> String {
    error.as_string().unwrap_or_else(|| format!("{error:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn local_storage_round_trip() {
        let storage = LocalStorage::new();
        storage.save("fresco-test", "42").unwrap();
        assert_eq!(storage.load("fresco-test").as_deref(), Some("42"));
        storage.remove("fresco-test").unwrap();
        assert_eq!(storage.load("fresco-test"), None);
    }

    #[wasm_bindgen_test]
    fn dom_anchor_tracks_attachment() {
        let document = web_sys::window().unwrap().document().unwrap();
        let element = document.create_element("div").unwrap();
        let anchor = DomAnchor::new(element.clone());
        assert!(!anchor.is_attached());

        document.body().unwrap().append_child(&element).unwrap();
        assert!(anchor.is_attached());
        assert_eq!(
            element_for(anchor.anchor_id()).map(|found| found.outer_html()),
            Some(element.outer_html())
        );

        element.remove();
        assert!(!anchor.is_attached());
    }

    #[wasm_bindgen_test]
    fn props_cross_the_boundary_as_plain_objects() {
        let props = Props::new().with("open", true).with("count", 3);
        let value = props_to_js(&props).unwrap();
        let open = js_sys::Reflect::get(&value, &JsValue::from_str("open")).unwrap();
        assert_eq!(open.as_bool(), Some(true));
    }
}
