#![cfg(target_arch = "wasm32")]

//! Browser entry point: mounts the scene into the page body.

use anyhow::{anyhow, Result};
use gloo_events::EventListener;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Document, HtmlCanvasElement, Response, Window};

use crate::assets::{AssetCallback, AssetError, AssetLoader};
use crate::bootstrap::{setup_scene, SceneConfig, SceneHandle};
use crate::host::{Host, ResizeListener, ResizeSubscription, Viewport};
use crate::render::{CanvasSurface, RenderSurface, RendererSettings};

/// Host backed by the page's `window` and `document.body`.
pub struct BrowserHost {
    window: Window,
    document: Document,
}

impl BrowserHost {
    pub fn new() -> Result<Self> {
        let window = web_sys::window().ok_or_else(|| anyhow!("missing window"))?;
        let document = window
            .document()
            .ok_or_else(|| anyhow!("missing document"))?;
        Ok(Self { window, document })
    }
}

fn viewport_of(window: &Window) -> Viewport {
    let dimension = |value: Result<JsValue, JsValue>| {
        value
            .ok()
            .and_then(|value| value.as_f64())
            .unwrap_or(0.0)
            .max(0.0) as u32
    };
    Viewport::new(dimension(window.inner_width()), dimension(window.inner_height()))
        .with_pixel_ratio(window.device_pixel_ratio() as f32)
}

impl Host for BrowserHost {
    fn viewport(&self) -> Viewport {
        viewport_of(&self.window)
    }

    fn mount_surface(&self, _settings: &RendererSettings) -> Result<Box<dyn RenderSurface>> {
        let canvas: HtmlCanvasElement = self
            .document
            .create_element("canvas")
            .map_err(|err| anyhow!("failed to create canvas: {err:?}"))?
            .dyn_into()
            .map_err(|_| anyhow!("created element is not a canvas"))?;
        let body = self
            .document
            .body()
            .ok_or_else(|| anyhow!("document has no body"))?;
        body.append_child(&canvas)
            .map_err(|err| anyhow!("failed to attach canvas: {err:?}"))?;
        Ok(Box::new(CanvasSurface::new(canvas)?))
    }

    fn on_resize(&self, listener: ResizeListener) -> Result<ResizeSubscription> {
        let window = self.window.clone();
        let registration = EventListener::new(&self.window, "resize", move |_event| {
            listener(viewport_of(&window));
        });
        Ok(ResizeSubscription::new(move || drop(registration)))
    }
}

/// Fetches assets relative to `base` on the page's event loop.
#[derive(Debug, Clone, Default)]
pub struct FetchAssetLoader {
    base: String,
}

impl FetchAssetLoader {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }
}

impl AssetLoader for FetchAssetLoader {
    fn load(&self, path: &str, on_complete: AssetCallback) {
        let url = format!("{}{}", self.base, path);
        let path = path.to_string();
        wasm_bindgen_futures::spawn_local(async move {
            let result = fetch_bytes(&url)
                .await
                .map_err(|message| AssetError::Fetch { path, message });
            on_complete(result);
        });
    }
}

async fn fetch_bytes(url: &str) -> Result<Vec<u8>, String> {
    let window = web_sys::window().ok_or_else(|| "missing window".to_string())?;
    let response: Response = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(|err| format!("{err:?}"))?
        .dyn_into()
        .map_err(|_| "fetch did not return a Response".to_string())?;
    if !response.ok() {
        return Err(format!("HTTP {}", response.status()));
    }
    let buffer = JsFuture::from(response.array_buffer().map_err(|err| format!("{err:?}"))?)
        .await
        .map_err(|err| format!("{err:?}"))?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}

fn to_js(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}

/// Scene mounted into the current page.
#[wasm_bindgen]
pub struct SceneApp {
    handle: Option<SceneHandle>,
}

#[wasm_bindgen]
impl SceneApp {
    /// Mounts the scene and starts loading assets from `asset_base`.
    #[wasm_bindgen(constructor)]
    pub fn new(asset_base: Option<String>) -> Result<SceneApp, JsValue> {
        console_error_panic_hook::set_once();
        wasm_logger::init(wasm_logger::Config::new(log::Level::Info));

        let host = BrowserHost::new().map_err(to_js)?;
        let loader = FetchAssetLoader::new(asset_base.unwrap_or_default());
        let handle = setup_scene(&host, &loader, &SceneConfig::default()).map_err(to_js)?;
        Ok(SceneApp {
            handle: Some(handle),
        })
    }

    pub fn render(&self) -> Result<(), JsValue> {
        match &self.handle {
            Some(handle) => handle.render_frame().map_err(to_js),
            None => Ok(()),
        }
    }

    #[wasm_bindgen(js_name = isMounted)]
    pub fn is_mounted(&self) -> bool {
        self.handle.is_some()
    }

    /// Removes the resize listener; later `render` calls do nothing.
    pub fn teardown(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.teardown();
        }
    }
}
