//! Building blocks for the Flappy XR workshop.
//!
//! Two independent halves live here. [`lookup`] is the serverless handler
//! that returns a player's computers from DynamoDB. Everything else
//! bootstraps the 3D scene: [`setup_scene`] wires a camera, lights and a
//! renderer into a [`Host`] (a browser page or a native window) and streams
//! the environment map and model in through an [`AssetLoader`].

pub mod assets;
pub mod bootstrap;
pub mod camera;
pub mod environment;
pub mod host;
#[cfg(not(target_arch = "wasm32"))]
pub mod lookup;
pub mod model;
pub mod obj;
pub mod render;
pub mod scene;
#[cfg(target_arch = "wasm32")]
pub mod web;

#[cfg(not(target_arch = "wasm32"))]
pub use assets::ThreadedAssetLoader;
pub use assets::{AssetCallback, AssetError, AssetLoader, MemoryAssetLoader};
pub use bootstrap::{setup_scene, SceneConfig, SceneHandle, DEFAULT_ENVIRONMENT, DEFAULT_MODEL};
pub use camera::PerspectiveCamera;
pub use environment::{EnvironmentError, EnvironmentMap, EquirectTexture, PmremGenerator};
pub use host::{DispatchHost, Host, ResizeListener, ResizeSubscription, Viewport};
pub use model::{load_model, ModelError, ModelFormat};
pub use obj::parse_obj;
#[cfg(not(target_arch = "wasm32"))]
pub use render::WgpuSurface;
pub use render::{
    HeadlessSurface, OutputEncoding, RenderSurface, Renderer, RendererSettings, SurfaceConfig,
};
pub use scene::{
    DirectionalLight, HemisphereLight, Light, MeshData, Scene, SceneNode, SharedScene,
};
#[cfg(target_arch = "wasm32")]
pub use web::{BrowserHost, FetchAssetLoader, SceneApp};
