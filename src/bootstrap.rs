use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Context, Result};
use glam::Vec3;
use log::{error, info};

use crate::assets::{AssetError, AssetLoader};
use crate::camera::PerspectiveCamera;
use crate::environment::EnvironmentMap;
use crate::host::{Host, ResizeListener, ResizeSubscription, Viewport};
use crate::model::load_model;
use crate::render::{Renderer, RendererSettings};
use crate::scene::{DirectionalLight, HemisphereLight, Light, Scene, SharedScene};

pub const DEFAULT_ENVIRONMENT: &str = "assets/venice_sunset_1k.exr";
pub const DEFAULT_MODEL: &str = "assets/flappybird.glb";

/// Knobs for [`setup_scene`]. Defaults reproduce the workshop page.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneConfig {
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub sky_color: u32,
    pub ground_color: u32,
    pub sun_color: u32,
    pub sun_position: Vec3,
    pub renderer: RendererSettings,
    pub environment_path: String,
    pub model_path: String,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            fov: 70.0,
            near: 0.1,
            far: 5000.0,
            sky_color: 0x606060,
            ground_color: 0x404040,
            sun_color: 0xffffff,
            sun_position: Vec3::ONE.normalize(),
            renderer: RendererSettings::default(),
            environment_path: DEFAULT_ENVIRONMENT.to_string(),
            model_path: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Scene, camera and renderer built by [`setup_scene`].
///
/// The resize listener stays registered for as long as the handle lives.
pub struct SceneHandle {
    pub scene: SharedScene,
    pub camera: Rc<RefCell<PerspectiveCamera>>,
    pub renderer: Rc<RefCell<Renderer>>,
    resize: Option<ResizeSubscription>,
}

impl SceneHandle {
    pub fn is_tracking_resize(&self) -> bool {
        self.resize.is_some()
    }

    /// Stops following viewport changes; the scene stays usable.
    pub fn detach(&mut self) {
        if let Some(subscription) = self.resize.take() {
            subscription.cancel();
        }
    }

    /// Deregisters the resize listener and releases everything.
    pub fn teardown(mut self) {
        self.detach();
    }

    /// Draws the current scene through the camera once.
    pub fn render_frame(&self) -> Result<()> {
        let camera = self.camera.borrow();
        let mut renderer = self.renderer.borrow_mut();
        self.scene
            .read(|scene| renderer.render(scene, &camera))
            .context("failed to render frame")
    }
}

/// Builds the scene synchronously and starts both asset loads.
///
/// The environment map and the model arrive later, in either order, through
/// `loader`. A failed load is logged and leaves the scene as it was.
pub fn setup_scene(
    host: &dyn Host,
    loader: &dyn AssetLoader,
    config: &SceneConfig,
) -> Result<SceneHandle> {
    let viewport = host.viewport();

    let mut scene = Scene::new();
    scene.add_light(Light::Hemisphere(HemisphereLight::new(
        config.sky_color,
        config.ground_color,
    )));
    scene.add_light(Light::Directional(
        DirectionalLight::new(config.sun_color).with_position(config.sun_position.normalize()),
    ));
    let scene = SharedScene::new(scene);

    let camera = PerspectiveCamera::new(config.fov, viewport.aspect(), config.near, config.far);

    let surface = host
        .mount_surface(&config.renderer)
        .context("failed to mount render surface")?;
    let mut renderer = Renderer::new(config.renderer, surface);
    renderer.set_pixel_ratio(viewport.device_pixel_ratio);
    renderer.set_size(viewport.width, viewport.height);
    info!(
        "renderer {} at {}x{} (ratio {:.2}, xr {})",
        renderer.surface_label(),
        viewport.width,
        viewport.height,
        renderer.pixel_ratio(),
        renderer.xr_enabled()
    );

    load_environment(loader, &config.environment_path, scene.clone());
    load_scene_model(loader, &config.model_path, scene.clone());

    let camera = Rc::new(RefCell::new(camera));
    let renderer = Rc::new(RefCell::new(renderer));
    let resize = host
        .on_resize(resize_listener(Rc::clone(&camera), Rc::clone(&renderer)))
        .context("failed to register resize listener")?;

    Ok(SceneHandle {
        scene,
        camera,
        renderer,
        resize: Some(resize),
    })
}

fn resize_listener(
    camera: Rc<RefCell<PerspectiveCamera>>,
    renderer: Rc<RefCell<Renderer>>,
) -> ResizeListener {
    Rc::new(move |viewport: Viewport| {
        {
            let mut camera = camera.borrow_mut();
            camera.aspect = viewport.aspect();
            camera.update_projection_matrix();
        }
        renderer
            .borrow_mut()
            .set_size(viewport.width, viewport.height);
    })
}

fn load_environment(loader: &dyn AssetLoader, path: &str, scene: SharedScene) {
    let owned_path = path.to_string();
    loader.load(
        path,
        Box::new(move |bytes: Result<Vec<u8>, AssetError>| {
            let environment = bytes
                .map_err(anyhow::Error::from)
                .and_then(|bytes| EnvironmentMap::decode(&bytes).map_err(anyhow::Error::from));
            match environment {
                Ok(environment) => {
                    info!(
                        "environment {owned_path} ready ({} levels)",
                        environment.levels().len()
                    );
                    scene.set_environment(environment);
                }
                Err(err) => error!("environment {owned_path} not applied: {err}"),
            }
        }),
    );
}

fn load_scene_model(loader: &dyn AssetLoader, path: &str, scene: SharedScene) {
    let owned_path = path.to_string();
    loader.load(
        path,
        Box::new(move |bytes: Result<Vec<u8>, AssetError>| {
            let model = bytes
                .map_err(anyhow::Error::from)
                .and_then(|bytes| load_model(&owned_path, &bytes).map_err(anyhow::Error::from));
            match model {
                Ok(root) => {
                    info!("model {owned_path} ready ({} meshes)", root.mesh_count());
                    scene.add(root);
                }
                Err(err) => error!("model {owned_path} not added: {err}"),
            }
        }),
    );
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;
    use crate::assets::MemoryAssetLoader;
    use crate::host::DispatchHost;
    use crate::render::OutputEncoding;

    const BIRD_OBJ: &[u8] = b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

    fn test_config() -> SceneConfig {
        SceneConfig {
            environment_path: "assets/sky.png".to_string(),
            model_path: "assets/bird.obj".to_string(),
            ..SceneConfig::default()
        }
    }

    fn sky_png() -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        RgbImage::from_pixel(8, 4, Rgb([64, 128, 255]))
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    fn loader_with_assets() -> MemoryAssetLoader {
        let loader = MemoryAssetLoader::new();
        loader.insert("assets/sky.png", sky_png());
        loader.insert("assets/bird.obj", BIRD_OBJ);
        loader
    }

    #[test]
    fn construction_matches_viewport() {
        let host = DispatchHost::new(Viewport::new(1280, 720).with_pixel_ratio(2.0));
        let loader = MemoryAssetLoader::new();
        let handle = setup_scene(&host, &loader, &SceneConfig::default()).unwrap();

        let camera = handle.camera.borrow();
        assert_eq!(camera.aspect, 1280.0 / 720.0);
        assert_eq!((camera.fov, camera.near, camera.far), (70.0, 0.1, 5000.0));

        let renderer = handle.renderer.borrow();
        assert_eq!(renderer.size(), (1280, 720));
        assert_eq!(renderer.pixel_ratio(), 2.0);
        assert_eq!(renderer.drawing_buffer_size(), (2560, 1440));
        assert!(renderer.settings().antialias);
        assert_eq!(renderer.settings().output_encoding, OutputEncoding::Srgb);
        assert!(renderer.xr_enabled());
        assert_eq!(host.mounted_surfaces(), 1);
    }

    #[test]
    fn lights_are_added_before_assets_arrive() {
        let host = DispatchHost::new(Viewport::new(800, 600));
        let loader = MemoryAssetLoader::new();
        let handle = setup_scene(&host, &loader, &test_config()).unwrap();
        handle.scene.read(|scene| {
            let hemisphere = scene.hemisphere_light().unwrap();
            assert_eq!(hemisphere.sky_color, Vec3::splat(0x60 as f32 / 255.0));
            assert_eq!(hemisphere.ground_color, Vec3::splat(0x40 as f32 / 255.0));
            let sun = scene.directional_light().unwrap();
            assert!((sun.position - Vec3::ONE.normalize()).length() < 1e-6);
            assert!((sun.position.length() - 1.0).abs() < 1e-6);
            assert!(scene.children.is_empty());
            assert!(scene.environment.is_none());
        });
        assert_eq!(loader.pending_paths(), vec!["assets/sky.png", "assets/bird.obj"]);
    }

    #[test]
    fn resize_updates_camera_and_renderer() {
        let host = DispatchHost::new(Viewport::new(800, 600));
        let loader = MemoryAssetLoader::new();
        let handle = setup_scene(&host, &loader, &test_config()).unwrap();
        let before = handle.camera.borrow().projection_matrix();

        host.resize(Viewport::new(1920, 1080));
        assert_eq!(handle.camera.borrow().aspect, 1920.0 / 1080.0);
        assert_ne!(handle.camera.borrow().projection_matrix(), before);
        assert_eq!(handle.renderer.borrow().size(), (1920, 1080));
    }

    #[test]
    fn teardown_deregisters_resize_listener() {
        let host = DispatchHost::new(Viewport::new(800, 600));
        let loader = MemoryAssetLoader::new();
        let handle = setup_scene(&host, &loader, &test_config()).unwrap();
        let camera = Rc::clone(&handle.camera);
        assert_eq!(host.listener_count(), 1);

        handle.teardown();
        assert_eq!(host.listener_count(), 0);
        host.resize(Viewport::new(100, 400));
        assert_eq!(camera.borrow().aspect, 800.0 / 600.0);
    }

    #[test]
    fn repeated_mounts_do_not_accumulate_listeners() {
        let host = DispatchHost::new(Viewport::new(800, 600));
        let loader = MemoryAssetLoader::new();
        for _ in 0..3 {
            let handle = setup_scene(&host, &loader, &test_config()).unwrap();
            assert!(handle.is_tracking_resize());
        }
        assert_eq!(host.listener_count(), 0);
        assert_eq!(host.mounted_surfaces(), 3);
    }

    #[test]
    fn assets_land_in_either_order() {
        for model_first in [true, false] {
            let host = DispatchHost::new(Viewport::new(800, 600));
            let loader = loader_with_assets();
            let handle = setup_scene(&host, &loader, &test_config()).unwrap();
            let order = if model_first {
                ["assets/bird.obj", "assets/sky.png"]
            } else {
                ["assets/sky.png", "assets/bird.obj"]
            };
            for path in order {
                assert!(loader.complete(path));
            }
            handle.scene.read(|scene| {
                assert_eq!(scene.children.len(), 1);
                assert_eq!(scene.children[0].name, "bird");
                assert_eq!(scene.lights.len(), 2);
                let environment = scene.environment.as_ref().unwrap();
                let expected = Vec3::new(64.0 / 255.0, 128.0 / 255.0, 1.0);
                assert!((environment.irradiance() - expected).length() < 1e-5);
            });
        }
    }

    #[test]
    fn failed_loads_leave_scene_untouched() {
        let host = DispatchHost::new(Viewport::new(800, 600));
        let loader = MemoryAssetLoader::new();
        loader.insert("assets/sky.png", b"definitely not a png".to_vec());
        let handle = setup_scene(&host, &loader, &test_config()).unwrap();
        assert!(loader.complete("assets/sky.png"));
        assert!(loader.fail("assets/bird.obj", "404 Not Found"));
        handle.scene.read(|scene| {
            assert!(scene.environment.is_none());
            assert!(scene.children.is_empty());
            assert_eq!(scene.lights.len(), 2);
        });
    }

    #[test]
    fn frames_render_through_the_mounted_surface() {
        let host = DispatchHost::new(Viewport::new(320, 240));
        let loader = loader_with_assets();
        let handle = setup_scene(&host, &loader, &test_config()).unwrap();
        loader.complete_all();
        handle.render_frame().unwrap();
        handle.render_frame().unwrap();
        assert_eq!(handle.renderer.borrow().frames_rendered(), 2);
    }
}
