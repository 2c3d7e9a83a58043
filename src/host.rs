use std::cell::{Cell, RefCell};
use std::rc::Rc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::render::{HeadlessSurface, RenderSurface, RendererSettings};

/// Visible area of the host page or window, in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_pixel_ratio: f32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            device_pixel_ratio: 1.0,
        }
    }

    pub const fn with_pixel_ratio(mut self, device_pixel_ratio: f32) -> Self {
        self.device_pixel_ratio = device_pixel_ratio;
        self
    }

    /// Width over height; 1.0 while the viewport is collapsed.
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

pub type ResizeListener = Rc<dyn Fn(Viewport)>;

/// Keeps a resize listener registered until dropped or cancelled.
#[must_use = "dropping the subscription removes the listener"]
pub struct ResizeSubscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl ResizeSubscription {
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn cancel(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ResizeSubscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

/// Environment the scene is mounted into: a browser page or a native window.
///
/// Callbacks are dispatched serially on the host's own thread.
pub trait Host {
    fn viewport(&self) -> Viewport;

    /// Creates the renderer's output surface and attaches it to the host.
    fn mount_surface(&self, settings: &RendererSettings) -> Result<Box<dyn RenderSurface>>;

    fn on_resize(&self, listener: ResizeListener) -> Result<ResizeSubscription>;
}

type SurfaceFactory = Box<dyn Fn(&RendererSettings) -> Result<Box<dyn RenderSurface>>>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, ResizeListener)>,
}

/// Host whose viewport changes are pushed in by the embedder.
///
/// Used by the native window loop, which forwards winit resize events, and
/// by tests, which simulate them.
pub struct DispatchHost {
    viewport: Cell<Viewport>,
    listeners: Rc<RefCell<Listeners>>,
    factory: SurfaceFactory,
    mounted: Cell<usize>,
}

impl DispatchHost {
    /// Host that mounts [`HeadlessSurface`]s.
    pub fn new(viewport: Viewport) -> Self {
        Self::with_surface_factory(viewport, |_| Ok(Box::new(HeadlessSurface::new())))
    }

    pub fn with_surface_factory(
        viewport: Viewport,
        factory: impl Fn(&RendererSettings) -> Result<Box<dyn RenderSurface>> + 'static,
    ) -> Self {
        Self {
            viewport: Cell::new(viewport),
            listeners: Rc::new(RefCell::new(Listeners::default())),
            factory: Box::new(factory),
            mounted: Cell::new(0),
        }
    }

    /// Updates the viewport and notifies every listener in registration order.
    pub fn resize(&self, viewport: Viewport) {
        self.viewport.set(viewport);
        let listeners: Vec<ResizeListener> = self
            .listeners
            .borrow()
            .entries
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(viewport);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().entries.len()
    }

    pub fn mounted_surfaces(&self) -> usize {
        self.mounted.get()
    }
}

impl Host for DispatchHost {
    fn viewport(&self) -> Viewport {
        self.viewport.get()
    }

    fn mount_surface(&self, settings: &RendererSettings) -> Result<Box<dyn RenderSurface>> {
        let surface = (self.factory)(settings)?;
        self.mounted.set(self.mounted.get() + 1);
        Ok(surface)
    }

    fn on_resize(&self, listener: ResizeListener) -> Result<ResizeSubscription> {
        let id = {
            let mut listeners = self.listeners.borrow_mut();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push((id, listener));
            id
        };
        let registry = Rc::downgrade(&self.listeners);
        Ok(ResizeSubscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.borrow_mut().entries.retain(|(entry, _)| *entry != id);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(host: &DispatchHost) -> (Rc<Cell<u32>>, ResizeSubscription) {
        let hits = Rc::new(Cell::new(0));
        let sink = Rc::clone(&hits);
        let subscription = host
            .on_resize(Rc::new(move |_| sink.set(sink.get() + 1)))
            .unwrap();
        (hits, subscription)
    }

    #[test]
    fn collapsed_viewport_reports_square_aspect() {
        assert_eq!(Viewport::new(1600, 800).aspect(), 2.0);
        assert_eq!(Viewport::new(1600, 0).aspect(), 1.0);
    }

    #[test]
    fn listeners_see_every_resize_until_dropped() {
        let host = DispatchHost::new(Viewport::new(100, 100));
        let (hits, subscription) = counter(&host);
        host.resize(Viewport::new(200, 100));
        host.resize(Viewport::new(300, 100));
        assert_eq!(hits.get(), 2);
        assert_eq!(host.viewport(), Viewport::new(300, 100));

        drop(subscription);
        host.resize(Viewport::new(400, 100));
        assert_eq!(hits.get(), 2);
        assert_eq!(host.listener_count(), 0);
    }

    #[test]
    fn cancelling_one_subscription_keeps_the_others() {
        let host = DispatchHost::new(Viewport::new(100, 100));
        let (first, first_sub) = counter(&host);
        let (second, _second_sub) = counter(&host);
        first_sub.cancel();
        host.resize(Viewport::new(50, 50));
        assert_eq!((first.get(), second.get()), (0, 1));
    }

    #[test]
    fn subscription_outliving_host_is_harmless() {
        let host = DispatchHost::new(Viewport::new(100, 100));
        let (_, subscription) = counter(&host);
        drop(host);
        drop(subscription);
    }
}
