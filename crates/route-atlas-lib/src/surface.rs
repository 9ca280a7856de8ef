//! Map surface contract
//!
//! The render scheduler only needs three things from whatever draws the map:
//! replace every drawn route layer at once, report the current view, and emit
//! change notifications when the user pans, zooms or resizes. [`MapSurface`]
//! captures the first two; [`SurfaceEvent`] is the third.
//!
//! Surfaces are attached to host containers through [`SurfaceRegistry`],
//! which reuses an existing surface for a host it has already seen. The
//! drawing backend itself is loaded once per process through a
//! [`BackendLoader`].

use crate::bounds::BoundingBox;
use crate::scheduler::RenderItem;
use once_cell::sync::OnceCell;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Visible area and zoom level of a surface
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ViewState {
    pub bounds: BoundingBox,
    pub zoom: f64,
}

impl ViewState {
    pub fn new(bounds: BoundingBox, zoom: f64) -> Self {
        Self { bounds, zoom }
    }
}

/// Change notification emitted by a surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceEvent {
    Pan(ViewState),
    Zoom(ViewState),
    Resize(ViewState),
}

impl SurfaceEvent {
    /// View after the change
    pub fn view(&self) -> ViewState {
        match self {
            SurfaceEvent::Pan(v) | SurfaceEvent::Zoom(v) | SurfaceEvent::Resize(v) => *v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SurfaceError {
    #[error("Map backend not loaded")]
    BackendNotReady,

    #[error("Map backend failed to load: {0}")]
    BackendLoad(String),

    #[error("Map surface unavailable: {0}")]
    Unavailable(String),
}

/// Something that draws route layers
pub trait MapSurface: Send {
    /// Remove every route layer previously added and add `items` in order.
    fn replace_all(&mut self, items: &[RenderItem]) -> Result<(), SurfaceError>;

    /// Current view
    fn view(&self) -> ViewState;
}

/// Stable identifier of the host container a surface is attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostHandle(pub String);

impl From<&str> for HostHandle {
    fn from(s: &str) -> Self {
        HostHandle(s.to_string())
    }
}

/// Identity of the loaded drawing backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub name: String,
    pub version: String,
}

/// One-time backend initialization with explicit readiness
#[derive(Debug, Default)]
pub struct BackendLoader {
    cell: OnceCell<BackendInfo>,
}

impl BackendLoader {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Run `load` unless the backend is already loaded. A failed load leaves
    /// the loader not ready so a later call can retry.
    pub fn ensure_loaded<F>(&self, load: F) -> Result<&BackendInfo, SurfaceError>
    where
        F: FnOnce() -> Result<BackendInfo, SurfaceError>,
    {
        self.cell.get_or_try_init(|| {
            let info = load()?;
            tracing::info!("Map backend {} {} loaded", info.name, info.version);
            Ok(info)
        })
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.cell.get().is_some()
    }

    #[inline]
    pub fn get(&self) -> Option<&BackendInfo> {
        self.cell.get()
    }
}

/// Process-wide backend loader
pub static MAP_BACKEND: BackendLoader = BackendLoader::new();

/// Surfaces keyed by host handle
#[derive(Debug)]
pub struct SurfaceRegistry<S> {
    surfaces: HashMap<HostHandle, S>,
}

impl<S> Default for SurfaceRegistry<S> {
    fn default() -> Self {
        Self {
            surfaces: HashMap::new(),
        }
    }
}

impl<S: MapSurface> SurfaceRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the surface attached to `host`, creating it with `create` on
    /// first use. Calling this again for the same host never creates a second
    /// surface.
    pub fn attach_or_reuse<F>(
        &mut self,
        backend: &BackendLoader,
        host: HostHandle,
        create: F,
    ) -> Result<&mut S, SurfaceError>
    where
        F: FnOnce(&BackendInfo) -> Result<S, SurfaceError>,
    {
        let info = backend.get().ok_or(SurfaceError::BackendNotReady)?;
        match self.surfaces.entry(host) {
            std::collections::hash_map::Entry::Occupied(e) => Ok(e.into_mut()),
            std::collections::hash_map::Entry::Vacant(e) => {
                tracing::debug!("Attaching new map surface to host {:?}", e.key());
                let surface = create(info)?;
                Ok(e.insert(surface))
            }
        }
    }

    pub fn get_mut(&mut self, host: &HostHandle) -> Option<&mut S> {
        self.surfaces.get_mut(host)
    }

    pub fn detach(&mut self, host: &HostHandle) -> Option<S> {
        self.surfaces.remove(host)
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }
}

/// Surface that keeps layers in memory instead of drawing them
///
/// Used by the command-line driver and in tests.
#[derive(Debug, Clone, Default)]
pub struct HeadlessSurface {
    view: ViewState,
    layers: Vec<RenderItem>,
    replace_count: usize,
    last_removed: usize,
}

impl HeadlessSurface {
    pub fn new(view: ViewState) -> Self {
        Self {
            view,
            ..Default::default()
        }
    }

    /// Move the view and report it as a pan
    pub fn pan_to(&mut self, bounds: BoundingBox) -> SurfaceEvent {
        self.view.bounds = bounds;
        SurfaceEvent::Pan(self.view)
    }

    /// Change zoom and report it
    pub fn zoom_to(&mut self, zoom: f64) -> SurfaceEvent {
        self.view.zoom = zoom;
        SurfaceEvent::Zoom(self.view)
    }

    /// Change the visible area without moving the center of attention
    pub fn resize(&mut self, bounds: BoundingBox) -> SurfaceEvent {
        self.view.bounds = bounds;
        SurfaceEvent::Resize(self.view)
    }

    pub fn layers(&self) -> &[RenderItem] {
        &self.layers
    }

    /// Number of replace-all calls so far
    pub fn replace_count(&self) -> usize {
        self.replace_count
    }

    /// Layers removed by the last replace-all
    pub fn last_removed(&self) -> usize {
        self.last_removed
    }
}

impl MapSurface for HeadlessSurface {
    fn replace_all(&mut self, items: &[RenderItem]) -> Result<(), SurfaceError> {
        self.last_removed = self.layers.len();
        self.layers = items.to_vec();
        self.replace_count += 1;
        Ok(())
    }

    fn view(&self) -> ViewState {
        self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_backend() -> BackendInfo {
        BackendInfo {
            name: "headless".into(),
            version: "1".into(),
        }
    }

    fn item(id: &str) -> RenderItem {
        RenderItem {
            id: id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_backend_loads_once() {
        let loader = BackendLoader::new();
        assert!(!loader.is_ready());

        let mut calls = 0;
        loader
            .ensure_loaded(|| {
                calls += 1;
                Ok(test_backend())
            })
            .unwrap();
        loader
            .ensure_loaded(|| {
                calls += 1;
                Ok(test_backend())
            })
            .unwrap();
        assert_eq!(calls, 1);
        assert!(loader.is_ready());
    }

    #[test]
    fn test_failed_backend_load_can_retry() {
        let loader = BackendLoader::new();
        let err = loader
            .ensure_loaded(|| Err(SurfaceError::BackendLoad("offline".into())))
            .unwrap_err();
        assert_eq!(err, SurfaceError::BackendLoad("offline".into()));
        assert!(!loader.is_ready());
        assert!(loader.ensure_loaded(|| Ok(test_backend())).is_ok());
    }

    #[test]
    fn test_attach_requires_backend() {
        let loader = BackendLoader::new();
        let mut registry: SurfaceRegistry<HeadlessSurface> = SurfaceRegistry::new();
        let result = registry.attach_or_reuse(&loader, "map".into(), |_| {
            Ok(HeadlessSurface::default())
        });
        assert_eq!(result.unwrap_err(), SurfaceError::BackendNotReady);
    }

    #[test]
    fn test_attach_or_reuse_is_idempotent() {
        let loader = BackendLoader::new();
        loader.ensure_loaded(|| Ok(test_backend())).unwrap();
        let mut registry: SurfaceRegistry<HeadlessSurface> = SurfaceRegistry::new();

        let mut created = 0;
        let surface = registry
            .attach_or_reuse(&loader, "map".into(), |_| {
                created += 1;
                Ok(HeadlessSurface::default())
            })
            .unwrap();
        surface.replace_all(&[item("a")]).unwrap();

        let again = registry
            .attach_or_reuse(&loader, "map".into(), |_| {
                created += 1;
                Ok(HeadlessSurface::default())
            })
            .unwrap();
        assert_eq!(again.layers().len(), 1);
        assert_eq!(created, 1);
        assert_eq!(registry.len(), 1);

        registry
            .attach_or_reuse(&loader, "other".into(), |_| Ok(HeadlessSurface::default()))
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.detach(&"map".into()).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_replace_all_removes_previous_layers() {
        let mut surface = HeadlessSurface::default();
        surface.replace_all(&[item("a"), item("b")]).unwrap();
        surface.replace_all(&[item("c")]).unwrap();
        assert_eq!(surface.layers().len(), 1);
        assert_eq!(surface.layers()[0].id, "c");
        assert_eq!(surface.last_removed(), 2);
        assert_eq!(surface.replace_count(), 2);
    }

    #[test]
    fn test_headless_events_carry_view() {
        let mut surface = HeadlessSurface::new(ViewState::new(BoundingBox::from([0.0, 0.0, 1.0, 1.0]), 10.0));
        let e = surface.zoom_to(12.0);
        assert_eq!(e.view().zoom, 12.0);
        let e = surface.pan_to(BoundingBox::from([1.0, 1.0, 2.0, 2.0]));
        assert!(matches!(e, SurfaceEvent::Pan(_)));
        assert_eq!(surface.view().bounds.min_lon, 1.0);
        assert_eq!(surface.view().zoom, 12.0);
    }
}
