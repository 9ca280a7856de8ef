//! Route Atlas Library - Adaptive rendering of large GPS route collections
//!
//! This library turns raw GPX files into route records and decides, for every
//! viewport change, which routes to draw and at what level of detail. The goal
//! is a stable frame rate no matter how many routes are loaded or how dense
//! they are.
//!
//! # Architecture
//!
//! - **[`parser`]**: Lenient GPX parsing into [`Track`]s, dropping invalid points
//! - **[`simplify`]**: Radial-distance + Douglas-Peucker line simplification
//! - **[`BoundingBox`]**: Cached route bounds and viewport intersection
//! - **[`RenderScheduler`]**: Debounced render cycles, candidate selection and styling
//! - **[`PerformanceMonitor`]**: Render timing feeding an advisory degrade signal
//! - **[`MapSurface`]**: Contract for whatever draws the routes
//! - **[`RouteStore`]**: Contract for route persistence
//!
//! # Performance Characteristics
//!
//! - **Parsing**: O(N) per file, files parsed in parallel
//! - **Selection**: O(R log R) per viewport change (R = routes), linear scan
//! - **Simplification**: O(N log N) typical per selected route, in parallel

pub mod bounds;
pub mod collection;
pub mod color;
pub mod export;
pub mod ingest;
pub mod monitor;
pub mod parser;
pub mod route;
pub mod scheduler;
pub mod simplify;
pub mod storage;
pub mod surface;
pub mod utils;

// Public API exports
pub use bounds::BoundingBox;
pub use collection::{CollectionInfo, RouteCollection};
pub use color::{PALETTE, PeriodKey, resolve_route_color, route_color};
pub use ingest::{ColorMode, ImportOptions, IngestReport, SourceFile};
pub use monitor::{PerformanceMonitor, RenderMetrics};
pub use parser::ParseError;
pub use route::{Route, RouteRecord, RouteStats, Track, TrackPoint};
pub use scheduler::{RenderConfig, RenderItem, RenderPlan, RenderScheduler, RenderSkip, SchedulerPhase};
pub use simplify::ToleranceConfig;
pub use storage::{MemoryRouteStore, RouteStore, StorageError};
pub use surface::{HeadlessSurface, HostHandle, MapSurface, SurfaceError, SurfaceEvent, ViewState};

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("GPX writing error: {0}")]
    Gpx(#[from] gpx::errors::GpxError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Map surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported backup version: {0}")]
    UnsupportedBackupVersion(u32),

    #[error("Export error: {0}")]
    Export(String),
}

pub type Result<T> = std::result::Result<T, DataError>;
