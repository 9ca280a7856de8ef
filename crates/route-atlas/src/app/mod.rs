//! Application module
//!
//! Command-line front end over the route-atlas library:
//! - Import GPX files into a persistent JSON store
//! - List, edit, export and delete stored routes
//! - Drive the render scheduler over a sequence of views on a headless surface

pub mod cli;
pub mod driver;
pub mod logging;
pub mod settings;
pub mod state;
pub mod storage;

use crate::app::settings::{Command, Settings, import_options};
use crate::app::state::AppState;
use crate::app::storage::{FileStorage, KeyValueRouteStore};
use route_atlas_lib::surface::{BackendInfo, MAP_BACKEND, SurfaceRegistry};
use route_atlas_lib::{DataError, HeadlessSurface, PeriodKey, RenderScheduler, SurfaceError, SurfaceEvent, ViewState};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Storage(#[from] storage::StorageError),

    #[error(transparent)]
    RouteStore(#[from] route_atlas_lib::StorageError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AppError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Host container the command-line surface is attached to
const CLI_HOST: &str = "cli";

/// Run the command selected on the command line
pub async fn run(settings: Settings) -> Result<(), AppError> {
    let storage = FileStorage::new_with_path(settings.storage_path())?;
    tracing::debug!("Using storage {}", storage.path().display());
    let mut state = AppState::new(Box::new(KeyValueRouteStore::new(storage)));

    match &settings.command {
        Command::Import {
            files,
            color,
            group,
            merge_identical,
            category,
        } => {
            let options = import_options(color.as_deref(), *group, *merge_identical, category.as_deref());
            let summary = state.load_gpx_files(files, &options).await?;
            println!("Imported {} routes", summary.imported);
            if summary.merged_tracks > 0 {
                println!("Merged {} identical tracks", summary.merged_tracks);
            }
            if summary.skipped_points > 0 {
                println!("Skipped {} points with invalid coordinates", summary.skipped_points);
            }
            for (file, error) in &summary.failures {
                println!("Failed: {}: {}", file, error);
            }
        }
        Command::List { period } => {
            state.load_from_store().await?;
            list_routes(&state, *period).await;
        }
        Command::Render { views, interval_ms } => {
            state.load_from_store().await?;
            let plan = render_views(&state, &settings, views, Duration::from_millis(*interval_ms)).await?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Command::Export { ids, out, backup } => {
            state.load_from_store().await?;
            if *backup {
                let count = state.export_backup(ids, out).await?;
                println!("Wrote {} routes to {}", count, out.display());
            } else {
                for path in state.export_gpx(ids, out).await? {
                    println!("{}", path.display());
                }
            }
        }
        Command::Restore { file } => {
            state.load_from_store().await?;
            let count = state.restore_backup(file).await?;
            println!("Restored {} routes", count);
        }
        Command::Edit {
            id,
            name,
            color,
            category,
        } => {
            state.load_from_store().await?;
            let route = state
                .edit_route(id, name.clone(), color.clone(), category.clone())
                .await?;
            println!(
                "{}\t{}\t{}\t{}",
                route.id(),
                route.name(),
                route.color().unwrap_or("-"),
                route.category().unwrap_or("-")
            );
        }
        Command::Delete { ids } => {
            state.load_from_store().await?;
            let removed = state.delete_routes(ids).await?;
            println!("Deleted {} routes", removed);
        }
    }
    Ok(())
}

async fn list_routes(state: &AppState, period: Option<PeriodKey>) {
    let collection = state.route_collection.read().await;
    let routes = match period {
        Some(period) => collection.routes_by_period(period),
        None => collection.routes().to_vec(),
    };
    for route in &routes {
        let distance = route
            .stats()
            .distance_km
            .map(|d| format!("{:.2} km", d))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\t{}\t{}\t{}\t{} points\t{}",
            route.id(),
            route.name(),
            route.date().unwrap_or("-"),
            route.period_key(),
            route.total_points(),
            distance
        );
    }
    println!(
        "{} routes, {} points, {}",
        state.stats.route_count,
        state.stats.format_points(),
        state.stats.format_distance()
    );
}

/// Play `views` into a headless surface, `interval` apart, and return the
/// last committed plan
async fn render_views(
    state: &AppState,
    settings: &Settings,
    views: &[ViewState],
    interval: Duration,
) -> Result<route_atlas_lib::RenderPlan, AppError> {
    MAP_BACKEND.ensure_loaded(|| {
        Ok(BackendInfo {
            name: "headless".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        })
    })?;

    let first = views.first().copied().unwrap_or_default();
    let mut registry: SurfaceRegistry<HeadlessSurface> = SurfaceRegistry::new();
    let surface = registry.attach_or_reuse(&MAP_BACKEND, CLI_HOST.into(), |_| Ok(HeadlessSurface::new(first)))?;

    let (tx, rx) = mpsc::channel(views.len().max(1));
    let host_views = views.to_vec();
    let host = tokio::spawn(async move {
        let mut previous_zoom = None;
        for (i, view) in host_views.into_iter().enumerate() {
            if i > 0 && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            let event = match previous_zoom {
                Some(zoom) if zoom != view.zoom => SurfaceEvent::Zoom(view),
                Some(_) => SurfaceEvent::Pan(view),
                None => SurfaceEvent::Resize(view),
            };
            previous_zoom = Some(view.zoom);
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });

    let mut scheduler = RenderScheduler::new(settings.render.to_config());
    let plan = driver::run_render_loop(&mut scheduler, state.route_collection.clone(), &mut *surface, rx).await?;
    host.await?;

    if let Some(fps) = scheduler.monitor().average_fps() {
        tracing::info!("Average frame rate over the session: {:.1}", fps);
    }
    Ok(plan.unwrap_or_default())
}
