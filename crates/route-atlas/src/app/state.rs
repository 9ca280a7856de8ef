use crate::app::AppError;
use route_atlas_lib::export::{self, export_file_name, route_to_gpx};
use route_atlas_lib::ingest::ingest_parallel;
use route_atlas_lib::{ImportOptions, Route, RouteCollection, RouteStore, SourceFile};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Application state shared by every command
pub struct AppState {
    store: Box<dyn RouteStore>,

    /// Routes in memory; shared with the render loop
    pub route_collection: Arc<RwLock<RouteCollection>>,

    /// Statistics
    pub stats: Stats,
}

/// Outcome of importing files
#[derive(Debug, Default)]
pub struct ImportSummary {
    pub imported: usize,
    /// (file, error) for every file that could not be read or parsed
    pub failures: Vec<(String, String)>,
    pub skipped_points: usize,
    pub merged_tracks: usize,
}

#[derive(Debug, Default)]
pub struct Stats {
    pub route_count: usize,
    pub total_points: usize,
    pub total_distance_km: f64,
}

impl AppState {
    pub fn new(store: Box<dyn RouteStore>) -> Self {
        Self {
            store,
            route_collection: Arc::new(RwLock::new(RouteCollection::new())),
            stats: Stats::default(),
        }
    }

    /// Load every stored route into the collection
    pub async fn load_from_store(&mut self) -> Result<usize, AppError> {
        let records = self.store.all_routes()?;
        let count = records.len();
        {
            let mut collection = self.route_collection.write().await;
            collection.clear();
            collection.add_routes_parallel(records);
        }
        self.update_stats().await;
        tracing::debug!("Loaded {} routes from storage", count);
        Ok(count)
    }

    /// Import GPX files.
    ///
    /// Files are read concurrently and parsed on the blocking pool. A file
    /// that cannot be read or parsed is reported and skipped; the others are
    /// still imported.
    pub async fn load_gpx_files(
        &mut self,
        paths: &[PathBuf],
        options: &ImportOptions,
    ) -> Result<ImportSummary, AppError> {
        let mut summary = ImportSummary::default();

        // Read files outside of any lock
        let batch = batch_id();
        let reads: Vec<_> = paths
            .iter()
            .cloned()
            .map(|path| {
                tokio::spawn(async move {
                    let result = tokio::fs::read_to_string(&path).await;
                    (path, result)
                })
            })
            .collect();
        let mut sources = Vec::with_capacity(paths.len());
        for (i, read) in reads.into_iter().enumerate() {
            let (path, result) = read.await?;
            let name = path.to_string_lossy().to_string();
            match result {
                Ok(contents) => sources.push(SourceFile {
                    job_id: format!("{}-{}", batch, i),
                    name,
                    contents,
                }),
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", name, e);
                    summary.failures.push((name, e.to_string()));
                }
            }
        }

        let options = options.clone();
        let report = tokio::task::spawn_blocking(move || ingest_parallel(&sources, &options)).await?;

        summary.failures.extend(
            report
                .failures
                .iter()
                .map(|f| (f.name.clone(), f.error.to_string())),
        );
        summary.skipped_points = report.skipped_points;
        summary.merged_tracks = report.merged_tracks;
        summary.imported = report.routes.len();

        self.store.add_routes(&report.routes)?;
        self.route_collection
            .write()
            .await
            .add_routes_parallel(report.routes);
        self.update_stats().await;

        tracing::info!(
            "Imported {} routes from {} files ({} failed)",
            summary.imported,
            paths.len(),
            summary.failures.len()
        );
        Ok(summary)
    }

    /// Import every route of a JSON backup. Fails without importing anything
    /// if one of its ids is already stored.
    pub async fn restore_backup(&mut self, path: &Path) -> Result<usize, AppError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| AppError::io(path, source))?;
        let doc = export::import_backup(&json)?;
        self.store.add_routes(&doc.routes)?;
        let count = doc.routes.len();
        self.route_collection
            .write()
            .await
            .add_routes_parallel(doc.routes);
        self.update_stats().await;
        tracing::info!("Restored {} routes exported at {}", count, doc.exported_at);
        Ok(count)
    }

    /// Delete routes from storage and memory. Missing ids are ignored.
    pub async fn delete_routes(&mut self, ids: &[String]) -> Result<usize, AppError> {
        let mut removed = 0;
        {
            let mut collection = self.route_collection.write().await;
            for id in ids {
                self.store.delete_route(id)?;
                if collection.remove_route(id).is_some() {
                    removed += 1;
                } else {
                    tracing::debug!("Route {} was not loaded", id);
                }
            }
        }
        self.update_stats().await;
        Ok(removed)
    }

    /// Rename or recolor a stored route. The record is replaced in storage
    /// and in the collection, keeping its id.
    pub async fn edit_route(
        &mut self,
        id: &str,
        name: Option<String>,
        color: Option<String>,
        category: Option<String>,
    ) -> Result<Arc<Route>, AppError> {
        let mut collection = self.route_collection.write().await;
        let original = collection
            .get_route(id)
            .map(|route| route.record().clone())
            .ok_or_else(|| AppError::RouteNotFound(id.to_string()))?;
        let edited = original.clone().with_edits(name, color, category);

        self.store.delete_route(id)?;
        if let Err(e) = self.store.add_routes(std::slice::from_ref(&edited)) {
            tracing::warn!("Failed to store edited route {}, restoring it: {}", id, e);
            self.store.add_routes(&[original])?;
            return Err(e.into());
        }
        let route = collection.add_route(edited);
        drop(collection);
        self.update_stats().await;

        tracing::info!("Edited route {}", id);
        Ok(route)
    }

    /// Routes by id, or every route when `ids` is empty
    pub async fn select_routes(&self, ids: &[String]) -> Result<Vec<Arc<Route>>, AppError> {
        let collection = self.route_collection.read().await;
        if ids.is_empty() {
            return Ok(collection.routes().to_vec());
        }
        ids.iter()
            .map(|id| {
                collection
                    .get_route(id)
                    .cloned()
                    .ok_or_else(|| AppError::RouteNotFound(id.clone()))
            })
            .collect()
    }

    /// Write one GPX file per route into `out_dir`
    pub async fn export_gpx(&self, ids: &[String], out_dir: &Path) -> Result<Vec<PathBuf>, AppError> {
        let routes = self.select_routes(ids).await?;
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|source| AppError::io(out_dir, source))?;

        let mut used = HashSet::new();
        let mut written = Vec::with_capacity(routes.len());
        for route in &routes {
            let xml = route_to_gpx(route)?;
            let path = out_dir.join(unique_file_name(&export_file_name(route), &mut used));
            tokio::fs::write(&path, xml)
                .await
                .map_err(|source| AppError::io(&path, source))?;
            written.push(path);
        }
        Ok(written)
    }

    /// Write the selected routes into one JSON backup
    pub async fn export_backup(&self, ids: &[String], path: &Path) -> Result<usize, AppError> {
        let routes = self.select_routes(ids).await?;
        let records: Vec<_> = routes.iter().map(|r| r.record().clone()).collect();
        let json = export::export_backup(&records)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| AppError::io(parent, source))?;
        }
        tokio::fs::write(path, json)
            .await
            .map_err(|source| AppError::io(path, source))?;
        Ok(records.len())
    }

    pub async fn update_stats(&mut self) {
        let info = self.route_collection.read().await.get_info();
        self.stats = Stats {
            route_count: info.route_count,
            total_points: info.total_points,
            total_distance_km: info.total_distance_km,
        };
    }
}

static IMPORT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Distinct per import so that re-importing a file never collides with the
/// ids of an earlier import
fn batch_id() -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{:x}.{}", millis, IMPORT_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// `name`, or `name` with a numeric suffix before the extension if taken
fn unique_file_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    let mut n = 2;
    loop {
        let candidate = if ext.is_empty() {
            format!("{}_{}", stem, n)
        } else {
            format!("{}_{}.{}", stem, n, ext)
        };
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

impl Stats {
    /// Format distance for display
    pub fn format_distance(&self) -> String {
        if self.total_distance_km < 1.0 {
            format!("{:.0} m", self.total_distance_km * 1000.0)
        } else if self.total_distance_km < 100.0 {
            format!("{:.2} km", self.total_distance_km)
        } else {
            format!("{:.0} km", self.total_distance_km)
        }
    }

    /// Format point count with thousands separators
    pub fn format_points(&self) -> String {
        format_number_with_commas(self.total_points)
    }
}

/// Helper to format numbers with comma separators
fn format_number_with_commas(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use route_atlas_lib::{MemoryRouteStore, PeriodKey};

    const GPX: &str = r#"<?xml version="1.0"?>
<gpx version="1.1" creator="test">
  <trk><name>Morning Ride</name><trkseg>
    <trkpt lat="51.0" lon="8.0"><ele>100</ele><time>2024-06-15T08:00:00Z</time></trkpt>
    <trkpt lat="51.01" lon="8.01"><ele>110</ele><time>2024-06-15T08:10:00Z</time></trkpt>
  </trkseg></trk>
  <trk><name>Morning Ride</name><trkseg>
    <trkpt lat="51.0" lon="8.0"><ele>100</ele><time>2024-06-15T08:00:00Z</time></trkpt>
    <trkpt lat="51.01" lon="8.01"><ele>110</ele><time>2024-06-15T08:10:00Z</time></trkpt>
  </trkseg></trk>
</gpx>"#;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("route-atlas-state-{}-{}", std::process::id(), name));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_format_number_with_commas() {
        assert_eq!(format_number_with_commas(0), "0");
        assert_eq!(format_number_with_commas(999), "999");
        assert_eq!(format_number_with_commas(1000), "1,000");
        assert_eq!(format_number_with_commas(1234567), "1,234,567");
    }

    #[test]
    fn test_format_distance() {
        let mut stats = Stats {
            total_distance_km: 0.5,
            ..Default::default()
        };
        assert_eq!(stats.format_distance(), "500 m");
        stats.total_distance_km = 12.345;
        assert_eq!(stats.format_distance(), "12.35 km");
        stats.total_distance_km = 1234.4;
        assert_eq!(stats.format_distance(), "1234 km");
    }

    #[test]
    fn test_unique_file_name() {
        let mut used = HashSet::new();
        assert_eq!(unique_file_name("a.gpx", &mut used), "a.gpx");
        assert_eq!(unique_file_name("a.gpx", &mut used), "a_2.gpx");
        assert_eq!(unique_file_name("a.gpx", &mut used), "a_3.gpx");
    }

    #[tokio::test]
    async fn test_import_export_delete() {
        let dir = temp_dir("import");
        let good = dir.join("ride.gpx");
        let bad = dir.join("broken.gpx");
        std::fs::write(&good, GPX).unwrap();
        std::fs::write(&bad, "<gpx><trk></gpx>").unwrap();
        let missing = dir.join("missing.gpx");

        let mut state = AppState::new(Box::new(MemoryRouteStore::new()));
        let options = ImportOptions {
            merge_identical_tracks: true,
            period_grouping: PeriodKey::Week,
            ..Default::default()
        };
        let summary = state
            .load_gpx_files(&[good.clone(), bad, missing], &options)
            .await
            .unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.merged_tracks, 1);
        assert_eq!(summary.failures.len(), 2);
        assert_eq!(state.stats.route_count, 1);

        // Importing the same file again yields new ids
        state.load_gpx_files(&[good], &ImportOptions::default()).await.unwrap();
        assert_eq!(state.stats.route_count, 3);

        let out = dir.join("out");
        let written = state.export_gpx(&[], &out).await.unwrap();
        assert_eq!(written.len(), 3);
        assert!(written.iter().all(|p| p.exists()));
        assert!(out.join("Morning_Ride_2.gpx").exists());

        let backup = dir.join("backup.json");
        assert_eq!(state.export_backup(&[], &backup).await.unwrap(), 3);

        let ids: Vec<String> = state
            .select_routes(&[])
            .await
            .unwrap()
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(state.delete_routes(&ids).await.unwrap(), 3);
        assert_eq!(state.stats.route_count, 0);
        assert!(matches!(
            state.select_routes(&ids[..1]).await,
            Err(AppError::RouteNotFound(_))
        ));

        assert_eq!(state.restore_backup(&backup).await.unwrap(), 3);
        assert_eq!(state.stats.route_count, 3);
        // Second restore collides with the restored ids
        assert!(state.restore_backup(&backup).await.is_err());
        assert_eq!(state.stats.route_count, 3);
    }

    #[tokio::test]
    async fn test_edit_route() {
        let store = MemoryRouteStore::new();
        store
            .add_routes(&[route_atlas_lib::RouteRecord {
                id: "x:0".into(),
                name: "Before".into(),
                ..Default::default()
            }])
            .unwrap();
        let mut state = AppState::new(Box::new(store));
        state.load_from_store().await.unwrap();

        let route = state
            .edit_route("x:0", Some("After".into()), Some("#123456".into()), None)
            .await
            .unwrap();
        assert_eq!(route.name(), "After");
        assert_eq!(route.color(), Some("#123456"));
        assert!(route.record().updated_at.is_some());
        assert_eq!(state.stats.route_count, 1);

        // Storage holds the edited record
        state.load_from_store().await.unwrap();
        let reloaded = state.select_routes(&["x:0".into()]).await.unwrap();
        assert_eq!(reloaded[0].name(), "After");

        assert!(matches!(
            state.edit_route("missing", None, None, None).await,
            Err(AppError::RouteNotFound(ref id)) if id == "missing"
        ));
    }

    #[tokio::test]
    async fn test_load_from_store() {
        let store = MemoryRouteStore::new();
        store
            .add_routes(&[route_atlas_lib::RouteRecord {
                id: "x:0".into(),
                name: "Stored".into(),
                ..Default::default()
            }])
            .unwrap();
        let mut state = AppState::new(Box::new(store));
        assert_eq!(state.load_from_store().await.unwrap(), 1);
        assert_eq!(state.stats.route_count, 1);
        assert_eq!(state.stats.format_points(), "0");
    }
}
