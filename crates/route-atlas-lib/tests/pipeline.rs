//! End-to-end: GPX text -> records -> store -> collection -> render cycles -> surface

use instant::Instant;
use route_atlas_lib::ingest::ingest_parallel;
use route_atlas_lib::surface::{BackendInfo, BackendLoader, SurfaceRegistry};
use route_atlas_lib::{
    BoundingBox, HeadlessSurface, ImportOptions, MapSurface, MemoryRouteStore, PeriodKey,
    RenderConfig, RenderScheduler, RouteCollection, RouteStore, SchedulerPhase, SourceFile,
    ViewState,
};
use std::fmt::Write as _;
use std::time::Duration;

/// A GPX file with one track per entry of `starts`, each a short diagonal
fn gpx_file(starts: &[(f64, f64)], points: usize) -> String {
    let mut xml = String::from(r#"<?xml version="1.0"?><gpx version="1.1" creator="test">"#);
    for (n, (lat, lon)) in starts.iter().enumerate() {
        let _ = write!(xml, "<trk><name>Track {}</name><trkseg>", n);
        for i in 0..points {
            let _ = write!(
                xml,
                r#"<trkpt lat="{}" lon="{}"><time>2024-06-{:02}T08:00:00Z</time></trkpt>"#,
                lat + i as f64 * 0.0001,
                lon + i as f64 * 0.0001,
                n % 28 + 1
            );
        }
        xml.push_str("</trkseg></trk>");
    }
    xml.push_str("</gpx>");
    xml
}

fn load_collection() -> RouteCollection {
    let sources = vec![
        SourceFile {
            job_id: "job-1".into(),
            name: "north.gpx".into(),
            contents: gpx_file(&[(51.0, 8.0), (51.2, 8.2)], 50),
        },
        SourceFile {
            job_id: "job-2".into(),
            name: "broken.gpx".into(),
            contents: "<gpx><trk><trkseg></trk></gpx>".into(),
        },
        SourceFile {
            job_id: "job-3".into(),
            name: "south.gpx".into(),
            contents: gpx_file(&[(45.0, 7.0)], 2_000),
        },
    ];
    let report = ingest_parallel(&sources, &ImportOptions::default());
    assert_eq!(report.failures.len(), 1);

    let store = MemoryRouteStore::new();
    store.add_routes(&report.routes).unwrap();
    assert!(store.add_routes(&report.routes[..1]).is_err());
    assert_eq!(store.routes_by_period(PeriodKey::Month).unwrap().len(), 3);

    store.all_routes().unwrap().into_iter().collect()
}

#[test]
fn test_full_render_cycle() {
    let collection = load_collection();
    assert_eq!(collection.route_count(), 3);

    let loader = BackendLoader::new();
    loader
        .ensure_loaded(|| {
            Ok(BackendInfo {
                name: "headless".into(),
                version: "test".into(),
            })
        })
        .unwrap();
    let mut registry: SurfaceRegistry<HeadlessSurface> = SurfaceRegistry::new();
    let start_view = ViewState::new(BoundingBox::new(7.5, 50.5, 8.5, 51.5), 15.0);
    let surface = registry
        .attach_or_reuse(&loader, "main-map".into(), |_| Ok(HeadlessSurface::new(start_view)))
        .unwrap();

    let config = RenderConfig::default();
    let debounce = config.debounce();
    let mut scheduler = RenderScheduler::new(config);

    // A burst of pan events coalesces into one pass for the last view
    let t0 = Instant::now();
    for i in 0..5 {
        let shift = i as f64 * 0.01;
        let event = surface.pan_to(BoundingBox::new(7.5 + shift, 50.5, 8.5 + shift, 51.5));
        scheduler.notify(event.view(), t0 + Duration::from_millis(i * 10));
        scheduler.poll(t0 + Duration::from_millis(i * 10));
    }
    let last_change = t0 + Duration::from_millis(40);
    assert!(scheduler.poll(last_change + debounce / 2).is_none());
    let request = scheduler.poll(last_change + debounce).expect("debounced pass");
    assert_eq!(request.view, surface.view());

    let plan = scheduler.compute(&request, collection.routes());
    let metrics = scheduler
        .commit(&plan, &mut *surface, request.started_at, last_change + debounce)
        .unwrap();

    // Only the northern routes intersect; the southern one is culled
    let ids: Vec<&str> = surface.layers().iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.iter().all(|id| id.starts_with("job-1:")));
    assert_eq!(metrics.route_count, 2);
    assert_eq!(surface.replace_count(), 1);

    // Zoom out to see everything; the dense route gets simplified
    let event = surface.resize(BoundingBox::new(6.0, 44.0, 9.0, 52.0));
    scheduler.notify(event.view(), last_change + debounce);
    let event = surface.zoom_to(8.0);
    scheduler.notify(event.view(), last_change + debounce);
    let request = scheduler.flush(last_change + debounce).unwrap();
    let plan = scheduler.compute(&request, collection.routes());
    scheduler
        .commit(&plan, &mut *surface, request.started_at, last_change + debounce)
        .unwrap();

    assert_eq!(surface.layers().len(), 3);
    assert_eq!(surface.last_removed(), 2);
    let dense = surface
        .layers()
        .iter()
        .find(|l| l.id.starts_with("job-3:"))
        .unwrap();
    assert!(dense.simplified);
    assert!(dense.point_count() < 2_000);
    assert!(surface.layers().iter().all(|l| l.color.starts_with('#')));

    assert_eq!(scheduler.phase(), SchedulerPhase::Committed);
    assert_eq!(scheduler.monitor().len(), 2);
}
