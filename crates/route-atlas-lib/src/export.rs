//! Route export
//!
//! A single route is written as a GPX 1.1 document with one `<trkseg>` per
//! line. Several routes are written as a versioned JSON backup that can be
//! imported again.

use crate::route::{Route, TrackPoint};
use crate::{DataError, Result, utils};
use geo::Point;
use gpx::{Gpx, GpxVersion, Metadata, Track, TrackSegment, Waypoint};

/// Value of the `creator` attribute of exported documents
pub const GPX_CREATOR: &str = "route-atlas";

fn to_waypoint(p: &TrackPoint) -> Waypoint {
    let mut wp = Waypoint::new(Point::new(p.lon, p.lat));
    wp.elevation = p.elevation;
    wp.time = p
        .timestamp
        .as_deref()
        .and_then(utils::parse_timestamp)
        .map(gpx::Time::from);
    wp
}

/// Serialize one route as a GPX 1.1 document.
pub fn route_to_gpx(route: &Route) -> Result<String> {
    #[cfg(feature = "profiling")]
    profiling::scope!("export::route_to_gpx");

    let track = Track {
        name: Some(route.name().to_string()),
        type_: route.category().map(str::to_string),
        segments: route
            .lines()
            .iter()
            .map(|line| TrackSegment {
                points: line.iter().map(to_waypoint).collect(),
            })
            .collect(),
        ..Default::default()
    };

    let gpx = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some(GPX_CREATOR.to_string()),
        metadata: Some(Metadata {
            name: Some(route.name().to_string()),
            time: route
                .date()
                .and_then(utils::parse_timestamp)
                .map(gpx::Time::from),
            ..Default::default()
        }),
        tracks: vec![track],
        ..Default::default()
    };

    let mut buf = Vec::new();
    gpx::write(&gpx, &mut buf)?;
    String::from_utf8(buf).map_err(|e| DataError::Export(e.to_string()))
}

/// File name for an exported route: the route name with anything other than
/// ASCII letters and digits replaced by `_`.
pub fn export_file_name(route: &Route) -> String {
    let stem: String = route
        .name()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if stem.is_empty() {
        format!("{}.gpx", route.id().replace(':', "_"))
    } else {
        format!("{}.gpx", stem)
    }
}

#[cfg(feature = "serde")]
pub use backup::*;

#[cfg(feature = "serde")]
mod backup {
    use crate::route::RouteRecord;
    use crate::{DataError, Result, utils};
    use serde::{Deserialize, Serialize};

    /// Only backup format version this build reads and writes
    pub const BACKUP_VERSION: u32 = 1;

    /// Multi-route backup document
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct BackupDocument {
        pub version: u32,
        pub exported_at: String,
        pub routes: Vec<RouteRecord>,
    }

    #[derive(Deserialize)]
    struct VersionHeader {
        version: u32,
    }

    /// Serialize routes as a pretty-printed JSON backup
    pub fn export_backup(routes: &[RouteRecord]) -> Result<String> {
        let doc = BackupDocument {
            version: BACKUP_VERSION,
            exported_at: utils::now_rfc3339(),
            routes: routes.to_vec(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Read a backup produced by [`export_backup`].
    ///
    /// Any version other than [`BACKUP_VERSION`] is rejected before the
    /// routes are looked at.
    pub fn import_backup(json: &str) -> Result<BackupDocument> {
        let header: VersionHeader = serde_json::from_str(json)?;
        if header.version != BACKUP_VERSION {
            return Err(DataError::UnsupportedBackupVersion(header.version));
        }
        Ok(serde_json::from_str(json)?)
    }
}
