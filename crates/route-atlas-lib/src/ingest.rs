//! Turning track files into route records
//!
//! Files are parsed in parallel on the rayon pool. A file that fails to parse
//! is reported on its own and never affects the others. Route ids are
//! `"{job_id}:{track_id}"`, so they are unique as long as job ids are.

use crate::color::PeriodKey;
use crate::parser::{self, ParseError};
use crate::route::{RouteRecord, Track};

use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How imported routes get their color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ColorMode {
    /// Palette color derived from the route date at render time
    #[default]
    Auto,
    /// The same fixed color for every imported route
    Manual,
}

/// Options applied to every route of an import
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ImportOptions {
    pub color_mode: ColorMode,
    /// Used when `color_mode` is `Manual`
    pub default_color: String,
    pub period_grouping: PeriodKey,
    /// Keep only the first of several tracks in one file with identical points
    pub merge_identical_tracks: bool,
    pub category: Option<String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            color_mode: ColorMode::Auto,
            default_color: crate::color::PALETTE[0].to_string(),
            period_grouping: PeriodKey::Month,
            merge_identical_tracks: false,
            category: None,
        }
    }
}

/// One file to import
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Unique per file within an import
    pub job_id: String,
    /// Used as the name of unnamed tracks
    pub name: String,
    pub contents: String,
}

/// A file that could not be parsed
#[derive(Debug, Clone, PartialEq)]
pub struct FileFailure {
    pub job_id: String,
    pub name: String,
    pub error: ParseError,
}

/// Result of an import
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub routes: Vec<RouteRecord>,
    pub failures: Vec<FileFailure>,
    /// Points dropped for invalid coordinates, over all files
    pub skipped_points: usize,
    /// Tracks dropped as duplicates of another track in the same file
    pub merged_tracks: usize,
}

/// Parse one file and convert its tracks into route records
pub fn ingest_file(source: &SourceFile, options: &ImportOptions) -> Result<IngestReport, ParseError> {
    let outcome = parser::parse_with_report(&source.contents, &source.name)?;

    let mut tracks = outcome.tracks;
    let mut merged = 0;
    if options.merge_identical_tracks {
        let before = tracks.len();
        tracks = dedup_tracks(tracks);
        merged = before - tracks.len();
    }

    let routes = tracks
        .into_iter()
        .map(|track| build_record(track, &source.job_id, options))
        .collect();

    Ok(IngestReport {
        routes,
        failures: Vec::new(),
        skipped_points: outcome.skipped_points,
        merged_tracks: merged,
    })
}

/// Parse many files in parallel.
///
/// Routes come out in input-file order, then track order within a file.
pub fn ingest_parallel(sources: &[SourceFile], options: &ImportOptions) -> IngestReport {
    #[cfg(feature = "profiling")]
    profiling::scope!("ingest::ingest_parallel");

    let results: Vec<(usize, Result<IngestReport, ParseError>)> = sources
        .par_iter()
        .enumerate()
        .map(|(i, source)| (i, ingest_file(source, options)))
        .collect();

    let mut report = IngestReport::default();
    for (i, result) in results {
        match result {
            Ok(file_report) => {
                report.routes.extend(file_report.routes);
                report.skipped_points += file_report.skipped_points;
                report.merged_tracks += file_report.merged_tracks;
            }
            Err(error) => {
                let source = &sources[i];
                tracing::warn!("Failed to parse {}: {}", source.name, error);
                report.failures.push(FileFailure {
                    job_id: source.job_id.clone(),
                    name: source.name.clone(),
                    error,
                });
            }
        }
    }

    tracing::info!(
        "Imported {} routes from {} files ({} failed, {} points skipped)",
        report.routes.len(),
        sources.len(),
        report.failures.len(),
        report.skipped_points
    );
    report
}

fn build_record(track: Track, job_id: &str, options: &ImportOptions) -> RouteRecord {
    let id = format!("{}:{}", job_id, track.id);
    let mut record = RouteRecord::from_track(track, id, options.period_grouping);
    if options.color_mode == ColorMode::Manual {
        record.color = Some(options.default_color.clone());
    }
    record.category = options.category.clone();
    record
}

/// Drop tracks whose point sequence equals an earlier track's
fn dedup_tracks(tracks: Vec<Track>) -> Vec<Track> {
    let mut kept: Vec<Track> = Vec::with_capacity(tracks.len());
    for track in tracks {
        if kept.iter().any(|k| k.points == track.points) {
            tracing::debug!("Merging duplicate track {}", track.name);
            continue;
        }
        kept.push(track);
    }
    kept
}
