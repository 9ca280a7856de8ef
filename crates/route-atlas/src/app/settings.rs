use crate::app::cli::{get_env, parse_args};
use clap::{Args, Parser, Subcommand};
use route_atlas_lib::{BoundingBox, ColorMode, ImportOptions, PeriodKey, RenderConfig, ToleranceConfig, ViewState};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Route Atlas - Import, store, render and export large collections of GPS routes
pub struct Settings {
    /// Route storage file (defaults to $ROUTE_ATLAS_STORAGE, then the per-user config directory)
    #[clap(long, global = true, value_name = "FILE")]
    pub storage: Option<PathBuf>,

    #[clap(flatten)]
    pub render: RenderSettings,

    #[clap(subcommand)]
    pub command: Command,
}

/// Knobs of the render scheduler
#[derive(Args, Debug, Clone)]
pub struct RenderSettings {
    /// Quiet period after the last viewport change, in milliseconds
    #[clap(long, global = true, default_value = "100")]
    pub debounce_ms: u64,

    /// Maximum number of routes drawn at once
    #[clap(long, global = true, default_value = "100")]
    pub max_visible_routes: usize,

    /// Routes with more points than this are always simplified
    #[clap(long, global = true, default_value = "1000")]
    pub density_threshold: usize,

    /// Below this zoom level every route is simplified
    #[clap(long, global = true, default_value = "14")]
    pub detail_zoom: f64,

    /// Simplification tolerance in meters at the reference zoom
    #[clap(long, global = true, default_value = "10.0")]
    pub tolerance_meters: f64,

    /// Zoom level at which the tolerance applies unscaled
    #[clap(long, global = true, default_value = "18")]
    pub reference_zoom: f64,

    /// Skip the radial pre-pass of the simplifier (slower, more faithful)
    #[clap(long, global = true, default_value = "false")]
    pub high_quality: bool,

    /// Period used to pick automatic route colors (week, month, year)
    #[clap(long, global = true, default_value = "month")]
    pub period: PeriodKey,

    /// Commit rate below which the next pass draws less detail; 0 disables
    #[clap(long, global = true, default_value = "30")]
    pub min_fps: f64,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Import GPX files into the store
    Import {
        /// GPX files to import
        #[clap(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Fixed color for every imported route instead of date-based colors
        #[clap(long, value_name = "COLOR")]
        color: Option<String>,

        /// Period the imported routes are grouped under (week, month, year)
        #[clap(long, default_value = "month")]
        group: PeriodKey,

        /// Keep only one of several identical tracks in a file
        #[clap(long, default_value = "false")]
        merge_identical: bool,

        /// Category assigned to the imported routes
        #[clap(long)]
        category: Option<String>,
    },

    /// List stored routes
    List {
        /// Only routes grouped under this period
        #[clap(long)]
        period: Option<PeriodKey>,
    },

    /// Run render passes over a sequence of views and print the final plan as JSON
    Render {
        /// View as min_lon,min_lat,max_lon,max_lat@zoom; repeat to simulate panning
        #[clap(long = "view", required = true, value_parser = parse_view)]
        views: Vec<ViewState>,

        /// Delay between simulated view changes, in milliseconds
        #[clap(long, default_value = "0")]
        interval_ms: u64,
    },

    /// Export routes as GPX files, or several routes as a JSON backup
    Export {
        /// Route ids; all routes when omitted
        ids: Vec<String>,

        /// Output directory for GPX files, or the backup file with --backup
        #[clap(short, long, value_name = "PATH")]
        out: PathBuf,

        /// Write one JSON backup instead of GPX files
        #[clap(long, default_value = "false")]
        backup: bool,
    },

    /// Import a JSON backup
    Restore {
        #[clap(value_name = "FILE")]
        file: PathBuf,
    },

    /// Change the name, color or category of a stored route
    Edit {
        id: String,

        #[clap(long)]
        name: Option<String>,

        /// New color; an empty value clears it
        #[clap(long, value_name = "COLOR")]
        color: Option<String>,

        /// New category; an empty value clears it
        #[clap(long)]
        category: Option<String>,
    },

    /// Delete routes by id
    Delete {
        #[clap(required = true)]
        ids: Vec<String>,
    },
}

/// Parse `min_lon,min_lat,max_lon,max_lat@zoom`
pub fn parse_view(s: &str) -> Result<ViewState, String> {
    let (bounds, zoom) = s
        .split_once('@')
        .ok_or_else(|| format!("expected BOUNDS@ZOOM, got '{}'", s))?;
    let zoom: f64 = zoom
        .trim()
        .parse()
        .map_err(|e| format!("invalid zoom '{}': {}", zoom, e))?;
    let values = bounds
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|e| format!("invalid bounds '{}': {}", bounds, e))?;
    let [min_lon, min_lat, max_lon, max_lat] = values[..] else {
        return Err(format!("expected 4 bound values, got {}", values.len()));
    };
    Ok(ViewState::new(
        BoundingBox::new(min_lon, min_lat, max_lon, max_lat),
        zoom,
    ))
}

impl Settings {
    /// Parse settings from the command line, exiting with usage on error
    pub fn from_cli() -> Self {
        match parse_args::<Settings>() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Storage file from `--storage`, then `ROUTE_ATLAS_STORAGE`
    pub fn storage_path(&self) -> Option<PathBuf> {
        self.storage
            .clone()
            .or_else(|| get_env::<PathBuf>("ROUTE_ATLAS_STORAGE"))
    }
}

impl RenderSettings {
    pub fn to_config(&self) -> RenderConfig {
        RenderConfig {
            debounce_ms: self.debounce_ms,
            max_visible_routes: self.max_visible_routes,
            density_threshold: self.density_threshold,
            detail_zoom: self.detail_zoom,
            tolerance: ToleranceConfig {
                base_meters: self.tolerance_meters,
                reference_zoom: self.reference_zoom,
                ..Default::default()
            },
            high_quality: self.high_quality,
            period: self.period,
            min_fps: self.min_fps,
            ..Default::default()
        }
    }
}

/// Import options from the `import` subcommand flags
pub fn import_options(
    color: Option<&str>,
    group: PeriodKey,
    merge_identical: bool,
    category: Option<&str>,
) -> ImportOptions {
    let mut options = ImportOptions {
        period_grouping: group,
        merge_identical_tracks: merge_identical,
        category: category.map(str::to_string),
        ..Default::default()
    };
    if let Some(color) = color {
        options.color_mode = ColorMode::Manual;
        options.default_color = color.to_string();
    }
    options
}
