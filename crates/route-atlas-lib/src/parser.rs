//! Lenient GPX track parser
//!
//! Walks the document with `quick-xml` events instead of deserializing into a
//! strict schema, so that one bad point (missing or out-of-range coordinates)
//! is dropped without throwing away the rest of the file. Only documents that
//! are not well-formed markup produce a [`ParseError`].

use crate::route::{Track, TrackPoint};
use crate::utils;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// The document could not be interpreted as markup
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Malformed track document: {reason}")]
pub struct ParseError {
    pub reason: String,
}

impl ParseError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<quick_xml::Error> for ParseError {
    fn from(e: quick_xml::Error) -> Self {
        ParseError::new(e.to_string())
    }
}

type Result<T> = std::result::Result<T, ParseError>;

/// Tracks plus parse diagnostics
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub tracks: Vec<Track>,
    /// Points dropped because their coordinates were missing, unparsable or out of range
    pub skipped_points: usize,
}

/// Parse all `<trk>` elements of a document.
///
/// Track ids are `"0"`, `"1"`, ... in document order; callers prefix them to
/// make them globally unique. Tracks without a `<name>` are named after
/// `source_name`. A document with no tracks yields an empty list.
pub fn parse(raw: &str, source_name: &str) -> Result<Vec<Track>> {
    parse_with_report(raw, source_name).map(|outcome| outcome.tracks)
}

/// Like [`parse`] but also reports how many points were skipped.
pub fn parse_with_report(raw: &str, source_name: &str) -> Result<ParseOutcome> {
    #[cfg(feature = "profiling")]
    profiling::scope!("parser::parse");

    let mut reader = Reader::from_str(raw);
    let mut outcome = ParseOutcome::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"trk" => {
                let (name, points) = parse_track(&mut reader, &mut outcome.skipped_points)?;
                push_track(&mut outcome.tracks, name, points, source_name);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"trk" => {
                push_track(&mut outcome.tracks, None, Vec::new(), source_name);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if outcome.skipped_points > 0 {
        tracing::debug!(
            "{}: skipped {} invalid track points",
            source_name,
            outcome.skipped_points
        );
    }

    Ok(outcome)
}

fn push_track(
    tracks: &mut Vec<Track>,
    name: Option<String>,
    points: Vec<TrackPoint>,
    source_name: &str,
) {
    let name = name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| source_name.to_string());
    tracks.push(Track {
        id: tracks.len().to_string(),
        name,
        points,
    });
}

/// Parse the body of a `<trk>` element. Segments are concatenated in order.
fn parse_track<'a>(
    reader: &mut Reader<&'a [u8]>,
    skipped: &mut usize,
) -> Result<(Option<String>, Vec<TrackPoint>)> {
    let mut name = None;
    let mut points = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"name" => name = Some(read_text_owned(reader, &e)?.trim().to_string()),
                b"trkseg" => parse_segment(reader, &mut points, skipped)?,
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::End(e) if e.local_name().as_ref() == b"trk" => break,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok((name, points))
}

fn parse_segment<'a>(
    reader: &mut Reader<&'a [u8]>,
    points: &mut Vec<TrackPoint>,
    skipped: &mut usize,
) -> Result<()> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"trkpt" {
                    match parse_point(&e, reader)? {
                        Some(p) => points.push(p),
                        None => *skipped += 1,
                    }
                } else {
                    reader.read_to_end(e.name())?;
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"trkpt" => {
                match parse_lat_lon(&e)? {
                    Some((lat, lon)) => points.push(TrackPoint::new(lat, lon)),
                    None => *skipped += 1,
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"trkseg" => break,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

/// Read `lat`/`lon` attributes. `Ok(None)` when either is missing, not a
/// finite number, or outside the WGS84 range, and when the attribute list
/// itself is malformed (duplicated or unquoted attributes).
fn parse_lat_lon(e: &BytesStart<'_>) -> Result<Option<(f64, f64)>> {
    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;

    for attr in e.attributes() {
        let attr = match attr {
            Ok(attr) => attr,
            Err(err) => {
                tracing::trace!("Skipping track point with malformed attributes: {}", err);
                return Ok(None);
            }
        };
        let value = std::str::from_utf8(&attr.value)
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok());
        match attr.key.local_name().as_ref() {
            b"lat" => lat = value,
            b"lon" => lon = value,
            _ => {}
        }
    }

    match (lat, lon) {
        (Some(lat), Some(lon)) if utils::is_valid_lat_lon(lat, lon) => Ok(Some((lat, lon))),
        (lat, lon) => {
            tracing::trace!("Skipping track point with lat={:?} lon={:?}", lat, lon);
            Ok(None)
        }
    }
}

/// Parse a `<trkpt>` element with children. Called after its start tag.
fn parse_point<'a>(
    start: &BytesStart<'a>,
    reader: &mut Reader<&'a [u8]>,
) -> Result<Option<TrackPoint>> {
    let Some((lat, lon)) = parse_lat_lon(start)? else {
        reader.read_to_end(start.name())?;
        return Ok(None);
    };

    let mut point = TrackPoint::new(lat, lon);
    let end_name = start.name().0.to_vec();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"ele" => {
                    point.elevation = read_text_owned(reader, &e)?
                        .trim()
                        .parse::<f64>()
                        .ok()
                        .filter(|v| v.is_finite());
                }
                b"time" => {
                    let text = read_text_owned(reader, &e)?;
                    let text = text.trim();
                    if !text.is_empty() {
                        point.timestamp = Some(text.to_string());
                    }
                }
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::End(e) if e.name().0 == end_name.as_slice() => break,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(Some(point))
}

/// Collect the text content of a simple element, including CDATA sections
/// and character/entity references.
fn read_text_owned<'a>(reader: &mut Reader<&'a [u8]>, start: &BytesStart<'_>) -> Result<String> {
    let end_name = start.name().0.to_vec();
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Text(e) => text.push_str(std::str::from_utf8(e.as_ref()).unwrap_or_default()),
            Event::CData(e) => text.push_str(std::str::from_utf8(e.as_ref()).unwrap_or_default()),
            Event::GeneralRef(e) => {
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    text.push(ch);
                } else {
                    match std::str::from_utf8(e.as_ref()).unwrap_or_default() {
                        "amp" => text.push('&'),
                        "lt" => text.push('<'),
                        "gt" => text.push('>'),
                        "quot" => text.push('"'),
                        "apos" => text.push('\''),
                        _ => {}
                    }
                }
            }
            Event::Start(e) => {
                reader.read_to_end(e.name())?;
            }
            Event::End(e) if e.name().0 == end_name.as_slice() => break,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(text)
}
