//! Content negotiation for error responses.
//!
//! Replaces framework-magic `accepts` chains with an explicit
//! ordered-preference function: the client's parsed media ranges decide
//! acceptability, a fixed priority order decides which acceptable
//! representation wins.

use axum::http::{header, HeaderMap};

/// Response representations the dispatcher can produce, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Html,
    Json,
    Text,
}

impl Representation {
    fn media_type(self) -> (&'static str, &'static str) {
        match self {
            Representation::Html => ("text", "html"),
            Representation::Json => ("application", "json"),
            Representation::Text => ("text", "plain"),
        }
    }
}

/// One parsed `Accept` media range.
#[derive(Debug)]
struct MediaRange {
    kind: String,
    subtype: String,
    quality: f32,
}

impl MediaRange {
    fn matches(&self, kind: &str, subtype: &str) -> bool {
        (self.kind == "*" || self.kind == kind) && (self.subtype == "*" || self.subtype == subtype)
    }

    /// Exact pair beats type wildcard beats full wildcard.
    fn specificity(&self) -> u8 {
        match (self.kind.as_str(), self.subtype.as_str()) {
            ("*", _) => 0,
            (_, "*") => 1,
            _ => 2,
        }
    }
}

/// Pick the representation for an error response.
///
/// Priority is fixed: HTML, then JSON, then plain text. A missing `Accept`
/// header accepts everything (HTML wins); a header with no valid media
/// ranges accepts nothing and yields `None`. For each candidate the most
/// specific matching range decides, and a quality of zero excludes.
pub fn negotiate(headers: &HeaderMap) -> Option<Representation> {
    let value = match headers.get(header::ACCEPT) {
        Some(value) => value.to_str().unwrap_or(""),
        None => return Some(Representation::Html),
    };

    let ranges = parse_accept(value);
    if ranges.is_empty() {
        return None;
    }

    [Representation::Html, Representation::Json, Representation::Text]
        .into_iter()
        .find(|repr| {
            let (kind, subtype) = repr.media_type();
            accepts(&ranges, kind, subtype)
        })
}

fn parse_accept(value: &str) -> Vec<MediaRange> {
    value
        .split(',')
        .filter_map(|item| {
            let mut parts = item.split(';');
            let media = parts.next()?.trim().to_ascii_lowercase();
            let (kind, subtype) = media.split_once('/')?;
            if kind.is_empty() || subtype.is_empty() {
                return None;
            }
            let quality = parts
                .filter_map(|param| param.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            Some(MediaRange {
                kind: kind.to_owned(),
                subtype: subtype.to_owned(),
                quality,
            })
        })
        .collect()
}

fn accepts(ranges: &[MediaRange], kind: &str, subtype: &str) -> bool {
    let mut best: Option<&MediaRange> = None;
    for range in ranges.iter().filter(|r| r.matches(kind, subtype)) {
        // Strict comparison keeps the earliest range on a specificity tie.
        if best.map_or(true, |b| range.specificity() > b.specificity()) {
            best = Some(range);
        }
    }
    best.map_or(false, |range| range.quality > 0.0)
}
