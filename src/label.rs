//! # Label classification
//!
//! Maps a raw label string (as reported by a provider) onto the
//! independence scale used by scoring:
//! self-released > indie label > distributor > major.
//!
//! - Case-insensitive, punctuation/dash tolerant matching on whole words.
//! - Order: self-release markers (or label == artist) → majors →
//!   distributors → indie.
//! - Built-in `default_seed()`; a JSON file can replace it.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelType {
    // "Independent" as a label means no label at all.
    #[serde(alias = "self-released", alias = "self", alias = "independent")]
    SelfReleased,
    Indie,
    Distributor,
    Major,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelDirectory {
    #[serde(default)]
    pub self_release_markers: Vec<String>,
    #[serde(default)]
    pub majors: Vec<String>,
    #[serde(default)]
    pub distributors: Vec<String>,
}

impl LabelDirectory {
    /// Load from JSON; falls back to `default_seed()` on any error, with a
    /// warning naming the file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()));
        match parsed {
            Ok(dir) => dir,
            Err(error) => {
                warn!(
                    target: "config",
                    path = %path.display(),
                    %error,
                    "label directory unusable; using built-in seed"
                );
                Self::default_seed()
            }
        }
    }

    /// Classify `label`; `artist` lets "label == artist name" count as
    /// self-released. Blank labels are unknown (`None`).
    pub fn classify(&self, label: &str, artist: Option<&str>) -> Option<LabelType> {
        let l = normalize(label);
        if l.is_empty() {
            return None;
        }

        if let Some(a) = artist.map(normalize) {
            if !a.is_empty() && a == l {
                return Some(LabelType::SelfReleased);
            }
        }
        if contains_any(&l, &self.self_release_markers) {
            return Some(LabelType::SelfReleased);
        }
        if contains_any(&l, &self.majors) {
            return Some(LabelType::Major);
        }
        if contains_any(&l, &self.distributors) {
            return Some(LabelType::Distributor);
        }
        Some(LabelType::Indie)
    }

    pub fn default_seed() -> Self {
        fn owned(xs: &[&str]) -> Vec<String> {
            xs.iter().map(|s| s.to_string()).collect()
        }
        Self {
            self_release_markers: owned(&[
                "self released",
                "selfreleased",
                "independent",
                "no label",
                "not on label",
                "unsigned",
                "records dk",
            ]),
            majors: owned(&[
                "universal",
                "umg",
                "sony",
                "columbia",
                "rca",
                "epic",
                "warner",
                "atlantic",
                "elektra",
                "parlophone",
                "interscope",
                "capitol",
                "republic",
                "def jam",
                "island",
                "emi",
                "virgin",
                "polydor",
                "geffen",
                "motown",
                "arista",
                "reprise",
            ]),
            distributors: owned(&[
                "distrokid",
                "tunecore",
                "cd baby",
                "cdbaby",
                "amuse",
                "ditto",
                "unitedmasters",
                "awal",
                "believe",
                "the orchard",
                "symphonic",
                "onerpm",
                "routenote",
                "repost",
                "spinnup",
                "landr",
            ]),
        }
    }
}

impl Default for LabelDirectory {
    fn default() -> Self {
        Self::default_seed()
    }
}

/// Whole-word containment on normalized text.
fn contains_any(haystack: &str, needles: &[String]) -> bool {
    let padded = format!(" {haystack} ");
    needles.iter().any(|n| {
        let n = normalize(n);
        !n.is_empty() && padded.contains(&format!(" {n} "))
    })
}

/// Lowercase, separators and punctuation to spaces, collapse whitespace.
fn normalize(s: &str) -> String {
    let mut out = s.trim().to_lowercase();
    for ch in ['—', '–', '-', '_', '/', '\\', '[', ']', '(', ')'] {
        out = out.replace(ch, " ");
    }
    out = out.replace(['.', ',', '’', '\'', '"'], " ");
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
