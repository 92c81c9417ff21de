//! Canonical data model for catalog entries.
//!
//! The catalog adapter produces these shapes; the range resolver, metadata builder and
//! packagers consume them. All records are immutable once fetched.

use serde::Serialize;
use std::collections::BTreeMap;

/// One manga (series) as described by the catalog.
/// Serializes to the search export format.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Manga {
    pub id: String,
    /// Title per language code (e.g. "en", "ja-ro").
    pub titles: BTreeMap<String, String>,
    /// Alternative titles as (language, title) pairs in catalog order.
    pub alt_titles: Vec<(String, String)>,
    /// Description per language code.
    pub descriptions: BTreeMap<String, String>,
    pub year: Option<u32>,
    pub status: String,
    /// Final chapter number once the series is complete; often empty.
    pub last_chapter: String,
    /// English tag names.
    pub tags: Vec<String>,
    pub authors: Vec<String>,
    pub artists: Vec<String>,
    /// Publisher label. MangaDex only exposes the publication demographic here.
    pub publisher: String,
    /// External link map (site key -> link or site-specific id).
    pub links: BTreeMap<String, String>,
    pub original_language: String,
    pub translated_languages: Vec<String>,
}

impl Manga {
    /// Title in `language`, falling back to English, then to the first known title.
    pub fn title_in(&self, language: &str) -> &str {
        self.titles
            .get(language)
            .or_else(|| self.titles.get("en"))
            .or_else(|| self.titles.values().next())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Description in `language`, falling back to English.
    pub fn description_in(&self, language: &str) -> &str {
        self.descriptions
            .get(language)
            .or_else(|| self.descriptions.get("en"))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// External links usable from a reader: only absolute https URLs, in link-key order.
    pub fn external_links(&self) -> Vec<String> {
        self.links
            .values()
            .filter(|link| {
                reqwest::Url::parse(link)
                    .map(|u| u.scheme() == "https")
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}

/// One chapter release in the catalog feed.
///
/// Several records may share a chapter number (different groups or languages); they are
/// candidates for filtering, not duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterRecord {
    pub id: String,
    /// Owning manga id; empty when the feed did not include the relationship.
    pub manga_id: String,
    /// Volume label; empty when the chapter has no volume.
    pub volume: String,
    /// Chapter number label: "12", "12.5", or empty for oneshots.
    pub number: String,
    pub title: String,
    pub language: String,
    /// Scanlation group name; empty when unknown.
    pub translator: String,
    pub uploader: String,
    /// Page count declared by the catalog.
    pub pages: u32,
}

/// Image quality tier served by the image host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageQuality {
    /// Full-size images (`data`).
    #[default]
    Original,
    /// Recompressed, smaller images (`data-saver`).
    DataSaver,
}

impl ImageQuality {
    /// Path segment used by the image host for this tier.
    pub fn path_segment(self) -> &'static str {
        match self {
            ImageQuality::Original => "data",
            ImageQuality::DataSaver => "data-saver",
        }
    }
}

/// A chapter record plus everything needed to download its pages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChapterFullInfo {
    pub record: ChapterRecord,
    /// Image host base URL for this chapter.
    pub base_url: String,
    /// Content hash used in page URLs.
    pub hash: String,
    /// Page file names for [ImageQuality::Original], in reading order.
    pub files: Vec<String>,
    /// Page file names for [ImageQuality::DataSaver], parallel to `files`.
    pub saver_files: Vec<String>,
}

impl ChapterFullInfo {
    /// Page file names for the requested tier.
    pub fn files_for(&self, quality: ImageQuality) -> &[String] {
        match quality {
            ImageQuality::Original => &self.files,
            ImageQuality::DataSaver => &self.saver_files,
        }
    }

    /// `{base}/data/{hash}/{file}` or `{base}/data-saver/{hash}/{file}`.
    pub fn page_url(&self, file: &str, quality: ImageQuality) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            quality.path_segment(),
            self.hash,
            file
        )
    }
}
