//! Bibliographic metadata for output files.
//!
//! [Metadata::build] is a pure function of its inputs, timestamp included, so identical inputs
//! give byte-identical JSON, XML and plain views.

use crate::model::{ChapterFullInfo, ChapterRecord, Manga};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Series-level fields used to build metadata.
pub trait MangaMetadataSource {
    /// Title in `language`, with the source's own fallback.
    fn title(&self, language: &str) -> &str;
    fn description(&self, language: &str) -> &str;
    fn publisher(&self) -> &str;
    fn year(&self) -> Option<u32>;
    fn authors(&self) -> &[String];
    fn artists(&self) -> &[String];
    fn tags(&self) -> &[String];
    /// External links worth printing in a summary.
    fn links(&self) -> Vec<String>;
}

/// Chapter-level fields used to build metadata.
pub trait ChapterMetadataSource {
    fn title(&self) -> &str;
    fn number(&self) -> &str;
    fn volume(&self) -> &str;
    fn language(&self) -> &str;
    fn page_count(&self) -> u32;
}

impl MangaMetadataSource for Manga {
    fn title(&self, language: &str) -> &str {
        self.title_in(language)
    }

    fn description(&self, language: &str) -> &str {
        self.description_in(language)
    }

    fn publisher(&self) -> &str {
        &self.publisher
    }

    fn year(&self) -> Option<u32> {
        self.year
    }

    fn authors(&self) -> &[String] {
        &self.authors
    }

    fn artists(&self) -> &[String] {
        &self.artists
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn links(&self) -> Vec<String> {
        self.external_links()
    }
}

impl ChapterMetadataSource for ChapterRecord {
    fn title(&self) -> &str {
        &self.title
    }

    fn number(&self) -> &str {
        &self.number
    }

    fn volume(&self) -> &str {
        &self.volume
    }

    fn language(&self) -> &str {
        &self.language
    }

    fn page_count(&self) -> u32 {
        self.pages
    }
}

impl ChapterMetadataSource for ChapterFullInfo {
    fn title(&self) -> &str {
        &self.record.title
    }

    fn number(&self) -> &str {
        &self.record.number
    }

    fn volume(&self) -> &str {
        &self.record.volume
    }

    fn language(&self) -> &str {
        &self.record.language
    }

    /// Actual file count once known; the declared count otherwise.
    fn page_count(&self) -> u32 {
        if self.files.is_empty() {
            self.record.pages
        } else {
            self.files.len() as u32
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credit {
    pub person: String,
    pub role: String,
}

/// Archive comment view (ComicBookInfo/1.0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComicBookMetadata {
    #[serde(rename = "appID")]
    pub app_id: String,
    #[serde(rename = "lastModified")]
    pub last_modified: String,
    #[serde(rename = "ComicBookInfo/1.0")]
    pub info: ComicBookInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComicBookInfo {
    pub series: String,
    pub title: String,
    pub publisher: String,
    pub issue: String,
    pub volume: String,
    pub language: String,
    pub credits: Vec<Credit>,
    pub tags: Vec<String>,
}

/// Embedded `ComicInfo.xml` view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComicInfo {
    pub title: String,
    /// Omitted from the XML when empty.
    pub number: String,
    /// Omitted from the XML when empty.
    pub volume: String,
    pub year: u32,
    pub writer: String,
    pub penciller: String,
    pub inker: String,
    pub publisher: String,
    pub page_count: u32,
    pub language_iso: String,
    pub format: String,
    pub manga: String,
    pub summary: String,
}

/// Comma-joined name lists for formats without structured credits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlainMetadata {
    pub authors: String,
    pub artists: String,
    pub tags: String,
}

/// All metadata views for one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub comic_book: ComicBookMetadata,
    pub comic_info: ComicInfo,
    pub plain: PlainMetadata,
    /// Manga title alone, used to build range titles.
    pub series_title: String,
    pub last_modified: DateTime<Utc>,
}

impl Metadata {
    /// Build metadata for one chapter, or for several chapters merged into one file.
    ///
    /// `chapters` is in reading order. A merged title reads `ch{first}-{last}`; the page count is
    /// the sum over all chapters.
    pub fn build<M, C>(
        app_id: &str,
        manga: &M,
        chapters: &[C],
        last_modified: DateTime<Utc>,
    ) -> Metadata
    where
        M: MangaMetadataSource + ?Sized,
        C: ChapterMetadataSource,
    {
        let first = chapters.first();
        let language = first.map(|c| c.language()).unwrap_or("");
        let series_title = manga.title(language).to_string();

        let mut credits: Vec<Credit> = manga
            .authors()
            .iter()
            .map(|a| Credit {
                person: a.clone(),
                role: "Writer".to_string(),
            })
            .collect();
        credits.extend(manga.artists().iter().map(|a| Credit {
            person: a.clone(),
            role: "Artist".to_string(),
        }));

        let (number, volume, chapter_title) = match chapters {
            [] => (String::new(), String::new(), String::new()),
            [only] => (
                only.number().to_string(),
                only.volume().to_string(),
                only.title().to_string(),
            ),
            [head, .., tail] => {
                let same_volume = chapters.iter().all(|c| c.volume() == head.volume());
                (
                    format!("{}-{}", head.number(), tail.number()),
                    if same_volume {
                        head.volume().to_string()
                    } else {
                        String::new()
                    },
                    String::new(),
                )
            }
        };

        let title = if chapters.len() > 1 {
            format!("{} | {} ch{}", language, series_title, number)
        } else {
            format!("{} | {} vol{} ch{}", language, series_title, volume, number)
        };

        let mut summary = format!("{}<br>Read or Buy here:<br>", manga.description(language));
        for link in manga.links() {
            summary.push_str(&link);
            summary.push_str("<br>");
        }

        let plain = PlainMetadata {
            authors: manga.authors().join(", "),
            artists: manga.artists().join(", "),
            tags: manga.tags().join(", "),
        };
        let page_count = chapters.iter().map(|c| c.page_count()).sum();

        Metadata {
            comic_book: ComicBookMetadata {
                app_id: app_id.to_string(),
                last_modified: last_modified.to_rfc3339_opts(SecondsFormat::Secs, true),
                info: ComicBookInfo {
                    series: title.clone(),
                    title: chapter_title,
                    publisher: manga.publisher().to_string(),
                    issue: number.clone(),
                    volume: volume.clone(),
                    language: language.to_string(),
                    credits,
                    tags: manga.tags().to_vec(),
                },
            },
            comic_info: ComicInfo {
                title,
                number,
                volume,
                year: manga.year().unwrap_or(0),
                writer: plain.authors.clone(),
                penciller: plain.artists.clone(),
                inker: plain.artists.clone(),
                publisher: manga.publisher().to_string(),
                page_count,
                language_iso: language.to_string(),
                format: "Comic Book".to_string(),
                manga: "No".to_string(),
                summary,
            },
            plain,
            series_title,
            last_modified,
        }
    }

    pub fn app_id(&self) -> &str {
        &self.comic_book.app_id
    }

    pub fn language(&self) -> &str {
        &self.comic_info.language_iso
    }

    /// Composite title; with a range label, `"{language} | {title} ch{range}"`.
    pub fn display_title(&self, range_label: Option<&str>) -> String {
        match range_label {
            Some(range) if !range.is_empty() => {
                format!("{} | {} ch{}", self.language(), self.series_title, range)
            }
            _ => self.comic_info.title.clone(),
        }
    }

    /// `"authors | artists"`, as used for document author fields.
    pub fn author_line(&self) -> String {
        format!("{} | {}", self.plain.authors, self.plain.artists)
    }

    /// ComicBookInfo JSON for the archive comment.
    pub fn comic_book_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.comic_book)
    }

    /// `ComicInfo.xml` document.
    pub fn comic_info_xml(&self) -> String {
        let ci = &self.comic_info;
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ComicInfo>\n");
        push_element(&mut xml, "Title", &ci.title);
        if !ci.number.is_empty() {
            push_element(&mut xml, "Number", &ci.number);
        }
        if !ci.volume.is_empty() {
            push_element(&mut xml, "Volume", &ci.volume);
        }
        push_element(&mut xml, "Year", &ci.year.to_string());
        push_element(&mut xml, "Writer", &ci.writer);
        push_element(&mut xml, "Penciller", &ci.penciller);
        push_element(&mut xml, "Inker", &ci.inker);
        push_element(&mut xml, "Publisher", &ci.publisher);
        push_element(&mut xml, "PageCount", &ci.page_count.to_string());
        push_element(&mut xml, "LanguageISO", &ci.language_iso);
        push_element(&mut xml, "Format", &ci.format);
        push_element(&mut xml, "Manga", &ci.manga);
        push_element(&mut xml, "Summary", &ci.summary);
        xml.push_str("</ComicInfo>\n");
        xml
    }
}

fn push_element(out: &mut String, name: &str, value: &str) {
    out.push_str("  <");
    out.push_str(name);
    out.push('>');
    out.push_str(&xml_escape(value));
    out.push_str("</");
    out.push_str(name);
    out.push_str(">\n");
}

pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
