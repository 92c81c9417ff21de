//! Catalog access. The catalog trait, shared HTTP client, target parsing, and the MangaDex adapter.

mod client;
mod error;

pub mod mangadex;

#[cfg(test)]
pub(crate) mod fake;

pub use client::{PoliteClient, PoliteClientBuilder};
pub use error::CatalogError;
pub use mangadex::MangaDexCatalog;

use crate::model::{ChapterFullInfo, ChapterRecord, ImageQuality, Manga};
use reqwest::Url;

/// One page of the chapter feed plus the feed's total record count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChapterPage {
    pub records: Vec<ChapterRecord>,
    pub total: u32,
}

/// Raw page image as served by the image host.
#[derive(Debug, Clone, PartialEq)]
pub struct PageBytes {
    pub bytes: Vec<u8>,
    /// Declared `Content-Type`, without parameters.
    pub media_type: String,
}

/// Title search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub title: String,
    /// Doujinshi are excluded unless set.
    pub include_doujinshi: bool,
}

/// One page of search results plus the total match count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MangaPage {
    pub mangas: Vec<Manga>,
    pub total: u32,
}

/// Manga lookup by title, best match first.
pub trait MangaSearch {
    fn search_page(
        &mut self,
        query: &SearchQuery,
        limit: u32,
        offset: u32,
    ) -> Result<MangaPage, CatalogError>;
}

/// Remote chapter catalog.
///
/// Feed order is volume ascending, then chapter ascending. Implementations perform their own
/// transport retries; callers never retry.
pub trait ChapterCatalog {
    /// Fetch `limit` feed records starting at `offset`, filtered to `language`.
    fn fetch_chapter_page(
        &mut self,
        manga_id: &str,
        language: &str,
        limit: u32,
        offset: u32,
    ) -> Result<ChapterPage, CatalogError>;

    fn fetch_manga(&mut self, manga_id: &str) -> Result<Manga, CatalogError>;

    fn fetch_chapter(&mut self, chapter_id: &str) -> Result<ChapterRecord, CatalogError>;

    /// Resolve the image host location and page file lists for a chapter.
    fn fetch_images(&mut self, record: &ChapterRecord) -> Result<ChapterFullInfo, CatalogError>;

    /// Download one page file of a chapter.
    fn fetch_page(
        &mut self,
        chapter: &ChapterFullInfo,
        file: &str,
        quality: ImageQuality,
    ) -> Result<PageBytes, CatalogError>;
}

/// What the user pointed at: a whole manga or one chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Manga(String),
    Chapter(String),
}

/// Parse a MangaDex title/chapter URL or a bare manga id.
///
/// `https://mangadex.org/title/{id}/...` is a manga, `https://mangadex.org/chapter/{id}` a chapter.
pub fn parse_target(input: &str) -> Result<Target, CatalogError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CatalogError::BadInput("empty manga URL or id".to_string()));
    }
    if !input.contains("://") {
        if input.contains('/') {
            return Err(CatalogError::InvalidUrl {
                input: input.to_string(),
                reason: "expected a MangaDex URL or a manga id".to_string(),
            });
        }
        return Ok(Target::Manga(input.to_string()));
    }
    let url = Url::parse(input).map_err(|e| CatalogError::InvalidUrl {
        input: input.to_string(),
        reason: e.to_string(),
    })?;
    let host = url.host_str().unwrap_or("");
    if host != "mangadex.org" && host != "www.mangadex.org" {
        return Err(CatalogError::InvalidUrl {
            input: input.to_string(),
            reason: format!("unsupported host '{}'", host),
        });
    }
    let mut segments = url.path_segments().into_iter().flatten();
    let kind = segments.next().unwrap_or("");
    let id = segments.next().unwrap_or("");
    if id.is_empty() {
        return Err(CatalogError::InvalidUrl {
            input: input.to_string(),
            reason: "URL has no id".to_string(),
        });
    }
    match kind {
        "title" | "manga" => Ok(Target::Manga(id.to_string())),
        "chapter" => Ok(Target::Chapter(id.to_string())),
        other => Err(CatalogError::InvalidUrl {
            input: input.to_string(),
            reason: format!("unsupported path '/{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_target_title_url() -> Result<(), CatalogError> {
        let target = parse_target(
            "https://mangadex.org/title/a3f91d0b-02f5-4a3d-a2d0-f0bde7152370/this-gorilla-will-die-in-1-day",
        )?;
        assert_eq!(
            target,
            Target::Manga("a3f91d0b-02f5-4a3d-a2d0-f0bde7152370".to_string())
        );
        Ok(())
    }

    #[test]
    fn parse_target_chapter_url() -> Result<(), CatalogError> {
        let target = parse_target("https://mangadex.org/chapter/7c5d2aea-ea55-47d9-8c65-a33c9e92df70")?;
        assert_eq!(
            target,
            Target::Chapter("7c5d2aea-ea55-47d9-8c65-a33c9e92df70".to_string())
        );
        Ok(())
    }

    #[test]
    fn parse_target_bare_id() -> Result<(), CatalogError> {
        assert_eq!(parse_target(" abc-123 ")?, Target::Manga("abc-123".to_string()));
        Ok(())
    }

    #[test]
    fn parse_target_rejects_foreign_host() {
        let result = parse_target("https://notmangadex.org/title/abc-123");
        assert!(matches!(result, Err(CatalogError::InvalidUrl { .. })));
    }

    #[test]
    fn parse_target_rejects_missing_id_and_garbage() {
        assert!(parse_target("https://mangadex.org/title/").is_err());
        assert!(parse_target("https://mangadex.org/user/abc").is_err());
        assert!(parse_target("invalid/link").is_err());
        assert!(matches!(parse_target("  "), Err(CatalogError::BadInput(_))));
    }
}
