//! MangaDex adapter. Talks to the public JSON API and the at-home image hosts; produces canonical records.

use crate::catalog::error::CatalogError;
use crate::catalog::{
    ChapterCatalog, ChapterPage, MangaPage, MangaSearch, PageBytes, PoliteClient, SearchQuery,
};
use crate::model::{ChapterFullInfo, ChapterRecord, ImageQuality, Manga};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

const API_BASE: &str = "https://api.mangadex.org";
const DOUJINSHI_TAG: &str = "b13b2a48-c720-44a9-9c77-39c9979373fb";

/// MangaDex catalog over a shared polite client.
pub struct MangaDexCatalog<'a> {
    client: &'a mut PoliteClient,
    api_base: String,
}

// Wire shapes. Nullable API fields are Option and collapse to empty strings.

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    title: String,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: Option<RelationshipAttributes>,
}

#[derive(Debug, Default, Deserialize)]
struct RelationshipAttributes {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChapterData {
    id: String,
    attributes: ChapterAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterAttributes {
    #[serde(default)]
    volume: Option<String>,
    #[serde(default)]
    chapter: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    translated_language: Option<String>,
    #[serde(default)]
    pages: u32,
}

#[derive(Debug, Deserialize)]
struct ChapterListResponse {
    data: Vec<ChapterData>,
    #[serde(default)]
    total: u32,
}

#[derive(Debug, Deserialize)]
struct ChapterResponse {
    data: ChapterData,
}

#[derive(Debug, Deserialize)]
struct MangaResponse {
    data: MangaData,
}

#[derive(Debug, Deserialize)]
struct MangaListResponse {
    data: Vec<MangaData>,
    #[serde(default)]
    total: u32,
}

#[derive(Debug, Deserialize)]
struct MangaData {
    id: String,
    attributes: MangaAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MangaAttributes {
    #[serde(default)]
    title: BTreeMap<String, String>,
    #[serde(default)]
    alt_titles: Vec<BTreeMap<String, String>>,
    #[serde(default)]
    description: BTreeMap<String, String>,
    #[serde(default)]
    links: Option<BTreeMap<String, String>>,
    #[serde(default)]
    original_language: Option<String>,
    #[serde(default)]
    publication_demographic: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    year: Option<u32>,
    #[serde(default)]
    last_chapter: Option<String>,
    #[serde(default)]
    tags: Vec<TagData>,
    #[serde(default)]
    available_translated_languages: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct TagData {
    attributes: TagAttributes,
}

#[derive(Debug, Deserialize)]
struct TagAttributes {
    #[serde(default)]
    name: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AtHomeResponse {
    base_url: String,
    chapter: AtHomeChapter,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AtHomeChapter {
    hash: String,
    #[serde(default)]
    data: Vec<String>,
    #[serde(default)]
    data_saver: Vec<String>,
}

/// Render the API error list as one line; empty when the body is not an API error.
fn describe_api_error(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed
            .errors
            .iter()
            .map(|e| match &e.detail {
                Some(d) if !d.is_empty() => format!("{} {}: {}", e.status, e.title, d),
                _ => format!("{} {}", e.status, e.title),
            })
            .collect::<Vec<_>>()
            .join("; "),
        _ => String::new(),
    }
}

fn relationship_name<'r>(relationships: &'r [Relationship], kind: &str) -> Option<&'r str> {
    relationships
        .iter()
        .filter(|r| r.kind == kind)
        .filter_map(|r| r.attributes.as_ref())
        .find_map(|a| a.name.as_deref().or(a.username.as_deref()))
}

fn relationship_names(relationships: &[Relationship], kind: &str) -> Vec<String> {
    relationships
        .iter()
        .filter(|r| r.kind == kind)
        .filter_map(|r| r.attributes.as_ref().and_then(|a| a.name.clone()))
        .collect()
}

fn chapter_from_data(data: ChapterData) -> ChapterRecord {
    let translator = relationship_name(&data.relationships, "scanlation_group")
        .unwrap_or("")
        .to_string();
    let uploader = relationship_name(&data.relationships, "user")
        .unwrap_or("")
        .to_string();
    let manga_id = data
        .relationships
        .iter()
        .find(|r| r.kind == "manga")
        .map(|r| r.id.clone())
        .unwrap_or_default();
    let attrs = data.attributes;
    ChapterRecord {
        id: data.id,
        manga_id,
        volume: attrs.volume.unwrap_or_default(),
        number: attrs.chapter.unwrap_or_default(),
        title: attrs.title.unwrap_or_default(),
        language: attrs.translated_language.unwrap_or_default(),
        translator,
        uploader,
        pages: attrs.pages,
    }
}

fn manga_from_data(data: MangaData) -> Manga {
    let authors = relationship_names(&data.relationships, "author");
    let artists = relationship_names(&data.relationships, "artist");
    let attrs = data.attributes;
    let alt_titles = attrs
        .alt_titles
        .into_iter()
        .flat_map(|m| m.into_iter())
        .collect();
    let tags = attrs
        .tags
        .into_iter()
        .filter_map(|t| t.attributes.name.get("en").cloned())
        .collect();
    Manga {
        id: data.id,
        titles: attrs.title,
        alt_titles,
        descriptions: attrs.description,
        year: attrs.year,
        status: attrs.status.unwrap_or_default(),
        last_chapter: attrs.last_chapter.unwrap_or_default(),
        tags,
        authors,
        artists,
        publisher: attrs.publication_demographic.unwrap_or_default(),
        links: attrs.links.unwrap_or_default(),
        original_language: attrs.original_language.unwrap_or_default(),
        translated_languages: attrs
            .available_translated_languages
            .into_iter()
            .flatten()
            .collect(),
    }
}

fn require(value: &str, what: &str) -> Result<(), CatalogError> {
    if value.trim().is_empty() {
        return Err(CatalogError::BadInput(format!("{} is empty", what)));
    }
    Ok(())
}

impl<'a> MangaDexCatalog<'a> {
    pub fn new(client: &'a mut PoliteClient) -> Self {
        Self {
            client,
            api_base: API_BASE.to_string(),
        }
    }

    /// Use a different API root (mirrors, test servers).
    pub fn with_api_base(client: &'a mut PoliteClient, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// API URL from raw path segments and query pairs; both are percent-encoded.
    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, CatalogError> {
        let invalid = |reason: String| CatalogError::InvalidUrl {
            input: self.api_base.clone(),
            reason,
        };
        let mut url = Url::parse(&self.api_base).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("API base cannot take a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn search_url(&self, query: &SearchQuery, limit: u32, offset: u32) -> Result<Url, CatalogError> {
        let (limit, offset) = (limit.to_string(), offset.to_string());
        let mut pairs = vec![
            ("title", query.title.as_str()),
            ("limit", limit.as_str()),
            ("offset", offset.as_str()),
            ("order[relevance]", "desc"),
            ("includes[]", "author"),
            ("includes[]", "artist"),
        ];
        if !query.include_doujinshi {
            pairs.push(("excludedTags[]", DOUJINSHI_TAG));
            pairs.push(("excludedTagsMode", "OR"));
        }
        self.endpoint(&["manga"], &pairs)
    }

    /// GET `url` and return the response when successful, or an Upstream error carrying the API error list.
    fn send(&mut self, url: &str) -> Result<reqwest::blocking::Response, CatalogError> {
        let response = self
            .client
            .get_with_retry(url)
            .map_err(|e| CatalogError::Connection {
                url: url.to_string(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CatalogError::Upstream {
                status: status.as_u16(),
                url: url.to_string(),
                detail: describe_api_error(&body),
            });
        }
        Ok(response)
    }

    fn get_json<T: DeserializeOwned>(&mut self, url: &str) -> Result<T, CatalogError> {
        let response = self.send(url)?;
        let body = response.text().map_err(|e| CatalogError::BodyRead {
            url: url.to_string(),
            source: e,
        })?;
        serde_json::from_str(&body).map_err(|e| CatalogError::Decode {
            url: url.to_string(),
            source: e,
        })
    }
}

impl MangaSearch for MangaDexCatalog<'_> {
    fn search_page(
        &mut self,
        query: &SearchQuery,
        limit: u32,
        offset: u32,
    ) -> Result<MangaPage, CatalogError> {
        require(&query.title, "search title")?;
        let url = self.search_url(query, limit, offset)?;
        debug!(title = %query.title, offset, "searching manga");
        let list: MangaListResponse = self.get_json(url.as_str())?;
        Ok(MangaPage {
            mangas: list.data.into_iter().map(manga_from_data).collect(),
            total: list.total,
        })
    }
}

impl ChapterCatalog for MangaDexCatalog<'_> {
    fn fetch_chapter_page(
        &mut self,
        manga_id: &str,
        language: &str,
        limit: u32,
        offset: u32,
    ) -> Result<ChapterPage, CatalogError> {
        require(manga_id, "manga id")?;
        require(language, "language")?;
        let (limit, offset) = (limit.to_string(), offset.to_string());
        let url = self.endpoint(
            &["manga", manga_id, "feed"],
            &[
                ("limit", &limit),
                ("offset", &offset),
                ("translatedLanguage[]", language),
                ("includes[]", "scanlation_group"),
                ("includes[]", "user"),
                ("order[volume]", "asc"),
                ("order[chapter]", "asc"),
            ],
        )?;
        debug!(manga_id, %offset, %limit, "fetching chapter feed page");
        let list: ChapterListResponse = self.get_json(url.as_str())?;
        Ok(ChapterPage {
            records: list.data.into_iter().map(chapter_from_data).collect(),
            total: list.total,
        })
    }

    fn fetch_manga(&mut self, manga_id: &str) -> Result<Manga, CatalogError> {
        require(manga_id, "manga id")?;
        let url = self.endpoint(
            &["manga", manga_id],
            &[("includes[]", "author"), ("includes[]", "artist")],
        )?;
        let response: MangaResponse = self.get_json(url.as_str())?;
        Ok(manga_from_data(response.data))
    }

    fn fetch_chapter(&mut self, chapter_id: &str) -> Result<ChapterRecord, CatalogError> {
        require(chapter_id, "chapter id")?;
        let url = self.endpoint(
            &["chapter", chapter_id],
            &[
                ("includes[]", "scanlation_group"),
                ("includes[]", "user"),
                ("includes[]", "manga"),
            ],
        )?;
        let response: ChapterResponse = self.get_json(url.as_str())?;
        Ok(chapter_from_data(response.data))
    }

    fn fetch_images(&mut self, record: &ChapterRecord) -> Result<ChapterFullInfo, CatalogError> {
        require(&record.id, "chapter id")?;
        let url = self.endpoint(&["at-home", "server", &record.id], &[])?;
        let at_home: AtHomeResponse = self.get_json(url.as_str())?;
        Ok(ChapterFullInfo {
            record: record.clone(),
            base_url: at_home.base_url,
            hash: at_home.chapter.hash,
            files: at_home.chapter.data,
            saver_files: at_home.chapter.data_saver,
        })
    }

    fn fetch_page(
        &mut self,
        chapter: &ChapterFullInfo,
        file: &str,
        quality: ImageQuality,
    ) -> Result<PageBytes, CatalogError> {
        require(&chapter.base_url, "image host")?;
        require(&chapter.hash, "chapter hash")?;
        require(file, "page file name")?;
        let url = chapter.page_url(file, quality);
        let response = self.send(&url)?;
        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .unwrap_or_default();
        let bytes = response.bytes().map_err(|e| CatalogError::BodyRead {
            url: url.clone(),
            source: e,
        })?;
        Ok(PageBytes {
            bytes: bytes.to_vec(),
            media_type,
        })
    }
}
