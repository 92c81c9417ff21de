//! In-memory catalog for resolver and pipeline tests.

use crate::catalog::{
    CatalogError, ChapterCatalog, ChapterPage, MangaPage, MangaSearch, PageBytes, SearchQuery,
};
use crate::model::{ChapterFullInfo, ChapterRecord, ImageQuality, Manga};
use std::collections::HashSet;

/// Encode a solid `width` x `height` image in the given format.
pub(crate) fn image_bytes(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, format).expect("encode test image");
    out.into_inner()
}

/// Catalog backed by a fixed record list in feed order.
#[derive(Debug, Default)]
pub(crate) struct FakeCatalog {
    pub manga: Manga,
    pub records: Vec<ChapterRecord>,
    /// Pages served per chapter.
    pub pages_per_chapter: usize,
    /// Media type served for every page.
    pub media_type: String,
    /// Chapter ids whose image lookup fails.
    pub broken_chapters: HashSet<String>,
    /// Chapter ids served with no page files.
    pub empty_chapters: HashSet<String>,
    /// Number of catalog calls of any kind.
    pub calls: usize,
    /// Offsets requested through fetch_chapter_page, in call order.
    pub offsets: Vec<u32>,
    /// Search hits served in pages, whatever the title.
    pub search_results: Vec<Manga>,
}

impl FakeCatalog {
    pub fn new(records: Vec<ChapterRecord>) -> Self {
        let mut manga = Manga {
            id: "m-1".to_string(),
            year: Some(2021),
            status: "ongoing".to_string(),
            publisher: "seinen".to_string(),
            authors: vec!["Writer One".to_string()],
            artists: vec!["Artist One".to_string()],
            tags: vec!["Comedy".to_string()],
            ..Manga::default()
        };
        manga
            .titles
            .insert("en".to_string(), "Test Manga".to_string());
        manga
            .descriptions
            .insert("en".to_string(), "About a test.".to_string());
        Self {
            manga,
            records,
            pages_per_chapter: 2,
            media_type: "image/png".to_string(),
            ..Self::default()
        }
    }

    /// Records numbered by `numbers`, all by `group`, in the given order.
    pub fn with_numbers(numbers: &[&str], group: &str) -> Self {
        let records = numbers
            .iter()
            .enumerate()
            .map(|(i, n)| record(&format!("c{}", i), n, group))
            .collect();
        Self::new(records)
    }
}

/// Chapter record in volume 1 with the given id, number and translator.
pub(crate) fn record(id: &str, number: &str, group: &str) -> ChapterRecord {
    ChapterRecord {
        id: id.to_string(),
        manga_id: "m-1".to_string(),
        volume: "1".to_string(),
        number: number.to_string(),
        language: "en".to_string(),
        translator: group.to_string(),
        pages: 2,
        ..ChapterRecord::default()
    }
}

impl MangaSearch for FakeCatalog {
    fn search_page(
        &mut self,
        query: &SearchQuery,
        limit: u32,
        offset: u32,
    ) -> Result<MangaPage, CatalogError> {
        self.calls += 1;
        self.offsets.push(offset);
        if query.title.trim().is_empty() {
            return Err(CatalogError::BadInput("search title is empty".to_string()));
        }
        let start = (offset as usize).min(self.search_results.len());
        let end = (start + limit as usize).min(self.search_results.len());
        Ok(MangaPage {
            mangas: self.search_results[start..end].to_vec(),
            total: self.search_results.len() as u32,
        })
    }
}

impl ChapterCatalog for FakeCatalog {
    fn fetch_chapter_page(
        &mut self,
        manga_id: &str,
        language: &str,
        limit: u32,
        offset: u32,
    ) -> Result<ChapterPage, CatalogError> {
        self.calls += 1;
        self.offsets.push(offset);
        if manga_id.is_empty() || language.is_empty() {
            return Err(CatalogError::BadInput("empty manga id or language".to_string()));
        }
        let start = (offset as usize).min(self.records.len());
        let end = (start + limit as usize).min(self.records.len());
        Ok(ChapterPage {
            records: self.records[start..end].to_vec(),
            total: self.records.len() as u32,
        })
    }

    fn fetch_manga(&mut self, _manga_id: &str) -> Result<Manga, CatalogError> {
        self.calls += 1;
        Ok(self.manga.clone())
    }

    fn fetch_chapter(&mut self, chapter_id: &str) -> Result<ChapterRecord, CatalogError> {
        self.calls += 1;
        self.records
            .iter()
            .find(|r| r.id == chapter_id)
            .cloned()
            .ok_or_else(|| CatalogError::Upstream {
                status: 404,
                url: format!("fake://chapter/{}", chapter_id),
                detail: "not found".to_string(),
            })
    }

    fn fetch_images(&mut self, record: &ChapterRecord) -> Result<ChapterFullInfo, CatalogError> {
        self.calls += 1;
        if self.broken_chapters.contains(&record.id) {
            return Err(CatalogError::Upstream {
                status: 503,
                url: format!("fake://at-home/{}", record.id),
                detail: "unavailable".to_string(),
            });
        }
        let pages = if self.empty_chapters.contains(&record.id) {
            0
        } else {
            self.pages_per_chapter
        };
        let files = (1..=pages)
            .map(|i| format!("{}.png", i))
            .collect::<Vec<_>>();
        let saver_files = (1..=pages)
            .map(|i| format!("{}.jpg", i))
            .collect();
        Ok(ChapterFullInfo {
            record: record.clone(),
            base_url: "fake://host".to_string(),
            hash: format!("hash-{}", record.id),
            files,
            saver_files,
        })
    }

    fn fetch_page(
        &mut self,
        _chapter: &ChapterFullInfo,
        _file: &str,
        _quality: ImageQuality,
    ) -> Result<PageBytes, CatalogError> {
        self.calls += 1;
        Ok(PageBytes {
            bytes: image_bytes(4, 6, image::ImageFormat::Png),
            media_type: self.media_type.clone(),
        })
    }
}

/// Metadata for chapter 5 of the fake manga at a fixed timestamp.
pub(crate) fn sample_metadata() -> crate::metadata::Metadata {
    use chrono::TimeZone;
    let catalog = FakeCatalog::new(Vec::new());
    let timestamp = chrono::Utc
        .with_ymd_and_hms(2024, 3, 1, 12, 30, 0)
        .single()
        .expect("valid timestamp");
    crate::metadata::Metadata::build(
        "mdpack-test",
        &catalog.manga,
        &[record("c5", "5", "GroupA")],
        timestamp,
    )
}
