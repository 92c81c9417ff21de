//! Chapter image loading: resolve a chapter's page list, then download pages in reading order.

use crate::catalog::{CatalogError, ChapterCatalog};
use crate::model::{ChapterFullInfo, ChapterRecord, ImageQuality};
use tracing::debug;

/// One downloaded page, ready for a packager.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPage {
    /// File extension matching the page's media type (`jpg`, `png`, `gif`, `webp`).
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

/// Map a declared image media type to the extension used inside containers.
pub fn extension_for_media_type(media_type: &str) -> Option<&'static str> {
    match media_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Resolve the image host location and page file lists for `record`.
///
/// A chapter with no pages is returned as-is; callers decide whether that is an error.
pub fn load_chapter<C>(catalog: &mut C, record: &ChapterRecord) -> Result<ChapterFullInfo, CatalogError>
where
    C: ChapterCatalog + ?Sized,
{
    let full = catalog.fetch_images(record)?;
    debug!(
        chapter = %record.number,
        pages = full.files.len(),
        saver_pages = full.saver_files.len(),
        "chapter page list"
    );
    Ok(full)
}

/// Download one page and check its media type.
pub fn load_page<C>(
    catalog: &mut C,
    chapter: &ChapterFullInfo,
    file: &str,
    quality: ImageQuality,
) -> Result<LoadedPage, CatalogError>
where
    C: ChapterCatalog + ?Sized,
{
    let page = catalog.fetch_page(chapter, file, quality)?;
    let extension = extension_for_media_type(&page.media_type).ok_or_else(|| {
        CatalogError::UnexpectedMediaType {
            url: chapter.page_url(file, quality),
            content_type: page.media_type.clone(),
        }
    })?;
    Ok(LoadedPage {
        extension,
        bytes: page.bytes,
    })
}

/// Download every page of `chapter` in reading order, handing each to `sink`.
///
/// Stops at the first failing page; pages already handed over stay with the sink.
pub fn for_each_page<C, E, F>(
    catalog: &mut C,
    chapter: &ChapterFullInfo,
    quality: ImageQuality,
    mut sink: F,
) -> Result<usize, E>
where
    C: ChapterCatalog + ?Sized,
    E: From<CatalogError>,
    F: FnMut(LoadedPage) -> Result<(), E>,
{
    let files = chapter.files_for(quality);
    for file in files {
        let page = load_page(catalog, chapter, file, quality)?;
        sink(page)?;
    }
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fake::{record, FakeCatalog};

    #[test]
    fn media_types_map_to_extensions() {
        assert_eq!(extension_for_media_type("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for_media_type("IMAGE/PNG"), Some("png"));
        assert_eq!(extension_for_media_type("image/gif"), Some("gif"));
        assert_eq!(extension_for_media_type("image/webp"), Some("webp"));
        assert_eq!(extension_for_media_type("text/html"), None);
        assert_eq!(extension_for_media_type(""), None);
    }

    #[test]
    fn pages_are_delivered_in_order() -> Result<(), CatalogError> {
        let mut catalog = FakeCatalog::new(vec![record("c1", "1", "GroupA")]);
        catalog.pages_per_chapter = 3;
        let full = load_chapter(&mut catalog, &record("c1", "1", "GroupA"))?;
        assert_eq!(full.files, vec!["1.png", "2.png", "3.png"]);

        let mut got = Vec::new();
        let count = for_each_page(&mut catalog, &full, ImageQuality::Original, |page| {
            got.push(page.extension);
            Ok::<(), CatalogError>(())
        })?;
        assert_eq!(count, 3);
        assert_eq!(got, vec!["png", "png", "png"]);
        Ok(())
    }

    #[test]
    fn unexpected_media_type_fails_the_page() -> Result<(), CatalogError> {
        let mut catalog = FakeCatalog::new(vec![record("c1", "1", "GroupA")]);
        catalog.media_type = "text/html".to_string();
        let full = load_chapter(&mut catalog, &record("c1", "1", "GroupA"))?;
        let err = load_page(&mut catalog, &full, "1.jpg", ImageQuality::DataSaver).unwrap_err();
        match err {
            CatalogError::UnexpectedMediaType { url, content_type } => {
                assert_eq!(url, "fake://host/data-saver/hash-c1/1.jpg");
                assert_eq!(content_type, "text/html");
            }
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }
}
