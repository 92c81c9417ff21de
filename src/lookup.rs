//! Manga lookup: title search and the `info` text view.

use crate::catalog::{CatalogError, ChapterCatalog, MangaPage, MangaSearch, SearchQuery, Target};
use crate::model::Manga;
use reqwest::Url;
use tracing::debug;

/// Results per search request.
pub const SEARCH_PAGE_SIZE: u32 = 25;
const SITE_BASE: &str = "https://mangadex.org";

/// Search by title. Returns the first page, or every page when `every_page` is set.
pub fn search_manga<S>(
    catalog: &mut S,
    query: &SearchQuery,
    every_page: bool,
) -> Result<MangaPage, CatalogError>
where
    S: MangaSearch + ?Sized,
{
    if query.title.trim().is_empty() {
        return Err(CatalogError::BadInput("search title is empty".to_string()));
    }
    let mut results = catalog.search_page(query, SEARCH_PAGE_SIZE, 0)?;
    if !every_page {
        return Ok(results);
    }
    let mut offset = SEARCH_PAGE_SIZE;
    while offset < results.total {
        let page = catalog.search_page(query, SEARCH_PAGE_SIZE, offset)?;
        if page.mangas.is_empty() {
            break;
        }
        debug!(offset, total = results.total, "fetched more search results");
        results.mangas.extend(page.mangas);
        offset += SEARCH_PAGE_SIZE;
    }
    Ok(results)
}

/// The manga behind a target. A chapter target is looked up first to find its manga.
pub fn lookup_manga<C>(catalog: &mut C, target: &Target) -> Result<Manga, CatalogError>
where
    C: ChapterCatalog + ?Sized,
{
    match target {
        Target::Manga(manga_id) => catalog.fetch_manga(manga_id),
        Target::Chapter(chapter_id) => {
            if chapter_id.trim().is_empty() {
                return Err(CatalogError::BadInput("chapter id is empty".to_string()));
            }
            let record = catalog.fetch_chapter(chapter_id)?;
            if record.manga_id.is_empty() {
                return Err(CatalogError::BadInput(format!(
                    "chapter {} does not name its manga",
                    chapter_id
                )));
            }
            catalog.fetch_manga(&record.manga_id)
        }
    }
}

/// Link to the manga's page on the site.
pub fn manga_link(manga_id: &str) -> String {
    format!("{}/title/{}", SITE_BASE, manga_id)
}

/// Link to the site's own search for `title`.
pub fn search_link(title: &str) -> String {
    match Url::parse_with_params(&format!("{}/search", SITE_BASE), &[("q", title)]) {
        Ok(url) => url.into(),
        Err(_) => format!("{}/search", SITE_BASE),
    }
}

fn joined(values: &[String]) -> String {
    if values.is_empty() {
        "-".to_string()
    } else {
        values.join(", ")
    }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

/// Multi-line description of a manga, with text fields in `language` where available.
pub fn describe_manga(manga: &Manga, language: &str) -> String {
    let alt_titles: Vec<String> = manga
        .alt_titles
        .iter()
        .map(|(lang, title)| format!("{} ({})", title, lang))
        .collect();
    let year = manga
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "-".to_string());

    let lines = [
        format!("Title: {}", or_dash(manga.title_in(language))),
        format!("Alternative titles: {}", joined(&alt_titles)),
        format!("Authors: {}", joined(&manga.authors)),
        format!("Artists: {}", joined(&manga.artists)),
        format!("Year: {}", year),
        format!("Tags: {}", joined(&manga.tags)),
        format!("Status: {}", or_dash(&manga.status)),
        format!("Last chapter: {}", or_dash(&manga.last_chapter)),
        format!("Original language: {}", or_dash(&manga.original_language)),
        format!("Translated: {}", joined(&manga.translated_languages)),
        format!("Link: {}", manga_link(&manga.id)),
        "Description:".to_string(),
        or_dash(manga.description_in(language)).to_string(),
    ];
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Search hits as pretty-printed JSON.
pub fn results_json(results: &MangaPage) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&results.mangas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fake::FakeCatalog;

    fn hit(id: &str, title: &str) -> Manga {
        let mut manga = Manga {
            id: id.to_string(),
            ..Manga::default()
        };
        manga.titles.insert("en".to_string(), title.to_string());
        manga
    }

    fn catalog_with_hits(n: usize) -> FakeCatalog {
        let mut catalog = FakeCatalog::new(Vec::new());
        catalog.search_results = (0..n)
            .map(|i| hit(&format!("m-{}", i), &format!("Hit {}", i)))
            .collect();
        catalog
    }

    fn query(title: &str) -> SearchQuery {
        SearchQuery {
            title: title.to_string(),
            include_doujinshi: false,
        }
    }

    #[test]
    fn first_page_only_by_default() -> Result<(), CatalogError> {
        let mut catalog = catalog_with_hits(60);
        let results = search_manga(&mut catalog, &query("hit"), false)?;
        assert_eq!(results.total, 60);
        assert_eq!(results.mangas.len(), 25);
        assert_eq!(catalog.offsets, vec![0]);
        Ok(())
    }

    #[test]
    fn every_page_collects_all_hits() -> Result<(), CatalogError> {
        let mut catalog = catalog_with_hits(60);
        let results = search_manga(&mut catalog, &query("hit"), true)?;
        assert_eq!(results.mangas.len(), 60);
        assert_eq!(results.mangas[59].id, "m-59");
        assert_eq!(catalog.offsets, vec![0, 25, 50]);
        Ok(())
    }

    #[test]
    fn empty_title_makes_no_request() {
        let mut catalog = catalog_with_hits(3);
        let err = search_manga(&mut catalog, &query(" "), true).unwrap_err();
        assert!(err.is_bad_input());
        assert_eq!(catalog.calls, 0);
    }

    #[test]
    fn chapter_target_resolves_to_its_manga() -> Result<(), CatalogError> {
        let mut catalog = FakeCatalog::with_numbers(&["1", "2"], "GroupA");
        let manga = lookup_manga(&mut catalog, &Target::Chapter("c1".to_string()))?;
        assert_eq!(manga.id, "m-1");
        assert_eq!(catalog.calls, 2);

        let err = lookup_manga(&mut catalog, &Target::Chapter("missing".to_string())).unwrap_err();
        assert!(matches!(err, CatalogError::Upstream { status: 404, .. }));
        Ok(())
    }

    #[test]
    fn describe_lists_fields_and_link() {
        let mut manga = hit("abc", "Gorilla");
        manga.authors = vec!["Yuuki".to_string()];
        manga.alt_titles = vec![("ja".to_string(), "ゴリラ".to_string())];
        manga.year = Some(2021);
        manga.last_chapter = "42".to_string();
        manga.translated_languages = vec!["en".to_string(), "ru".to_string()];
        manga
            .descriptions
            .insert("en".to_string(), "A gorilla.".to_string());

        let text = describe_manga(&manga, "en");
        assert!(text.starts_with("Title: Gorilla\n"));
        assert!(text.contains("Alternative titles: ゴリラ (ja)\n"));
        assert!(text.contains("Authors: Yuuki\n"));
        assert!(text.contains("Artists: -\n"));
        assert!(text.contains("Year: 2021\n"));
        assert!(text.contains("Last chapter: 42\n"));
        assert!(text.contains("Translated: en, ru\n"));
        assert!(text.contains("Link: https://mangadex.org/title/abc\n"));
        assert!(text.ends_with("Description:\nA gorilla.\n"));
    }

    #[test]
    fn search_link_encodes_title() {
        assert_eq!(
            search_link("one piece & co"),
            "https://mangadex.org/search?q=one+piece+%26+co"
        );
    }

    #[test]
    fn results_serialize_as_json_array() -> Result<(), serde_json::Error> {
        let results = MangaPage {
            mangas: vec![hit("m-1", "Gorilla")],
            total: 1,
        };
        let value: serde_json::Value = serde_json::from_str(&results_json(&results)?)?;
        assert_eq!(value[0]["id"], "m-1");
        assert_eq!(value[0]["titles"]["en"], "Gorilla");
        Ok(())
    }
}
