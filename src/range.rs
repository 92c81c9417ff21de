//! Chapter selection: range parsing, feed pagination, filtering and deduplication.
//!
//! Chapter numbers are strings. Most are integers, but decimal sub-chapters ("10.5") sit between
//! two integers in the feed and shift every later chapter by one slot, so the pagination window
//! grows by a full page for each one seen.

use crate::catalog::{CatalogError, ChapterCatalog};
use crate::model::ChapterRecord;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Feed page size used for ranged queries.
pub const PAGE_WINDOW: u32 = 10;
/// Feed page size used when walking the whole feed.
const FULL_FEED_WINDOW: u32 = 100;

/// Requested chapter (or volume) range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// Closed interval; `low == high` selects a single number.
    Span { low: u32, high: u32 },
    All,
    Last,
}

impl RangeSpec {
    pub fn single(n: u32) -> Self {
        RangeSpec::Span { low: n, high: n }
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeSpec::Span { low, high } if low == high => write!(f, "{}", low),
            RangeSpec::Span { low, high } => write!(f, "{}-{}", low, high),
            RangeSpec::All => f.write_str("all"),
            RangeSpec::Last => f.write_str("last"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid range '{input}': {reason}")]
pub struct RangeParseError {
    pub input: String,
    pub reason: String,
}

impl FromStr for RangeSpec {
    type Err = RangeParseError;

    /// Accepts `N`, `N-M`, `all` and `last`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = |reason: &str| RangeParseError {
            input: s.to_string(),
            reason: reason.to_string(),
        };
        match s.to_ascii_lowercase().as_str() {
            "all" => return Ok(RangeSpec::All),
            "last" => return Ok(RangeSpec::Last),
            _ => {}
        }
        let (low, high) = match s.split_once('-') {
            Some((a, b)) => (a.trim(), b.trim()),
            None => (s, s),
        };
        let low: u32 = low
            .parse()
            .map_err(|_| err("start is not a non-negative integer"))?;
        let high: u32 = high
            .parse()
            .map_err(|_| err("end is not a non-negative integer"))?;
        if low > high {
            return Err(err("start must be <= end"));
        }
        Ok(RangeSpec::Span { low, high })
    }
}

/// What to select from the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Chapters(RangeSpec),
    /// Every chapter whose volume number lies in `[low, high]`.
    Volumes { low: u32, high: u32 },
}

/// A chapter selection against one manga feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterQuery {
    pub manga_id: String,
    pub language: String,
    /// Substring the translator name must contain; empty matches every record.
    pub translator: String,
    pub selection: Selection,
}

/// Integer part of a number label: `"12"` -> 12, `"12.5"` -> 12. Anything else is None.
pub fn parse_number_floor(label: &str) -> Option<u32> {
    if let Ok(n) = label.parse::<u32>() {
        return Some(n);
    }
    let parts: Vec<&str> = label.split('.').collect();
    if parts.len() != 2 {
        return None;
    }
    parts[0].parse().ok()
}

fn is_decimal(label: &str) -> bool {
    !label.is_empty() && label.parse::<u32>().is_err()
}

fn translated_by(record: &ChapterRecord, translator: &str) -> bool {
    translator.is_empty() || record.translator.contains(translator)
}

fn validate(query: &ChapterQuery) -> Result<(), CatalogError> {
    if query.manga_id.trim().is_empty() {
        return Err(CatalogError::BadInput("manga id is empty".to_string()));
    }
    if query.language.trim().is_empty() {
        return Err(CatalogError::BadInput("language is empty".to_string()));
    }
    let (low, high) = match query.selection {
        Selection::Chapters(RangeSpec::Span { low, high }) => (low, high),
        Selection::Volumes { low, high } => (low, high),
        _ => return Ok(()),
    };
    if low > high {
        return Err(CatalogError::BadInput(format!(
            "range start {} is greater than end {}",
            low, high
        )));
    }
    Ok(())
}

/// Resolve a query to an ordered, deduplicated chapter list.
///
/// Bad input fails before the catalog is touched. An empty result is not an error.
pub fn resolve_chapters<C>(
    catalog: &mut C,
    query: &ChapterQuery,
) -> Result<Vec<ChapterRecord>, CatalogError>
where
    C: ChapterCatalog + ?Sized,
{
    validate(query)?;
    let chapters = match query.selection {
        Selection::Chapters(RangeSpec::Span { low, high }) => {
            resolve_span(catalog, query, low, high)?
        }
        Selection::Chapters(RangeSpec::All) => resolve_all(catalog, query)?,
        Selection::Chapters(RangeSpec::Last) => resolve_last(catalog, query)?.into_iter().collect(),
        Selection::Volumes { low, high } => resolve_all(catalog, query)?
            .into_iter()
            .filter(|r| parse_number_floor(&r.volume).is_some_and(|v| v >= low && v <= high))
            .collect(),
    };
    debug!(
        manga_id = %query.manga_id,
        count = chapters.len(),
        "resolved chapter selection"
    );
    Ok(chapters)
}

/// Keep page entries whose number lies in `[low, high]`, first-seen per number.
///
/// Returns the number of decimal-numbered entries on the page alongside the kept records.
fn filter_page(
    records: &[ChapterRecord],
    low: u32,
    high: u32,
    translator: &str,
    seen: &mut HashSet<String>,
) -> (Vec<ChapterRecord>, u32) {
    let mut found = Vec::new();
    let mut decimals = 0;
    for record in records {
        if record.number.is_empty() {
            continue;
        }
        if is_decimal(&record.number) {
            decimals += 1;
        }
        let Some(n) = parse_number_floor(&record.number) else {
            continue;
        };
        if n < low || n > high || !translated_by(record, translator) {
            continue;
        }
        if seen.insert(record.number.clone()) {
            found.push(record.clone());
        }
    }
    (found, decimals)
}

/// True when the page holds nothing at or below `low`: empty, or its first numbered entry is past it.
fn starts_after(records: &[ChapterRecord], low: u32) -> bool {
    if records.is_empty() {
        return true;
    }
    records
        .iter()
        .find_map(|r| parse_number_floor(&r.number))
        .is_some_and(|n| n > low)
}

fn resolve_span<C>(
    catalog: &mut C,
    query: &ChapterQuery,
    low: u32,
    high: u32,
) -> Result<Vec<ChapterRecord>, CatalogError>
where
    C: ChapterCatalog + ?Sized,
{
    let fetch = |catalog: &mut C, offset: u32| {
        catalog.fetch_chapter_page(&query.manga_id, &query.language, PAGE_WINDOW, offset)
    };
    // Chapter N sits at feed index N-1 in a dense feed.
    let mut offset = (low.saturating_sub(1) / PAGE_WINDOW) * PAGE_WINDOW;
    let mut page = fetch(catalog, offset)?;

    // Missing chapters move `low` earlier in the feed: step back until a page starts at or below it.
    while offset > 0 && starts_after(&page.records, low) {
        let last_page = (page.total.saturating_sub(1) / PAGE_WINDOW) * PAGE_WINDOW;
        offset = (offset - PAGE_WINDOW).min(last_page);
        debug!(offset, total = page.total, "seeking back for range start");
        page = fetch(catalog, offset)?;
    }

    let mut upper = high;
    if high.saturating_sub(offset) < PAGE_WINDOW {
        upper = upper.saturating_add(PAGE_WINDOW);
    }
    let mut seen = HashSet::new();
    let mut chapters = Vec::new();
    while !page.records.is_empty() {
        let (found, decimals) = filter_page(&page.records, low, high, &query.translator, &mut seen);
        chapters.extend(found);
        upper = upper.saturating_add(decimals * PAGE_WINDOW);

        // A full page ending at or below `high` means the range continues on the next page.
        let full = page.records.len() as u32 >= PAGE_WINDOW;
        let tail_in_range = page
            .records
            .last()
            .and_then(|r| parse_number_floor(&r.number))
            .is_some_and(|n| n <= high);
        if full && tail_in_range {
            upper = upper.max(offset + PAGE_WINDOW);
        }
        debug!(offset, upper, decimals, total = page.total, "feed window");

        offset += PAGE_WINDOW;
        if offset >= page.total || offset > upper {
            break;
        }
        page = fetch(catalog, offset)?;
    }
    Ok(chapters)
}

fn resolve_all<C>(catalog: &mut C, query: &ChapterQuery) -> Result<Vec<ChapterRecord>, CatalogError>
where
    C: ChapterCatalog + ?Sized,
{
    let mut seen = HashSet::new();
    let mut chapters = Vec::new();
    let mut offset = 0;
    loop {
        let page = catalog.fetch_chapter_page(
            &query.manga_id,
            &query.language,
            FULL_FEED_WINDOW,
            offset,
        )?;
        if page.records.is_empty() {
            break;
        }
        for record in page.records {
            if !translated_by(&record, &query.translator) {
                continue;
            }
            // Oneshots have no number; each one is its own chapter.
            let key = if record.number.is_empty() {
                format!("id:{}", record.id)
            } else {
                record.number.clone()
            };
            if seen.insert(key) {
                chapters.push(record);
            }
        }
        offset += FULL_FEED_WINDOW;
        if offset >= page.total {
            break;
        }
    }
    Ok(chapters)
}

fn resolve_last<C>(catalog: &mut C, query: &ChapterQuery) -> Result<Option<ChapterRecord>, CatalogError>
where
    C: ChapterCatalog + ?Sized,
{
    let first = catalog.fetch_chapter_page(&query.manga_id, &query.language, PAGE_WINDOW, 0)?;
    if first.total == 0 || first.records.is_empty() {
        return Ok(None);
    }
    let mut offset = ((first.total - 1) / PAGE_WINDOW) * PAGE_WINDOW;
    let mut page = if offset == 0 {
        first
    } else {
        catalog.fetch_chapter_page(&query.manga_id, &query.language, PAGE_WINDOW, offset)?
    };
    loop {
        if let Some(record) = page
            .records
            .iter()
            .rev()
            .find(|r| translated_by(r, &query.translator))
        {
            return Ok(Some(record.clone()));
        }
        if offset == 0 {
            return Ok(None);
        }
        offset -= PAGE_WINDOW;
        page = catalog.fetch_chapter_page(&query.manga_id, &query.language, PAGE_WINDOW, offset)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fake::{record, FakeCatalog};

    fn query(selection: Selection) -> ChapterQuery {
        ChapterQuery {
            manga_id: "m-1".to_string(),
            language: "en".to_string(),
            translator: String::new(),
            selection,
        }
    }

    fn span(low: u32, high: u32) -> Selection {
        Selection::Chapters(RangeSpec::Span { low, high })
    }

    fn numbers(records: &[ChapterRecord]) -> Vec<&str> {
        records.iter().map(|r| r.number.as_str()).collect()
    }

    #[test]
    fn range_spec_parses_forms() {
        assert_eq!("5".parse::<RangeSpec>(), Ok(RangeSpec::single(5)));
        assert_eq!(
            " 3 - 7 ".parse::<RangeSpec>(),
            Ok(RangeSpec::Span { low: 3, high: 7 })
        );
        assert_eq!("ALL".parse::<RangeSpec>(), Ok(RangeSpec::All));
        assert_eq!("last".parse::<RangeSpec>(), Ok(RangeSpec::Last));
        assert!("10-1".parse::<RangeSpec>().is_err());
        assert!("a-b".parse::<RangeSpec>().is_err());
        assert!("-3".parse::<RangeSpec>().is_err());
        assert_eq!(RangeSpec::Span { low: 1, high: 15 }.to_string(), "1-15");
        assert_eq!(RangeSpec::single(4).to_string(), "4");
    }

    #[test]
    fn parse_number_floor_handles_integers_and_decimals() {
        assert_eq!(parse_number_floor("12"), Some(12));
        assert_eq!(parse_number_floor("12.5"), Some(12));
        assert_eq!(parse_number_floor("1.2.3"), None);
        assert_eq!(parse_number_floor(""), None);
        assert_eq!(parse_number_floor("x.5"), None);
    }

    #[test]
    fn single_chapter_includes_its_decimal_sub_chapter() -> Result<(), CatalogError> {
        let mut catalog = FakeCatalog::with_numbers(&["4", "5", "5.5", "6"], "GroupA");
        let found = resolve_chapters(&mut catalog, &query(span(5, 5)))?;
        assert_eq!(numbers(&found), vec!["5", "5.5"]);

        let found = resolve_chapters(&mut catalog, &query(span(4, 4)))?;
        assert_eq!(numbers(&found), vec!["4"]);

        let found = resolve_chapters(&mut catalog, &query(span(7, 9)))?;
        assert!(found.is_empty());
        Ok(())
    }

    #[test]
    fn first_translator_wins_per_number() -> Result<(), CatalogError> {
        let mut catalog = FakeCatalog::new(vec![
            record("a", "5", "GroupA"),
            record("b", "5", "GroupB"),
        ]);
        let found = resolve_chapters(&mut catalog, &query(span(5, 5)))?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].translator, "GroupA");
        Ok(())
    }

    #[test]
    fn translator_filter_is_substring_match() -> Result<(), CatalogError> {
        let mut catalog = FakeCatalog::new(vec![
            record("a", "5", "GroupA"),
            record("b", "5", "Other Scans"),
        ]);
        let mut q = query(span(5, 5));
        q.translator = "Scans".to_string();
        let found = resolve_chapters(&mut catalog, &q)?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "b");
        Ok(())
    }

    #[test]
    fn decimal_chapter_widens_the_window() -> Result<(), CatalogError> {
        let mut labels: Vec<String> = (1..=7).map(|n| n.to_string()).collect();
        labels.push("7.5".to_string());
        labels.extend((8..=15).map(|n| n.to_string()));
        let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        let mut catalog = FakeCatalog::with_numbers(&refs, "GroupA");

        let found = resolve_chapters(&mut catalog, &query(span(1, 15)))?;
        assert_eq!(found.len(), 16);
        assert_eq!(found[7].number, "7.5");
        assert_eq!(found[15].number, "15");
        Ok(())
    }

    #[test]
    fn duplicate_releases_push_range_onto_next_page() -> Result<(), CatalogError> {
        // Two groups per chapter: chapter 8 lands on the second feed page.
        let mut records = Vec::new();
        for n in 1..=10 {
            records.push(record(&format!("a{}", n), &n.to_string(), "GroupA"));
            records.push(record(&format!("b{}", n), &n.to_string(), "GroupB"));
        }
        let mut catalog = FakeCatalog::new(records);
        let found = resolve_chapters(&mut catalog, &query(span(1, 8)))?;
        assert_eq!(
            numbers(&found),
            vec!["1", "2", "3", "4", "5", "6", "7", "8"]
        );
        assert!(found.iter().all(|r| r.translator == "GroupA"));
        Ok(())
    }

    #[test]
    fn window_starts_at_aligned_offset() -> Result<(), CatalogError> {
        let labels: Vec<String> = (1..=40).map(|n| n.to_string()).collect();
        let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        let mut catalog = FakeCatalog::with_numbers(&refs, "GroupA");
        let found = resolve_chapters(&mut catalog, &query(span(21, 22)))?;
        assert_eq!(numbers(&found), vec!["21", "22"]);
        assert_eq!(catalog.offsets.first(), Some(&20));
        Ok(())
    }

    #[test]
    fn gapped_feed_seeks_back_to_range_start() -> Result<(), CatalogError> {
        // Only chapters 10..=25 are translated, so chapter 21 sits at feed index 11.
        let labels: Vec<String> = (10..=25).map(|n| n.to_string()).collect();
        let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        let mut catalog = FakeCatalog::with_numbers(&refs, "GroupA");
        let found = resolve_chapters(&mut catalog, &query(span(21, 22)))?;
        assert_eq!(numbers(&found), vec!["21", "22"]);
        assert_eq!(catalog.offsets, vec![20, 10]);
        Ok(())
    }

    #[test]
    fn late_start_feed_walks_back_past_short_pages() -> Result<(), CatalogError> {
        let labels: Vec<String> = (30..=60).map(|n| n.to_string()).collect();
        let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        let mut catalog = FakeCatalog::with_numbers(&refs, "GroupA");
        let found = resolve_chapters(&mut catalog, &query(span(35, 36)))?;
        assert_eq!(numbers(&found), vec!["35", "36"]);
        // Start clamps to the last feed page, then steps back one window at a time.
        assert_eq!(&catalog.offsets[..4], &[30, 20, 10, 0]);
        Ok(())
    }

    #[test]
    fn oneshots_are_skipped_in_ranges() -> Result<(), CatalogError> {
        let mut catalog = FakeCatalog::with_numbers(&["", "1", "2"], "GroupA");
        let found = resolve_chapters(&mut catalog, &query(span(0, 5)))?;
        assert_eq!(numbers(&found), vec!["1", "2"]);
        Ok(())
    }

    #[test]
    fn bad_input_makes_no_catalog_calls() {
        let mut catalog = FakeCatalog::with_numbers(&["1"], "GroupA");

        let mut q = query(span(1, 2));
        q.manga_id = String::new();
        assert!(resolve_chapters(&mut catalog, &q).unwrap_err().is_bad_input());

        let mut q = query(span(1, 2));
        q.language = " ".to_string();
        assert!(resolve_chapters(&mut catalog, &q).unwrap_err().is_bad_input());

        let q = query(span(5, 2));
        assert!(resolve_chapters(&mut catalog, &q).unwrap_err().is_bad_input());

        let q = query(Selection::Volumes { low: 3, high: 1 });
        assert!(resolve_chapters(&mut catalog, &q).unwrap_err().is_bad_input());

        assert_eq!(catalog.calls, 0);
    }

    #[test]
    fn all_mode_keeps_oneshots_and_dedups_numbers() -> Result<(), CatalogError> {
        let mut catalog = FakeCatalog::new(vec![
            record("o1", "", "GroupA"),
            record("o2", "", "GroupA"),
            record("a1", "1", "GroupA"),
            record("b1", "1", "GroupB"),
            record("a2", "2", "GroupA"),
        ]);
        let found = resolve_chapters(&mut catalog, &query(Selection::Chapters(RangeSpec::All)))?;
        let ids: Vec<&str> = found.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["o1", "o2", "a1", "a2"]);
        Ok(())
    }

    #[test]
    fn last_mode_walks_back_to_matching_translator() -> Result<(), CatalogError> {
        let mut records: Vec<ChapterRecord> = (1..=12)
            .map(|n| record(&format!("a{}", n), &n.to_string(), "GroupA"))
            .collect();
        records.push(record("b13", "13", "GroupB"));
        let mut catalog = FakeCatalog::new(records);

        let found = resolve_chapters(&mut catalog, &query(Selection::Chapters(RangeSpec::Last)))?;
        assert_eq!(numbers(&found), vec!["13"]);

        let mut q = query(Selection::Chapters(RangeSpec::Last));
        q.translator = "GroupA".to_string();
        let found = resolve_chapters(&mut catalog, &q)?;
        assert_eq!(numbers(&found), vec!["12"]);
        Ok(())
    }

    #[test]
    fn last_mode_on_empty_feed_is_empty() -> Result<(), CatalogError> {
        let mut catalog = FakeCatalog::new(Vec::new());
        let found = resolve_chapters(&mut catalog, &query(Selection::Chapters(RangeSpec::Last)))?;
        assert!(found.is_empty());
        Ok(())
    }

    #[test]
    fn volume_selection_filters_by_volume_number() -> Result<(), CatalogError> {
        let mut v1 = record("a", "1", "GroupA");
        v1.volume = "1".to_string();
        let mut v2 = record("b", "2", "GroupA");
        v2.volume = "2".to_string();
        let mut none = record("c", "3", "GroupA");
        none.volume = String::new();
        let mut catalog = FakeCatalog::new(vec![v1, v2, none]);

        let found = resolve_chapters(&mut catalog, &query(Selection::Volumes { low: 2, high: 5 }))?;
        assert_eq!(numbers(&found), vec!["2"]);
        Ok(())
    }
}
