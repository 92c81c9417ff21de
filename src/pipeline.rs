//! Download pipeline: resolve a request into a [DownloadPlan], then load and package each chapter.

use crate::catalog::{CatalogError, ChapterCatalog, Target};
use crate::loader::{for_each_page, load_chapter};
use crate::metadata::Metadata;
use crate::model::{ChapterFullInfo, ChapterRecord, ImageQuality, Manga};
use crate::packager::{new_packager, OutputFormat, PackageError, Packager};
use crate::range::{resolve_chapters, ChapterQuery, Selection};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error("No chapters matched the selection for manga {manga_id} in language '{language}'.")]
    NoChapters { manga_id: String, language: String },
}

/// What to do with the rest of the run when one chapter fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failed chapter.
    #[default]
    Abort,
    /// Log the failure, record it in the report, and go on.
    Continue,
}

/// A user's download request before any catalog access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub target: Target,
    pub selection: Selection,
    pub language: String,
    /// Translator name filter (substring); empty matches all.
    pub translator: String,
}

/// Resolved work: the manga, its selected chapters in reading order, and the merged range label.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadPlan {
    pub manga: Manga,
    pub chapters: Vec<ChapterRecord>,
    pub language: String,
    /// `first` or `first-last` chapter numbers of the selection.
    pub range_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    pub output_dir: PathBuf,
    pub format: OutputFormat,
    pub quality: ImageQuality,
    /// Package every chapter into one file.
    pub merge: bool,
    pub failure_policy: FailurePolicy,
    /// Written into metadata as the producing application.
    pub app_id: String,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            format: OutputFormat::default(),
            quality: ImageQuality::default(),
            merge: false,
            failure_policy: FailurePolicy::default(),
            app_id: concat!("mdpack/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Progress events, in emission order per chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress<'a> {
    ChapterStarted {
        index: usize,
        total: usize,
        record: &'a ChapterRecord,
    },
    PageDone {
        done: usize,
        total: usize,
    },
    Written {
        path: &'a Path,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterFailure {
    pub chapter: ChapterRecord,
    pub error: String,
}

/// Outcome of a run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub written: Vec<PathBuf>,
    /// Chapters the catalog lists without pages (e.g. hosted elsewhere).
    pub skipped: Vec<ChapterRecord>,
    pub failed: Vec<ChapterFailure>,
}

/// `"1"` for one chapter, `"1-5"` for several.
pub fn chapter_range_label(chapters: &[ChapterRecord]) -> String {
    match chapters {
        [] => String::new(),
        [only] => only.number.clone(),
        [first, .., last] => format!("{}-{}", first.number, last.number),
    }
}

/// Resolve a request against the catalog.
///
/// Input is validated before the first catalog call. A selection matching nothing is
/// [DownloadError::NoChapters].
pub fn plan_download<C>(catalog: &mut C, request: &DownloadRequest) -> Result<DownloadPlan, DownloadError>
where
    C: ChapterCatalog + ?Sized,
{
    let (manga, chapters, language) = match &request.target {
        Target::Manga(manga_id) => {
            let query = ChapterQuery {
                manga_id: manga_id.clone(),
                language: request.language.clone(),
                translator: request.translator.clone(),
                selection: request.selection,
            };
            let chapters = resolve_chapters(catalog, &query)?;
            if chapters.is_empty() {
                return Err(DownloadError::NoChapters {
                    manga_id: manga_id.clone(),
                    language: request.language.clone(),
                });
            }
            let manga = catalog.fetch_manga(manga_id)?;
            (manga, chapters, request.language.clone())
        }
        Target::Chapter(chapter_id) => {
            if chapter_id.trim().is_empty() {
                return Err(CatalogError::BadInput("chapter id is empty".to_string()).into());
            }
            let record = catalog.fetch_chapter(chapter_id)?;
            if record.manga_id.is_empty() {
                return Err(CatalogError::BadInput(format!(
                    "chapter {} does not name its manga",
                    chapter_id
                ))
                .into());
            }
            let manga = catalog.fetch_manga(&record.manga_id)?;
            let language = record.language.clone();
            (manga, vec![record], language)
        }
    };
    info!(
        manga = manga.title_in(&language),
        chapters = chapters.len(),
        "download planned"
    );
    let range_label = chapter_range_label(&chapters);
    Ok(DownloadPlan {
        manga,
        chapters,
        language,
        range_label,
    })
}

/// File name (without extension) for a single chapter.
pub fn chapter_file_name(plan: &DownloadPlan, record: &ChapterRecord) -> String {
    format!(
        "[{}] {} vol{} ch{}",
        plan.language,
        plan.manga.title_in(&plan.language),
        record.volume,
        record.number
    )
}

/// File name (without extension) for a merged file covering `range_label`.
pub fn merged_file_name(plan: &DownloadPlan, range_label: &str) -> String {
    format!(
        "[{}] {} ch{}",
        plan.language,
        plan.manga.title_in(&plan.language),
        range_label
    )
}

/// Download and package the planned chapters.
///
/// Without merge, each chapter is its own file and failures follow `options.failure_policy`.
/// With merge, any chapter failure aborts the merged output.
pub fn execute_plan<C>(
    catalog: &mut C,
    plan: &DownloadPlan,
    options: &DownloadOptions,
    progress: Option<&dyn Fn(Progress<'_>)>,
) -> Result<DownloadReport, DownloadError>
where
    C: ChapterCatalog + ?Sized,
{
    let timestamp = Utc::now();
    if options.merge {
        return execute_merged(catalog, plan, options, timestamp, progress);
    }
    let mut report = DownloadReport::default();
    let total = plan.chapters.len();
    for (index, record) in plan.chapters.iter().enumerate() {
        if let Some(cb) = progress {
            cb(Progress::ChapterStarted {
                index,
                total,
                record,
            });
        }
        match download_chapter(catalog, plan, record, options, timestamp, progress) {
            Ok(Some(path)) => report.written.push(path),
            Ok(None) => {
                warn!(chapter = %record.number, id = %record.id, "chapter has no pages, skipping");
                report.skipped.push(record.clone());
            }
            Err(e) => match options.failure_policy {
                FailurePolicy::Abort => return Err(e),
                FailurePolicy::Continue => {
                    warn!(chapter = %record.number, id = %record.id, error = %e, "chapter failed");
                    report.failed.push(ChapterFailure {
                        chapter: record.clone(),
                        error: e.to_string(),
                    });
                }
            },
        }
    }
    Ok(report)
}

/// Load a chapter's pages into `packager`. Returns the loaded chapter info.
fn append_chapter<C>(
    catalog: &mut C,
    record: &ChapterRecord,
    packager: &mut dyn Packager,
    quality: ImageQuality,
    progress: Option<&dyn Fn(Progress<'_>)>,
) -> Result<ChapterFullInfo, DownloadError>
where
    C: ChapterCatalog + ?Sized,
{
    let full = load_chapter(catalog, record)?;
    let total = full.files_for(quality).len();
    let mut done = 0;
    for_each_page(catalog, &full, quality, |page| {
        packager.add_page(page.extension, &page.bytes)?;
        done += 1;
        if let Some(cb) = progress {
            cb(Progress::PageDone { done, total });
        }
        Ok::<(), DownloadError>(())
    })?;
    Ok(full)
}

fn download_chapter<C>(
    catalog: &mut C,
    plan: &DownloadPlan,
    record: &ChapterRecord,
    options: &DownloadOptions,
    timestamp: DateTime<Utc>,
    progress: Option<&dyn Fn(Progress<'_>)>,
) -> Result<Option<PathBuf>, DownloadError>
where
    C: ChapterCatalog + ?Sized,
{
    let mut packager = new_packager(options.format)?;
    let full = append_chapter(catalog, record, packager.as_mut(), options.quality, progress)?;
    if packager.page_count() == 0 {
        return Ok(None);
    }
    let metadata = Metadata::build(
        &options.app_id,
        &plan.manga,
        std::slice::from_ref(&full),
        timestamp,
    );
    let path = packager.finalize(
        &options.output_dir,
        &chapter_file_name(plan, record),
        &metadata,
        None,
    )?;
    info!(path = %path.display(), "wrote chapter");
    if let Some(cb) = progress {
        cb(Progress::Written { path: &path });
    }
    Ok(Some(path))
}

fn execute_merged<C>(
    catalog: &mut C,
    plan: &DownloadPlan,
    options: &DownloadOptions,
    timestamp: DateTime<Utc>,
    progress: Option<&dyn Fn(Progress<'_>)>,
) -> Result<DownloadReport, DownloadError>
where
    C: ChapterCatalog + ?Sized,
{
    let mut report = DownloadReport::default();
    let mut packager = new_packager(options.format)?;
    let mut loaded = Vec::with_capacity(plan.chapters.len());
    let total = plan.chapters.len();
    for (index, record) in plan.chapters.iter().enumerate() {
        if let Some(cb) = progress {
            cb(Progress::ChapterStarted {
                index,
                total,
                record,
            });
        }
        let before = packager.page_count();
        let full = append_chapter(catalog, record, packager.as_mut(), options.quality, progress)?;
        if packager.page_count() == before {
            warn!(chapter = %record.number, id = %record.id, "chapter has no pages, skipping");
            report.skipped.push(record.clone());
            continue;
        }
        loaded.push(full);
    }
    if loaded.is_empty() {
        return Ok(report);
    }
    let metadata = Metadata::build(&options.app_id, &plan.manga, &loaded, timestamp);
    // Skipped chapters at either end narrow the label.
    let written: Vec<ChapterRecord> = loaded.iter().map(|full| full.record.clone()).collect();
    let range_label = chapter_range_label(&written);
    let path = packager.finalize(
        &options.output_dir,
        &merged_file_name(plan, &range_label),
        &metadata,
        Some(&range_label),
    )?;
    info!(path = %path.display(), chapters = loaded.len(), "wrote merged file");
    if let Some(cb) = progress {
        cb(Progress::Written { path: &path });
    }
    report.written.push(path);
    Ok(report)
}
