//! mdpack: CLI downloader for MangaDex chapters, packaging pages as CBZ, PDF, or EPUB.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod loader;
pub mod logging;
pub mod lookup;
pub mod metadata;
pub mod model;
pub mod packager;
pub mod pipeline;
pub mod range;

// Re-exports for CLI and consumers.
pub use catalog::{
    parse_target, CatalogError, ChapterCatalog, MangaDexCatalog, MangaPage, MangaSearch,
    PoliteClient, PoliteClientBuilder, SearchQuery, Target,
};
pub use lookup::{describe_manga, lookup_manga, search_manga};
pub use metadata::Metadata;
pub use packager::{new_packager, OutputFormat, PackageError, Packager};
pub use pipeline::{
    execute_plan, plan_download, DownloadError, DownloadOptions, DownloadPlan, DownloadReport,
    DownloadRequest, FailurePolicy, Progress,
};
pub use range::{resolve_chapters, ChapterQuery, RangeSpec, Selection};
