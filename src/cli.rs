//! CLI parsing and orchestration. Parses args, plans the download, packages chapters. Maps errors to exit codes.

use crate::catalog::{
    parse_target, CatalogError, MangaDexCatalog, MangaSearch, PoliteClient, SearchQuery, Target,
};
use crate::config::{self, Config};
use crate::lookup::{
    describe_manga, lookup_manga, results_json, search_link, search_manga, SEARCH_PAGE_SIZE,
};
use crate::model::ImageQuality;
use crate::packager::{resolve_output_path, OutputFormat};
use crate::pipeline::{
    chapter_file_name, execute_plan, merged_file_name, plan_download, DownloadError,
    DownloadOptions, DownloadPlan, DownloadRequest, FailurePolicy, Progress,
};
use crate::range::{RangeSpec, Selection};
use clap::{ArgAction, Parser, Subcommand};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_LANGUAGE: &str = "en";

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Catalog(#[from] CatalogError),

    #[error("{0}")]
    Download(#[from] DownloadError),

    #[error("{failed} of {total} chapters failed; see warnings above.")]
    Incomplete { failed: usize, total: usize },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Catalog(_) | CliRunError::Download(DownloadError::Catalog(_)) => 2,
            CliRunError::Download(_)
            | CliRunError::Incomplete { .. }
            | CliRunError::Write { .. } => 3,
        }
    }

    /// Bad input found by the catalog layer is still a usage error.
    fn from_download(e: DownloadError) -> Self {
        match e {
            DownloadError::Catalog(c) if c.is_bad_input() => {
                CliRunError::InvalidInput(c.to_string())
            }
            other => CliRunError::Download(other),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "mdpack", version, subcommand_negates_reqs = true)]
#[command(about = "Download MangaDex chapters and package them as CBZ, PDF, or EPUB")]
#[command(
    after_help = "Config file keys (output_dir, language, format, user_agent, request_delay_ms, timeout_secs, retry_count, retry_backoff_secs, data_saver, continue_on_error) are read from ./mdpack.toml or the user config dir. CLI flags override config."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// MangaDex title or chapter URL, or a bare manga id.
    #[arg(required = true)]
    pub target: Option<String>,

    /// Chapters to download: N, N-M, all, or last. Default: 1.
    #[arg(short, long, value_parser = parse_range, conflicts_with = "volumes")]
    pub chapters: Option<RangeSpec>,

    /// Download whole volumes instead: N or N-M.
    #[arg(long, value_parser = parse_volume_range)]
    pub volumes: Option<(u32, u32)>,

    /// Translation language code (overrides config; default en).
    #[arg(short, long, global = true)]
    pub language: Option<String>,

    /// Only use releases whose scanlation group name contains this text.
    #[arg(short, long, default_value = "")]
    pub translator: String,

    /// Output format: cbz, pdf, or epub (overrides config; default cbz).
    #[arg(short, long, value_parser = parse_format)]
    pub format: Option<OutputFormat>,

    /// Output directory (overrides config; default current directory).
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Download compressed images (smaller files).
    #[arg(long)]
    pub data_saver: bool,

    /// Put all selected chapters into one file.
    #[arg(short, long)]
    pub merge: bool,

    /// Keep going when a chapter fails; failures are reported at the end.
    #[arg(long)]
    pub continue_on_error: bool,

    /// Resolve the selection and print chapters and output names without downloading.
    #[arg(long)]
    pub dry_run: bool,

    /// Suppress progress output (errors only).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// More log output (-v info, -vv debug). Also prints the error cause chain.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// HTTP User-Agent (overrides config).
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// Minimum delay between requests in milliseconds (overrides config; default 250).
    #[arg(long, global = true)]
    pub delay_ms: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print details about a manga, given its URL, id, or one of its chapter URLs.
    Info {
        /// MangaDex title or chapter URL, or a bare manga id.
        target: String,
    },
    /// Search manga by title.
    Find {
        title: String,

        /// Include doujinshi in the results.
        #[arg(short, long)]
        doujinshi: bool,

        /// Save every match as JSON instead of printing (default file: output.json).
        #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "output.json")]
        output_json: Option<PathBuf>,
    },
}

fn parse_range(s: &str) -> Result<RangeSpec, String> {
    s.parse::<RangeSpec>()
        .map_err(|e| format!("Invalid --chapters: {}", e))
}

fn parse_volume_range(s: &str) -> Result<(u32, u32), String> {
    match s.parse::<RangeSpec>() {
        Ok(RangeSpec::Span { low, high }) => Ok((low, high)),
        Ok(_) => Err(format!(
            "Invalid --volumes: expected N or N-M (e.g. 2-4), got '{}'",
            s.trim()
        )),
        Err(e) => Err(format!("Invalid --volumes: {}", e)),
    }
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    OutputFormat::from_extension(s).map_err(|e| e.to_string())
}

/// Merge CLI flags over config values and defaults.
fn resolve_format(args: &Args, config: Option<&Config>) -> Result<OutputFormat, CliRunError> {
    if let Some(format) = args.format {
        return Ok(format);
    }
    match config.and_then(|c| c.format.as_deref()) {
        Some(name) => OutputFormat::from_extension(name)
            .map_err(|e| CliRunError::InvalidInput(format!("Invalid format in config: {}", e))),
        None => Ok(OutputFormat::default()),
    }
}

fn selection(args: &Args) -> Selection {
    match (args.volumes, args.chapters) {
        (Some((low, high)), _) => Selection::Volumes { low, high },
        (None, Some(range)) => Selection::Chapters(range),
        (None, None) => Selection::Chapters(RangeSpec::single(1)),
    }
}

fn build_client(args: &Args, config: Option<&Config>) -> Result<PoliteClient, CliRunError> {
    let mut builder = PoliteClient::builder();
    if let Some(ms) = args
        .delay_ms
        .or_else(|| config.and_then(|c| c.request_delay_ms))
    {
        builder = builder.delay_ms(ms);
    }
    if let Some(secs) = args.timeout.or_else(|| config.and_then(|c| c.timeout_secs)) {
        builder = builder.timeout_secs(secs);
    }
    if let Some(n) = config.and_then(|c| c.retry_count) {
        builder = builder.retry_count(n);
    }
    if let Some(backoff) = config.and_then(|c| c.retry_backoff_secs.clone()) {
        builder = builder.retry_backoff_secs(backoff);
    }
    if let Some(ua) = args
        .user_agent
        .clone()
        .or_else(|| config.and_then(|c| c.user_agent.clone()))
    {
        builder = builder.user_agent(ua);
    }
    builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

fn print_plan(plan: &DownloadPlan, options: &DownloadOptions) {
    println!(
        "{} [{}]: {} chapter(s)",
        plan.manga.title_in(&plan.language),
        plan.language,
        plan.chapters.len()
    );
    for record in &plan.chapters {
        let group = if record.translator.is_empty() {
            "no group"
        } else {
            record.translator.as_str()
        };
        println!(
            "  vol{} ch{} ({}) {}",
            record.volume, record.number, group, record.title
        );
    }
    let ext = options.format.extension();
    let names: Vec<String> = if options.merge {
        vec![merged_file_name(plan, &plan.range_label)]
    } else {
        plan.chapters
            .iter()
            .map(|record| chapter_file_name(plan, record))
            .collect()
    };
    for name in names {
        let path = resolve_output_path(&options.output_dir, &name, ext);
        println!("Output: {}", path.display());
    }
}

fn target_from(input: &str) -> Result<Target, CliRunError> {
    parse_target(input).map_err(|e| match &e {
        CatalogError::InvalidUrl { input, reason } => CliRunError::InvalidInput(format!(
            "Expected a MangaDex URL or manga id. Example: https://mangadex.org/title/<id>/... Invalid: {}: {}",
            input, reason
        )),
        _ => CliRunError::InvalidInput(e.to_string()),
    })
}

fn language(args: &Args, config: Option<&Config>) -> String {
    args.language
        .clone()
        .or_else(|| config.and_then(|c| c.language.clone()))
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
}

fn catalog_error(e: CatalogError) -> CliRunError {
    if e.is_bad_input() {
        CliRunError::InvalidInput(e.to_string())
    } else {
        CliRunError::Catalog(e)
    }
}

/// Search and render the results, or save them all as JSON when `output_json` is set.
fn find_report<S>(
    catalog: &mut S,
    query: &SearchQuery,
    output_json: Option<&Path>,
    language: &str,
) -> Result<String, CliRunError>
where
    S: MangaSearch + ?Sized,
{
    let results = search_manga(catalog, query, output_json.is_some()).map_err(catalog_error)?;
    if results.total == 0 {
        return Ok("Nothing found.\n".to_string());
    }
    if let Some(path) = output_json {
        let write_error = |source: std::io::Error| CliRunError::Write {
            path: path.to_path_buf(),
            source,
        };
        let json = results_json(&results).map_err(|e| write_error(e.into()))?;
        std::fs::write(path, json).map_err(write_error)?;
        return Ok(format!(
            "Saved {} result(s) to {}\n",
            results.mangas.len(),
            path.display()
        ));
    }

    let rule = "-".repeat(40);
    let mut out = format!("Total found: {}\n", results.total);
    for manga in &results.mangas {
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&describe_manga(manga, language));
    }
    if results.total > SEARCH_PAGE_SIZE {
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!(
            "Showing {} of {}. More at {}\n",
            results.mangas.len(),
            results.total,
            search_link(&query.title)
        ));
    }
    Ok(out)
}

fn run_info(args: &Args, target: &str) -> Result<(), CliRunError> {
    let target = target_from(target)?;
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let config = config.as_ref();
    let language = language(args, config);

    let mut client = build_client(args, config)?;
    let mut catalog = MangaDexCatalog::new(&mut client);
    let manga = lookup_manga(&mut catalog, &target).map_err(catalog_error)?;
    print!("{}", describe_manga(&manga, &language));
    Ok(())
}

fn run_find(
    args: &Args,
    title: &str,
    doujinshi: bool,
    output_json: Option<&Path>,
) -> Result<(), CliRunError> {
    let query = SearchQuery {
        title: title.to_string(),
        include_doujinshi: doujinshi,
    };
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let config = config.as_ref();
    let language = language(args, config);

    let mut client = build_client(args, config)?;
    let mut catalog = MangaDexCatalog::new(&mut client);
    print!(
        "{}",
        find_report(&mut catalog, &query, output_json, &language)?
    );
    Ok(())
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    match &args.command {
        Some(Command::Info { target }) => run_info(args, target),
        Some(Command::Find {
            title,
            doujinshi,
            output_json,
        }) => run_find(args, title, *doujinshi, output_json.as_deref()),
        None => match args.target.as_deref() {
            Some(target) => run_download(args, target),
            None => Err(CliRunError::InvalidInput(
                "Missing target: pass a MangaDex URL or manga id".to_string(),
            )),
        },
    }
}

fn run_download(args: &Args, target: &str) -> Result<(), CliRunError> {
    let target = target_from(target)?;

    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let config = config.as_ref();

    let format = resolve_format(args, config)?;
    let language = language(args, config);
    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| config.and_then(|c| c.output_dir.clone()))
        .unwrap_or_else(|| PathBuf::from("."));
    let data_saver = args.data_saver || config.and_then(|c| c.data_saver).unwrap_or(false);
    let keep_going =
        args.continue_on_error || config.and_then(|c| c.continue_on_error).unwrap_or(false);

    let options = DownloadOptions {
        output_dir,
        format,
        quality: if data_saver {
            ImageQuality::DataSaver
        } else {
            ImageQuality::Original
        },
        merge: args.merge,
        failure_policy: if keep_going {
            FailurePolicy::Continue
        } else {
            FailurePolicy::Abort
        },
        ..DownloadOptions::default()
    };

    let request = DownloadRequest {
        target,
        selection: selection(args),
        language,
        translator: args.translator.clone(),
    };

    let mut client = build_client(args, config)?;
    let mut catalog = MangaDexCatalog::new(&mut client);

    let plan = match plan_download(&mut catalog, &request) {
        Ok(plan) => plan,
        Err(DownloadError::NoChapters { .. }) => {
            eprintln!(
                "No chapters found for that selection. Try another range, language, or translator."
            );
            return Ok(());
        }
        Err(e) => return Err(CliRunError::from_download(e)),
    };

    if args.dry_run {
        print_plan(&plan, &options);
        return Ok(());
    }

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |event: Progress<'_>| {
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new(0);
            if let Ok(style) = indicatif::ProgressStyle::default_bar()
                .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
            {
                bar.set_style(
                    style
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                        .progress_chars("█▉▊▋▌▍▎▏ "),
                );
            }
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        match event {
            Progress::ChapterStarted {
                index,
                total,
                record,
            } => {
                pb.reset();
                pb.set_length(u64::from(record.pages));
                pb.set_message(format!(
                    "Chapter {} ({}/{})",
                    record.number,
                    index + 1,
                    total
                ));
            }
            Progress::PageDone { done, total } => {
                pb.set_length(total as u64);
                pb.set_position(done as u64);
            }
            Progress::Written { path } => pb.println(format!("Wrote {}", path.display())),
        }
    };
    let progress: Option<&dyn Fn(Progress<'_>)> = if args.quiet {
        None
    } else {
        Some(&progress_cb)
    };

    let result = execute_plan(&mut catalog, &plan, &options, progress);

    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }

    let report = result.map_err(CliRunError::from_download)?;
    if !args.quiet {
        eprintln!(
            "Done: {} written, {} skipped, {} failed.",
            report.written.len(),
            report.skipped.len(),
            report.failed.len()
        );
    }
    if !report.failed.is_empty() {
        for failure in &report.failed {
            eprintln!("  ch{}: {}", failure.chapter.number, failure.error);
        }
        return Err(CliRunError::Incomplete {
            failed: report.failed.len(),
            total: plan.chapters.len(),
        });
    }
    Ok(())
}
