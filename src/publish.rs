//! The publishing pipeline. An entry source is a draft while it lives in
//! `{source}/draft/` and published once it has moved to `{source}/published/`;
//! [`Publisher::publish`] is the only transition between the two and it also
//! produces the entry's page in the output directory.
//!
//! Publishing is two-phase: the page is written to a hidden temporary file
//! first, then the source is moved, and finally the temporary file is renamed
//! into place. If the final rename fails the source is moved back to the
//! draft directory, so a failed publish never leaves a stale page behind a
//! source that is still a draft.

use crate::config::{Config, Site};
use crate::entry::{Error as EntryError, HtmlEntry, MdEntry};
use crate::feed::{Error as FeedError, FeedModel};
use crate::frontmatter::{self, Error as FrontMatterError};
use crate::markdown::{Error as MarkdownError, Renderer};
use crate::page::{sort_by_revision, PageLink};
use crate::template::{Error as TemplateError, Templates};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const MARKDOWN_EXTENSION: &str = ".md";

/// The name of the generated index page.
pub const INDEX_FILE: &str = "index.html";

/// The name of the generated RSS feed.
pub const RSS_FILE: &str = "feed.rss";

/// The name of the generated Atom feed.
pub const ATOM_FILE: &str = "feed.atom";

/// Runs the parse, validate, render, and write steps for entries. Holds no
/// mutable state, so one instance can serve many threads.
pub struct Publisher {
    drafts_directory: PathBuf,
    published_directory: PathBuf,
    output_directory: PathBuf,
    site: Site,
    threads: usize,
    templates: Templates,
    renderer: Box<dyn Renderer>,
}

/// The outcome of [`Publisher::publish_all`]: every draft appears exactly once
/// in either list, ordered by name.
#[derive(Debug, Default)]
pub struct PublishReport {
    /// Draft file names and the pages written for them.
    pub published: Vec<(String, PathBuf)>,

    /// Draft file names and why they could not be published.
    pub failed: Vec<(String, Error)>,

    /// Set when drafts were published but the index or feeds could not be
    /// rebuilt afterwards.
    pub regeneration: Option<Error>,
}

impl PublishReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.regeneration.is_none()
    }
}

impl fmt::Display for PublishReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (name, path) in &self.published {
            writeln!(f, "published {} -> {}", name, path.display())?;
        }
        for (name, err) in &self.failed {
            writeln!(f, "failed    {}: {}", name, err)?;
        }
        if let Some(err) = &self.regeneration {
            writeln!(f, "failed to regenerate index and feeds: {}", err)?;
        }
        write!(
            f,
            "{} published, {} failed",
            self.published.len(),
            self.failed.len()
        )
    }
}

impl Publisher {
    /// Constructs a publisher for the directories and site described by
    /// `config`.
    pub fn new(config: &Config, templates: Templates, renderer: Box<dyn Renderer>) -> Publisher {
        Publisher {
            drafts_directory: config.drafts_directory(),
            published_directory: config.published_directory(),
            output_directory: config.output_directory.clone(),
            site: config.site.clone(),
            threads: config.threads.max(1),
            templates,
            renderer,
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Parses, validates, and renders the source at `path` into a full page.
    fn render_source(&self, path: &Path) -> Result<(String, HtmlEntry)> {
        let annotate = |err: Error| Error::Annotated(format!("rendering `{}`", path.display()), Box::new(err));

        let (front_matter, body) = frontmatter::parse_file(path)?;
        let mut entry = HtmlEntry::new(&front_matter).map_err(|e| annotate(e.into()))?;
        entry.body = self
            .renderer
            .render_bytes(&body, &entry.html_file_name())
            .map_err(|e| annotate(e.into()))?;
        let page = self
            .templates
            .render_page(&self.site, &entry)
            .map_err(|e| annotate(e.into()))?;
        Ok((page, entry))
    }

    /// Renders the draft `name` (with or without the `.md` extension) without
    /// writing anything.
    pub fn preview(&self, name: &str) -> Result<(String, HtmlEntry)> {
        let file_name = source_file_name(name)?;
        self.render_source(&self.drafts_directory.join(file_name))
    }

    /// Publishes the draft `name` (with or without the `.md` extension) and
    /// returns the path of the page written. The index and feeds are left
    /// alone; see [`Publisher::generate_index`] and
    /// [`Publisher::generate_feeds`].
    pub fn publish(&self, name: &str) -> Result<PathBuf> {
        let file_name = source_file_name(name)?;
        let draft_path = self.drafts_directory.join(&file_name);
        let published_path = self.published_directory.join(&file_name);

        let (page, entry) = self.render_source(&draft_path)?;

        let html_file_name = entry.html_file_name();
        let target = self.output_directory.join(&html_file_name);

        fs::create_dir_all(&self.output_directory)?;
        fs::create_dir_all(&self.published_directory)?;

        // Uniquely named and hidden from the server. Dropping it removes the
        // file, so every early return below cleans up after itself.
        let mut temporary = tempfile::Builder::new()
            .prefix(&format!(".{}.", html_file_name))
            .suffix(".tmp")
            .tempfile_in(&self.output_directory)
            .map_err(|e| io_context("creating a temporary page in", &self.output_directory, e))?;
        temporary
            .write_all(page.as_bytes())
            .map_err(|e| io_context("writing", temporary.path(), e))?;

        if let Err(err) = fs::rename(&draft_path, &published_path) {
            return Err(io_context("moving", &draft_path, err));
        }

        if let Err(err) = temporary.persist(&target) {
            if let Err(restore) = fs::rename(&published_path, &draft_path) {
                warn!(
                    source = %published_path.display(),
                    error = %restore,
                    "could not move source back to drafts"
                );
            }
            return Err(io_context("writing", &target, err.error));
        }

        info!(entry = %file_name, page = %target.display(), "published");
        Ok(target)
    }

    /// Publishes every draft on a pool of worker threads, then regenerates the
    /// index and feeds if anything was published. Per-draft failures are
    /// collected in the report instead of aborting the batch, and so is a
    /// failure to regenerate.
    ///
    /// Drafts sharing a title would write the same page, so none of them is
    /// published and each is reported as failed.
    pub fn publish_all(&self) -> Result<PublishReport> {
        let mut report = PublishReport::default();
        let (drafts, rejected) = self.partition_by_title(self.list_drafts()?);
        report.failed = rejected;
        if drafts.is_empty() {
            info!(rejected = report.failed.len(), "no drafts to publish");
            return Ok(report);
        }

        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded::<String>();
        let (results_tx, results_rx) = crossbeam_channel::unbounded::<(String, Result<PathBuf>)>();
        for name in &drafts {
            // the receiver is alive until the end of this function
            let _ = jobs_tx.send(name.clone());
        }
        drop(jobs_tx);

        let workers = self.threads.min(drafts.len());
        debug!(drafts = drafts.len(), workers, "publishing drafts");
        std::thread::scope(|scope| {
            for _ in 0..workers {
                let jobs = jobs_rx.clone();
                let results = results_tx.clone();
                scope.spawn(move || {
                    for name in jobs {
                        let result = self.publish(&name);
                        let _ = results.send((name, result));
                    }
                });
            }
        });
        drop(results_tx);

        for (name, result) in results_rx {
            match result {
                Ok(path) => report.published.push((name, path)),
                Err(err) => {
                    warn!(entry = %name, error = %err, "failed to publish");
                    report.failed.push((name, err));
                }
            }
        }
        report.published.sort_by(|a, b| a.0.cmp(&b.0));
        report.failed.sort_by(|a, b| a.0.cmp(&b.0));

        if !report.published.is_empty() {
            let regenerated = self
                .generate_index()
                .and_then(|_| self.generate_feeds(Utc::now()));
            if let Err(err) = regenerated {
                warn!(error = %err, "failed to regenerate index and feeds");
                report.regeneration = Some(err);
            }
        }
        Ok(report)
    }

    // Splits drafts into those safe to publish concurrently and those whose
    // title is shared with another draft. Drafts whose front matter can't be
    // read go through so `publish` reports the real problem.
    fn partition_by_title(&self, drafts: Vec<String>) -> (Vec<String>, Vec<(String, Error)>) {
        let mut runnable = Vec::new();
        let mut by_title: HashMap<String, Vec<String>> = HashMap::new();
        for name in drafts {
            let title = frontmatter::parse_file(&self.drafts_directory.join(&name))
                .ok()
                .and_then(|(mut front_matter, _)| front_matter.remove("title"));
            match title {
                Some(title) => by_title.entry(title).or_default().push(name),
                None => runnable.push(name),
            }
        }

        let mut rejected = Vec::new();
        for (title, names) in by_title {
            if names.len() == 1 {
                runnable.extend(names);
                continue;
            }
            warn!(title = %title, drafts = ?names, "drafts share a title");
            for name in &names {
                let err = Error::DuplicateTitle {
                    title: title.clone(),
                    drafts: names.clone(),
                };
                rejected.push((name.clone(), err));
            }
        }
        runnable.sort();
        (runnable, rejected)
    }

    /// Reads the front matter of every published source, most recently
    /// revised first. Bodies are not rendered.
    pub fn published_entries(&self) -> Result<Vec<HtmlEntry>> {
        let mut entries = Vec::new();
        for name in self.list_published()? {
            let path = self.published_directory.join(&name);
            let (front_matter, _) = frontmatter::parse_file(&path)?;
            let entry = HtmlEntry::new(&front_matter).map_err(|e| {
                Error::Annotated(format!("reading `{}`", path.display()), Box::new(e.into()))
            })?;
            entries.push(entry);
        }
        sort_by_revision(&mut entries);
        Ok(entries)
    }

    /// Rewrites the index page from the published sources.
    pub fn generate_index(&self) -> Result<PathBuf> {
        let links = self
            .published_entries()?
            .iter()
            .map(|entry| PageLink::new(entry, &self.site.blog_url))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let index = self.templates.render_index(&self.site, &links)?;
        fs::create_dir_all(&self.output_directory)?;
        let path = self.output_directory.join(INDEX_FILE);
        fs::write(&path, index).map_err(|e| io_context("writing", &path, e))?;
        info!(entries = links.len(), path = %path.display(), "wrote index");
        Ok(path)
    }

    /// Rewrites the RSS and Atom feeds from the published sources, stamping
    /// them with `now`. Returns the two paths, RSS first.
    pub fn generate_feeds(&self, now: DateTime<Utc>) -> Result<(PathBuf, PathBuf)> {
        let entries = self.published_entries()?;
        let model = FeedModel::new(&self.site, &entries, now)?;
        fs::create_dir_all(&self.output_directory)?;

        let rss = self.output_directory.join(RSS_FILE);
        let mut w = BufWriter::new(File::create(&rss).map_err(|e| io_context("creating", &rss, e))?);
        model.write_rss(&mut w)?;
        w.flush()?;

        let atom = self.output_directory.join(ATOM_FILE);
        let mut w = BufWriter::new(File::create(&atom).map_err(|e| io_context("creating", &atom, e))?);
        model.write_atom(&mut w)?;
        w.flush()?;

        info!(entries = entries.len(), "wrote feeds");
        Ok((rss, atom))
    }

    /// Scaffolds a new draft for `title`. The file name is the slugified title
    /// and existing files are never overwritten.
    pub fn draft(&self, title: &str) -> Result<PathBuf> {
        let slug = slug::slugify(title);
        if slug.is_empty() {
            return Err(Error::InvalidName(title.to_owned()));
        }
        let contents = self.templates.render_draft(&MdEntry::new(&slug))?;

        fs::create_dir_all(&self.drafts_directory)?;
        let path = self.drafts_directory.join(format!("{}{}", slug, MARKDOWN_EXTENSION));
        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::AlreadyExists(path))
            }
            Err(e) => return Err(io_context("creating", &path, e)),
        };
        file.write_all(contents.as_bytes())?;
        info!(draft = %path.display(), "created draft");
        Ok(path)
    }

    /// The file names of all drafts, sorted.
    pub fn list_drafts(&self) -> Result<Vec<String>> {
        list_sources(&self.drafts_directory)
    }

    /// The file names of all published sources, sorted.
    pub fn list_published(&self) -> Result<Vec<String>> {
        list_sources(&self.published_directory)
    }
}

// Lists the `.md` files directly inside `dir`, sorted by name. A missing
// directory has no sources.
fn list_sources(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for result in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
    {
        let entry = result?;
        let file_name = entry.file_name().to_string_lossy();
        if entry.file_type().is_file() && file_name.ends_with(MARKDOWN_EXTENSION) {
            names.push(file_name.into_owned());
        }
    }
    Ok(names)
}

// Appends `.md` if needed and refuses anything that isn't a bare file name.
fn source_file_name(name: &str) -> Result<String> {
    let name = name.trim();
    let stem = name.strip_suffix(MARKDOWN_EXTENSION).unwrap_or(name);
    if stem.is_empty() || stem.starts_with('.') || name.contains('/') || name.contains('\\') {
        return Err(Error::InvalidName(name.to_owned()));
    }
    Ok(format!("{}{}", stem, MARKDOWN_EXTENSION))
}

fn io_context(action: &str, path: &Path, err: std::io::Error) -> Error {
    Error::Annotated(
        format!("{} `{}`", action, path.display()),
        Box::new(Error::Io(err)),
    )
}

/// The result of a publishing operation.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for publishing. Wraps every step of the pipeline.
#[derive(Debug)]
pub enum Error {
    /// Returned when a source's front matter block is malformed.
    FrontMatter(FrontMatterError),

    /// Returned when front matter fails validation.
    Entry(EntryError),

    /// Returned when the body can't be rendered.
    Markdown(MarkdownError),

    /// Returned for template errors.
    Template(TemplateError),

    /// Returned for errors building or writing feeds.
    Feed(FeedError),

    /// Returned for errors listing source directories.
    WalkDir(walkdir::Error),

    /// Returned when an entry URL can't be built.
    UrlParse(url::ParseError),

    /// Returned for other I/O errors.
    Io(std::io::Error),

    /// Returned when an entry name isn't a plain file name.
    InvalidName(String),

    /// Returned when a new draft would overwrite an existing file.
    AlreadyExists(PathBuf),

    /// Returned by [`Publisher::publish_all`] for drafts that would all
    /// produce the same page.
    DuplicateTitle { title: String, drafts: Vec<String> },

    /// An error with an annotation.
    Annotated(String, Box<Error>),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::FrontMatter(err) => err.fmt(f),
            Error::Entry(err) => err.fmt(f),
            Error::Markdown(err) => err.fmt(f),
            Error::Template(err) => err.fmt(f),
            Error::Feed(err) => err.fmt(f),
            Error::WalkDir(err) => err.fmt(f),
            Error::UrlParse(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
            Error::InvalidName(name) => write!(f, "invalid entry name {:?}", name),
            Error::AlreadyExists(path) => write!(f, "`{}` already exists", path.display()),
            Error::DuplicateTitle { title, drafts } => write!(
                f,
                "title {:?} is shared by drafts {}",
                title,
                drafts.join(", ")
            ),
            Error::Annotated(annotation, err) => write!(f, "{}: {}", annotation, err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::FrontMatter(err) => Some(err),
            Error::Entry(err) => Some(err),
            Error::Markdown(err) => Some(err),
            Error::Template(err) => Some(err),
            Error::Feed(err) => Some(err),
            Error::WalkDir(err) => Some(err),
            Error::UrlParse(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::InvalidName(_) => None,
            Error::AlreadyExists(_) => None,
            Error::DuplicateTitle { .. } => None,
            Error::Annotated(_, err) => Some(err),
        }
    }
}

impl From<FrontMatterError> for Error {
    fn from(err: FrontMatterError) -> Error {
        Error::FrontMatter(err)
    }
}

impl From<EntryError> for Error {
    fn from(err: EntryError) -> Error {
        Error::Entry(err)
    }
}

impl From<MarkdownError> for Error {
    fn from(err: MarkdownError) -> Error {
        Error::Markdown(err)
    }
}

impl From<TemplateError> for Error {
    fn from(err: TemplateError) -> Error {
        Error::Template(err)
    }
}

impl From<FeedError> for Error {
    fn from(err: FeedError) -> Error {
        Error::Feed(err)
    }
}

impl From<walkdir::Error> for Error {
    /// Converts a [`walkdir::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator while listing sources.
    fn from(err: walkdir::Error) -> Error {
        Error::WalkDir(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}

impl From<std::io::Error> for Error {
    /// Converts a [`std::io::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator for fallible I/O functions.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}
