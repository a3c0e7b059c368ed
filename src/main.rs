use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use quill::config::Config;
use quill::markdown::CommonMark;
use quill::publish::Publisher;
use quill::server::Server;
use quill::template::Templates;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::info;

/// Writes, publishes, and serves a Markdown blog.
#[derive(Parser)]
#[command(name = "quill", version, about)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["serve", "publish", "draft", "feed", "index"]),
))]
struct Cli {
    /// Project directory; `quill.yaml` is looked up from here
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Serve the generated site
    #[arg(long)]
    serve: bool,

    /// Publish a draft by name, or every draft with `all`
    #[arg(long, value_name = "NAME")]
    publish: Option<String>,

    /// Create a new draft
    #[arg(long, value_name = "TITLE", allow_hyphen_values = true)]
    draft: Option<String>,

    /// Regenerate the RSS and Atom feeds
    #[arg(long)]
    feed: bool,

    /// Regenerate the index page
    #[arg(long)]
    index: bool,
}

// Long flags that may also be spelled with a single dash (`-serve`,
// `-publish=all`), and which of them take a value.
const SINGLE_DASH_FLAGS: &[(&str, bool)] = &[
    ("serve", false),
    ("publish", true),
    ("draft", true),
    ("feed", false),
    ("index", false),
    ("dir", true),
];

// Rewrites single-dash long flags to their `--` form so they aren't read as
// clusters of short flags. Flag values and anything after `--` are left alone.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut normalized = Vec::new();
    let mut value_expected = false;
    let mut passthrough = false;
    for arg in args {
        if passthrough || value_expected {
            value_expected = false;
            normalized.push(arg);
            continue;
        }
        let text = arg.to_string_lossy().into_owned();
        if text == "--" {
            passthrough = true;
            normalized.push(arg);
            continue;
        }

        let long = text
            .strip_prefix("--")
            .or_else(|| text.strip_prefix('-'))
            .and_then(|rest| {
                let name = rest.split('=').next().unwrap_or(rest);
                SINGLE_DASH_FLAGS
                    .iter()
                    .find(|(flag, _)| *flag == name)
                    .map(|(_, takes_value)| (rest, *takes_value))
            });
        match long {
            Some((rest, takes_value)) => {
                value_expected = takes_value && !rest.contains('=');
                normalized.push(OsString::from(format!("--{}", rest)));
            }
            None => {
                value_expected = text == "-d";
                normalized.push(arg);
            }
        }
    }
    normalized
}

fn main() {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    quill::init_tracing(cli.verbose);

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            std::process::exit(1);
        }
    }
}

// Returns whether every requested item succeeded.
fn run(cli: Cli) -> Result<bool> {
    let mut config = Config::from_directory(&cli.dir)?;
    config.apply_env()?;

    let templates = Templates::load(&config.templates).context("Loading templates")?;
    let renderer = Box::new(CommonMark::new(config.site.blog_url.clone()));
    let publisher = Publisher::new(&config, templates, renderer);

    if cli.serve {
        Server::new(&config, publisher).listen()?;
    } else if let Some(name) = cli.publish {
        if name == "all" {
            let report = publisher.publish_all()?;
            println!("{}", report);
            return Ok(report.is_success());
        }
        let page = publisher.publish(&name)?;
        publisher.generate_index()?;
        publisher.generate_feeds(chrono::Utc::now())?;
        println!("{}", page.display());
    } else if let Some(title) = cli.draft {
        let path = publisher.draft(&title)?;
        println!("{}", path.display());
    } else if cli.feed {
        let (rss, atom) = publisher.generate_feeds(chrono::Utc::now())?;
        info!(rss = %rss.display(), atom = %atom.display(), "feeds regenerated");
    } else if cli.index {
        let path = publisher.generate_index()?;
        info!(path = %path.display(), "index regenerated");
    }
    Ok(true)
}
