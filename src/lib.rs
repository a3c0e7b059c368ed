//! The library code for the `quill` blog engine. Entries are Markdown files
//! that open with a small front matter block:
//!
//! ```text
//! ---
//! title: hello-world
//! published: 2021-04-16
//! revision: 2021-04-16
//! excerpt: Saying hi
//! tags: meta, rust
//! ---
//! The body, in Markdown.
//! ```
//!
//! A source moves from the draft directory to the published directory when it
//! is published, and that move happens together with rendering its page:
//!
//! 1. The front matter is parsed ([`crate::frontmatter`]) and validated into
//!    an entry ([`crate::entry`])
//! 2. The body is rendered to HTML ([`crate::markdown`])
//! 3. The page template is applied ([`crate::template`]) and the result is
//!    written to the output directory ([`crate::publish`])
//!
//! The index page and the feeds ([`crate::feed`]) are rebuilt wholesale from
//! the published sources. [`crate::server`] serves the output directory and
//! previews drafts.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod config;
pub mod entry;
pub mod feed;
pub mod frontmatter;
pub mod markdown;
pub mod page;
pub mod publish;
pub mod server;
pub mod template;
pub mod url;

/// Installs the global `tracing` subscriber. `RUST_LOG` directives are
/// honored; `verbose` raises the floor from warnings (0) to trace (3+).
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}
