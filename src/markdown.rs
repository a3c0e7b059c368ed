//! The boundary between the publishing pipeline and Markdown conversion. The
//! pipeline only needs something implementing [`Renderer`]; [`CommonMark`] is
//! the default, backed by [`pulldown_cmark`].

use crate::url::Converter as LinkConverter;
use pulldown_cmark::{html, CowStr, Event, LinkType, Options, Parser, Tag};
use std::fmt;
use url::{ParseError as UrlParseError, Url};

/// Converts an entry's raw body into an HTML fragment.
pub trait Renderer: Send + Sync {
    /// Renders `markdown` and appends the HTML to `out`. `page` is the name of
    /// the output page (e.g. `hello-world.html`); relative links are resolved
    /// against it.
    fn render(&self, markdown: &str, page: &str, out: &mut String) -> Result<(), Error>;

    /// Convenience wrapper for raw body bytes as returned by
    /// [`crate::frontmatter::parse`].
    fn render_bytes(&self, body: &[u8], page: &str) -> Result<String, Error> {
        let markdown = std::str::from_utf8(body)?;
        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        self.render(markdown, page, &mut out)?;
        Ok(out)
    }
}

/// CommonMark plus the usual extensions (footnotes, tables, strikethrough,
/// task lists, smart punctuation). Links to other entry sources are rewritten
/// to their pages under `blog_url`.
pub struct CommonMark {
    blog_url: Url,
}

impl CommonMark {
    pub fn new(blog_url: Url) -> CommonMark {
        CommonMark { blog_url }
    }
}

impl Renderer for CommonMark {
    fn render(&self, markdown: &str, page: &str, out: &mut String) -> Result<(), Error> {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_TASKLISTS);

        let converter = EventConverter {
            link_converter: LinkConverter::new(&self.blog_url, page)?,
        };
        let events = Parser::new_ext(markdown, options)
            .map(|ev| converter.convert(ev))
            .collect::<Result<Vec<_>, _>>()?;
        html::push_html(out, events.into_iter());
        Ok(())
    }
}

struct EventConverter<'a> {
    link_converter: LinkConverter<'a>,
}

impl<'a> EventConverter<'a> {
    fn convert_tag<'b>(&self, tag: Tag<'b>) -> Result<Tag<'b>, UrlParseError> {
        Ok(match tag {
            Tag::Link(
                link @ (LinkType::Inline
                | LinkType::Reference
                | LinkType::ReferenceUnknown
                | LinkType::Shortcut
                | LinkType::Autolink
                | LinkType::Collapsed
                | LinkType::CollapsedUnknown),
                url,
                title,
            ) => Tag::Link(
                link,
                CowStr::Boxed(self.link_converter.convert(&url)?.into_boxed_str()),
                title,
            ),
            _ => tag,
        })
    }

    fn convert<'b>(&self, ev: Event<'b>) -> Result<Event<'b>, UrlParseError> {
        Ok(match ev {
            Event::Start(tag) => Event::Start(self.convert_tag(tag)?),
            _ => ev,
        })
    }
}

/// Represents an error converting markdown to HTML.
#[derive(Debug)]
pub enum Error {
    /// Returned when the body isn't valid UTF-8.
    Utf8(std::str::Utf8Error),

    /// Returned when there is a problem parsing URLs.
    UrlParse(UrlParseError),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Utf8(err) => write!(f, "entry body is not valid UTF-8: {}", err),
            Error::UrlParse(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Utf8(err) => Some(err),
            Error::UrlParse(err) => Some(err),
        }
    }
}

impl From<UrlParseError> for Error {
    /// Converts a [`url::ParseError`] into an [`Error`]. It allows us to use
    /// the `?` operator for URL parsing and joining functions.
    fn from(err: UrlParseError) -> Error {
        Error::UrlParse(err)
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Error {
        Error::Utf8(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn render(markdown: &str) -> Result<String, Error> {
        CommonMark::new(Url::parse("https://example.org/blog/")?)
            .render_bytes(markdown.as_bytes(), "hello.html")
    }

    #[test]
    fn test_render_basic() -> Result<(), Error> {
        assert_eq!(
            render("# Hello\n\nSome *text*.\n")?,
            "<h1>Hello</h1>\n<p>Some <em>text</em>.</p>\n"
        );
        Ok(())
    }

    #[test]
    fn test_render_rewrites_entry_links() -> Result<(), Error> {
        let html = render("See [the other one](other-entry.md) and [docs](https://docs.rs).\n")?;
        assert!(html.contains(r#"href="https://example.org/blog/other-entry.html""#));
        assert!(html.contains(r#"href="https://docs.rs/""#));
        Ok(())
    }

    #[test]
    fn test_render_extensions() -> Result<(), Error> {
        let html = render("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~\n")?;
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
        Ok(())
    }

    #[test]
    fn test_render_invalid_utf8() {
        let renderer = CommonMark::new(Url::parse("https://example.org/blog/").unwrap());
        assert!(matches!(
            renderer.render_bytes(&[0xff, 0xfe], "x.html"),
            Err(Error::Utf8(_))
        ));
    }
}
