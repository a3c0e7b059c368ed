//! Rewrites links found in entry bodies. Links to other entry sources (e.g.
//! `other-entry.md`) become links to their rendered pages under the blog URL
//! (e.g. `https://example.org/blog/other-entry.html`). Everything else is
//! only normalized.

use url::{ParseError, Url};

const MARKDOWN_EXTENSION: &str = ".md";
const HTML_EXTENSION: &str = ".html";

pub struct Converter<'a> {
    blog_root: &'a Url,
    base: Url,
}

impl<'a> Converter<'a> {
    /// Constructs a new `Converter`
    ///
    /// # Arguments
    ///
    /// * `blog_root` - the URL prefix for entry pages. This should end in a
    ///   trailing slash.
    /// * `base` - the path relative to `blog_root` of the page containing the
    ///   links; relative targets are resolved against it.
    pub fn new(blog_root: &'a Url, base: &str) -> Result<Converter<'a>> {
        Ok(Converter {
            blog_root,
            base: blog_root.join(base)?,
        })
    }

    fn convert_absolute(&self, absolute: Url) -> Url {
        if let Some(relative) = self.blog_root.make_relative(&absolute) {
            if !relative.starts_with("../") && relative.ends_with(MARKDOWN_EXTENSION) {
                let page = format!(
                    "{}{}",
                    relative.trim_end_matches(MARKDOWN_EXTENSION),
                    HTML_EXTENSION
                );
                if let Ok(url) = self.blog_root.join(&page) {
                    return url;
                }
            }
        }
        absolute
    }

    /// Converts a link target. Fragment-only targets are returned untouched so
    /// in-page anchors keep working.
    pub fn convert(&self, url: &str) -> Result<String> {
        if url.starts_with('#') {
            return Ok(url.to_owned());
        }
        let absolute = match Url::parse(url) {
            Ok(absolute) => absolute,
            Err(ParseError::RelativeUrlWithoutBase) => self.base.join(url)?,
            Err(e) => return Err(e),
        };
        Ok(self.convert_absolute(absolute).to_string())
    }
}

type Result<T> = std::result::Result<T, ParseError>;
