//! Loads the page, index, and draft templates and feeds them their data. The
//! templates use Go's `text/template` syntax ([`gtmpl`]). Text values bound
//! for HTML templates are escaped here; the rendered entry body is not.
//!
//! Data made available to each template:
//!
//! * page: `.site` and `.entry` (`filename`, `title`, `published`,
//!   `revision`, `excerpt`, `tags`, `body`)
//! * index: `.site` and `.links`, each with `link`, `url`, `title`, `date`,
//!   `published`, `excerpt`, `tags`
//! * draft: `.title`, `.published`, `.revision`, `.excerpt`
//!
//! `.site` holds `title`, `url`, `blog_url`, `description`, and `language`.

use crate::config::{Site, TemplateFiles};
use crate::entry::{HtmlEntry, MdEntry};
use crate::page::PageLink;
use gtmpl::{Context, Template, Value};
use pulldown_cmark::escape::escape_html;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// The draft skeleton used when no draft template is configured.
pub const DEFAULT_DRAFT_TEMPLATE: &str = "---
title: {{.title}}
published: {{.published}}
revision: {{.revision}}
excerpt: {{.excerpt}}
tags:
---

";

/// The parsed-and-checked template sources. Each render parses a fresh
/// [`Template`] so this type can be shared freely between threads.
#[derive(Clone, Debug)]
pub struct Templates {
    page: String,
    index: String,
    draft: String,
}

impl Templates {
    /// Reads and checks the configured template files.
    pub fn load(files: &TemplateFiles) -> Result<Templates> {
        let draft = match files.draft.is_empty() {
            true => DEFAULT_DRAFT_TEMPLATE.to_owned(),
            false => read_template(files.draft.iter())?,
        };
        Templates::from_sources(
            read_template(files.page.iter())?,
            read_template(files.index.iter())?,
            draft,
        )
    }

    /// Builds templates from in-memory sources, failing on the first one that
    /// doesn't parse.
    pub fn from_sources(page: String, index: String, draft: String) -> Result<Templates> {
        for source in &[&page, &index, &draft] {
            parse(source)?;
        }
        Ok(Templates { page, index, draft })
    }

    /// Renders the page for `entry`, whose body must already be rendered.
    pub fn render_page(&self, site: &Site, entry: &HtmlEntry) -> Result<String> {
        let mut m = HashMap::new();
        m.insert("site".to_owned(), site_value(site));
        m.insert("entry".to_owned(), entry_value(entry));
        execute(&self.page, Value::Object(m))
    }

    /// Renders the index page listing `links` in the given order.
    pub fn render_index(&self, site: &Site, links: &[PageLink]) -> Result<String> {
        let mut m = HashMap::new();
        m.insert("site".to_owned(), site_value(site));
        m.insert(
            "links".to_owned(),
            Value::Array(links.iter().map(link_value).collect()),
        );
        execute(&self.index, Value::Object(m))
    }

    /// Renders the Markdown skeleton of a new draft. Values are not escaped.
    pub fn render_draft(&self, entry: &MdEntry) -> Result<String> {
        let mut m = HashMap::new();
        m.insert("title".to_owned(), Value::String(entry.title.clone()));
        m.insert("published".to_owned(), Value::String(entry.published.clone()));
        m.insert("revision".to_owned(), Value::String(entry.revision.clone()));
        m.insert("excerpt".to_owned(), Value::String(entry.excerpt.clone()));
        execute(&self.draft, Value::Object(m))
    }
}

// Loads the template file contents, concatenating them in order.
fn read_template<P: AsRef<Path>>(template_files: impl Iterator<Item = P>) -> Result<String> {
    let mut contents = String::new();
    for template_file in template_files {
        let template_file = template_file.as_ref();
        File::open(template_file)
            .and_then(|mut f| f.read_to_string(&mut contents))
            .map_err(|err| Error::OpenTemplateFile {
                path: template_file.to_owned(),
                err,
            })?;
    }
    Ok(contents)
}

fn parse(source: &str) -> Result<Template> {
    let mut template = Template::default();
    template.parse(source).map_err(Error::ParseTemplate)?;
    Ok(template)
}

fn execute(source: &str, value: Value) -> Result<String> {
    let template = parse(source)?;
    let context = Context::from(value).map_err(Error::Execute)?;
    let mut out: Vec<u8> = Vec::new();
    template.execute(&mut out, &context).map_err(Error::Execute)?;
    String::from_utf8(out).map_err(|e| Error::Execute(e.to_string()))
}

fn escaped(s: &str) -> Value {
    let mut out = String::with_capacity(s.len());
    // writing into a String can't fail
    let _ = escape_html(&mut out, s);
    Value::String(out)
}

fn tags_value(tags: &[String]) -> Value {
    Value::Array(tags.iter().map(|t| escaped(t)).collect())
}

fn site_value(site: &Site) -> Value {
    let mut m = HashMap::new();
    m.insert("title".to_owned(), escaped(&site.title));
    m.insert("url".to_owned(), Value::String(site.url.to_string()));
    m.insert("blog_url".to_owned(), Value::String(site.blog_url.to_string()));
    m.insert("description".to_owned(), escaped(&site.description));
    m.insert("language".to_owned(), escaped(&site.language));
    Value::Object(m)
}

fn entry_value(entry: &HtmlEntry) -> Value {
    let mut m = HashMap::new();
    m.insert("filename".to_owned(), escaped(&entry.filename));
    m.insert("title".to_owned(), escaped(&entry.title));
    m.insert("published".to_owned(), escaped(&entry.published_display()));
    m.insert("revision".to_owned(), escaped(&entry.revision_display()));
    m.insert("excerpt".to_owned(), escaped(&entry.excerpt));
    m.insert("tags".to_owned(), tags_value(&entry.tags));
    m.insert("body".to_owned(), Value::String(entry.body.clone()));
    Value::Object(m)
}

fn link_value(link: &PageLink) -> Value {
    let mut m = HashMap::new();
    m.insert("link".to_owned(), escaped(&link.link));
    m.insert("url".to_owned(), escaped(link.url.as_str()));
    m.insert("title".to_owned(), escaped(&link.title));
    m.insert("date".to_owned(), escaped(&link.date));
    m.insert("published".to_owned(), escaped(&link.published));
    m.insert("excerpt".to_owned(), escaped(&link.excerpt));
    m.insert("tags".to_owned(), tags_value(&link.tags));
    Value::Object(m)
}

/// The result of a fallible templating operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading or executing a template.
#[derive(Debug)]
pub enum Error {
    /// Returned for I/O problems while opening template files.
    OpenTemplateFile { path: PathBuf, err: std::io::Error },

    /// Returned for errors parsing template files.
    ParseTemplate(String),

    /// Returned for errors while executing a template.
    Execute(String),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::OpenTemplateFile { path, err } => {
                write!(f, "Opening template file '{}': {}", path.display(), err)
            }
            Error::ParseTemplate(err) => write!(f, "Parsing template: {}", err),
            Error::Execute(err) => write!(f, "Executing template: {}", err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::OpenTemplateFile { path: _, err } => Some(err),
            Error::ParseTemplate(_) => None,
            Error::Execute(_) => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::frontmatter::FrontMatter;
    use chrono::NaiveDate;

    fn site() -> Site {
        Config::defaults(Path::new("/blog")).unwrap().site
    }

    fn entry() -> HtmlEntry {
        let fm: FrontMatter = vec![
            ("published", "1987-08-06"),
            ("revision", "1990-02-03"),
            ("title", "fish-and-chips"),
            ("excerpt", "salt & vinegar"),
            ("tags", "food"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        let mut entry = HtmlEntry::new(&fm).unwrap();
        entry.body = "<p>Tasty</p>".to_owned();
        entry
    }

    fn templates(page: &str, index: &str) -> Templates {
        Templates::from_sources(
            page.to_owned(),
            index.to_owned(),
            DEFAULT_DRAFT_TEMPLATE.to_owned(),
        )
        .unwrap()
    }

    #[test]
    fn test_render_page() -> Result<()> {
        let t = templates(
            "<title>{{.entry.title}} | {{.site.title}}</title><p>{{.entry.excerpt}}</p>{{.entry.body}}<small>{{.entry.revision}}</small>",
            "-",
        );
        assert_eq!(
            t.render_page(&site(), &entry())?,
            "<title>Fish And Chips | quill</title><p>salt &amp; vinegar</p><p>Tasty</p><small>February 3, 1990</small>"
        );
        Ok(())
    }

    #[test]
    fn test_render_index() -> Result<()> {
        let t = templates("-", "{{range .links}}<a href=\"{{.link}}\">{{.title}}</a>{{range .tags}}#{{.}}{{end}};{{end}}");
        let blog_url = site().blog_url;
        let links = vec![PageLink::new(&entry(), &blog_url).unwrap()];
        assert_eq!(
            t.render_index(&site(), &links)?,
            "<a href=\"/blog/fish-and-chips.html\">Fish And Chips</a>#food;"
        );
        assert_eq!(t.render_index(&site(), &[])?, "");
        Ok(())
    }

    #[test]
    fn test_render_default_draft() -> Result<()> {
        let t = templates("-", "-");
        let draft = MdEntry::dated("my-entry", NaiveDate::from_ymd_opt(2021, 4, 16).unwrap());
        assert_eq!(
            t.render_draft(&draft)?,
            "---\ntitle: my-entry\npublished: 2021-04-16\nrevision: 2021-04-16\nexcerpt: \ntags:\n---\n\n"
        );
        Ok(())
    }

    #[test]
    fn test_unparseable_template() {
        let result = Templates::from_sources("{{.entry".to_owned(), "-".to_owned(), "-".to_owned());
        assert!(matches!(result, Err(Error::ParseTemplate(_))));
    }

    #[test]
    fn test_load_concatenates_files() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let layout = dir.path().join("layout.html");
        let footer = dir.path().join("footer.html");
        std::fs::write(&layout, "<h1>{{.entry.title}}</h1>")?;
        std::fs::write(&footer, "<footer>{{.site.title}}</footer>")?;

        let files = TemplateFiles {
            page: vec![layout.clone(), footer],
            index: vec![layout],
            draft: Vec::new(),
        };
        let t = Templates::load(&files)?;
        assert_eq!(
            t.render_page(&site(), &entry())?,
            "<h1>Fish And Chips</h1><footer>quill</footer>"
        );

        let missing = TemplateFiles {
            page: vec![dir.path().join("nope.html")],
            index: Vec::new(),
            draft: Vec::new(),
        };
        assert!(matches!(
            Templates::load(&missing),
            Err(Error::OpenTemplateFile { .. })
        ));
        Ok(())
    }
}
