//! Defines [`PageLink`], the summary of an entry shown on the index page.

use crate::entry::{format_date, HtmlEntry};
use chrono::NaiveDate;
use url::Url;

/// A link to one published entry. Always derived from the published set and
/// never stored on its own.
#[derive(Clone, Debug, PartialEq)]
pub struct PageLink {
    /// Site-absolute path of the entry page, e.g. `/blog/hello-world.html`.
    pub link: String,

    /// The canonical URL of the entry page.
    pub url: Url,

    pub title: String,

    /// The date the index is sorted by.
    pub revision: NaiveDate,

    /// `revision` formatted for display.
    pub date: String,

    /// The publish date formatted for display.
    pub published: String,

    pub excerpt: String,
    pub tags: Vec<String>,
}

impl PageLink {
    /// Builds the link for `entry`, whose page lives under `blog_url`.
    pub fn new(entry: &HtmlEntry, blog_url: &Url) -> Result<PageLink, url::ParseError> {
        let url = blog_url.join(&entry.html_file_name())?;
        Ok(PageLink {
            link: url.path().to_owned(),
            url,
            title: entry.title.clone(),
            revision: entry.revision,
            date: format_date(entry.revision),
            published: entry.published_display(),
            excerpt: entry.excerpt.clone(),
            tags: entry.tags.clone(),
        })
    }
}

/// Orders entries most recently revised first. The sort is stable, so entries
/// revised on the same day keep their enumeration order.
pub fn sort_by_revision(entries: &mut [HtmlEntry]) {
    entries.sort_by(|a, b| b.revision.cmp(&a.revision));
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frontmatter::FrontMatter;

    fn entry(title: &str, revision: &str) -> HtmlEntry {
        let fm: FrontMatter = vec![
            ("published", "2020-01-01"),
            ("revision", revision),
            ("title", title),
            ("excerpt", "an excerpt"),
            ("tags", "rust, web"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        HtmlEntry::new(&fm).unwrap()
    }

    #[test]
    fn test_page_link() -> Result<(), url::ParseError> {
        let blog_url = Url::parse("https://example.org/blog/")?;
        let link = PageLink::new(&entry("hello-world", "2021-04-16"), &blog_url)?;
        assert_eq!(link.link, "/blog/hello-world.html");
        assert_eq!(link.url.as_str(), "https://example.org/blog/hello-world.html");
        assert_eq!(link.title, "Hello World");
        assert_eq!(link.date, "April 16, 2021");
        assert_eq!(link.published, "January 1, 2020");
        assert_eq!(link.tags, vec!["rust", "web"]);
        Ok(())
    }

    #[test]
    fn test_sort_by_revision_is_stable_and_descending() {
        let mut entries = vec![
            entry("b", "2021-01-01"),
            entry("a", "2022-06-01"),
            entry("c", "2021-01-01"),
            entry("d", "2023-03-03"),
        ];
        sort_by_revision(&mut entries);
        let order: Vec<&str> = entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(order, vec!["d", "a", "b", "c"]);
    }
}
