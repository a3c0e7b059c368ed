//! Defines [`HtmlEntry`], the validated and typed projection of an entry's
//! front matter, and [`MdEntry`], the skeleton used to scaffold new drafts.

use crate::frontmatter::FrontMatter;
use chrono::{Local, NaiveDate};
use std::fmt;

/// The format of `published` and `revision` in source files.
pub const INPUT_DATE_FORMAT: &str = "%Y-%m-%d";

/// The format used when dates are displayed on pages.
pub const OUTPUT_DATE_FORMAT: &str = "%B %-d, %Y";

/// A published (or previewed) entry. Only constructible from front matter that
/// carries every required key; the `body` is filled in once the markdown has
/// been rendered.
#[derive(Clone, Debug, PartialEq)]
pub struct HtmlEntry {
    /// The raw `title` value. It names the output file and builds URLs.
    pub filename: String,

    /// The display title derived from `filename` (`a-title` -> `A Title`).
    pub title: String,

    pub published: NaiveDate,
    pub revision: NaiveDate,
    pub excerpt: String,

    /// Tags in the order they first appear in the source.
    pub tags: Vec<String>,

    /// The rendered HTML body. Empty until rendering.
    pub body: String,
}

impl HtmlEntry {
    /// Validates `fm` and builds an entry. Keys are checked in the order
    /// `published`, `revision`, `title`, `excerpt` and the first problem
    /// found is returned.
    pub fn new(fm: &FrontMatter) -> Result<HtmlEntry> {
        let published = parse_date(fm.get("published").ok_or(Error::MissingPublished)?)?;
        let revision = parse_date(fm.get("revision").ok_or(Error::MissingRevision)?)?;
        let filename = fm.get("title").ok_or(Error::MissingTitle)?;
        let title = display_title(filename)?;
        let excerpt = fm.get("excerpt").ok_or(Error::MissingExcerpt)?;

        Ok(HtmlEntry {
            filename: filename.clone(),
            title,
            published,
            revision,
            excerpt: excerpt.clone(),
            tags: parse_tags(fm.get("tags").map(String::as_str).unwrap_or_default()),
            body: String::new(),
        })
    }

    /// The name of the HTML file this entry is written to.
    pub fn html_file_name(&self) -> String {
        format!("{}.html", self.filename)
    }

    pub fn published_display(&self) -> String {
        format_date(self.published)
    }

    pub fn revision_display(&self) -> String {
        format_date(self.revision)
    }
}

/// The front matter of a freshly scaffolded draft.
#[derive(Clone, Debug, PartialEq)]
pub struct MdEntry {
    pub title: String,
    pub published: String,
    pub revision: String,
    pub excerpt: String,
}

impl MdEntry {
    /// Creates a draft skeleton dated today.
    pub fn new(title: &str) -> MdEntry {
        MdEntry::dated(title, Local::now().date_naive())
    }

    /// Creates a draft skeleton with both dates set to `date`.
    pub fn dated(title: &str, date: NaiveDate) -> MdEntry {
        let date = date.format(INPUT_DATE_FORMAT).to_string();
        MdEntry {
            title: title.to_owned(),
            published: date.clone(),
            revision: date,
            excerpt: String::new(),
        }
    }
}

/// Parses a strict, zero-padded `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let invalid = |reason: String| Error::InvalidDate {
        value: value.to_owned(),
        reason,
    };
    let date = NaiveDate::parse_from_str(value, INPUT_DATE_FORMAT)
        .map_err(|e| invalid(e.to_string()))?;
    // chrono accepts unpadded fields such as `1987-8-6`
    if date.format(INPUT_DATE_FORMAT).to_string() != value {
        return Err(invalid("fields must be zero-padded".to_owned()));
    }
    Ok(date)
}

/// Formats a date for display, e.g. `August 6, 1987`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(OUTPUT_DATE_FORMAT).to_string()
}

/// Converts a dashed file name into a display title by upper-casing the first
/// character of each `-`-separated segment. Empty segments are rejected.
pub fn display_title(filename: &str) -> Result<String> {
    let mut words = Vec::new();
    for segment in filename.split('-') {
        let mut chars = segment.chars();
        match chars.next() {
            Some(first) => words.push(first.to_uppercase().chain(chars).collect::<String>()),
            None => return Err(Error::InvalidTitle(filename.to_owned())),
        }
    }
    Ok(words.join(" "))
}

/// Splits a comma-separated `tags` value. Blank items are dropped and
/// duplicates collapse onto their first occurrence.
pub fn parse_tags(value: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in value.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_owned());
        }
    }
    tags
}

/// Represents the result of validating front matter.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a reason front matter could not become an [`HtmlEntry`].
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    MissingPublished,
    MissingRevision,
    MissingTitle,
    MissingExcerpt,

    /// Returned when a date isn't a valid `YYYY-MM-DD` value.
    InvalidDate { value: String, reason: String },

    /// Returned when the title has an empty `-`-separated segment.
    InvalidTitle(String),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MissingPublished => write!(f, "missing publish date in front matter"),
            Error::MissingRevision => write!(f, "missing revision date in front matter"),
            Error::MissingTitle => write!(f, "missing title in front matter"),
            Error::MissingExcerpt => write!(f, "missing excerpt in front matter"),
            Error::InvalidDate { value, reason } => {
                write!(f, "parsing date {:?} as \"YYYY-MM-DD\": {}", value, reason)
            }
            Error::InvalidTitle(title) => {
                write!(f, "invalid title {:?}: empty segment", title)
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod test {
    use super::*;

    fn front_matter(pairs: &[(&str, &str)]) -> FrontMatter {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_new_md_entry() {
        let e = MdEntry::dated("my-test-entry", date(2021, 3, 9));
        assert_eq!(e.title, "my-test-entry");
        assert_eq!(e.published, "2021-03-09");
        assert_eq!(e.revision, "2021-03-09");
        assert_eq!(e.excerpt, "");

        let today = Local::now().date_naive().format(INPUT_DATE_FORMAT).to_string();
        let e = MdEntry::new("x");
        assert_eq!(e.published, today);
        assert_eq!(e.revision, today);
    }

    #[test]
    fn test_new_html_entry() {
        let entry = HtmlEntry::new(&front_matter(&[
            ("published", "1987-08-06"),
            ("revision", "1987-08-06"),
            ("title", "a-title-foo-bar"),
            ("excerpt", "blah blah blah"),
        ]))
        .unwrap();

        assert_eq!(entry.filename, "a-title-foo-bar");
        assert_eq!(entry.title, "A Title Foo Bar");
        assert_eq!(entry.published_display(), "August 6, 1987");
        assert_eq!(entry.revision_display(), "August 6, 1987");
        assert_eq!(entry.excerpt, "blah blah blah");
        assert!(entry.tags.is_empty());
        assert!(entry.body.is_empty());
        assert_eq!(entry.html_file_name(), "a-title-foo-bar.html");
    }

    #[test]
    fn test_new_html_entry_errors() {
        let cases: &[(&[(&str, &str)], &str)] = &[
            (
                &[("revision", ""), ("title", ""), ("excerpt", "")],
                "missing publish date in front matter",
            ),
            (
                &[("published", "bad-date"), ("revision", ""), ("title", ""), ("excerpt", "")],
                "parsing date \"bad-date\" as \"YYYY-MM-DD\": input contains invalid characters",
            ),
            (
                &[("published", "1987-08-06"), ("title", ""), ("excerpt", "")],
                "missing revision date in front matter",
            ),
            (
                &[("published", "1987-08-06"), ("revision", "1987-08-06"), ("excerpt", "")],
                "missing title in front matter",
            ),
            (
                &[("published", "1987-08-06"), ("revision", "1987-08-06"), ("title", "a-title")],
                "missing excerpt in front matter",
            ),
            (
                &[
                    ("published", "1987-bad-06"),
                    ("revision", "1987-08-06"),
                    ("title", "a-title"),
                    ("excerpt", "blah blah blah"),
                ],
                "parsing date \"1987-bad-06\" as \"YYYY-MM-DD\": input contains invalid characters",
            ),
        ];

        for (i, (input, wanted)) in cases.iter().enumerate() {
            match HtmlEntry::new(&front_matter(input)) {
                Ok(entry) => panic!("case #{}: wanted error, got {:?}", i, entry),
                Err(err) => assert_eq!(err.to_string(), *wanted, "case #{}", i),
            }
        }
    }

    #[test]
    fn test_bad_published_reported_before_missing_keys() {
        let err = HtmlEntry::new(&front_matter(&[("published", "06-08-1987")])).unwrap_err();
        assert!(matches!(err, Error::InvalidDate { .. }));
    }

    #[test]
    fn test_bad_revision() {
        let err = HtmlEntry::new(&front_matter(&[
            ("published", "1987-08-06"),
            ("revision", "1987-13-06"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidDate {
                value: "1987-13-06".to_owned(),
                reason: "input is out of range".to_owned(),
            }
        );
    }

    #[test]
    fn test_unpadded_date_rejected() {
        assert!(parse_date("1987-8-6").is_err());
        assert_eq!(parse_date("1987-08-06"), Ok(date(1987, 8, 6)));
    }

    #[test]
    fn test_dates_are_independent() {
        let entry = HtmlEntry::new(&front_matter(&[
            ("published", "2020-01-02"),
            ("revision", "2021-12-31"),
            ("title", "x"),
            ("excerpt", ""),
        ]))
        .unwrap();
        assert_eq!(entry.published, date(2020, 1, 2));
        assert_eq!(entry.revision, date(2021, 12, 31));
        assert_eq!(entry.revision_display(), "December 31, 2021");
    }

    #[test]
    fn test_display_title() {
        assert_eq!(display_title("hello").unwrap(), "Hello");
        assert_eq!(display_title("über-rust-2").unwrap(), "Über Rust 2");
        for bad in &["", "-foo", "foo--bar", "foo-"] {
            assert_eq!(
                display_title(bad),
                Err(Error::InvalidTitle(bad.to_string())),
                "title {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_parse_tags() {
        assert!(parse_tags("").is_empty());
        assert!(parse_tags(" , ").is_empty());
        assert_eq!(parse_tags("rust"), vec!["rust"]);
        assert_eq!(parse_tags("rust, go ,rust,web"), vec!["rust", "go", "web"]);
    }
}
