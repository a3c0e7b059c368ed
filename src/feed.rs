//! Support for creating RSS and Atom feeds from the published entries. Both
//! serializations come from the same [`FeedModel`], which is rebuilt from
//! scratch on every run.

use crate::config::Site;
use crate::entry::HtmlEntry;
use atom_syndication::{Error as AtomError, Text};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use rss::{CategoryBuilder, ChannelBuilder, GuidBuilder, ItemBuilder};
use std::fmt;
use std::io::Write;
use url::Url;

/// The feed-level metadata and its items.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedModel {
    pub title: String,
    pub link: Url,
    pub description: String,
    pub last_build: DateTime<Utc>,
    pub language: String,
    pub items: Vec<FeedItem>,
}

/// One published entry as it appears in a feed.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedItem {
    pub title: String,

    /// The canonical URL of the entry page.
    pub link: Url,

    /// The entry's excerpt.
    pub description: String,

    /// The entry's publish date.
    pub created: NaiveDate,

    pub updated: NaiveDate,
    pub tags: Vec<String>,
}

impl FeedModel {
    /// Builds the feed for `entries`, keeping their order. `last_build` is
    /// usually [`Utc::now`].
    pub fn new(site: &Site, entries: &[HtmlEntry], last_build: DateTime<Utc>) -> Result<FeedModel> {
        let items = entries
            .iter()
            .map(|entry| {
                Ok(FeedItem {
                    title: entry.title.clone(),
                    link: site.blog_url.join(&entry.html_file_name())?,
                    description: entry.excerpt.clone(),
                    created: entry.published,
                    updated: entry.revision,
                    tags: entry.tags.clone(),
                })
            })
            .collect::<Result<Vec<FeedItem>>>()?;

        Ok(FeedModel {
            title: site.title.clone(),
            link: site.url.clone(),
            description: site.description.clone(),
            last_build,
            language: site.language.clone(),
            items,
        })
    }

    /// Writes the feed as RSS 2.0.
    pub fn write_rss<W: Write>(&self, w: W) -> Result<()> {
        let items = self
            .items
            .iter()
            .map(|item| {
                ItemBuilder::default()
                    .title(Some(item.title.clone()))
                    .link(Some(item.link.to_string()))
                    .guid(Some(
                        GuidBuilder::default()
                            .permalink(true)
                            .value(item.link.to_string())
                            .build(),
                    ))
                    .description(Some(item.description.clone()))
                    .pub_date(Some(midnight(item.created).to_rfc2822()))
                    .categories(
                        item.tags
                            .iter()
                            .map(|tag| CategoryBuilder::default().name(tag.clone()).build())
                            .collect::<Vec<_>>(),
                    )
                    .build()
            })
            .collect::<Vec<_>>();

        let channel = ChannelBuilder::default()
            .title(self.title.clone())
            .link(self.link.to_string())
            .description(self.description.clone())
            .language(Some(self.language.clone()))
            .last_build_date(Some(self.last_build.to_rfc2822()))
            .generator(Some(String::from("quill")))
            .items(items)
            .build();

        channel.write_to(w)?;
        Ok(())
    }

    /// Writes the feed as Atom.
    pub fn write_atom<W: Write>(&self, w: W) -> Result<()> {
        use atom_syndication::{Category, Entry, Feed, Link};

        let alternate = |href: &Url| Link {
            href: href.to_string(),
            rel: "alternate".to_owned(),
            ..Default::default()
        };

        let entries = self
            .items
            .iter()
            .map(|item| Entry {
                id: item.link.to_string(),
                title: Text::plain(item.title.clone()),
                updated: midnight(item.updated),
                published: Some(midnight(item.created)),
                summary: Some(Text::plain(item.description.clone())),
                links: vec![alternate(&item.link)],
                categories: item
                    .tags
                    .iter()
                    .map(|tag| Category {
                        term: tag.clone(),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            })
            .collect();

        let feed = Feed {
            id: self.link.to_string(),
            title: Text::plain(self.title.clone()),
            subtitle: Some(Text::plain(self.description.clone())),
            updated: self.last_build.into(),
            links: vec![alternate(&self.link)],
            entries,
            ..Default::default()
        };

        feed.write_to(w)?;
        Ok(())
    }
}

// Entries only carry a date; feeds want a timestamp, so use midnight UTC.
fn midnight(date: NaiveDate) -> DateTime<FixedOffset> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)).into()
}

/// The result of a fallible feed operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem creating a feed. Variants include I/O, RSS, Atom, and
/// URL issues.
#[derive(Debug)]
pub enum Error {
    /// Returned when there is a generic I/O error.
    Io(std::io::Error),

    /// Returned when there is an RSS-related error.
    Rss(rss::Error),

    /// Returned when there is an Atom-related error.
    Atom(AtomError),

    /// Returned when an entry URL can't be built.
    UrlParse(url::ParseError),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::Rss(err) => err.fmt(f),
            Error::Atom(err) => err.fmt(f),
            Error::UrlParse(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Rss(err) => Some(err),
            Error::Atom(err) => Some(err),
            Error::UrlParse(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    /// Converts [`std::io::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator in fallible feed operations.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<rss::Error> for Error {
    fn from(err: rss::Error) -> Error {
        Error::Rss(err)
    }
}

impl From<AtomError> for Error {
    /// Converts [`AtomError`]s into [`Error`]. This allows us to use the `?`
    /// operator in fallible feed operations.
    fn from(err: AtomError) -> Error {
        Error::Atom(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}
