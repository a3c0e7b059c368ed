//! Loads the project configuration. A `quill.yaml` file is searched for in the
//! given directory and its ancestors; when none exists the defaults below are
//! used relative to the given directory. A handful of environment variables
//! are layered on top (see [`Config::apply_env`]).
//!
//! ```yaml
//! site:
//!   title: germandv
//!   url: https://germandv.xyz/
//!   description: Programming things
//!   language: en-us
//! source_directory: entries
//! output_directory: pages
//! templates:
//!   page: [templates/layout.html, templates/footer.html]
//!   index: [templates/index.html, templates/footer.html]
//!   draft: [templates/entry.md]
//! server:
//!   port: 4000
//! ```

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// The name of the project file.
pub const PROJECT_FILE: &str = "quill.yaml";

#[derive(Deserialize)]
#[serde(default)]
struct Project {
    site: SiteProject,
    source_directory: PathBuf,
    output_directory: PathBuf,
    templates: TemplatesProject,
    threads: Option<usize>,
    server: ServerProject,
}

impl Default for Project {
    fn default() -> Self {
        Project {
            site: SiteProject::default(),
            source_directory: PathBuf::from("entries"),
            output_directory: PathBuf::from("pages"),
            templates: TemplatesProject::default(),
            threads: None,
            server: ServerProject::default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct SiteProject {
    title: String,
    url: Url,
    description: String,
    language: String,
}

impl Default for SiteProject {
    fn default() -> Self {
        SiteProject {
            title: String::from("quill"),
            url: Url::parse("http://localhost:4000/").expect("static URL parses"),
            description: String::new(),
            language: String::from("en-us"),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct TemplatesProject {
    page: Vec<PathBuf>,
    index: Vec<PathBuf>,
    draft: Vec<PathBuf>,
}

impl Default for TemplatesProject {
    fn default() -> Self {
        TemplatesProject {
            page: vec![PathBuf::from("templates/layout.html")],
            index: vec![PathBuf::from("templates/index.html")],
            draft: vec![PathBuf::from("templates/entry.md")],
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct ServerProject {
    port: u16,
    workers: usize,
}

impl Default for ServerProject {
    fn default() -> Self {
        ServerProject {
            port: 4000,
            workers: 4,
        }
    }
}

/// Site-wide metadata made available to templates and feeds.
#[derive(Clone, Debug)]
pub struct Site {
    pub title: String,

    /// The site's root URL. Always ends in a slash.
    pub url: Url,

    /// The URL prefix for entry pages (`{url}blog/`).
    pub blog_url: Url,

    pub description: String,
    pub language: String,
}

/// The template files making up each template. Files are concatenated in
/// order before parsing. An empty `draft` list selects the built-in skeleton.
#[derive(Clone, Debug)]
pub struct TemplateFiles {
    pub page: Vec<PathBuf>,
    pub index: Vec<PathBuf>,
    pub draft: Vec<PathBuf>,
}

/// Basic Auth credentials guarding the preview and analytics routes.
#[derive(Clone, Debug, PartialEq)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,

    /// The number of threads handling requests.
    pub workers: usize,

    /// Whether the draft preview routes are mounted (`ENV=development`).
    pub preview: bool,

    pub credentials: Option<Credentials>,
}

/// Everything the publisher and the server need to know. Built once at
/// startup and passed around explicitly.
#[derive(Clone, Debug)]
pub struct Config {
    /// Holds the `draft/` and `published/` source directories.
    pub source_directory: PathBuf,

    /// Receives the generated HTML pages and feeds.
    pub output_directory: PathBuf,

    pub templates: TemplateFiles,
    pub site: Site,

    /// The number of worker threads used when publishing every draft.
    pub threads: usize,

    pub server: ServerConfig,
}

impl Config {
    /// Searches `dir` and its ancestors for [`PROJECT_FILE`]. Falls back to
    /// [`Config::defaults`] rooted at `dir` if there is none.
    pub fn from_directory(dir: &Path) -> Result<Config> {
        for ancestor in dir.ancestors() {
            let path = ancestor.join(PROJECT_FILE);
            if path.is_file() {
                return Config::from_project_file(&path)
                    .with_context(|| format!("Loading configuration `{}`", path.display()));
            }
        }
        Config::defaults(dir)
    }

    /// Loads a project file. Relative paths inside it are resolved against the
    /// file's directory.
    pub fn from_project_file(path: &Path) -> Result<Config> {
        let project_root = path.parent().ok_or_else(|| {
            anyhow!(
                "Can't get parent directory for provided project file path '{:?}'",
                path
            )
        })?;
        let contents = std::fs::read_to_string(path)?;
        let project: Project = serde_yaml::from_str(&contents)?;
        Config::from_project(project, project_root)
    }

    /// The configuration used when no project file exists.
    pub fn defaults(root: &Path) -> Result<Config> {
        Config::from_project(Project::default(), root)
    }

    fn from_project(project: Project, root: &Path) -> Result<Config> {
        let resolve = |paths: Vec<PathBuf>| -> Vec<PathBuf> {
            paths.iter().map(|p| root.join(p)).collect()
        };

        let mut url = project.site.url;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        let blog_url = url.join("blog/")?;

        Ok(Config {
            source_directory: root.join(project.source_directory),
            output_directory: root.join(project.output_directory),
            templates: TemplateFiles {
                page: resolve(project.templates.page),
                index: resolve(project.templates.index),
                draft: resolve(project.templates.draft),
            },
            site: Site {
                title: project.site.title,
                url,
                blog_url,
                description: project.site.description,
                language: project.site.language,
            },
            threads: match project.threads {
                Some(threads) if threads > 0 => threads,
                _ => num_cpus::get(),
            },
            server: ServerConfig {
                port: project.server.port,
                workers: project.server.workers.max(1),
                preview: false,
                credentials: None,
            },
        })
    }

    /// Applies the process environment. See [`Config::apply_env_with`].
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Layers environment overrides looked up through `var`:
    ///
    /// * `PORT` replaces the listen port.
    /// * `ENV=development` mounts the draft preview routes.
    /// * `BASIC_AUTH_USER` and `BASIC_AUTH_PASS` set the credentials; both
    ///   must be non-empty.
    pub fn apply_env_with<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = var("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT {:?}", port))?;
        }
        self.server.preview = var("ENV").as_deref() == Some("development");
        self.server.credentials = match (var("BASIC_AUTH_USER"), var("BASIC_AUTH_PASS")) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some(Credentials { user, pass })
            }
            _ => None,
        };
        Ok(())
    }

    pub fn drafts_directory(&self) -> PathBuf {
        self.source_directory.join("draft")
    }

    pub fn published_directory(&self) -> PathBuf {
        self.source_directory.join("published")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() -> Result<()> {
        let config = Config::defaults(Path::new("/blog"))?;
        assert_eq!(config.source_directory, Path::new("/blog/entries"));
        assert_eq!(config.output_directory, Path::new("/blog/pages"));
        assert_eq!(config.drafts_directory(), Path::new("/blog/entries/draft"));
        assert_eq!(config.published_directory(), Path::new("/blog/entries/published"));
        assert_eq!(config.templates.page, vec![PathBuf::from("/blog/templates/layout.html")]);
        assert_eq!(config.server.port, 4000);
        assert!(!config.server.preview);
        assert!(config.threads > 0);
        Ok(())
    }

    #[test]
    fn test_from_directory_finds_project_in_ancestor() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join(PROJECT_FILE),
            "site:\n  title: germandv\n  url: https://germandv.xyz\n  description: Programming things\n\
             output_directory: public\nthreads: 2\nserver:\n  port: 8080\n",
        )?;
        let nested = dir.path().join("entries").join("draft");
        std::fs::create_dir_all(&nested)?;

        let config = Config::from_directory(&nested)?;
        assert_eq!(config.site.title, "germandv");
        assert_eq!(config.site.url.as_str(), "https://germandv.xyz/");
        assert_eq!(config.site.blog_url.as_str(), "https://germandv.xyz/blog/");
        assert_eq!(config.site.language, "en-us");
        assert_eq!(config.output_directory, dir.path().join("public"));
        assert_eq!(config.source_directory, dir.path().join("entries"));
        assert_eq!(config.threads, 2);
        assert_eq!(config.server.port, 8080);
        Ok(())
    }

    #[test]
    fn test_invalid_project_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join(PROJECT_FILE), "site: [oops\n")?;
        let err = Config::from_directory(dir.path()).unwrap_err();
        assert!(format!("{:#}", err).starts_with("Loading configuration"));
        Ok(())
    }

    #[test]
    fn test_apply_env() -> Result<()> {
        let vars: HashMap<&str, &str> = vec![
            ("PORT", "9000"),
            ("ENV", "development"),
            ("BASIC_AUTH_USER", "Jose"),
            ("BASIC_AUTH_PASS", "Paquito1q2w3e4r"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::defaults(Path::new("."))?;
        config.apply_env_with(|k| vars.get(k).map(|v| v.to_string()))?;
        assert_eq!(config.server.port, 9000);
        assert!(config.server.preview);
        assert_eq!(
            config.server.credentials,
            Some(Credentials {
                user: "Jose".to_owned(),
                pass: "Paquito1q2w3e4r".to_owned(),
            })
        );

        let mut config = Config::defaults(Path::new("."))?;
        config.apply_env_with(|k| match k {
            "ENV" => Some("production".to_owned()),
            "BASIC_AUTH_USER" => Some("Jose".to_owned()),
            _ => None,
        })?;
        assert!(!config.server.preview);
        assert_eq!(config.server.credentials, None);

        let mut config = Config::defaults(Path::new("."))?;
        assert!(config
            .apply_env_with(|k| if k == "PORT" { Some("nope".to_owned()) } else { None })
            .is_err());
        Ok(())
    }
}
