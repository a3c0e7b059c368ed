//! Serves the generated site over HTTP. Requests are accepted by a
//! [`tiny_http`] listener shared between a fixed number of worker threads.
//! Routing works on the transport-independent [`Incoming`] and [`Reply`]
//! types so handlers can be exercised without a socket.
//!
//! | Route              | Response                                            |
//! |--------------------|-----------------------------------------------------|
//! | `/health_check`    | `200`, empty                                        |
//! | `/`                | the index page                                      |
//! | `/blog/<path>`     | a file from the output directory, gzipped on demand |
//! | `/feed`            | the RSS feed                                        |
//! | `/feed.atom`       | the Atom feed                                       |
//! | `/analytics`       | placeholder behind Basic Auth                       |
//! | `/preview/[draft]` | draft list or rendered draft, development only      |
//!
//! There are no read, write, or idle timeouts and no per-handler timeout:
//! `tiny_http` exposes none of them. A slow client occupies one worker until
//! it finishes or disconnects, so `workers` bounds how many can stall the
//! server at once.

pub mod auth;
pub mod middleware;

use crate::config::{Config, ServerConfig};
use crate::publish::{Publisher, ATOM_FILE, INDEX_FILE, RSS_FILE};
use anyhow::{anyhow, Result};
use pulldown_cmark::escape::escape_html;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tiny_http::{Header, Request, Response, StatusCode};
use tracing::{debug, error, info, warn};
use url::Url;

const BLOG_PREFIX: &str = "/blog/";
const PREVIEW_PREFIX: &str = "/preview/";

/// An HTTP request, reduced to what the handlers look at.
#[derive(Clone, Debug)]
pub struct Incoming {
    pub method: String,

    /// The request target as sent, including any query string.
    pub url: String,

    pub protocol: String,
    pub headers: Vec<(String, String)>,
}

impl Incoming {
    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The normalized request path: dot segments resolved, query dropped.
    /// Empty if the target isn't an absolute path.
    pub fn path(&self) -> String {
        if !self.url.starts_with('/') {
            return String::new();
        }
        match Url::parse(&format!("http://localhost{}", self.url)) {
            Ok(url) => url.path().to_owned(),
            Err(_) => String::new(),
        }
    }
}

/// An HTTP response waiting to be written.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn new(status: u16, content_type: &str, body: Vec<u8>) -> Reply {
        Reply {
            status,
            headers: vec![("Content-Type".to_owned(), content_type.to_owned())],
            body,
        }
    }

    pub fn text(status: u16, body: &str) -> Reply {
        Reply::new(status, "text/plain; charset=utf-8", body.as_bytes().to_vec())
    }

    pub fn html(body: String) -> Reply {
        Reply::new(200, "text/html; charset=utf-8", body.into_bytes())
    }

    pub fn not_found() -> Reply {
        Reply::text(404, "404 page not found\n")
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Reply {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The site server. Owns a [`Publisher`] for rendering draft previews.
pub struct Server {
    config: ServerConfig,
    output_directory: PathBuf,
    publisher: Publisher,
}

impl Server {
    pub fn new(config: &Config, publisher: Publisher) -> Server {
        Server {
            config: config.server.clone(),
            output_directory: config.output_directory.clone(),
            publisher,
        }
    }

    /// Binds `0.0.0.0:<port>` and serves requests until the listener fails.
    pub fn listen(&self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener =
            tiny_http::Server::http(addr).map_err(|e| anyhow!("Binding {}: {}", addr, e))?;
        info!(
            %addr,
            workers = self.config.workers,
            preview = self.config.preview,
            "server up"
        );
        if self.config.preview && self.config.credentials.is_none() {
            warn!("preview is enabled but no credentials are set; it will deny every request");
        }

        std::thread::scope(|scope| {
            for _ in 0..self.config.workers.max(1) {
                let listener = &listener;
                scope.spawn(move || loop {
                    match listener.recv() {
                        Ok(request) => self.respond(request),
                        Err(err) => {
                            error!(error = %err, "accepting request");
                            break;
                        }
                    }
                });
            }
        });
        Ok(())
    }

    fn respond(&self, mut request: Request) {
        let incoming = Incoming {
            method: request.method().to_string(),
            url: request.url().to_owned(),
            protocol: {
                let version = request.http_version();
                format!("HTTP/{}.{}", version.0, version.1)
            },
            headers: request
                .headers()
                .iter()
                .map(|h| (h.field.to_string(), h.value.to_string()))
                .collect(),
        };
        // bodies are never read; drain so keep-alive connections stay usable
        let _ = std::io::copy(request.as_reader(), &mut std::io::sink());

        let reply = self.handle(&incoming);
        let mut response = Response::from_data(reply.body).with_status_code(StatusCode(reply.status));
        for (name, value) in &reply.headers {
            match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                Ok(header) => response.add_header(header),
                Err(()) => error!(header = %name, "invalid response header"),
            }
        }
        if let Err(err) = request.respond(response) {
            error!(url = %incoming.url, error = %err, "writing response");
        }
    }

    /// Runs `request` through the middleware chain and the router.
    pub fn handle(&self, request: &Incoming) -> Reply {
        middleware::log_request(request);
        let reply = middleware::recover(request, || self.route(request));
        debug!(url = %request.url, status = reply.status, "replied");
        reply
    }

    fn route(&self, request: &Incoming) -> Reply {
        if request.method != "GET" {
            return Reply::text(405, "Method Not Allowed\n").with_header("Allow", "GET");
        }

        let path = request.path();
        let credentials = self.config.credentials.as_ref();
        match path.as_str() {
            "/health_check" => Reply::new(200, "text/plain; charset=utf-8", Vec::new()),
            "/" => self.serve_file(&self.output_directory.join(INDEX_FILE)),
            "/feed" => self.serve_file(&self.output_directory.join(RSS_FILE)),
            "/feed.atom" => self.serve_file(&self.output_directory.join(ATOM_FILE)),
            "/analytics" => middleware::basic_auth(request, credentials, || Reply::text(200, "WIP\n")),
            p if p.starts_with(BLOG_PREFIX) => {
                let reply = match static_path(&self.output_directory, &p[BLOG_PREFIX.len()..]) {
                    Some(file) => self.serve_file(&file),
                    None => Reply::not_found(),
                };
                middleware::gzip(request, reply)
            }
            p if self.config.preview && p.starts_with(PREVIEW_PREFIX) => {
                let name = &p[PREVIEW_PREFIX.len()..];
                middleware::basic_auth(request, credentials, || self.preview(name))
            }
            _ => Reply::not_found(),
        }
    }

    fn serve_file(&self, path: &Path) -> Reply {
        if !path.is_file() {
            return Reply::not_found();
        }
        match fs::read(path) {
            Ok(content) => Reply::new(200, content_type(path), content),
            Err(err) => {
                error!(path = %path.display(), error = %err, "reading file");
                Reply::text(500, &format!("{}\n", err))
            }
        }
    }

    fn preview(&self, name: &str) -> Reply {
        if name.is_empty() {
            return match self.publisher.list_drafts() {
                Ok(drafts) => Reply::html(draft_list(&drafts)),
                Err(err) => Reply::text(500, &format!("{}\n", err)),
            };
        }
        match self.publisher.preview(name) {
            Ok((page, _)) => Reply::html(page),
            Err(err) => {
                error!(draft = %name, error = %err, "preview failed");
                Reply::text(500, &format!("{}\n", err))
            }
        }
    }
}

fn draft_list(drafts: &[String]) -> String {
    let mut html = String::from("<ul>");
    for draft in drafts {
        let mut escaped = String::new();
        // writing into a String can't fail
        let _ = escape_html(&mut escaped, draft);
        html.push_str(&format!("<li><a href=\"{0}\">{0}</a></li>", escaped));
    }
    html.push_str("</ul>");
    html
}

// Maps a path below `/blog/` to a file under `root`. Hidden files and
// anything that could leave `root` are refused.
fn static_path(root: &Path, rest: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in rest.split('/') {
        if segment.is_empty() || segment.starts_with('.') || segment.contains('\\') {
            return None;
        }
        path.push(segment);
    }
    Some(path)
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("rss") => "application/rss+xml; charset=utf-8",
        Some("atom") => "application/atom+xml; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Credentials;
    use crate::markdown::CommonMark;
    use crate::template::{Templates, DEFAULT_DRAFT_TEMPLATE};
    use tempfile::TempDir;

    // "Jose:Paquito1q2w3e4r"
    const AUTHORIZATION: &str = "Basic Sm9zZTpQYXF1aXRvMXEydzNlNHI=";

    fn server(preview: bool) -> (TempDir, Server) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::defaults(dir.path()).unwrap();
        config.server.preview = preview;
        config.server.credentials = Some(Credentials {
            user: "Jose".to_owned(),
            pass: "Paquito1q2w3e4r".to_owned(),
        });
        let templates = Templates::from_sources(
            "<h1>{{.entry.title}}</h1>{{.entry.body}}".to_owned(),
            "-".to_owned(),
            DEFAULT_DRAFT_TEMPLATE.to_owned(),
        )
        .unwrap();
        let renderer = Box::new(CommonMark::new(config.site.blog_url.clone()));
        let publisher = Publisher::new(&config, templates, renderer);

        fs::create_dir_all(&config.output_directory).unwrap();
        fs::create_dir_all(config.drafts_directory()).unwrap();
        fs::write(config.output_directory.join(INDEX_FILE), "<p>index</p>").unwrap();
        fs::write(config.output_directory.join("hello.html"), "<p>hello</p>").unwrap();
        fs::write(config.output_directory.join(".hello.html.tmp"), "partial").unwrap();
        fs::write(config.output_directory.join(RSS_FILE), "<rss/>").unwrap();
        fs::write(
            config.drafts_directory().join("wip.md"),
            "---\ntitle: work-in-progress\npublished: 2021-01-01\nrevision: 2021-01-01\nexcerpt: x\n---\nSoon.\n",
        )
        .unwrap();
        fs::write(dir.path().join("secret.txt"), "secret").unwrap();
        (dir, Server::new(&config, publisher))
    }

    fn get(url: &str, headers: &[(&str, &str)]) -> Incoming {
        Incoming {
            method: "GET".to_owned(),
            url: url.to_owned(),
            protocol: "HTTP/1.1".to_owned(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_incoming_path() {
        assert_eq!(get("/blog/a.html?x=1", &[]).path(), "/blog/a.html");
        assert_eq!(get("/blog/../secret.txt", &[]).path(), "/secret.txt");
        assert_eq!(get("/blog/%2e%2e/secret.txt", &[]).path(), "/secret.txt");
        assert_eq!(get("*", &[]).path(), "");
    }

    #[test]
    fn test_health_check_and_index() {
        let (_dir, server) = server(false);
        let reply = server.handle(&get("/health_check", &[]));
        assert_eq!(reply.status, 200);
        assert!(reply.body.is_empty());

        let reply = server.handle(&get("/", &[]));
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, b"<p>index</p>");
        assert_eq!(reply.header("content-type"), Some("text/html; charset=utf-8"));
    }

    #[test]
    fn test_static_files() {
        let (_dir, server) = server(false);
        let reply = server.handle(&get("/blog/hello.html", &[]));
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, b"<p>hello</p>");

        let reply = server.handle(&get("/blog/hello.html", &[("Accept-Encoding", "gzip")]));
        assert_eq!(reply.status, 200);
        assert_eq!(reply.header("Content-Encoding"), Some("gzip"));

        for url in &[
            "/blog/missing.html",
            "/blog/.hello.html.tmp",
            "/blog/",
            "/blog/../secret.txt",
            "/blog/%2e%2e/secret.txt",
            "/blog/..%2fsecret.txt",
        ] {
            assert_eq!(server.handle(&get(url, &[])).status, 404, "url {}", url);
        }
    }

    #[test]
    fn test_feeds() {
        let (_dir, server) = server(false);
        let reply = server.handle(&get("/feed", &[]));
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, b"<rss/>");
        assert_eq!(reply.header("Content-Type"), Some("application/rss+xml; charset=utf-8"));
        assert_eq!(server.handle(&get("/feed.atom", &[])).status, 404);
    }

    #[test]
    fn test_analytics_requires_auth() {
        let (_dir, server) = server(false);
        assert_eq!(server.handle(&get("/analytics", &[])).status, 401);
        let reply = server.handle(&get("/analytics", &[("Authorization", AUTHORIZATION)]));
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, b"WIP\n");
    }

    #[test]
    fn test_preview_only_in_development() {
        let (_dir, server) = server(false);
        let reply = server.handle(&get("/preview/", &[("Authorization", AUTHORIZATION)]));
        assert_eq!(reply.status, 404);
    }

    #[test]
    fn test_preview() {
        let (_dir, server) = server(true);
        assert_eq!(server.handle(&get("/preview/", &[])).status, 401);

        let auth = [("Authorization", AUTHORIZATION)];
        let reply = server.handle(&get("/preview/", &auth));
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, b"<ul><li><a href=\"wip.md\">wip.md</a></li></ul>");

        let reply = server.handle(&get("/preview/wip.md", &auth));
        assert_eq!(reply.status, 200);
        assert_eq!(
            String::from_utf8(reply.body).unwrap(),
            "<h1>Work In Progress</h1><p>Soon.</p>\n"
        );

        let reply = server.handle(&get("/preview/missing", &auth));
        assert_eq!(reply.status, 500);
    }

    #[test]
    fn test_unknown_routes_and_methods() {
        let (_dir, server) = server(true);
        assert_eq!(server.handle(&get("/nope", &[])).status, 404);
        assert_eq!(server.handle(&get("/preview", &[])).status, 404);

        let mut post = get("/", &[]);
        post.method = "POST".to_owned();
        assert_eq!(server.handle(&post).status, 405);
    }
}
