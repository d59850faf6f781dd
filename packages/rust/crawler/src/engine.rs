//! Concurrent, scope-aware web crawler engine.
//!
//! The crawler starts from a seed URL, performs BFS traversal within scope,
//! respects depth/concurrency/rate limits and robots.txt, and writes each
//! page body to the [`ContentStore`].

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

use doki_shared::{CrawlConfig, DokiError, Page, Result};
use doki_storage::ContentStore;

use crate::frontier::Frontier;
use crate::robots::{RobotsTxt, fetch_robots_txt};

// ---------------------------------------------------------------------------
// CrawlResult
// ---------------------------------------------------------------------------

/// Summary of a completed crawl operation.
#[derive(Debug, Clone)]
pub struct CrawlResult {
    /// Pages written to the content store, in save order.
    pub saved: Vec<SavedPage>,
    /// Number of URLs skipped (robots.txt, out of scope).
    pub pages_skipped: usize,
    /// Errors encountered (URL, error message).
    pub errors: Vec<(String, String)>,
    /// Total duration of the crawl.
    pub duration: Duration,
}

impl CrawlResult {
    pub fn pages_saved(&self) -> usize {
        self.saved.len()
    }
}

/// One page written during a crawl.
#[derive(Debug, Clone)]
pub struct SavedPage {
    pub url: String,
    /// Content store key.
    pub key: String,
    pub content_type: Option<String>,
    /// Whether outbound links were followed.
    pub followed_links: bool,
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// Concurrent web crawler with scope-aware page fetching.
pub struct Crawler {
    config: CrawlConfig,
    client: Client,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_localhost: bool,
}

impl Crawler {
    /// Create a new crawler with the given configuration.
    pub fn new(config: CrawlConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DokiError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            allow_localhost: false,
        })
    }

    /// Allow crawling localhost/private IPs (for integration tests).
    #[cfg(test)]
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    /// Crawl starting from `seed`, saving every fetched body into `store`.
    ///
    /// Per-page failures are logged and collected in the result; the crawl
    /// itself only fails if the seed is unusable.
    #[instrument(skip_all, fields(seed = %seed))]
    pub async fn crawl(&self, seed: &Url, store: &ContentStore) -> Result<CrawlResult> {
        let start_time = std::time::Instant::now();

        let scope = CrawlScope::new(seed, &self.config)?;
        if !self.allow_localhost && is_ssrf_target(seed) {
            return Err(DokiError::validation(format!(
                "refusing to crawl private or local address {seed}"
            )));
        }

        let mut hosts = HostPolicies::default();

        let mut frontier = Frontier::new(self.config.depth);
        frontier.push(seed.clone(), 0);

        let batch_size = self.config.concurrency.max(1) as usize;
        let mut saved: Vec<SavedPage> = Vec::new();
        let mut key_owners: HashMap<String, String> = HashMap::new();
        let mut errors: Vec<(String, String)> = Vec::new();
        let mut pages_skipped: usize = 0;

        info!(
            depth = self.config.depth,
            concurrency = self.config.concurrency,
            rate_limit_ms = self.config.rate_limit_ms,
            respect_robots_txt = self.config.respect_robots_txt,
            "starting crawl"
        );

        while !frontier.is_empty() {
            let mut handles = Vec::new();

            for (url, depth) in frontier.next_batch(batch_size) {
                let policy = hosts.get(self, &url).await;
                if !policy.robots.is_allowed(&self.config.user_agent, url.path()) {
                    debug!(%url, "disallowed by robots.txt, skipping");
                    pages_skipped += 1;
                    continue;
                }
                let start_at = policy.reserve_slot();

                let client = self.client.clone();
                let task_url = url.clone();
                handles.push((
                    url,
                    depth,
                    tokio::spawn(async move {
                        tokio::time::sleep_until(start_at).await;
                        fetch_page(&client, &task_url).await
                    }),
                ));
            }

            // Saves happen here, one at a time, so no two writes race on a key.
            for (url, depth, handle) in handles {
                let page = match handle.await {
                    Ok(Ok(page)) => page,
                    Ok(Err(e)) => {
                        warn!(%url, error = %e, "fetch failed, skipping page");
                        errors.push((url.to_string(), e.to_string()));
                        continue;
                    }
                    Err(e) => {
                        warn!(%url, error = %e, "fetch task failed");
                        errors.push((url.to_string(), e.to_string()));
                        continue;
                    }
                };

                let final_url = Url::parse(&page.url).unwrap_or_else(|_| url.clone());
                if final_url != url {
                    frontier.mark_visited(&final_url);
                }

                let is_html = page.is_html();
                let key = page_key(&final_url, is_html);
                if let Some(previous) = key_owners.get(&key) {
                    if previous != &page.url {
                        warn!(key = %key, previous = %previous, url = %page.url, "key collision, overwriting");
                    }
                }

                if let Err(e) = store.save(&key, &page.body) {
                    warn!(url = %page.url, error = %e, "failed to save page");
                    errors.push((page.url.clone(), e.to_string()));
                    continue;
                }
                key_owners.insert(key.clone(), page.url.clone());

                let follow = is_html && depth < self.config.depth;
                if follow {
                    let body = String::from_utf8_lossy(&page.body);
                    let doc = Html::parse_document(&body);
                    for link in extract_links(&doc, &final_url) {
                        if !scope.in_scope(&link) {
                            continue;
                        }
                        if !self.allow_localhost && is_ssrf_target(&link) {
                            warn!(url = %link, "SSRF protection: blocked");
                            pages_skipped += 1;
                            continue;
                        }
                        frontier.push(link, depth + 1);
                    }
                }

                debug!(
                    url = %page.url,
                    key = %key,
                    depth,
                    followed_links = follow,
                    pending = frontier.pending(),
                    "page saved"
                );
                saved.push(SavedPage {
                    url: page.url,
                    key,
                    content_type: page.content_type,
                    followed_links: follow,
                });
            }
        }

        let result = CrawlResult {
            saved,
            pages_skipped,
            errors,
            duration: start_time.elapsed(),
        };

        info!(
            pages_saved = result.pages_saved(),
            pages_skipped = result.pages_skipped,
            errors = result.errors.len(),
            urls_seen = frontier.seen(),
            duration_ms = result.duration.as_millis() as u64,
            "crawl completed"
        );

        Ok(result)
    }

    async fn load_robots(&self, url: &Url) -> RobotsTxt {
        if !self.config.respect_robots_txt {
            return RobotsTxt::default();
        }
        match fetch_robots_txt(&self.client, url).await {
            Ok(robots) => robots,
            Err(e) => {
                warn!(host = url.host_str().unwrap_or_default(), error = %e, "could not fetch robots.txt, allowing all");
                RobotsTxt::default()
            }
        }
    }

    async fn host_policy(&self, url: &Url) -> HostPolicy {
        let robots = self.load_robots(url).await;
        let delay = robots
            .crawl_delay(&self.config.user_agent)
            .unwrap_or(Duration::ZERO)
            .max(Duration::from_millis(self.config.rate_limit_ms));
        debug!(
            host = url.host_str().unwrap_or_default(),
            delay_ms = delay.as_millis() as u64,
            "loaded host policy"
        );
        HostPolicy {
            robots,
            delay,
            next_slot: Instant::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-host politeness
// ---------------------------------------------------------------------------

/// robots.txt rules and request pacing for one origin.
struct HostPolicy {
    robots: RobotsTxt,
    /// Minimum spacing between request starts.
    delay: Duration,
    next_slot: Instant,
}

impl HostPolicy {
    /// Claim the next start time for a request to this host.
    fn reserve_slot(&mut self) -> Instant {
        let at = self.next_slot.max(Instant::now());
        self.next_slot = at + self.delay;
        at
    }
}

/// Host policies keyed by origin, loaded on first use.
#[derive(Default)]
struct HostPolicies {
    entries: HashMap<String, HostPolicy>,
}

impl HostPolicies {
    async fn get(&mut self, crawler: &Crawler, url: &Url) -> &mut HostPolicy {
        match self.entries.entry(url.origin().ascii_serialization()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(crawler.host_policy(url).await),
        }
    }
}

// ---------------------------------------------------------------------------
// Scope checking
// ---------------------------------------------------------------------------

/// Determines which URLs are "in scope" for a crawl.
struct CrawlScope {
    /// Seed host; subdomains of it are also in scope.
    base_host: String,
    /// Include patterns (if non-empty, URL must match at least one).
    include_patterns: Vec<regex::Regex>,
    /// Exclude patterns (if URL matches any, it's excluded).
    exclude_patterns: Vec<regex::Regex>,
}

impl CrawlScope {
    fn new(seed: &Url, config: &CrawlConfig) -> Result<Self> {
        let base_host = seed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DokiError::validation(format!("seed URL has no host: {seed}")))?
            .to_ascii_lowercase();

        Ok(Self {
            base_host,
            include_patterns: config
                .include_patterns
                .iter()
                .filter_map(|p| glob_to_regex(p))
                .collect(),
            exclude_patterns: config
                .exclude_patterns
                .iter()
                .filter_map(|p| glob_to_regex(p))
                .collect(),
        })
    }

    fn in_scope(&self, url: &Url) -> bool {
        // Must be http/https
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        let host = url.host_str().unwrap_or("").to_ascii_lowercase();
        let same_site = host == self.base_host
            || host
                .strip_suffix(self.base_host.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'));
        if !same_site {
            return false;
        }

        let path = url.path();

        if self.exclude_patterns.iter().any(|p| p.is_match(path)) {
            return false;
        }

        // If any include patterns are configured, must match at least one
        self.include_patterns.is_empty() || self.include_patterns.iter().any(|p| p.is_match(path))
    }
}

/// Convert a glob-like pattern to a regex.
fn glob_to_regex(pattern: &str) -> Option<regex::Regex> {
    let escaped = regex::escape(pattern)
        .replace(r"\*\*", ".*")
        .replace(r"\*", "[^/]*")
        .replace(r"\?", ".");
    regex::Regex::new(&format!("^{escaped}$")).ok()
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    // Block non-HTTP schemes
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

// ---------------------------------------------------------------------------
// Page fetching
// ---------------------------------------------------------------------------

/// Fetch a single resource. The body is kept as raw bytes.
async fn fetch_page(client: &Client, url: &Url) -> Result<Page> {
    debug!(%url, "fetching page");

    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| DokiError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DokiError::Network(format!("{url}: HTTP {status}")));
    }

    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let body = response
        .bytes()
        .await
        .map_err(|e| DokiError::Network(format!("{url}: body read failed: {e}")))?;

    Ok(Page {
        url: final_url,
        body: body.to_vec(),
        content_type,
    })
}

/// Extract all links from a document, resolved against the base URL.
fn extract_links(doc: &Html, base_url: &Url) -> Vec<Url> {
    static LINK_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

    let mut links = Vec::new();
    for el in doc.select(&LINK_SEL) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        // Skip anchors, javascript:, mailto:, tel:
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }

        if let Ok(mut resolved) = base_url.join(href) {
            resolved.set_fragment(None);
            links.push(resolved);
        }
    }

    links
}

/// Content store key for a URL.
///
/// The full path is flattened so pages in different directories do not
/// collide. HTML responses always end in `.html`/`.htm`; other content keeps
/// its name and is therefore ignored by ingestion.
pub fn page_key(url: &Url, is_html: bool) -> String {
    let path = url.path().trim_matches('/');

    let mut key: String = path
        .chars()
        .map(|c| match c {
            '/' => '_',
            c if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') => c,
            _ => '_',
        })
        .collect();

    if key.is_empty() || key.chars().all(|c| c == '.') {
        key = String::from("index");
    }

    if is_html {
        let lower = key.to_ascii_lowercase();
        if !lower.ends_with(".html") && !lower.ends_with(".htm") {
            key.push_str(".html");
        }
    }
    key
}

#[cfg(test)]
mod crawler_tests {
    use super::*;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(depth: u32) -> CrawlConfig {
        CrawlConfig {
            depth,
            concurrency: 2,
            include_patterns: vec![],
            exclude_patterns: vec![],
            rate_limit_ms: 0,
            respect_robots_txt: false,
            user_agent: "Doki/test".into(),
        }
    }

    fn temp_store() -> ContentStore {
        ContentStore::new(std::env::temp_dir().join(format!("doki-crawl-test-{}", Uuid::now_v7())))
    }

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html")
    }

    async fn mount_html(server: &MockServer, at: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(html(body))
            .mount(server)
            .await;
    }

    fn saved_keys(store: &ContentStore) -> Vec<String> {
        store
            .list_pages()
            .unwrap()
            .into_iter()
            .map(|p| p.key)
            .collect()
    }

    #[test]
    fn test_page_key() {
        let url = Url::parse("https://docs.example.com/guide/getting-started.html").unwrap();
        assert_eq!(page_key(&url, true), "guide_getting-started.html");

        let root = Url::parse("https://docs.example.com/").unwrap();
        assert_eq!(page_key(&root, true), "index.html");
        assert_eq!(page_key(&root, false), "index");

        let dir = Url::parse("https://docs.example.com/api/").unwrap();
        assert_eq!(page_key(&dir, true), "api.html");

        let pdf = Url::parse("https://docs.example.com/files/paper.pdf").unwrap();
        assert_eq!(page_key(&pdf, false), "files_paper.pdf");

        let odd = Url::parse("https://docs.example.com/a%20b/c.HTM").unwrap();
        assert_eq!(page_key(&odd, true), "a_20b_c.HTM");
    }

    #[test]
    fn test_ssrf_protection_blocks_file() {
        let url = Url::parse("file:///etc/passwd").unwrap();
        assert!(is_ssrf_target(&url));
    }

    #[test]
    fn test_ssrf_protection_blocks_private_ip() {
        for u in [
            "http://192.168.1.1/admin",
            "http://10.0.0.1/",
            "http://127.0.0.1:8080/",
            "http://[::1]/",
        ] {
            assert!(is_ssrf_target(&Url::parse(u).unwrap()), "{u}");
        }
    }

    #[test]
    fn test_ssrf_protection_allows_public() {
        let url = Url::parse("https://docs.example.com/page").unwrap();
        assert!(!is_ssrf_target(&url));
    }

    #[test]
    fn test_ssrf_blocks_localhost() {
        let url = Url::parse("http://localhost:3000/api").unwrap();
        assert!(is_ssrf_target(&url));
    }

    #[test]
    fn test_scope_same_site() {
        let seed = Url::parse("https://ramanspy.readthedocs.io/").unwrap();
        let scope = CrawlScope::new(&seed, &test_config(3)).unwrap();

        assert!(scope.in_scope(&Url::parse("https://ramanspy.readthedocs.io/en/latest/").unwrap()));
        assert!(scope.in_scope(&Url::parse("https://en.ramanspy.readthedocs.io/x").unwrap()));
        assert!(!scope.in_scope(&Url::parse("https://readthedocs.io/").unwrap()));
        assert!(!scope.in_scope(&Url::parse("https://notramanspy.readthedocs.io/").unwrap()));
        assert!(!scope.in_scope(&Url::parse("https://github.com/barahona-research-group").unwrap()));
        assert!(!scope.in_scope(&Url::parse("ftp://ramanspy.readthedocs.io/").unwrap()));
    }

    #[test]
    fn test_scope_patterns() {
        let seed = Url::parse("https://docs.example.com/").unwrap();
        let config = CrawlConfig {
            include_patterns: vec!["/en/**".into()],
            exclude_patterns: vec!["/en/*/_modules/**".into()],
            ..test_config(3)
        };
        let scope = CrawlScope::new(&seed, &config).unwrap();

        assert!(scope.in_scope(&Url::parse("https://docs.example.com/en/latest/intro.html").unwrap()));
        assert!(!scope.in_scope(&Url::parse("https://docs.example.com/en/latest/_modules/x.html").unwrap()));
        assert!(!scope.in_scope(&Url::parse("https://docs.example.com/blog/post").unwrap()));
    }

    #[test]
    fn test_extract_links() {
        let html = r##"<html><body><a href="/page2">Page 2</a><a href="https://external.com">External</a><a href="#section">Anchor</a><a href="relative/path#frag">Relative</a><a href="mailto:a@b.c">Mail</a></body></html>"##;

        let doc = Html::parse_document(html);
        let base = Url::parse("https://docs.example.com/page1").unwrap();
        let links: Vec<String> = extract_links(&doc, &base)
            .into_iter()
            .map(|u| u.to_string())
            .collect();

        assert_eq!(
            links,
            vec![
                "https://docs.example.com/page2",
                "https://external.com/",
                "https://docs.example.com/relative/path",
            ]
        );
    }

    #[tokio::test]
    async fn test_crawl_with_mock_server() {
        let server = MockServer::start().await;
        mount_html(&server, "/", r#"<main><h1>Page One</h1><a href="/page2">2</a></main>"#).await;
        mount_html(&server, "/page2", r#"<main><h1>Page Two</h1><a href="/page3">3</a></main>"#).await;
        mount_html(&server, "/page3", "<main><h1>Page Three</h1><p>Final page.</p></main>").await;

        let store = temp_store();
        let crawler = Crawler::new(test_config(3)).unwrap().allow_localhost();
        let seed = Url::parse(&server.uri()).unwrap();
        let result = crawler.crawl(&seed, &store).await.unwrap();

        assert_eq!(result.pages_saved(), 3);
        assert!(result.errors.is_empty());
        assert_eq!(saved_keys(&store), vec!["index.html", "page2.html", "page3.html"]);

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn test_crawl_respects_depth() {
        let server = MockServer::start().await;
        mount_html(&server, "/", r#"<a href="/page2">Page 2</a>"#).await;
        mount_html(&server, "/page2", r#"<a href="/page3">Page 3</a>"#).await;
        Mock::given(path("/page3"))
            .respond_with(html("<p>Deep page</p>"))
            .expect(0)
            .mount(&server)
            .await;

        let store = temp_store();
        // Depth 1 = root + 1 level deep
        let crawler = Crawler::new(test_config(1)).unwrap().allow_localhost();
        let seed = Url::parse(&server.uri()).unwrap();
        let result = crawler.crawl(&seed, &store).await.unwrap();

        assert_eq!(result.pages_saved(), 2);
        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn test_non_html_is_saved_but_not_followed() {
        let server = MockServer::start().await;
        mount_html(&server, "/", r#"<a href="/data.json">data</a>"#).await;
        Mock::given(method("GET"))
            .and(path("/data.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(r#"{"html": "<a href=\"/hidden\">x</a>"}"#.as_bytes().to_vec(), "application/json"),
            )
            .mount(&server)
            .await;
        Mock::given(path("/hidden"))
            .respond_with(html("never"))
            .expect(0)
            .mount(&server)
            .await;

        let store = temp_store();
        let crawler = Crawler::new(test_config(5)).unwrap().allow_localhost();
        let seed = Url::parse(&server.uri()).unwrap();
        let result = crawler.crawl(&seed, &store).await.unwrap();

        assert_eq!(result.pages_saved(), 2);
        let data = result.saved.iter().find(|p| p.key == "data.json").unwrap();
        assert!(!data.followed_links);
        assert!(store.root().join("data.json").exists());
        // Ingestion only sees the HTML page.
        assert_eq!(saved_keys(&store), vec!["index.html"]);
        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn test_visited_pages_are_not_refetched() {
        let server = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(html(r##"<a href="/a">a</a><a href="/b">b</a><a href="/#top">top</a>"##))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/a"))
            .respond_with(html(r#"<a href="/">home</a><a href="/b">b</a><a href="/a/">self</a>"#))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/b"))
            .respond_with(html(r##"<a href="/a#intro">a</a><a href="/">home</a>"##))
            .expect(1)
            .mount(&server)
            .await;

        let store = temp_store();
        let crawler = Crawler::new(test_config(10)).unwrap().allow_localhost();
        let seed = Url::parse(&server.uri()).unwrap();
        let result = crawler.crawl(&seed, &store).await.unwrap();

        assert_eq!(result.pages_saved(), 3);
        server.verify().await;
        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn test_failed_page_does_not_stop_crawl() {
        let server = MockServer::start().await;
        mount_html(&server, "/", r#"<a href="/broken">x</a><a href="/ok">y</a>"#).await;
        Mock::given(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        mount_html(&server, "/ok", "<p>fine</p>").await;

        let store = temp_store();
        let crawler = Crawler::new(test_config(2)).unwrap().allow_localhost();
        let seed = Url::parse(&server.uri()).unwrap();
        let result = crawler.crawl(&seed, &store).await.unwrap();

        assert_eq!(result.pages_saved(), 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].0.ends_with("/broken"));
        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn test_robots_disallow_is_honored() {
        let server = MockServer::start().await;
        Mock::given(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"))
            .mount(&server)
            .await;
        mount_html(&server, "/", r#"<a href="/private/notes">p</a><a href="/public">q</a>"#).await;
        mount_html(&server, "/public", "<p>public</p>").await;
        Mock::given(path("/private/notes"))
            .respond_with(html("secret"))
            .expect(0)
            .mount(&server)
            .await;

        let store = temp_store();
        let config = CrawlConfig {
            respect_robots_txt: true,
            ..test_config(3)
        };
        let crawler = Crawler::new(config).unwrap().allow_localhost();
        let seed = Url::parse(&server.uri()).unwrap();
        let result = crawler.crawl(&seed, &store).await.unwrap();

        assert_eq!(result.pages_saved(), 2);
        assert_eq!(result.pages_skipped, 1);
        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn test_crawl_delay_spaces_request_starts() {
        let server = MockServer::start().await;
        Mock::given(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nCrawl-delay: 0.2\n"))
            .mount(&server)
            .await;
        mount_html(&server, "/", r#"<a href="/a">a</a><a href="/b">b</a><a href="/c">c</a>"#).await;
        for page in ["/a", "/b", "/c"] {
            mount_html(&server, page, "<p>page</p>").await;
        }

        let store = temp_store();
        let config = CrawlConfig {
            concurrency: 4,
            respect_robots_txt: true,
            ..test_config(1)
        };
        let crawler = Crawler::new(config).unwrap().allow_localhost();
        let seed = Url::parse(&server.uri()).unwrap();

        let started = std::time::Instant::now();
        let result = crawler.crawl(&seed, &store).await.unwrap();

        assert_eq!(result.pages_saved(), 4);
        // Four request starts on one host need three gaps of 200ms.
        assert!(started.elapsed() >= Duration::from_millis(600));
        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn test_robots_is_loaded_per_origin() {
        let docs = MockServer::start().await;
        Mock::given(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"))
            .expect(1)
            .mount(&docs)
            .await;
        let api = MockServer::start().await;
        Mock::given(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nCrawl-delay: 1\n"))
            .expect(1)
            .mount(&api)
            .await;

        let config = CrawlConfig {
            respect_robots_txt: true,
            ..test_config(1)
        };
        let crawler = Crawler::new(config).unwrap().allow_localhost();
        let docs_url = Url::parse(&format!("{}/private/notes", docs.uri())).unwrap();
        let api_url = Url::parse(&format!("{}/private/notes", api.uri())).unwrap();

        let mut hosts = HostPolicies::default();
        let docs_policy = hosts.get(&crawler, &docs_url).await;
        assert!(!docs_policy.robots.is_allowed("Doki/test", docs_url.path()));
        assert_eq!(docs_policy.delay, Duration::ZERO);

        let api_policy = hosts.get(&crawler, &api_url).await;
        assert!(api_policy.robots.is_allowed("Doki/test", api_url.path()));
        assert_eq!(api_policy.delay, Duration::from_secs(1));

        // Cached: no second robots.txt request.
        hosts.get(&crawler, &docs_url).await;
        assert_eq!(hosts.entries.len(), 2);
    }

    #[tokio::test]
    async fn test_private_seed_is_rejected() {
        let store = temp_store();
        let crawler = Crawler::new(test_config(1)).unwrap();
        let seed = Url::parse("http://127.0.0.1:9/").unwrap();
        assert!(crawler.crawl(&seed, &store).await.is_err());
    }
}
