//! Robots exclusion rules.
//!
//! Groups are keyed by user-agent token. Within the matching group the
//! longest matching `Allow`/`Disallow` prefix decides; ties go to `Allow`.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use doki_shared::{DokiError, Result};

/// Upper bound on an honored `Crawl-delay`, in seconds.
pub const MAX_CRAWL_DELAY_SECS: f64 = 60.0;

/// Parsed robots.txt rules.
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    groups: Vec<Group>,
}

#[derive(Debug, Clone, Default)]
struct Group {
    /// Lowercased agent tokens this group applies to.
    agents: Vec<String>,
    rules: Vec<Rule>,
    crawl_delay: Option<f64>,
}

#[derive(Debug, Clone)]
struct Rule {
    allow: bool,
    prefix: String,
}

impl RobotsTxt {
    /// Parse robots.txt content. Unknown directives are ignored.
    pub fn parse(content: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current = Group::default();
        let mut in_rules = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    // A user-agent line after rules starts a new group.
                    if in_rules {
                        groups.push(std::mem::take(&mut current));
                        in_rules = false;
                    }
                    current.agents.push(value.to_ascii_lowercase());
                }
                "allow" | "disallow" => {
                    in_rules = true;
                    // An empty Disallow allows everything.
                    if !value.is_empty() {
                        current.rules.push(Rule {
                            allow: directive == "allow",
                            prefix: value.to_string(),
                        });
                    }
                }
                "crawl-delay" => {
                    in_rules = true;
                    match value.parse::<f64>() {
                        Ok(delay) if delay.is_finite() && delay >= 0.0 => {
                            if delay > MAX_CRAWL_DELAY_SECS {
                                warn!(value, max_secs = MAX_CRAWL_DELAY_SECS, "crawl-delay too large, clamping");
                            }
                            current.crawl_delay = Some(delay.min(MAX_CRAWL_DELAY_SECS));
                        }
                        _ => debug!(value, "ignoring invalid crawl-delay"),
                    }
                }
                _ => {}
            }
        }
        if !current.agents.is_empty() {
            groups.push(current);
        }

        Self { groups }
    }

    /// The group that applies to `user_agent`: a named match first, then `*`.
    fn group_for(&self, user_agent: &str) -> Option<&Group> {
        let token = product_token(user_agent);
        self.groups
            .iter()
            .find(|g| g.agents.iter().any(|a| a != "*" && token.contains(a.as_str())))
            .or_else(|| self.groups.iter().find(|g| g.agents.iter().any(|a| a == "*")))
    }

    /// Whether `path` may be fetched by `user_agent`.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let Some(group) = self.group_for(user_agent) else {
            return true;
        };

        group
            .rules
            .iter()
            .filter(|rule| path.starts_with(rule.prefix.as_str()))
            .max_by(|a, b| {
                a.prefix
                    .len()
                    .cmp(&b.prefix.len())
                    .then(a.allow.cmp(&b.allow))
            })
            .is_none_or(|rule| rule.allow)
    }

    /// Requested delay between requests for `user_agent`.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.group_for(user_agent)
            .and_then(|g| g.crawl_delay)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// `Doki/0.1.0 (+https://...)` -> `doki`
fn product_token(user_agent: &str) -> String {
    user_agent
        .split(['/', ' '])
        .next()
        .unwrap_or(user_agent)
        .to_ascii_lowercase()
}

/// Fetch and parse robots.txt for the site hosting `seed`.
///
/// A missing robots.txt (any non-success status) allows everything.
pub async fn fetch_robots_txt(client: &Client, seed: &Url) -> Result<RobotsTxt> {
    let url = seed
        .join("/robots.txt")
        .map_err(|e| DokiError::validation(format!("{seed}: {e}")))?;

    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| DokiError::Network(format!("{url}: {e}")))?;

    if !response.status().is_success() {
        debug!(%url, status = %response.status(), "no robots.txt, allowing all");
        return Ok(RobotsTxt::default());
    }

    let content = response
        .text()
        .await
        .map_err(|e| DokiError::Network(format!("{url}: body read failed: {e}")))?;

    let robots = RobotsTxt::parse(&content);
    if robots.groups.is_empty() {
        warn!(%url, "robots.txt has no user-agent groups");
    }
    Ok(robots)
}
