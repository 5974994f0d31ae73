use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use crate::config::SiteProfile;

static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*=\s*["']([^"'#]+)["']"#).unwrap());
static YEAR_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}(-\d{2})?\b").unwrap());
static FOUR_DIGIT_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());

/// Sport keywords a checklist URL must carry (any sport qualifies; the
/// metadata extractor decides which one later).
const SPORT_URL_KEYWORDS: &[&str] = &[
    "basketball",
    "football",
    "baseball",
    "hockey",
    "soccer",
    "nba",
    "nfl",
    "mlb",
    "nhl",
    "mls",
    "uefa",
    "wnba",
];

const CHECKLIST_MARKERS: &[&str] = &["cards", "checklist"];

/// URL path fragments that are navigation, not content.
const EXCLUDED_FRAGMENTS: &[&str] = &["/page/", "/tag/", "/category/", "/author/", "/feed", "?s=", "?p="];

/// Per-run visited set over normalized URLs. The only guard against
/// re-crawling cross-linked pages within a run; the `pages` table handles
/// the across-runs case.
#[derive(Debug, Default)]
pub struct CrawlState {
    visited: HashSet<String>,
}

impl CrawlState {
    pub fn new() -> CrawlState {
        CrawlState::default()
    }

    /// Record a URL; returns true the first time, false on repeats.
    pub fn mark(&mut self, url: &str) -> bool {
        self.visited.insert(url.to_string())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Discovered {
    pub checklist_urls: Vec<String>,
    pub index_urls: Vec<String>,
}

/// Extract candidate checklist and index URLs from one page's HTML.
/// Already-seen URLs (per `state`) are skipped and everything returned is
/// marked seen, so recursion over cross-linked pages terminates.
pub fn discover(
    profile: &SiteProfile,
    page_url: &str,
    html: &str,
    state: &mut CrawlState,
) -> Discovered {
    let mut found = Discovered::default();

    for caps in HREF_RE.captures_iter(html) {
        let Some(url) = normalize_url(profile, page_url, &caps[1]) else {
            continue;
        };
        if state.contains(&url) {
            continue;
        }

        if is_checklist_url(&url) {
            state.mark(&url);
            found.checklist_urls.push(url);
        } else if is_index_url(profile, &url) {
            state.mark(&url);
            found.index_urls.push(url);
        }
    }

    found
}

/// A checklist URL carries a year token, a sport keyword, and a
/// cards/checklist marker, and none of the navigation fragments.
pub fn is_checklist_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    if EXCLUDED_FRAGMENTS.iter().any(|f| lower.contains(f)) {
        return false;
    }
    YEAR_TOKEN_RE.is_match(&lower)
        && SPORT_URL_KEYWORDS.iter().any(|kw| lower.contains(kw))
        && CHECKLIST_MARKERS.iter().any(|m| lower.contains(m))
}

fn is_index_url(profile: &SiteProfile, url: &str) -> bool {
    let lower = url.to_lowercase();
    if EXCLUDED_FRAGMENTS.iter().any(|f| lower.contains(f)) {
        return false;
    }
    profile.index_markers.iter().any(|m| lower.contains(m.as_str()))
}

/// Resolve an href against its page, keep it on-site, strip fragments and
/// the trailing slash. Returns None for off-site and unsupported links.
pub fn normalize_url(profile: &SiteProfile, page_url: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with("mailto:") {
        return None;
    }

    let base = profile.base_url.trim_end_matches('/');
    let absolute = if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with("//") {
        format!("https:{}", href)
    } else if href.starts_with('/') {
        format!("{}{}", base, href)
    } else {
        // Relative path: resolve against the page's directory. A bare host
        // URL splits inside the scheme ("https:/"), so fall back to base.
        let dir = match page_url.rsplit_once('/') {
            Some((d, _)) if !d.is_empty() && !d.ends_with('/') && !d.ends_with(':') => d,
            _ => base,
        };
        format!("{}/{}", dir, href)
    };

    if !absolute.starts_with(base) {
        return None;
    }

    let no_fragment = absolute.split('#').next().unwrap_or(&absolute);
    Some(no_fragment.trim_end_matches('/').to_string())
}

// ── Sitemap (lower-priority discovery source) ──

/// Parse a sitemap `<urlset>` and return all `<loc>` URLs.
pub fn parse_urlset(xml: &str) -> Result<Vec<String>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut urls = Vec::new();
    let mut in_url = false;
    let mut in_loc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.name().as_ref() {
                b"url" => in_url = true,
                b"loc" if in_url => in_loc = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(e)) if in_loc => {
                urls.push(e.unescape()?.to_string());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.name().as_ref() {
                b"loc" => in_loc = false,
                b"url" => in_url = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    Ok(urls)
}

/// Filter sitemap URLs down to probable checklist pages: a 4-digit year
/// plus a checklist-like keyword.
pub fn filter_sitemap_urls(urls: Vec<String>, state: &mut CrawlState) -> Vec<String> {
    urls.into_iter()
        .filter_map(|url| {
            let normalized = url.split('#').next().unwrap_or(&url).trim_end_matches('/').to_string();
            let lower = normalized.to_lowercase();
            let keep = FOUR_DIGIT_YEAR_RE.is_match(&lower)
                && CHECKLIST_MARKERS.iter().any(|m| lower.contains(m))
                && !EXCLUDED_FRAGMENTS.iter().any(|f| lower.contains(f));
            if keep && state.mark(&normalized) {
                Some(normalized)
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn profile() -> SiteProfile {
        Config::builtin().sites[0].clone()
    }

    #[test]
    fn finds_checklist_links() {
        let p = profile();
        let html = r#"
            <a href="/2023-24-panini-prizm-basketball-cards">Prizm</a>
            <a href="https://www.cardboardconnection.com/2024-topps-chrome-baseball-cards">Chrome</a>
            <a href="/about-us">About</a>
            <a href="/category/sport/basketball-cards/page/2">Next</a>
        "#;
        let mut state = CrawlState::new();
        let found = discover(&p, &p.base_url, html, &mut state);
        assert_eq!(found.checklist_urls.len(), 2);
        assert!(found.checklist_urls[0].ends_with("2023-24-panini-prizm-basketball-cards"));
    }

    #[test]
    fn pagination_and_tags_excluded() {
        assert!(!is_checklist_url(
            "https://x.com/2024-basketball-cards/page/3"
        ));
        assert!(!is_checklist_url("https://x.com/tag/2024-basketball-cards"));
        assert!(is_checklist_url(
            "https://x.com/2024-panini-mosaic-basketball-cards"
        ));
    }

    #[test]
    fn requires_year_sport_and_marker() {
        assert!(!is_checklist_url("https://x.com/panini-mosaic-basketball-cards")); // no year
        assert!(!is_checklist_url("https://x.com/2024-mosaic-cards")); // no sport
        assert!(!is_checklist_url("https://x.com/2024-basketball-news")); // no marker
    }

    #[test]
    fn visited_set_prevents_requeue() {
        let p = profile();
        let html = r#"<a href="/2024-panini-select-basketball-cards">x</a>"#;
        let mut state = CrawlState::new();
        let first = discover(&p, &p.base_url, html, &mut state);
        assert_eq!(first.checklist_urls.len(), 1);
        let second = discover(&p, &p.base_url, html, &mut state);
        assert!(second.checklist_urls.is_empty());
    }

    #[test]
    fn index_pages_recognized() {
        let p = profile();
        let html = r#"<a href="/2024-sports-card-release-dates">Release Dates</a>"#;
        let mut state = CrawlState::new();
        let found = discover(&p, &p.base_url, html, &mut state);
        assert_eq!(found.index_urls.len(), 1);
        assert!(found.checklist_urls.is_empty());
    }

    #[test]
    fn offsite_links_dropped() {
        let p = profile();
        let mut state = CrawlState::new();
        let html = r#"<a href="https://other-site.com/2024-basketball-cards">x</a>"#;
        let found = discover(&p, &p.base_url, html, &mut state);
        assert!(found.checklist_urls.is_empty());
    }

    #[test]
    fn normalization_strips_slash_and_fragment() {
        let p = profile();
        let url = normalize_url(&p, &p.base_url, "/2024-basketball-cards/#checklist").unwrap();
        assert_eq!(
            url,
            "https://www.cardboardconnection.com/2024-basketball-cards"
        );
    }

    #[test]
    fn relative_href_on_bare_host_resolves() {
        let p = profile();
        let url = normalize_url(
            &p,
            "https://www.cardboardconnection.com",
            "2024-panini-select-basketball-cards",
        )
        .unwrap();
        assert_eq!(
            url,
            "https://www.cardboardconnection.com/2024-panini-select-basketball-cards"
        );

        // Deeper pages still resolve against their own directory
        let url = normalize_url(
            &p,
            "https://www.cardboardconnection.com/category/sport/basketball-cards",
            "2024-panini-select-basketball-cards",
        )
        .unwrap();
        assert_eq!(
            url,
            "https://www.cardboardconnection.com/category/sport/2024-panini-select-basketball-cards"
        );
    }

    #[test]
    fn urlset_parsing() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://x.com/2024-topps-chrome-baseball-cards</loc></url>
              <url><loc>https://x.com/about</loc></url>
            </urlset>"#;
        let urls = parse_urlset(xml).unwrap();
        assert_eq!(urls.len(), 2);

        let mut state = CrawlState::new();
        let filtered = filter_sitemap_urls(urls, &mut state);
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].contains("topps-chrome"));
    }

    #[test]
    fn sitemap_respects_visited_set() {
        let mut state = CrawlState::new();
        state.mark("https://x.com/2024-topps-chrome-baseball-cards");
        let filtered = filter_sitemap_urls(
            vec!["https://x.com/2024-topps-chrome-baseball-cards".into()],
            &mut state,
        );
        assert!(filtered.is_empty());
    }
}
