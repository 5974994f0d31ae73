use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DB_PATH: &str = "data/cards.sqlite";

/// One seed entry point for discovery: a category or year-index page.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Seed {
    pub sport: String,
    pub url: String,
}

/// Expands to one seed URL per year, e.g. `{base}/2024-basketball-cards`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct YearTemplate {
    pub sport: String,
    /// Template with a `{year}` placeholder; relative paths join `base_url`.
    pub pattern: String,
    pub from_year: i32,
    pub to_year: i32,
}

/// Per-site crawl profile: where to start, how the site shapes its checklist
/// URLs, and how hard it rate-limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteProfile {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub seeds: Vec<Seed>,
    #[serde(default)]
    pub year_templates: Vec<YearTemplate>,
    pub sitemap_url: Option<String>,
    /// Minimum interval between requests to this site, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub min_delay_ms: u64,
    /// URL substrings that mark a page as an index of checklist links
    /// (e.g. a release-dates roundup) rather than a checklist itself.
    #[serde(default = "default_index_markers")]
    pub index_markers: Vec<String>,
}

fn default_delay_ms() -> u64 {
    2500
}

fn default_index_markers() -> Vec<String> {
    vec!["release-dates".into(), "release-calendar".into()]
}

/// Sold-listings search endpoint for the sibling sales pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SalesConfig {
    pub endpoint: String,
    #[serde(default = "default_sales_delay_ms")]
    pub min_delay_ms: u64,
}

fn default_sales_delay_ms() -> u64 {
    6500
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    pub sites: Vec<SiteProfile>,
    pub sales: SalesConfig,
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

impl Config {
    /// Load from a JSON file, or fall back to the built-in profiles.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file {}", p.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse config file {}", p.display()))
            }
            None => Ok(Config::builtin()),
        }
    }

    pub fn site(&self, name: &str) -> Option<&SiteProfile> {
        self.sites.iter().find(|s| s.name == name)
    }

    /// Default profiles so the binary is usable without a config file.
    pub fn builtin() -> Config {
        Config {
            db_path: default_db_path(),
            sites: vec![SiteProfile {
                name: "cardboardconnection".into(),
                base_url: "https://www.cardboardconnection.com".into(),
                seeds: vec![
                    Seed {
                        sport: "basketball".into(),
                        url: "https://www.cardboardconnection.com/category/sport/basketball-cards".into(),
                    },
                    Seed {
                        sport: "football".into(),
                        url: "https://www.cardboardconnection.com/category/sport/football-cards".into(),
                    },
                    Seed {
                        sport: "baseball".into(),
                        url: "https://www.cardboardconnection.com/category/sport/baseball-cards".into(),
                    },
                    Seed {
                        sport: "soccer".into(),
                        url: "https://www.cardboardconnection.com/category/sport/soccer-cards".into(),
                    },
                    Seed {
                        sport: "hockey".into(),
                        url: "https://www.cardboardconnection.com/category/sport/hockey-cards".into(),
                    },
                ],
                year_templates: vec![YearTemplate {
                    sport: "basketball".into(),
                    pattern: "/{year}-basketball-cards".into(),
                    from_year: 2018,
                    to_year: 2025,
                }],
                sitemap_url: Some("https://www.cardboardconnection.com/sitemap.xml".into()),
                min_delay_ms: 2500,
                index_markers: default_index_markers(),
            }],
            sales: SalesConfig {
                endpoint: "https://130point.com/sales/".into(),
                min_delay_ms: default_sales_delay_ms(),
            },
        }
    }
}

impl SiteProfile {
    /// All starting URLs: explicit seeds plus expanded year templates.
    pub fn seed_urls(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .seeds
            .iter()
            .map(|s| (s.sport.clone(), s.url.clone()))
            .collect();
        for t in &self.year_templates {
            for year in t.from_year..=t.to_year {
                let path = t.pattern.replace("{year}", &year.to_string());
                let url = if path.starts_with("http") {
                    path
                } else {
                    format!("{}{}", self.base_url.trim_end_matches('/'), path)
                };
                out.push((t.sport.clone(), url));
            }
        }
        out
    }
}
