use std::sync::LazyLock;

use anyhow::Result;
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::config::SalesConfig;
use crate::db::{self, SaleRow, SaleTarget};
use crate::fetch::Fetcher;

static ROW_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<tr[\s>]").unwrap());
static DATA_PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-price\s*=\s*"([0-9][0-9,]*\.?\d*)""#).unwrap());
static DATA_CURRENCY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-currency\s*=\s*"([A-Z]{3})""#).unwrap());
static ITEM_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"data-itemid\s*=\s*"(\d+)"|[?&]item=(\d+)\b"#).unwrap()
});
static LINK_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a[^>]*>(.*?)</a>").unwrap());
static BID_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+bids?\b").unwrap());
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][a-z]{2})[a-z]*\s+(\d{1,2}),?\s+(\d{4})\b").unwrap()
});
static IMG_SRC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<img[^>]+src\s*=\s*"([^"]+)""#).unwrap());
static NAME_CLEAN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9 ]").unwrap());
static SET_NOISE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(checklist|cards|basketball|football|baseball|hockey|soccer)\b").unwrap()
});

#[derive(Debug, Default)]
pub struct SalesCounters {
    pub queried: usize,
    pub recorded: usize,
    pub linked: usize,
    pub failed: usize,
}

/// Sibling pipeline: one sold-listings query per catalog entry, same
/// fetch/rate-limit discipline as the checklist crawl, upsert by item id.
pub async fn run(conn: &Connection, config: &SalesConfig, limit: Option<usize>) -> Result<SalesCounters> {
    let targets = db::fetch_sale_targets(conn, limit)?;
    let mut counters = SalesCounters::default();
    if targets.is_empty() {
        return Ok(counters);
    }

    let mut fetcher = Fetcher::new(config.min_delay_ms)?;
    let pb = ProgressBar::new(targets.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    for target in targets {
        let query = build_query(&target);
        let url = format!(
            "{}?query={}",
            config.endpoint.trim_end_matches('/'),
            urlencode(&query)
        );

        counters.queried += 1;
        match fetcher.fetch(&url).await {
            Ok(fetched) => {
                let mut records = parse_sales(&fetched.body, &query);
                for r in &mut records {
                    if title_matches_player(&r.title, &target.player_name) {
                        r.entry_id = Some(target.entry_id);
                        counters.linked += 1;
                    }
                }
                counters.recorded += db::upsert_sales(conn, &records)?;
            }
            Err(e) => {
                warn!("Sales query '{}' failed: {}", query, e);
                counters.failed += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Sales: {} queries, {} records, {} linked, {} failed",
        counters.queried, counters.recorded, counters.linked, counters.failed
    );
    Ok(counters)
}

/// Query text: player, set name with sport/boilerplate words dropped, year.
pub fn build_query(target: &SaleTarget) -> String {
    let cleaned_set = SET_NOISE_RE.replace_all(&target.set_name, "");
    let cleaned_set = cleaned_set.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut parts = vec![target.player_name.trim()];
    let set_trimmed = cleaned_set.trim();
    if !set_trimmed.is_empty() {
        parts.push(set_trimmed);
    }
    if !set_trimmed.contains(&target.year) {
        parts.push(target.year.as_str());
    }
    parts.join(" ")
}

/// Parse sold-listing table rows. Rows are keyed by their data-price /
/// data-currency attributes; rows without both are skipped.
pub fn parse_sales(html: &str, query: &str) -> Vec<SaleRow> {
    let mut rows = Vec::new();
    let starts: Vec<usize> = ROW_SPLIT_RE.find_iter(html).map(|m| m.start()).collect();

    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(html.len());
        let chunk = &html[start..end];

        let Some(price) = DATA_PRICE_RE
            .captures(chunk)
            .and_then(|c| c[1].replace(',', "").parse::<f64>().ok())
        else {
            continue;
        };
        let Some(currency) = DATA_CURRENCY_RE.captures(chunk).map(|c| c[1].to_string()) else {
            continue;
        };
        let Some(item_id) = ITEM_ID_RE.captures(chunk).and_then(|c| {
            c.get(1).or_else(|| c.get(2)).map(|m| m.as_str().to_string())
        }) else {
            continue;
        };

        let title = LINK_TEXT_RE
            .captures(chunk)
            .map(|c| crate::parser::lines::strip_tags(&c[1]))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| query.to_string());

        let bid_count = BID_COUNT_RE
            .captures(chunk)
            .and_then(|c| c[1].parse::<i32>().ok());
        let sale_type = match bid_count {
            Some(n) if n > 0 => "auction",
            _ => "fixed",
        };

        let sale_date = DATE_RE.captures(chunk).and_then(|c| {
            let raw = format!("{} {} {}", &c[1], &c[2], &c[3]);
            NaiveDate::parse_from_str(&raw, "%b %d %Y")
                .ok()
                .map(|d| d.format("%Y-%m-%d").to_string())
        });

        let image_url = IMG_SRC_RE.captures(chunk).map(|c| c[1].to_string());

        rows.push(SaleRow {
            item_id,
            entry_id: None,
            query: query.to_string(),
            title,
            price,
            currency,
            sale_type: sale_type.to_string(),
            bid_count,
            sale_date,
            image_url,
        });
    }

    rows
}

/// Fuzzy link back to the catalog: lowercase alphanumeric containment of
/// the full player name in the listing title.
pub fn title_matches_player(title: &str, player: &str) -> bool {
    let t = normalize_name(title);
    let p = normalize_name(player);
    !p.is_empty() && t.contains(&p)
}

fn normalize_name(s: &str) -> String {
    let lower = s.to_lowercase();
    let cleaned = NAME_CLEAN_RE.replace_all(&lower, " ");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
