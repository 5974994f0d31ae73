use std::collections::HashMap;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::config::{Config, SiteProfile};
use crate::db::{self, FetchRecord, QueuedPage};
use crate::discover::{self, CrawlState};
use crate::fetch::{FetchError, Fetched, Fetcher};
use crate::{metadata, parser};

/// Per-URL outcome, reported per page and tallied across the run.
#[derive(Debug)]
pub enum PageOutcome {
    /// New CardSet with a parsed checklist.
    Created(usize),
    /// Existing CardSet, entries replaced.
    Updated(usize),
    /// Valid page, no recognizable card rows. Set metadata is kept; the
    /// previous entries (if any) are left untouched.
    ZeroEntries,
    /// 404. Marked visited, never revisited.
    NotFound,
    /// Name or year could not be determined; no CardSet was created.
    MetadataIncomplete,
    /// Transient or rate-limit failure; the URL stays unvisited for a
    /// later run.
    Failed(String),
}

#[derive(Debug, Default)]
pub struct RunCounters {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub zero_entries: usize,
    pub not_found: usize,
    pub metadata_incomplete: usize,
    pub failed: usize,
    pub entries_stored: usize,
}

impl RunCounters {
    fn tally(&mut self, outcome: &PageOutcome) {
        self.processed += 1;
        match outcome {
            PageOutcome::Created(n) => {
                self.created += 1;
                self.entries_stored += n;
            }
            PageOutcome::Updated(n) => {
                self.updated += 1;
                self.entries_stored += n;
            }
            PageOutcome::ZeroEntries => self.zero_entries += 1,
            PageOutcome::NotFound => self.not_found += 1,
            PageOutcome::MetadataIncomplete => self.metadata_incomplete += 1,
            PageOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn print(&self) {
        println!(
            "Processed {} URLs: {} created, {} updated, {} zero-entry, {} not found, \
             {} metadata-incomplete, {} failed. {} entries stored.",
            self.processed,
            self.created,
            self.updated,
            self.zero_entries,
            self.not_found,
            self.metadata_incomplete,
            self.failed,
            self.entries_stored,
        );
    }
}

/// Discovery pass: seeds -> category pages -> (one level of) index pages,
/// then the sitemap as a lower-priority source. Populates the `pages`
/// queue; fetching is sequential and politeness-delayed throughout.
pub async fn discover_sites(
    conn: &Connection,
    config: &Config,
    site_filter: Option<&str>,
) -> Result<usize> {
    let mut queued_total = 0;

    for profile in &config.sites {
        if site_filter.is_some_and(|name| name != profile.name) {
            continue;
        }
        info!("Discovering {} ({} seeds)", profile.name, profile.seed_urls().len());

        let mut fetcher = Fetcher::new(profile.min_delay_ms)?;
        let mut state = CrawlState::new();
        let mut index_queue: Vec<(String, Option<String>)> = Vec::new();

        for (sport, seed_url) in profile.seed_urls() {
            state.mark(&seed_url);
            let html = match fetcher.fetch(&seed_url).await {
                Ok(f) => f.body,
                Err(e) => {
                    warn!("Seed {} failed: {}", seed_url, e);
                    continue;
                }
            };
            let found = discover::discover(profile, &seed_url, &html, &mut state);
            queued_total +=
                queue_checklists(conn, profile, &found.checklist_urls, Some(sport.clone()))?;
            index_queue.extend(found.index_urls.into_iter().map(|u| (u, Some(sport.clone()))));
        }

        // Second pass over index pages; their own index links are not
        // followed further (depth bound).
        for (index_url, sport) in index_queue {
            let html = match fetcher.fetch(&index_url).await {
                Ok(f) => f.body,
                Err(e) => {
                    warn!("Index {} failed: {}", index_url, e);
                    continue;
                }
            };
            let found = discover::discover(profile, &index_url, &html, &mut state);
            queued_total += queue_checklists(conn, profile, &found.checklist_urls, sport.clone())?;
        }

        if let Some(sitemap_url) = &profile.sitemap_url {
            match fetcher.fetch(sitemap_url).await {
                Ok(f) => {
                    let urls = discover::parse_urlset(&f.body)?;
                    let filtered = discover::filter_sitemap_urls(urls, &mut state);
                    info!("Sitemap: {} checklist candidates", filtered.len());
                    queued_total += queue_checklists(conn, profile, &filtered, None)?;
                }
                Err(e) => warn!("Sitemap {} failed: {}", sitemap_url, e),
            }
        }
    }

    Ok(queued_total)
}

fn queue_checklists(
    conn: &Connection,
    profile: &SiteProfile,
    urls: &[String],
    sport_hint: Option<String>,
) -> Result<usize> {
    let pages: Vec<QueuedPage> = urls
        .iter()
        .map(|url| QueuedPage {
            url: url.clone(),
            site: profile.name.clone(),
            kind: "checklist",
            sport_hint: sport_hint.clone(),
        })
        .collect();
    db::queue_pages(conn, &pages)
}

/// Ingestion pass: one URL at a time, fetch -> store raw -> metadata ->
/// parse -> persist. Failures are local to the URL; interrupting between
/// URLs leaves the catalog valid.
pub async fn crawl(conn: &Connection, config: &Config, limit: Option<usize>) -> Result<RunCounters> {
    let pending = db::fetch_unvisited(conn, limit)?;
    let mut counters = RunCounters::default();
    if pending.is_empty() {
        return Ok(counters);
    }

    let pb = ProgressBar::new(pending.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut fetchers: HashMap<String, Fetcher> = HashMap::new();

    for page in pending {
        let delay = config
            .site(&page.site)
            .map(|p| p.min_delay_ms)
            .unwrap_or(2500);
        let fetcher = match fetchers.entry(page.site.clone()) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => e.insert(Fetcher::new(delay)?),
        };

        let outcome = process_page(conn, fetcher, page.id, &page.url).await?;
        match &outcome {
            PageOutcome::Failed(e) => warn!("{}: {}", page.url, e),
            other => info!("{}: {:?}", page.url, other),
        }
        counters.tally(&outcome);
        pb.inc(1);
    }

    pb.finish_and_clear();
    counters.print();
    Ok(counters)
}

async fn process_page(
    conn: &Connection,
    fetcher: &mut Fetcher,
    page_id: i64,
    url: &str,
) -> Result<PageOutcome> {
    let result = fetcher.fetch(url).await;
    record_fetch(conn, page_id, url, &result)?;
    match result {
        Ok(fetched) => ingest_html(conn, url, &fetched.body),
        Err(FetchError::NotFound(_)) => Ok(PageOutcome::NotFound),
        Err(e) => Ok(PageOutcome::Failed(e.to_string())),
    }
}

/// Persist one fetch attempt's result against the URL queue. Success and
/// 404 both mark the page visited (404 is terminal, never revisited);
/// transient and rate-limit failures leave it unvisited for the next run.
fn record_fetch(
    conn: &Connection,
    page_id: i64,
    url: &str,
    result: &Result<Fetched, FetchError>,
) -> Result<()> {
    match result {
        Ok(fetched) => {
            db::insert_page_data(
                conn,
                &FetchRecord {
                    page_id,
                    url: url.to_string(),
                    html: Some(fetched.body.clone()),
                    status: Some(fetched.status),
                    error: None,
                    latency_ms: Some(fetched.latency_ms),
                },
            )?;
            db::mark_visited(conn, page_id)?;
        }
        Err(FetchError::NotFound(_)) => {
            db::insert_page_data(
                conn,
                &FetchRecord {
                    page_id,
                    url: url.to_string(),
                    html: None,
                    status: Some(404),
                    error: Some("not found".into()),
                    latency_ms: None,
                },
            )?;
            db::mark_visited(conn, page_id)?;
        }
        Err(e) => {
            db::insert_page_data(
                conn,
                &FetchRecord {
                    page_id,
                    url: url.to_string(),
                    html: None,
                    status: None,
                    error: Some(e.to_string()),
                    latency_ms: None,
                },
            )?;
        }
    }
    Ok(())
}

/// Shared by the online crawl and the offline reparse: metadata, parse,
/// persist, outcome.
pub fn ingest_html(conn: &Connection, url: &str, html: &str) -> Result<PageOutcome> {
    let Some(meta) = metadata::extract(url, html) else {
        return Ok(PageOutcome::MetadataIncomplete);
    };

    let (set_id, created) = db::get_or_create_set(conn, url, &meta)?;
    let entries = parser::parse(html);

    // An empty parse must not wipe a previously good checklist
    if entries.is_empty() {
        return Ok(PageOutcome::ZeroEntries);
    }

    let stored = db::replace_entries(conn, set_id, &entries)?;
    if created {
        Ok(PageOutcome::Created(stored))
    } else {
        Ok(PageOutcome::Updated(stored))
    }
}

/// Re-run the parser over stored HTML without touching the network.
/// Parsing is rayon-parallel; persistence stays on this thread.
pub fn reparse(conn: &Connection, limit: Option<usize>) -> Result<RunCounters> {
    use rayon::prelude::*;

    let pages = db::fetch_stored_pages(conn, limit)?;
    let mut counters = RunCounters::default();
    if pages.is_empty() {
        return Ok(counters);
    }

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec})")?
            .progress_chars("=> "),
    );

    for chunk in pages.chunks(200) {
        let parsed: Vec<(String, Option<metadata::SetMetadata>, Vec<parser::CardEntry>)> = chunk
            .par_iter()
            .map(|p| {
                (
                    p.url.clone(),
                    metadata::extract(&p.url, &p.html),
                    parser::parse(&p.html),
                )
            })
            .collect();

        for (url, meta, entries) in parsed {
            let outcome = match meta {
                None => PageOutcome::MetadataIncomplete,
                Some(meta) => {
                    let (set_id, created) = db::get_or_create_set(conn, &url, &meta)?;
                    if entries.is_empty() {
                        PageOutcome::ZeroEntries
                    } else {
                        let stored = db::replace_entries(conn, set_id, &entries)?;
                        if created {
                            PageOutcome::Created(stored)
                        } else {
                            PageOutcome::Updated(stored)
                        }
                    }
                }
            };
            counters.tally(&outcome);
            pb.inc(1);
        }
    }

    pb.finish_and_clear();
    counters.print();
    Ok(counters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    const URL: &str = "https://example.com/2023-24-panini-prizm-basketball-cards";

    fn checklist_html(rows: &str) -> String {
        format!(
            "<html><head><title>2023-24 Panini Prizm Basketball Checklist</title></head>\
             <body><h1>2023-24 Panini Prizm Basketball</h1>{}</body></html>",
            rows
        )
    }

    #[test]
    fn first_ingest_creates_set() {
        let conn = test_conn();
        let html = checklist_html("1 LeBron James - Los Angeles Lakers<br>2 Stephen Curry - Golden State Warriors<br>");
        let outcome = ingest_html(&conn, URL, &html).unwrap();
        assert!(matches!(outcome, PageOutcome::Created(2)));
    }

    #[test]
    fn second_ingest_updates() {
        let conn = test_conn();
        let html = checklist_html("1 LeBron James - Los Angeles Lakers<br>");
        ingest_html(&conn, URL, &html).unwrap();
        let outcome = ingest_html(&conn, URL, &html).unwrap();
        assert!(matches!(outcome, PageOutcome::Updated(1)));
        let sets: usize = conn
            .query_row("SELECT COUNT(*) FROM card_sets", [], |r| r.get(0))
            .unwrap();
        assert_eq!(sets, 1);
    }

    #[test]
    fn zero_entries_keeps_previous_parse() {
        let conn = test_conn();
        let good = checklist_html("1 LeBron James - Los Angeles Lakers<br>");
        ingest_html(&conn, URL, &good).unwrap();

        let empty = checklist_html("<p>Checklist coming soon.</p>");
        let outcome = ingest_html(&conn, URL, &empty).unwrap();
        assert!(matches!(outcome, PageOutcome::ZeroEntries));

        let entries: usize = conn
            .query_row("SELECT COUNT(*) FROM card_entries", [], |r| r.get(0))
            .unwrap();
        assert_eq!(entries, 1, "empty parse must not wipe existing entries");
    }

    #[test]
    fn zero_entries_still_creates_new_set() {
        let conn = test_conn();
        let empty = checklist_html("<p>Checklist coming soon.</p>");
        let outcome = ingest_html(&conn, URL, &empty).unwrap();
        assert!(matches!(outcome, PageOutcome::ZeroEntries));
        let sets: usize = conn
            .query_row("SELECT COUNT(*) FROM card_sets", [], |r| r.get(0))
            .unwrap();
        assert_eq!(sets, 1);
    }

    #[test]
    fn metadata_incomplete_creates_nothing() {
        let conn = test_conn();
        let html = "<html><body><p>1 Player - Team</p></body></html>";
        let outcome = ingest_html(&conn, "https://example.com/no-year-here", html).unwrap();
        assert!(matches!(outcome, PageOutcome::MetadataIncomplete));
        let sets: usize = conn
            .query_row("SELECT COUNT(*) FROM card_sets", [], |r| r.get(0))
            .unwrap();
        assert_eq!(sets, 0);
    }

    fn queue_one(conn: &Connection, url: &str) -> i64 {
        db::queue_pages(
            conn,
            &[db::QueuedPage {
                url: url.into(),
                site: "test".into(),
                kind: "checklist",
                sport_hint: None,
            }],
        )
        .unwrap();
        db::fetch_unvisited(conn, None).unwrap()[0].id
    }

    #[test]
    fn not_found_marks_visited_with_single_record() {
        let conn = test_conn();
        let url = "https://example.com/2024-gone-basketball-cards";
        let page_id = queue_one(&conn, url);

        record_fetch(&conn, page_id, url, &Err(FetchError::NotFound(url.into()))).unwrap();

        // Terminal: the URL leaves the queue for good
        assert!(db::fetch_unvisited(&conn, None).unwrap().is_empty());
        let (attempts, status): (usize, u16) = conn
            .query_row(
                "SELECT COUNT(*), MAX(status) FROM page_data WHERE page_id = ?1",
                [page_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(attempts, 1, "404 is recorded once, never retried");
        assert_eq!(status, 404);
    }

    #[test]
    fn transient_failure_stays_unvisited() {
        let conn = test_conn();
        let url = "https://example.com/2024-flaky-basketball-cards";
        let page_id = queue_one(&conn, url);

        record_fetch(
            &conn,
            page_id,
            url,
            &Err(FetchError::Transient("request failed".into())),
        )
        .unwrap();

        assert_eq!(db::fetch_unvisited(&conn, None).unwrap().len(), 1);
        let error: Option<String> = conn
            .query_row(
                "SELECT error FROM page_data WHERE page_id = ?1",
                [page_id],
                |r| r.get(0),
            )
            .unwrap();
        assert!(error.unwrap().contains("request failed"));
    }

    #[test]
    fn fixture_page_end_to_end() {
        let conn = test_conn();
        let html = include_str!("../tests/fixtures/2023-24-panini-prizm-basketball.html");
        let url = "https://www.cardboardconnection.com/2023-24-panini-prizm-basketball-cards";

        let outcome = ingest_html(&conn, url, html).unwrap();
        assert!(matches!(outcome, PageOutcome::Created(10)));

        let (name, year, sport, maker): (String, String, String, String) = conn
            .query_row(
                "SELECT name, year, sport, manufacturer FROM card_sets WHERE source_url = ?1",
                [url],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(name, "2023-24 Panini Prizm Basketball");
        assert_eq!(year, "2023-24");
        assert_eq!(sport, "basketball");
        assert_eq!(maker, "Panini");

        let autos: usize = conn
            .query_row(
                "SELECT COUNT(*) FROM card_entries WHERE is_autograph = 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(autos, 4);

        // Re-ingest replaces, never duplicates
        let outcome = ingest_html(&conn, url, html).unwrap();
        assert!(matches!(outcome, PageOutcome::Updated(10)));
        let entries: usize = conn
            .query_row("SELECT COUNT(*) FROM card_entries", [], |r| r.get(0))
            .unwrap();
        assert_eq!(entries, 10);
    }

    #[test]
    fn counters_tally_outcomes() {
        let mut c = RunCounters::default();
        c.tally(&PageOutcome::Created(10));
        c.tally(&PageOutcome::Updated(5));
        c.tally(&PageOutcome::ZeroEntries);
        c.tally(&PageOutcome::NotFound);
        c.tally(&PageOutcome::Failed("x".into()));
        assert_eq!(c.processed, 5);
        assert_eq!(c.entries_stored, 15);
        assert_eq!(c.created, 1);
        assert_eq!(c.not_found, 1);
    }
}
