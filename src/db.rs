use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;

use crate::metadata::SetMetadata;
use crate::parser::CardEntry;

/// Batch size for entry inserts. The statements run inside one transaction
/// either way; chunking only bounds statement-building cost.
const INSERT_CHUNK: usize = 100;

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(dir) = Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pages (
            id         INTEGER PRIMARY KEY,
            url        TEXT UNIQUE NOT NULL,
            site       TEXT NOT NULL,
            kind       TEXT NOT NULL DEFAULT 'checklist' CHECK(kind IN ('checklist','index')),
            sport_hint TEXT,
            visited    BOOLEAN NOT NULL DEFAULT 0,
            visited_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_pages_visited ON pages(visited);

        CREATE TABLE IF NOT EXISTS page_data (
            id         INTEGER PRIMARY KEY,
            page_id    INTEGER NOT NULL REFERENCES pages(id),
            url        TEXT NOT NULL,
            html       TEXT,
            status     INTEGER,
            error      TEXT,
            latency_ms INTEGER,
            fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_page_data_page ON page_data(page_id);

        CREATE TABLE IF NOT EXISTS card_sets (
            id           INTEGER PRIMARY KEY,
            source_url   TEXT UNIQUE NOT NULL,
            name         TEXT NOT NULL,
            year         TEXT NOT NULL,
            sport        TEXT NOT NULL,
            manufacturer TEXT NOT NULL,
            product_line TEXT,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_sets_sport_year ON card_sets(sport, year);

        CREATE TABLE IF NOT EXISTS card_entries (
            id            INTEGER PRIMARY KEY,
            set_id        INTEGER NOT NULL REFERENCES card_sets(id),
            card_number   TEXT NOT NULL,
            player_name   TEXT NOT NULL,
            team          TEXT,
            subset_name   TEXT NOT NULL DEFAULT 'Base',
            parallel_name TEXT,
            print_run     INTEGER,
            is_rookie     BOOLEAN NOT NULL DEFAULT 0,
            is_autograph  BOOLEAN NOT NULL DEFAULT 0,
            is_insert     BOOLEAN NOT NULL DEFAULT 0,
            is_parallel   BOOLEAN NOT NULL DEFAULT 0,
            UNIQUE(set_id, card_number, player_name, subset_name)
        );
        CREATE INDEX IF NOT EXISTS idx_entries_set ON card_entries(set_id);
        CREATE INDEX IF NOT EXISTS idx_entries_player ON card_entries(player_name);

        CREATE TABLE IF NOT EXISTS sales (
            item_id     TEXT PRIMARY KEY,
            entry_id    INTEGER REFERENCES card_entries(id),
            query       TEXT NOT NULL,
            title       TEXT NOT NULL,
            price       REAL NOT NULL,
            currency    TEXT NOT NULL,
            sale_type   TEXT NOT NULL,
            bid_count   INTEGER,
            sale_date   TEXT,
            image_url   TEXT,
            recorded_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_sales_entry ON sales(entry_id);
        ",
    )?;
    Ok(())
}

// ── URL queue ──

pub struct QueuedPage {
    pub url: String,
    pub site: String,
    pub kind: &'static str,
    pub sport_hint: Option<String>,
}

/// Insert discovered URLs; the UNIQUE(url) constraint makes this the
/// durable visited set across runs. Returns how many were new.
pub fn queue_pages(conn: &Connection, pages: &[QueuedPage]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO pages (url, site, kind, sport_hint) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for p in pages {
            count += stmt.execute(rusqlite::params![p.url, p.site, p.kind, p.sport_hint])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub struct PendingPage {
    pub id: i64,
    pub url: String,
    pub site: String,
}

pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<PendingPage>> {
    let sql = format!(
        "SELECT id, url, site FROM pages
         WHERE visited = 0 AND kind = 'checklist'
         ORDER BY id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PendingPage {
                id: row.get(0)?,
                url: row.get(1)?,
                site: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn mark_visited(conn: &Connection, page_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE pages SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
        [page_id],
    )?;
    Ok(())
}

// ── Raw fetch results ──

pub struct FetchRecord {
    pub page_id: i64,
    pub url: String,
    pub html: Option<String>,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

pub fn insert_page_data(conn: &Connection, rec: &FetchRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO page_data (page_id, url, html, status, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![rec.page_id, rec.url, rec.html, rec.status, rec.error, rec.latency_ms],
    )?;
    Ok(())
}

pub struct StoredPage {
    pub url: String,
    pub html: String,
}

/// Most recent successful fetch per URL, for offline re-parsing.
pub fn fetch_stored_pages(conn: &Connection, limit: Option<usize>) -> Result<Vec<StoredPage>> {
    let sql = format!(
        "SELECT url, html FROM page_data
         WHERE html IS NOT NULL
           AND id IN (SELECT MAX(id) FROM page_data WHERE html IS NOT NULL GROUP BY url)
         ORDER BY id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StoredPage {
                url: row.get(0)?,
                html: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Catalog repository ──

/// Look up or create the CardSet for a source URL. Uniqueness is enforced
/// by the UNIQUE(source_url) constraint, so concurrent callers cannot
/// create duplicates. Returns (set_id, created).
pub fn get_or_create_set(
    conn: &Connection,
    source_url: &str,
    meta: &SetMetadata,
) -> Result<(i64, bool)> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO card_sets (source_url, name, year, sport, manufacturer, product_line)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            source_url,
            meta.name,
            meta.year,
            meta.sport.as_str(),
            meta.manufacturer,
            meta.product_line,
        ],
    )?;
    let id: i64 = conn.query_row(
        "SELECT id FROM card_sets WHERE source_url = ?1",
        [source_url],
        |r| r.get(0),
    )?;
    Ok((id, inserted > 0))
}

/// Full-replace semantics: delete every entry for the set, insert the new
/// batch, all inside one transaction. A crash mid-replace leaves the
/// previous entries intact, never a half-replaced or emptied set. Recorded
/// sales are detached from the outgoing entries, not deleted; the next
/// sales pass re-links them against the fresh entries.
pub fn replace_entries(conn: &Connection, set_id: i64, entries: &[CardEntry]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE sales SET entry_id = NULL
         WHERE entry_id IN (SELECT id FROM card_entries WHERE set_id = ?1)",
        [set_id],
    )?;
    tx.execute("DELETE FROM card_entries WHERE set_id = ?1", [set_id])?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO card_entries
             (set_id, card_number, player_name, team, subset_name, parallel_name, print_run,
              is_rookie, is_autograph, is_insert, is_parallel)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;
        for chunk in entries.chunks(INSERT_CHUNK) {
            for e in chunk {
                count += stmt.execute(rusqlite::params![
                    set_id,
                    e.card_number,
                    e.player_name,
                    e.team,
                    e.subset_name,
                    e.parallel_name,
                    e.print_run,
                    e.is_rookie,
                    e.is_autograph,
                    e.is_insert,
                    e.is_parallel,
                ])?;
            }
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn entry_count(conn: &Connection, set_id: i64) -> Result<usize> {
    let n: usize = conn.query_row(
        "SELECT COUNT(*) FROM card_entries WHERE set_id = ?1",
        [set_id],
        |r| r.get(0),
    )?;
    Ok(n)
}

// ── Sales (sibling pipeline) ──

pub struct SaleTarget {
    pub entry_id: i64,
    pub player_name: String,
    pub set_name: String,
    pub year: String,
}

/// Entries to price, newest sets first, skipping entries that already have
/// recorded sales.
pub fn fetch_sale_targets(conn: &Connection, limit: Option<usize>) -> Result<Vec<SaleTarget>> {
    let sql = format!(
        "SELECT e.id, e.player_name, s.name, s.year
         FROM card_entries e
         JOIN card_sets s ON s.id = e.set_id
         WHERE NOT EXISTS (SELECT 1 FROM sales WHERE sales.entry_id = e.id)
         ORDER BY s.year DESC, e.id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(SaleTarget {
                entry_id: row.get(0)?,
                player_name: row.get(1)?,
                set_name: row.get(2)?,
                year: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct SaleRow {
    pub item_id: String,
    pub entry_id: Option<i64>,
    pub query: String,
    pub title: String,
    pub price: f64,
    pub currency: String,
    pub sale_type: String,
    pub bid_count: Option<i32>,
    pub sale_date: Option<String>,
    pub image_url: Option<String>,
}

/// Upsert keyed by the listing's item id; re-scrapes refresh rather than
/// duplicate.
pub fn upsert_sales(conn: &Connection, rows: &[SaleRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO sales
             (item_id, entry_id, query, title, price, currency, sale_type, bid_count, sale_date, image_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for r in rows {
            count += stmt.execute(rusqlite::params![
                r.item_id,
                r.entry_id,
                r.query,
                r.title,
                r.price,
                r.currency,
                r.sale_type,
                r.bid_count,
                r.sale_date,
                r.image_url,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Stats / overview ──

pub struct Stats {
    pub queued: usize,
    pub visited: usize,
    pub unvisited: usize,
    pub fetched: usize,
    pub fetch_errors: usize,
    pub sets: usize,
    pub entries: usize,
    pub sales: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let queued: usize = conn.query_row("SELECT COUNT(*) FROM pages", [], |r| r.get(0))?;
    let visited: usize =
        conn.query_row("SELECT COUNT(*) FROM pages WHERE visited = 1", [], |r| r.get(0))?;
    let fetched: usize = conn.query_row("SELECT COUNT(*) FROM page_data", [], |r| r.get(0))?;
    let fetch_errors: usize = conn.query_row(
        "SELECT COUNT(*) FROM page_data WHERE error IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let sets: usize = conn.query_row("SELECT COUNT(*) FROM card_sets", [], |r| r.get(0))?;
    let entries: usize = conn.query_row("SELECT COUNT(*) FROM card_entries", [], |r| r.get(0))?;
    let sales: usize = conn.query_row("SELECT COUNT(*) FROM sales", [], |r| r.get(0))?;
    Ok(Stats {
        queued,
        visited,
        unvisited: queued - visited,
        fetched,
        fetch_errors,
        sets,
        entries,
        sales,
    })
}

pub struct OverviewRow {
    pub name: String,
    pub year: String,
    pub sport: String,
    pub manufacturer: String,
    pub product_line: String,
    pub entry_count: usize,
}

pub fn fetch_overview(
    conn: &Connection,
    sport: Option<&str>,
    year: Option<&str>,
    limit: usize,
) -> Result<Vec<OverviewRow>> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(s) = sport {
        conditions.push(format!("s.sport = ?{}", params.len() + 1));
        params.push(Box::new(s.to_string()));
    }
    if let Some(y) = year {
        conditions.push(format!("s.year = ?{}", params.len() + 1));
        params.push(Box::new(y.to_string()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT s.name, s.year, s.sport, s.manufacturer, COALESCE(s.product_line, ''),
                (SELECT COUNT(*) FROM card_entries e WHERE e.set_id = s.id)
         FROM card_sets s{}
         ORDER BY s.year DESC, s.name
         LIMIT {}",
        where_clause, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(OverviewRow {
                name: row.get(0)?,
                year: row.get(1)?,
                sport: row.get(2)?,
                manufacturer: row.get(3)?,
                product_line: row.get(4)?,
                entry_count: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
