pub mod headers;
pub mod lines;
pub mod rows;

use std::collections::HashSet;

use headers::ClassContext;

/// One card variant as parsed from a checklist page. No ids here; the
/// repository attaches the owning set on persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct CardEntry {
    pub card_number: String,
    pub player_name: String,
    pub team: Option<String>,
    pub subset_name: String,
    pub parallel_name: Option<String>,
    pub print_run: Option<i32>,
    pub is_rookie: bool,
    pub is_autograph: bool,
    pub is_insert: bool,
    pub is_parallel: bool,
}

/// Lines at or above this length are never considered headers.
const HEADER_MAX_LEN: usize = 40;

/// Single-pass line state machine over a checklist page.
///
/// Each line is either a header (updates the classification context and is
/// consumed) or a candidate card row (emitted with the current context
/// merged with its own inline RC/AU markers). Lines matching neither are
/// dropped. Repeats of `(card_number, player_name, subset_name)` are
/// silently discarded. An empty result is a valid outcome.
pub fn parse(html: &str) -> Vec<CardEntry> {
    let mut ctx = ClassContext::default();
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    let mut out = Vec::new();

    for line in lines::html_to_lines(html) {
        if line.len() < HEADER_MAX_LEN
            && !rows::looks_like_row(&line)
            && headers::apply_header(&line, &mut ctx)
        {
            continue;
        }

        let Some(row) = rows::parse_row(&line) else {
            continue;
        };

        let key = (
            row.card_number.clone(),
            row.player_name.clone(),
            ctx.subset.clone(),
        );
        if !seen.insert(key) {
            continue;
        }

        out.push(CardEntry {
            card_number: row.card_number,
            player_name: row.player_name,
            team: row.team,
            subset_name: ctx.subset.clone(),
            parallel_name: ctx.parallel_name.clone(),
            print_run: ctx.print_run,
            is_rookie: ctx.is_rookie || row.inline_rookie,
            is_autograph: ctx.is_autograph || row.inline_autograph,
            is_insert: ctx.is_insert,
            is_parallel: ctx.is_parallel,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> String {
        format!("<html><body>{}</body></html>", body)
    }

    #[test]
    fn default_state_row() {
        let html = page("17 Jayson Tatum - Boston Celtics<br>");
        let entries = parse(&html);
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.card_number, "17");
        assert_eq!(e.player_name, "Jayson Tatum");
        assert_eq!(e.team.as_deref(), Some("Boston Celtics"));
        assert_eq!(e.subset_name, "Base");
        assert!(!e.is_rookie);
    }

    #[test]
    fn rookie_autographs_header_applies() {
        let html = page(
            "Rookie Autographs<br>RA-5 Victor Wembanyama - San Antonio Spurs<br>",
        );
        let entries = parse(&html);
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.subset_name, "Rookie Autographs");
        assert!(e.is_rookie);
        assert!(e.is_autograph);
        assert_eq!(e.card_number, "RA-5");
    }

    #[test]
    fn base_header_resets_flags() {
        let html = page(
            "Rookie Autographs<br>\
             RA-1 Some Rookie - Team A<br>\
             Base<br>\
             1 Veteran Player - Team B<br>",
        );
        let entries = parse(&html);
        assert_eq!(entries.len(), 2);
        let base = &entries[1];
        assert_eq!(base.subset_name, "Base");
        assert!(!base.is_rookie);
        assert!(!base.is_autograph);
        assert!(!base.is_insert);
    }

    #[test]
    fn duplicates_dropped() {
        let html = page(
            "17 Jayson Tatum - Boston Celtics<br>\
             17 Jayson Tatum - Boston Celtics<br>",
        );
        assert_eq!(parse(&html).len(), 1);
    }

    #[test]
    fn same_number_different_subset_kept() {
        let html = page(
            "17 Jayson Tatum - Boston Celtics<br>\
             Inserts<br>\
             17 Jayson Tatum - Boston Celtics<br>",
        );
        let entries = parse(&html);
        assert_eq!(entries.len(), 2);
        assert!(entries[1].is_insert);
    }

    #[test]
    fn parallel_header_carries_print_run() {
        let html = page(
            "Gold /10<br>\
             3 Anthony Edwards - Minnesota Timberwolves<br>",
        );
        let entries = parse(&html);
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert!(e.is_parallel);
        assert_eq!(e.parallel_name.as_deref(), Some("Gold"));
        assert_eq!(e.print_run, Some(10));
        assert_eq!(e.subset_name, "Base");
    }

    #[test]
    fn zero_entries_is_valid() {
        let html = page("<h1>2025 Product</h1><p>Checklist coming soon.</p>");
        assert!(parse(&html).is_empty());
    }

    #[test]
    fn alphanumeric_numbers_opaque() {
        let html = page("BA-12 Shohei Ohtani - Los Angeles Angels<br>");
        assert_eq!(parse(&html)[0].card_number, "BA-12");
    }

    #[test]
    fn inline_rc_overrides_base_state() {
        let html = page("280 Victor Wembanyama RC - San Antonio Spurs<br>");
        let e = &parse(&html)[0];
        assert!(e.is_rookie);
        assert_eq!(e.subset_name, "Base");
    }

    #[test]
    fn full_page_fixture() {
        let html = include_str!("../../tests/fixtures/2023-24-panini-prizm-basketball.html");
        let entries = parse(html);
        assert_eq!(entries.len(), 10);

        let base: Vec<_> = entries.iter().filter(|e| e.subset_name == "Base").collect();
        assert_eq!(base.len(), 4, "dup Tatum and the checklist card must be dropped");
        assert!(base.iter().any(|e| e.card_number == "136" && e.is_rookie));
        assert!(base.iter().all(|e| !e.is_parallel));

        let sigs: Vec<_> = entries
            .iter()
            .filter(|e| e.subset_name == "Sensational Signatures")
            .collect();
        assert_eq!(sigs.len(), 2);
        assert!(sigs.iter().all(|e| e.is_autograph && !e.is_rookie));

        let rookie_autos: Vec<_> = entries
            .iter()
            .filter(|e| e.subset_name == "Rookie Autographs")
            .collect();
        assert_eq!(rookie_autos.len(), 2);
        assert!(rookie_autos.iter().all(|e| e.is_rookie && e.is_autograph));
        assert!(rookie_autos.iter().any(|e| e.card_number == "RA-5"
            && e.player_name == "Victor Wembanyama"
            && e.team.as_deref() == Some("San Antonio Spurs")));

        let inserts: Vec<_> = entries
            .iter()
            .filter(|e| e.subset_name == "Kaboom Inserts")
            .collect();
        assert_eq!(inserts.len(), 2);
        assert!(inserts.iter().all(|e| e.is_insert));
    }

    #[test]
    fn long_title_line_does_not_become_header() {
        let html = page(
            "2023-24 Panini Prizm Basketball Checklist and Set Details<br>\
             1 LeBron James - Los Angeles Lakers<br>",
        );
        let entries = parse(&html);
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].is_parallel);
        assert_eq!(entries[0].subset_name, "Base");
    }
}
