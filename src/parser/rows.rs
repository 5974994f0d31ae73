use std::sync::LazyLock;

use regex::Regex;

// Row patterns, tried in order; first match wins. Alphanumeric prefixes
// ("BA-1") must be tried before the plain numeric form so the prefix is
// never split off as a stray token.
static ALNUM_ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]{1,6}-\d+[A-Za-z]?)[\s.:]+(.+)$").unwrap());
static DOTTED_ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#?(\d+[A-Za-z]?)\.\s+(.+)$").unwrap());
static NUMERIC_ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#?(\d+[A-Za-z]?)\s+(.+)$").unwrap());

static INLINE_ROOKIE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(RC\)|\bRC\b").unwrap());
static INLINE_AUTOGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(AU\)|\bAU\b|\bAUTO\b").unwrap());
static TRAILING_PAREN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)\s*$").unwrap());
static TRAILING_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\s+(RC|AU|AUTO|SP|SSP))+$").unwrap());

/// Captures whose "player" slot is page structure, not a player.
const STRUCTURAL_NAMES: &[&str] = &[
    "checklist",
    "header",
    "team card",
    "team checklist",
    "intro",
    "cover card",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub card_number: String,
    pub player_name: String,
    pub team: Option<String>,
    pub inline_rookie: bool,
    pub inline_autograph: bool,
}

/// True when the line starts with a card-number token. Used to keep
/// card rows out of header classification.
pub fn looks_like_row(line: &str) -> bool {
    ALNUM_ROW_RE.is_match(line) || DOTTED_ROW_RE.is_match(line) || NUMERIC_ROW_RE.is_match(line)
}

/// Try the ordered row patterns against one line. The card number is kept
/// as an opaque string ("BA-1" round-trips exactly).
pub fn parse_row(line: &str) -> Option<ParsedRow> {
    let caps = ALNUM_ROW_RE
        .captures(line)
        .or_else(|| DOTTED_ROW_RE.captures(line))
        .or_else(|| NUMERIC_ROW_RE.captures(line))?;

    let card_number = caps[1].to_string();
    let rest = caps[2].trim();

    // "2025 Product Name" is a set title, not card #2025. Year-shaped
    // numbers only count as card numbers when a player/team separator
    // confirms the row shape.
    if is_year_shaped(&card_number) && !rest.contains(" - ") && !rest.contains(", ") {
        return None;
    }

    let inline_rookie = INLINE_ROOKIE_RE.is_match(rest);
    let inline_autograph = INLINE_AUTOGRAPH_RE.is_match(rest);

    let (player_raw, team_raw) = split_player_team(rest);
    let player_name = clean_fragment(&player_raw);
    if player_name.is_empty() || !player_name.chars().any(|c| c.is_alphabetic()) {
        return None;
    }
    let lower = player_name.to_lowercase();
    if STRUCTURAL_NAMES.contains(&lower.as_str()) {
        return None;
    }

    let team = team_raw
        .map(|t| clean_fragment(&t))
        .filter(|t| !t.is_empty());

    Some(ParsedRow {
        card_number,
        player_name,
        team,
        inline_rookie,
        inline_autograph,
    })
}

fn is_year_shaped(number: &str) -> bool {
    number.len() == 4
        && (number.starts_with("19") || number.starts_with("20"))
        && number.chars().all(|c| c.is_ascii_digit())
}

/// Split "Player Name - Team" / "Player Name, Team" into its halves.
/// The dash form wins because team names themselves can contain commas.
fn split_player_team(rest: &str) -> (String, Option<String>) {
    if let Some(idx) = rest.find(" - ") {
        let (player, team) = rest.split_at(idx);
        return (player.to_string(), Some(team[3..].to_string()));
    }
    if let Some(idx) = rest.find(", ") {
        let (player, team) = rest.split_at(idx);
        return (player.to_string(), Some(team[2..].to_string()));
    }
    (rest.to_string(), None)
}

/// Strip trailing parenthetical annotations and RC/AU style markers.
fn clean_fragment(raw: &str) -> String {
    let mut s = raw.trim().to_string();
    loop {
        let cleaned = TRAILING_PAREN_RE.replace(&s, "").to_string();
        let cleaned = TRAILING_MARKER_RE.replace(&cleaned, "").trim().to_string();
        if cleaned == s {
            break;
        }
        s = cleaned;
    }
    s
}
