use std::sync::LazyLock;

use regex::Regex;

static PRINT_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/\s*(\d{1,4})\b").unwrap());
static ROOKIE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\brookies?\b|\brc\b|\bprospects?\b").unwrap());
static AUTOGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bautographs?\b|\bsignatures?\b|\bautos?\b").unwrap());
static INSERT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\binserts?\b|\bmemorabilia\b|\brelics?\b|\bpatch(es)?\b").unwrap()
});
static BASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^base(\s+set)?(\s+checklist)?$|^base\s+cards?$|^veterans\s+base$").unwrap()
});
static TRAILING_BOILERPLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(set\s+)?checklist$|\s+set$|\s*:$").unwrap()
});
static YEAR_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());

/// Parallel color/finish vocabulary, word-boundary matched. Ordering matters
/// only for which keyword names a compound header first.
const PARALLEL_KEYWORDS: &[&str] = &[
    "refractor",
    "prizm",
    "cracked ice",
    "gold",
    "silver",
    "red",
    "blue",
    "green",
    "orange",
    "purple",
    "pink",
    "black",
    "white",
    "bronze",
    "emerald",
    "sapphire",
    "ruby",
    "holo",
    "shimmer",
    "wave",
    "mojo",
    "camo",
    "disco",
    "laser",
    "velocity",
    "hyper",
    "fast break",
    "x-fractor",
    "atomic",
];

/// Classification state carried across lines: the current subset plus the
/// flags every subsequent card row inherits until the next header.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassContext {
    pub subset: String,
    pub is_rookie: bool,
    pub is_autograph: bool,
    pub is_insert: bool,
    pub is_parallel: bool,
    pub parallel_name: Option<String>,
    pub print_run: Option<i32>,
}

impl Default for ClassContext {
    fn default() -> Self {
        ClassContext {
            subset: "Base".to_string(),
            is_rookie: false,
            is_autograph: false,
            is_insert: false,
            is_parallel: false,
            parallel_name: None,
            print_run: None,
        }
    }
}

/// Try the header rules against a short non-row line. Returns true when the
/// line was consumed as a header (state updated, no card emitted).
///
/// Rule order: Base reset, then subset headers (rookie/autograph/insert
/// keywords applied cumulatively, so "Rookie Autographs" sets both flags),
/// then parallel headers (color keyword or /NNN token), which keep the
/// current subset.
pub fn apply_header(line: &str, ctx: &mut ClassContext) -> bool {
    let trimmed = line.trim();

    if BASE_RE.is_match(trimmed) {
        *ctx = ClassContext::default();
        return true;
    }

    let rookie = ROOKIE_RE.is_match(trimmed);
    let autograph = AUTOGRAPH_RE.is_match(trimmed);
    let insert = INSERT_RE.is_match(trimmed);

    if rookie || autograph || insert {
        *ctx = ClassContext {
            subset: clean_subset_name(trimmed),
            is_rookie: rookie,
            is_autograph: autograph,
            is_insert: insert,
            is_parallel: false,
            parallel_name: None,
            print_run: None,
        };
        return true;
    }

    // Set titles ("2023-24 Panini Prizm Basketball") carry color-like brand
    // words; a year token disqualifies a line from being a parallel header.
    if YEAR_TOKEN_RE.is_match(trimmed) {
        return false;
    }

    let print_run = PRINT_RUN_RE
        .captures(trimmed)
        .and_then(|c| c[1].parse::<i32>().ok());
    let lower = trimmed.to_lowercase();
    let has_color = PARALLEL_KEYWORDS.iter().any(|kw| contains_word(&lower, kw));

    if has_color || print_run.is_some() {
        ctx.is_parallel = true;
        ctx.print_run = print_run;
        let name = PRINT_RUN_RE.replace(trimmed, "").trim().to_string();
        ctx.parallel_name = if name.is_empty() {
            None
        } else {
            Some(clean_subset_name(&name))
        };
        return true;
    }

    false
}

fn clean_subset_name(name: &str) -> String {
    TRAILING_BOILERPLATE_RE.replace(name, "").trim().to_string()
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(i, _)| {
        let before_ok = i == 0
            || !haystack[..i]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let after = i + word.len();
        let after_ok = after >= haystack.len()
            || !haystack[after..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric());
        before_ok && after_ok
    })
}
