use std::sync::LazyLock;

use regex::Regex;

use crate::parser::lines::strip_tags;

static YEAR_RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b((?:19|20)\d{2}-\d{2})\b").unwrap());
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").unwrap());
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static H1_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").unwrap());
static BOILERPLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(checklist|cards|set review|set details|details|box info|release date)$")
        .unwrap()
});

/// Sport classification keyword tables, checked in order against the URL
/// plus a leading slice of the page. First match wins.
const SPORT_KEYWORDS: &[(Sport, &[&str])] = &[
    (Sport::Basketball, &["basketball", "nba", "hoops", "wnba"]),
    (Sport::Football, &["football", "nfl", "gridiron"]),
    (Sport::Baseball, &["baseball", "mlb", "bowman"]),
    (Sport::Hockey, &["hockey", "nhl"]),
    (
        Sport::Soccer,
        &["soccer", "uefa", "premier-league", "premier league", "mls", "fifa", "futbol"],
    ),
];

/// Manufacturer keyword table; brand names map to their parent company.
const MANUFACTURER_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Panini",
        &[
            "panini", "prizm", "select", "mosaic", "donruss", "optic", "obsidian", "contenders",
            "immaculate", "national treasures", "spectra", "absolute", "phoenix",
        ],
    ),
    (
        "Topps",
        &["topps", "bowman", "stadium club", "heritage", "allen & ginter", "finest", "chrome"],
    ),
    ("Upper Deck", &["upper deck", "upper-deck", "upperdeck"]),
    ("Leaf", &["leaf"]),
    ("Fleer", &["fleer"]),
];

/// Product-line names, ordered: more specific lines before the generic
/// words they contain (e.g. "Prizm Draft Picks" before "Prizm").
const PRODUCT_LINES: &[&str] = &[
    "Prizm Draft Picks",
    "Chrome Sapphire",
    "Chrome Update",
    "National Treasures",
    "Stadium Club",
    "Allen & Ginter",
    "Prizm",
    "Select",
    "Mosaic",
    "Optic",
    "Chrome",
    "Heritage",
    "Gallery",
    "Donruss",
    "Score",
    "Absolute",
    "Contenders",
    "Immaculate",
    "Obsidian",
    "Phoenix",
    "Spectra",
    "Bowman",
    "Finest",
    "Hoops",
    "Update",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sport {
    Basketball,
    Football,
    Baseball,
    Hockey,
    Soccer,
    Other,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Basketball => "basketball",
            Sport::Football => "football",
            Sport::Baseball => "baseball",
            Sport::Hockey => "hockey",
            Sport::Soccer => "soccer",
            Sport::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetMetadata {
    pub name: String,
    pub year: String,
    pub sport: Sport,
    pub manufacturer: String,
    pub product_line: Option<String>,
}

/// Infer set identity from a checklist page. Returns None when no name or
/// year can be determined — the caller must not create a CardSet for the
/// URL in that case.
pub fn extract(url: &str, html: &str) -> Option<SetMetadata> {
    let title = TITLE_RE
        .captures(html)
        .map(|c| strip_tags(&c[1]))
        .unwrap_or_default();
    let h1 = H1_RE.captures(html).map(|c| strip_tags(&c[1]));

    let name_source = h1.filter(|h| !h.is_empty()).unwrap_or_else(|| title.clone());
    let name = clean_name(&name_source);
    if name.is_empty() {
        return None;
    }

    let year = find_year(url).or_else(|| find_year(&title))?;

    // Sport keywords live in the URL and the top of the page
    let head_slice: String = html.chars().take(4000).collect();
    let haystack = format!("{} {}", url, head_slice).to_lowercase();
    let sport = classify_sport(&haystack);

    let ident = format!("{} {}", url, name).to_lowercase();
    let manufacturer = classify_manufacturer(&ident);
    let product_line = classify_product_line(&ident);

    Some(SetMetadata {
        name,
        year,
        sport,
        manufacturer,
        product_line,
    })
}

/// A season range ("2023-24") is preferred over a bare year.
fn find_year(text: &str) -> Option<String> {
    if let Some(caps) = YEAR_RANGE_RE.captures(text) {
        return Some(caps[1].to_string());
    }
    YEAR_RE.captures(text).map(|c| c[1].to_string())
}

fn clean_name(raw: &str) -> String {
    // Drop site-name suffixes first, then trailing boilerplate words
    let mut name = raw
        .split(" | ")
        .next()
        .unwrap_or(raw)
        .trim()
        .to_string();
    loop {
        let next = BOILERPLATE_RE.replace(&name, "").trim().to_string();
        if next == name {
            break;
        }
        name = next;
    }
    name
}

fn classify_sport(haystack: &str) -> Sport {
    for (sport, keywords) in SPORT_KEYWORDS {
        if keywords.iter().any(|kw| haystack.contains(kw)) {
            return *sport;
        }
    }
    Sport::Other
}

fn classify_manufacturer(ident: &str) -> String {
    for (maker, keywords) in MANUFACTURER_KEYWORDS {
        if keywords.iter().any(|kw| ident.contains(kw)) {
            return maker.to_string();
        }
    }
    "Unknown".to_string()
}

fn classify_product_line(ident: &str) -> Option<String> {
    PRODUCT_LINES
        .iter()
        .find(|line| ident.contains(&line.to_lowercase()))
        .map(|line| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIZM_URL: &str = "https://example.com/2023-24-panini-prizm-basketball-cards";

    fn prizm_html() -> String {
        "<html><head><title>2023-24 Panini Prizm Basketball Cards Checklist | Example Site</title></head>\
         <body><h1>2023-24 Panini Prizm Basketball</h1><p>NBA checklist</p></body></html>"
            .to_string()
    }

    #[test]
    fn full_extraction() {
        let meta = extract(PRIZM_URL, &prizm_html()).unwrap();
        assert_eq!(meta.name, "2023-24 Panini Prizm Basketball");
        assert_eq!(meta.year, "2023-24");
        assert_eq!(meta.sport, Sport::Basketball);
        assert_eq!(meta.manufacturer, "Panini");
        assert_eq!(meta.product_line.as_deref(), Some("Prizm"));
    }

    #[test]
    fn year_range_preferred_over_bare_year() {
        assert_eq!(
            find_year("/2023-24-panini-prizm-basketball"),
            Some("2023-24".to_string())
        );
        assert_eq!(find_year("/2024-topps-chrome"), Some("2024".to_string()));
    }

    #[test]
    fn year_falls_back_to_title() {
        let html = "<html><head><title>2022 Topps Chrome Baseball Checklist</title></head>\
                    <body><h1>Topps Chrome Baseball</h1></body></html>";
        let meta = extract("https://example.com/topps-chrome-baseball-cards", html).unwrap();
        assert_eq!(meta.year, "2022");
        assert_eq!(meta.manufacturer, "Topps");
    }

    #[test]
    fn missing_year_is_incomplete() {
        let html = "<html><head><title>Some Product Checklist</title></head>\
                    <body><h1>Some Product</h1></body></html>";
        assert!(extract("https://example.com/some-product-cards", html).is_none());
    }

    #[test]
    fn missing_name_is_incomplete() {
        let html = "<html><body><p>no title here</p></body></html>";
        assert!(extract("https://example.com/2024-thing", html).is_none());
    }

    #[test]
    fn boilerplate_suffixes_stripped() {
        assert_eq!(
            clean_name("2024 Topps Chrome Baseball Cards Checklist"),
            "2024 Topps Chrome Baseball"
        );
        assert_eq!(
            clean_name("2024 Leaf Metal Draft Set Review | Hobby Site"),
            "2024 Leaf Metal Draft"
        );
    }

    #[test]
    fn sport_defaults_to_other() {
        let html = "<html><head><title>2024 Generic Trading Cards</title></head>\
                    <body><h1>2024 Generic Trading</h1></body></html>";
        let meta = extract("https://example.com/2024-generic-trading-cards", html).unwrap();
        assert_eq!(meta.sport, Sport::Other);
        assert_eq!(meta.manufacturer, "Unknown");
        assert!(meta.product_line.is_none());
    }

    #[test]
    fn soccer_keywords() {
        assert_eq!(classify_sport("2024 panini mls soccer cards"), Sport::Soccer);
        assert_eq!(classify_sport("uefa champions league"), Sport::Soccer);
    }
}
