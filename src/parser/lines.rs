use std::sync::LazyLock;

use regex::Regex;

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());
static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</p>|</li>|</tr>|</div>|</h[1-6]>|</td>").unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// The finite entity vocabulary seen on checklist pages. Dash variants all
/// map to an ASCII hyphen so the row splitter only has one separator form.
const ENTITIES: &[(&str, &str)] = &[
    ("&#8211;", "-"),
    ("&#8212;", "-"),
    ("&ndash;", "-"),
    ("&mdash;", "-"),
    ("&#8216;", "'"),
    ("&#8217;", "'"),
    ("&rsquo;", "'"),
    ("&lsquo;", "'"),
    ("&#8220;", "\""),
    ("&#8221;", "\""),
    ("&ldquo;", "\""),
    ("&rdquo;", "\""),
    ("&nbsp;", " "),
    ("&#160;", " "),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&amp;", "&"),
];

const MIN_LINE_LEN: usize = 3;

/// Split an HTML document into candidate checklist lines: body only,
/// entities decoded, block boundaries turned into newlines, tags stripped,
/// whitespace collapsed, blank/too-short lines dropped.
pub fn html_to_lines(html: &str) -> Vec<String> {
    let body = extract_body(html);
    let body = SCRIPT_RE.replace_all(body, " ");
    let body = STYLE_RE.replace_all(&body, " ");
    let body = COMMENT_RE.replace_all(&body, " ");
    let body = BREAK_RE.replace_all(&body, "\n");
    let body = TAG_RE.replace_all(&body, " ");
    let body = decode_entities(&body);

    body.lines()
        .map(|l| WS_RE.replace_all(l.trim(), " ").to_string())
        .filter(|l| l.len() >= MIN_LINE_LEN)
        .collect()
}

fn extract_body(html: &str) -> &str {
    let start = html
        .find("<body")
        .and_then(|i| html[i..].find('>').map(|j| i + j + 1))
        .unwrap_or(0);
    let end = html.rfind("</body>").unwrap_or(html.len());
    if start < end {
        &html[start..end]
    } else {
        html
    }
}

pub fn decode_entities(text: &str) -> String {
    let mut out = text.to_string();
    for (entity, replacement) in ENTITIES {
        if out.contains(entity) {
            out = out.replace(entity, replacement);
        }
    }
    out
}

/// Strip tags and collapse whitespace in a single fragment (titles, headings).
pub fn strip_tags(fragment: &str) -> String {
    let stripped = TAG_RE.replace_all(fragment, " ");
    WS_RE.replace_all(decode_entities(&stripped).trim(), " ").to_string()
}
