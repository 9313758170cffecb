// src/text.rs
//! Text cleanup shared by the fetchers and the classifier.

use once_cell::sync::OnceCell;
use regex::Regex;

const MAX_BODY_CHARS: usize = 1500;

/// Turn feed/page markup into plain text: decode entities, drop tags, fold
/// typographic quotes, collapse whitespace.
pub fn plain_text(s: &str) -> String {
    // 1) Tags become spaces so "<p>a</p><p>b</p>" does not glue words.
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z!][^>]*>").unwrap());
    let mut out = re_tags.replace_all(s, " ").to_string();

    // 2) HTML entity decode (after tag removal so "&lt;b&gt;" stays literal)
    out = html_escape::decode_html_entities(&out).to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{00A0}', " ");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > MAX_BODY_CHARS {
        out = out.chars().take(MAX_BODY_CHARS).collect();
    }
    out
}

/// Lowercase + condensed spaces; the form every phrase match runs on.
pub fn fold(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.extend(ch.to_lowercase());
            last_space = false;
        }
    }
    out.trim().to_string()
}

/// Case- and whitespace-insensitive substring test. `haystack` must already be folded.
pub fn contains_folded(haystack: &str, phrase: &str) -> bool {
    let p = fold(phrase);
    !p.is_empty() && haystack.contains(p.as_str())
}

/// Rewrite HTML named entities into something an XML parser accepts.
///
/// Typographic entities fold to ASCII. Any other `&name;` outside XML's five
/// is decoded to its character, and names HTML does not know either become
/// literal text.
pub fn scrub_html_entities_for_xml(s: &str) -> String {
    let folded = s
        .replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...");

    static RE_ENTITY: OnceCell<Regex> = OnceCell::new();
    let re = RE_ENTITY.get_or_init(|| Regex::new(r"&([A-Za-z][A-Za-z0-9]*);").unwrap());
    re.replace_all(&folded, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        if matches!(name, "amp" | "lt" | "gt" | "quot" | "apos") {
            return caps[0].to_string();
        }
        let decoded = html_escape::decode_html_entities(&caps[0]);
        if decoded == caps[0] {
            format!("&amp;{name};")
        } else {
            html_escape::encode_text(&decoded).into_owned()
        }
    })
    .into_owned()
}
