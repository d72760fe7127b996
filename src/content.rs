//! Content normalization for feed entries.
//!
//! Stateless helpers that turn raw entry HTML into display-ready text:
//! tag stripping with image collection, char-budget truncation, source
//! naming from the article URL, and image URL sanity checks.

use std::borrow::Cow;

use scraper::{ElementRef, Html, Node};
use url::Url;

/// Maximum entry title length accepted by both platforms' embed titles.
pub const MAX_TITLE_LENGTH: usize = 256;
/// Maximum summary length shown in a message body.
pub const MAX_SUMMARY_LENGTH: usize = 1024;

/// Ellipsis appended whenever text is truncated
const ELLIPSIS: &str = "...";

/// Domain → display name table, English and Chinese.
/// Subdomains fall back to their parent's entry.
const DOMAIN_SOURCES: &[(&str, &str, &str)] = &[
    ("cnn.com", "CNN", "有线电视新闻网"),
    ("bbc.com", "BBC", "英国广播公司"),
    ("bbc.co.uk", "BBC", "英国广播公司"),
    ("wsj.com", "Wall Street Journal", "华尔街日报"),
    ("foreignaffairs.com", "Foreign Affairs", "外交事务"),
    ("ft.com", "Financial Times", "金融时报"),
    ("reuters.com", "Reuters", "路透社"),
    ("theatlantic.com", "The Atlantic", "大西洋月刊"),
    ("economist.com", "The Economist", "经济学人"),
    ("nytimes.com", "The New York Times", "纽约时报"),
    ("bloomberg.com", "Bloomberg", "彭博社"),
    ("theconversation.com", "The Conversation", "对话"),
    ("nautil.us", "Nautilus", "鹦鹉螺"),
    ("longreads.com", "Longreads", "长读"),
    ("nature.com", "Nature", "《自然》"),
    ("science.org", "Science", "《科学》"),
    ("eff.org", "EFF", "电子前哨基金会"),
    ("ieee.org", "IEEE", "电气和电子工程师协会"),
    ("brookings.edu", "Brookings", "布鲁金斯学会"),
    ("theguardian.com", "The Guardian", "卫报"),
    ("washingtonpost.com", "Washington Post", "华盛顿邮报"),
    ("apnews.com", "AP News", "美联社"),
    ("npr.org", "NPR", "美国公共广播"),
    ("wired.com", "Wired", "连线"),
    ("arstechnica.com", "Ars Technica", "Ars Technica"),
    ("techcrunch.com", "TechCrunch", "TechCrunch"),
    ("theverge.com", "The Verge", "The Verge"),
    ("hackernews.com", "Hacker News", "Hacker News"),
];

/// Processed entry content ready for message composition.
#[derive(Debug, Clone)]
pub struct ProcessedContent {
    pub title: String,
    pub summary: String,
    pub plain_text: String,
    pub images: Vec<String>,
    pub source_name: String,
}

/// Strips HTML down to plain text and collects embedded image URLs.
///
/// `script`, `style`, and `noscript` subtrees are discarded entirely;
/// everything else contributes its text content. Only absolute
/// `http(s)://` values in `<img src>` are collected. Whitespace is
/// collapsed to single spaces.
///
/// Input that contains no `<` at all is passed through (collapsed) without
/// invoking the HTML parser, since feeds routinely put plain text in
/// `<description>`.
pub fn clean_html(html: &str) -> (String, Vec<String>) {
    if html.trim().is_empty() {
        return (String::new(), Vec::new());
    }

    if !html.contains('<') {
        return (collapse_whitespace(html), Vec::new());
    }

    let doc = Html::parse_fragment(html);
    let mut text = String::new();
    let mut images = Vec::new();
    collect_content(doc.root_element(), &mut text, &mut images);

    (collapse_whitespace(&text), images)
}

fn collect_content(element: ElementRef<'_>, text: &mut String, images: &mut Vec<String>) {
    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if matches!(name, "script" | "style" | "noscript") {
                continue;
            }
            if name == "img" {
                if let Some(src) = child_el.value().attr("src") {
                    if src.starts_with("http://") || src.starts_with("https://") {
                        images.push(src.to_string());
                    }
                }
            }
            collect_content(child_el, text, images);
        } else if let Node::Text(t) = child.value() {
            text.push_str(t);
            text.push(' ');
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates text to at most `max_chars` characters, appending "..." when
/// anything was cut.
///
/// Prefers breaking on a whitespace boundary, but only when the boundary
/// falls in the last 30% of the budget; breaking earlier would discard too
/// much. Counts `char`s, not bytes, so multi-byte text never splits inside
/// a codepoint.
///
/// Returns `Cow::Borrowed` when the text already fits (no allocation).
pub fn truncate_text(text: &str, max_chars: usize) -> Cow<'_, str> {
    if text.chars().count() <= max_chars {
        return Cow::Borrowed(text);
    }

    let ellipsis_len = ELLIPSIS.chars().count();
    if max_chars <= ellipsis_len {
        return Cow::Owned(ELLIPSIS.chars().take(max_chars).collect());
    }

    let budget = max_chars - ellipsis_len;
    let cut: String = text.chars().take(budget).collect();

    // Break at the last space when it keeps at least 70% of the budget
    let kept = match cut.rfind(' ') {
        Some(pos) if cut[..pos].chars().count() * 10 >= budget * 7 => &cut[..pos],
        _ => cut.as_str(),
    };

    Cow::Owned(format!("{}{}", kept.trim_end(), ELLIPSIS))
}

/// Resolves a human-readable source name for an article URL.
///
/// Parses the host, strips a leading `www.`, and looks it up in the
/// bilingual domain table (subdomains match their parent). Unknown hosts
/// fall back to the title-cased second-level label ("example.org" →
/// "Example").
pub fn source_name(link: &str, language: &str) -> String {
    let host = match Url::parse(link)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
    {
        Some(h) => h,
        None => return "Unknown".to_string(),
    };

    let domain = host.strip_prefix("www.").unwrap_or(&host);
    let use_chinese = language.starts_with("zh");

    for (known, en, zh) in DOMAIN_SOURCES {
        if domain == *known || domain.ends_with(&format!(".{}", known)) {
            return if use_chinese {
                (*zh).to_string()
            } else {
                (*en).to_string()
            };
        }
    }

    // "news.example.co" → "Example"
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() >= 2 {
        return title_case(labels[labels.len() - 2]);
    }

    domain.to_string()
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Checks whether a URL plausibly points at an image.
///
/// Must be absolute `http(s)` and either carry a known image extension or
/// live on a known image host.
pub fn is_valid_image_url(link: &str) -> bool {
    const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg"];
    const IMAGE_HOSTS: &[&str] = &["imgur.com", "pbs.twimg.com"];

    let url = match Url::parse(link) {
        Ok(u) => u,
        Err(_) => return false,
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        return false;
    }

    let path = url.path().to_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return true;
    }

    let host = url.host_str().unwrap_or("").to_lowercase();
    IMAGE_HOSTS
        .iter()
        .any(|h| host == *h || host.ends_with(&format!(".{}", h)))
        || host.starts_with("media.")
}

/// Processes raw entry fields into display-ready content.
///
/// Prefers full `content` over `summary` for the body text. The title is
/// cleaned only when it actually contains markup.
pub fn process_content(
    title: &str,
    summary: Option<&str>,
    content: Option<&str>,
    link: &str,
    language: &str,
) -> ProcessedContent {
    let clean_title = if title.contains('<') {
        clean_html(title).0
    } else {
        title.to_string()
    };
    let clean_title = truncate_text(&clean_title, MAX_TITLE_LENGTH).into_owned();

    let raw = content.or(summary).unwrap_or("");
    let (plain_text, images) = clean_html(raw);
    let display_summary = truncate_text(&plain_text, MAX_SUMMARY_LENGTH).into_owned();

    ProcessedContent {
        title: clean_title,
        summary: display_summary,
        plain_text,
        images,
        source_name: source_name(link, language),
    }
}
