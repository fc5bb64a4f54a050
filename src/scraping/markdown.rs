use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::base::{absolute_url, clean_text, image_src, inner_text};

static ROOT_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["article", "main", "body"]
        .iter()
        .map(|s| Selector::parse(s).expect("root selector"))
        .collect()
});
static BLOCK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4, p, li, img").expect("block selector"));
static OG_IMAGE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[property="og:image"]"#).expect("og image selector")
});
static PAGE_TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("title selector"));
static IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*\]\((https?://[^)\s]+)\)").expect("image regex"));

/// Flatten an article page into the markdown the extractor reads.
///
/// Only headings, paragraphs, list items and images are kept; navigation,
/// scripts and styling never reach the model. Relative image URLs are
/// resolved against `base_url`.
pub fn html_to_markdown(html: &str, base_url: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines: Vec<String> = Vec::new();

    if let Some(og) = document
        .select(&OG_IMAGE_SELECTOR)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .and_then(|src| absolute_url(base_url, Some(src.to_string())))
    {
        lines.push(format!("![]({og})"));
    }

    let root = ROOT_SELECTORS
        .iter()
        .find_map(|selector| document.select(selector).next());
    let root = match root {
        Some(root) => root,
        None => return lines.join("\n\n"),
    };

    let has_h1 = root
        .select(&BLOCK_SELECTOR)
        .any(|el| el.value().name() == "h1");
    if !has_h1 {
        if let Some(title) = document
            .select(&PAGE_TITLE_SELECTOR)
            .next()
            .map(inner_text)
            .filter(|t| !t.is_empty())
        {
            lines.push(format!("# {title}"));
        }
    }

    for element in root.select(&BLOCK_SELECTOR) {
        if let Some(line) = block_line(element, base_url) {
            lines.push(line);
        }
    }

    lines.join("\n\n")
}

fn block_line(element: ElementRef<'_>, base_url: &str) -> Option<String> {
    let name = element.value().name();
    if name == "img" {
        let src = absolute_url(base_url, image_src(element))?;
        let alt = clean_text(element.value().attr("alt").unwrap_or_default());
        return Some(format!("![{alt}]({src})"));
    }

    // List items already carry their paragraph text.
    if name == "p" && inside_list_item(element) {
        return None;
    }

    let text = inner_text(element);
    if text.is_empty() {
        return None;
    }
    let line = match name {
        "h1" => format!("# {text}"),
        "h2" => format!("## {text}"),
        "h3" => format!("### {text}"),
        "h4" => format!("#### {text}"),
        "li" => format!("- {text}"),
        _ => text,
    };
    Some(line)
}

fn inside_list_item(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| ancestor.value().name() == "li")
}

/// Unique absolute image URLs in order of appearance.
pub fn extract_images(markdown: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    IMAGE_RE
        .captures_iter(markdown)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

pub fn extract_title(markdown: &str) -> Option<String> {
    markdown
        .lines()
        .find_map(|line| line.trim().strip_prefix("# "))
        .map(clean_text)
        .filter(|title| !title.is_empty())
}
