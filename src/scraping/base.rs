use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use scraper::{ElementRef, Html, Selector};

use super::ScrapedListing;

const IMAGE_ATTRS: [&str; 4] = ["src", "data-src", "data-lazy-src", "data-original"];

pub fn clean_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(inner_text)
        .filter(|text| !text.is_empty())
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

/// First usable image URL, looking through lazy-loading attributes too.
pub fn image_src(element: ElementRef<'_>) -> Option<String> {
    IMAGE_ATTRS
        .iter()
        .filter_map(|attr| element.value().attr(attr))
        .map(str::trim)
        .find(|src| !src.is_empty() && !src.starts_with("data:"))
        .map(str::to_string)
}

pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}

pub fn fetch_html(url: &str) -> Result<String> {
    static CLIENT: Lazy<Client> = Lazy::new(|| {
        Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent("sg-events/0.1 (+https://github.com/sg-events/sg-events)")
            .build()
            .expect("http client")
    });

    let response = CLIENT
        .get(url)
        .send()
        .with_context(|| format!("request failed for {url}"))?;
    let response = response
        .error_for_status()
        .with_context(|| format!("non-success status for {url}"))?;
    response
        .text()
        .with_context(|| format!("unable to read response body for {url}"))
}

/// Where listing cards and their parts live on a page.
pub struct CardLayout<'a> {
    pub card: &'a Selector,
    pub title: &'a Selector,
    pub link: &'a Selector,
    pub image: &'a Selector,
}

/// Collect one listing per card; cards missing a title or link are skipped
/// and repeated article URLs keep their first occurrence.
pub fn parse_cards(html: &str, base_url: &str, layout: &CardLayout<'_>) -> Vec<ScrapedListing> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut listings = Vec::new();

    for card in document.select(layout.card) {
        let image = card.select(layout.image).next();
        let title = first_text(&card, layout.title).or_else(|| {
            image
                .and_then(|img| img.value().attr("alt"))
                .map(clean_text)
                .filter(|alt| !alt.is_empty())
        });
        let title = match title {
            Some(title) => title,
            None => continue,
        };

        let article_url = match absolute_url(base_url, first_attr(&card, layout.link, "href")) {
            Some(url) => url,
            None => continue,
        };
        if !seen.insert(article_url.clone()) {
            continue;
        }

        let image_url = image.and_then(|img| absolute_url(base_url, image_src(img)));

        listings.push(ScrapedListing {
            title,
            article_url,
            image_url,
        });
    }

    listings
}
