pub mod base;
pub mod honeycombers_html;
pub mod markdown;
pub mod timeout_html;

use anyhow::{Context, Error};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A title/url/image triple as found on a listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedListing {
    pub title: String,
    pub article_url: String,
    pub image_url: Option<String>,
}

pub trait ListingSource: Send + Sync {
    fn source_id(&self) -> &'static str;
    fn source_name(&self) -> &'static str;
    fn source_url(&self) -> &'static str;
    fn parse_document(&self, html: &str) -> anyhow::Result<Vec<ScrapedListing>>;

    fn fetch(&self) -> anyhow::Result<Vec<ScrapedListing>> {
        let html = base::fetch_html(self.source_url())?;
        self.parse_document(&html)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
    pub url: String,
}

fn active_sources() -> Vec<Box<dyn ListingSource>> {
    vec![
        Box::new(timeout_html::TimeOutSingapore),
        Box::new(honeycombers_html::Honeycombers),
    ]
}

pub fn list_sources() -> Vec<SourceInfo> {
    active_sources()
        .into_iter()
        .map(|source| SourceInfo {
            id: source.source_id().to_string(),
            name: source.source_name().to_string(),
            url: source.source_url().to_string(),
        })
        .collect()
}

fn find_source(id: &str) -> Option<Box<dyn ListingSource>> {
    active_sources()
        .into_iter()
        .find(|source| source.source_id() == id)
}

pub fn run_all() -> anyhow::Result<Vec<ScrapedListing>> {
    let mut listings = Vec::new();
    let mut errors: Vec<(String, Error)> = Vec::new();

    for source in active_sources() {
        let source_id = source.source_id().to_string();
        match source.fetch() {
            Ok(mut scraped) => listings.append(&mut scraped),
            Err(err) => {
                tracing::warn!(source = %source_id, error = %err, "listing source failed");
                errors.push((source_id, err));
            }
        }
    }

    if listings.is_empty() && !errors.is_empty() {
        let joined = errors
            .into_iter()
            .map(|(id, err)| format!("{id}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(anyhow::anyhow!("sources failed: {joined}"));
    }

    Ok(listings)
}

pub fn run_single(id: &str) -> anyhow::Result<Vec<ScrapedListing>> {
    let source = find_source(id).ok_or_else(|| anyhow::anyhow!("unknown source id: {id}"))?;
    source.fetch()
}

/// Fetches a listing's article page for extraction.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> anyhow::Result<String>;
}

pub struct HttpPageSource;

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, url: &str) -> anyhow::Result<String> {
        let owned = url.to_string();
        tokio::task::spawn_blocking(move || base::fetch_html(&owned))
            .await
            .with_context(|| format!("fetch task failed for {url}"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lists_every_source() {
        let ids = list_sources()
            .into_iter()
            .map(|info| info.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["timeout_sg".to_string(), "honeycombers".to_string()]);
        assert!(find_source("timeout_sg").is_some());
        assert!(run_single("nowhere").is_err());
    }
}
