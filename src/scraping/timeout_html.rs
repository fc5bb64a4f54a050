use anyhow::Result;
use once_cell::sync::Lazy;
use scraper::Selector;

use super::base::{self, CardLayout};
use super::{ListingSource, ScrapedListing};

const URL: &str = "https://www.timeout.com/singapore/things-to-do/best-things-to-do-in-singapore-this-week";
const SOURCE_ID: &str = "timeout_sg";
const SOURCE_NAME: &str = "Time Out Singapore";

static CARD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article.tile").expect("timeout card selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3, .card-title").expect("timeout title"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("timeout link"));
static IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("timeout image"));

pub struct TimeOutSingapore;

impl ListingSource for TimeOutSingapore {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn source_url(&self) -> &'static str {
        URL
    }

    fn parse_document(&self, html: &str) -> Result<Vec<ScrapedListing>> {
        let layout = CardLayout {
            card: &CARD_SELECTOR,
            title: &TITLE_SELECTOR,
            link: &LINK_SELECTOR,
            image: &IMAGE_SELECTOR,
        };
        let listings = base::parse_cards(html, URL, &layout)
            .into_iter()
            .map(|mut listing| {
                listing.title = strip_rank(&listing.title);
                listing
            })
            .collect();
        Ok(listings)
    }
}

/// Listicle tiles prefix titles with their rank, e.g. "1. Gardens by the Bay".
fn strip_rank(title: &str) -> String {
    let trimmed = title.trim();
    match trimmed.split_once(". ") {
        Some((rank, rest)) if !rank.is_empty() && rank.chars().all(|c| c.is_ascii_digit()) => {
            rest.trim().to_string()
        }
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"
    <section class="zone">
        <article class="tile _article_abc">
            <div class="_imageWrap"><img src="https://media.timeout.com/images/106012345/image.jpg" alt="Light to Night"></div>
            <div class="_content">
                <a href="/singapore/news/light-to-night-returns-052225" data-testid="tile-link"><h3>1. Light to Night returns to the Civic District</h3></a>
                <p>Projection shows and art trails.</p>
            </div>
        </article>
        <article class="tile _article_abc">
            <div class="_imageWrap"><img data-src="/images/106054321/image.jpg" src="data:image/gif;base64,R0lGOD"></div>
            <div class="_content">
                <a href="https://www.timeout.com/singapore/restaurants/atlas-bar"><h3>Atlas Bar</h3></a>
            </div>
        </article>
        <article class="tile _article_abc">
            <div class="_content"><h3>Sponsored</h3></div>
        </article>
    </section>
    "#;

    #[test]
    fn parses_timeout_tiles() {
        let listings = TimeOutSingapore
            .parse_document(SAMPLE_HTML)
            .expect("parse html");
        assert_eq!(listings.len(), 2, "tiles without links are skipped");

        assert_eq!(listings[0].title, "Light to Night returns to the Civic District");
        assert_eq!(
            listings[0].article_url,
            "https://www.timeout.com/singapore/news/light-to-night-returns-052225"
        );
        assert_eq!(
            listings[0].image_url.as_deref(),
            Some("https://media.timeout.com/images/106012345/image.jpg")
        );

        assert_eq!(listings[1].title, "Atlas Bar");
        assert_eq!(
            listings[1].image_url.as_deref(),
            Some("https://www.timeout.com/images/106054321/image.jpg")
        );
    }

    #[test]
    fn rank_prefix_only_strips_numbers() {
        assert_eq!(strip_rank("12. Jewel Rain Vortex"), "Jewel Rain Vortex");
        assert_eq!(strip_rank("Mr. Bucket Chocolaterie"), "Mr. Bucket Chocolaterie");
    }
}
