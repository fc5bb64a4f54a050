use anyhow::Result;
use once_cell::sync::Lazy;
use scraper::Selector;

use super::base::{self, CardLayout};
use super::{ListingSource, ScrapedListing};

const URL: &str = "https://thehoneycombers.com/singapore/events/";
const SOURCE_ID: &str = "honeycombers";
const SOURCE_NAME: &str = "Honeycombers Singapore";

static CARD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.post-item, article.post").expect("honeycombers card"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".post-title, h2.entry-title").expect("honeycombers title"));
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".post-title a[href], h2.entry-title a[href], a.post-thumb[href]")
        .expect("honeycombers link")
});
static IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("honeycombers image"));

pub struct Honeycombers;

impl ListingSource for Honeycombers {
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
        Ok(base::parse_cards(html, URL, &layout))
    }
}
