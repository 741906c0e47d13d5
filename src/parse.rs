//! HTML extraction for the page-scraping sources. Everything here is synchronous;
//! callers run it through `spawn_blocking` since `scraper::Html` isn't `Send`.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::{Error, Result};

/// Fields scraped from a SteamSpy app page.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SteamSpyPage {
    pub followers: Option<String>,
    pub old_userscore: Option<String>,
}

/// Fields scraped from a SteamCharts app page.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SteamChartsPage {
    pub peak_24h: Option<String>,
    pub all_time_peak: Option<String>,
    pub all_time_peak_date: Option<String>,
}

/// Pulls the text following the `<strong>Followers</strong>` and
/// `<strong>Old userscore:</strong>` labels.
pub fn parse_steamspy_page(html: &str) -> Result<SteamSpyPage> {
    let doc = Html::parse_document(html);
    let strong = create_selector("strong")?;

    let mut page = SteamSpyPage::default();
    for label in doc.select(&strong) {
        match label.text().collect::<String>().trim() {
            "Followers" => {
                page.followers = text_after(label)
                    .map(|t| t.trim_start_matches([':', ' ']).replace(',', ""))
                    .filter(|t| !t.is_empty());
            }
            "Old userscore:" => {
                page.old_userscore = text_after(label).filter(|t| !t.is_empty());
            }
            _ => {}
        }
    }
    if page.followers.is_none() {
        debug!("Followers not found");
    }
    if page.old_userscore.is_none() {
        debug!("Old userscore not found");
    }
    Ok(page)
}

/// The second and third `div.app-stat` blocks hold the 24-hour and all-time peaks.
/// The all-time peak date is the month in the history table whose peak column
/// matches the all-time peak.
pub fn parse_steamcharts_page(html: &str) -> Result<SteamChartsPage> {
    let doc = Html::parse_document(html);
    let stat_selector = create_selector("div.app-stat")?;
    let num_selector = create_selector("span.num")?;
    let row_selector = create_selector("table.common-table tr")?;
    let cell_selector = create_selector("td")?;

    let stats: Vec<ElementRef> = doc.select(&stat_selector).collect();
    let stat_num = |i: usize| -> Option<String> {
        let stat = stats.get(i)?;
        let num = stat.select(&num_selector).next()?;
        Some(clean_number(&num.text().collect::<String>()))
    };

    let mut page = SteamChartsPage {
        peak_24h: stat_num(1),
        all_time_peak: stat_num(2),
        all_time_peak_date: None,
    };

    if let Some(all_time_peak) = page.all_time_peak.as_deref() {
        page.all_time_peak_date = doc.select(&row_selector).find_map(|row| {
            let cells: Vec<String> = row
                .select(&cell_selector)
                .map(|cell| cell.text().collect::<String>())
                .collect();
            if cells.len() > 4 && clean_number(&cells[4]) == all_time_peak {
                Some(cells[0].trim().to_string())
            } else {
                None
            }
        });
    }
    Ok(page)
}

#[inline]
fn create_selector(sel_str: &str) -> Result<Selector> {
    Selector::parse(sel_str).map_err(|_| Error::ParseInvalidSelector(sel_str.into()))
}

/// Text node directly after `element`, trimmed.
fn text_after(element: ElementRef) -> Option<String> {
    let sibling = element.next_sibling()?;
    let text = sibling.value().as_text()?;
    Some(text.trim().to_string())
}

#[inline]
fn clean_number(raw: &str) -> String {
    raw.replace(',', "").trim().to_string()
}
