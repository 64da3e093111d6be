//! WTHGIS/ThinkGIS portal strategy.
//!
//! Grounded on `examples/original_source/apps/api/scrapers/wthgis_scraper.py`:
//! the `#searchBox` search flow, polling `#infoWindow` until it stops
//! showing "Searching...", the "Show Property Card" link's `DSID`/
//! `FeatureID` href parameters, and the two info-panel table layouts
//! (`th.leftheader`/`td` and `td.ftrfld`/`td.ftrval`) with their field-name
//! alias lists.

use super::extraction::{owner_filename_stub, parse_address};
use super::PortalStrategy;
use crate::job::model::{Address, Job, RecordOutcome, ScrapedRecord};
use crate::scraper::downloader::DocumentDownloader;
use crate::scraper::page_driver::PageDriver;
use crate::scraper::rate_limiter::{RateLimiter, RequestClass};
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

const SEARCH_BOX_SELECTOR: &str = "input#searchBox";
const INFO_WINDOW_SELECTOR: &str = "#infoWindow";
const SHOW_PROPERTY_CARD_SELECTOR: &str = "a:has-text(\"Show Property Card\")";

static DSID_FEATURE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"DSID=(\d+).*?FeatureID=(\d+)").expect("valid regex"));

pub struct WthgisStrategy {
    search_timeout: Duration,
}

impl WthgisStrategy {
    #[must_use]
    pub fn new(search_timeout: Duration) -> Self {
        Self { search_timeout }
    }
}

#[async_trait]
impl PortalStrategy for WthgisStrategy {
    async fn prepare(&self, driver: &mut dyn PageDriver) -> Result<()> {
        match driver.find_first(&[SEARCH_BOX_SELECTOR], self.search_timeout).await? {
            Some(_) => Ok(()),
            None => {
                let url = driver.current_url().await.unwrap_or_default();
                let page_title = driver.page_title().await.ok();
                Err(crate::error::PipelineError::SearchInputMissing { url, page_title }.into())
            }
        }
    }

    async fn search_and_extract(
        &self,
        driver: &mut dyn PageDriver,
        downloader: &DocumentDownloader,
        rate_limiter: &RateLimiter,
        job: &Job,
        parcel_id: &str,
        download_dir: &Path,
    ) -> RecordOutcome {
        match self.try_extract(driver, downloader, rate_limiter, job, parcel_id, download_dir).await {
            Ok(outcome) => outcome,
            Err(err) => RecordOutcome::Error(format!("{err:#}")),
        }
    }
}

impl WthgisStrategy {
    async fn try_extract(
        &self,
        driver: &mut dyn PageDriver,
        downloader: &DocumentDownloader,
        rate_limiter: &RateLimiter,
        _job: &Job,
        parcel_id: &str,
        download_dir: &Path,
    ) -> Result<RecordOutcome> {
        rate_limiter.wait(RequestClass::Page).await;

        let Some(search_box) = driver.find_first(&[SEARCH_BOX_SELECTOR], self.search_timeout).await? else {
            anyhow::bail!("search box disappeared before searching for {parcel_id}");
        };
        driver.fill(&search_box, parcel_id).await.context("filling search box")?;
        driver.press(&search_box, "Enter").await.context("submitting search")?;

        if !self.wait_for_info_window(driver).await? {
            return Ok(RecordOutcome::NotFound);
        }

        let Some(info_window) = driver.find_first(&[INFO_WINDOW_SELECTOR], Duration::from_secs(2)).await? else {
            return Ok(RecordOutcome::NotFound);
        };
        let info_html = driver.inner_html(&info_window).await.unwrap_or_default();
        let fields = parse_info_fields(&info_html);

        if fields.is_empty() {
            return Ok(RecordOutcome::NotFound);
        }

        let owner_name = first_present(&fields, &["ownername", "mvownername"]);
        let alternate_id = first_present(&fields, &["alternateid", "altid", "alternateparcelid"]);
        let legal_description = first_present(&fields, &["legaldescription", "mvlegaldescription"]);

        let owner_address = combined_or_parts(
            &fields,
            "owneraddress",
            &["mvownerstreet"],
            &["mvownercity"],
            &["mvownerstate"],
            &["mvownerzipcode"],
        );
        let situs_address = combined_or_parts(
            &fields,
            "locationaddress",
            &["mvpropstreet"],
            &["mvpropcity"],
            &["mvpropstate"],
            &["mvpropzipcode"],
        );

        let document_url = match driver.find_first(&[SHOW_PROPERTY_CARD_SELECTOR], Duration::from_secs(2)).await? {
            Some(handle) => driver
                .attr(&handle, "href")
                .await
                .ok()
                .flatten()
                .filter(|href| DSID_FEATURE_RE.is_match(href)),
            None => None,
        };

        let mut document_local_path = None;
        let mut download_error = None;
        if let Some(url) = &document_url {
            let stub = owner_filename_stub(owner_name.as_deref().unwrap_or_default());
            let dest = download_dir.join(format!("{stub}_{parcel_id}.pdf"));
            match downloader.download(url, &dest, rate_limiter).await {
                Ok(path) => document_local_path = Some(path),
                Err(err) => download_error = Some(err.to_string()),
            }
        }

        Ok(RecordOutcome::Ok(ScrapedRecord {
            parcel_id: parcel_id.to_string(),
            alternate_id,
            owner_name,
            owner_address,
            situs_address,
            legal_description,
            latest_transfer: None,
            document_url,
            document_local_path,
            download_error,
        }))
    }

    /// Poll `#infoWindow` until its text no longer reads "Searching...", or
    /// the search timeout elapses. Returns `false` if the window never
    /// settled (treated as not-found, matching the original's timeout path).
    async fn wait_for_info_window(&self, driver: &dyn PageDriver) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + self.search_timeout;
        loop {
            if let Some(handle) = driver.find_first(&[INFO_WINDOW_SELECTOR], Duration::from_millis(500)).await? {
                let text = driver.text(&handle).await.unwrap_or_default();
                if !text.contains("Searching") {
                    return Ok(true);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            driver.wait(Duration::from_millis(300)).await;
        }
    }
}

/// Parse either info-panel table layout into a lowercase-keyed field map:
/// `<th class="leftheader">Field</th><td>Value</td>` or
/// `<td class="ftrfld">Field</td><td class="ftrval">Value</td>`.
fn parse_info_fields(html: &str) -> HashMap<String, String> {
    let document = scraper::Html::parse_fragment(html);
    let mut fields = HashMap::new();

    if let Ok(row_selector) = scraper::Selector::parse("tr") {
        for row in document.select(&row_selector) {
            let cells: Vec<_> = row.child_elements().collect();
            if cells.len() < 2 {
                continue;
            }
            let key = cells[0].text().collect::<String>().trim().to_lowercase().replace(' ', "");
            let value = cells[1].text().collect::<String>().trim().to_string();
            if !key.is_empty() && !value.is_empty() {
                fields.insert(key, value);
            }
        }
    }
    fields
}

fn first_present(fields: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| fields.get(*k).cloned())
}

#[allow(clippy::too_many_arguments)]
fn combined_or_parts(
    fields: &HashMap<String, String>,
    combined_key: &str,
    street_keys: &[&str],
    city_keys: &[&str],
    state_keys: &[&str],
    zip_keys: &[&str],
) -> Address {
    if let Some(combined) = fields.get(combined_key) {
        return parse_address(combined);
    }
    Address {
        street: first_present(fields, street_keys).unwrap_or_default(),
        city: first_present(fields, city_keys).unwrap_or_default(),
        state: first_present(fields, state_keys).unwrap_or_default(),
        zip: first_present(fields, zip_keys).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_leftheader_table_layout() {
        let html = r#"<table>
            <tr><th class="leftheader">OwnerName</th><td>SMITH, JANE A</td></tr>
            <tr><th class="leftheader">LegalDescription</th><td>LOT 5 BLK 2</td></tr>
            <tr><th class="leftheader">AlternateID</th><td>12-34-56</td></tr>
        </table>"#;
        let fields = parse_info_fields(html);
        assert_eq!(fields.get("ownername").map(String::as_str), Some("SMITH, JANE A"));
        assert_eq!(fields.get("legaldescription").map(String::as_str), Some("LOT 5 BLK 2"));
        assert_eq!(first_present(&fields, &["alternateid", "altid"]).as_deref(), Some("12-34-56"));
    }

    #[test]
    fn parses_ftrfld_table_layout() {
        let html = r#"<table>
            <tr><td class="ftrfld">mvOwnerName</td><td class="ftrval">DOE, JOHN</td></tr>
        </table>"#;
        let fields = parse_info_fields(html);
        assert_eq!(fields.get("mvownername").map(String::as_str), Some("DOE, JOHN"));
    }

    #[test]
    fn dsid_feature_regex_matches_expected_href() {
        assert!(DSID_FEATURE_RE.is_match("ShowCard.aspx?DSID=12&FeatureID=345"));
        assert!(!DSID_FEATURE_RE.is_match("ShowCard.aspx?other=1"));
    }
}
