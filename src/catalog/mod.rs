use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use reqwest::Url;
use scraper::{Html, Selector};

use crate::engine::models::ManufacturerRecord;
use crate::error::SyncError;
use crate::util::slugify;

pub const DEFAULT_BASE_URL: &str = "https://www.carlogos.org";
pub const CATALOG_PATH: &str = "/car-brands-a-z";

const MANUFACTURER_SELECTOR: &str = "html body div.main div.main-l div.a-z dl dd a";
const LOGO_META_SELECTOR: &str = "meta[property=\"og:image\"]";

/// A manufacturer link as it appears on the A-Z page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManufacturerLink {
    pub name: String,
    pub href: String,
}

pub fn catalog_url(base_url: &str) -> String {
    format!("{}{CATALOG_PATH}", base_url.trim_end_matches('/'))
}

/// Collect every `(name, href)` pair on the A-Z page.
///
/// Links with no text or no `href` are skipped with a warning.
pub fn list_manufacturers(body: &str) -> Vec<ManufacturerLink> {
    let document = Html::parse_document(body);
    let selector = match Selector::parse(MANUFACTURER_SELECTOR) {
        Ok(sel) => sel,
        Err(_) => return Vec::new(),
    };

    let mut links = Vec::new();
    for element in document.select(&selector) {
        let name = element
            .text()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let href = element.value().attr("href").map(str::trim).unwrap_or("");
        match (name.is_empty(), href.is_empty()) {
            (false, false) => links.push(ManufacturerLink {
                name,
                href: href.to_owned(),
            }),
            (true, _) => warn!("catalog: missing name for manufacturer link {href:?}"),
            (false, true) => warn!("catalog: missing href for manufacturer {name}"),
        }
    }
    links
}

/// Logo URL advertised by a manufacturer page, if any.
pub fn find_logo_url(body: &str) -> Option<String> {
    let document = Html::parse_document(body);
    let selector = Selector::parse(LOGO_META_SELECTOR).ok()?;
    document
        .select(&selector)
        .filter_map(|meta| meta.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(str::to_owned)
}

/// Keep absolute URLs, join everything else onto `base_url`.
pub fn absolute_url(base_url: &str, href: &str) -> Result<Url, SyncError> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Url::parse(href).map_err(|e| invalid(href, e));
    }
    let base = Url::parse(base_url).map_err(|e| invalid(base_url, e))?;
    base.join(href).map_err(|e| invalid(href, e))
}

/// Turn page links into records sorted by name.
///
/// Fails on an unparsable base URL, an empty listing, duplicate names, and
/// names that would map to an empty or shared image file name. Links are
/// kept as written; each one is resolved when its manufacturer is synced.
pub fn discover(base_url: &str, body: &str) -> Result<Vec<ManufacturerRecord>, SyncError> {
    let links = list_manufacturers(body);
    if links.is_empty() {
        return Err(SyncError::Discovery(
            "no manufacturers found on the catalog page".into(),
        ));
    }
    debug!("catalog: found {} manufacturer links", links.len());
    Url::parse(base_url).map_err(|e| invalid(base_url, e))?;

    let mut records: Vec<ManufacturerRecord> = links
        .into_iter()
        .map(|link| ManufacturerRecord {
            name: link.name,
            source_url: link.href,
        })
        .collect();
    records.sort_by(|a, b| a.name.cmp(&b.name));

    let duplicates = duplicate_names(&records);
    if !duplicates.is_empty() {
        return Err(SyncError::Discovery(format!(
            "manufacturer names must be unique; duplicates: {duplicates:?}"
        )));
    }

    let unsluggable: Vec<&str> = records
        .iter()
        .filter(|record| slugify(&record.name).is_empty())
        .map(|record| record.name.as_str())
        .collect();
    if !unsluggable.is_empty() {
        return Err(SyncError::Discovery(format!(
            "manufacturer names have no filesystem-safe form: {unsluggable:?}"
        )));
    }

    let collisions = slug_collisions(&records);
    if !collisions.is_empty() {
        let listing = collisions
            .iter()
            .map(|(slug, names)| format!("{slug} <- {names:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(SyncError::Discovery(format!(
            "manufacturer names collide on disk: {listing}"
        )));
    }

    Ok(records)
}

fn invalid(url: &str, err: impl std::fmt::Display) -> SyncError {
    SyncError::InvalidUrl {
        url: url.to_owned(),
        reason: err.to_string(),
    }
}

pub fn duplicate_names(records: &[ManufacturerRecord]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for record in records {
        if !seen.insert(record.name.as_str()) {
            duplicates.insert(record.name.clone());
        }
    }
    duplicates.into_iter().collect()
}

/// Slugs claimed by more than one distinct name.
pub fn slug_collisions(records: &[ManufacturerRecord]) -> BTreeMap<String, Vec<String>> {
    let mut by_slug: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for record in records {
        let names = by_slug.entry(slugify(&record.name)).or_default();
        if !names.contains(&record.name) {
            names.push(record.name.clone());
        }
    }
    by_slug.retain(|_, names| names.len() > 1);
    by_slug
}
