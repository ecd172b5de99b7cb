//! Extraction of embedded data from GoPlay web pages
//!
//! Only pulls anchors and embedded JSON out of the HTML; interpreting the
//! JSON is left to [`super::parse`].

use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value;

use super::parse::PayloadError;

/// A link on a program overview page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramLink {
    pub path: String,
    pub title: String,
}

fn selector(css: &str) -> Result<Selector, PayloadError> {
    Selector::parse(css).map_err(|e| PayloadError(format!("invalid selector '{}': {:?}", css, e)))
}

/// Collects the program links of an overview page
pub fn program_links(html: &str) -> Result<Vec<ProgramLink>, PayloadError> {
    let document = Html::parse_document(html);
    let link_selector = selector("a.program-overview__link")?;
    let title_selector = selector(".program-overview__title")?;

    let links = document
        .select(&link_selector)
        .filter_map(|link| {
            let path = link.value().attr("href")?;
            let title = link
                .select(&title_selector)
                .next()
                .map(|title| title.text().collect::<String>())
                .unwrap_or_else(|| link.text().collect::<String>());
            let title = title.trim();
            if title.is_empty() {
                return None;
            }
            Some(ProgramLink {
                path: path.trim_start_matches('/').to_string(),
                title: title.to_string(),
            })
        })
        .collect();

    Ok(links)
}

/// Returns the program data embedded in the page's `data-hero` attribute
pub fn hero_data(html: &str) -> Result<Value, PayloadError> {
    let document = Html::parse_document(html);
    let hero = document
        .select(&selector("[data-hero]")?)
        .next()
        .and_then(|element| element.value().attr("data-hero"))
        .ok_or_else(|| PayloadError("page has no data-hero attribute".to_string()))?;

    let mut hero: Value =
        serde_json::from_str(hero).map_err(|e| PayloadError(format!("invalid data-hero JSON: {}", e)))?;

    match hero.get_mut("data") {
        Some(data) => Ok(data.take()),
        None => Err(PayloadError("data-hero has no data".to_string())),
    }
}

/// Returns the node id from the page's drupal settings
pub fn page_node_id(html: &str) -> Result<String, PayloadError> {
    let document = Html::parse_document(html);
    let script = document
        .select(&selector(r#"script[data-drupal-selector="drupal-settings-json"]"#)?)
        .next()
        .ok_or_else(|| PayloadError("page has no drupal settings".to_string()))?;

    let settings: Value = serde_json::from_str(&script.text().collect::<String>())
        .map_err(|e| PayloadError(format!("invalid drupal settings JSON: {}", e)))?;

    match settings.pointer("/pageInfo/nodeId") {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(PayloadError("drupal settings have no pageInfo.nodeId".to_string())),
    }
}
