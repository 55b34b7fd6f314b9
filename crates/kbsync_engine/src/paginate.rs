use std::time::Duration;

use export_logging::{export_debug, export_warn};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{FailureKind, FetchError, Fetcher};

#[derive(Debug, Clone)]
pub struct PageSettings {
    pub per_page: u32,
    /// Pause between consecutive page requests.
    pub delay: Duration,
    /// Hard ceiling for servers that ignore the page parameter.
    pub max_pages: u32,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            per_page: 100,
            delay: Duration::from_millis(500),
            max_pages: 1_000,
        }
    }
}

/// Fetch every page of a collection and concatenate the items in order.
///
/// Pages are requested with `page=1,2,...` and `per_page`, after the `filter`
/// pairs (e.g. `category_id`). The loop stops on the first page holding fewer
/// than `per_page` items. Any failing page fails the whole collection; there
/// is no partial result.
pub async fn fetch_all<T: DeserializeOwned>(
    fetcher: &dyn Fetcher,
    url: &str,
    filter: &[(&str, String)],
    result_key: &str,
    settings: &PageSettings,
) -> Result<Vec<T>, FetchError> {
    let per_page = settings.per_page.max(1);
    let mut items: Vec<T> = Vec::new();

    for page in 1..=settings.max_pages {
        if page > 1 && !settings.delay.is_zero() {
            tokio::time::sleep(settings.delay).await;
        }

        let mut query = filter.to_vec();
        query.push(("page", page.to_string()));
        query.push(("per_page", per_page.to_string()));
        let envelope = fetcher.get_json(url, &query).await?;
        let raw = page_items(envelope, result_key)?;
        let count = raw.len();
        export_debug!("{} page {} returned {} {}", url, page, count, result_key);

        let parsed: Vec<T> = serde_json::from_value(Value::Array(raw)).map_err(|err| {
            FetchError::new(
                FailureKind::InvalidBody,
                format!("{result_key} page {page}: {err}"),
            )
        })?;
        items.extend(parsed);

        if count < per_page as usize {
            return Ok(items);
        }
    }

    export_warn!(
        "{} reached the {} page ceiling; later pages were not fetched",
        url,
        settings.max_pages
    );
    Ok(items)
}

/// A page is either a bare array or an object holding the array at `result_key`.
fn page_items(envelope: Value, result_key: &str) -> Result<Vec<Value>, FetchError> {
    match envelope {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove(result_key) {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) => Ok(Vec::new()),
            Some(_) => Err(FetchError::new(
                FailureKind::InvalidBody,
                format!("`{result_key}` is not an array"),
            )),
            None => Err(FetchError::new(
                FailureKind::InvalidBody,
                format!("response has no `{result_key}` array"),
            )),
        },
        _ => Err(FetchError::new(
            FailureKind::InvalidBody,
            "response is neither an array nor an object",
        )),
    }
}
