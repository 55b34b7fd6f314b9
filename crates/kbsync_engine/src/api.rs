use kbsync_core::{Article, Category, Folder};

use crate::paginate::{fetch_all, PageSettings};
use crate::{FailureKind, FetchError, Fetcher};

/// Read-only client for the helpdesk solutions endpoints.
pub struct HelpdeskApi<'a> {
    fetcher: &'a dyn Fetcher,
    base: String,
    paging: PageSettings,
}

impl<'a> HelpdeskApi<'a> {
    /// `base` is the API root, e.g. `https://acme.freshservice.com/api/v2`.
    pub fn new(fetcher: &'a dyn Fetcher, base: impl Into<String>, paging: PageSettings) -> Self {
        Self {
            fetcher,
            base: base.into().trim_end_matches('/').to_string(),
            paging,
        }
    }

    pub async fn categories(&self) -> Result<Vec<Category>, FetchError> {
        let url = format!("{}/solutions/categories", self.base);
        fetch_all(self.fetcher, &url, &[], "categories", &self.paging).await
    }

    /// Every folder of the category in one flat listing, nested folders included.
    pub async fn folders(&self, category_id: u64) -> Result<Vec<Folder>, FetchError> {
        let url = format!("{}/solutions/folders", self.base);
        let filter = [("category_id", category_id.to_string())];
        let mut folders: Vec<Folder> =
            fetch_all(self.fetcher, &url, &filter, "folders", &self.paging).await?;
        for folder in &mut folders {
            folder.category_id.get_or_insert(category_id);
        }
        Ok(folders)
    }

    pub async fn articles(&self, folder_id: u64) -> Result<Vec<Article>, FetchError> {
        let url = format!("{}/solutions/articles", self.base);
        let filter = [("folder_id", folder_id.to_string())];
        let mut articles: Vec<Article> =
            fetch_all(self.fetcher, &url, &filter, "articles", &self.paging).await?;
        for article in &mut articles {
            if article.folder_id == 0 {
                article.folder_id = folder_id;
            }
        }
        Ok(articles)
    }

    /// Full article detail including the HTML body.
    pub async fn article(&self, article_id: u64) -> Result<Article, FetchError> {
        let url = format!("{}/solutions/articles/{article_id}", self.base);
        let value = self.fetcher.get_json(&url, &[]).await?;
        // Some deployments wrap single resources as `{"article": {...}}`.
        let value = match value {
            serde_json::Value::Object(mut map) if map.contains_key("article") => {
                map.remove("article").unwrap_or_default()
            }
            other => other,
        };
        serde_json::from_value(value)
            .map_err(|err| FetchError::new(FailureKind::InvalidBody, err.to_string()))
    }
}
