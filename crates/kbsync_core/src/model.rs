use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
}

/// Folders arrive as a flat listing per category; nested folders are not
/// expanded. `category_id` is absent from some listings and is filled in by
/// the walker from the parent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Folder {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Attachment {
    #[serde(alias = "attachment_url", default)]
    pub url: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "u8")]
pub enum ArticleStatus {
    Draft,
    Published,
    Other(u8),
}

impl ArticleStatus {
    pub fn code(self) -> u8 {
        match self {
            ArticleStatus::Draft => 1,
            ArticleStatus::Published => 2,
            ArticleStatus::Other(code) => code,
        }
    }

    pub fn is_published(self) -> bool {
        self == ArticleStatus::Published
    }
}

impl From<u8> for ArticleStatus {
    fn from(code: u8) -> Self {
        match code {
            1 => ArticleStatus::Draft,
            2 => ArticleStatus::Published,
            other => ArticleStatus::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Article {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    /// `None` when the payload carries no status at all.
    #[serde(default)]
    pub status: Option<ArticleStatus>,
    /// HTML body. Listings usually omit it; only the detail endpoint carries it.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub folder_id: u64,
}

impl Article {
    /// The HTML body if present and not just whitespace.
    pub fn body(&self) -> Option<&str> {
        self.description
            .as_deref()
            .filter(|body| !body.trim().is_empty())
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
