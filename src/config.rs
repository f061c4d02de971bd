use anyhow::Result;
use std::path::PathBuf;

use crate::feed::DEFAULT_PAGE_SIZE;
use crate::store::default_db_path;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Settings shared by every subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub page_size: usize,
    pub db_path: PathBuf,
}

impl ClientConfig {
    /// Fill in whatever the command line and environment left unset.
    pub fn resolve(
        api_url: Option<String>,
        page_size: Option<usize>,
        db_path: Option<PathBuf>,
    ) -> Result<Self> {
        let base_url = api_url
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let page_size = match page_size {
            Some(0) => {
                tracing::warn!("Page size 0 is not usable, using {}", DEFAULT_PAGE_SIZE);
                DEFAULT_PAGE_SIZE
            }
            Some(n) => n,
            None => DEFAULT_PAGE_SIZE,
        };

        let db_path = match db_path {
            Some(p) => p,
            None => default_db_path()?,
        };

        Ok(Self {
            base_url,
            page_size,
            db_path,
        })
    }
}
