//! Active project reference.

use url::Url;

use crate::error::{Error, Result};

/// Domain under which Ory Network serves project APIs.
pub const PROJECT_API_DOMAIN: &str = "projects.oryapis.com";

/// The project the proxy routes platform traffic to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRef {
    /// Project slug, when the project was selected by slug.
    pub slug: Option<String>,
    /// Base URL of the project's API.
    pub api_url: Url,
}

impl ProjectRef {
    /// Reference an Ory Network project by slug.
    pub fn from_slug(slug: &str) -> Result<Self> {
        let slug = slug.trim();
        let valid = !slug.is_empty()
            && slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid {
            return Err(Error::InvalidProject(format!(
                "'{}' is not a valid project slug",
                slug
            )));
        }

        let api_url = Url::parse(&format!("https://{}.{}", slug, PROJECT_API_DOMAIN))?;
        Ok(Self {
            slug: Some(slug.to_string()),
            api_url,
        })
    }

    /// Reference a project by the base URL of its API (self-hosted or local).
    pub fn from_api_url(api_url: &str) -> Result<Self> {
        let api_url = Url::parse(api_url)?;
        if api_url.cannot_be_a_base() || api_url.host_str().is_none() {
            return Err(Error::InvalidProject(format!(
                "'{}' is not an absolute API URL",
                api_url
            )));
        }

        Ok(Self {
            slug: None,
            api_url,
        })
    }

    /// Human readable name for logs.
    pub fn display_name(&self) -> &str {
        self.slug.as_deref().unwrap_or_else(|| self.api_url.as_str())
    }

    /// Build an API URL for `path`, keeping any path the base URL carries.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.api_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{}/{}", base, path))?)
    }
}
