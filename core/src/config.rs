//! Client configuration and base URL resolution.

/// Environment variable holding an explicit API base URL.
pub const BASE_URL_ENV: &str = "COURSE_API_BASE_URL";

/// Port the backend listens on when no base URL is configured.
pub const DEFAULT_API_PORT: u16 = 8001;

/// Origin of the page hosting the client, when running behind a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOrigin {
    /// Scheme including the trailing colon, e.g. `https:`.
    pub protocol: String,
    /// Host name without port.
    pub host: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub page_origin: Option<PageOrigin>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the base URL from `COURSE_API_BASE_URL`. Empty values count as unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`ClientConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base_url = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty());
        Self {
            base_url,
            page_origin: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_page_origin(mut self, protocol: &str, host: &str) -> Self {
        self.page_origin = Some(PageOrigin {
            protocol: protocol.to_string(),
            host: host.to_string(),
        });
        self
    }

    /// Resolve the base URL.
    ///
    /// 1. Explicit base URL
    /// 2. `<protocol>//<host>:8001` of the hosting page
    /// 3. `http://localhost:8001`
    pub fn resolve_base_url(&self) -> String {
        if let Some(url) = &self.base_url {
            return url.clone();
        }
        match &self.page_origin {
            Some(origin) => format!("{}//{}:{DEFAULT_API_PORT}", origin.protocol, origin.host),
            None => format!("http://localhost:{DEFAULT_API_PORT}"),
        }
    }
}
