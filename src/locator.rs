use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocatorError {
    #[error("empty locator")]
    Empty,
    #[error("unsupported scheme in `{0}` (only http/https)")]
    UnsupportedScheme(String),
    #[error("no host in `{0}`")]
    MissingHost(String),
    #[error("`{0}` does not name an article")]
    EmptyPageName(String),
}

/// A normalized reference to a wiki page: host plus article path.
///
/// All locator normalization lives here so that win detection can compare
/// paths directly. Construct through [`PageRef::parse`] or
/// [`PageRef::from_title`]; never assemble paths by hand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageRef {
    pub host: String,
    pub path: String,
}

impl PageRef {
    /// Parses a locator from user input. Accepts a full `https://` URL, a
    /// site-relative `/wiki/...` path, or a bare article title ("Albert
    /// Einstein"). Relative paths and titles resolve against `default_host`.
    pub fn parse(input: &str, default_host: &str) -> Result<Self, LocatorError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(LocatorError::Empty);
        }

        if let Some((scheme, rest)) = input.split_once("://") {
            if scheme != "http" && scheme != "https" {
                return Err(LocatorError::UnsupportedScheme(input.to_string()));
            }
            let (host, path) = match rest.split_once('/') {
                Some((host, path)) => (host, format!("/{}", path)),
                None => (rest, String::new()),
            };
            if host.is_empty() {
                return Err(LocatorError::MissingHost(input.to_string()));
            }
            return Self::from_parts(host, &path, input);
        }

        if input.starts_with('/') {
            return Self::from_parts(default_host, input, input);
        }

        // Bare article title
        Ok(Self::from_title(input, default_host))
    }

    /// Builds a locator from an article title, the way the randomize flow
    /// does: spaces become underscores under `/wiki/`.
    pub fn from_title(title: &str, host: &str) -> Self {
        let name = title.trim().replace(' ', "_");
        Self {
            host: host.to_ascii_lowercase(),
            path: format!("/wiki/{}", name),
        }
    }

    fn from_parts(host: &str, path: &str, original: &str) -> Result<Self, LocatorError> {
        // Strip query and fragment, then the trailing slash
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let path = path.trim_end_matches('/');

        let page_ref = Self {
            host: host.to_ascii_lowercase(),
            path: path.replace(' ', "_"),
        };
        if page_ref.page_name().is_empty() {
            return Err(LocatorError::EmptyPageName(original.to_string()));
        }
        Ok(page_ref)
    }

    /// The article name as the MediaWiki API expects it: the path with any
    /// `/wiki/` prefix removed.
    pub fn page_name(&self) -> &str {
        self.path
            .strip_prefix("/wiki/")
            .unwrap_or_else(|| self.path.trim_start_matches('/'))
    }

    /// The article name with underscores restored to spaces, for display.
    pub fn title(&self) -> String {
        self.page_name().replace('_', " ")
    }

    pub fn same_host(&self, other: &PageRef) -> bool {
        self.host == other.host
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "https://{}{}", self.host, self.path)
    }
}
