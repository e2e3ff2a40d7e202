//! Config-driven site adapters.
//!
//! A [`SiteAdapter`] is the pure-data description of how one source exposes
//! its documents: which selector finds list entries, how raw titles are
//! cleaned, what a valid artifact looks like, and how fast the source may
//! be hit. Concrete site behavior is supplied entirely through
//! configuration plus one generic execution engine; there are no per-site
//! code paths.
//!
//! The adapter itself performs no I/O. The engine feeds it
//! [`ElementSummary`] values scraped from a list page and receives back an
//! ordered sequence of [`DocumentRef`]s, which makes list interpretation
//! independently testable.

mod title;

pub use title::TitleRules;

use url::Url;

use crate::config::{ConfigError, FileValidation, SiteConfig};

/// Selector keys every site config must provide in `extraction.selectors`.
const REQUIRED_SELECTOR_KEYS: [&str; 1] = ["document_links"];

/// Raw text/link pair scraped from one list-page element.
///
/// This is the only thing the adapter ever sees from a page: never raw
/// HTML, just what the browser collaborator reports per matched element.
#[derive(Debug, Clone)]
pub struct ElementSummary {
    /// Visible text of the element.
    pub text: String,
    /// Resolved `href`, when the element carries one.
    pub href: Option<String>,
}

/// One discovered document: its raw title and a source-specific locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    /// Title exactly as extracted from the list page.
    pub raw_title: String,
    /// Absolute URL of the document page.
    pub locator: String,
}

/// Declarative site adapter resolved from a [`SiteConfig`].
#[derive(Debug, Clone)]
pub struct SiteAdapter {
    config: SiteConfig,
    title_rules: TitleRules,
    base_url: Url,
}

impl SiteAdapter {
    /// Builds an adapter, compiling title rules and checking that all
    /// required selector keys are present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSelector`] when a required key is
    /// absent, [`ConfigError::Invalid`] when the base URL does not parse,
    /// or [`ConfigError::Regex`] when title rules fail to compile.
    pub fn new(config: SiteConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        for key in REQUIRED_SELECTOR_KEYS {
            if !config.extraction.selectors.contains_key(key) {
                return Err(ConfigError::MissingSelector {
                    site: config.site_info.name.clone(),
                    name: key.to_string(),
                });
            }
        }

        let base_url = Url::parse(&config.site_info.base_url).map_err(|e| ConfigError::Invalid {
            site: config.site_info.name.clone(),
            reason: format!("base_url does not parse: {e}"),
        })?;

        let title_rules = TitleRules::from_config(&config.extraction.title_processing)?;

        Ok(Self {
            config,
            title_rules,
            base_url,
        })
    }

    /// Returns the stable source identifier.
    #[must_use]
    pub fn site_name(&self) -> &str {
        &self.config.site_info.name
    }

    /// Returns the underlying site configuration.
    #[must_use]
    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Returns the absolute URL of the document list page.
    #[must_use]
    pub fn start_url(&self) -> String {
        self.join(&self.config.navigation.start_url)
    }

    /// Returns the selector matching one element per listed document.
    #[must_use]
    pub fn document_list_selector(&self) -> &str {
        // Presence of the key is checked at construction; the navigation
        // field is the fallback for configs that only set it there.
        self.config
            .extraction
            .selectors
            .get("document_links")
            .map_or(self.config.navigation.document_list_selector.as_str(), String::as_str)
    }

    /// Looks up a logical selector by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSelector`] when the key is absent.
    pub fn selector(&self, name: &str) -> Result<&str, ConfigError> {
        self.config
            .extraction
            .selectors
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingSelector {
                site: self.config.site_info.name.clone(),
                name: name.to_string(),
            })
    }

    /// Returns the selector of the export/download trigger.
    #[must_use]
    pub fn download_button_selector(&self) -> &str {
        &self.config.download.button_selector
    }

    /// Returns the artifact validation bounds.
    #[must_use]
    pub fn validation(&self) -> &FileValidation {
        &self.config.download.validation
    }

    /// Returns the allowed artifact extensions.
    #[must_use]
    pub fn expected_file_types(&self) -> &[String] {
        &self.config.download.expected_file_types
    }

    /// Applies the configured title cleanup to a raw title.
    #[must_use]
    pub fn sanitize_title(&self, raw: &str) -> String {
        self.title_rules.sanitize(raw)
    }

    /// Interprets scraped list elements as an ordered document sequence.
    ///
    /// Elements without usable text or without a link are skipped;
    /// relative links are joined against the configured base URL. Order is
    /// preserved; downstream processing within a department follows this
    /// order.
    #[must_use]
    pub fn resolve(&self, elements: &[ElementSummary]) -> Vec<DocumentRef> {
        elements
            .iter()
            .filter_map(|element| {
                let raw_title = element.text.trim();
                if raw_title.is_empty() {
                    return None;
                }
                let href = element.href.as_deref()?.trim();
                if href.is_empty() {
                    return None;
                }
                Some(DocumentRef {
                    raw_title: raw_title.to_string(),
                    locator: self.join(href),
                })
            })
            .collect()
    }

    /// Joins a possibly relative locator against the site base URL.
    ///
    /// Unparseable locators degrade to simple string concatenation rather
    /// than failing resolution of the whole list.
    #[must_use]
    pub fn join(&self, locator: &str) -> String {
        match self.base_url.join(locator) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}/{}", self.base_url, locator.trim_start_matches('/')),
        }
    }
}
