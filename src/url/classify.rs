use crate::config::SiteConfig;
use crate::url::{Classified, Kind};
use crate::ConfigError;
use url::Url;

const HTML_SUFFIX: &str = ".html";

/// Maps raw links to canonical paths of the target site
///
/// Classification is a pure function of the input string and the configured
/// site root; nothing here touches the network.
///
/// # Canonicalization
///
/// 1. Parse the URL; reject if it does not resolve
/// 2. Reject unless scheme, host and port match the site root
/// 3. Drop the query string and fragment
/// 4. If the path contains `.html`, cut it immediately after the suffix
/// 5. Reject if the path has no non-empty trailing segment
///
/// The trailing segment then decides the kind: a slug starting with the
/// detail prefix (`f-` by default) is a product page, anything else a
/// category page.
///
/// # Examples
///
/// ```
/// use cirrus::config::SiteConfig;
/// use cirrus::url::{Classifier, Kind};
///
/// let site = SiteConfig {
///     root: "https://site.example".to_string(),
///     detail_prefix: "f-".to_string(),
/// };
/// let classifier = Classifier::new(&site).unwrap();
///
/// let c = classifier.classify("https://site.example/cat/widgets/f-1-abc123.html?x=1");
/// assert_eq!(c.path, "https://site.example/cat/widgets/f-1-abc123.html");
/// assert_eq!(c.kind, Kind::Link);
/// ```
#[derive(Debug, Clone)]
pub struct Classifier {
    root: Url,
    detail_prefix: String,
}

impl Classifier {
    /// Creates a classifier for the configured site
    pub fn new(site: &SiteConfig) -> Result<Self, ConfigError> {
        let root = Url::parse(&site.root)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid site root: {}", e)))?;

        if root.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(format!(
                "Site root '{}' has no host",
                site.root
            )));
        }

        Ok(Self {
            root,
            detail_prefix: site.detail_prefix.clone(),
        })
    }

    /// Classifies a raw absolute URL
    pub fn classify(&self, raw: &str) -> Classified {
        let raw = raw.trim();

        let mut url = match Url::parse(raw) {
            Ok(url) => url,
            Err(_) => return Classified::unknown(raw),
        };

        if !self.same_site(&url) {
            return Classified::unknown(raw);
        }

        url.set_query(None);
        url.set_fragment(None);

        let truncated = url
            .path()
            .find(HTML_SUFFIX)
            .map(|idx| url.path()[..idx + HTML_SUFFIX.len()].to_string());
        if let Some(path) = truncated {
            url.set_path(&path);
        }

        let slug = match trailing_segment(url.path()) {
            Some(slug) => slug,
            None => return Classified::unknown(raw),
        };

        let kind = if slug.starts_with(&self.detail_prefix) {
            Kind::Link
        } else {
            Kind::Group
        };

        Classified {
            path: url.to_string(),
            kind,
        }
    }

    /// Resolves a (possibly relative) href against the page it appeared on,
    /// then classifies it
    ///
    /// Non-navigational hrefs (`javascript:`, `mailto:`, `tel:`, `data:`,
    /// same-page anchors) classify as unknown.
    pub fn classify_href(&self, href: &str, base: &Url) -> Classified {
        let href = href.trim();

        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
            || href.starts_with("data:")
        {
            return Classified::unknown(href);
        }

        match base.join(href) {
            Ok(absolute) => self.classify(absolute.as_str()),
            Err(_) => Classified::unknown(href),
        }
    }

    /// Returns the scheme and host prefix every crawled URL must share
    pub fn root(&self) -> &Url {
        &self.root
    }

    fn same_site(&self, url: &Url) -> bool {
        url.scheme() == self.root.scheme()
            && url.host_str() == self.root.host_str()
            && url.port_or_known_default() == self.root.port_or_known_default()
    }
}

/// Returns the last non-empty path segment
fn trailing_segment(path: &str) -> Option<&str> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

/// Derives a product identifier from the last path segment, without `.html`
///
/// # Examples
///
/// ```
/// use cirrus::url::product_uid;
///
/// assert_eq!(product_uid("https://site.example/cat/f-1-abc123.html"), "f-1-abc123");
/// ```
pub fn product_uid(path: &str) -> String {
    let segment = path.rsplit('/').next().unwrap_or(path);
    segment
        .strip_suffix(HTML_SUFFIX)
        .unwrap_or(segment)
        .to_string()
}
