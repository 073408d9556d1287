//! Page URL helpers: base URL, domain comparison and site detection.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Strip the query, or failing that the fragment, from a URL.
///
/// The URL is normalized first. Input that does not parse is returned
/// unchanged.
pub fn base_url(raw: &str) -> String {
    let Ok(parsed) = Url::parse(raw) else {
        tracing::debug!("Cannot parse URL '{}', using it as is", raw);
        return raw.to_string();
    };
    let href = parsed.as_str();
    if let Some(pos) = href.find('?') {
        return href[..pos].to_string();
    }
    if let Some(pos) = href.find('#') {
        return href[..pos].to_string();
    }
    href.to_string()
}

/// Whether both URLs parse and share the same host name
pub fn is_same_domain(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a.host_str().is_some() && a.host_str() == b.host_str(),
        _ => false,
    }
}

/// Streaming site a participant is watching on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Netflix,
    Hotstar,
    PrimeVideo,
    Youtube,
    Disney,
    Hulu,
    HboMax,
    AnimePahe,
    Crunchyroll,
    Generic,
}

impl Site {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Netflix => "netflix",
            Self::Hotstar => "hotstar",
            Self::PrimeVideo => "primevideo",
            Self::Youtube => "youtube",
            Self::Disney => "disney",
            Self::Hulu => "hulu",
            Self::HboMax => "hbomax",
            Self::AnimePahe => "animepahe",
            Self::Crunchyroll => "crunchyroll",
            Self::Generic => "generic",
        }
    }

    /// Whether the player is only reachable through a message bridge
    pub fn needs_bridge(&self) -> bool {
        matches!(self, Self::Netflix)
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the site from a page URL. Unknown pages are `Generic`.
pub fn detect_site(url: &str) -> Site {
    const RULES: [(&str, Site); 10] = [
        ("netflix.com", Site::Netflix),
        ("hotstar.com", Site::Hotstar),
        ("primevideo.com", Site::PrimeVideo),
        ("youtube.com/watch", Site::Youtube),
        ("disneyplus.com", Site::Disney),
        ("hulu.com/watch", Site::Hulu),
        ("hbomax.com", Site::HboMax),
        ("max.com", Site::HboMax),
        ("animepahe.ru", Site::AnimePahe),
        ("crunchyroll.com", Site::Crunchyroll),
    ];
    RULES
        .iter()
        .find(|(needle, _)| url.contains(needle))
        .map(|(_, site)| *site)
        .unwrap_or(Site::Generic)
}
