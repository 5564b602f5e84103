//! Platform registry — static table mapping profile URLs to platform
//! identity and element lookup hints.
//!
//! The registry is process-wide static data, initialized at compile time and
//! never mutated. Classification is a pure function of the URL host.

use url::Url;

/// Identity and element lookup hints for one supported platform.
///
/// Each platform carries at most one selector per role: one for the
/// secondary reviews/feedback view and one for the bio/about region.
#[derive(Debug, PartialEq, Eq)]
pub struct PlatformProfile {
    /// Platform identifier, or `"unknown"` for unclassified hosts.
    pub name: &'static str,
    /// Registrable domains this platform is served from, including
    /// country-code TLD variants. Subdomains match by suffix.
    domains: &'static [&'static str],
    /// Locates the reviews/feedback/ratings tab, when the platform has one.
    pub secondary_view_selector: Option<&'static str>,
    /// Locates the about/bio region, when the platform has one.
    pub bio_selector: Option<&'static str>,
}

/// Fallback profile for hosts that match no registered platform. Capture
/// proceeds with the primary screenshot and generic extraction only.
pub static UNKNOWN: PlatformProfile = PlatformProfile {
    name: "unknown",
    domains: &[],
    secondary_view_selector: None,
    bio_selector: None,
};

/// Supported platforms in registration order.
///
/// Domains are disjoint across entries, so iteration order does not affect
/// which profile a host matches; a hypothetical tie would be resolved by
/// registration order, which keeps classification deterministic.
static PLATFORMS: &[PlatformProfile] = &[
    PlatformProfile {
        name: "ebay",
        domains: &[
            "ebay.com",
            "ebay.co.uk",
            "ebay.de",
            "ebay.fr",
            "ebay.it",
            "ebay.es",
            "ebay.ca",
            "ebay.com.au",
        ],
        secondary_view_selector: Some("a[href*='feedback']"),
        bio_selector: Some(".str-about-description"),
    },
    PlatformProfile {
        name: "etsy",
        domains: &["etsy.com"],
        secondary_view_selector: Some("a[href*='#reviews']"),
        bio_selector: Some("[data-region='shop-announcement']"),
    },
    PlatformProfile {
        name: "depop",
        domains: &["depop.com"],
        secondary_view_selector: Some("a[href$='/reviews/']"),
        bio_selector: Some("[data-testid='bio']"),
    },
    PlatformProfile {
        name: "vinted",
        domains: &[
            "vinted.com",
            "vinted.co.uk",
            "vinted.de",
            "vinted.fr",
            "vinted.nl",
            "vinted.pl",
        ],
        secondary_view_selector: Some("a[href*='feedback']"),
        bio_selector: Some("[itemprop='description']"),
    },
    PlatformProfile {
        name: "poshmark",
        domains: &["poshmark.com", "poshmark.ca"],
        secondary_view_selector: None,
        bio_selector: Some("[data-et-name='about']"),
    },
    PlatformProfile {
        name: "mercari",
        domains: &["mercari.com"],
        secondary_view_selector: Some("a[href*='reviews']"),
        bio_selector: Some("[data-testid='ProfileIntroduction']"),
    },
    PlatformProfile {
        name: "instagram",
        domains: &["instagram.com"],
        secondary_view_selector: None,
        bio_selector: Some("header section span[dir='auto']"),
    },
    PlatformProfile {
        name: "x",
        domains: &["x.com", "twitter.com"],
        secondary_view_selector: None,
        bio_selector: Some("[data-testid='UserDescription']"),
    },
    PlatformProfile {
        name: "tiktok",
        domains: &["tiktok.com"],
        secondary_view_selector: None,
        bio_selector: Some("[data-e2e='user-bio']"),
    },
    PlatformProfile {
        name: "linkedin",
        domains: &["linkedin.com"],
        secondary_view_selector: None,
        bio_selector: Some("#about"),
    },
];

/// Classify a profile URL against the registry. First match wins; hosts
/// that match nothing yield [`UNKNOWN`], never an error.
pub fn classify(url: &Url) -> &'static PlatformProfile {
    let host = match url.host_str() {
        Some(h) => h.to_ascii_lowercase(),
        None => return &UNKNOWN,
    };
    let host = host.strip_prefix("www.").unwrap_or(&host);

    for platform in PLATFORMS {
        let hit = platform
            .domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")));
        if hit {
            return platform;
        }
    }
    &UNKNOWN
}
