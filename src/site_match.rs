// src/site_match.rs
//
// CompanyMatcher: resolves a free-text work-site string against the
// configured rate table. Pure decision function; the interactive
// "register this site" step is a capability the caller supplies.

use crate::model::SiteRate;
use rust_decimal::Decimal;
use tracing::info;

/// Minimum similarity score for a fuzzy match to be accepted.
pub const MATCH_THRESHOLD: f64 = 0.70;

#[derive(Debug, Clone, PartialEq)]
pub struct SiteMatch {
    pub site: Option<SiteRate>,
    pub score: f64,
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Returns the best-scoring known site and its score. Case-insensitive
/// exact matches win outright with score 1.0; anything scoring below
/// [`MATCH_THRESHOLD`] is reported as unknown.
pub fn match_site(free_text: &str, known: &[SiteRate]) -> SiteMatch {
    let needle = normalize_name(free_text);
    if needle.is_empty() || known.is_empty() {
        return SiteMatch {
            site: None,
            score: 0.0,
        };
    }

    let mut best: Option<(&SiteRate, f64)> = None;
    for site in known {
        let candidate = normalize_name(&site.site_name);
        if candidate == needle {
            return SiteMatch {
                site: Some(site.clone()),
                score: 1.0,
            };
        }
        let score = strsim::sorensen_dice(&needle, &candidate);
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((site, score));
        }
    }

    match best {
        Some((site, score)) if score >= MATCH_THRESHOLD => SiteMatch {
            site: Some(site.clone()),
            score,
        },
        Some((_, score)) => SiteMatch { site: None, score },
        None => SiteMatch {
            site: None,
            score: 0.0,
        },
    }
}

/// What gets surfaced to a human when an unknown site turns up.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRegistration {
    pub site_name: String,
    pub default_gas_allowance: Decimal,
}

impl SiteRegistration {
    pub fn new(site_name: &str) -> Self {
        Self {
            site_name: site_name.trim().to_string(),
            default_gas_allowance: Decimal::ZERO,
        }
    }
}

/// Capability interface for registering an unmatched site. The engine has
/// no idea whether the other end is a dialog, a CLI prompt or a test
/// double; it only sees the confirmed rate, or a decline.
pub trait SiteRegistrar {
    fn register(&mut self, request: &SiteRegistration) -> Option<SiteRate>;
}

/// Accepts every registration request with a fixed gas allowance.
pub struct AutoAcceptRegistrar {
    pub gas_allowance: Decimal,
}

impl SiteRegistrar for AutoAcceptRegistrar {
    fn register(&mut self, request: &SiteRegistration) -> Option<SiteRate> {
        Some(SiteRate {
            site_name: request.site_name.clone(),
            gas_allowance: self.gas_allowance,
        })
    }
}

/// Declines every request. Used by non-interactive callers; the site can
/// be added to the rate table out-of-band and the payslip recomputed.
pub struct DecliningRegistrar;

impl SiteRegistrar for DecliningRegistrar {
    fn register(&mut self, request: &SiteRegistration) -> Option<SiteRate> {
        info!(
            "work site '{}' is not in the rate table; register it with \
             `register-site` and recompute",
            request.site_name
        );
        None
    }
}
