//! Image reference discovery: `<img src>` values → absolute, deduplicated URLs.
//!
//! No DOM is built. A single case-insensitive pattern finds `src` attributes
//! inside `<img ...>` tags; each value is resolved against the page's base
//! URL with standard relative-reference rules.

use crate::output::ImageReference;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, trace};
use url::Url;

static IMG_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img[^>]+src\s*=\s*['"]([^'"]+)['"]"#).expect("valid <img src> pattern")
});

/// Collect every image reference in `html`, in first-occurrence order.
///
/// Values that do not resolve to a valid absolute URL are skipped, and a
/// URL seen a second time keeps its first index. An empty result means the
/// page has nothing to fetch.
pub fn extract(html: &str, base_url: &Url) -> Vec<ImageReference> {
    let mut seen = HashSet::new();
    let mut refs = Vec::new();

    for caps in IMG_SRC.captures_iter(html) {
        let raw = &caps[1];
        let url = match base_url.join(raw) {
            Ok(url) => url,
            Err(e) => {
                debug!("Skipping unresolvable image src {:?}: {}", raw, e);
                continue;
            }
        };

        if !seen.insert(url.clone()) {
            trace!("Duplicate image reference {}", url);
            continue;
        }

        refs.push(ImageReference {
            index: refs.len(),
            url,
        });
    }

    debug!("Extracted {} distinct image references", refs.len());
    refs
}
