//! Built-in Luxembourg news sources.
//!
//! | Media | Search template | Pagination |
//! |-------|-----------------|------------|
//! | rtl.lu, today.rtl.lu, infos.rtl.lu | `/search?q={query}&p={page}` | placeholder |
//! | everything else | site specific | "next" link |

use super::MediaSource;

/// Substrings that identify links back into a site's own search pages.
pub fn default_excludes() -> Vec<String> {
    [
        "/search",
        "search?",
        "/recherche",
        "recherche?",
        "/suche",
        "suche?",
        "/pesquisa",
        "pesquisa?",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// `(media_id, search_url, domain)` for every built-in source.
const SOURCES: &[(&str, &str, &str)] = &[
    ("rtl.lu", "https://rtl.lu/search?q={query}&p={page}", "rtl.lu"),
    ("today.rtl.lu", "https://today.rtl.lu/search?q={query}&p={page}", "today.rtl.lu"),
    ("infos.rtl.lu", "https://infos.rtl.lu/search?q={query}&p={page}", "infos.rtl.lu"),
    ("lessentiel.lu", "https://lessentiel.lu/fr/search?q={query}", "lessentiel.lu"),
    ("lequotidien.lu", "https://lequotidien.lu/page/1/?s={query}", "lequotidien.lu"),
    ("tageblatt.lu", "https://tageblatt.lu/?s={query}", "tageblatt.lu"),
    ("virgule.lu", "https://virgule.lu/recherche/?q={query}", "virgule.lu"),
    ("wort.lu", "https://wort.lu/suche/?q={query}", "wort.lu"),
    ("contacto.lu", "https://contacto.lu/pesquisa/?q={query}", "contacto.lu"),
    ("luxtimes.lu", "https://luxtimes.lu/search/?q={query}", "luxtimes.lu"),
    (
        "infogreen.lu",
        "https://infogreen.lu/spip.php?page=recherche&lang=fr&recherche={query}",
        "infogreen.lu",
    ),
    ("chronicle.lu", "https://chronicle.lu/search/{query}", "chronicle.lu"),
    ("siliconluxembourg.lu", "https://siliconluxembourg.lu/?s={query}", "siliconluxembourg.lu"),
    (
        "paperjam.lu",
        "https://paperjam.lu/search?numericRefinementList%5BpublicationDate%5D=Tous&query={query}",
        "paperjam.lu",
    ),
    (
        "delano.lu",
        "https://delano.lu/search?numericRefinementList%5BpublicationDate%5D=All&query={query}",
        "delano.lu",
    ),
    ("gemengen.lu", "https://gemengen.lu/web/?s={query}", "gemengen.lu"),
    ("reporter.lu", "https://reporter.lu/fr/?s={query}", "reporter.lu"),
];

fn build(media_id: &str, search_url: &str, domain: &str) -> MediaSource {
    MediaSource {
        media_id: media_id.to_string(),
        search_url: search_url.to_string(),
        domain: domain.to_string(),
        search_result_selectors: Vec::new(),
        exclude_url_substrings: default_excludes(),
    }
}

/// The built-in source with this identifier.
pub fn lookup(media_id: &str) -> Option<MediaSource> {
    SOURCES
        .iter()
        .find(|(id, _, _)| *id == media_id)
        .map(|(id, url, domain)| build(id, url, domain))
}

/// Every built-in source, in registry order.
pub fn all() -> Vec<MediaSource> {
    SOURCES
        .iter()
        .map(|(id, url, domain)| build(id, url, domain))
        .collect()
}

/// Resolve a media id, preferring `extra` definitions over the built-ins.
pub fn resolve(media_id: &str, extra: &[MediaSource]) -> Option<MediaSource> {
    extra
        .iter()
        .find(|m| m.media_id == media_id)
        .cloned()
        .or_else(|| lookup(media_id))
}
