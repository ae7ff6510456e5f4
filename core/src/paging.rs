//! Link-header pagination.
//!
//! List endpoints page their results with an RFC 8288 `Link` header
//! (`<url>; rel="next"`, ...) and report the full size in `X-Total-Count`.
//! [`PageInfo`] reads both from a response's headers; walking the pages is
//! done by [`BridgeClient::pager`](crate::client::BridgeClient::pager).

use std::collections::BTreeMap;

pub const LINK_HEADER: &str = "link";
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// One target from a `Link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    /// First word of the `rel` value, lowercased: `first`, `prev`, `next`
    /// or `last` for paged lists.
    pub rel: String,
    pub url: String,
    /// The full `rel` value as sent.
    pub name: String,
}

/// Parse a `Link` header into its targets keyed by `rel`.
///
/// Entries without a `<url>` or a `rel` are skipped; a later entry with the
/// same `rel` replaces an earlier one.
pub fn parse_link_header(header: &str) -> BTreeMap<String, PageLink> {
    let mut links = BTreeMap::new();
    for entry in header.split(',') {
        let entry = entry.trim();
        let Some(rest) = entry.strip_prefix('<') else {
            continue;
        };
        let Some((url, params)) = rest.split_once('>') else {
            continue;
        };
        let Some(name) = params.split(';').find_map(rel_param) else {
            continue;
        };
        let Some(rel) = name.split_whitespace().next() else {
            continue;
        };
        let rel = rel.to_ascii_lowercase();
        links.insert(
            rel.clone(),
            PageLink {
                rel,
                url: url.trim().to_string(),
                name: name.to_string(),
            },
        );
    }
    links
}

fn rel_param(param: &str) -> Option<&str> {
    let (key, value) = param.split_once('=')?;
    if !key.trim().eq_ignore_ascii_case("rel") {
        return None;
    }
    let value = value.trim().trim_matches('"').trim();
    (!value.is_empty()).then_some(value)
}

/// Paging metadata of one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub links: BTreeMap<String, PageLink>,
    /// `None` when the backend did not report a usable total.
    pub total: Option<u64>,
}

impl PageInfo {
    pub fn from_headers(headers: &[(String, String)]) -> Self {
        let find = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        };
        Self {
            links: find(LINK_HEADER).map(parse_link_header).unwrap_or_default(),
            total: find(TOTAL_COUNT_HEADER).and_then(|v| v.trim().parse().ok()),
        }
    }

    pub fn has_rel(&self, rel: &str) -> bool {
        self.links.contains_key(rel)
    }

    pub fn next(&self) -> Option<&PageLink> {
        self.links.get("next")
    }
}

/// One page of a list plus its paging metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: T,
    pub info: PageInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_rel() {
        let links = parse_link_header(
            r#"<https://h/api/4.0/users/search?page=1>; rel="first", <https://h/api/4.0/users/search?page=3>; rel="next", <https://h/api/4.0/users/search?page=9>; rel="last""#,
        );
        assert_eq!(links.len(), 3);
        assert_eq!(links["next"].url, "https://h/api/4.0/users/search?page=3");
        assert_eq!(links["last"].url, "https://h/api/4.0/users/search?page=9");
        assert_eq!(links["first"].rel, "first");
    }

    #[test]
    fn rel_key_is_first_lowercased_word() {
        let links = parse_link_header(r#"< https://h/p?page=2 >; rel=" Next page ""#);
        let next = &links["next"];
        assert_eq!(next.url, "https://h/p?page=2");
        assert_eq!(next.name, "Next page");
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let links = parse_link_header(r#"https://h/p; rel="next", <https://h/q>, <https://h/r>; title="x", <https://h/s>; rel="prev""#);
        assert_eq!(links.keys().collect::<Vec<_>>(), vec!["prev"]);
    }

    #[test]
    fn info_reads_headers_case_insensitively() {
        let info = PageInfo::from_headers(&[
            ("Link".to_string(), r#"<https://h/p?page=2>; rel="next""#.to_string()),
            ("X-Total-Count".to_string(), " 42 ".to_string()),
        ]);
        assert_eq!(info.total, Some(42));
        assert!(info.has_rel("next"));
        assert_eq!(info.next().unwrap().url, "https://h/p?page=2");
    }

    #[test]
    fn missing_headers_mean_a_single_page() {
        let info = PageInfo::from_headers(&[("X-Total-Count".to_string(), "many".to_string())]);
        assert_eq!(info, PageInfo::default());
        assert!(info.next().is_none());
    }
}
