//! `Link` header parsing for cursor pagination.
//!
//! Mastodon-compatible servers return page cursors as
//! `<https://host/api/v1/timelines/home?max_id=1>; rel="next", <...>; rel="prev"`.

/// The `next`/`prev` targets of a `Link` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Links {
    pub next: Option<String>,
    pub prev: Option<String>,
}

pub fn parse_link_header(value: &str) -> Links {
    let mut links = Links::default();

    for part in value.split(',') {
        let mut segments = part.split(';');
        let Some(target) = segments.next().map(str::trim) else {
            continue;
        };
        let Some(url) = target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
        else {
            continue;
        };

        for param in segments {
            let Some((name, rel)) = param.trim().split_once('=') else {
                continue;
            };
            if !name.trim().eq_ignore_ascii_case("rel") {
                continue;
            }
            for rel in rel.trim().trim_matches('"').split_whitespace() {
                match rel {
                    "next" => links.next = Some(url.to_owned()),
                    "prev" | "previous" => links.prev = Some(url.to_owned()),
                    _ => {}
                }
            }
        }
    }

    links
}

/// Append `limit` to a first-page path, respecting an existing query string.
pub fn with_limit(path: &str, limit: u32) -> String {
    let sep = if path.contains('?') { '&' } else { '?' };
    format!("{path}{sep}limit={limit}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_next_and_prev() {
        let header = "<https://example.com/api/v1/timelines/home?max_id=105>; rel=\"next\", \
                      <https://example.com/api/v1/timelines/home?min_id=110>; rel=\"prev\"";
        let links = parse_link_header(header);
        assert_eq!(
            links.next.as_deref(),
            Some("https://example.com/api/v1/timelines/home?max_id=105")
        );
        assert_eq!(
            links.prev.as_deref(),
            Some("https://example.com/api/v1/timelines/home?min_id=110")
        );
    }

    #[test]
    fn ignores_malformed_and_unknown_rels() {
        let links = parse_link_header("garbage, <https://a/b>; rel=\"self\", <https://a/c>");
        assert_eq!(links, Links::default());

        let links = parse_link_header("<https://a/n>;rel=next");
        assert_eq!(links.next.as_deref(), Some("https://a/n"));
    }

    #[test]
    fn limit_is_appended() {
        assert_eq!(with_limit("/api/v1/timelines/home", 20), "/api/v1/timelines/home?limit=20");
        assert_eq!(
            with_limit("/api/v1/timelines/public?local=true", 5),
            "/api/v1/timelines/public?local=true&limit=5"
        );
    }
}
