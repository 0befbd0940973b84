//! `Link` header parsing for cursor pagination.
//!
//! Timeline responses carry paging anchors in an RFC 8288 `Link` header:
//!
//! ```text
//! Link: <https://host/api/v1/timelines/home?max_id=103270>; rel="next",
//!       <https://host/api/v1/timelines/home?min_id=103280>; rel="prev"
//! ```
//!
//! Only the `max_id` of the `next` link and the `min_id` of the `prev` link
//! matter here; everything else in the URLs is noise we already know.

use tootline_types::StatusId;

/// Paging anchors pulled out of a `Link` header.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PageLinks {
    pub next_max_id: Option<StatusId>,
    pub prev_min_id: Option<StatusId>,
}

/// Parse a raw `Link` header value. Unrecognized or malformed parts are
/// skipped; an empty result is an ordinary outcome (first page, single page).
pub fn parse_link_header(raw: &str) -> PageLinks {
    let mut links = PageLinks::default();
    for part in raw.split(',') {
        let part = part.trim();
        let (Some(start), Some(end)) = (part.find('<'), part.find('>')) else {
            continue;
        };
        if start >= end {
            continue;
        }
        let url = &part[start + 1..end];
        let params = &part[end + 1..];
        if has_rel(params, "next") {
            links.next_max_id = query_param(url, "max_id").map(StatusId::from);
        } else if has_rel(params, "prev") {
            links.prev_min_id = query_param(url, "min_id").map(StatusId::from);
        }
    }
    links
}

fn has_rel(params: &str, rel: &str) -> bool {
    params.split(';').any(|p| {
        p.trim()
            .strip_prefix("rel=")
            .is_some_and(|v| v.trim_matches('"') == rel)
    })
}

fn query_param<'a>(url: &'a str, name: &str) -> Option<&'a str> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next()?;
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key == name {
            return Some(value);
        }
    }
    None
}

// ============================================================================
// Tests
// ============================================================================
