/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Field-level merge of wire documents into cached entities.
//!
//! Every merge follows the same rule: if the document carries the field, the
//! cached value is overwritten and the caller learns whether it differed. An
//! absent (or unreadable) field leaves the cached value alone.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

pub type Document = Map<String, Value>;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A cached field type that can be read out of a JSON leaf.
pub trait FieldValue: PartialEq + Sized {
    fn from_json(v: &Value) -> Option<Self>;
}

impl FieldValue for String {
    fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl FieldValue for bool {
    fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => Some(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
            Value::String(s) => Some(s.eq_ignore_ascii_case("true")),
            _ => None,
        }
    }
}

impl FieldValue for u64 {
    fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FieldValue for Option<DateTime<Utc>> {
    fn from_json(v: &Value) -> Option<Self> {
        v.as_str().and_then(parse_time).map(Some)
    }
}

/// Parses `YYYY-MM-DDTHH:MM:SSZ` as UTC. RFC 3339 with fractional seconds or
/// an explicit offset is accepted as well since some servers emit it.
pub fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, TIME_FORMAT) {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Walks `path` through nested maps.
pub fn lookup<'a>(doc: &'a Document, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut cur = doc.get(*first)?;
    for name in rest {
        cur = cur.as_object()?.get(*name)?;
    }
    Some(cur)
}

pub fn sub_document<'a>(doc: &'a Document, name: &str) -> Option<&'a Document> {
    doc.get(name).and_then(Value::as_object)
}

/// Reads a string leaf, empty when absent.
pub fn str_at(doc: &Document, path: &[&str]) -> String {
    lookup(doc, path)
        .and_then(String::from_json)
        .unwrap_or_default()
}

pub fn has(doc: &Document, name: &str) -> bool {
    doc.contains_key(name)
}

/// Merges `doc[path..]` into `field`. Returns true when the stored value changed.
pub fn merge_field<T: FieldValue>(doc: &Document, field: &mut T, path: &[&str]) -> bool {
    let Some(next) = lookup(doc, path).and_then(T::from_json) else {
        return false;
    };
    if *field == next {
        return false;
    }
    *field = next;
    true
}

/// `pump_io.proxyURL` of a (sub-)document, empty when absent.
pub fn proxy_url(doc: &Document) -> String {
    str_at(doc, &["pump_io", "proxyURL"])
}

/// Treats `pump_io.proxyURL` and `url` as one logical field, proxy first.
pub fn merge_url_or_proxy(doc: &Document, field: &mut String) -> bool {
    let proxy = proxy_url(doc);
    if proxy.is_empty() {
        return merge_field(doc, field, &["url"]);
    }
    if *field == proxy {
        return false;
    }
    *field = proxy;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn absent_field_keeps_value() {
        let d = doc(json!({"content": "hi"}));
        let mut name = "old".to_string();
        assert!(!merge_field(&d, &mut name, &["displayName"]));
        assert_eq!(name, "old");
    }

    #[test]
    fn reports_change_only_on_difference() {
        let d = doc(json!({"content": "hi", "liked": true, "totalItems": 3}));
        let mut content = String::new();
        let mut liked = false;
        let mut total = 0u64;
        assert!(merge_field(&d, &mut content, &["content"]));
        assert!(merge_field(&d, &mut liked, &["liked"]));
        assert!(merge_field(&d, &mut total, &["totalItems"]));
        assert!(!merge_field(&d, &mut content, &["content"]));
        assert!(!merge_field(&d, &mut liked, &["liked"]));
        assert!(!merge_field(&d, &mut total, &["totalItems"]));
        assert_eq!(total, 3);
    }

    #[test]
    fn nested_paths() {
        let d = doc(json!({
            "links": {"next": {"href": "https://pump.example/next"}},
            "location": {"displayName": "Helsinki"}
        }));
        let mut next = String::new();
        let mut loc = String::new();
        assert!(merge_field(&d, &mut next, &["links", "next", "href"]));
        assert!(merge_field(&d, &mut loc, &["location", "displayName"]));
        assert_eq!(next, "https://pump.example/next");
        assert_eq!(loc, "Helsinki");

        let mut prev = "keep".to_string();
        assert!(!merge_field(&d, &mut prev, &["links", "prev", "href"]));
        assert_eq!(prev, "keep");
    }

    #[test]
    fn timestamps_parse_as_utc_and_bad_input_is_ignored() {
        let d = doc(json!({"published": "2013-05-28T16:43:06Z", "updated": "yesterday"}));
        let mut published = None;
        assert!(merge_field(&d, &mut published, &["published"]));
        assert_eq!(
            published,
            Some(Utc.with_ymd_and_hms(2013, 5, 28, 16, 43, 6).unwrap())
        );

        let mut updated = published;
        assert!(!merge_field(&d, &mut updated, &["updated"]));
        assert_eq!(updated, published);
    }

    #[test]
    fn proxy_wins_over_url() {
        let d = doc(json!({
            "url": "https://a.example/img.png",
            "pump_io": {"proxyURL": "https://proxy.example/img.png"}
        }));
        let mut url = String::new();
        assert!(merge_url_or_proxy(&d, &mut url));
        assert_eq!(url, "https://proxy.example/img.png");
        assert!(!merge_url_or_proxy(&d, &mut url));

        let plain = doc(json!({"url": "https://a.example/img.png"}));
        assert!(merge_url_or_proxy(&plain, &mut url));
        assert_eq!(url, "https://a.example/img.png");
    }
}
