//! Null-safe lookup of dotted paths in JSON documents
//!
//! Supported syntax: an optional leading `$` or `$.`, `.field` segments,
//! `field[index]` array access and bare numeric segments (`items.0.id`).
//! Any missing key, out-of-range index or non-traversable value yields
//! `null`.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

/// Parse a path into segments, `None` if it is malformed
fn parse(path: &str) -> Option<Vec<Segment<'_>>> {
    let path = path.trim();
    let path = path
        .strip_prefix("$.")
        .or_else(|| path.strip_prefix('$'))
        .unwrap_or(path);

    let mut segments = Vec::new();
    for part in path.split('.').filter(|p| !p.is_empty()) {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };

        if !key.is_empty() {
            match key.parse::<usize>() {
                Ok(index) if rest.is_empty() => segments.push(Segment::Index(index)),
                _ => segments.push(Segment::Key(key)),
            }
        }

        while !rest.is_empty() {
            let inner = rest.strip_prefix('[')?;
            let close = inner.find(']')?;
            let index = inner[..close].trim().parse::<usize>().ok()?;
            segments.push(Segment::Index(index));
            rest = &inner[close + 1..];
        }
    }
    Some(segments)
}

/// Walk `path` through `document`
pub fn lookup(document: &Value, path: &str) -> Value {
    let Some(segments) = parse(path) else {
        return Value::Null;
    };

    let mut current = document;
    for segment in segments {
        let next = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key),
            (Segment::Index(index), Value::Array(items)) => items.get(index),
            // numeric segment used as an object key, e.g. {"0": ...}
            (Segment::Index(index), Value::Object(map)) => map.get(&index.to_string()),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// Decode `body` as JSON and walk `path`. Undecodable bodies behave like an
/// empty document.
pub fn lookup_in_body(body: &[u8], path: &str) -> Value {
    let document: Value =
        serde_json::from_slice(body).unwrap_or_else(|_| Value::Object(Default::default()));
    lookup(&document, path)
}
