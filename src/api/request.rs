//! Request decoding
//!
//! Query strings, form bodies with bracketed keys (`create[name]=x`) and
//! JSON bodies all end up as a JSON object of parameters.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Parameters passed to `create` and `update` handlers
pub type Params = Map<String, Value>;

/// HTTP method of an API request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read
    Get,
    /// Create
    Post,
    /// Update
    Put,
    /// Delete
    Delete,
}

impl Method {
    /// Method from the request line, `None` for unsupported methods
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Request line name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// Decoded API request
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    /// Request method as sent
    pub method: String,
    /// Path without the query string
    pub path: String,
    /// Decoded query string
    pub query: HashMap<String, String>,
    /// Header names lower-cased
    pub headers: Vec<(String, String)>,
    /// Raw body
    pub body: Option<String>,
}

impl ApiRequest {
    /// Build a request from a request target such as `/api/jobs?limit=5`
    pub fn new(method: &str, target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        Self {
            method: method.to_string(),
            path: path.to_string(),
            query: parse_query_string(query),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// First header with the given (lower-case) name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn is_json(&self) -> bool {
        self.header("content-type")
            .map(|ct| ct.to_ascii_lowercase().starts_with("application/json"))
            .unwrap_or(false)
    }

    /// Parameters nested under `create`, from the query string and body
    pub fn create_params(&self) -> Params {
        let mut params = self.query_params("create");
        match self.body.as_deref() {
            Some(body) if self.is_json() => merge(&mut params, json_section(body, "create")),
            Some(body) => merge(&mut params, form_section(body, "create")),
            None => {}
        }
        params
    }

    /// Parameters nested under `update`.
    ///
    /// Form bodies are decoded one `&` separated chunk at a time and only
    /// keys below `update` are kept, so very large updates are never cut
    /// short by a parameter count limit.
    pub fn update_params(&self) -> Params {
        let mut params = self.query_params("update");
        match self.body.as_deref() {
            Some(body) if self.is_json() => merge(&mut params, json_section(body, "update")),
            Some(body) => {
                for chunk in body.split('&') {
                    merge(&mut params, form_section(chunk, "update"));
                }
            }
            None => {}
        }
        params
    }

    fn query_params(&self, section: &str) -> Params {
        let mut root = Params::new();
        for (key, value) in &self.query {
            insert_form_value(&mut root, key, value);
        }
        take_section(root, section)
    }
}

fn merge(into: &mut Params, from: Params) {
    for (key, value) in from {
        into.insert(key, value);
    }
}

fn take_section(mut root: Params, section: &str) -> Params {
    match root.remove(section) {
        Some(Value::Object(map)) => map,
        _ => Params::new(),
    }
}

fn json_section(body: &str, section: &str) -> Params {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(root)) => take_section(root, section),
        Ok(_) => Params::new(),
        Err(e) => {
            tracing::debug!("Ignoring malformed JSON body: {}", e);
            Params::new()
        }
    }
}

fn form_section(body: &str, section: &str) -> Params {
    let mut root = Params::new();
    for (key, value) in parse_pairs(body) {
        insert_form_value(&mut root, &key, &value);
    }
    take_section(root, section)
}

/// Insert a form value under a possibly bracketed key.
///
/// `a[b][c]=v` becomes `{"a": {"b": {"c": "v"}}}`, `a[]=v` appends to a
/// list.
fn insert_form_value(root: &mut Params, key: &str, value: &str) {
    let (head, mut rest) = match key.find('[') {
        Some(i) if i > 0 => (&key[..i], &key[i..]),
        _ => (key, ""),
    };

    let mut segments = Vec::new();
    while let Some(stripped) = rest.strip_prefix('[') {
        match stripped.find(']') {
            Some(end) => {
                segments.push(&stripped[..end]);
                rest = &stripped[end + 1..];
            }
            None => break,
        }
    }

    let slot = root.entry(head.to_string()).or_insert(Value::Null);
    assign(slot, &segments, value);
}

fn assign(slot: &mut Value, segments: &[&str], value: &str) {
    let Some((segment, rest)) = segments.split_first() else {
        *slot = Value::String(value.to_string());
        return;
    };

    if segment.is_empty() {
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            items.push(Value::Null);
            if let Some(last) = items.last_mut() {
                assign(last, rest, value);
            }
        }
    } else {
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(map) = slot {
            let child = map.entry(segment.to_string()).or_insert(Value::Null);
            assign(child, rest, value);
        }
    }
}

fn parse_pairs(input: &str) -> impl Iterator<Item = (String, String)> + '_ {
    input.split('&').filter(|p| !p.is_empty()).map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (urlencoding_decode(key), urlencoding_decode(value))
    })
}

/// Parse query string into key-value pairs
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    parse_pairs(query).collect()
}

/// URL decoding, `+` is a space and invalid escapes are kept as is
pub fn urlencoding_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                        continue;
                    }
                    None => out.push(b'%'),
                }
            }
            b'+' => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Integer prefix of a string, 0 when there is none
///
/// Leading whitespace and a sign are accepted, parsing stops at the first
/// non digit and saturates instead of overflowing.
pub fn intval(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }
    if negative {
        -value
    } else {
        value
    }
}
