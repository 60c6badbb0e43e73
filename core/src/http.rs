//! HTTP data types shared by the descriptor, the host invocation and the
//! canonical response.
//!
//! # Design
//! Everything here is plain owned data. The adapter never touches the network
//! itself; it hands these values to the host request primitive and receives
//! them back from it. Owned `String` / `Vec` fields keep the values easy to
//! move across threads and across the C boundary in `mp-adapter-ffi`.

use serde::{Deserialize, Serialize};

/// Ordered header list with case-insensitive names.
///
/// Lookups and removals ignore ASCII case, while the casing the caller used
/// is preserved for whatever survives. Serializes as a list of
/// `[name, value]` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Value of the first header whose name matches `name`, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set `name` to `value`, dropping every existing entry with the same
    /// name in any casing.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.0.push((name, value.into()));
    }

    /// Append without replacing existing entries.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Remove every entry named `name` in any casing, returning the first
    /// removed value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let mut removed = None;
        self.0.retain(|(key, value)| {
            if key.eq_ignore_ascii_case(name) {
                if removed.is_none() {
                    removed = Some(value.clone());
                }
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.0.retain(|(key, value)| keep(key, value));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<(String, String)> {
        self.0
    }
}

impl From<Vec<(String, String)>> for Headers {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Request payload handed to the host as-is.
///
/// From JSON, a string becomes `Text` and any other value becomes `Json`.
/// `Bytes` and `Form` can only be built in code.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RequestBody {
    Text(String),
    Json(serde_json::Value),
    #[serde(skip_deserializing)]
    Bytes(Vec<u8>),
    /// Multipart form. The host chooses the boundary and the content type.
    #[serde(skip_deserializing)]
    Form(FormData),
}

impl RequestBody {
    pub fn is_form(&self) -> bool {
        matches!(self, RequestBody::Form(_))
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_string())
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<FormData> for RequestBody {
    fn from(form: FormData) -> Self {
        RequestBody::Form(form)
    }
}

/// A multipart form payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    fields: Vec<FormField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: FormValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    File {
        file_name: String,
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(FormField {
            name: name.into(),
            value: FormValue::Text(value.into()),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.fields.push(FormField {
            name: name.into(),
            value: FormValue::File {
                file_name: file_name.into(),
                content_type,
                bytes,
            },
        });
        self
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }
}

/// Payload the host delivers on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    Text(String),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl Default for ResponseData {
    fn default() -> Self {
        ResponseData::Text(String::new())
    }
}

impl ResponseData {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseData::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseData::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Response-type hint forwarded to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Json,
    Text,
    #[serde(rename = "arraybuffer")]
    ArrayBuffer,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Json => "json",
            ResponseType::Text => "text",
            ResponseType::ArrayBuffer => "arraybuffer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let headers: Headers = [("Content-Type", "text/plain")].into_iter().collect();
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert!(headers.contains("CONTENT-TYPE"));
        assert!(!headers.contains("accept"));
    }

    #[test]
    fn insert_replaces_every_casing() {
        let mut headers: Headers = [("authorization", "a"), ("X-Other", "x"), ("AUTHORIZATION", "b")]
            .into_iter()
            .collect();
        headers.insert("Authorization", "c");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("authorization"), Some("c"));
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec![("X-Other", "x"), ("Authorization", "c")]
        );
    }

    #[test]
    fn remove_returns_first_match_and_drops_all() {
        let mut headers: Headers = [("referer", "one"), ("Referer", "two")].into_iter().collect();
        assert_eq!(headers.remove("REFERER").as_deref(), Some("one"));
        assert!(headers.is_empty());
        assert_eq!(headers.remove("referer"), None);
    }

    #[test]
    fn headers_deserialize_from_pairs() {
        let headers: Headers = serde_json::from_str(r#"[["Accept","*/*"]]"#).unwrap();
        assert_eq!(headers.get("accept"), Some("*/*"));
    }

    #[test]
    fn body_from_json_string_is_text() {
        let body: RequestBody = serde_json::from_str(r#""hello""#).unwrap();
        assert_eq!(body, RequestBody::Text("hello".to_string()));
        let body: RequestBody = serde_json::from_str(r#"{"a":1}"#).unwrap();
        assert!(matches!(body, RequestBody::Json(_)));
    }

    #[test]
    fn form_body_is_detected() {
        let body = RequestBody::from(FormData::new().text("name", "value"));
        assert!(body.is_form());
        assert!(!RequestBody::from("text").is_form());
    }

    #[test]
    fn response_type_uses_host_names() {
        let rt: ResponseType = serde_json::from_str(r#""arraybuffer""#).unwrap();
        assert_eq!(rt, ResponseType::ArrayBuffer);
        assert_eq!(ResponseType::Text.as_str(), "text");
    }
}
