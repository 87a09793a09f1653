//! Cached HTTP response and its storage encoding.
//!
//! Stored layout:
//!
//! ```text
//! [u32 LE meta length][JSON meta: status + headers][raw body bytes]
//! ```
//!
//! The JSON head keeps the record self-describing while the body is written
//! verbatim, so binary payloads are never re-encoded. Header values are JSON
//! strings when they are UTF-8 and byte arrays otherwise.

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const META_LEN_BYTES: usize = 4;

/// One header name with all of its values, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderField {
    pub name: String,
    #[serde(with = "raw_values")]
    pub values: Vec<Vec<u8>>,
}

mod raw_values {
    use super::*;

    #[derive(Serialize)]
    #[serde(untagged)]
    enum ValueRef<'a> {
        Text(&'a str),
        Raw(&'a [u8]),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Value {
        Text(String),
        Raw(Vec<u8>),
    }

    pub fn serialize<S: Serializer>(values: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|value| match std::str::from_utf8(value) {
            Ok(text) => ValueRef::Text(text),
            Err(_) => ValueRef::Raw(value),
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let values = Vec::<Value>::deserialize(deserializer)?;
        Ok(values
            .into_iter()
            .map(|value| match value {
                Value::Text(text) => text.into_bytes(),
                Value::Raw(raw) => raw,
            })
            .collect())
    }
}

/// A fully drained origin response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub status: u16,
    pub headers: Vec<HeaderField>,
    pub body: Bytes,
}

#[derive(Serialize, Deserialize)]
struct EntryMeta {
    status: u16,
    headers: Vec<HeaderField>,
}

/// A stored record that cannot be turned back into an entry.
#[derive(Debug, thiserror::Error)]
pub enum EntryDecodeError {
    #[error("record truncated: {0}")]
    Truncated(&'static str),
    #[error("invalid entry metadata: {0}")]
    Meta(#[from] serde_json::Error),
}

impl CacheEntry {
    pub fn new(status: u16, headers: Vec<HeaderField>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Append a value, grouping it with earlier values of the same name
    /// (matched case-insensitively).
    pub fn append_header(&mut self, name: &str, value: impl Into<Vec<u8>>) {
        match self
            .headers
            .iter_mut()
            .find(|field| field.name.eq_ignore_ascii_case(name))
        {
            Some(field) => field.values.push(value.into()),
            None => self.headers.push(HeaderField {
                name: name.to_string(),
                values: vec![value.into()],
            }),
        }
    }

    /// All values recorded for `name`.
    pub fn header_values(&self, name: &str) -> &[Vec<u8>] {
        self.headers
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
            .map(|field| field.values.as_slice())
            .unwrap_or(&[])
    }

    /// Serialize for the backing store.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let meta = serde_json::to_vec(&EntryMeta {
            status: self.status,
            headers: self.headers.clone(),
        })?;

        let mut out = Vec::with_capacity(META_LEN_BYTES + meta.len() + self.body.len());
        out.extend_from_slice(&(meta.len() as u32).to_le_bytes());
        out.extend_from_slice(&meta);
        out.extend_from_slice(&self.body);
        Ok(out)
    }

    /// Parse a record written by [`CacheEntry::encode`].
    pub fn decode(raw: &[u8]) -> Result<Self, EntryDecodeError> {
        if raw.len() < META_LEN_BYTES {
            return Err(EntryDecodeError::Truncated("missing length prefix"));
        }
        let (len_bytes, rest) = raw.split_at(META_LEN_BYTES);
        let meta_len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
            as usize;
        if rest.len() < meta_len {
            return Err(EntryDecodeError::Truncated("metadata shorter than prefix"));
        }

        let (meta, body) = rest.split_at(meta_len);
        let meta: EntryMeta = serde_json::from_slice(meta)?;
        Ok(Self {
            status: meta.status,
            headers: meta.headers,
            body: Bytes::copy_from_slice(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_text() -> CacheEntry {
        let mut entry = CacheEntry::new(200, Vec::new(), &b"hello"[..]);
        entry.append_header("Content-Type", "text/plain");
        entry
    }

    #[test]
    fn round_trip_is_exact() {
        let entry = plain_text();
        let decoded = CacheEntry::decode(&entry.encode().unwrap()).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.header_values("content-type"), [b"text/plain".to_vec()]);
    }

    #[test]
    fn multi_value_order_survives() {
        let mut entry = CacheEntry::new(201, Vec::new(), Bytes::new());
        entry.append_header("Set-Cookie", "a=1");
        entry.append_header("X-Trace", "t");
        entry.append_header("set-cookie", "b=2");

        let decoded = CacheEntry::decode(&entry.encode().unwrap()).unwrap();
        assert_eq!(decoded.headers[0].name, "Set-Cookie");
        assert_eq!(decoded.headers[0].values, [b"a=1".to_vec(), b"b=2".to_vec()]);
        assert_eq!(decoded.headers[1].name, "X-Trace");
    }

    #[test]
    fn non_utf8_header_values_keep_their_bytes() {
        let latin1 = b"attachment; filename=caf\xe9.txt".to_vec();
        let mut entry = CacheEntry::new(200, Vec::new(), Bytes::new());
        entry.append_header("Content-Disposition", latin1.clone());
        entry.append_header("Content-Type", "text/plain");

        let raw = entry.encode().unwrap();
        let decoded = CacheEntry::decode(&raw).unwrap();
        assert_eq!(decoded.header_values("content-disposition"), [latin1]);
        assert_eq!(decoded.header_values("content-type"), [b"text/plain".to_vec()]);

        let meta_len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        let meta = std::str::from_utf8(&raw[4..4 + meta_len]).unwrap();
        assert!(meta.contains("\"text/plain\""));
    }

    #[test]
    fn binary_body_is_stored_verbatim() {
        let body: Vec<u8> = (0..=255).collect();
        let entry = CacheEntry::new(200, Vec::new(), body.clone());
        let raw = entry.encode().unwrap();
        assert!(raw.ends_with(&body));
        assert_eq!(CacheEntry::decode(&raw).unwrap().body.as_ref(), body.as_slice());
    }

    #[test]
    fn corrupt_records_are_rejected() {
        assert!(matches!(
            CacheEntry::decode(&[1, 0]),
            Err(EntryDecodeError::Truncated(_))
        ));
        assert!(matches!(
            CacheEntry::decode(&[200, 0, 0, 0, b'{']),
            Err(EntryDecodeError::Truncated(_))
        ));
        assert!(matches!(
            CacheEntry::decode(&[3, 0, 0, 0, b'n', b'o', b'p']),
            Err(EntryDecodeError::Meta(_))
        ));
    }
}
