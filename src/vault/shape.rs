//! Decoding and encoding of credential rows.
//!
//! A `settings` row carries its token fields in one of two historical
//! layouts: flat columns (`access_token`, `refresh_token`, `expires_at`) or
//! a `settings_data` JSON blob, which may itself be stored as a JSON string.
//! Rows are decoded into one canonical [`StoredToken`] right after the read;
//! writes go back through [`encode`] in the layout the row already uses.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::credential::CredentialRow;

/// Canonical in-memory token tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct StoredToken {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.expires_at.is_none()
    }
}

/// Where a row keeps its token fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageShape {
    Flat,
    Nested,
    Both,
}

/// The JSON blob as found in the row, kept so writes can round-trip its
/// unrelated keys and its string-vs-object encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Blob {
    Absent,
    Object(Map<String, Value>),
    /// Object serialized into a JSON string column value.
    Encoded(Map<String, Value>),
    /// Present but not an object; left untouched.
    Opaque(Value),
}

impl Blob {
    pub fn parse(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Blob::Absent,
            Some(Value::Object(map)) => Blob::Object(map.clone()),
            Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
                Ok(Value::Object(map)) => Blob::Encoded(map),
                _ => Blob::Opaque(Value::String(s.clone())),
            },
            Some(other) => Blob::Opaque(other.clone()),
        }
    }

    fn map(&self) -> Option<&Map<String, Value>> {
        match self {
            Blob::Object(m) | Blob::Encoded(m) => Some(m),
            _ => None,
        }
    }

    fn token(&self) -> StoredToken {
        let Some(map) = self.map() else {
            return StoredToken::default();
        };
        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        StoredToken {
            access_token: text("access_token"),
            refresh_token: text("refresh_token"),
            expires_at: map
                .get("expires_at")
                .or_else(|| map.get("expiry_date"))
                .and_then(parse_expiry),
        }
    }

    /// Writes the token fields into the blob, keeping every other key.
    fn with_token(self, token: &StoredToken) -> Value {
        let (mut map, encoded) = match self {
            Blob::Object(m) => (m, false),
            Blob::Encoded(m) => (m, true),
            Blob::Absent | Blob::Opaque(_) => (Map::new(), false),
        };
        let mut set = |key: &str, value: Option<Value>| match value {
            Some(v) => {
                map.insert(key.to_string(), v);
            }
            None => {
                map.remove(key);
            }
        };
        set("access_token", token.access_token.clone().map(Value::String));
        set("refresh_token", token.refresh_token.clone().map(Value::String));
        set("expires_at", token.expires_at.map(|t| Value::String(t.to_rfc3339())));

        let value = Value::Object(map);
        if encoded {
            Value::String(value.to_string())
        } else {
            value
        }
    }

    fn into_value(self) -> Option<Value> {
        match self {
            Blob::Absent => None,
            Blob::Object(m) => Some(Value::Object(m)),
            Blob::Encoded(m) => Some(Value::String(Value::Object(m).to_string())),
            Blob::Opaque(v) => Some(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCredential {
    pub token: StoredToken,
    pub shape: StorageShape,
    pub status: Option<String>,
}

/// Decodes a row. Flat values win; the blob fills whatever the columns leave empty.
pub fn decode(row: &CredentialRow) -> DecodedCredential {
    let flat = StoredToken {
        access_token: row.access_token.clone().filter(|s| !s.is_empty()),
        refresh_token: row.refresh_token.clone().filter(|s| !s.is_empty()),
        expires_at: row.expires_at,
    };
    let nested = Blob::parse(row.settings_data.as_ref()).token();

    let shape = match (!flat.is_empty(), !nested.is_empty()) {
        (true, true) => StorageShape::Both,
        (false, true) => StorageShape::Nested,
        _ => StorageShape::Flat,
    };

    DecodedCredential {
        token: StoredToken {
            access_token: flat.access_token.or(nested.access_token),
            refresh_token: flat.refresh_token.or(nested.refresh_token),
            expires_at: flat.expires_at.or(nested.expires_at),
        },
        shape,
        status: row.status.clone(),
    }
}

/// Builds the row to upsert for `token`.
///
/// An existing row keeps its layout; a new row is written in both layouts.
/// A successful write clears any re-auth status.
pub fn encode(
    existing: Option<&CredentialRow>,
    user_id: Uuid,
    service_name: &str,
    token: &StoredToken,
) -> CredentialRow {
    let shape = existing
        .map(|row| decode(row).shape)
        .unwrap_or(StorageShape::Both);
    let blob = Blob::parse(existing.and_then(|r| r.settings_data.as_ref()));

    let (columns, settings_data) = match shape {
        StorageShape::Flat => (token.clone(), blob.into_value()),
        StorageShape::Nested => (StoredToken::default(), Some(blob.with_token(token))),
        StorageShape::Both => (token.clone(), Some(blob.with_token(token))),
    };

    CredentialRow {
        user_id,
        service_name: service_name.to_string(),
        access_token: columns.access_token,
        refresh_token: columns.refresh_token,
        expires_at: columns.expires_at,
        settings_data,
        status: None,
        updated_at: Utc::now(),
    }
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS[.fff]` (UTC), or epoch seconds / milliseconds.
pub fn parse_expiry(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            if let Ok(t) = DateTime::parse_from_rfc3339(s) {
                return Some(t.with_timezone(&Utc));
            }
            if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(t.and_utc());
            }
            if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(t.and_utc());
            }
            s.parse::<i64>().ok().and_then(from_epoch)
        }
        Value::Number(n) => n.as_i64().and_then(from_epoch),
        _ => None,
    }
}

fn from_epoch(n: i64) -> Option<DateTime<Utc>> {
    // Anything past 10^11 cannot be seconds for a plausible date.
    if n.abs() >= 100_000_000_000 {
        Utc.timestamp_millis_opt(n).single()
    } else {
        Utc.timestamp_opt(n, 0).single()
    }
}
