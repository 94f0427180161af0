//! Snippet record and its field-map encoding

use crate::error::{Error, Result};
use crate::storage::FieldMap;
use serde::Serialize;

/// Field holding the snippet text
pub const FIELD_CODE: &str = "code";
/// Field holding the remaining view counter as a decimal string
pub const FIELD_VIEWS_LEFT: &str = "views_left";
/// Field holding the parent identifier, empty for originals
pub const FIELD_PARENT_ID: &str = "parentid";
/// Field holding the admin token, absent when none was set
pub const FIELD_TOKEN: &str = "token";

/// Largest view budget the backend counter can decrement (`i64::MAX`)
pub const MAX_VIEW_BUDGET: u64 = i64::MAX as u64;

/// A stored snippet
///
/// `views_left == 0` means unlimited reads. The admin token never leaves
/// the process through serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnippetRecord {
    pub id: String,
    pub code: String,
    pub views_left: u64,
    pub parent_id: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl SnippetRecord {
    /// True when reads never exhaust this record
    pub fn is_unlimited(&self) -> bool {
        self.views_left == 0
    }

    /// True when the read that returned this record consumed its last view
    pub fn is_last_view(&self) -> bool {
        self.views_left == 1
    }

    /// Encode into the backend field map; `token` is written only when set
    /// and non-empty
    pub fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::with_capacity(4);
        fields.insert(FIELD_CODE.to_string(), self.code.clone());
        fields.insert(FIELD_VIEWS_LEFT.to_string(), self.views_left.to_string());
        fields.insert(FIELD_PARENT_ID.to_string(), self.parent_id.clone());
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            fields.insert(FIELD_TOKEN.to_string(), token.to_string());
        }
        fields
    }

    /// Decode a non-empty field map read from `id`
    pub fn from_fields(id: &str, fields: &FieldMap) -> Result<Self> {
        let field = |name: &str| {
            fields.get(name).cloned().ok_or_else(|| {
                Error::CorruptRecord(format!("snippet '{}' has no '{}' field", id, name))
            })
        };

        let code = field(FIELD_CODE)?;
        let views_left = decode_views_left(id, fields)?;
        let parent_id = field(FIELD_PARENT_ID)?;
        let token = fields.get(FIELD_TOKEN).cloned();

        Ok(Self {
            id: id.to_string(),
            code,
            views_left,
            parent_id,
            token,
        })
    }
}

/// Parse the view counter of a stored snippet
pub(crate) fn decode_views_left(id: &str, fields: &FieldMap) -> Result<u64> {
    let raw = fields.get(FIELD_VIEWS_LEFT).ok_or_else(|| {
        Error::CorruptRecord(format!(
            "snippet '{}' has no '{}' field",
            id, FIELD_VIEWS_LEFT
        ))
    })?;
    raw.parse::<u64>().map_err(|_| {
        Error::CorruptRecord(format!(
            "snippet '{}' has invalid views_left '{}'",
            id, raw
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(token: Option<&str>) -> SnippetRecord {
        SnippetRecord {
            id: "bakepo".to_string(),
            code: "print(1)".to_string(),
            views_left: 3,
            parent_id: String::new(),
            token: token.map(str::to_string),
        }
    }

    #[test]
    fn test_fields_use_decimal_counter() {
        let fields = record(None).to_fields();
        assert_eq!(fields[FIELD_CODE], "print(1)");
        assert_eq!(fields[FIELD_VIEWS_LEFT], "3");
        assert_eq!(fields[FIELD_PARENT_ID], "");
    }

    #[test]
    fn test_missing_token_is_field_absence() {
        assert!(!record(None).to_fields().contains_key(FIELD_TOKEN));
        assert!(!record(Some("")).to_fields().contains_key(FIELD_TOKEN));
        assert_eq!(record(Some("s3cret")).to_fields()[FIELD_TOKEN], "s3cret");
    }

    #[test]
    fn test_decode_with_and_without_token() -> Result<()> {
        let with_token = record(Some("s3cret"));
        let decoded = SnippetRecord::from_fields("bakepo", &with_token.to_fields())?;
        assert_eq!(decoded, with_token);

        let decoded = SnippetRecord::from_fields("bakepo", &record(None).to_fields())?;
        assert_eq!(decoded.token, None);
        Ok(())
    }

    #[test]
    fn test_decode_rejects_missing_code() {
        let mut fields = record(None).to_fields();
        fields.remove(FIELD_CODE);
        let err = SnippetRecord::from_fields("bakepo", &fields).unwrap_err();
        assert!(matches!(err, Error::CorruptRecord(_)));
    }

    #[test]
    fn test_decode_rejects_negative_counter() {
        let mut fields = record(None).to_fields();
        fields.insert(FIELD_VIEWS_LEFT.to_string(), "-1".to_string());
        let err = SnippetRecord::from_fields("bakepo", &fields).unwrap_err();
        assert!(matches!(err, Error::CorruptRecord(_)));
    }

    #[test]
    fn test_serialization_hides_token() {
        let json = serde_json::to_value(record(Some("s3cret"))).unwrap();
        assert_eq!(json["code"], "print(1)");
        assert_eq!(json["views_left"], 3);
        assert!(json.get("token").is_none());
    }

    #[test]
    fn test_view_helpers() {
        let mut snippet = record(None);
        snippet.views_left = 0;
        assert!(snippet.is_unlimited());
        snippet.views_left = 1;
        assert!(snippet.is_last_view());
        assert!(!snippet.is_unlimited());
    }
}
