//! Workers KV REST response envelopes.

use marknav_core::kv::{KeyInfo, ListResult};
use serde::Deserialize;

use super::KvHttpError;

/// One entry of the `errors` array.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Envelope returned by write, delete and error responses.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
}

impl ApiEnvelope {
    /// The first reported error, if the call did not succeed.
    pub fn into_result(self) -> Result<(), KvHttpError> {
        if self.success {
            return Ok(());
        }
        let first = self.errors.into_iter().next();
        Err(match first {
            Some(e) => KvHttpError::Api { code: e.code, message: e.message },
            None => KvHttpError::Api { code: 0, message: "request was not successful".into() },
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultInfo {
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Body of `GET .../keys`.
#[derive(Debug, Deserialize)]
pub struct ListKeysResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    #[serde(default)]
    pub result: Vec<KeyInfo>,
    #[serde(default)]
    pub result_info: Option<ResultInfo>,
}

impl TryFrom<ListKeysResponse> for ListResult {
    type Error = KvHttpError;

    /// An empty or missing cursor marks the last page.
    fn try_from(raw: ListKeysResponse) -> Result<Self, Self::Error> {
        ApiEnvelope { success: raw.success, errors: raw.errors }.into_result()?;
        let cursor = raw.result_info.and_then(|info| info.cursor).filter(|c| !c.is_empty());
        Ok(ListResult { keys: raw.result, list_complete: cursor.is_none(), cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_response_with_cursor() {
        let raw: ListKeysResponse = serde_json::from_str(
            r#"{
                "success": true,
                "errors": [],
                "result": [{"name": "bookmarks:sites", "expiration": 1767225600}],
                "result_info": {"count": 1, "cursor": "abc"}
            }"#,
        )
        .unwrap();

        let page = ListResult::try_from(raw).unwrap();
        assert_eq!(page.keys[0].name, "bookmarks:sites");
        assert_eq!(page.keys[0].expiration, Some(1_767_225_600));
        assert!(!page.list_complete);
        assert_eq!(page.cursor.as_deref(), Some("abc"));
    }

    #[test]
    fn test_list_response_last_page() {
        let raw: ListKeysResponse =
            serde_json::from_str(r#"{"success": true, "result": [], "result_info": {"count": 0, "cursor": ""}}"#)
                .unwrap();
        let page = ListResult::try_from(raw).unwrap();
        assert!(page.list_complete);
        assert!(page.cursor.is_none());
    }

    #[test]
    fn test_envelope_error() {
        let raw: ApiEnvelope =
            serde_json::from_str(r#"{"success": false, "errors": [{"code": 10013, "message": "bad key"}]}"#).unwrap();
        assert!(matches!(raw.into_result(), Err(KvHttpError::Api { code: 10013, .. })));
    }
}
