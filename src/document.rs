use serde_json::Value;

/// Typed view over a decoded session object.
///
/// Built leniently: fields with an unexpected shape read as absent instead of
/// rejecting the whole document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionDocument {
    /// Sparse: `None` marks a hole left by the mutation log.
    pub requests: Vec<Option<Request>>,
    pub custom_title: Option<String>,
    pub creation_date: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    /// Epoch millis.
    pub timestamp: Option<i64>,
    pub response: Vec<ResponsePart>,
    /// `result.metadata.summary.text`, present only on completed compactions.
    pub summary_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponsePart {
    pub kind: Option<String>,
    /// `content.value`
    pub content_value: Option<String>,
}

impl SessionDocument {
    pub fn from_value(value: &Value) -> Self {
        let requests = value
            .get("requests")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| (!item.is_null()).then(|| Request::from_value(item)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            requests,
            custom_title: str_at(value, &["customTitle"]).filter(|title| !title.is_empty()),
            creation_date: millis_at(value, &["creationDate"]),
        }
    }

    pub fn present_requests(&self) -> impl Iterator<Item = (usize, &Request)> {
        self.requests
            .iter()
            .enumerate()
            .filter_map(|(idx, request)| request.as_ref().map(|request| (idx, request)))
    }

    pub fn request_count(&self) -> usize {
        self.present_requests().count()
    }

    /// First present request's timestamp, else the creation date, else 0.
    pub fn first_message_time(&self) -> i64 {
        self.present_requests()
            .next()
            .and_then(|(_, request)| request.timestamp)
            .or(self.creation_date)
            .unwrap_or(0)
    }
}

impl Request {
    fn from_value(value: &Value) -> Self {
        let response = value
            .get("response")
            .and_then(Value::as_array)
            .map(|parts| parts.iter().map(ResponsePart::from_value).collect())
            .unwrap_or_default();

        Self {
            timestamp: millis_at(value, &["timestamp"]),
            response,
            summary_text: str_at(value, &["result", "metadata", "summary", "text"]),
        }
    }
}

impl ResponsePart {
    fn from_value(value: &Value) -> Self {
        Self {
            kind: str_at(value, &["kind"]),
            content_value: str_at(value, &["content", "value"]),
        }
    }
}

fn str_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut cursor = value;
    for key in path {
        cursor = cursor.get(*key)?;
    }
    cursor.as_str().map(|s| s.to_string())
}

// Zero is treated as missing, matching how the editor leaves unset stamps.
fn millis_at(value: &Value, path: &[&str]) -> Option<i64> {
    let mut cursor = value;
    for key in path {
        cursor = cursor.get(*key)?;
    }
    cursor
        .as_i64()
        .or_else(|| cursor.as_f64().map(|n| n as i64))
        .filter(|millis| *millis != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn holes_are_kept_as_none() {
        let doc = SessionDocument::from_value(&json!({
            "requests": [null, {"timestamp": 20}, null, {"timestamp": 40}]
        }));
        assert_eq!(doc.requests.len(), 4);
        assert_eq!(doc.request_count(), 2);
        assert_eq!(doc.first_message_time(), 20);
        let indices: Vec<usize> = doc.present_requests().map(|(idx, _)| idx).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn first_message_time_falls_back_to_creation_date() {
        let doc = SessionDocument::from_value(&json!({
            "creationDate": 1234,
            "requests": [{"message": "no stamp"}]
        }));
        assert_eq!(doc.first_message_time(), 1234);

        let bare = SessionDocument::from_value(&json!({"requests": [{}]}));
        assert_eq!(bare.first_message_time(), 0);
    }

    #[test]
    fn unexpected_shapes_read_as_absent() {
        let doc = SessionDocument::from_value(&json!({
            "requests": {"0": {}},
            "customTitle": 5,
            "creationDate": "yesterday"
        }));
        assert!(doc.requests.is_empty());
        assert_eq!(doc.custom_title, None);
        assert_eq!(doc.creation_date, None);
    }

    #[test]
    fn reads_nested_response_and_summary() {
        let doc = SessionDocument::from_value(&json!({
            "customTitle": "/AS/0.5.Q/ work",
            "requests": [{
                "timestamp": 1.7e12,
                "response": [{"kind": "progressTask", "content": {"value": "Compacted conversation"}}],
                "result": {"metadata": {"summary": {"text": "summary"}}}
            }]
        }));
        let request = doc.requests[0].as_ref().expect("request");
        assert_eq!(request.timestamp, Some(1_700_000_000_000));
        assert_eq!(request.response[0].kind.as_deref(), Some("progressTask"));
        assert_eq!(
            request.response[0].content_value.as_deref(),
            Some("Compacted conversation")
        );
        assert_eq!(request.summary_text.as_deref(), Some("summary"));
        assert_eq!(doc.custom_title.as_deref(), Some("/AS/0.5.Q/ work"));
    }
}
