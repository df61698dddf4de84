//! Object reference resolution
//!
//! Turns a raw storage notification into the object and event kind to act on.
//! No external calls are made here, so a malformed payload fails before any
//! collaborator is touched.

use mediatag_common::events::{EventKind, NotificationEvent};
use tracing::warn;

use crate::error::{PipelineError, PipelineResult};
use crate::types::ObjectRef;

/// Object and event kind extracted from the first notification record
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEvent {
    pub object: ObjectRef,
    pub kind: EventKind,
}

/// Parse and resolve a JSON notification payload
pub fn resolve_bytes(payload: &[u8]) -> PipelineResult<ResolvedEvent> {
    let event = NotificationEvent::from_slice(payload)
        .map_err(|e| PipelineError::MalformedEvent(format!("invalid notification payload: {}", e)))?;
    resolve(&event)
}

/// Resolve an already parsed notification
pub fn resolve(event: &NotificationEvent) -> PipelineResult<ResolvedEvent> {
    let record = event
        .records
        .first()
        .ok_or_else(|| PipelineError::MalformedEvent("notification contains no records".to_string()))?;

    if event.records.len() > 1 {
        warn!(
            extra = event.records.len() - 1,
            "Notification carries more than one record; only the first is processed"
        );
    }

    let container = record.s3.bucket.name.trim();
    if container.is_empty() {
        return Err(PipelineError::MalformedEvent(
            "record has an empty bucket name".to_string(),
        ));
    }

    let key = decode_key(&record.s3.object.key)?;

    Ok(ResolvedEvent {
        object: ObjectRef::new(container, key),
        kind: EventKind::parse(&record.event_name),
    })
}

/// Decode a form-encoded object key (`+` is a space, `%XX` escapes)
pub fn decode_key(raw: &str) -> PipelineResult<String> {
    let spaced = raw.replace('+', " ");
    let key = urlencoding::decode(&spaced)
        .map_err(|e| {
            PipelineError::MalformedEvent(format!("object key '{}' does not decode to UTF-8: {}", raw, e))
        })?
        .into_owned();

    if key.is_empty() {
        return Err(PipelineError::MalformedEvent("record has an empty object key".to_string()));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(event_name: &str, bucket: &str, key: &str) -> String {
        serde_json::json!({
            "Records": [{
                "eventName": event_name,
                "s3": {
                    "bucket": { "name": bucket },
                    "object": { "key": key }
                }
            }]
        })
        .to_string()
    }

    #[test]
    fn test_resolves_first_record() {
        let resolved = resolve_bytes(payload("ObjectCreated:Put", "media", "a/b.png").as_bytes()).unwrap();
        assert_eq!(resolved.object, ObjectRef::new("media", "a/b.png"));
        assert_eq!(resolved.kind, EventKind::CreatedPut);
    }

    #[test]
    fn test_decodes_form_encoded_key() {
        assert_eq!(decode_key("my+photo%281%29.png").unwrap(), "my photo(1).png");
        assert_eq!(decode_key("plain/key.png").unwrap(), "plain/key.png");
    }

    #[test]
    fn test_invalid_utf8_escape_is_malformed() {
        assert!(matches!(decode_key("bad%FF.png"), Err(PipelineError::MalformedEvent(_))));
    }

    #[test]
    fn test_zero_records_is_malformed() {
        let err = resolve_bytes(br#"{"Records": []}"#).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedEvent(_)));

        let err = resolve_bytes(b"{}").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedEvent(_)));
    }

    #[test]
    fn test_not_json_is_malformed() {
        let err = resolve_bytes(b"not json").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedEvent(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_empty_key_or_bucket_is_malformed() {
        assert!(resolve_bytes(payload("ObjectCreated:Put", "media", "").as_bytes()).is_err());
        assert!(resolve_bytes(payload("ObjectCreated:Put", " ", "a.png").as_bytes()).is_err());
    }
}
