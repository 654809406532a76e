use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status written to a talk document when its talk gets unpublished.
pub const UNPUBLISHED_STATUS: &str = "DRAFT";

/// A talk as returned by the source system's `/data/session/{id}` endpoint.
/// Only the fields the index needs are read; all of them may be missing, and their values are
/// carried over whatever their JSON type.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct TalkRecord {
    pub id: Option<Value>,
    pub conferenceid: Option<Value>,
    pub status: Option<Value>,
    pub data: Option<Value>,
    pub speakers: Option<Value>,
    #[serde(rename = "lastUpdated")]
    pub last_updated: Option<Value>,
}

/// The search document stored under the talk id.
/// Fields missing from the source record are written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocument {
    pub talk_id: Option<Value>,
    pub conference_id: Option<Value>,
    pub status: Option<Value>,
    pub data: Option<Value>,
    pub speakers: Option<Value>,
    pub last_updated: Option<Value>,
}

impl From<TalkRecord> for IndexDocument {
    fn from(talk: TalkRecord) -> Self {
        // TODO: denormalize talk feedback (comments and ratings) out of `data` once the index
        // mapping has fields for it.
        IndexDocument {
            talk_id: talk.id,
            conference_id: talk.conferenceid,
            status: talk.status,
            data: talk.data,
            speakers: talk.speakers,
            last_updated: talk.last_updated,
        }
    }
}

/// Body of a partial update that only touches the `status` field.
#[derive(Debug, Serialize)]
pub struct StatusPatch<'a> {
    pub doc: StatusPatchDoc<'a>,
}

#[derive(Debug, Serialize)]
pub struct StatusPatchDoc<'a> {
    pub status: &'a str,
}

impl<'a> StatusPatch<'a> {
    pub fn new(status: &'a str) -> Self {
        Self {
            doc: StatusPatchDoc { status },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_from_full_record() {
        let talk: TalkRecord = serde_json::from_value(json!({
            "id": "t1",
            "conferenceid": "c1",
            "status": "PUBLISHED",
            "data": {"title": {"value": "Rust at scale", "privateData": false}},
            "speakers": [{"id": "s1", "name": "Ada"}],
            "lastUpdated": "2024-01-01T00:00:00Z",
            "sessionUpdates": {"hasUnpublishedChanges": false}
        }))
        .unwrap();

        let document = serde_json::to_value(IndexDocument::from(talk)).unwrap();

        assert_eq!(
            document,
            json!({
                "talkId": "t1",
                "conferenceId": "c1",
                "status": "PUBLISHED",
                "data": {"title": {"value": "Rust at scale", "privateData": false}},
                "speakers": [{"id": "s1", "name": "Ada"}],
                "lastUpdated": "2024-01-01T00:00:00Z"
            })
        );
    }

    #[test]
    fn test_missing_fields_are_null() {
        let talk: TalkRecord = serde_json::from_value(json!({"id": "t1"})).unwrap();

        let document = serde_json::to_value(IndexDocument::from(talk)).unwrap();

        assert_eq!(
            document,
            json!({
                "talkId": "t1",
                "conferenceId": null,
                "status": null,
                "data": null,
                "speakers": null,
                "lastUpdated": null
            })
        );
    }

    #[test]
    fn test_non_string_values_are_kept() {
        let talk: TalkRecord = serde_json::from_value(json!({
            "id": 42,
            "conferenceid": "c1",
            "status": null,
            "lastUpdated": 1704067200000u64
        }))
        .unwrap();

        let document = serde_json::to_value(IndexDocument::from(talk)).unwrap();

        assert_eq!(
            document,
            json!({
                "talkId": 42,
                "conferenceId": "c1",
                "status": null,
                "data": null,
                "speakers": null,
                "lastUpdated": 1704067200000u64
            })
        );
    }

    #[test]
    fn test_status_patch_body() {
        let body = serde_json::to_value(StatusPatch::new(UNPUBLISHED_STATUS)).unwrap();

        assert_eq!(body, json!({"doc": {"status": "DRAFT"}}));
    }
}
