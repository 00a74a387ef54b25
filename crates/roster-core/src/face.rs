//! Face enrollment and verification records, and the backend seam the
//! capture sessions talk to.

use crate::types::{FaceDescriptor, RecordId};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::future::Future;

/// Server-side enrollment record for one person.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentStatus {
    #[serde(default)]
    pub enrolled: bool,
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub enrolled_at: Option<DateTime<Utc>>,
}

/// Body of `enroll` and `verify` requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptorPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personnel_id: Option<RecordId>,
    pub face_descriptor: FaceDescriptor,
}

impl DescriptorPayload {
    pub fn enroll(personnel_id: RecordId, face_descriptor: FaceDescriptor) -> Self {
        Self {
            personnel_id: Some(personnel_id),
            face_descriptor,
        }
    }

    pub fn verify(face_descriptor: FaceDescriptor) -> Self {
        Self {
            personnel_id: None,
            face_descriptor,
        }
    }
}

/// Identity returned by a successful verification.
///
/// `personnel` is passed through untouched; the server owns its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub personnel: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl VerifiedIdentity {
    /// Best-effort display name from the personnel record.
    pub fn display_name(&self) -> String {
        let field = |key: &str| {
            self.personnel
                .get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
        };
        match (field("givenname").or(field("first_name")), field("surname").or(field("last_name"))) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.to_string(),
            (None, Some(last)) => last.to_string(),
            (None, None) => field("name")
                .or(field("username"))
                .map(str::to_string)
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

/// Result of sending a descriptor to the verify endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    Matched(VerifiedIdentity),
    /// The server answered but found no matching enrollment.
    NoMatch { message: Option<String> },
}

/// Remote side of the face flow: enrollment storage and matching.
pub trait FaceBackend: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn enroll(
        &self,
        payload: &DescriptorPayload,
    ) -> impl Future<Output = Result<EnrollmentStatus, Self::Error>> + Send;

    fn verify(
        &self,
        payload: &DescriptorPayload,
    ) -> impl Future<Output = Result<VerifyOutcome, Self::Error>> + Send;
}

/// Accept RFC 3339 or the `YYYY-MM-DD HH:MM:SS` form SQL backends emit (read as UTC).
fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrollment_status_defaults_when_fields_missing() {
        let status: EnrollmentStatus = serde_json::from_str("{}").unwrap();
        assert_eq!(status, EnrollmentStatus::default());
    }

    #[test]
    fn test_enrollment_status_accepts_sql_timestamp() {
        let status: EnrollmentStatus = serde_json::from_str(
            r#"{"enrolled": true, "is_enabled": true, "enrolled_at": "2024-03-01 08:30:00"}"#,
        )
        .unwrap();
        assert!(status.enrolled);
        assert_eq!(
            status.enrolled_at.unwrap().to_rfc3339(),
            "2024-03-01T08:30:00+00:00"
        );
    }

    #[test]
    fn test_enrollment_status_accepts_rfc3339_and_null() {
        let status: EnrollmentStatus = serde_json::from_str(
            r#"{"enrolled": false, "enrolled_at": "2024-03-01T08:30:00.000Z"}"#,
        )
        .unwrap();
        assert!(status.enrolled_at.is_some());

        let status: EnrollmentStatus =
            serde_json::from_str(r#"{"enrolled": false, "enrolled_at": null}"#).unwrap();
        assert!(status.enrolled_at.is_none());
    }

    #[test]
    fn test_verify_payload_omits_personnel_id() {
        let payload = DescriptorPayload::verify(FaceDescriptor::new(vec![1.0]));
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({ "face_descriptor": [1.0] })
        );
    }

    #[test]
    fn test_enroll_payload_carries_numeric_id() {
        let payload = DescriptorPayload::enroll(RecordId::from(12), FaceDescriptor::new(vec![0.5]));
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({ "personnel_id": 12, "face_descriptor": [0.5] })
        );
    }

    #[test]
    fn test_verified_identity_keeps_extra_fields() {
        let identity: VerifiedIdentity = serde_json::from_value(serde_json::json!({
            "personnel": { "givenname": "Ana", "surname": "Reyes" },
            "token": "abc",
            "similarity": 0.91
        }))
        .unwrap();
        assert_eq!(identity.display_name(), "Ana Reyes");
        assert_eq!(identity.token.as_deref(), Some("abc"));
        assert!(identity.extra.contains_key("similarity"));
    }
}
