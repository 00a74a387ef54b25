//! Face-recognition endpoints.

use reqwest::Method;
use roster_core::resource::ApiBase;
use roster_core::{DescriptorPayload, EnrollmentStatus, FaceBackend, RecordId, VerifiedIdentity, VerifyOutcome};
use serde_json::{json, Value};

use crate::auth::AuthSession;
use crate::client::ApiClient;
use crate::error::{ApiError, ApiResult};

const BASE: &str = "face-recognition";

impl ApiClient {
    pub async fn face_status(&self, personnel_id: &RecordId) -> ApiResult<EnrollmentStatus> {
        self.get_record(ApiBase::Main, &format!("{BASE}/status/{personnel_id}"))
            .await
    }

    /// Store a descriptor for a person. A successful call always reports the
    /// person as enrolled, whatever else the server sends back.
    pub async fn enroll_face(&self, payload: &DescriptorPayload) -> ApiResult<EnrollmentStatus> {
        let data = self
            .send_json(Method::POST, ApiBase::Main, &format!("{BASE}/enroll"), payload)
            .await?;
        let mut status = serde_json::from_value::<EnrollmentStatus>(data).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "enroll response carries no status");
            EnrollmentStatus {
                is_enabled: true,
                ..EnrollmentStatus::default()
            }
        });
        status.enrolled = true;
        Ok(status)
    }

    pub async fn toggle_face(&self, personnel_id: &RecordId, enabled: bool) -> ApiResult<()> {
        self.send_json(
            Method::PUT,
            ApiBase::Main,
            &format!("{BASE}/toggle/{personnel_id}"),
            &json!({ "is_enabled": enabled }),
        )
        .await?;
        tracing::info!(%personnel_id, enabled, "face login toggled");
        Ok(())
    }

    pub async fn remove_face(&self, personnel_id: &RecordId) -> ApiResult<()> {
        let path = format!("{BASE}/delete/{personnel_id}");
        self.send(self.request(Method::DELETE, ApiBase::Main, &path))
            .await?
            .into_payload()?;
        tracing::info!(%personnel_id, "face enrollment removed");
        Ok(())
    }

    /// Match a descriptor against every enrollment.
    ///
    /// Client-side rejections (4xx, `success: false`, no personnel in the
    /// answer) are a non-match. Transport failures and 5xx are errors.
    pub async fn verify_face(&self, payload: &DescriptorPayload) -> ApiResult<VerifyOutcome> {
        let result = self
            .send_json(Method::POST, ApiBase::Main, &format!("{BASE}/verify"), payload)
            .await;
        match result {
            Ok(data) => Ok(identity_from(data)),
            Err(ApiError::Rejected { message }) => Ok(VerifyOutcome::NoMatch { message }),
            Err(ApiError::Unauthorized { message }) => Ok(VerifyOutcome::NoMatch { message }),
            Err(ApiError::Status { status, message }) if (400..500).contains(&status) => {
                Ok(VerifyOutcome::NoMatch { message })
            }
            Err(e) => Err(e),
        }
    }

    /// Keep the token a successful face login hands back.
    pub fn adopt_identity(&self, identity: &VerifiedIdentity) -> ApiResult<bool> {
        let Some(token) = identity.token.as_deref().filter(|t| !t.is_empty()) else {
            tracing::warn!("face login returned no token; session unchanged");
            return Ok(false);
        };
        self.adopt_session(AuthSession::new(token).with_user(&identity.personnel))?;
        Ok(true)
    }
}

fn identity_from(data: Value) -> VerifyOutcome {
    let has_personnel = data
        .get("personnel")
        .is_some_and(|p| p.is_object());
    if !has_personnel {
        return VerifyOutcome::NoMatch {
            message: data
                .as_object()
                .and_then(roster_core::envelope::extract_message),
        };
    }
    match serde_json::from_value(data) {
        Ok(identity) => VerifyOutcome::Matched(identity),
        Err(e) => VerifyOutcome::NoMatch {
            message: Some(format!("unreadable verify response: {e}")),
        },
    }
}

impl FaceBackend for ApiClient {
    type Error = ApiError;

    async fn enroll(&self, payload: &DescriptorPayload) -> ApiResult<EnrollmentStatus> {
        self.enroll_face(payload).await
    }

    async fn verify(&self, payload: &DescriptorPayload) -> ApiResult<VerifyOutcome> {
        self.verify_face(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::client_for;
    use roster_core::FaceDescriptor;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn descriptor() -> FaceDescriptor {
        FaceDescriptor::new(vec![0.5, 0.75])
    }

    #[tokio::test]
    async fn test_enroll_posts_descriptor_and_forces_enrolled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/face-recognition/enroll"))
            .and(body_json(json!({ "personnel_id": 12, "face_descriptor": [0.5, 0.75] })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "success": true,
                "data": { "enrolled": false, "is_enabled": true }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = client_for(&server, Some("tok"));
        let payload = DescriptorPayload::enroll(RecordId::from(12), descriptor());
        let status = client.enroll(&payload).await.unwrap();
        assert!(status.enrolled);
        assert!(status.is_enabled);
    }

    #[tokio::test]
    async fn test_status_toggle_remove() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/face-recognition/status/12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "enrolled": true, "is_enabled": false, "enrolled_at": "2024-03-01 08:30:00"
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/face-recognition/toggle/12"))
            .and(body_json(json!({ "is_enabled": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/face-recognition/delete/12"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = client_for(&server, Some("tok"));
        let id = RecordId::from(12);
        let status = client.face_status(&id).await.unwrap();
        assert!(status.enrolled);
        assert!(!status.is_enabled);
        assert!(status.enrolled_at.is_some());

        client.toggle_face(&id, true).await.unwrap();
        client.remove_face(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_match_and_adopt_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/face-recognition/verify"))
            .and(body_json(json!({ "face_descriptor": [0.5, 0.75] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "personnel": { "id": 3, "givenname": "Ana", "surname": "Reyes" },
                    "token": "face-tok",
                    "confidence": 0.91
                }
            })))
            .mount(&server)
            .await;

        let (client, _) = client_for(&server, None);
        let outcome = client
            .verify(&DescriptorPayload::verify(descriptor()))
            .await
            .unwrap();
        let VerifyOutcome::Matched(identity) = outcome else {
            panic!("expected a match, got {outcome:?}");
        };
        assert_eq!(identity.display_name(), "Ana Reyes");
        assert!(identity.extra.contains_key("confidence"));

        assert!(client.adopt_identity(&identity).unwrap());
        let session = client.auth().current().unwrap();
        assert_eq!(session.token, "face-tok");
        assert_eq!(session.display_name.as_deref(), Some("Ana Reyes"));
    }

    #[tokio::test]
    async fn test_verify_rejections_are_no_match() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/face-recognition/verify"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "message": "Face not recognized" })),
            )
            .mount(&server)
            .await;

        let (client, nav) = client_for(&server, None);
        let outcome = client
            .verify_face(&DescriptorPayload::verify(descriptor()))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            VerifyOutcome::NoMatch {
                message: Some("Face not recognized".into())
            }
        );
        assert_eq!(nav.redirects(), 0);
    }

    #[tokio::test]
    async fn test_verify_without_personnel_is_no_match() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "data": { "personnel": null, "message": "No match" }
            })))
            .mount(&server)
            .await;

        let (client, _) = client_for(&server, None);
        let outcome = client
            .verify_face(&DescriptorPayload::verify(descriptor()))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            VerifyOutcome::NoMatch {
                message: Some("No match".into())
            }
        );
    }

    #[tokio::test]
    async fn test_verify_server_error_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let (client, _) = client_for(&server, None);
        let err = client
            .verify_face(&DescriptorPayload::verify(descriptor()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn test_adopt_identity_without_token_keeps_session() {
        let auth = std::sync::Arc::new(crate::AuthStore::in_memory(Some(AuthSession::new("old"))));
        let nav = std::sync::Arc::new(crate::MemoryNavigator::new("/"));
        let guard = std::sync::Arc::new(crate::UnauthorizedGuard::new(nav));
        let client = ApiClient::new(crate::ApiConfig::for_host("localhost:1"), auth, guard).unwrap();
        let identity: VerifiedIdentity =
            serde_json::from_value(json!({ "personnel": { "name": "Ana" } })).unwrap();
        assert!(!client.adopt_identity(&identity).unwrap());
        assert_eq!(client.auth().token().as_deref(), Some("old"));
    }
}
