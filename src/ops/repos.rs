use base64::Engine;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};

use super::repo_path;
use crate::classify::{classify, ensure_success};
use crate::error::GatewayError;
use crate::outcome::{OperationResult, StepFailure};
use crate::transport::Session;

pub const README_COMMIT_MESSAGE: &str = "Add README";
pub const DEFAULT_README: &str = "# Test Repository\n\nThis repository is for testing.\n";

/// Placeholder description used when none is given.
pub fn suggest_description(name: &str) -> String {
    let name = name.trim();
    let name = if name.is_empty() { "test" } else { name };
    format!("{}: Repository for testing and experiments", name)
}

#[derive(Debug, Clone)]
pub struct NewRepo {
    pub name: String,
    pub description: Option<String>,
    pub private: bool,
}

impl NewRepo {
    pub fn resolved_description(&self) -> String {
        match self.description.as_deref() {
            Some(d) if !d.is_empty() => d.to_string(),
            _ => suggest_description(&self.name),
        }
    }
}

/// Fields to change on an existing repository. Absent fields are left
/// untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepoChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,
}

impl RepoChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.private.is_none()
    }
}

pub async fn create(session: &Session, repo: &NewRepo) -> Result<Value, GatewayError> {
    let payload = json!({
        "name": repo.name,
        "description": repo.resolved_description(),
        "private": repo.private,
    });
    tracing::info!(repo = %repo.name, private = repo.private, "Creating repository");
    let outcome = session.send(Method::POST, "/user/repos", Some(&payload)).await;
    ensure_success("Repo creation failed", outcome)?.json()
}

/// PATCH the repository; if the API answers 405, send the same payload once
/// more as PUT.
pub async fn update(session: &Session, repo: &str, changes: &RepoChanges) -> Result<Value, GatewayError> {
    if changes.is_empty() {
        return Err(GatewayError::NoFieldsToUpdate);
    }
    let path = repo_path(session.username(), repo)?;
    let payload = serde_json::to_value(changes)
        .map_err(|e| GatewayError::Unexpected(format!("Failed to encode update: {}", e)))?;

    let mut outcome = session.send(Method::PATCH, &path, Some(&payload)).await;
    if matches!(&outcome, Ok(r) if r.status == StatusCode::METHOD_NOT_ALLOWED) {
        tracing::info!(repo, "PATCH not allowed, retrying as PUT");
        outcome = session.send(Method::PUT, &path, Some(&payload)).await;
    }
    ensure_success("Repo update failed", outcome)?.json_or(json!({"status": "ok"}))
}

pub async fn delete(session: &Session, repo: &str) -> Result<Value, GatewayError> {
    let path = repo_path(session.username(), repo)?;
    tracing::info!(repo, "Deleting repository");
    let outcome = session.send(Method::DELETE, &path, None).await;
    match &outcome {
        Ok(r) if matches!(r.status.as_u16(), 200 | 202 | 204) => Ok(json!({"status": "deleted"})),
        _ => Err(classify("Repo delete failed", &outcome).into()),
    }
}

pub async fn seed_readme(session: &Session, repo: &str, content: &str) -> Result<Value, GatewayError> {
    let path = format!("{}/contents/README.md", repo_path(session.username(), repo)?);
    let payload = json!({
        "message": README_COMMIT_MESSAGE,
        "content": base64::engine::general_purpose::STANDARD.encode(content.as_bytes()),
    });
    let outcome = session.send(Method::PUT, &path, Some(&payload)).await;
    ensure_success("README creation failed", outcome)?.json()
}

/// Create the repository, then optionally seed its README as a separate
/// step. A failed README leaves the repository in place.
pub async fn create_with_readme(
    session: &Session,
    repo: &NewRepo,
    readme: Option<&str>,
) -> OperationResult<Value> {
    let created = match create(session, repo).await {
        Ok(created) => created,
        Err(e) => return e.into(),
    };

    let mut payload = json!({
        "name": repo.name,
        "description": repo.resolved_description(),
        "private": repo.private,
        "repo_url": created.get("html_url").and_then(Value::as_str).unwrap_or("N/A"),
    });

    let Some(content) = readme else {
        payload["readme"] = json!("skipped");
        return OperationResult::Success(payload);
    };

    // The API may normalise the requested name. An unusable name fails the
    // seed step's path validation and leaves the repository in place.
    let created_name = created
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(&repo.name);

    match seed_readme(session, created_name, content).await {
        Ok(_) => {
            payload["readme"] = json!("created");
            OperationResult::Success(payload)
        }
        Err(e) => {
            tracing::warn!(repo = %created_name, error = %e, "Repository created without README");
            payload["readme"] = json!("failed");
            OperationResult::PartialSuccess {
                payload,
                failures: vec![StepFailure::new("seed_readme", e)],
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{any, body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::GatewayConfig;
    use crate::credentials::Identity;
    use crate::error::ErrorCategory;
    use crate::transport::Gateway;

    fn session(server: &MockServer) -> Session {
        Gateway::new(GatewayConfig::new(server.uri(), Duration::from_secs(5)))
            .session(&Identity::new("tok", "octocat"))
            .unwrap()
    }

    fn new_repo(name: &str, description: Option<&str>) -> NewRepo {
        NewRepo {
            name: name.to_string(),
            description: description.map(String::from),
            private: false,
        }
    }

    #[test]
    fn test_suggest_description() {
        assert_eq!(
            suggest_description("demo"),
            "demo: Repository for testing and experiments"
        );
        assert_eq!(
            suggest_description(""),
            "test: Repository for testing and experiments"
        );
        assert_eq!(
            suggest_description("   "),
            "test: Repository for testing and experiments"
        );
    }

    #[test]
    fn test_resolved_description() {
        assert_eq!(
            new_repo("demo", None).resolved_description(),
            "demo: Repository for testing and experiments"
        );
        assert_eq!(
            new_repo("demo", Some("")).resolved_description(),
            "demo: Repository for testing and experiments"
        );
        assert_eq!(new_repo("demo", Some("mine")).resolved_description(), "mine");
    }

    #[tokio::test]
    async fn test_create_sends_placeholder_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/repos"))
            .and(body_json(json!({
                "name": "demo",
                "description": "demo: Repository for testing and experiments",
                "private": false,
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"name": "demo"})))
            .expect(1)
            .mount(&server)
            .await;

        let created = create(&session(&server), &new_repo("demo", None)).await.unwrap();
        assert_eq!(created["name"], "demo");
    }

    #[tokio::test]
    async fn test_update_without_fields_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = update(&session(&server), "demo", &RepoChanges::default())
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NoFieldsToUpdate);
    }

    #[tokio::test]
    async fn test_update_falls_back_to_put_on_405() {
        let server = MockServer::start().await;
        let payload = json!({"description": "fresh"});
        Mock::given(method("PATCH"))
            .and(path("/repos/octocat/demo"))
            .respond_with(ResponseTemplate::new(405))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/repos/octocat/demo"))
            .and(body_json(payload.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"description": "fresh"})))
            .expect(1)
            .mount(&server)
            .await;

        let changes = RepoChanges {
            description: Some("fresh".into()),
            ..Default::default()
        };
        let updated = update(&session(&server), "demo", &changes).await.unwrap();
        assert_eq!(updated["description"], "fresh");
    }

    #[tokio::test]
    async fn test_update_does_not_retry_other_failures() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let changes = RepoChanges {
            private: Some(true),
            ..Default::default()
        };
        let err = update(&session(&server), "demo", &changes).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ApiError);
        assert!(err.to_string().starts_with("Repo update failed: 422"));
    }

    #[tokio::test]
    async fn test_update_empty_body_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let changes = RepoChanges {
            name: Some("renamed".into()),
            ..Default::default()
        };
        let updated = update(&session(&server), "demo", &changes).await.unwrap();
        assert_eq!(updated, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_delete_accepts_200_202_204() {
        for status in [200u16, 202, 204] {
            let server = MockServer::start().await;
            Mock::given(method("DELETE"))
                .and(path("/repos/octocat/demo"))
                .respond_with(ResponseTemplate::new(status))
                .expect(1)
                .mount(&server)
                .await;

            let result = delete(&session(&server), "demo").await.unwrap();
            assert_eq!(result, json!({"status": "deleted"}));
        }
    }

    #[tokio::test]
    async fn test_delete_missing_repo_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&server)
            .await;

        let err = delete(&session(&server), "gone").await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ApiError);
        assert_eq!(err.classified().unwrap().http_status, Some(404));
    }

    #[tokio::test]
    async fn test_seed_readme_encodes_content() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/repos/octocat/demo/contents/README.md"))
            .and(body_json(json!({
                "message": "Add README",
                "content": "IyBIaQo=",
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"content": {"path": "README.md"}})))
            .expect(1)
            .mount(&server)
            .await;

        let file = seed_readme(&session(&server), "demo", "# Hi\n").await.unwrap();
        assert_eq!(file["content"]["path"], "README.md");
    }

    #[tokio::test]
    async fn test_create_with_readme_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "name": "demo",
                "html_url": "https://github.com/octocat/demo",
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/repos/octocat/demo/contents/README.md"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let result = create_with_readme(&session(&server), &new_repo("demo", None), Some(DEFAULT_README)).await;
        match result {
            OperationResult::Success(payload) => {
                assert_eq!(payload["readme"], "created");
                assert_eq!(payload["repo_url"], "https://github.com/octocat/demo");
                assert_eq!(payload["description"], "demo: Repository for testing and experiments");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_with_readme_failure_is_partial() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"name": "demo"})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let result = create_with_readme(&session(&server), &new_repo("demo", Some("d")), Some("x")).await;
        match result {
            OperationResult::PartialSuccess { payload, failures } => {
                assert_eq!(payload["readme"], "failed");
                assert_eq!(payload["repo_url"], "N/A");
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].step, "seed_readme");
                assert!(failures[0]
                    .error
                    .to_string()
                    .starts_with("README creation failed: 409"));
            }
            other => panic!("expected partial success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_with_readme_uses_normalised_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"name": "my-repo"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/repos/octocat/my-repo/contents/README.md"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let result = create_with_readme(&session(&server), &new_repo("my repo", None), Some(DEFAULT_README)).await;
        match result {
            OperationResult::Success(payload) => assert_eq!(payload["readme"], "created"),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_with_readme_unusable_created_name_is_partial() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"name": "a/b"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let result = create_with_readme(&session(&server), &new_repo("a/b", None), Some("x")).await;
        match result {
            OperationResult::PartialSuccess { payload, failures } => {
                assert_eq!(payload["readme"], "failed");
                assert_eq!(failures[0].step, "seed_readme");
                assert_eq!(failures[0].error.category(), ErrorCategory::InvalidName);
            }
            other => panic!("expected partial success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_with_readme_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"name": "demo"})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let result = create_with_readme(&session(&server), &new_repo("demo", None), None).await;
        match result {
            OperationResult::Success(payload) => assert_eq!(payload["readme"], "skipped"),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_failure_skips_readme() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let result = create_with_readme(&session(&server), &new_repo("demo", None), Some("x")).await;
        match result {
            OperationResult::Failure(e) => assert_eq!(e.category(), ErrorCategory::AuthFailure),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
