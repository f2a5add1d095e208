//! Push event extraction and execution parameter derivation.
//!
//! The inbound payload is the legacy form-encoded push notification: a JSON
//! document carrying `repository`, `ref`, and `pusher` objects. Extraction
//! normalizes it into a [`PushEvent`] and fails with
//! [`HookError::MalformedEvent`] when a required field is absent.

use serde_json::Value;

use crate::Config;
use crate::error::HookError;

/// Normalized record derived from a push notification payload.
///
/// Created once per admitted request and never mutated afterwards; the
/// original payload rides along for diagnostic reporting.
#[derive(Debug, Clone)]
pub struct PushEvent {
    pub repo: String,
    /// Full ref string, e.g. `refs/heads/main`.
    pub git_ref: String,
    pub owner: String,
    pub pusher_email: Option<String>,
    pub payload: Value,
}

impl PushEvent {
    pub fn from_payload(payload: Value) -> Result<Self, HookError> {
        let repo = payload
            .get("repository")
            .and_then(|r| r.get("name"))
            .and_then(|n| n.as_str())
            .ok_or_else(|| HookError::MalformedEvent("missing repository.name".to_string()))?
            .to_string();
        let owner = payload
            .get("repository")
            .and_then(|r| r.get("owner"))
            .and_then(|o| o.get("name"))
            .and_then(|n| n.as_str())
            .ok_or_else(|| HookError::MalformedEvent("missing repository.owner.name".to_string()))?
            .to_string();
        let git_ref = payload
            .get("ref")
            .and_then(|r| r.as_str())
            .ok_or_else(|| HookError::MalformedEvent("missing ref".to_string()))?
            .to_string();
        let pusher_email = payload
            .get("pusher")
            .and_then(|p| p.get("email"))
            .and_then(|e| e.as_str())
            .map(String::from);

        Ok(PushEvent {
            repo,
            git_ref,
            owner,
            pusher_email,
            payload,
        })
    }

    /// Branch name with the `refs/heads/` prefix stripped.
    pub fn branch(&self) -> &str {
        self.git_ref.strip_prefix("refs/heads/").unwrap_or(&self.git_ref)
    }

    /// Branch gate: the last `/`-separated segment of the ref must exactly
    /// equal the branch named in the hook URL.
    pub fn matches_branch(&self, requested: &str) -> bool {
        self.git_ref.rsplit('/').next() == Some(requested)
    }
}

/// The six positional arguments handed to the build and publish scripts,
/// derived deterministically from an event and the static configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionParams {
    pub repo: String,
    pub branch: String,
    pub owner: String,
    pub git_url: String,
    pub source_path: String,
    pub build_path: String,
}

impl ExecutionParams {
    pub fn derive(event: &PushEvent, config: &Config) -> Self {
        let branch = event.branch().to_string();
        let git_url = if config.public_repo {
            format!(
                "https://{}/{}/{}.git",
                config.gh_server, event.owner, event.repo
            )
        } else {
            format!("git@{}:{}/{}.git", config.gh_server, event.owner, event.repo)
        };
        let source_path = format!(
            "{}/{}/{}/{}/code",
            config.temp, event.owner, event.repo, branch
        );
        let build_path = format!(
            "{}/{}/{}/{}/site",
            config.temp, event.owner, event.repo, branch
        );

        ExecutionParams {
            repo: event.repo.clone(),
            branch,
            owner: event.owner.clone(),
            git_url,
            source_path,
            build_path,
        }
    }

    /// The positional arguments in invocation order:
    /// repo, branch, owner, gitUrl, sourcePath, buildPath.
    pub fn as_args(&self) -> [&str; 6] {
        [
            &self.repo,
            &self.branch,
            &self.owner,
            &self.git_url,
            &self.source_path,
            &self.build_path,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn push_payload() -> Value {
        json!({
            "repository": {"name": "site", "owner": {"name": "alice"}},
            "ref": "refs/heads/main",
            "pusher": {"email": "a@x.com"}
        })
    }

    fn test_config(public_repo: bool) -> Config {
        Config {
            secret: None,
            accounts: vec!["alice".to_string()],
            gh_server: "github.com".to_string(),
            public_repo,
            temp: "/tmp/hook".to_string(),
            workers: 1,
            scripts: HashMap::new(),
            email: None,
            notify_email: None,
            log_dir: None,
        }
    }

    #[test]
    fn extracts_all_fields() {
        let event = PushEvent::from_payload(push_payload()).unwrap();
        assert_eq!(event.repo, "site");
        assert_eq!(event.owner, "alice");
        assert_eq!(event.git_ref, "refs/heads/main");
        assert_eq!(event.branch(), "main");
        assert_eq!(event.pusher_email.as_deref(), Some("a@x.com"));
    }

    #[test]
    fn pusher_email_is_optional() {
        let payload = json!({
            "repository": {"name": "site", "owner": {"name": "alice"}},
            "ref": "refs/heads/main"
        });
        let event = PushEvent::from_payload(payload).unwrap();
        assert_eq!(event.pusher_email, None);
    }

    #[test]
    fn missing_repository_name_is_malformed() {
        let payload = json!({
            "repository": {"owner": {"name": "alice"}},
            "ref": "refs/heads/main"
        });
        let err = PushEvent::from_payload(payload).unwrap_err();
        assert!(matches!(err, HookError::MalformedEvent(_)));
    }

    #[test]
    fn missing_owner_name_is_malformed() {
        let payload = json!({
            "repository": {"name": "site"},
            "ref": "refs/heads/main"
        });
        let err = PushEvent::from_payload(payload).unwrap_err();
        assert!(matches!(err, HookError::MalformedEvent(_)));
    }

    #[test]
    fn missing_ref_is_malformed() {
        let payload = json!({
            "repository": {"name": "site", "owner": {"name": "alice"}}
        });
        let err = PushEvent::from_payload(payload).unwrap_err();
        assert!(matches!(err, HookError::MalformedEvent(_)));
    }

    #[test]
    fn branch_keeps_unprefixed_ref() {
        let payload = json!({
            "repository": {"name": "site", "owner": {"name": "alice"}},
            "ref": "main"
        });
        let event = PushEvent::from_payload(payload).unwrap();
        assert_eq!(event.branch(), "main");
    }

    #[test]
    fn branch_gate_matches_terminal_ref_segment() {
        let event = PushEvent::from_payload(push_payload()).unwrap();
        assert!(event.matches_branch("main"));
        assert!(!event.matches_branch("develop"));
        // Comparison is against the terminal segment, not the full branch
        // name: `refs/heads/feature/x` is admitted by a hook URL naming `x`.
        let payload = json!({
            "repository": {"name": "site", "owner": {"name": "alice"}},
            "ref": "refs/heads/feature/x"
        });
        let event = PushEvent::from_payload(payload).unwrap();
        assert!(event.matches_branch("x"));
        assert!(!event.matches_branch("feature/x"));
        assert_eq!(event.branch(), "feature/x");
    }

    #[test]
    fn derives_params_for_public_repo() {
        let event = PushEvent::from_payload(push_payload()).unwrap();
        let params = ExecutionParams::derive(&event, &test_config(true));
        assert_eq!(
            params.as_args(),
            [
                "site",
                "main",
                "alice",
                "https://github.com/alice/site.git",
                "/tmp/hook/alice/site/main/code",
                "/tmp/hook/alice/site/main/site",
            ]
        );
    }

    #[test]
    fn derives_ssh_url_for_private_repo() {
        let event = PushEvent::from_payload(push_payload()).unwrap();
        let params = ExecutionParams::derive(&event, &test_config(false));
        assert_eq!(params.git_url, "git@github.com:alice/site.git");
    }
}
