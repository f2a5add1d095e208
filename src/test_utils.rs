//! Shared fixtures for unit tests.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::event::{ExecutionParams, PushEvent};
use crate::notify::{Mailer, NotifyError, OutgoingMail};
use crate::queue::HookTask;
use crate::{Config, ScriptPair};

/// Mailer that records instead of delivering.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingMail>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        RecordingMailer {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Transport("simulated send failure".to_string()));
        }
        self.sent.lock().await.push(mail);
        Ok(())
    }
}

pub fn test_config() -> Config {
    Config {
        secret: None,
        accounts: vec!["alice".to_string()],
        gh_server: "github.com".to_string(),
        public_repo: true,
        temp: "/tmp/hook".to_string(),
        workers: 1,
        scripts: HashMap::from([(
            crate::DEFAULT_SCRIPT_KEY.to_string(),
            ScriptPair {
                build: "true".to_string(),
                publish: "true".to_string(),
            },
        )]),
        email: None,
        notify_email: None,
        log_dir: None,
    }
}

pub fn sample_event() -> PushEvent {
    PushEvent::from_payload(json!({
        "repository": {"name": "site", "owner": {"name": "alice"}},
        "ref": "refs/heads/main",
        "pusher": {"email": "a@x.com"}
    }))
    .expect("sample payload is well-formed")
}

pub fn sample_task() -> HookTask {
    let event = sample_event();
    let params = ExecutionParams::derive(&event, &test_config());
    HookTask::new(event, params)
}
