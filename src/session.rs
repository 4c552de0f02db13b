//! Session boundary: sign-in, sign-out and the conversation they own.

use crate::auth::{AuthFailure, Authenticator, Identity};
use crate::orchestrator::Orchestrator;
use crate::storage::{Session, SessionStorage, StorageError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{0}")]
    Auth(#[from] AuthFailure),
    #[error("session storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Owns the active session and the orchestrator bound to it.
pub struct SessionManager {
    auth: Arc<dyn Authenticator>,
    storage: SessionStorage,
    orchestrator: Orchestrator,
    current: Option<Session>,
}

impl SessionManager {
    pub fn new(
        auth: Arc<dyn Authenticator>,
        storage: SessionStorage,
        orchestrator: Orchestrator,
    ) -> Self {
        Self {
            auth,
            storage,
            orchestrator,
            current: None,
        }
    }

    /// Resume a session left in storage, if any.
    pub fn restore(&mut self) -> Result<Option<&Session>, SessionError> {
        match self.storage.get()? {
            Some(session) => Ok(Some(self.activate(session))),
            None => Ok(None),
        }
    }

    pub async fn login(&mut self, email: &str, credential: &str) -> Result<&Session, SessionError> {
        let identity = self.auth.login(email, credential).await?;
        self.start(identity)
    }

    pub async fn register(
        &mut self,
        email: &str,
        credential: &str,
    ) -> Result<&Session, SessionError> {
        let identity = self.auth.register(email, credential).await?;
        self.start(identity)
    }

    /// End the session: clear the conversation and forget the stored record.
    pub fn logout(&mut self) -> Result<(), SessionError> {
        if let Some(session) = self.current.take() {
            tracing::info!(identity = %session.identity, "signed out");
        }
        self.orchestrator.reset_session();
        self.storage.delete()?;
        Ok(())
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    fn start(&mut self, identity: Identity) -> Result<&Session, SessionError> {
        if let Some(previous) = self.current.take() {
            tracing::info!(identity = %previous.identity, "replacing active session");
            self.orchestrator.reset_session();
        }
        let session = Session::new(identity);
        self.storage.put(&session)?;
        tracing::info!(identity = %session.identity, "signed in");
        Ok(self.activate(session))
    }

    fn activate(&mut self, session: Session) -> &Session {
        self.orchestrator
            .initialize_session(session.identity.as_str());
        self.current.insert(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentError, CoachingClient};
    use crate::conversation::Message;
    use async_trait::async_trait;

    struct EchoClient;

    #[async_trait]
    impl CoachingClient for EchoClient {
        async fn continue_conversation(&self, history: &[Message]) -> Result<String, AgentError> {
            Ok(format!("you said: {}", history.last().map(Message::text).unwrap_or("")))
        }

        async fn extract_summary(&self, _history: &[Message]) -> Result<String, AgentError> {
            Ok(r#"{"currentIssues": "oversleeping"}"#.to_string())
        }
    }

    /// Accepts one account with a fixed credential.
    struct SingleAccount;

    #[async_trait]
    impl Authenticator for SingleAccount {
        async fn login(&self, email: &str, credential: &str) -> Result<Identity, AuthFailure> {
            if email == "sam@example.com" && credential == "secret1" {
                Ok(Identity::new(email))
            } else {
                Err(AuthFailure::InvalidCredentials)
            }
        }

        async fn register(&self, email: &str, credential: &str) -> Result<Identity, AuthFailure> {
            if email == "sam@example.com" {
                Err(AuthFailure::AlreadyRegistered)
            } else if credential.len() < 6 {
                Err(AuthFailure::CredentialTooShort)
            } else {
                Ok(Identity::new(email))
            }
        }
    }

    fn manager() -> SessionManager {
        SessionManager::new(
            Arc::new(SingleAccount),
            SessionStorage::open().unwrap(),
            Orchestrator::new(Arc::new(EchoClient)),
        )
    }

    #[tokio::test]
    async fn login_starts_session_with_greeting() {
        let mut manager = manager();
        let session = manager.login("sam@example.com", "secret1").await.unwrap();
        assert_eq!(session.identity.as_str(), "sam@example.com");

        let snapshot = manager.orchestrator().snapshot();
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.identity.as_deref(), Some("sam@example.com"));
        assert!(manager.storage.get().unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_login_creates_no_session() {
        let mut manager = manager();
        let err = manager.login("sam@example.com", "nope").await.unwrap_err();
        assert!(matches!(err, SessionError::Auth(AuthFailure::InvalidCredentials)));
        assert_eq!(
            err.to_string(),
            "The email address or password is incorrect."
        );

        assert!(manager.current().is_none());
        assert!(manager.storage.get().unwrap().is_none());
        assert_eq!(manager.orchestrator().message_count(), 0);
    }

    #[tokio::test]
    async fn register_surfaces_failures() {
        let mut manager = manager();
        assert!(matches!(
            manager.register("sam@example.com", "secret1").await,
            Err(SessionError::Auth(AuthFailure::AlreadyRegistered))
        ));
        assert!(matches!(
            manager.register("new@example.com", "123").await,
            Err(SessionError::Auth(AuthFailure::CredentialTooShort))
        ));
        let session = manager.register("new@example.com", "123456").await.unwrap();
        assert_eq!(session.identity.as_str(), "new@example.com");
    }

    #[tokio::test]
    async fn logout_resets_conversation_and_storage() {
        let mut manager = manager();
        manager.login("sam@example.com", "secret1").await.unwrap();
        let report = manager
            .orchestrator()
            .send_user_message("I want to wake up earlier")
            .await;
        report.summary_task.unwrap().await.unwrap();
        assert!(manager.orchestrator().snapshot().summary.is_some());

        manager.logout().unwrap();
        let snapshot = manager.orchestrator().snapshot();
        assert!(snapshot.messages.is_empty());
        assert!(snapshot.summary.is_none());
        assert!(manager.current().is_none());
        assert!(manager.storage.get().unwrap().is_none());
    }

    #[tokio::test]
    async fn signing_in_again_starts_a_fresh_conversation() {
        let mut manager = manager();
        manager.login("sam@example.com", "secret1").await.unwrap();
        let report = manager
            .orchestrator()
            .send_user_message("I want to wake up earlier")
            .await;
        report.summary_task.unwrap().await.unwrap();
        assert_eq!(manager.orchestrator().message_count(), 3);

        let session = manager.register("new@example.com", "123456").await.unwrap();
        assert_eq!(session.identity.as_str(), "new@example.com");

        let snapshot = manager.orchestrator().snapshot();
        assert_eq!(snapshot.identity.as_deref(), Some("new@example.com"));
        assert_eq!(snapshot.messages.len(), 1);
        assert!(snapshot.messages[0].text().contains("new@example.com"));
        assert!(snapshot.summary.is_none());
        assert_eq!(
            manager.storage.get().unwrap().unwrap().identity.as_str(),
            "new@example.com"
        );
    }

    #[tokio::test]
    async fn same_identity_signing_in_again_starts_over() {
        let mut manager = manager();
        manager.login("sam@example.com", "secret1").await.unwrap();
        manager
            .orchestrator()
            .send_user_message("I keep procrastinating")
            .await;

        manager.login("sam@example.com", "secret1").await.unwrap();
        let snapshot = manager.orchestrator().snapshot();
        assert_eq!(snapshot.messages.len(), 1);
        assert!(snapshot.summary.is_none());
    }

    #[tokio::test]
    async fn restore_resumes_stored_session() {
        let mut manager = manager();
        assert!(manager.restore().unwrap().is_none());

        manager
            .storage
            .put(&Session::new(Identity::new("sam@example.com")))
            .unwrap();
        let restored = manager.restore().unwrap().unwrap();
        assert_eq!(restored.identity.as_str(), "sam@example.com");
        assert_eq!(manager.orchestrator().message_count(), 1);
    }
}
