use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use super::{AuthError, AuthGrant, AuthProvider, Identity};

/// Auth state machine - explicit transitions, no callbacks
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    /// A sign-in, sign-up or session restore is in flight
    Authenticating,
    Authenticated(Identity),
}

impl AuthState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Transition: Unauthenticated → Authenticating
    pub fn begin(self) -> Result<Self, AuthError> {
        match self {
            Self::Unauthenticated => Ok(Self::Authenticating),
            Self::Authenticating => Err(AuthError::InvalidTransition(
                "authentication already in progress",
            )),
            Self::Authenticated(_) => Err(AuthError::InvalidTransition("already signed in")),
        }
    }

    /// Transition: Authenticating → Authenticated
    pub fn succeed(self, identity: Identity) -> Result<Self, AuthError> {
        match self {
            Self::Authenticating => Ok(Self::Authenticated(identity)),
            _ => Err(AuthError::InvalidTransition(
                "no authentication in progress",
            )),
        }
    }

    /// Transition: Authenticating → Unauthenticated. Other states are kept.
    pub fn fail(self) -> Self {
        match self {
            Self::Authenticating => Self::Unauthenticated,
            other => other,
        }
    }
}

/// The one place the rest of the system learns who is signed in.
///
/// Wraps an [`AuthProvider`], drives [`AuthState`] through its transitions
/// and publishes every change on a single watch channel.
pub struct AuthSession {
    provider: Arc<dyn AuthProvider>,
    state_tx: watch::Sender<AuthState>,
    token: Mutex<Option<String>>,
}

impl AuthSession {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        let (state_tx, _) = watch::channel(AuthState::Unauthenticated);
        Self {
            provider,
            state_tx,
            token: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> AuthState {
        self.state_tx.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().ok().and_then(|t| t.clone())
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.apply(AuthState::begin)?;
        let result = self.provider.sign_in(email, password).await;
        self.finish(result)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.apply(AuthState::begin)?;
        let result = self.provider.sign_up(email, password).await;
        self.finish(result)
    }

    /// Resume a persisted session token.
    pub async fn restore(&self, token: &str) -> Result<Identity, AuthError> {
        self.apply(AuthState::begin)?;
        let result = match self.provider.identity(token).await {
            Ok(Some(identity)) => Ok(AuthGrant {
                identity,
                token: token.to_string(),
            }),
            Ok(None) => Err(AuthError::Unauthenticated),
            Err(e) => Err(e),
        };
        self.finish(result)
    }

    /// Always ends Unauthenticated, even if the provider call fails.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let token = self.token.lock().ok().and_then(|mut t| t.take());
        self.state_tx.send_if_modified(|state| {
            let changed = *state != AuthState::Unauthenticated;
            *state = AuthState::Unauthenticated;
            changed
        });

        match token {
            Some(token) => self.provider.sign_out(&token).await,
            None => Ok(()),
        }
    }

    fn finish(&self, result: Result<AuthGrant, AuthError>) -> Result<Identity, AuthError> {
        match result {
            Ok(grant) => {
                if let Ok(mut token) = self.token.lock() {
                    *token = Some(grant.token);
                }
                let identity = grant.identity;
                self.apply(|state| state.succeed(identity.clone()))?;
                tracing::debug!(user_id = %identity.user_id, "signed in");
                Ok(identity)
            }
            Err(e) => {
                self.apply(|state| Ok(state.fail()))?;
                Err(e)
            }
        }
    }

    fn apply(
        &self,
        transition: impl FnOnce(AuthState) -> Result<AuthState, AuthError>,
    ) -> Result<(), AuthError> {
        let mut outcome = Ok(());
        self.state_tx.send_if_modified(|state| match transition(state.clone()) {
            Ok(next) => {
                let changed = *state != next;
                *state = next;
                changed
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }
}
