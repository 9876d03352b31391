//! Session orchestration
//!
//! Composes the credential store, token codec, refresh tokens, revocation
//! registry and login limiter into the signup, login, refresh, logout and
//! account deletion flows. Every stage of a flow completes before the next
//! starts; flows of different requests share only the registry and limiter.
//!
//! Author: hephaex@gmail.com

use super::error::AuthError;
use super::jwt::{Claims, TokenCodec};
use super::models::{AuthResponse, Principal, SignupRequest};
use super::rate_limit::LoginRateLimiter;
use super::refresh::RefreshTokenService;
use super::revocation::RevocationRegistry;
use crate::audit::{audit_log, AuditEvent, RequestContext};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tasklane_core::password::{hash_password, verify_password};
use tasklane_core::{AppConfig, CredentialStore, DocumentStore, PasswordConfig, TaskStore, User};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use validator::Validate;

/// What a logout request ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// No bearer token was presented
    NoToken,
    /// The token was revoked earlier
    AlreadyRevoked,
    /// The token does not verify, so there is nothing to revoke
    Ignored,
    /// Token revoked; `refresh_tokens_deleted` is `None` if the store failed
    Revoked {
        username: String,
        refresh_tokens_deleted: Option<u64>,
    },
}

/// Result of one housekeeping sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    pub expired_refresh_tokens: u64,
    pub revoked_tokens: u64,
    pub tracked_callers: usize,
}

/// Session/token orchestrator
pub struct SessionService {
    store: Arc<dyn DocumentStore>,
    codec: TokenCodec,
    refresh_tokens: RefreshTokenService,
    revocations: RevocationRegistry,
    limiter: LoginRateLimiter,
    password: PasswordConfig,
    /// Verified against when the username is unknown, so both paths cost alike
    dummy_hash: String,
}

impl SessionService {
    pub fn new(config: &AppConfig, store: Arc<dyn DocumentStore>) -> Result<Self, AuthError> {
        let codec = TokenCodec::from_config(&config.auth);
        let refresh_tokens = RefreshTokenService::new(
            Arc::clone(&store),
            Duration::from_secs(config.auth.refresh_token_ttl_secs),
        );
        let revocations =
            RevocationRegistry::new(config.revocation.max_entries, config.revocation_ttl());
        let limiter = LoginRateLimiter::new(&config.rate_limit)?;
        let dummy_hash = hash_password("tasklane-timing-equaliser", &config.password)?;

        Ok(Self {
            store,
            codec,
            refresh_tokens,
            revocations,
            limiter,
            password: config.password.clone(),
            dummy_hash,
        })
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn revocations(&self) -> &RevocationRegistry {
        &self.revocations
    }

    pub fn limiter(&self) -> &LoginRateLimiter {
        &self.limiter
    }

    // ------------------------------------------------------------------
    // Signup
    // ------------------------------------------------------------------

    /// Create an active account with the default role
    pub async fn signup(
        &self,
        ctx: &RequestContext,
        request: SignupRequest,
    ) -> Result<User, AuthError> {
        if let Err(e) = request.validate() {
            audit_log(&AuditEvent::RegistrationFailure {
                username: request.username.clone(),
                reason: "validation".to_string(),
                ip_address: ctx.ip_address.clone(),
            });
            return Err(AuthError::Validation(e.to_string()));
        }

        let password_hash = self.hash(request.password).await?;
        let user = User::new(request.username, password_hash);

        if let Err(e) = self.store.insert_user(&user).await {
            let err = AuthError::from(e);
            audit_log(&AuditEvent::RegistrationFailure {
                username: user.username.clone(),
                reason: err.kind().to_string(),
                ip_address: ctx.ip_address.clone(),
            });
            return Err(err);
        }

        audit_log(&AuditEvent::RegistrationSuccess {
            user_id: user.id,
            username: user.username.clone(),
            ip_address: ctx.ip_address.clone(),
        });
        Ok(user)
    }

    // ------------------------------------------------------------------
    // Login
    // ------------------------------------------------------------------

    /// Throttle, check credentials, then issue an access/refresh pair
    pub async fn login(
        &self,
        ctx: &RequestContext,
        username: &str,
        password: &str,
    ) -> Result<AuthResponse, AuthError> {
        if let Err(retry_after) = self.limiter.check(ctx.caller_key()) {
            audit_log(&AuditEvent::LoginRateLimited {
                caller: ctx.caller_key().to_string(),
                retry_after_secs: retry_after.as_secs_f64().ceil() as u64,
            });
            return Err(AuthError::RateLimited { retry_after });
        }

        let outcome = match self.check_credentials(username, password).await {
            Ok(user) => self.issue_pair(&user.username).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(response) => {
                audit_log(&AuditEvent::LoginSuccess {
                    username: username.to_string(),
                    ip_address: ctx.ip_address.clone(),
                    user_agent: ctx.user_agent.clone(),
                });
                Ok(response)
            }
            Err(err) => {
                audit_log(&AuditEvent::LoginFailure {
                    username: username.to_string(),
                    reason: err.kind().to_string(),
                    ip_address: ctx.ip_address.clone(),
                    user_agent: ctx.user_agent.clone(),
                });
                Err(err)
            }
        }
    }

    async fn check_credentials(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let Some(user) = self.store.find_by_username(username).await? else {
            self.verify(password.to_string(), self.dummy_hash.clone())
                .await?;
            return Err(AuthError::InvalidCredentials);
        };

        if !self
            .verify(password.to_string(), user.password_hash.clone())
            .await?
        {
            return Err(AuthError::InvalidCredentials);
        }
        if !user.active {
            return Err(AuthError::AccountDisabled);
        }
        Ok(user)
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    /// Exchange a refresh token for a new pair, retiring the old token
    pub async fn refresh(
        &self,
        ctx: &RequestContext,
        refresh_token: &str,
    ) -> Result<AuthResponse, AuthError> {
        match self.rotate(refresh_token).await {
            Ok((username, response)) => {
                audit_log(&AuditEvent::TokenRefresh {
                    username,
                    ip_address: ctx.ip_address.clone(),
                });
                Ok(response)
            }
            Err(err) => {
                audit_log(&AuditEvent::RefreshRejected {
                    reason: err.kind().to_string(),
                    ip_address: ctx.ip_address.clone(),
                });
                Err(err)
            }
        }
    }

    async fn rotate(&self, refresh_token: &str) -> Result<(String, AuthResponse), AuthError> {
        let record = self
            .refresh_tokens
            .find(refresh_token)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        if record.is_expired() {
            self.refresh_tokens.delete(refresh_token).await?;
            return Err(AuthError::RefreshTokenExpired);
        }

        let user = match self.store.find_by_username(&record.username).await? {
            Some(user) => user,
            None => {
                self.refresh_tokens.delete(refresh_token).await?;
                return Err(AuthError::InvalidRefreshToken);
            }
        };
        if !user.active {
            return Err(AuthError::AccountDisabled);
        }

        // Old token goes first; of two racing refreshes only one removes it.
        if !self.refresh_tokens.delete(refresh_token).await? {
            return Err(AuthError::InvalidRefreshToken);
        }

        let response = self.issue_pair(&user.username).await?;
        Ok((user.username, response))
    }

    // ------------------------------------------------------------------
    // Logout
    // ------------------------------------------------------------------

    /// Revoke the presented access token and the user's refresh tokens
    ///
    /// Never fails. Only tokens that verify are added to the registry, so an
    /// anonymous caller cannot fill it with garbage.
    pub async fn logout(&self, ctx: &RequestContext, access_token: Option<&str>) -> LogoutOutcome {
        let Some(token) = access_token else {
            return LogoutOutcome::NoToken;
        };
        if self.revocations.is_revoked(token) {
            return LogoutOutcome::AlreadyRevoked;
        }

        let claims = match self.codec.verify(token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(reason = %e, "Logout with unverifiable token ignored");
                return LogoutOutcome::Ignored;
            }
        };

        self.revocations.revoke(token).await;

        let refresh_tokens_deleted = match self.refresh_tokens.delete_by_username(&claims.sub).await
        {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(username = %claims.sub, error = %e, "Failed to delete refresh tokens on logout");
                None
            }
        };

        audit_log(&AuditEvent::Logout {
            username: claims.sub.clone(),
            refresh_tokens_deleted,
            ip_address: ctx.ip_address.clone(),
        });

        LogoutOutcome::Revoked {
            username: claims.sub,
            refresh_tokens_deleted,
        }
    }

    // ------------------------------------------------------------------
    // Gate
    // ------------------------------------------------------------------

    /// Resolve an access token to the principal of a live, active user
    pub async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        if self.revocations.is_revoked(token) {
            return Err(AuthError::TokenRevoked);
        }

        let claims: Claims = self.codec.verify(token)?;
        let user = self
            .store
            .find_by_username(&claims.sub)
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        if !user.active {
            return Err(AuthError::AccountDisabled);
        }

        Ok(Principal::from_user(&user, claims.expires_at()))
    }

    // ------------------------------------------------------------------
    // Account removal
    // ------------------------------------------------------------------

    /// Delete the principal's account with its tasks and refresh tokens
    pub async fn delete_account(
        &self,
        ctx: &RequestContext,
        principal: &Principal,
        access_token: Option<&str>,
    ) -> Result<(), AuthError> {
        if let Some(token) = access_token {
            self.revocations.revoke(token).await;
        }

        self.refresh_tokens
            .delete_by_username(&principal.username)
            .await?;
        let tasks = self.store.delete_tasks_by_owner(principal.user_id).await?;
        self.store.delete_user(&principal.username).await?;

        info!(username = %principal.username, tasks, "Account deleted");
        audit_log(&AuditEvent::AccountDeleted {
            user_id: principal.user_id,
            username: principal.username.clone(),
            ip_address: ctx.ip_address.clone(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Housekeeping
    // ------------------------------------------------------------------

    /// One sweep: registry evictions, idle limiter buckets, expired tokens
    pub async fn run_housekeeping(&self) -> HousekeepingReport {
        self.revocations.run_maintenance().await;
        self.limiter.retain_recent();

        let expired_refresh_tokens = match self.refresh_tokens.purge_expired(Utc::now()).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Refresh token sweep failed");
                0
            }
        };

        let report = HousekeepingReport {
            expired_refresh_tokens,
            revoked_tokens: self.revocations.len(),
            tracked_callers: self.limiter.tracked_callers(),
        };
        debug!(?report, "Housekeeping finished");
        report
    }

    /// Run [`Self::run_housekeeping`] every `every` until `shutdown` fires
    pub fn spawn_housekeeping(
        self: &Arc<Self>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Housekeeping stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        service.run_housekeeping().await;
                    }
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn issue_pair(&self, username: &str) -> Result<AuthResponse, AuthError> {
        let access = self.codec.issue_access(username)?;
        let refresh = self.refresh_tokens.issue(username).await?;

        Ok(AuthResponse {
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: "Bearer".to_string(),
            expires_in: self.codec.access_ttl().as_secs(),
        })
    }

    /// Argon2 is CPU bound; keep it off the async workers
    async fn hash(&self, password: String) -> Result<String, AuthError> {
        let config = self.password.clone();
        tokio::task::spawn_blocking(move || hash_password(&password, &config))
            .await
            .map_err(|e| AuthError::Internal(format!("hashing task failed: {e}")))?
            .map_err(AuthError::from)
    }

    async fn verify(&self, password: String, hash: String) -> Result<bool, AuthError> {
        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Internal(format!("verification task failed: {e}")))?
            .map_err(AuthError::from)
    }
}
