//! Opaque bearer token service.

use std::sync::Arc;

use chrono::{Duration, Utc};
use ogw_schemas::RequestContext;
use ogw_store::EntityStore;
use sha2::{Digest, Sha256};
use tracing::error;
use uuid::Uuid;

use crate::AuthError;

/// Issues and validates opaque access tokens bound to a user.
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn EntityStore>,
    /// Optional time-based expiry. Most-recent-wins invalidation applies
    /// regardless; the TTL is an extra hardening layer.
    ttl: Option<Duration>,
}

impl TokenService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store, ttl: None }
    }

    pub fn with_ttl(store: Arc<dyn EntityStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl: Some(ttl),
        }
    }

    /// `create=false`: the user's current token, if one exists.
    /// `create=true`: mint and persist a fresh token; it becomes the only
    /// valid one for this user (most-recent-by-id wins on later lookups).
    pub async fn find_or_create_token(
        &self,
        user_id: i64,
        create: bool,
    ) -> Result<Option<String>, AuthError> {
        if create {
            let value = mint_token_value(user_id);
            let row = self.store.insert_token(user_id, &value).await?;
            return Ok(Some(row.token));
        }

        Ok(self
            .store
            .latest_token_for_user(user_id)
            .await?
            .map(|row| row.token))
    }

    /// Validate a presented bearer token and produce the per-request context.
    ///
    /// The double check: find the newest row storing this value, then
    /// re-derive the expected current token for that row's user. Both must
    /// agree or the token has been superseded.
    pub async fn validate(&self, presented: &str) -> Result<RequestContext, AuthError> {
        if presented.is_empty() {
            return Err(AuthError::TokenMissing);
        }

        let Some(row) = self.store.latest_token_by_value(presented).await? else {
            error!("token validation failed: unknown token value");
            return Err(AuthError::TokenInvalid);
        };

        if let Some(ttl) = self.ttl {
            if Utc::now() - row.created_at > ttl {
                error!(user_id = row.user_id, "token validation failed: expired");
                return Err(AuthError::TokenInvalid);
            }
        }

        let expected = self.find_or_create_token(row.user_id, false).await?;
        if expected.as_deref() != Some(presented) {
            error!(user_id = row.user_id, "token validation failed: superseded");
            return Err(AuthError::TokenInvalid);
        }

        let user = self.store.user(row.user_id).await?;
        Ok(RequestContext {
            uid: user.id,
            company_id: user.company_id,
        })
    }
}

/// Opaque token value: sha256 over user id, a v4 uuid, and the clock.
fn mint_token_value(user_id: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.to_le_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    hasher.update(
        Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_le_bytes(),
    );
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogw_testkit::MemStore;

    fn service() -> (Arc<MemStore>, TokenService, i64) {
        let store = Arc::new(MemStore::seeded());
        let svc = TokenService::new(Arc::clone(&store) as Arc<dyn EntityStore>);
        (store, svc, 1)
    }

    #[tokio::test]
    async fn fresh_token_validates() {
        let (_store, svc, uid) = service();
        let token = svc.find_or_create_token(uid, true).await.unwrap().unwrap();
        let ctx = svc.validate(&token).await.unwrap();
        assert_eq!(ctx.uid, uid);
    }

    #[tokio::test]
    async fn second_issue_invalidates_first() {
        let (_store, svc, uid) = service();
        let first = svc.find_or_create_token(uid, true).await.unwrap().unwrap();
        let second = svc.find_or_create_token(uid, true).await.unwrap().unwrap();
        assert_ne!(first, second);

        assert!(matches!(
            svc.validate(&first).await,
            Err(AuthError::TokenInvalid)
        ));
        assert!(svc.validate(&second).await.is_ok());
    }

    #[tokio::test]
    async fn lookup_without_create_returns_none_for_unknown_user() {
        let (_store, svc, _) = service();
        assert!(svc.find_or_create_token(999, false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn garbage_token_is_invalid() {
        let (_store, svc, _) = service();
        assert!(matches!(
            svc.validate("garbage").await,
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn empty_token_is_missing_not_invalid() {
        let (_store, svc, _) = service();
        assert!(matches!(
            svc.validate("").await,
            Err(AuthError::TokenMissing)
        ));
    }

    #[tokio::test]
    async fn expired_token_rejected_when_ttl_configured() {
        let store = Arc::new(MemStore::seeded());
        let svc = TokenService::with_ttl(
            Arc::clone(&store) as Arc<dyn EntityStore>,
            Duration::seconds(-1), // everything is already expired
        );
        let token = svc.find_or_create_token(1, true).await.unwrap().unwrap();
        assert!(matches!(
            svc.validate(&token).await,
            Err(AuthError::TokenInvalid)
        ));
    }
}
