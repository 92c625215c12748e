//! Login gate: credential intake, store authentication, token mint.

use std::sync::Arc;

use ogw_schemas::LoginProfile;
use ogw_store::EntityStore;
use serde_json::json;
use tracing::{error, info};

use crate::{AuthError, TokenService};

/// db / login / password triple from one source (body, query or headers).
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub db: Option<String>,
    pub login: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(
        db: Option<String>,
        login: Option<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            db,
            login,
            password,
        }
    }

    /// All three fields present and non-empty.
    fn complete(&self) -> Option<(&str, &str, &str)> {
        match (
            self.db.as_deref(),
            self.login.as_deref(),
            self.password.as_deref(),
        ) {
            (Some(db), Some(login), Some(password))
                if !db.is_empty() && !login.is_empty() && !password.is_empty() =>
            {
                Some((db, login, password))
            }
            _ => None,
        }
    }
}

/// Authenticate and mint a fresh access token.
///
/// Credential intake is all-or-nothing per source: if `primary` (the request
/// body/query) is incomplete the `fallback` (headers) is used whole — fields
/// are never merged across the two.
pub async fn login(
    store: &Arc<dyn EntityStore>,
    tokens: &TokenService,
    primary: Credentials,
    fallback: Credentials,
) -> Result<LoginProfile, AuthError> {
    let (db, username, password) = primary
        .complete()
        .map(|(d, l, p)| (d.to_string(), l.to_string(), p.to_string()))
        .or_else(|| {
            fallback
                .complete()
                .map(|(d, l, p)| (d.to_string(), l.to_string(), p.to_string()))
        })
        .ok_or(AuthError::MissingCredentials)?;

    let user = store
        .authenticate(&db, &username, &password)
        .await
        .map_err(|e| {
            error!(login = %username, db = %db, "authentication rejected: {e}");
            AuthError::from(e)
        })?;

    if user.id <= 0 {
        error!(login = %username, "authentication produced no user id");
        return Err(AuthError::AuthenticationFailed);
    }

    let access_token = tokens
        .find_or_create_token(user.id, true)
        .await?
        .ok_or(AuthError::AuthenticationFailed)?;

    info!(uid = user.id, "login ok, token issued");

    Ok(LoginProfile {
        uid: user.id,
        user_context: json!({
            "lang": user.lang,
            "tz": user.tz,
            "uid": user.id,
        }),
        company_id: user.company_id,
        company_ids: user.company_ids,
        partner_id: user.partner_id,
        access_token,
        company_name: user.company_name,
        country: user.country,
        contact_address: user.contact_address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogw_testkit::{MemStore, TEST_DB, TEST_LOGIN, TEST_PASSWORD};

    fn setup() -> (Arc<dyn EntityStore>, TokenService) {
        let store: Arc<dyn EntityStore> = Arc::new(MemStore::seeded());
        let tokens = TokenService::new(Arc::clone(&store));
        (store, tokens)
    }

    fn good_creds() -> Credentials {
        Credentials::new(
            Some(TEST_DB.into()),
            Some(TEST_LOGIN.into()),
            Some(TEST_PASSWORD.into()),
        )
    }

    #[tokio::test]
    async fn login_returns_profile_with_token() {
        let (store, tokens) = setup();
        let profile = login(&store, &tokens, good_creds(), Credentials::default())
            .await
            .unwrap();
        assert_eq!(profile.uid, 1);
        assert!(!profile.access_token.is_empty());
        assert_eq!(profile.user_context["uid"], 1);
        assert_eq!(profile.company_id, 1);
    }

    #[tokio::test]
    async fn missing_credentials_everywhere_is_rejected() {
        let (store, tokens) = setup();
        let err = login(
            &store,
            &tokens,
            Credentials::default(),
            Credentials::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials));
    }

    #[tokio::test]
    async fn header_fallback_is_whole_not_per_field() {
        let (store, tokens) = setup();

        // Primary carries db only; headers carry the full triple. The full
        // header set must win — primary's db is not merged in.
        let primary = Credentials::new(Some("wrong-db".into()), None, None);
        let profile = login(&store, &tokens, primary, good_creds())
            .await
            .unwrap();
        assert_eq!(profile.uid, 1);
    }

    #[tokio::test]
    async fn wrong_password_is_access_denied() {
        let (store, tokens) = setup();
        let creds = Credentials::new(
            Some(TEST_DB.into()),
            Some(TEST_LOGIN.into()),
            Some("nope".into()),
        );
        let err = login(&store, &tokens, creds, Credentials::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccessDenied));
    }

    #[tokio::test]
    async fn unknown_db_is_invalid_database() {
        let (store, tokens) = setup();
        let creds = Credentials::new(
            Some("other".into()),
            Some(TEST_LOGIN.into()),
            Some(TEST_PASSWORD.into()),
        );
        let err = login(&store, &tokens, creds, Credentials::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidDatabase(db) if db == "other"));
    }

    #[tokio::test]
    async fn archived_user_is_access_error() {
        let mem = Arc::new(MemStore::seeded());
        mem.deactivate_user(1);
        let store: Arc<dyn EntityStore> = mem;
        let tokens = TokenService::new(Arc::clone(&store));
        let err = login(&store, &tokens, good_creds(), Credentials::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccessError(_)));
    }
}
