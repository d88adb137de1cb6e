//! End-to-end tests for the grant flows: real listener, real transport, mock authority
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;

use twitch_credentials::{AuthErrorKind, CredentialCodec, Credentials, TokenType};

use crate::test_harness::{
    abandoned_browser, scripted_browser, user_validation, TestAuthority, CLIENT_ID, CLIENT_SECRET,
};

#[tokio::test]
async fn test_implicit_flow() -> Result<()> {
    let mut authority = TestAuthority::start().await;
    let validate = authority.mock_validate("TOK", user_validation()).await;
    let browser = scripted_browser(|state| {
        format!("access_token=TOK&scope=chat%3Aread&state={state}&token_type=bearer")
    });

    let creds = authority.flows(browser).implicit(&authority.config()).await?;

    validate.assert_async().await;
    assert_eq!(creds.auth_token, "TOK");
    assert_eq!(creds.token_type, TokenType::UserAccessToken);
    assert_eq!(creds.login, "user1");
    assert!(creds.refresh_token.is_none());
    Ok(())
}

#[tokio::test]
async fn test_implicit_flow_with_forged_state() -> Result<()> {
    let mut authority = TestAuthority::start().await;
    let validate = authority
        .mock_validate("TOK", user_validation())
        .await
        .expect(0);
    let browser = scripted_browser(|_| "access_token=TOK&state=forged&token_type=bearer".to_string());

    let err = authority
        .flows(browser)
        .implicit(&authority.config())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), AuthErrorKind::ParameterValidation);
    validate.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_authorization_code_round_trip() -> Result<()> {
    let mut authority = TestAuthority::start().await;
    let config = authority.config();
    let flows = authority.flows(scripted_browser(|state| format!("code=CODE123&scope=chat%3Aread&state={state}")));

    // Front end captures the code without calling the authority
    let code = flows.authorization_code_front_end(&config).await?;
    assert_eq!(code, "CODE123");

    let token = authority
        .mock_token(
            &[
                ("client_id", CLIENT_ID),
                ("client_secret", CLIENT_SECRET),
                ("code", "CODE123"),
                ("grant_type", "authorization_code"),
            ],
            200,
            json!({
                "access_token": "TOK",
                "refresh_token": "RT",
                "expires_in": 14124,
                "scope": ["chat:read"],
                "token_type": "bearer"
            }),
        )
        .await;
    let validate = authority.mock_validate("TOK", user_validation()).await;

    let creds = flows
        .authorization_code_exchange(&config, &code, CLIENT_SECRET)
        .await?;

    token.assert_async().await;
    validate.assert_async().await;
    assert_eq!(creds.refresh_token.as_deref(), Some("RT"));
    assert_eq!(creds.token_type, TokenType::UserAccessToken);
    Ok(())
}

#[tokio::test]
async fn test_denied_consent_returns_no_code() -> Result<()> {
    let authority = TestAuthority::start().await;
    let browser = scripted_browser(|state| {
        format!("code=CODE123&error=access_denied&error_description=The+user+denied+you+access&state={state}")
    });

    let err = authority
        .flows(browser)
        .authorization_code_front_end(&authority.config())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), AuthErrorKind::ParameterValidation);
    assert!(err.message().contains("access_denied"));
    Ok(())
}

#[tokio::test]
async fn test_client_credentials_flow() -> Result<()> {
    let mut authority = TestAuthority::start().await;
    let token = authority
        .mock_token(
            &[
                ("client_id", CLIENT_ID),
                ("client_secret", CLIENT_SECRET),
                ("grant_type", "client_credentials"),
            ],
            200,
            json!({ "access_token": "APP", "expires_in": 5089418, "token_type": "bearer" }),
        )
        .await;
    let validate = authority
        .mock_validate("APP", json!({ "client_id": CLIENT_ID, "scopes": null, "expires_in": 5089418 }))
        .await;

    let creds = authority
        .flows(abandoned_browser())
        .client_credentials(&authority.config(), CLIENT_SECRET)
        .await?;

    token.assert_async().await;
    validate.assert_async().await;
    assert_eq!(creds.token_type, TokenType::AppAccessToken);
    assert!(!creds.has_refresh_token());
    Ok(())
}

#[tokio::test]
async fn test_refresh_from_persisted_credentials() -> Result<()> {
    let mut authority = TestAuthority::start().await;
    let dir = TempDir::new()?;
    let path = dir.path().join("twitch.creds");
    let key = CredentialCodec::key_from_base64(&CredentialCodec::generate_key())?;

    // Persist what a previous authorization-code exchange produced
    let initial_token = authority
        .mock_token(
            &[("grant_type", "authorization_code")],
            200,
            json!({ "access_token": "TOK", "refresh_token": "RT1", "expires_in": 1, "token_type": "bearer" }),
        )
        .await;
    let _initial_validate = authority.mock_validate("TOK", user_validation()).await;
    let flows = authority.flows(abandoned_browser());
    let initial = flows
        .authorization_code_exchange(&authority.config(), "CODE", CLIENT_SECRET)
        .await?;
    initial_token.assert_async().await;
    assert!(CredentialCodec::save_credentials(&path, &initial, &key));

    let stored = CredentialCodec::load_credentials(&path, &key).expect("stored credentials");
    assert_eq!(stored, initial);

    let refresh = authority
        .mock_token(
            &[
                ("client_id", CLIENT_ID),
                ("grant_type", "refresh_token"),
                ("refresh_token", "RT1"),
            ],
            200,
            json!({ "access_token": "NEW", "refresh_token": "RT2", "expires_in": 14000, "token_type": "bearer" }),
        )
        .await;
    let _refresh_validate = authority.mock_validate("NEW", user_validation()).await;

    let refreshed = flows.refresh(&stored, CLIENT_SECRET).await?;

    refresh.assert_async().await;
    assert_eq!(refreshed.auth_token, "NEW");
    assert_eq!(refreshed.refresh_token.as_deref(), Some("RT2"));
    Ok(())
}

#[tokio::test]
async fn test_refresh_without_token_skips_network() -> Result<()> {
    let mut authority = TestAuthority::start().await;
    let token = authority
        .mock_token(&[("grant_type", "refresh_token")], 200, json!({}))
        .await
        .expect(0);

    let creds = Credentials {
        auth_token: "TOK".to_string(),
        refresh_token: Some(String::new()),
        client_id: CLIENT_ID.to_string(),
        login: "user1".to_string(),
        user_id: "1234".to_string(),
        scopes: Default::default(),
        expires_in_seconds: 3600,
        validation_timestamp: Utc::now(),
        token_type: TokenType::UserAccessToken,
    };

    let err = authority
        .flows(abandoned_browser())
        .refresh(&creds, CLIENT_SECRET)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), AuthErrorKind::CredentialState);
    assert_eq!(err.message(), "Refresh Token is null or empty");
    token.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_abandoned_consent_times_out() -> Result<()> {
    let authority = TestAuthority::start().await;
    let config = authority
        .config()
        .with_redirect_timeout(Some(Duration::from_secs(1)));

    let err = authority
        .flows(abandoned_browser())
        .implicit(&config)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), AuthErrorKind::Listener);
    Ok(())
}
