//! Integration tests for the authority client over real HTTP
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use twitch_credentials::http_client::ReqwestHttpClient;
use twitch_credentials::{AuthErrorKind, TokenAuthority, TokenType};

use crate::test_harness::{user_validation, TestAuthority, CLIENT_ID};

#[tokio::test]
async fn test_validate_user_token() -> Result<()> {
    let mut authority = TestAuthority::start().await;
    let mock = authority.mock_validate("TOK", user_validation()).await;

    let creds = authority
        .client()
        .validate("TOK", TokenType::UserAccessToken)
        .await?;

    mock.assert_async().await;
    assert_eq!(creds.auth_token, "TOK");
    assert_eq!(creds.login, "user1");
    assert_eq!(creds.user_id, "1234");
    assert!(creds.scopes.contains("chat:read"));
    assert!(!creds.is_expired());
    Ok(())
}

#[tokio::test]
async fn test_validate_unauthorized_is_transport_failure() -> Result<()> {
    let mut authority = TestAuthority::start().await;
    let _mock = authority
        .server
        .mock("GET", "/oauth2/validate")
        .with_status(401)
        .with_body(r#"{"status":401,"message":"invalid access token"}"#)
        .create_async()
        .await;

    let err = authority
        .client()
        .validate("BAD", TokenType::UserAccessToken)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), AuthErrorKind::Transport);
    assert!(err.message().contains("invalid access token"));
    Ok(())
}

#[tokio::test]
async fn test_in_band_failure_is_rejection() -> Result<()> {
    let mut authority = TestAuthority::start().await;
    let _mock = authority
        .mock_validate("TOK", json!({ "status": 401, "message": "missing scope" }))
        .await;

    let err = authority
        .client()
        .validate("TOK", TokenType::UserAccessToken)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), AuthErrorKind::AuthorityRejection);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_authority() -> Result<()> {
    // Grab a free port and release it so nothing is listening there
    let port = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
    let http = reqwest::Client::builder().no_proxy().build()?;
    let authority = TokenAuthority::with_http_client(
        format!("http://127.0.0.1:{port}/oauth2"),
        Arc::new(ReqwestHttpClient::with_client(http)),
    );

    let err = authority
        .validate("TOK", TokenType::UserAccessToken)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), AuthErrorKind::Transport);

    assert!(authority.exchange(&[("grant_type", "client_credentials")]).await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_revoke() -> Result<()> {
    let mut authority = TestAuthority::start().await;
    let mock = authority
        .server
        .mock("POST", "/oauth2/revoke")
        .match_body(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("client_id".into(), CLIENT_ID.into()),
            mockito::Matcher::UrlEncoded("token".into(), "TOK".into()),
        ]))
        .with_status(200)
        .create_async()
        .await;

    authority.client().revoke(CLIENT_ID, "TOK").await?;
    mock.assert_async().await;
    Ok(())
}
