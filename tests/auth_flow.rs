//! End-to-end authentication flow tests against a real PostgreSQL database.
//!
//! Point `MONEYMAGNET_TEST_DSN` at a disposable database to run these;
//! without it each test skips. Tests use unique names and addresses instead
//! of truncating, so they can share a database and run concurrently.

use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use moneymagnet::api;
use moneymagnet::api::handlers::auth::{AuthConfig, AuthState};
use serde_json::{Value, json};
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use std::sync::Arc;
use tower::ServiceExt;

const SCHEMA_SQL: &str = include_str!("../db/sql/01_moneymagnet.sql");

async fn test_pool() -> Result<Option<PgPool>> {
    let Ok(dsn) = std::env::var("MONEYMAGNET_TEST_DSN") else {
        eprintln!("Skipping integration test: MONEYMAGNET_TEST_DSN is not set");
        return Ok(None);
    };
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&dsn)
        .await
        .context("failed to connect to test database")?;

    // Tests run concurrently against one database; serialize the idempotent
    // schema DDL on a single connection so it only races with itself.
    let mut conn = pool.acquire().await?;
    sqlx::query("SELECT pg_advisory_lock(420042)")
        .execute(&mut *conn)
        .await?;
    let schema_result = sqlx::Executor::execute(&mut *conn, SCHEMA_SQL).await;
    let _ = sqlx::query("SELECT pg_advisory_unlock(420042)")
        .execute(&mut *conn)
        .await;
    drop(conn);
    schema_result.context("failed to execute schema SQL")?;

    Ok(Some(pool))
}

fn app(pool: PgPool) -> Router {
    let auth_state = Arc::new(AuthState::new(AuthConfig::new()));
    let (router, _openapi) = api::router().split_for_parts();
    router.layer(Extension(auth_state)).layer(Extension(pool))
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", ulid::Ulid::new().to_string().to_lowercase())
}

fn random_ip() -> String {
    let octets: [u8; 3] = rand::random();
    format!("10.{}.{}.{}", octets[0], octets[1], octets[2])
}

fn post_json(uri: &str, body: &Value, ip: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(ip) = ip {
        builder = builder.header("x-forwarded-for", ip);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

async fn response_json(response: axum::response::Response) -> Result<Value> {
    let bytes = response.into_body().collect().await?.to_bytes();
    serde_json::from_slice(&bytes).context("response body is not JSON")
}

fn account_body(household: &str, key: &str, user_name: &str, password: &str) -> Value {
    json!({
        "household_name": household,
        "key": key,
        "user_name": user_name,
        "password_hash": password,
        "first_name": "Joe",
        "last_name": "Doe",
        "email": "joe@example.com",
        "date_of_birth": "1990-04-01"
    })
}

async fn create_super_user(
    app: &Router,
    household: &str,
    key: &str,
    user_name: &str,
    password: &str,
) -> Result<Value> {
    let response = app
        .clone()
        .oneshot(post_json(
            "/create_super_user",
            &account_body(household, key, user_name, password),
            None,
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response).await
}

fn totp_secret_from(descriptor: &str) -> Result<String> {
    let url = url::Url::parse(descriptor).context("descriptor is not a URL")?;
    url.query_pairs()
        .find(|(key, _)| key == "secret")
        .map(|(_, value)| value.to_string())
        .context("descriptor has no secret")
}

fn current_code(secret_base32: &str) -> Result<String> {
    let secret = totp_rs::Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|err| anyhow::anyhow!("bad secret: {err:?}"))?;
    let totp = totp_rs::TOTP::new(
        totp_rs::Algorithm::SHA1,
        6,
        1,
        30,
        secret,
        Some("Money Magnet".to_string()),
        "tests".to_string(),
    )
    .map_err(|err| anyhow::anyhow!("bad totp params: {err:?}"))?;
    totp.generate_current()
        .map_err(|err| anyhow::anyhow!("clock error: {err:?}"))
}

#[tokio::test]
async fn full_login_and_session_flow() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let app = app(pool);

    let household = unique("acme");
    let user_name = unique("joe");
    let created = create_super_user(&app, &household, "sesame", &user_name, "hunter2 squared").await?;

    let descriptor = created["provisioningDescriptor"]
        .as_str()
        .context("missing descriptor")?;
    assert!(descriptor.starts_with("otpauth://totp/"));
    assert_eq!(
        created["backupCodes"].as_array().map(Vec::len),
        Some(4)
    );
    assert_eq!(created["user"]["user_name"].as_str(), Some(user_name.as_str()));
    assert_eq!(created["user"]["is_admin"].as_bool(), Some(true));
    // The hash and secret must never appear in a response.
    assert!(created["user"].get("password_hash").is_none());
    assert!(created["user"].get("totp_secret").is_none());

    let secret = totp_secret_from(descriptor)?;
    let login = app
        .clone()
        .oneshot(post_json(
            "/login",
            &json!({
                "user_name": user_name,
                "password": "hunter2 squared",
                "otpCode": current_code(&secret)?,
            }),
            Some(&random_ip()),
        ))
        .await?;
    assert_eq!(login.status(), StatusCode::OK);
    let cookie = login
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .context("login sets a session cookie")?
        .split(';')
        .next()
        .context("cookie has a name=value part")?
        .to_string();
    let login_body = response_json(login).await?;
    assert_eq!(
        login_body["user"]["user_name"].as_str(),
        Some(user_name.as_str())
    );

    let session = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/check_session")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(session.status(), StatusCode::OK);

    let logout = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(logout.status(), StatusCode::OK);

    let after_logout = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/check_session")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(after_logout.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn wrong_otp_is_unauthorized_and_recorded() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let app = app(pool.clone());

    let user_name = unique("joe");
    let created =
        create_super_user(&app, &unique("acme"), "sesame", &user_name, "hunter2 squared").await?;
    let secret = totp_secret_from(
        created["provisioningDescriptor"]
            .as_str()
            .context("missing descriptor")?,
    )?;

    let mut wrong_code = current_code(&secret)?;
    // Flip the last digit so the code is guaranteed wrong for this window.
    let last = wrong_code.pop().context("code has digits")?;
    wrong_code.push(if last == '0' { '1' } else { '0' });

    let ip = random_ip();
    let login = app
        .clone()
        .oneshot(post_json(
            "/login",
            &json!({
                "user_name": user_name,
                "password": "hunter2 squared",
                "otpCode": wrong_code,
            }),
            Some(&ip),
        ))
        .await?;
    assert_eq!(login.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(login).await?;
    assert_eq!(body["error"].as_str(), Some("Unauthorized"));

    let row = sqlx::query(
        "SELECT COUNT(*) FROM login_attempts WHERE ip_address = $1::inet AND NOT succeeded",
    )
    .bind(&ip)
    .fetch_one(&pool)
    .await?;
    let failures: i64 = row.get(0);
    assert_eq!(failures, 1);

    Ok(())
}

#[tokio::test]
async fn backup_code_redeems_exactly_once() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let app = app(pool);

    let user_name = unique("joe");
    let created =
        create_super_user(&app, &unique("acme"), "sesame", &user_name, "hunter2 squared").await?;
    let first_descriptor = created["provisioningDescriptor"]
        .as_str()
        .context("missing descriptor")?
        .to_string();
    let code = created["backupCodes"][0]
        .as_str()
        .context("codes minted")?
        .to_string();

    let recovery_body = json!({
        "user_name": user_name,
        "password": "hunter2 squared",
        "backup_code": code,
    });

    let recovery = app
        .clone()
        .oneshot(post_json("/two_factor_recovery", &recovery_body, None))
        .await?;
    assert_eq!(recovery.status(), StatusCode::OK);
    let recovered = response_json(recovery).await?;
    assert_eq!(recovered["remainingBackupCodes"].as_i64(), Some(3));
    let new_descriptor = recovered["provisioningDescriptor"]
        .as_str()
        .context("missing new descriptor")?;
    assert_ne!(new_descriptor, first_descriptor);

    // The secret rotated, so the new descriptor authenticates and the old
    // one is dead.
    let new_secret = totp_secret_from(new_descriptor)?;
    let login = app
        .clone()
        .oneshot(post_json(
            "/login",
            &json!({
                "user_name": user_name,
                "password": "hunter2 squared",
                "otpCode": current_code(&new_secret)?,
            }),
            Some(&random_ip()),
        ))
        .await?;
    assert_eq!(login.status(), StatusCode::OK);

    // Second redemption of the same code is a uniform credential failure.
    let replay = app
        .clone()
        .oneshot(post_json("/two_factor_recovery", &recovery_body, None))
        .await?;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(replay).await?;
    assert_eq!(body["error"].as_str(), Some("Unauthorized"));

    Ok(())
}

#[tokio::test]
async fn member_creation_with_wrong_key_creates_nothing() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let app = app(pool.clone());

    let household = unique("acme");
    create_super_user(&app, &household, "sesame", &unique("admin"), "hunter2 squared").await?;

    let member_name = unique("member");
    let response = app
        .clone()
        .oneshot(post_json(
            "/create_user",
            &account_body(&household, "wrongkey", &member_name, "hunter2 squared"),
            None,
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    // Unknown households fail identically.
    let response = app
        .clone()
        .oneshot(post_json(
            "/create_user",
            &account_body(&unique("ghost"), "sesame", &member_name, "hunter2 squared"),
            None,
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    let row = sqlx::query("SELECT COUNT(*) FROM users WHERE user_name = $1")
        .bind(&member_name)
        .fetch_one(&pool)
        .await?;
    let count: i64 = row.get(0);
    assert_eq!(count, 0);

    Ok(())
}

#[tokio::test]
async fn member_joins_household_with_correct_key() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let app = app(pool);

    let household = unique("acme");
    let admin =
        create_super_user(&app, &household, "sesame", &unique("admin"), "hunter2 squared").await?;

    let member_name = unique("member");
    let response = app
        .clone()
        .oneshot(post_json(
            "/create_user",
            &account_body(&household, "sesame", &member_name, "hunter2 squared"),
            None,
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let member = response_json(response).await?;
    assert_eq!(member["user"]["is_admin"].as_bool(), Some(false));
    assert_eq!(
        member["user"]["household_id"],
        admin["user"]["household_id"]
    );

    // The household name is taken now; a second admin signup conflicts.
    let response = app
        .clone()
        .oneshot(post_json(
            "/create_super_user",
            &account_body(&household, "sesame", &unique("other"), "hunter2 squared"),
            None,
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    Ok(())
}

#[tokio::test]
async fn lockout_after_threshold_failures() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let app = app(pool);

    let user_name = unique("joe");
    create_super_user(&app, &unique("acme"), "sesame", &user_name, "hunter2 squared").await?;

    let ip = random_ip();
    let bad_login = json!({
        "user_name": user_name,
        "password": "wrong password",
        "otpCode": "000000",
    });

    for _ in 0..4 {
        let response = app
            .clone()
            .oneshot(post_json("/login", &bad_login, Some(&ip)))
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = response_json(response).await?;
        assert_eq!(body["error"].as_str(), Some("Unauthorized"));
    }

    // Fifth attempt short-circuits before credential evaluation.
    let response = app
        .clone()
        .oneshot(post_json("/login", &bad_login, Some(&ip)))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await?;
    assert_eq!(body["error"].as_str(), Some("TooManyAttempts"));

    // Other addresses are unaffected.
    let response = app
        .clone()
        .oneshot(post_json("/login", &bad_login, Some(&random_ip())))
        .await?;
    let body = response_json(response).await?;
    assert_eq!(body["error"].as_str(), Some("Unauthorized"));

    Ok(())
}
