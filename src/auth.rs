use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http, web, Error, HttpMessage, HttpRequest, HttpResponse, ResponseError,
};
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use futures::future::{ok, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::error::ServiceError;
use crate::models::{ProfileChanges, User, UserProfile};
use crate::notify::{dispatch, Notification};

const TOKEN_LIFETIME_HOURS: i64 = 48;
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Deserialize)]
pub struct SignupInfo {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginInfo {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub id: String,
    pub token: String,
}

pub fn create_jwt(user_id: &str, secret: &str) -> Result<String, ServiceError> {
    let expiration = Utc::now() + Duration::hours(TOKEN_LIFETIME_HOURS);
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration.timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))
        .map_err(|e| ServiceError::Internal(format!("token encoding failed: {e}")))
}

/// Returns the user id carried by a valid token.
pub fn verify_token(token: &str, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(data.claims.sub)
}

/// The id the middleware attached to this request.
pub fn current_user(req: &HttpRequest) -> Result<String, ServiceError> {
    req.extensions()
        .get::<String>()
        .cloned()
        .ok_or_else(|| ServiceError::Unauthorized("Unauthorized".to_string()))
}

/// Verifies `Authorization: Bearer` headers. Requests without one pass
/// through untouched; handlers that need a caller ask `current_user`.
#[derive(Debug, Clone)]
pub struct Authentication {
    secret: Arc<str>,
}

impl Authentication {
    pub fn new(secret: &str) -> Self {
        Authentication {
            secret: Arc::from(secret),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware {
            service: Rc::new(service),
            secret: self.secret.clone(),
        })
    }
}

pub struct AuthMiddleware<S> {
    service: Rc<S>,
    secret: Arc<str>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let bearer = req
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string());

        if let Some(token) = bearer {
            match verify_token(&token, &self.secret) {
                Ok(user_id) => {
                    req.extensions_mut().insert(user_id);
                }
                Err(e) => {
                    debug!("Rejected bearer token: {}", e);
                    let (req_parts, _payload) = req.into_parts();
                    let resp = ServiceError::Unauthorized(format!("Invalid token: {e}"))
                        .error_response()
                        .map_into_boxed_body();
                    let srv_resp = ServiceResponse::new(req_parts, resp);
                    return Box::pin(async move { Ok(srv_resp) });
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

fn is_valid_email(email: &str) -> Result<bool, ServiceError> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    match PATTERN.get_or_init(|| Regex::new(EMAIL_PATTERN)) {
        Ok(re) => Ok(re.is_match(email)),
        Err(e) => Err(ServiceError::Internal(format!("email pattern: {e}"))),
    }
}

fn check_username(username: &str) -> Result<(), ServiceError> {
    if username.chars().count() < 4 {
        return Err(ServiceError::BadRequest(
            "Username must be at least 4 characters".to_string(),
        ));
    }
    Ok(())
}

fn check_email(email: &str) -> Result<(), ServiceError> {
    if !is_valid_email(email)? {
        return Err(ServiceError::BadRequest("Invalid email address".to_string()));
    }
    Ok(())
}

fn check_password(password: &str) -> Result<(), ServiceError> {
    if password.is_empty() {
        return Err(ServiceError::BadRequest("Password is required".to_string()));
    }
    Ok(())
}

async fn hash_password(password: String, cost: u32) -> Result<String, ServiceError> {
    web::block(move || hash(password, cost))
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?
        .map_err(|e| ServiceError::Internal(format!("Error hashing password: {e}")))
}

async fn password_matches(password: String, hashed: String) -> Result<bool, ServiceError> {
    web::block(move || verify(password, &hashed).unwrap_or(false))
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))
}

// POST /auth/signup
pub async fn signup(
    data: web::Data<AppState>,
    info: web::Json<SignupInfo>,
) -> Result<HttpResponse, ServiceError> {
    let info = info.into_inner();
    let username = info.username.trim().to_string();
    let email = info.email.trim().to_string();

    check_username(&username)?;
    check_email(&email)?;
    check_password(&info.password)?;
    if data.repos.users.find_user_by_username(&username).await?.is_some() {
        return Err(ServiceError::BadRequest("Username already taken".to_string()));
    }
    if data.repos.users.find_user_by_email(&email).await?.is_some() {
        return Err(ServiceError::BadRequest("Email already registered".to_string()));
    }

    let hashed = hash_password(info.password, data.config.password_cost).await?;
    let user = User::new(username, email, hashed);
    data.repos.users.insert_user(&user).await?;
    info!("User {} signed up as {}", user.id, user.username);

    dispatch(
        data.mailer.as_ref(),
        Notification::single(
            &user.email,
            "Welcome to TaskPilot!",
            format!("Hello {},\n\nYour account has been created.", user.username),
        ),
    )
    .await;

    Ok(HttpResponse::Created().json(UserProfile::from(user)))
}

// POST /auth/login
pub async fn login(
    data: web::Data<AppState>,
    info: web::Json<LoginInfo>,
) -> Result<HttpResponse, ServiceError> {
    let info = info.into_inner();
    let invalid = || ServiceError::BadRequest("Invalid Credentials".to_string());

    let user = data
        .repos
        .users
        .find_user_by_username(info.username.trim())
        .await?
        .ok_or_else(invalid)?;
    if !password_matches(info.password, user.password_hash.clone()).await? {
        warn!("Failed login for {}", user.username);
        return Err(invalid());
    }

    let token = create_jwt(&user.id, &data.config.jwt_secret)?;
    Ok(HttpResponse::Ok().json(LoginResponse { id: user.id, token }))
}

// GET /auth/me
pub async fn me(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ServiceError> {
    let user_id = current_user(&req)?;
    let user = data
        .repos
        .users
        .find_user(&user_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
    Ok(HttpResponse::Ok().json(UserProfile::from(user)))
}

// PUT /auth/me
pub async fn update_profile(
    req: HttpRequest,
    data: web::Data<AppState>,
    info: web::Json<ProfileUpdate>,
) -> Result<HttpResponse, ServiceError> {
    let user_id = current_user(&req)?;
    let info = info.into_inner();
    if info.username.is_none() && info.email.is_none() && info.password.is_none() {
        return Err(ServiceError::BadRequest("Nothing to update".to_string()));
    }
    let mut user = data
        .repos
        .users
        .find_user(&user_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

    let mut changes = ProfileChanges::default();
    if let Some(username) = info.username.map(|u| u.trim().to_string()) {
        check_username(&username)?;
        if username != user.username {
            if data.repos.users.find_user_by_username(&username).await?.is_some() {
                return Err(ServiceError::BadRequest("Username already taken".to_string()));
            }
            changes.username = Some(username);
        }
    }
    if let Some(email) = info.email.map(|e| e.trim().to_string()) {
        check_email(&email)?;
        if email != user.email {
            if data.repos.users.find_user_by_email(&email).await?.is_some() {
                return Err(ServiceError::BadRequest("Email already registered".to_string()));
            }
            changes.email = Some(email);
        }
    }
    if let Some(password) = info.password {
        check_password(&password)?;
        changes.password_hash = Some(hash_password(password, data.config.password_cost).await?);
    }

    if changes.is_empty() {
        return Ok(HttpResponse::Ok().json(UserProfile::from(user)));
    }
    if !data.repos.users.update_profile(&user.id, &changes).await? {
        return Err(ServiceError::NotFound("User not found".to_string()));
    }
    if let Some(username) = changes.username {
        user.username = username;
    }
    if let Some(email) = changes.email {
        user.email = email;
    }
    info!("User {} updated their account", user.id);

    dispatch(
        data.mailer.as_ref(),
        Notification::single(
            &user.email,
            "Account Update Notification",
            format!(
                "Hello {},\n\nYour account has been updated successfully.\n\n\nThanks,\nTeam TaskPilot",
                user.username
            ),
        ),
    )
    .await;

    Ok(HttpResponse::Ok().json(UserProfile::from(user)))
}

#[cfg(test)]
mod tests {
    use actix_web::test::{call_and_read_body_json, call_service, read_body_json, TestRequest};
    use rstest::rstest;
    use serde_json::{json, Value};

    use super::*;
    use crate::test_support::{test_app, TestContext};

    #[test]
    fn tokens_round_trip_with_the_same_secret() {
        let token = create_jwt("user-1", "s3cret").unwrap();
        assert_eq!(verify_token(&token, "s3cret").unwrap(), "user-1");
        assert!(verify_token(&token, "other").is_err());
    }

    #[rstest]
    #[case("a@b.co", true)]
    #[case("first.last@example.com", true)]
    #[case("no-at-sign.com", false)]
    #[case("two@@example.com", false)]
    #[case("spaces in@example.com", false)]
    fn checks_email_shape(#[case] email: &str, #[case] valid: bool) {
        assert_eq!(is_valid_email(email).unwrap(), valid);
    }

    #[actix_web::test]
    async fn signup_then_login_then_me() {
        let ctx = TestContext::new();
        let app = test_app!(ctx);

        let req = TestRequest::post()
            .uri("/auth/signup")
            .set_json(json!({"username": "dana", "email": "dana@example.com", "password": "pw"}))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 201);
        let created: Value = read_body_json(resp).await;
        assert!(created.get("password").is_none());
        assert_eq!(ctx.mailer.sent_to("dana@example.com").len(), 1);

        let req = TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"username": "dana", "password": "pw"}))
            .to_request();
        let login: Value = call_and_read_body_json(&app, req).await;
        let token = login["token"].as_str().unwrap().to_string();
        assert_eq!(login["id"], created["id"]);

        let req = TestRequest::get()
            .uri("/auth/me")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let me: Value = call_and_read_body_json(&app, req).await;
        assert_eq!(me["username"], "dana");
    }

    #[rstest]
    #[case(json!({"username": "abc", "email": "abc@example.com", "password": "pw"}))]
    #[case(json!({"username": "abcd", "email": "not-an-email", "password": "pw"}))]
    #[case(json!({"username": "alice", "email": "new@example.com", "password": "pw"}))]
    #[case(json!({"username": "newbie", "email": "alice@example.com", "password": "pw"}))]
    #[actix_web::test]
    async fn signup_rejects_bad_or_taken_details(#[case] body: Value) {
        let ctx = TestContext::new();
        ctx.store.seed_user("alice", "alice@example.com");
        let app = test_app!(ctx);

        let req = TestRequest::post().uri("/auth/signup").set_json(body).to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[actix_web::test]
    async fn wrong_password_is_invalid_credentials() {
        let ctx = TestContext::new();
        let app = test_app!(ctx);
        let req = TestRequest::post()
            .uri("/auth/signup")
            .set_json(json!({"username": "dana", "email": "dana@example.com", "password": "pw"}))
            .to_request();
        call_service(&app, req).await;

        let req = TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"username": "dana", "password": "nope"}))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["message"], "Invalid Credentials");
    }

    #[actix_web::test]
    async fn bad_tokens_and_missing_tokens_are_unauthorized() {
        let ctx = TestContext::new();
        let app = test_app!(ctx);

        let req = TestRequest::get()
            .uri("/auth/me")
            .insert_header(("Authorization", "Bearer not-a-jwt"))
            .to_request();
        assert_eq!(call_service(&app, req).await.status().as_u16(), 401);

        let req = TestRequest::get().uri("/auth/me").to_request();
        assert_eq!(call_service(&app, req).await.status().as_u16(), 401);
    }

    #[actix_web::test]
    async fn profile_updates_validate_and_notify() {
        let ctx = TestContext::new();
        let alice = ctx.store.seed_user("alice", "alice@example.com");
        ctx.store.seed_user("bobby", "bob@example.com");
        let app = test_app!(ctx);

        for body in [
            json!({}),
            json!({"username": "bob"}),
            json!({"username": "bobby"}),
            json!({"email": "bob@example.com"}),
            json!({"email": "nope"}),
            json!({"password": ""}),
        ] {
            let req = TestRequest::put()
                .uri("/auth/me")
                .insert_header(ctx.bearer(&alice))
                .set_json(body.clone())
                .to_request();
            assert_eq!(call_service(&app, req).await.status().as_u16(), 400, "body {body}");
        }
        assert!(ctx.mailer.sent().is_empty());

        let req = TestRequest::put()
            .uri("/auth/me")
            .insert_header(ctx.bearer(&alice))
            .set_json(json!({"username": "alice", "email": "alice@example.com"}))
            .to_request();
        assert_eq!(call_service(&app, req).await.status().as_u16(), 200);
        assert!(ctx.mailer.sent().is_empty());

        let req = TestRequest::put()
            .uri("/auth/me")
            .insert_header(ctx.bearer(&alice))
            .set_json(json!({"username": "alicia", "email": "alicia@example.com", "password": "new-pw"}))
            .to_request();
        let updated: Value = call_and_read_body_json(&app, req).await;
        assert_eq!(updated["username"], "alicia");
        assert_eq!(updated["email"], "alicia@example.com");
        assert!(updated.get("password").is_none());

        let mail = ctx.mailer.sent_to("alicia@example.com");
        assert_eq!(mail.len(), 1);
        assert_eq!(mail[0].subject, "Account Update Notification");
        assert!(mail[0].body.starts_with("Hello alicia,"));

        let req = TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"username": "alicia", "password": "new-pw"}))
            .to_request();
        let login: Value = call_and_read_body_json(&app, req).await;
        assert_eq!(login["id"], json!(alice.id));
    }
}
