//! Authentication middleware
//!
//! JWT authentication and permission checks

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::{AppError, AppResult, ErrorDetail, ErrorResponse};
use crate::AppState;

/// Permission names carried in the token
pub mod permissions {
    pub const INVENTORY_VIEW: &str = "inventario.ver";
    pub const INVENTORY_MANAGE: &str = "inventario.gestionar";
    pub const DOSIFICATIONS_VIEW: &str = "dosificaciones.ver";
    pub const DOSIFICATIONS_CREATE: &str = "dosificaciones.crear";
    pub const DOSIFICATIONS_EDIT: &str = "dosificaciones.editar";
    pub const REPORTS_VIEW: &str = "reportes.ver";
    pub const REPORTS_EXPORT: &str = "reportes.exportar";
    /// Grants every permission
    pub const ADMIN: &str = "admin";
}

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: uuid::Uuid,
    pub permissions: Vec<String>,
}

impl AuthUser {
    /// Check if user has a specific permission
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p == permission || p == permissions::ADMIN)
    }
}

/// Authentication middleware that validates JWT tokens against
/// `jwt.secret` from the loaded configuration
pub async fn auth_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => return unauthorized_response("Missing or invalid Authorization header"),
    };

    let claims = match decode_jwt(token, &state.config.jwt.secret) {
        Ok(claims) => claims,
        Err(msg) => return unauthorized_response(&msg),
    };

    let user_id = match uuid::Uuid::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => return unauthorized_response("Invalid user ID in token"),
    };

    request.extensions_mut().insert(AuthUser {
        user_id,
        permissions: claims.permissions,
    });

    next.run(request).await
}

/// JWT claims structure
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    permissions: Vec<String>,
    exp: i64,
    iat: i64,
}

/// Decode and validate JWT token
fn decode_jwt(token: &str, secret: &str) -> Result<Claims, String> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("Invalid token: {}", e))
}

fn unauthorized_detail(message: &str) -> ErrorResponse {
    ErrorResponse {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message_en: message.to_string(),
            message_es: "No autorizado".to_string(),
            field: None,
            details: None,
        },
    }
}

fn unauthorized_response(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(unauthorized_detail(message))).into_response()
}

/// Extractor for authenticated user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(unauthorized_detail("Authentication required")),
                )
            })
    }
}

/// Permission guard for use in handlers
pub fn check_permission(user: &AuthUser, permission: &str) -> AppResult<()> {
    if user.has_permission(permission) {
        Ok(())
    } else {
        tracing::warn!(user_id = %user.user_id, permission, "Permission denied");
        Err(AppError::InsufficientPermissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(perms: &[&str]) -> AuthUser {
        AuthUser {
            user_id: uuid::Uuid::new_v4(),
            permissions: perms.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_permission_checks() {
        let viewer = user(&[permissions::INVENTORY_VIEW]);
        assert!(check_permission(&viewer, permissions::INVENTORY_VIEW).is_ok());
        assert!(check_permission(&viewer, permissions::INVENTORY_MANAGE).is_err());
        assert!(!viewer.has_permission(permissions::REPORTS_VIEW));

        let admin = user(&[permissions::ADMIN]);
        assert!(admin.has_permission(permissions::REPORTS_EXPORT));
    }

    fn signed_token(secret: &str) -> String {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: uuid::Uuid::new_v4().to_string(),
            permissions: vec![permissions::INVENTORY_VIEW.to_string()],
            exp: now + 3600,
            iat: now,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn app_state(secret: &str) -> AppState {
        use crate::config::{Config, DatabaseConfig, JwtConfig, ReportsConfig, ServerConfig, StoreConfig};

        let url = "postgres://localhost/agro_test";
        AppState {
            db: sqlx::postgres::PgPoolOptions::new().connect_lazy(url).unwrap(),
            config: std::sync::Arc::new(Config {
                environment: "test".to_string(),
                server: ServerConfig {
                    port: 0,
                    host: "127.0.0.1".to_string(),
                },
                database: DatabaseConfig {
                    url: url.to_string(),
                    max_connections: 1,
                    min_connections: 0,
                    acquire_timeout_secs: 1,
                },
                jwt: JwtConfig {
                    secret: secret.to_string(),
                },
                store: StoreConfig::default(),
                reports: ReportsConfig {
                    currency: "EUR".to_string(),
                },
            }),
        }
    }

    #[tokio::test]
    async fn test_middleware_verifies_with_configured_secret() {
        use axum::{body::Body, middleware, routing::get, Router};
        use tower::ServiceExt;

        let state = app_state("configured-secret");
        let app = Router::new()
            .route("/me", get(|user: CurrentUser| async move { user.0.user_id.to_string() }))
            .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
            .with_state(state);
        let request = |token: String| {
            axum::http::Request::builder()
                .uri("/me")
                .header(AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap()
        };

        let accepted = app.clone().oneshot(request(signed_token("configured-secret"))).await.unwrap();
        assert_eq!(accepted.status(), StatusCode::OK);

        let rejected = app.oneshot(request(signed_token("development-secret-key"))).await.unwrap();
        assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_decode_roundtrip() {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: uuid::Uuid::new_v4().to_string(),
            permissions: vec![permissions::REPORTS_VIEW.to_string()],
            exp: now + 3600,
            iat: now,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"secret")).unwrap();

        let decoded = decode_jwt(&token, "secret").unwrap();
        assert_eq!(decoded.sub, claims.sub);
        assert!(decode_jwt(&token, "other").is_err());
    }
}
