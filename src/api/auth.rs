use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::domain::{Actor, ActorRole, UserId};

use super::error::ApiError;

/// 上流の認証ミドルウェアが設定する操作者IDヘッダー
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// 上流の認証ミドルウェアが設定する操作者ロールヘッダー（省略時はmember）
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// リクエストの操作者
///
/// リクエストごとにヘッダーから組み立て、ユースケースに明示的に渡す。
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

/// 管理者であることを確認済みの操作者
#[derive(Debug, Clone)]
pub struct AdminActor(pub Actor);

fn actor_from_parts(parts: &Parts) -> Result<Actor, ApiError> {
    let actor_id = parts
        .headers
        .get(ACTOR_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Unauthenticated("Missing X-Actor-Id header".to_string()))?;

    let role = match parts.headers.get(ACTOR_ROLE_HEADER) {
        None => ActorRole::Member,
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<ActorRole>().ok())
            .ok_or_else(|| ApiError::Unauthenticated("Invalid X-Actor-Role header".to_string()))?,
    };

    Ok(Actor {
        actor_id: UserId::new(actor_id),
        role,
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_parts(parts).map(CurrentActor)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = actor_from_parts(parts)?;
        if !actor.is_admin() {
            tracing::warn!(actor = %actor.actor_id, "Admin-only route called by a member");
            return Err(ApiError::AdminOnly);
        }
        Ok(AdminActor(actor))
    }
}
