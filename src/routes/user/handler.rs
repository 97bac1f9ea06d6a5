use serde_json::{Map, Value};

use crate::{
    AppState,
    database::{AuthLog, PhoneNumber, WechatUser},
    error::ApiError,
    utils::Claims,
};

use super::model::{GetUserInfoByUnionIdParams, ReportAuthorizeResultParams};

/// 按当前登录的业务用户回查微信用户：
/// 先按登录标识当 openId 查，查不到再用身份标记（unionId）兜底
async fn wechat_user_for(state: &AppState, claims: &Claims) -> Result<WechatUser, ApiError> {
    let identity = state
        .user_manager
        .load_user_by_identifier(&claims.sub)
        .await?
        .and_then(|user| user.identity);

    WechatUser::find_by_identity(&state.pool, &claims.sub, identity.as_deref())
        .await?
        .ok_or(ApiError::WechatUserNotFound)
}

pub async fn get_current_user(
    state: &AppState,
    claims: Option<Claims>,
) -> Result<Value, ApiError> {
    let claims = claims.ok_or(ApiError::Unauthorized)?;
    let user = wechat_user_for(state, &claims).await?;

    let mut result = Map::new();
    result.insert("open_id".into(), Value::String(user.open_id));
    result.insert(
        "union_id".into(),
        user.union_id.map(Value::String).unwrap_or(Value::Null),
    );
    Ok(Value::Object(result))
}

/// 上报用户授权scope结果。
/// code2session 时已经当做登录处理了，这里必然是登录态。
pub async fn report_authorize_result(
    state: &AppState,
    claims: Option<Claims>,
    params: ReportAuthorizeResultParams,
) -> Result<Value, ApiError> {
    let claims = claims.ok_or(ApiError::Unauthorized)?;
    let user = wechat_user_for(state, &claims).await?;

    let user = WechatUser::set_authorize_scopes(&state.pool, user.id, &params.scopes).await?;

    AuthLog::record(
        &state.pool,
        Some(&user.open_id),
        "authorize",
        Some(&serde_json::json!({ "scopes": params.scopes }).to_string()),
    )
    .await?;

    let mut result = Map::new();
    result.insert("id".into(), Value::String(user.id.to_string()));
    Ok(Value::Object(result))
}

pub async fn get_user_info_by_union_id(
    state: &AppState,
    params: GetUserInfoByUnionIdParams,
) -> Result<Value, ApiError> {
    if params.union_id.is_empty() {
        return Err(ApiError::Validation(String::new()));
    }

    let Some(user) = WechatUser::find_by_union_id(&state.pool, &params.union_id).await? else {
        return Ok(Value::Object(Map::new()));
    };

    let phone = PhoneNumber::find_first_by_union_id(&state.pool, &params.union_id)
        .await?
        .map(|p| p.phone_number)
        .unwrap_or_default();

    let mut result = Map::new();
    result.insert("open_id".into(), Value::String(user.open_id));
    result.insert(
        "union_id".into(),
        user.union_id.map(Value::String).unwrap_or(Value::Null),
    );
    result.insert("phone".into(), Value::String(phone));
    Ok(Value::Object(result))
}
