use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::{
    AppState,
    database::{Account, AuthLog, CodeSessionLog, Language, WechatUser},
    error::ApiError,
    infrastructure::{AfterExchangeContext, BeforeExchangeContext, BusinessUser},
    utils::{Claims, generate_token},
    wechat::CodeSessionResponse,
};

use super::model::{CodeToSessionParams, DecryptDataParams, UpdateProfileParams};

/// 兜底复用日志的新鲜度窗口。code 是一次性的，太旧的日志
/// 不能代表当前这次登录。已知在慢网络下这是个近似值，
/// 调整窗口需要对应的产品决策。
const LOG_FRESHNESS_WINDOW_SECS: i64 = 10;

/// code2session 登录主流程。
/// 幂等性由两层保证：会话日志按 (account, code) 幂等写入，
/// 业务用户的找建在按微信用户加锁的临界区里完成。
pub async fn code_to_session(
    state: &AppState,
    params: CodeToSessionParams,
    client_ip: Option<String>,
) -> Result<Value, ApiError> {
    if params.code.is_empty() {
        return Err(ApiError::Validation("code参数不能为空".to_string()));
    }

    // 1. 获取小程序账号配置
    let account = Account::resolve(&state.pool, &params.app_id)
        .await?
        .ok_or(ApiError::AccountNotFound)?;

    // 2. 调用微信接口获取 session 信息
    let (session, raw) = state
        .wechat
        .code_to_session(
            &state.redis,
            &account.app_id,
            &account.app_secret,
            &params.code,
        )
        .await?;

    // 3. 处理会话日志
    let log = process_code_session_log(
        state,
        &account,
        &session,
        &raw,
        &params.code,
        client_ip.as_deref(),
    )
    .await?;

    // 4. 请求扩展点，允许监听器整体接管
    let before_ctx = BeforeExchangeContext {
        account: &account,
        code: &params.code,
        log: &log,
    };
    if let Some(result) = state.hooks.run_before(&before_ctx) {
        return Ok(Value::Object(result));
    }

    // 5. 构建初始结果
    let mut result = Map::new();
    result.insert("sessionKey".into(), Value::Null);
    result.insert("openId".into(), Value::String(log.open_id.clone()));
    result.insert(
        "unionId".into(),
        log.union_id.clone().map(Value::String).unwrap_or(Value::Null),
    );

    // 6. 创建或更新微信用户
    let union_id = log.union_id.as_deref().filter(|s| !s.is_empty());
    let wechat_user = WechatUser::upsert(&state.pool, account.id, &log.open_id, union_id).await?;

    // 7. 获取或创建业务用户
    let biz_user = get_biz_user(state, &wechat_user).await?;
    if wechat_user.sys_user_id != Some(biz_user.id) {
        WechatUser::link_sys_user(&state.pool, wechat_user.id, biz_user.id).await?;
    }

    // 8. 构建用户相关的返回数据
    build_user_result(state, &biz_user, &wechat_user, &mut result).await?;

    // 9. 响应扩展点，允许修改结果
    let after_ctx = AfterExchangeContext {
        biz_user: &biz_user,
        wechat_user: &wechat_user,
        log: &log,
    };
    state.hooks.run_after(&after_ctx, &mut result);

    // 10. 最终处理并返回
    finalize_result(state, &log, &mut result).await?;

    Ok(Value::Object(result))
}

/// 日志处理的平/兜底两条路：
/// 响应带 session_key 视为一次新的成功换取，幂等落库；
/// 不带时说明 code 刚被并发的重复请求消费掉，只能回查日志。
async fn process_code_session_log(
    state: &AppState,
    account: &Account,
    session: &CodeSessionResponse,
    raw: &Value,
    code: &str,
    client_ip: Option<&str>,
) -> Result<CodeSessionLog, ApiError> {
    let Some(session_key) = &session.session_key else {
        return find_existing_code_session_log(state, account, code).await;
    };

    let open_id = session.openid.as_deref().ok_or_else(|| {
        ApiError::SessionExchange("openid字段不存在或类型不正确".to_string())
    })?;

    let log = CodeSessionLog::upsert(
        &state.pool,
        account.id,
        code,
        open_id,
        session.unionid.as_deref(),
        session_key,
        &raw.to_string(),
        client_ip,
    )
    .await?;

    Ok(log)
}

async fn find_existing_code_session_log(
    state: &AppState,
    account: &Account,
    code: &str,
) -> Result<CodeSessionLog, ApiError> {
    let log = CodeSessionLog::find_by_account_and_code(&state.pool, account.id, code)
        .await?
        .ok_or_else(|| {
            ApiError::SessionExchange("微信登录失败，请重新进入小程序[1]".to_string())
        })?;

    ensure_log_fresh(log.created_at, Utc::now())?;

    Ok(log)
}

fn ensure_log_fresh(created_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), ApiError> {
    if (now - created_at).num_seconds().abs() > LOG_FRESHNESS_WINDOW_SECS {
        return Err(ApiError::SessionExchange(
            "微信登录失败，请重新进入小程序[2]".to_string(),
        ));
    }
    Ok(())
}

/// 业务用户的查找或创建。整段在按微信用户加的锁里执行，
/// 防止双击登录之类的并发把同一个人建出两个业务用户。
async fn get_biz_user(
    state: &AppState,
    wechat_user: &WechatUser,
) -> Result<BusinessUser, ApiError> {
    let lock_key = format!("wechat_user:{}", wechat_user.open_id);
    state
        .locks
        .run_exclusively(&lock_key, || async {
            let union_id = wechat_user.union_id.as_deref().filter(|s| !s.is_empty());

            // 1. 先按 openId 查
            let mut biz_user = state
                .user_manager
                .load_user_by_identifier(&wechat_user.open_id)
                .await?;

            // 2. 没找到且有 unionId 时，查临时用户
            //    （其他入口匿名注册过的用户会以 temp_{unionId} 存在）
            if biz_user.is_none() {
                if let Some(union_id) = union_id {
                    biz_user = state
                        .user_manager
                        .load_user_by_identifier(&format!("temp_{}", union_id))
                        .await?;
                }
            }

            match biz_user {
                Some(mut user) => {
                    // 3. 找到了就把身份标识补上
                    if let Some(union_id) = union_id {
                        state.user_manager.set_identity(&mut user, union_id).await?;
                    }
                    Ok(user)
                }
                None => {
                    let nickname = wechat_user
                        .nick_name
                        .clone()
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| state.config.default_user_nickname.clone());
                    let avatar_url = wechat_user
                        .avatar_url
                        .clone()
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| state.config.default_user_avatar_url.clone());
                    state
                        .user_manager
                        .create_user(&wechat_user.open_id, &nickname, &avatar_url)
                        .await
                }
            }
        })
        .await
}

async fn build_user_result(
    state: &AppState,
    biz_user: &BusinessUser,
    wechat_user: &WechatUser,
    result: &mut Map<String, Value>,
) -> Result<(), ApiError> {
    result.insert("user".into(), Value::Object(biz_user.api_projection()));

    let (token, _) = generate_token(&biz_user.identifier, &state.config)?;
    result.insert("jwt".into(), Value::String(token.clone()));
    result.insert("access_token".into(), Value::String(token));

    // 业务用户自己的手机号排在前面，再补微信用户名下的
    let mut phone_numbers = Vec::new();
    if let Some(mobile) = biz_user.mobile.clone().filter(|s| !s.is_empty()) {
        phone_numbers.push(mobile);
    }
    phone_numbers.extend(WechatUser::phone_numbers(&state.pool, wechat_user.id).await?);

    result.insert(
        "phoneNumbers".into(),
        Value::Array(phone_numbers.into_iter().map(Value::String).collect()),
    );

    Ok(())
}

async fn finalize_result(
    state: &AppState,
    log: &CodeSessionLog,
    result: &mut Map<String, Value>,
) -> Result<(), ApiError> {
    if let Some(Value::Array(phones)) = result.get("phoneNumbers").cloned() {
        let strings: Vec<String> = phones
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect();
        result.insert(
            "phoneNumbers".into(),
            Value::Array(
                dedup_preserving_order(strings)
                    .into_iter()
                    .map(Value::String)
                    .collect(),
            ),
        );
    }

    AuthLog::record(
        &state.pool,
        Some(&log.open_id),
        "login",
        Some("打开了微信小程序(code2session)"),
    )
    .await?;

    Ok(())
}

fn dedup_preserving_order(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

/// 旧版 wx.getUserProfile 的资料授权接口。
/// 微信新规后前端已拿不到真实资料，留着做兼容。
pub async fn update_profile(
    state: &AppState,
    claims: Option<Claims>,
    params: UpdateProfileParams,
) -> Result<Value, ApiError> {
    if claims.is_none() {
        return Err(ApiError::Unauthorized);
    }

    let account = Account::resolve(&state.pool, &params.app_id)
        .await?
        .ok_or(ApiError::AccountNotFound)?;

    let log = find_or_create_session_log(state, &account, &params.code).await?;

    let data = crate::wechat::decrypt_data(&log.session_key, &params.iv, &params.encrypted_data)
        .inspect_err(|e| {
            tracing::error!(open_id = %log.open_id, "解密UserProfile失败: {}", e);
        })?;

    tracing::info!(open_id = %log.open_id, "解密获得微信用户UserProfile");

    let union_id = log.union_id.as_deref().filter(|s| !s.is_empty());
    let wechat_user = WechatUser::upsert(&state.pool, account.id, &log.open_id, union_id).await?;

    let nick_name = data
        .get("nickName")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let avatar_url = data
        .get("avatarUrl")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let language = data
        .get("language")
        .and_then(Value::as_str)
        .map(Language::from_str_or_default)
        .unwrap_or(Language::ZhCn);

    WechatUser::update_profile(&state.pool, wechat_user.id, nick_name, avatar_url, language)
        .await?;

    let mut result = Map::new();
    result.insert("__message".into(), Value::String("授权成功".into()));
    Ok(Value::Object(result))
}

/// 单独的解密接口，一般不会单独使用，保留兼容
pub async fn decrypt_data(
    state: &AppState,
    params: DecryptDataParams,
) -> Result<Value, ApiError> {
    let account = Account::resolve(&state.pool, &params.app_id)
        .await?
        .ok_or(ApiError::AccountNotFound)?;

    let log = find_or_create_session_log(state, &account, &params.code).await?;

    let data = crate::wechat::decrypt_data(&log.session_key, &params.iv, &params.encrypted_data)?;
    Ok(Value::Object(data))
}

/// 前端有可能重复传同一个code，先查日志做一层兼容，
/// 没有再真正调一次 code2session
pub(crate) async fn find_or_create_session_log(
    state: &AppState,
    account: &Account,
    code: &str,
) -> Result<CodeSessionLog, ApiError> {
    if let Some(log) =
        CodeSessionLog::find_by_account_and_code(&state.pool, account.id, code).await?
    {
        return Ok(log);
    }

    let (session, raw) = state
        .wechat
        .code_to_session(&state.redis, &account.app_id, &account.app_secret, code)
        .await?;

    let Some(session_key) = &session.session_key else {
        return Err(ApiError::SessionExchange(
            "微信登录失败，请重新进入小程序".to_string(),
        ));
    };
    let open_id = session.openid.as_deref().ok_or_else(|| {
        ApiError::SessionExchange("openid字段不存在或类型不正确".to_string())
    })?;

    let log = CodeSessionLog::upsert(
        &state.pool,
        account.id,
        code,
        open_id,
        session.unionid.as_deref(),
        session_key,
        &raw.to_string(),
        None,
    )
    .await?;

    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn log_fresh_within_window() {
        let now = Utc::now();
        assert!(ensure_log_fresh(now - Duration::seconds(9), now).is_ok());
        // 刚好在边界上还算新鲜
        assert!(ensure_log_fresh(now - Duration::seconds(10), now).is_ok());
    }

    #[test]
    fn log_stale_beyond_window() {
        let now = Utc::now();
        let err = ensure_log_fresh(now - Duration::seconds(11), now).unwrap_err();
        assert!(matches!(err, ApiError::SessionExchange(_)));
        assert!(err.public_message().contains("[2]"));
    }

    #[test]
    fn clock_skew_counts_as_stale() {
        let now = Utc::now();
        assert!(ensure_log_fresh(now + Duration::seconds(30), now).is_err());
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let phones = vec![
            "+8613800138000".to_string(),
            "+8613900139000".to_string(),
            "+8613800138000".to_string(),
        ];
        assert_eq!(
            dedup_preserving_order(phones),
            vec!["+8613800138000".to_string(), "+8613900139000".to_string()]
        );
    }

    #[test]
    fn dedup_on_empty_is_empty() {
        assert!(dedup_preserving_order(vec![]).is_empty());
    }
}
