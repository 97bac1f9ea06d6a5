use serde_json::{Map, Value};

use crate::{
    AppState,
    database::{Account, PhoneNumber, WechatUser},
    error::ApiError,
    infrastructure::PhoneReportContext,
    utils::Claims,
};

use super::model::{
    ChangePhoneNumberParams, GetUserInfoByPhoneParams, UploadPhoneNumberParams,
    UploadUserPhoneParams,
};

/// 上传用户手机号码（新方式，getPhoneNumber 授权code）
pub async fn upload_phone_number(
    state: &AppState,
    claims: Option<Claims>,
    params: UploadPhoneNumberParams,
) -> Result<Value, ApiError> {
    let claims = claims.ok_or(ApiError::Unauthorized)?;

    let wechat_user = validated_wechat_user(state, &claims, &params.code).await?;

    let (info, raw) = state.wechat.get_phone_number(&params.code).await?;

    let mut result = Map::new();
    result.insert(
        "phoneNumber".into(),
        Value::String(info.phone_number.clone()),
    );

    // 扩展点都OK了才落库，否决时不留任何数据
    let ctx = PhoneReportContext {
        wechat_user: &wechat_user,
        phone_number: &info.phone_number,
        country_code: info.country_code.as_deref(),
        source: &params.source,
    };
    state.hooks.run_phone_report(&ctx, &mut result)?;

    let phone_number = PhoneNumber::upsert(
        &state.pool,
        &info.phone_number,
        info.pure_phone_number.as_deref(),
        info.country_code.as_deref(),
        info.watermark.as_ref(),
        Some(&raw.to_string()),
    )
    .await?;
    PhoneNumber::add_user(&state.pool, phone_number.id, wechat_user.id).await?;

    Ok(Value::Object(result))
}

async fn validated_wechat_user(
    state: &AppState,
    claims: &Claims,
    code: &str,
) -> Result<WechatUser, ApiError> {
    let wechat_user = WechatUser::find_by_open_id(&state.pool, &claims.sub)
        .await?
        .ok_or(ApiError::WechatUserNotFound)?;

    if code.is_empty() {
        return Err(ApiError::PhoneRetrieval(
            "已不支持旧方式获取手机号码，请升级微信版本".to_string(),
        ));
    }

    // 账号已被下线的用户不允许继续上报
    let bound = Account::find_by_id(&state.pool, wechat_user.account_id)
        .await?
        .map(|account| account.valid)
        .unwrap_or(false);
    if !bound {
        return Err(ApiError::PhoneRetrieval(
            "该用户没有绑定微信小程序".to_string(),
        ));
    }

    Ok(wechat_user)
}

/// 前端直接上送手机号码串。元数据从号码本身补齐，
/// 语义与授权code方式一致：按号码去重、幂等关联。
pub async fn upload_user_phone(
    state: &AppState,
    claims: Option<Claims>,
    params: UploadUserPhoneParams,
) -> Result<Value, ApiError> {
    let claims = claims.ok_or(ApiError::Unauthorized)?;

    let wechat_user = WechatUser::find_by_open_id(&state.pool, &claims.sub)
        .await?
        .ok_or(ApiError::WechatUserNotFound)?;

    if params.phone_number.is_empty() {
        return Err(ApiError::Validation(String::new()));
    }

    let mut result = Map::new();
    result.insert("message".into(), Value::String("更新成功".into()));

    let ctx = PhoneReportContext {
        wechat_user: &wechat_user,
        phone_number: &params.phone_number,
        country_code: Some("86"),
        source: "",
    };
    state.hooks.run_phone_report(&ctx, &mut result)?;

    let watermark = serde_json::json!([params.phone_number.clone()]);
    let phone_number = PhoneNumber::upsert(
        &state.pool,
        &params.phone_number,
        Some(&params.phone_number),
        Some("86"),
        Some(&watermark),
        Some(&params.phone_number),
    )
    .await?;
    PhoneNumber::add_user(&state.pool, phone_number.id, wechat_user.id).await?;

    Ok(Value::Object(result))
}

/// 旧的获取手机号码方式，解密前端上送的加密数据。
/// 留作兼容，语义与新接口一致：按号码去重、幂等关联。
pub async fn change_phone_number(
    state: &AppState,
    claims: Option<Claims>,
    params: ChangePhoneNumberParams,
) -> Result<Value, ApiError> {
    let claims = claims.ok_or(ApiError::Unauthorized)?;

    let wechat_user = WechatUser::find_by_open_id(&state.pool, &claims.sub)
        .await?
        .ok_or(ApiError::WechatUserNotFound)?;

    let data =
        crate::wechat::decrypt_data(&params.session_key, &params.iv, &params.encrypted_data)
            .map_err(|e| {
                tracing::error!(open_id = %wechat_user.open_id, "旧方式解密手机失败: {}", e);
                ApiError::PhoneRetrieval("找不到手机号码，请重试".to_string())
            })?;

    let phone = data
        .get("phoneNumber")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::PhoneRetrieval("手机号码格式不正确".to_string()))?;

    let mut result = Map::new();
    result.insert("phoneNumber".into(), Value::String(phone.to_string()));
    result.insert(
        "__message".into(),
        Value::String("您已成功修改手机号！".into()),
    );
    result.insert(
        "__showToast".into(),
        Value::String("您已成功修改手机号！".into()),
    );

    // 扩展点没否决才落库
    let ctx = PhoneReportContext {
        wechat_user: &wechat_user,
        phone_number: phone,
        country_code: data.get("countryCode").and_then(Value::as_str),
        source: "",
    };
    state.hooks.run_phone_report(&ctx, &mut result)?;

    let raw_data = Value::Object(data.clone()).to_string();
    let phone_number = PhoneNumber::upsert(
        &state.pool,
        phone,
        data.get("purePhoneNumber").and_then(Value::as_str),
        data.get("countryCode").and_then(Value::as_str),
        data.get("watermark"),
        Some(&raw_data),
    )
    .await?;
    PhoneNumber::add_user(&state.pool, phone_number.id, wechat_user.id).await?;

    Ok(Value::Object(result))
}

/// 通过手机号反查用户
pub async fn get_user_info_by_phone(
    state: &AppState,
    params: GetUserInfoByPhoneParams,
) -> Result<Value, ApiError> {
    if params.phone_number.is_empty() {
        return Err(ApiError::Validation(String::new()));
    }

    let Some(user) = WechatUser::find_by_phone_number(&state.pool, &params.phone_number).await?
    else {
        return Ok(Value::Object(Map::new()));
    };

    let mut result = Map::new();
    result.insert("open_id".into(), Value::String(user.open_id));
    result.insert(
        "union_id".into(),
        user.union_id.map(Value::String).unwrap_or(Value::Null),
    );
    result.insert("phone".into(), Value::String(params.phone_number));
    Ok(Value::Object(result))
}
