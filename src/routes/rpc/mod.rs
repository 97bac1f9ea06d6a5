use axum::{Extension, Json, body::Bytes, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    AppState,
    error::{ApiError, error_codes},
    middleware::RequestContext,
    routes::{phone, session, user},
    utils::Claims,
};

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, err: &ApiError) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(JsonRpcError {
                code: err.code(),
                message: err.public_message(),
            }),
            id,
        }
    }

    /// 请求体不是合法JSON时的标准 parse error，id 无从得知，置 null
    pub fn parse_failure() -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(JsonRpcError {
                code: error_codes::PARSE_ERROR,
                message: "请求体不是合法的JSON".to_string(),
            }),
            id: Value::Null,
        }
    }
}

/// 从请求里解析procedure参数，格式不对统一按 invalid params 处理
fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ApiError> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| ApiError::InvalidParams(e.to_string()))
}

/// 唯一的 JsonRPC 入口，按方法名分发到各procedure。
/// 请求体自己解析：格式错误也要回 JsonRPC envelope，不能让框架回纯文本400
#[axum::debug_handler]
pub async fn handle(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Json<JsonRpcResponse> {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("JsonRPC请求体解析失败: {}", e);
            return Json(JsonRpcResponse::parse_failure());
        }
    };
    let id = request.id.clone();

    let result = dispatch(
        &state,
        &request.method,
        request.params,
        ctx.claims,
        ctx.client_ip,
    )
    .await;

    match result {
        Ok(value) => Json(JsonRpcResponse::success(id, value)),
        Err(err) => {
            tracing::warn!(method = %request.method, code = err.code(), "procedure失败: {}", err);
            Json(JsonRpcResponse::failure(id, &err))
        }
    }
}

async fn dispatch(
    state: &AppState,
    method: &str,
    params: Value,
    claims: Option<Claims>,
    client_ip: Option<String>,
) -> Result<Value, ApiError> {
    match method {
        "WechatMiniProgramCodeToSession" => {
            session::code_to_session(state, parse_params(params)?, client_ip).await
        }
        "UpdateWechatMiniProgramProfile" => {
            session::update_profile(state, claims, parse_params(params)?).await
        }
        "WechatMiniProgramDecryptData" => {
            session::decrypt_data(state, parse_params(params)?).await
        }
        "UploadWechatMiniProgramPhoneNumber" => {
            phone::upload_phone_number(state, claims, parse_params(params)?).await
        }
        "ChangeWechatMiniProgramPhoneNumber" => {
            phone::change_phone_number(state, claims, parse_params(params)?).await
        }
        "UploadUserPhone" => phone::upload_user_phone(state, claims, parse_params(params)?).await,
        "GetUserInfoByPhone" => phone::get_user_info_by_phone(state, parse_params(params)?).await,
        "GetCurrentWechatMiniProgramUser" => user::get_current_user(state, claims).await,
        "ReportWechatMiniProgramAuthorizeResult" => {
            user::report_authorize_result(state, claims, parse_params(params)?).await
        }
        "GetUserInfoByUnionId" => user::get_user_info_by_union_id(state, parse_params(params)?).await,
        other => Err(ApiError::MethodNotFound(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_body_yields_parse_error_envelope() {
        let json = serde_json::to_value(JsonRpcResponse::parse_failure()).unwrap();
        assert_eq!(json["error"]["code"], error_codes::PARSE_ERROR);
        assert_eq!(json["id"], Value::Null);
        assert!(json.get("result").is_none());
    }

    #[test]
    fn parses_envelope_with_defaults() {
        let request: JsonRpcRequest = serde_json::from_str(
            r#"{"jsonrpc":"2.0","method":"WechatMiniProgramCodeToSession","params":{"code":"abc"},"id":1}"#,
        )
        .unwrap();
        assert_eq!(request.method, "WechatMiniProgramCodeToSession");
        assert_eq!(request.params["code"], "abc");
        assert_eq!(request.id, serde_json::json!(1));

        // params 与 id 可省略
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"method":"GetCurrentWechatMiniProgramUser"}"#).unwrap();
        assert!(request.params.is_null());
        assert!(request.id.is_null());
    }

    #[test]
    fn error_response_carries_taxonomy_code() {
        let response = JsonRpcResponse::failure(
            serde_json::json!(7),
            &ApiError::MethodNotFound("NoSuchMethod".into()),
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["code"], error_codes::METHOD_NOT_FOUND);
        assert_eq!(json["id"], 7);
        assert!(json.get("result").is_none());
    }

    #[test]
    fn parse_params_rejects_wrong_shape() {
        #[derive(Debug, Deserialize)]
        struct P {
            #[allow(dead_code)]
            code: String,
        }
        let err = parse_params::<P>(serde_json::json!({"code": 42})).unwrap_err();
        assert!(matches!(err, ApiError::InvalidParams(_)));

        // 没有参数时按空对象解析
        #[derive(Deserialize)]
        struct Empty {}
        assert!(parse_params::<Empty>(Value::Null).is_ok());
    }
}
