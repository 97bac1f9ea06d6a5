use axum::{
    body::{Body, to_bytes},
    http::Request,
    middleware::Next,
    response::Response,
};

/// procedure层的错误都被包进 JsonRPC envelope（HTTP 200），
/// 响应还是 5xx 说明是框架或基础设施层出了问题，
/// 把响应体抓下来记完整日志再原样放行
pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    if response.status().is_server_error() {
        let (mut parts, body) = response.into_parts();
        let bytes = match to_bytes(body, 4096).await {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(%method, path = %path, "读取错误响应体失败: {}", e);
                return Response::from_parts(parts, Body::empty());
            }
        };

        tracing::error!(
            %method,
            path = %path,
            status = %parts.status,
            body = %String::from_utf8_lossy(&bytes),
            "JsonRPC入口返回了非业务错误"
        );

        // 重置body以便重新构建响应
        parts.headers.remove(axum::http::header::CONTENT_LENGTH);
        Response::from_parts(parts, Body::from(bytes))
    } else {
        response
    }
}
