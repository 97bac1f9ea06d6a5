use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

use crate::{AppState, utils::Claims, utils::verify_token};

/// 每个请求都会带上的上下文。登录态是可选的：
/// 是否要求登录由各个procedure自行判断，
/// 跟原来按接口声明鉴权的方式保持一致。
#[derive(Clone)]
pub struct RequestContext {
    pub claims: Option<Claims>,
    pub client_ip: Option<String>,
}

/// 解析 Bearer token 和客户端IP，组装成 RequestContext 挂到请求上。
/// 无效令牌不拒绝请求，只当做未登录。
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let claims = request
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .and_then(|token| match verify_token(token, &state.config) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::debug!("无效令牌: {}", e);
                None
            }
        });

    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let client_ip = resolve_client_ip(request.headers(), remote_addr);

    request
        .extensions_mut()
        .insert(RequestContext { claims, client_ip });

    next.run(request).await
}

/// 优先取代理头，降级使用连接IP
fn resolve_client_ip(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .map(|s| s.trim().to_string())
        .or_else(|| remote_addr.map(|addr| addr.ip().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ip_prefers_proxy_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 10.0.0.1".parse().unwrap());
        assert_eq!(
            resolve_client_ip(&headers, None),
            Some("1.2.3.4".to_string())
        );

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "5.6.7.8".parse().unwrap());
        headers.insert("x-forwarded-for", "1.2.3.4".parse().unwrap());
        assert_eq!(
            resolve_client_ip(&headers, None),
            Some("5.6.7.8".to_string())
        );
    }

    #[test]
    fn client_ip_falls_back_to_remote_addr() {
        let addr: SocketAddr = "9.9.9.9:1234".parse().unwrap();
        assert_eq!(
            resolve_client_ip(&HeaderMap::new(), Some(addr)),
            Some("9.9.9.9".to_string())
        );
        assert_eq!(resolve_client_ip(&HeaderMap::new(), None), None);
    }
}
