use std::{
    convert::Infallible,
    net::{IpAddr, SocketAddr},
};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, Extensions, HeaderMap},
};

use crate::auth::{repo_types::User, sessions::ClientMeta};
use crate::error::{ApiError, AuthFailure};
use crate::state::AppState;

/// The caller behind a valid session, plus the raw bearer token it used.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or(ApiError::Unauthorized(AuthFailure::MissingCredential))?
            .to_string();

        let user = state.session_manager().validate(&token).await?;
        Ok(AuthUser { user, token })
    }
}

/// Parses one forwarded entry, tolerating a port (`1.2.3.4:80`, `[::1]:80`).
fn parse_hop(hop: &str) -> Option<IpAddr> {
    hop.parse::<IpAddr>()
        .or_else(|_| hop.parse::<SocketAddr>().map(|a| a.ip()))
        .ok()
}

/// Address of the client as seen by the outermost trusted proxy.
///
/// Each proxy appends the peer it saw, so with `trusted_hops` proxies the
/// entry `trusted_hops` from the right is the first one a client cannot
/// forge. Entries further left are ignored. Falls back to the socket peer
/// when the header is absent or that entry is not an address.
pub(crate) fn client_ip(
    headers: &HeaderMap,
    extensions: &Extensions,
    trusted_hops: usize,
) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .filter(|_| trusted_hops > 0)
        .and_then(|v| {
            v.rsplit(',')
                .map(str::trim)
                .filter(|hop| !hop.is_empty())
                .take(trusted_hops)
                .last()
        })
        .and_then(parse_hop);

    forwarded.or_else(|| {
        extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let platform = header_str(&parts.headers, "sec-ch-ua-platform");
        let mobile = header_str(&parts.headers, "sec-ch-ua-mobile");
        let device_info = (platform.is_some() || mobile.is_some()).then(|| {
            serde_json::json!({
                "platform": platform,
                "mobile": mobile.as_deref() == Some("?1"),
            })
        });

        Ok(ClientMeta {
            ip: client_ip(&parts.headers, &parts.extensions, state.config.trusted_proxy_hops)
                .map(|ip| ip.to_string()),
            user_agent: header_str(&parts.headers, header::USER_AGENT.as_str()),
            device_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(req: Request<()>) -> Parts {
        req.into_parts().0
    }

    fn peer(ip: [u8; 4]) -> Extensions {
        let mut ext = Extensions::new();
        ext.insert(ConnectInfo(SocketAddr::from((ip, 4000))));
        ext
    }

    fn forwarded(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("x-forwarded-for", value.parse().unwrap());
        h
    }

    #[test]
    fn bearer_token_parsing() {
        let mut h = HeaderMap::new();
        assert_eq!(bearer_token(&h), None);
        h.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&h), None);
        h.insert(header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&h), None);
        h.insert(header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&h), Some("abc.def"));
    }

    #[test]
    fn client_ip_takes_the_hop_the_trusted_proxy_appended() {
        let ext = peer([10, 0, 0, 1]);
        let h = forwarded("6.6.6.6, 198.51.100.4, 203.0.113.7");
        let ip = |hops| client_ip(&h, &ext, hops).map(|ip| ip.to_string());

        assert_eq!(ip(1).as_deref(), Some("203.0.113.7"));
        assert_eq!(ip(2).as_deref(), Some("198.51.100.4"));
        // fewer entries than proxies: the leftmost is the best there is
        assert_eq!(ip(5).as_deref(), Some("6.6.6.6"));
        // no proxy: the header is client-supplied and ignored
        assert_eq!(ip(0).as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn client_ip_only_yields_addresses() {
        let ext = peer([10, 0, 0, 1]);
        let junk = "x".repeat(200);
        assert_eq!(
            client_ip(&forwarded(&junk), &ext, 1).map(|ip| ip.to_string()).as_deref(),
            Some("10.0.0.1")
        );
        assert_eq!(
            client_ip(&forwarded("[2001:db8::1]:443"), &ext, 1).map(|ip| ip.to_string()).as_deref(),
            Some("2001:db8::1")
        );
        assert_eq!(
            client_ip(&forwarded("192.0.2.3:8080"), &ext, 1).map(|ip| ip.to_string()).as_deref(),
            Some("192.0.2.3")
        );
        assert_eq!(client_ip(&forwarded(&junk), &Extensions::new(), 1), None);
    }

    #[tokio::test]
    async fn client_meta_reads_forwarded_for_and_client_hints() {
        let (state, _) = AppState::fake("http://127.0.0.1:9");
        let mut req = Request::builder()
            .header("x-forwarded-for", "10.9.9.9, 203.0.113.7")
            .header(header::USER_AGENT, "curl/8")
            .header("sec-ch-ua-platform", "\"Android\"")
            .header("sec-ch-ua-mobile", "?1")
            .body(())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        let mut p = parts(req);

        let meta = ClientMeta::from_request_parts(&mut p, &state).await.unwrap();
        assert_eq!(meta.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8"));
        let device = meta.device_info.unwrap();
        assert_eq!(device["platform"], "Android");
        assert_eq!(device["mobile"], true);
    }

    #[tokio::test]
    async fn client_meta_falls_back_to_peer_address() {
        let (state, _) = AppState::fake("http://127.0.0.1:9");
        let mut req = Request::builder().body(()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 9], 4000))));
        let mut p = parts(req);

        let meta = ClientMeta::from_request_parts(&mut p, &state).await.unwrap();
        assert_eq!(meta.ip.as_deref(), Some("192.0.2.9"));
        assert!(meta.device_info.is_none());
    }
}
