use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};

const UNKNOWN_ADDRESS: &str = "unknown";

/// Who made a request, as far as the headers and socket tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub address: String,
    /// Empty when the header is absent.
    pub user_agent: String,
    pub referrer: Option<String>,
}

impl ClientInfo {
    /// The address is the first `X-Forwarded-For` entry, then `X-Real-IP`,
    /// then the socket peer, then `unknown`.
    #[must_use]
    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let address = header("x-forwarded-for")
            .and_then(|list| list.split(',').next())
            .map(str::trim)
            .filter(|first| !first.is_empty())
            .or_else(|| header("x-real-ip"))
            .map(String::from)
            .or_else(|| peer.map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string());

        Self {
            address,
            user_agent: header("user-agent").unwrap_or_default().to_string(),
            referrer: header("referer").or_else(|| header("referrer")).map(String::from),
        }
    }
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::from_parts(&parts.headers, peer))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn peer() -> Option<SocketAddr> {
        Some(SocketAddr::from(([203, 0, 113, 9], 51000)))
    }

    #[test]
    fn forwarded_for_wins() {
        let info = ClientInfo::from_parts(
            &headers(&[
                ("x-forwarded-for", "1.0.1.7, 10.0.0.1"),
                ("x-real-ip", "9.9.9.9"),
            ]),
            peer(),
        );
        assert_eq!(info.address, "1.0.1.7");
    }

    #[test]
    fn real_ip_before_peer() {
        let info = ClientInfo::from_parts(&headers(&[("x-real-ip", "9.9.9.9")]), peer());
        assert_eq!(info.address, "9.9.9.9");
    }

    #[test]
    fn falls_back_to_peer_then_unknown() {
        assert_eq!(ClientInfo::from_parts(&HeaderMap::new(), peer()).address, "203.0.113.9");
        assert_eq!(ClientInfo::from_parts(&HeaderMap::new(), None).address, "unknown");
    }

    #[test]
    fn user_agent_and_referrer() {
        let info = ClientInfo::from_parts(
            &headers(&[
                ("user-agent", "curl/8.0"),
                ("referer", "https://example.com/?utm_source=x"),
            ]),
            None,
        );
        assert_eq!(info.user_agent, "curl/8.0");
        assert_eq!(info.referrer.as_deref(), Some("https://example.com/?utm_source=x"));

        let bare = ClientInfo::from_parts(&HeaderMap::new(), None);
        assert_eq!(bare.user_agent, "");
        assert_eq!(bare.referrer, None);
    }
}
