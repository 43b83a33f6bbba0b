use axum::async_trait;
use axum::extract::FromRequestParts;
use http::header::HOST;
use http::request::Parts;
use http::HeaderMap;

pub const NIP96_PATH: &str = "/api/nip96";
const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Scheme and host the client used to reach us, honouring a reverse
/// proxy's `x-forwarded-proto`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    pub proto: String,
    /// host as sent by the client, port included
    pub host: String,
}

impl RequestOrigin {
    pub fn from_headers(headers: &HeaderMap, fallback_host: Option<&str>) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        let proto = header(FORWARDED_PROTO)
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .unwrap_or("http")
            .to_string();
        let host = header(HOST.as_str())
            .or(fallback_host)
            .unwrap_or("localhost")
            .to_string();
        Self { proto, host }
    }

    /// The NIP-96 API root, also the URL upload authorizations must name
    pub fn api_url(&self) -> String {
        format!("{}://{}{}", self.proto, self.host, NIP96_PATH)
    }

    /// Where a CID is served: `{proto}://{cid}.{label}.{host}/`
    pub fn content_url(&self, gateway_label: &str, cid: &str) -> String {
        format!("{}://{}.{}.{}/", self.proto, cid, gateway_label, self.host)
    }

    /// The host without its port
    pub fn hostname(&self) -> &str {
        strip_port(&self.host)
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal, `[::1]:6455`
        return host.split_once(']').map_or(host, |(addr, _)| &host[..addr.len() + 1]);
    }
    host.rsplit_once(':').map_or(host, |(name, _)| name)
}

/// The CID label of a `{cid}.{label}.{domain}` virtual host, if `hostname`
/// is one
pub fn vhost_cid<'a>(hostname: &'a str, gateway_label: &str) -> Option<&'a str> {
    let marker = format!(".{}.", gateway_label);
    let (cid, domain) = hostname.split_once(&marker)?;
    let is_label = |s: &str| {
        !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    };
    (is_label(cid) && !domain.is_empty()).then_some(cid)
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestOrigin
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers, parts.uri.host()))
    }
}
