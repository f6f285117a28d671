//! Country Site Middleware
//!
//! Binds the resolved country site to each request and writes the
//! resolution back to the client as cookies.

use crate::adapters::inbound::api_server::ApiState;
use crate::domain::entities::{Resolution, SiteRequest};
use crate::domain::services::ClientSignals;
use crate::domain::value_objects::CountryCode;
use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::{
        header::{ACCEPT_LANGUAGE, CONTENT_LANGUAGE, COOKIE, HOST, SET_COOKIE, USER_AGENT},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;

/// Cookie holding the last resolved country code.
pub const LOCAL_COOKIE: &str = "local";
/// Cookie holding the advisory geolocation result.
pub const DETECTION_COOKIE: &str = "local_dc";
/// Query parameter overriding the site on safe requests.
pub const COUNTRY_PARAM: &str = "c";
/// Detection cookie lifetime: two days.
const DETECTION_MAX_AGE_SECS: u64 = 2 * 24 * 60 * 60;

/// Per-request site context, available to handlers as an extension.
#[derive(Debug, Clone)]
pub struct SiteContext {
    pub resolution: Resolution,
    /// Language active for this request
    pub language: String,
    /// Whether the site's default language overrode the negotiated one
    pub language_forced: bool,
}

/// Resolve the country site for the request and bind it.
///
/// A resolution failure fails the request with a 500; it means the
/// deployment is misconfigured.
pub async fn bind_country_site(
    State(state): State<ApiState>,
    mut req: Request,
    next: Next,
) -> Response {
    let headers = req.headers();
    let local_cookie = cookie(headers, LOCAL_COOKIE);
    let has_detection_cookie = cookie(headers, DETECTION_COOKIE).is_some();
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let negotiated = negotiated_language(headers);
    let site_request = site_request(&req, local_cookie.clone());

    let resolution = match state.registry.resolve(&site_request) {
        Ok(resolution) => resolution,
        Err(e) => {
            tracing::error!("country site resolution failed for host={}: {}", site_request.host, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let default_language = resolution.site.default_language.clone();
    let (language, language_forced) = match negotiated {
        Some(lang) if state.options.force_country_language && lang != default_language => {
            tracing::debug!("forcing language {} over negotiated {}", default_language, lang);
            (default_language, true)
        }
        Some(lang) => (lang, false),
        None => (default_language, false),
    };

    let code = resolution.country_code().clone();
    let context = SiteContext {
        resolution: resolution.clone(),
        language: language.clone(),
        language_forced,
    };
    req.extensions_mut().insert(context);

    let mut response = next.run(req).await;

    if local_cookie.as_deref() != Some(code.as_str()) {
        set_cookie(&mut response, &format!("{}={}; Path=/", LOCAL_COOKIE, code));
    }

    if !state.registry.settings().geoip_redirect && !has_detection_cookie {
        let detected = detection_code(&state, &resolution, user_agent.as_deref());
        set_cookie(
            &mut response,
            &format!(
                "{}={}; Max-Age={}; Path=/",
                DETECTION_COOKIE, detected, DETECTION_MAX_AGE_SECS
            ),
        );
    }

    if !response.headers().contains_key(CONTENT_LANGUAGE) {
        if let Ok(value) = HeaderValue::from_str(&language) {
            response.headers_mut().insert(CONTENT_LANGUAGE, value);
        }
    }

    response
}

/// Code recorded in the detection cookie.
///
/// Crawlers get the resolved site's code without a lookup. Everyone else
/// gets the geolocated code, or the configured default when undetected.
fn detection_code(state: &ApiState, resolution: &Resolution, user_agent: Option<&str>) -> CountryCode {
    if ClientSignals::is_crawler(user_agent) {
        return resolution.country_code().clone();
    }
    resolution
        .client_ip
        .and_then(|ip| state.geo.country(ip))
        .or_else(|| state.registry.settings().default_country_code.clone())
        .unwrap_or_else(|| resolution.country_code().clone())
}

/// Build the resolution inputs from an HTTP request.
pub fn site_request(req: &Request, local_cookie: Option<String>) -> SiteRequest {
    let headers = req.headers();
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default();

    let country_param = Query::<HashMap<String, String>>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(params)| params.get(COUNTRY_PARAM).cloned());

    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    SiteRequest {
        host,
        safe_method: ClientSignals::is_safe_method(req.method().as_str()),
        country_param,
        local_cookie,
        client_ip: ClientSignals::client_ip(forwarded_for(headers), remote),
    }
}

pub fn forwarded_for(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-forwarded-for").and_then(|v| v.to_str().ok())
}

/// Value of a request cookie. Empty values count as absent.
pub fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// Primary tag of the most preferred language in `Accept-Language`.
fn negotiated_language(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(ACCEPT_LANGUAGE)?.to_str().ok()?;
    let mut best: Option<(f32, String)> = None;
    for part in header.split(',') {
        let mut pieces = part.trim().split(';');
        let tag = pieces.next().unwrap_or_default().trim();
        if tag.is_empty() || tag == "*" {
            continue;
        }
        let quality = pieces
            .find_map(|p| p.trim().strip_prefix("q="))
            .and_then(|q| q.parse::<f32>().ok())
            .unwrap_or(1.0);
        if best.as_ref().map_or(true, |(q, _)| quality > *q) {
            best = Some((quality, tag.to_lowercase()));
        }
    }
    best.map(|(_, tag)| tag)
}

fn set_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => tracing::warn!("refusing to set malformed cookie {:?}: {}", cookie, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_cookie_parsing() {
        let h = headers(&[("cookie", "sessionid=abc; local=DE; local_dc=\"NL\"")]);
        assert_eq!(cookie(&h, "local"), Some("DE".to_string()));
        assert_eq!(cookie(&h, "local_dc"), Some("NL".to_string()));
        assert_eq!(cookie(&h, "missing"), None);
    }

    #[test]
    fn test_cookie_across_multiple_headers_and_empty_value() {
        let h = headers(&[("cookie", "a=1"), ("cookie", "local=; b=2")]);
        assert_eq!(cookie(&h, "b"), Some("2".to_string()));
        assert_eq!(cookie(&h, "local"), None);
    }

    #[test]
    fn test_negotiated_language() {
        let h = headers(&[("accept-language", "de-DE,de;q=0.9,en;q=0.8")]);
        assert_eq!(negotiated_language(&h), Some("de-de".to_string()));

        let h = headers(&[("accept-language", "en;q=0.5, nl;q=0.9")]);
        assert_eq!(negotiated_language(&h), Some("nl".to_string()));

        assert_eq!(negotiated_language(&HeaderMap::new()), None);
        let h = headers(&[("accept-language", "*")]);
        assert_eq!(negotiated_language(&h), None);
    }

    #[test]
    fn test_site_request_from_http() {
        let req = axum::http::Request::builder()
            .method("GET")
            .uri("/products?c=de&page=2")
            .header("host", "example.com")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        let site_req = site_request(&req, Some("NL".to_string()));
        assert_eq!(site_req.host, "example.com");
        assert!(site_req.safe_method);
        assert_eq!(site_req.country_param.as_deref(), Some("de"));
        assert_eq!(site_req.local_cookie.as_deref(), Some("NL"));
        assert_eq!(site_req.client_ip, Some("203.0.113.9".parse().unwrap()));
    }

    #[test]
    fn test_site_request_post_uses_connect_info() {
        let mut req = axum::http::Request::builder()
            .method("POST")
            .uri("/checkout")
            .header("host", "shop.example.uk:8443")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo("198.51.100.4:50123".parse::<SocketAddr>().unwrap()));

        let site_req = site_request(&req, None);
        assert_eq!(site_req.host, "shop.example.uk:8443");
        assert!(!site_req.safe_method);
        assert_eq!(site_req.country_param, None);
        assert_eq!(site_req.client_ip, Some("198.51.100.4".parse().unwrap()));
    }
}
