//! Cache Middleware
//!
//! Intercepts requests to decide whether to serve from the cache, capture a
//! fresh response into it, or bypass it entirely. Cache failures never stop
//! the wrapped handler from producing its response.

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body, HttpBody},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, info, warn};

use super::handlers::AppState;
use crate::cache::{
    maybe_compress, Admission, CacheEntry, RequestIdentity, CACHE_STATUS_HEADER,
    CACHE_TAGS_HEADER, MAX_REQUEST_BODY,
};
use crate::error::CacheError;
use crate::models::CacheDirectives;

fn is_cacheable(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::POST | Method::PUT | Method::PATCH
    )
}

fn hashes_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Collects the configured headers that are worth replaying on a hit.
fn capture_headers(headers: &HeaderMap, allowlist: &[String]) -> HashMap<String, String> {
    allowlist
        .iter()
        .filter_map(|name| {
            let value = headers.get(name.as_str())?.to_str().ok()?;
            Some((name.clone(), value.to_string()))
        })
        .collect()
}

/// Removes and parses the handler's tag header.
fn take_tags(headers: &mut HeaderMap) -> Vec<String> {
    headers
        .remove(CACHE_TAGS_HEADER)
        .and_then(|value| value.to_str().ok().map(str::to_string))
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn mark(headers: &mut HeaderMap, status: &'static str) {
    headers.insert(
        HeaderName::from_static(CACHE_STATUS_HEADER),
        HeaderValue::from_static(status),
    );
}

/// Builds the response served on a cache hit.
fn hit_response(entry: &CacheEntry, body: Vec<u8>) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    for (name, value) in &entry.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    mark(headers, "HIT");
    response
}

/// True when the body is known to fit in [`MAX_REQUEST_BODY`] before any of
/// it is read. Streams of unknown length do not qualify.
fn body_fits(body: &Body) -> bool {
    body.size_hint()
        .upper()
        .is_some_and(|upper| upper <= MAX_REQUEST_BODY as u64)
}

/// Evicts the directive's tags, or `key` when no tags were given and a key
/// is available.
async fn apply_eviction(state: &AppState, directives: &CacheDirectives, key: Option<&str>) {
    let controller = &state.controller;
    let removed = if !directives.tags.is_empty() {
        let mut removed = 0;
        for tag in &directives.tags {
            removed += controller.evict_by_tag(tag).await;
        }
        removed
    } else if let Some(key) = key {
        controller.evict_by_key(key).await
    } else {
        0
    };
    info!(key = ?key, tags = ?directives.tags, removed, "request-driven eviction");
}

/// Middleware wrapping cacheable routes.
///
/// # Flow
/// 1. Pass straight through when the request neither evicts nor uses the cache
/// 2. Derive the key from path, non-reserved query, body digest and Accept
/// 3. Honor the evict flag (by tags when given, else by key)
/// 4. Bypass when caching is off for this request
/// 5. Serve a hit, or run the handler and try to admit its 200 response
///
/// A mutating request whose body cannot be bounded up front is never keyed;
/// it reaches the handler untouched.
pub async fn cache_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !is_cacheable(request.method()) {
        return next.run(request).await;
    }

    let query: Vec<(String, String)> = request
        .uri()
        .query()
        .and_then(|q| serde_urlencoded::from_str(q).ok())
        .unwrap_or_default();
    let directives = CacheDirectives::from_query(&query, &state.config.params);
    let use_cache = directives.use_cache.unwrap_or(state.config.cache_by_default);

    if !use_cache && !directives.evict {
        debug!(path = %request.uri().path(), "cache bypassed");
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let (body, body_bytes) = if hashes_body(&parts.method) {
        if !body_fits(&body) {
            debug!(path = %parts.uri.path(), "request body too large to key, caching skipped");
            if directives.evict {
                apply_eviction(&state, &directives, None).await;
            }
            return next.run(Request::from_parts(parts, body)).await;
        }
        match to_bytes(body, MAX_REQUEST_BODY).await {
            Ok(bytes) => (Body::from(bytes.clone()), Some(bytes)),
            // The stream itself failed; the handler could not have read it either.
            Err(err) => return CacheError::BodyUnreadable(err.to_string()).into_response(),
        }
    } else {
        (body, None)
    };

    let accept = parts
        .headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok());
    let key = state.keys.generate(&RequestIdentity {
        path: parts.uri.path(),
        query: &query,
        body: body_bytes.as_deref(),
        accept,
    });

    if directives.evict {
        apply_eviction(&state, &directives, Some(key.as_str())).await;
    }

    let request = Request::from_parts(parts, body);

    if !use_cache {
        debug!(key = %key, "cache bypassed");
        return next.run(request).await;
    }

    let controller = &state.controller;

    if let Some(entry) = controller.lookup(&key).await {
        match entry.decoded_payload() {
            Ok(body) => {
                debug!(key = %key, "cache hit");
                return hit_response(&entry, body);
            }
            Err(err) => {
                warn!(key = %key, error = %err, "stored payload unreadable, evicting");
                controller.evict_by_key(&key).await;
            }
        }
    }

    let response = next.run(request).await;
    let (mut parts, body) = response.into_parts();
    let tags = take_tags(&mut parts.headers);

    if parts.status != StatusCode::OK {
        return Response::from_parts(parts, body);
    }

    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(key = %key, error = %err, "failed to buffer response body");
            return CacheError::Internal("failed to read response body".into()).into_response();
        }
    };

    let config = &state.config;
    let (payload, compression) =
        maybe_compress(bytes.to_vec(), config.compression, config.compression_min_bytes);
    let entry = CacheEntry::new(payload)
        .with_tags(tags)
        .with_headers(capture_headers(&parts.headers, &config.cached_headers))
        .with_compression(compression);
    let ttl = directives
        .ttl
        .unwrap_or_else(|| Duration::from_secs(config.default_ttl));

    match controller.admit(key.clone(), entry, Some(ttl)).await {
        Admission::Admitted => debug!(key = %key, ttl_secs = ttl.as_secs(), "response cached"),
        Admission::Rejected(reason) => debug!(key = %key, %reason, "response not cached"),
    }

    mark(&mut parts.headers, "MISS");
    Response::from_parts(parts, Body::from(bytes))
}
