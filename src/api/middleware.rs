use serde_json::Value;

use super::error::ApiError;
use super::transport::{Body, HttpRequest, HttpResponse, Transport};
use crate::case::{to_camel, to_snake};

// ─── Body conversion ───────────────────────────────────────────────────────
// Only bodies declared as JSON are rewritten; multipart uploads go through
// untouched.

/// Rewrite a JSON request body to snake_case.
///
/// A body that does not parse is sent unchanged.
pub fn prepare_request(mut request: HttpRequest) -> HttpRequest {
    let is_json = request
        .content_type()
        .map_or(false, |ct| ct.contains("application/json"));
    if !is_json {
        return request;
    }

    if let Body::Text(text) = &request.body {
        match serde_json::from_str::<Value>(text) {
            Ok(json) => request.body = Body::Text(to_snake(&json).to_string()),
            Err(e) => tracing::debug!("Request body is not valid JSON, sending as-is: {e}"),
        }
    }
    request
}

/// Rewrite a JSON response body to camelCase. Status and headers are kept.
///
/// Empty bodies pass through. A body that does not parse is an error on a
/// 2xx response; on any other status it is kept as-is so the status survives.
pub fn convert_response(response: HttpResponse) -> Result<HttpResponse, ApiError> {
    if !response.is_json() || response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(response);
    }

    let json: Value = match serde_json::from_slice(&response.body) {
        Ok(json) => json,
        Err(e) if !response.is_success() => {
            tracing::debug!("Error body is not valid JSON, keeping as-is: {e}");
            return Ok(response);
        }
        Err(e) => return Err(ApiError::MalformedBody(e.to_string())),
    };
    let body = serde_json::to_vec(&to_camel(&json))
        .map_err(|e| ApiError::MalformedBody(e.to_string()))?;

    Ok(HttpResponse { body, ..response })
}

// ─── Sending ───────────────────────────────────────────────────────────────

/// Send a request through the converting middleware.
pub async fn api_fetch<T: Transport>(
    transport: &T,
    request: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let request = prepare_request(request);
    let response = transport.send(request).await?;
    convert_response(response)
}

/// [`api_fetch`], then fail any non-2xx with its status and return the JSON
/// body. An empty body is `Value::Null` whatever the content type.
pub async fn api_call<T: Transport>(transport: &T, request: HttpRequest) -> Result<Value, ApiError> {
    let method = request.method.clone();
    let url = request.url.clone();
    let response = api_fetch(transport, request).await?;

    if !response.is_success() {
        let message = serde_json::from_slice::<Value>(&response.body)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string));
        tracing::warn!(
            "{} {} failed: {} {}",
            method,
            url,
            response.status.as_u16(),
            response.status_text
        );
        return Err(ApiError::Status {
            status: response.status.as_u16(),
            status_text: response.status_text,
            message,
        });
    }

    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    serde_json::from_slice(&response.body).map_err(|e| ApiError::MalformedBody(e.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::transport::FormPart;
    use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
    use reqwest::{Method, StatusCode};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Transport that records requests and replays canned responses.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        pub sent: Mutex<Vec<HttpRequest>>,
        replies: Mutex<VecDeque<Result<HttpResponse, ApiError>>>,
    }

    impl FakeTransport {
        pub fn reply(&self, reply: Result<HttpResponse, ApiError>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        pub fn reply_json(&self, status: u16, body: Value) {
            self.reply(Ok(json_response(status, &body)));
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.sent.lock().unwrap().clone()
        }

        pub fn last(&self) -> HttpRequest {
            self.sent.lock().unwrap().last().cloned().expect("no request sent")
        }
    }

    impl Transport for FakeTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.sent.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json_response(200, &json!({}))))
        }
    }

    pub(crate) fn json_response(status: u16, body: &Value) -> HttpResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-request-id", HeaderValue::from_static("abc"));
        HttpResponse::new(
            StatusCode::from_u16(status).unwrap(),
            headers,
            serde_json::to_vec(body).unwrap(),
        )
    }

    fn text_response(status: u16, body: &str) -> HttpResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        HttpResponse::new(StatusCode::from_u16(status).unwrap(), headers, body.as_bytes().to_vec())
    }

    pub(crate) fn body_json(req: &HttpRequest) -> Value {
        match &req.body {
            Body::Text(t) => serde_json::from_str(t).unwrap(),
            other => panic!("expected text body, got {other:?}"),
        }
    }

    #[test]
    fn test_prepare_request_snake_cases_json() {
        let req = HttpRequest::new(Method::POST, "/api/test")
            .json(&json!({"userName": "test", "profileImageUrl": "url"}));
        let out = prepare_request(req);
        assert_eq!(body_json(&out), json!({"user_name": "test", "profile_image_url": "url"}));
    }

    #[test]
    fn test_prepare_request_fails_open_on_invalid_json() {
        let mut req = HttpRequest::new(Method::POST, "/api/test").json(&json!({}));
        req.body = Body::Text("invalid json".into());
        let out = prepare_request(req);
        assert_eq!(out.body, Body::Text("invalid json".into()));
    }

    #[test]
    fn test_prepare_request_ignores_non_json_content_type() {
        let mut req = HttpRequest::new(Method::POST, "/api/test").header(CONTENT_TYPE, "text/plain");
        req.body = Body::Text(r#"{"userName":"x"}"#.into());
        let out = prepare_request(req);
        assert_eq!(out.body, Body::Text(r#"{"userName":"x"}"#.into()));
    }

    #[test]
    fn test_prepare_request_leaves_multipart_untouched() {
        let parts = vec![FormPart {
            name: "file".into(),
            file_name: Some("photo_one.png".into()),
            mime: Some("image/png".into()),
            data: b"{\"user_name\":1}".to_vec(),
        }];
        let req = HttpRequest::new(Method::POST, "/api/aws/1").multipart(parts.clone());
        let out = prepare_request(req);
        assert_eq!(out.body, Body::Multipart(parts));
    }

    #[test]
    fn test_convert_response_camel_cases_and_keeps_metadata() {
        let resp = json_response(201, &json!({"user_name": "test"}));
        let out = convert_response(resp).unwrap();
        assert_eq!(out.status, StatusCode::CREATED);
        assert_eq!(out.status_text, "Created");
        assert_eq!(out.headers.get("x-request-id").unwrap(), "abc");
        let body: Value = serde_json::from_slice(&out.body).unwrap();
        assert_eq!(body, json!({"userName": "test"}));
    }

    #[test]
    fn test_convert_response_passes_text_through() {
        let resp = text_response(200, "{\"user_name\": 1}");
        let out = convert_response(resp).unwrap();
        assert_eq!(out.body, b"{\"user_name\": 1}".to_vec());
    }

    #[test]
    fn test_convert_response_rejects_broken_json() {
        let mut resp = json_response(200, &json!({}));
        resp.body = b"{not json".to_vec();
        assert!(matches!(convert_response(resp), Err(ApiError::MalformedBody(_))));
    }

    #[test]
    fn test_convert_response_keeps_unparseable_error_body() {
        let mut resp = json_response(502, &json!({}));
        resp.body = b"<html>Bad Gateway</html>".to_vec();
        let out = convert_response(resp).unwrap();
        assert_eq!(out.status, StatusCode::BAD_GATEWAY);
        assert_eq!(out.body, b"<html>Bad Gateway</html>".to_vec());
    }

    #[tokio::test]
    async fn test_api_call_returns_converted_json() {
        let transport = FakeTransport::default();
        transport.reply_json(200, json!({"posts": [{"image_url": "a"}]}));
        let value = api_call(&transport, HttpRequest::get("/api/post/explore/0"))
            .await
            .unwrap();
        assert_eq!(value, json!({"posts": [{"imageUrl": "a"}]}));
    }

    #[tokio::test]
    async fn test_api_call_non_success_is_error_with_status() {
        let transport = FakeTransport::default();
        transport.reply_json(404, json!({"error": "Post not found", "success": false}));
        let err = api_call(&transport, HttpRequest::get("/api/post/9"))
            .await
            .unwrap_err();
        match err {
            ApiError::Status {
                status,
                status_text,
                message,
            } => {
                assert_eq!(status, 404);
                assert_eq!(status_text, "Not Found");
                assert_eq!(message.as_deref(), Some("Post not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_api_call_non_json_error_has_no_message() {
        let transport = FakeTransport::default();
        transport.reply(Ok(text_response(500, "boom")));
        let err = api_call(&transport, HttpRequest::get("/api/x")).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.user_message(), "API call failed: 500 Internal Server Error");
    }

    #[tokio::test]
    async fn test_api_call_empty_body_is_null() {
        let transport = FakeTransport::default();
        transport.reply(Ok(text_response(204, "")));
        let value = api_call(&transport, HttpRequest::get("/api/x")).await.unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_api_call_unparseable_json_error_keeps_status() {
        let transport = FakeTransport::default();
        let mut resp = json_response(502, &json!({}));
        resp.body = b"<html>Bad Gateway</html>".to_vec();
        transport.reply(Ok(resp));
        let err = api_call(&transport, HttpRequest::get("/api/x")).await.unwrap_err();
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.user_message(), "API call failed: 502 Bad Gateway");
    }

    #[tokio::test]
    async fn test_api_call_empty_json_error_keeps_status() {
        let transport = FakeTransport::default();
        let mut resp = json_response(401, &json!({}));
        resp.body = Vec::new();
        transport.reply(Ok(resp));
        let err = api_call(&transport, HttpRequest::get("/api/auth")).await.unwrap_err();
        match err {
            ApiError::Status { status, status_text, message } => {
                assert_eq!(status, 401);
                assert_eq!(status_text, "Unauthorized");
                assert!(message.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_api_call_empty_json_success_is_null() {
        let transport = FakeTransport::default();
        let mut resp = json_response(200, &json!({}));
        resp.body = b"  \n".to_vec();
        transport.reply(Ok(resp));
        let value = api_call(&transport, HttpRequest::get("/api/auth/logout")).await.unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_api_call_propagates_transport_failure() {
        let transport = FakeTransport::default();
        transport.reply(Err(ApiError::Transport("connection refused".into())));
        let err = api_call(&transport, HttpRequest::get("/api/x")).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }

    #[tokio::test]
    async fn test_api_fetch_sends_snake_case_to_transport() {
        let transport = FakeTransport::default();
        let req = HttpRequest::new(Method::POST, "/api/follow")
            .json(&json!({"userId": 1, "userFollowedId": 2}));
        api_fetch(&transport, req).await.unwrap();
        assert_eq!(
            body_json(&transport.last()),
            json!({"user_id": 1, "user_followed_id": 2})
        );
    }
}
