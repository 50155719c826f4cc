use super::*;
use crate::error::CorralError;
use mockito::Matcher;
use reqwest::header::HeaderValue;

fn extra_with(key: &str, value: &str) -> HashMap<String, String> {
    let mut extra = HashMap::new();
    extra.insert(key.to_string(), value.to_string());
    extra
}

fn headers_with_auth(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    headers
}

#[test]
fn strip_on_amazon_presigned_url() {
    let url = Url::parse(
        "https://bucket.s3.amazonaws.com/blob?X-Amz-Credential=AKIA%2F20260101&X-Amz-Signature=abc",
    )
    .unwrap();
    let headers = headers_with_auth("Bearer token");
    assert!(should_strip_authorization(
        &Method::GET,
        &url,
        &headers,
        &HashMap::new()
    ));
}

#[test]
fn strip_applies_to_head_requests() {
    let url = Url::parse("https://bucket.s3.amazonaws.com/blob?X-Amz-Credential=abc").unwrap();
    assert!(should_strip_authorization(
        &Method::HEAD,
        &url,
        &HeaderMap::new(),
        &HashMap::new()
    ));
}

#[test]
fn no_strip_for_non_idempotent_methods() {
    let url = Url::parse("https://bucket.s3.amazonaws.com/blob?X-Amz-Credential=abc").unwrap();
    assert!(!should_strip_authorization(
        &Method::POST,
        &url,
        &HeaderMap::new(),
        &HashMap::new()
    ));
    assert!(!should_strip_authorization(
        &Method::PUT,
        &url,
        &HeaderMap::new(),
        &HashMap::new()
    ));
}

#[test]
fn strip_basic_credentials_on_azure_hosts() {
    let url = Url::parse("https://myregistry.azurecr.io/v2/app/blobs/sha256:abc").unwrap();
    let basic = headers_with_auth("Basic dXNlcjpwYXNz");
    assert!(should_strip_authorization(
        &Method::GET,
        &url,
        &basic,
        &HashMap::new()
    ));
}

#[test]
fn bearer_tokens_pass_through_azure_hosts() {
    let url = Url::parse("https://myregistry.azurecr.io/v2/app/blobs/sha256:abc").unwrap();
    let bearer = headers_with_auth("Bearer eyJhbGciOi");
    assert!(!should_strip_authorization(
        &Method::GET,
        &url,
        &bearer,
        &HashMap::new()
    ));
}

#[test]
fn strip_on_custom_registry_marker() {
    let url = Url::parse("https://cdn.my-registry.example.com/blob").unwrap();
    let extra = extra_with(CUSTOM_REGISTRY_EXTRA_KEY, "my-registry.example.com");
    assert!(should_strip_authorization(
        &Method::GET,
        &url,
        &headers_with_auth("Basic abc"),
        &extra
    ));
}

#[test]
fn empty_custom_registry_marker_is_ignored() {
    let url = Url::parse("https://anything.example.com/blob").unwrap();
    let extra = extra_with(CUSTOM_REGISTRY_EXTRA_KEY, "");
    assert!(!should_strip_authorization(
        &Method::GET,
        &url,
        &headers_with_auth("Basic abc"),
        &extra
    ));
}

#[test]
fn plain_redirect_keeps_credentials() {
    let url = Url::parse("https://mirror.example.com/v2/app/blobs/sha256:abc").unwrap();
    assert!(!should_strip_authorization(
        &Method::GET,
        &url,
        &headers_with_auth("Basic abc"),
        &HashMap::new()
    ));
}

#[test]
fn factory_memoizes_clients_per_configuration() {
    let factory = HttpClientFactory::new(None);
    let extra = extra_with("custom-registry", "example.com");

    let first = factory.get_client(false, false, &extra).unwrap();
    let second = factory.get_client(false, false, &extra).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn factory_distinguishes_configurations() {
    let factory = HttpClientFactory::new(None);

    let plain = factory.get_client(false, false, &HashMap::new()).unwrap();
    let insecure = factory.get_client(true, false, &HashMap::new()).unwrap();
    let marked = factory
        .get_client(false, false, &extra_with("custom-registry", "x"))
        .unwrap();

    assert!(!Arc::ptr_eq(&plain, &insecure));
    assert!(!Arc::ptr_eq(&plain, &marked));
}

#[test]
fn proxy_requested_without_configuration_fails() {
    let factory = HttpClientFactory::new(None);
    let result = factory.get_client(false, true, &HashMap::new());
    assert!(matches!(result.unwrap_err(), CorralError::Config { .. }));
}

#[test]
fn proxy_configuration_is_honored() {
    let factory = HttpClientFactory::new(Some(HttpProxy {
        host: "proxy.example.com".to_string(),
        port: 8080,
    }));
    assert!(factory.get_client(false, true, &HashMap::new()).is_ok());
}

#[tokio::test]
async fn execute_follows_redirects() {
    let mut server = mockito::Server::new_async().await;
    let redirect = server
        .mock("GET", "/v2/app/blobs/sha256:abc")
        .with_status(307)
        .with_header("Location", "/storage/abc")
        .create_async()
        .await;
    let target = server
        .mock("GET", "/storage/abc")
        .with_status(200)
        .with_body("blob-bytes")
        .create_async()
        .await;

    let factory = HttpClientFactory::new(None);
    let client = factory.get_client(false, false, &HashMap::new()).unwrap();
    let response = client
        .get(
            &format!("{}/v2/app/blobs/sha256:abc", server.url()),
            HeaderMap::new(),
        )
        .await
        .unwrap();

    redirect.assert_async().await;
    target.assert_async().await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"blob-bytes");
}

#[tokio::test]
async fn redirect_to_presigned_url_drops_authorization() {
    let mut server = mockito::Server::new_async().await;
    let redirect = server
        .mock("GET", "/v2/app/blobs/sha256:abc")
        .match_header("authorization", "Basic dXNlcjpwYXNz")
        .with_status(302)
        .with_header("Location", "/storage/abc?X-Amz-Credential=AKIA")
        .create_async()
        .await;
    let target = server
        .mock("GET", "/storage/abc")
        .match_query(Matcher::UrlEncoded(
            "X-Amz-Credential".into(),
            "AKIA".into(),
        ))
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body("blob-bytes")
        .create_async()
        .await;

    let factory = HttpClientFactory::new(None);
    let client = factory.get_client(false, false, &HashMap::new()).unwrap();
    let response = client
        .get(
            &format!("{}/v2/app/blobs/sha256:abc", server.url()),
            headers_with_auth("Basic dXNlcjpwYXNz"),
        )
        .await
        .unwrap();

    redirect.assert_async().await;
    target.assert_async().await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn redirect_without_marker_keeps_authorization() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v2/app/manifests/latest")
        .with_status(302)
        .with_header("Location", "/mirror/manifest")
        .create_async()
        .await;
    let target = server
        .mock("GET", "/mirror/manifest")
        .match_header("authorization", "Bearer token-123")
        .with_status(200)
        .create_async()
        .await;

    let factory = HttpClientFactory::new(None);
    let client = factory.get_client(false, false, &HashMap::new()).unwrap();
    let response = client
        .get(
            &format!("{}/v2/app/manifests/latest", server.url()),
            headers_with_auth("Bearer token-123"),
        )
        .await
        .unwrap();

    target.assert_async().await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn redirect_loop_is_bounded() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/loop")
        .with_status(302)
        .with_header("Location", "/loop")
        .expect_at_least(1)
        .create_async()
        .await;

    let factory = HttpClientFactory::new(None);
    let client = factory.get_client(false, false, &HashMap::new()).unwrap();
    let result = client
        .get(&format!("{}/loop", server.url()), HeaderMap::new())
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, CorralError::Transport { .. }));
    assert!(err.to_string().contains("too many redirects"));
}

#[tokio::test]
async fn read_json_ignores_content_type() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v2/app/tags/list")
        .with_status(200)
        .with_header("Content-Type", "text/plain")
        .with_body(r#"{"name":"app","tags":["1.0","2.0"]}"#)
        .create_async()
        .await;

    let factory = HttpClientFactory::new(None);
    let client = factory.get_client(false, false, &HashMap::new()).unwrap();
    let response = client
        .get(&format!("{}/v2/app/tags/list", server.url()), HeaderMap::new())
        .await
        .unwrap();

    let body: serde_json::Value = read_json(response).await.unwrap();
    assert_eq!(body["name"], "app");
    assert_eq!(body["tags"][1], "2.0");
}

#[tokio::test]
async fn ensure_success_maps_unauthorized_to_authorization_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v2/app/manifests/latest")
        .with_status(401)
        .with_body("authentication required")
        .create_async()
        .await;

    let factory = HttpClientFactory::new(None);
    let client = factory.get_client(false, false, &HashMap::new()).unwrap();
    let response = client
        .get(
            &format!("{}/v2/app/manifests/latest", server.url()),
            HeaderMap::new(),
        )
        .await
        .unwrap();

    let err = ensure_success(response).await.unwrap_err();
    assert!(matches!(err, CorralError::Authorization { .. }));
    assert!(err.to_string().contains("authentication required"));
}

#[tokio::test]
async fn ensure_success_maps_server_errors_to_transport() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v2/_catalog")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let factory = HttpClientFactory::new(None);
    let client = factory.get_client(false, false, &HashMap::new()).unwrap();
    let response = client
        .get(&format!("{}/v2/_catalog", server.url()), HeaderMap::new())
        .await
        .unwrap();

    let err = ensure_success(response).await.unwrap_err();
    assert!(matches!(err, CorralError::Transport { .. }));
}
