use super::*;
use crate::config::AuthorizationType;

fn config_for(authorization_type: Option<AuthorizationType>) -> RegistryConfiguration {
    RegistryConfiguration {
        registry_host: "registry.example.com".to_string(),
        authorization_type,
        ..RegistryConfiguration::default()
    }
}

fn registry() -> AuthorizerRegistry {
    AuthorizerRegistry::with_defaults(Arc::new(HttpClientFactory::new(None)))
}

#[tokio::test]
async fn anonymous_authorizer_yields_no_headers() {
    let headers = AnonymousRegistryAuthorizer
        .authorize("library/nginx", &config_for(Some(AuthorizationType::Anonymous)))
        .await
        .unwrap();
    assert!(headers.is_empty());
}

#[tokio::test]
async fn basic_authorizer_encodes_credentials() {
    let mut config = config_for(Some(AuthorizationType::BasicAuth));
    config.user = Some("user".to_string());
    config.secret = Some("pass".to_string());

    let headers = BasicAuthRegistryAuthorizer
        .authorize("team/app", &config)
        .await
        .unwrap();
    // base64("user:pass")
    assert_eq!(
        headers.get(AUTHORIZATION).unwrap(),
        "Basic dXNlcjpwYXNz"
    );
}

#[tokio::test]
async fn basic_authorizer_requires_both_credentials() {
    let mut config = config_for(Some(AuthorizationType::BasicAuth));
    config.user = Some("user".to_string());

    let err = BasicAuthRegistryAuthorizer
        .authorize("team/app", &config)
        .await
        .unwrap_err();
    assert!(matches!(err, CorralError::Authorization { .. }));
    assert!(err.to_string().contains("registry.example.com"));
}

#[test]
fn challenge_parses_realm_and_service() {
    let header =
        r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io""#;
    let challenge = AuthChallenge::parse(header).unwrap();
    assert_eq!(challenge.scheme, "Bearer");
    assert_eq!(challenge.realm, "https://auth.docker.io/token");
    assert_eq!(challenge.service.as_deref(), Some("registry.docker.io"));
}

#[test]
fn challenge_tolerates_missing_service() {
    let challenge = AuthChallenge::parse(r#"Bearer realm="https://token.example.com""#).unwrap();
    assert_eq!(challenge.service, None);
}

#[test]
fn challenge_requires_realm() {
    let result = AuthChallenge::parse(r#"Bearer service="registry.example.com""#);
    assert!(result.is_err());
}

#[test]
fn challenge_rejects_bare_scheme() {
    assert!(AuthChallenge::parse("Bearer").is_err());
}

#[tokio::test]
async fn registry_dispatches_on_configured_type() {
    let mut config = config_for(Some(AuthorizationType::BasicAuth));
    config.user = Some("admin".to_string());
    config.secret = Some("Harbor12345".to_string());

    let headers = registry().authorize("team/app", &config).await.unwrap();
    assert!(headers.contains_key(AUTHORIZATION));
}

#[tokio::test]
async fn missing_authorization_type_defaults_to_anonymous() {
    let headers = registry()
        .authorize("library/nginx", &config_for(None))
        .await
        .unwrap();
    assert!(headers.is_empty());
}

#[tokio::test]
async fn unregistered_type_is_rejected() {
    let mut registry = AuthorizerRegistry::with_defaults(Arc::new(HttpClientFactory::new(None)));
    // Simulate a build without the basicauth strategy.
    registry.authorizers.remove(&AuthorizationType::BasicAuth);

    let err = registry
        .authorize("team/app", &config_for(Some(AuthorizationType::BasicAuth)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CorralError::UnsupportedAuthorizationType { .. }
    ));
}
