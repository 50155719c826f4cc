use super::*;

#[test]
fn test_default_properties() {
    let properties = RegistryProperties::default();

    assert_eq!(properties.default_registry_host, "registry-1.docker.io");
    assert_eq!(properties.default_tag, "latest");
    assert_eq!(properties.official_namespace, "library");
    assert!(properties.http_proxy.is_none());
    assert!(properties.registry_configurations.is_empty());
}

#[test]
fn test_from_yaml_str_empty_is_default() {
    let properties = RegistryProperties::from_yaml_str("").unwrap();
    assert_eq!(properties, RegistryProperties::default());
}

#[test]
fn test_from_yaml_str_full() {
    let yaml = r#"
http-proxy:
  host: my-proxy.test
  port: 8080
registry-configurations:
  myamazonaws:
    registry-host: 283191309520.dkr.ecr.us-west-1.amazonaws.com
    authorization-type: awsecr
    user: access-key
    secret: secret-key
    extra:
      region: us-west-1
      registryIds: "283191309520"
  harbor:
    registry-host: demo.goharbor.io
    authorization-type: dockeroauth2
    disable-ssl-verification: true
    use-http-proxy: true
"#;
    let properties = RegistryProperties::from_yaml_str(yaml).unwrap();

    assert_eq!(
        properties.http_proxy,
        Some(HttpProxy {
            host: "my-proxy.test".to_string(),
            port: 8080
        })
    );

    let ecr = &properties.registry_configurations["myamazonaws"];
    assert_eq!(
        ecr.registry_host,
        "283191309520.dkr.ecr.us-west-1.amazonaws.com"
    );
    assert_eq!(ecr.authorization_type, Some(AuthorizationType::AwsEcr));
    assert_eq!(ecr.user.as_deref(), Some("access-key"));
    assert_eq!(ecr.extra["region"], "us-west-1");
    assert!(!ecr.disable_ssl_verification);

    let harbor = &properties.registry_configurations["harbor"];
    assert_eq!(
        harbor.authorization_type,
        Some(AuthorizationType::DockerOAuth2)
    );
    assert!(harbor.disable_ssl_verification);
    assert!(harbor.use_http_proxy);
    assert!(harbor.user.is_none());
}

#[test]
fn test_authorization_type_serde_names() {
    let names = [
        (AuthorizationType::Anonymous, "anonymous"),
        (AuthorizationType::BasicAuth, "basicauth"),
        (AuthorizationType::DockerOAuth2, "dockeroauth2"),
        (AuthorizationType::AwsEcr, "awsecr"),
    ];
    for (variant, name) in names {
        assert_eq!(serde_json::to_string(&variant).unwrap(), format!("\"{}\"", name));
        assert_eq!(variant.to_string(), name);
        let parsed: AuthorizationType =
            serde_json::from_str(&format!("\"{}\"", name)).unwrap();
        assert_eq!(parsed, variant);
    }
}

#[test]
fn test_manifest_media_type_defaults_to_docker_v2() {
    let configuration = RegistryConfiguration::default();
    assert_eq!(
        configuration.manifest_media_type_or_default(),
        DOCKER_MANIFEST_MEDIA_TYPE
    );

    let configuration = RegistryConfiguration {
        manifest_media_type: Some(OCI_MANIFEST_MEDIA_TYPE.to_string()),
        ..RegistryConfiguration::default()
    };
    assert_eq!(
        configuration.manifest_media_type_or_default(),
        OCI_MANIFEST_MEDIA_TYPE
    );
}

#[test]
fn test_merge_explicit_scalars_win() {
    let explicit = RegistryConfiguration {
        registry_host: "demo.goharbor.io".to_string(),
        user: Some("explicit-user".to_string()),
        secret: None,
        authorization_type: Some(AuthorizationType::DockerOAuth2),
        disable_ssl_verification: true,
        ..RegistryConfiguration::default()
    };
    let from_secret = RegistryConfiguration {
        registry_host: "demo.goharbor.io".to_string(),
        user: Some("secret-user".to_string()),
        secret: Some("secret-password".to_string()),
        authorization_type: Some(AuthorizationType::BasicAuth),
        manifest_media_type: Some(OCI_MANIFEST_MEDIA_TYPE.to_string()),
        ..RegistryConfiguration::default()
    };

    let merged = explicit.merge_from_secret(&from_secret);

    // Explicit non-empty scalars win; unset ones fall back to the secret.
    assert_eq!(merged.user.as_deref(), Some("explicit-user"));
    assert_eq!(merged.secret.as_deref(), Some("secret-password"));
    assert_eq!(
        merged.authorization_type,
        Some(AuthorizationType::DockerOAuth2)
    );
    assert_eq!(
        merged.manifest_media_type.as_deref(),
        Some(OCI_MANIFEST_MEDIA_TYPE)
    );
    // Booleans always come from the explicit source.
    assert!(merged.disable_ssl_verification);
    assert!(!merged.use_http_proxy);
}

#[test]
fn test_merge_empty_explicit_scalars_fall_back_to_secret() {
    // YAML like `user: ""` deserializes to Some(""); an empty value is not
    // an explicit setting and must not shadow the secret-derived one.
    let explicit = RegistryConfiguration {
        registry_host: "demo.goharbor.io".to_string(),
        user: Some(String::new()),
        secret: Some(String::new()),
        manifest_media_type: Some(String::new()),
        ..RegistryConfiguration::default()
    };
    let from_secret = RegistryConfiguration {
        registry_host: "demo.goharbor.io".to_string(),
        user: Some("secret-user".to_string()),
        secret: Some("secret-password".to_string()),
        manifest_media_type: Some(OCI_MANIFEST_MEDIA_TYPE.to_string()),
        ..RegistryConfiguration::default()
    };

    let merged = explicit.merge_from_secret(&from_secret);

    assert_eq!(merged.user.as_deref(), Some("secret-user"));
    assert_eq!(merged.secret.as_deref(), Some("secret-password"));
    assert_eq!(
        merged.manifest_media_type.as_deref(),
        Some(OCI_MANIFEST_MEDIA_TYPE)
    );
}

#[test]
fn test_merge_extras_union_explicit_wins_on_collision() {
    let explicit = RegistryConfiguration {
        registry_host: "h.io".to_string(),
        extra: HashMap::from([
            ("region".to_string(), "us-west-1".to_string()),
            ("custom-registry".to_string(), "blobs.h.io".to_string()),
        ]),
        ..RegistryConfiguration::default()
    };
    let from_secret = RegistryConfiguration {
        registry_host: "h.io".to_string(),
        extra: HashMap::from([
            ("region".to_string(), "eu-central-1".to_string()),
            ("registryIds".to_string(), "1234".to_string()),
        ]),
        ..RegistryConfiguration::default()
    };

    let merged = explicit.merge_from_secret(&from_secret);

    assert_eq!(merged.extra["region"], "us-west-1");
    assert_eq!(merged.extra["registryIds"], "1234");
    assert_eq!(merged.extra["custom-registry"], "blobs.h.io");
}

#[test]
fn test_store_lookup_by_registry_host() {
    let yaml = r#"
registry-configurations:
  some-name:
    registry-host: myregistry.io:5000
    authorization-type: basicauth
"#;
    let properties = RegistryProperties::from_yaml_str(yaml).unwrap();
    let store = RegistryConfigurationStore::from_properties(&properties);

    // Keyed by registry host, not by the arbitrary properties name.
    assert!(store.get("myregistry.io:5000").is_ok());
    let err = store.get("unknown.io").unwrap_err();
    assert!(matches!(err, CorralError::RegistryNotConfigured { .. }));
}

#[test]
fn test_store_merge_secret_entries() {
    let mut store = RegistryConfigurationStore::default();
    store.insert(RegistryConfiguration {
        registry_host: "a.io".to_string(),
        user: Some("explicit".to_string()),
        ..RegistryConfiguration::default()
    });

    store.merge_secret_entries(HashMap::from([
        (
            "a.io".to_string(),
            RegistryConfiguration {
                registry_host: "a.io".to_string(),
                user: Some("from-secret".to_string()),
                secret: Some("pw".to_string()),
                ..RegistryConfiguration::default()
            },
        ),
        (
            "b.io".to_string(),
            RegistryConfiguration {
                registry_host: "b.io".to_string(),
                ..RegistryConfiguration::default()
            },
        ),
    ]));

    assert_eq!(store.len(), 2);
    let a = store.get("a.io").unwrap();
    assert_eq!(a.user.as_deref(), Some("explicit"));
    assert_eq!(a.secret.as_deref(), Some("pw"));
    assert!(store.get("b.io").is_ok());
}

#[test]
fn test_debug_masks_secret() {
    let configuration = RegistryConfiguration {
        registry_host: "h.io".to_string(),
        secret: Some("hunter2".to_string()),
        ..RegistryConfiguration::default()
    };
    let debug = format!("{:?}", configuration);
    assert!(!debug.contains("hunter2"));
    assert!(debug.contains("****"));
}
