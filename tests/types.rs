// ABOUTME: Integration tests for type-safe identifiers and validated types.
// ABOUTME: Tests parsing, validation, and wire format of the domain types.

use convoy::types::*;
use std::collections::HashSet;

mod image_ref_tests {
    use super::*;

    #[test]
    fn parse_simple_name() {
        let img = ImageRef::parse("nginx").unwrap();
        assert_eq!(img.repository(), "nginx");
        assert_eq!(img.tag(), Some("latest"));
        assert!(img.digest().is_none());
        assert_eq!(img.to_string(), "nginx");
    }

    #[test]
    fn parse_with_registry_and_port() {
        let img = ImageRef::parse("registry.local:5000/org/app:v1.2.3").unwrap();
        assert_eq!(img.repository(), "registry.local:5000/org/app");
        assert_eq!(img.short_name(), "app");
        assert_eq!(img.tag(), Some("v1.2.3"));
    }

    #[test]
    fn registry_port_without_tag() {
        let img = ImageRef::parse("registry.local:5000/app").unwrap();
        assert_eq!(img.repository(), "registry.local:5000/app");
        assert_eq!(img.tag(), Some("latest"));
    }

    #[test]
    fn parse_with_digest() {
        let img = ImageRef::parse("app:v1@sha256:abc123").unwrap();
        assert_eq!(img.tag(), Some("v1"));
        assert_eq!(img.digest(), Some("sha256:abc123"));
        assert_eq!(img.to_string(), "app:v1@sha256:abc123");
    }

    #[test]
    fn from_parts_builds_tagged_reference() {
        let img = ImageRef::from_parts("web", "0123456789ab").unwrap();
        assert_eq!(img.to_string(), "web:0123456789ab");
        assert!(ImageRef::from_parts("web", "").is_err());
    }

    #[test]
    fn rejects_malformed_references() {
        assert_eq!(ImageRef::parse("   "), Err(ParseImageRefError::Empty));
        assert_eq!(
            ImageRef::parse("app name"),
            Err(ParseImageRefError::InvalidChar(' '))
        );
        assert!(matches!(
            ImageRef::parse("app@"),
            Err(ParseImageRefError::InvalidFormat(_))
        ));
        assert!(matches!(
            ImageRef::parse("org//app"),
            Err(ParseImageRefError::InvalidFormat(_))
        ));
        assert!(matches!(
            ImageRef::parse(":v1"),
            Err(ParseImageRefError::InvalidFormat(_))
        ));
    }
}

mod container_name_tests {
    use super::*;

    #[test]
    fn accepts_docker_style_names() {
        for name in ["web", "web_1.blue-2", "9lives"] {
            assert_eq!(ContainerName::new(name).unwrap().as_str(), name);
        }
    }

    #[test]
    fn rejects_bad_names() {
        assert_eq!(ContainerName::new(""), Err(ContainerNameError::Empty));
        assert_eq!(
            ContainerName::new("_web"),
            Err(ContainerNameError::InvalidStart)
        );
        assert_eq!(
            ContainerName::new("web/app"),
            Err(ContainerNameError::InvalidChar('/'))
        );
        assert_eq!(
            ContainerName::new(&"a".repeat(129)),
            Err(ContainerNameError::TooLong)
        );
    }

    #[test]
    fn canary_sibling_is_itself_valid() {
        let name = ContainerName::new(&"a".repeat(100)).unwrap();
        let canary = name.canary();
        assert!(canary.as_str().ends_with("-canary"));
        assert!(ContainerName::new(canary.as_str()).is_ok());
    }
}

mod id_tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = DeploymentId::new("dep-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""dep-42""#);

        let back: TargetId = serde_json::from_str(r#""web-1""#).unwrap();
        assert_eq!(back.as_str(), "web-1");
        assert_eq!(back.to_string(), "web-1");
    }

    #[test]
    fn ids_hash_and_compare_by_value() {
        let mut set = HashSet::new();
        set.insert(TargetId::new("web-1"));
        set.insert(TargetId::from("web-1"));
        set.insert(TargetId::from("web-2".to_string()));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn empty_ids_are_detectable() {
        assert!(ContainerId::new("").is_empty());
        assert_eq!(ContainerId::new("abc").into_inner(), "abc");
    }
}
