use std::time::Duration;

use kbsync_core::{ConverterKind, ExportSettings, SettingsError};
use pretty_assertions::assert_eq;

fn settings(domain: &str, key: &str) -> ExportSettings {
    ExportSettings {
        domain: domain.to_string(),
        api_key: key.to_string(),
        ..ExportSettings::default()
    }
}

#[test]
fn defaults_match_documented_values() {
    let defaults = ExportSettings::default();
    assert_eq!(defaults.page_size, 100);
    assert_eq!(defaults.request_delay, Duration::from_millis(500));
    assert!(defaults.backup_on_change);
    assert!(!defaults.generate_pdf);
    assert!(!defaults.published_only);
    assert_eq!(defaults.converter, ConverterKind::Builtin);
    assert!(defaults
        .attachment_patterns
        .iter()
        .any(|p| p == "/helpdesk/attachments/"));
}

#[test]
fn domain_with_scheme_is_normalized() {
    let validated = settings("https://acme.freshservice.com/", "abc123")
        .validated()
        .unwrap();
    assert_eq!(validated.domain, "acme.freshservice.com");
    assert_eq!(validated.api_base(), "https://acme.freshservice.com/api/v2");
    assert_eq!(validated.site_base(), "https://acme.freshservice.com");
}

#[test]
fn missing_credentials_are_rejected() {
    assert_eq!(
        settings("", "abc").validated().unwrap_err(),
        SettingsError::MissingDomain
    );
    assert_eq!(
        settings("acme.freshservice.com", "  ").validated().unwrap_err(),
        SettingsError::MissingApiKey
    );
}

#[test]
fn placeholder_keys_are_rejected() {
    for key in ["YOUR_API_KEY", "changeme", "xxxxxxxx"] {
        assert_eq!(
            settings("acme.freshservice.com", key).validated().unwrap_err(),
            SettingsError::PlaceholderApiKey,
            "key {key} should be rejected"
        );
    }
}

#[test]
fn domain_with_path_is_rejected() {
    let err = settings("acme.freshservice.com/support", "abc")
        .validated()
        .unwrap_err();
    assert_eq!(
        err,
        SettingsError::InvalidDomain("acme.freshservice.com/support".to_string())
    );
}

#[test]
fn page_size_is_bounded() {
    let mut s = settings("acme.freshservice.com", "abc");
    s.page_size = 0;
    assert_eq!(s.clone().validated().unwrap_err(), SettingsError::PageSize(0));
    s.page_size = 101;
    assert_eq!(s.validated().unwrap_err(), SettingsError::PageSize(101));
}

#[test]
fn converter_names_parse_case_insensitively() {
    assert_eq!("Pandoc".parse::<ConverterKind>(), Ok(ConverterKind::Pandoc));
    assert_eq!(" builtin ".parse::<ConverterKind>(), Ok(ConverterKind::Builtin));
    assert!("markdownify".parse::<ConverterKind>().is_err());
}
