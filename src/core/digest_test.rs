use super::digest::*;
use super::ConfigKey;
use super::ConfigRecord;
use super::Variant;

#[test]
fn digest_is_deterministic_fixed_length_lowercase_hex() {
    let a = digest_of("timeout=30");
    let b = digest_of("timeout=30");

    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
}

#[test]
fn digest_of_known_vector() {
    assert_eq!(
        digest_of("abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn different_content_gives_different_digest() {
    assert_ne!(digest_of("a=1"), digest_of("a=2"));
}

#[test]
fn not_found_sentinel_never_equals_a_real_digest() {
    assert_ne!(digest_of(""), NOT_FOUND_DIGEST);
    assert!(differs(&digest_of("x"), NOT_FOUND_DIGEST));
    assert!(!differs(NOT_FOUND_DIGEST, NOT_FOUND_DIGEST));
}

#[test]
fn differs_is_case_sensitive() {
    let d = digest_of("x");
    assert!(differs(&d.to_uppercase(), &d));
}

#[test]
fn digest_of_record_maps_missing_to_sentinel() {
    let record = ConfigRecord::new(ConfigKey::new("d", "g", ""), Variant::Formal, "v");
    assert_eq!(digest_of_record(Some(&record)), digest_of("v"));
    assert_eq!(digest_of_record(None), NOT_FOUND_DIGEST);
}

#[test]
fn set_content_recomputes_digest() {
    let mut record = ConfigRecord::new(ConfigKey::new("d", "g", ""), Variant::Formal, "v1");
    record.set_content("v2");
    assert_eq!(record.digest, digest_of("v2"));
}
