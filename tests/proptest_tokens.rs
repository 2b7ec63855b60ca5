//! Property-based tests for access and refresh tokens
//!
//! These tests verify:
//! - Issued tokens always validate back to the same subject
//! - Flipping any single signature character is always detected
//! - Malformed input never causes panics
//! - Secret length policy is enforced at the boundary

use std::sync::Arc;

use chrono::Duration;
use commerce_auth::error::{ConfigError, Error, TokenError};
use commerce_auth::{
    AccessTokenCodec, Clock, ManualClock, OsRandomSource, RefreshTokenCodec, SecretPolicy, UserId,
};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Generate user ids from arbitrary bytes
fn arb_user_id() -> impl Strategy<Value = UserId> {
    any::<[u8; 16]>().prop_map(|bytes| UserId(uuid::Uuid::from_bytes(bytes)))
}

/// Generate printable secrets of at least 32 characters
fn arb_valid_secret() -> impl Strategy<Value = String> {
    prop::collection::vec(any::<u8>(), 32..64)
        .prop_map(|bytes| bytes.iter().map(|b| (b % 94 + 33) as char).collect())
}

/// Generate printable secrets shorter than 32 characters
fn arb_short_secret() -> impl Strategy<Value = String> {
    prop::collection::vec(any::<u8>(), 1..32)
        .prop_map(|bytes| bytes.iter().map(|b| (b % 94 + 33) as char).collect())
}

/// Generate malformed refresh tokens
fn arb_malformed_refresh() -> impl Strategy<Value = String> {
    prop_oneof![
        // No separators
        "[a-zA-Z0-9_-]{0,60}",
        // Too few segments
        "[a-z0-9-]{1,36}:[a-z0-9]{1,20}",
        // Too many segments
        "[a-z0-9-]{1,36}:[a-z0-9]{1,20}:[a-f0-9]{1,64}:[a-z]{1,5}",
        // Non-uuid first segment
        "[g-z]{1,20}:[a-z0-9]{1,20}:[a-f0-9]{64}",
        Just("::".to_string()),
        Just(":".to_string()),
        Just("".to_string()),
    ]
}

fn access_codec() -> (AccessTokenCodec, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let codec = AccessTokenCodec::new("commerce-api", "commerce-web").with_clock(clock.clone());
    (codec, clock)
}

fn refresh_codec(secret: &str) -> RefreshTokenCodec {
    RefreshTokenCodec::new(secret, SecretPolicy::default(), Arc::new(OsRandomSource))
}

// ============================================================================
// Secret Policy Properties
// ============================================================================

proptest! {
    /// Property: Secrets of 32+ characters are accepted
    #[test]
    fn valid_secrets_accepted(secret in arb_valid_secret()) {
        prop_assert!(SecretPolicy::default().check("secret", &secret).is_ok());
    }

    /// Property: Secrets shorter than 32 characters are rejected with "too short"
    #[test]
    fn short_secrets_rejected(secret in arb_short_secret()) {
        let err = SecretPolicy::default().check("secret", &secret).unwrap_err();
        let is_too_short = matches!(err, Error::Config(ConfigError::SecretTooShort { .. }));
        prop_assert!(is_too_short);
        prop_assert!(err.to_string().contains("too short"));
    }
}

// ============================================================================
// Access Token Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: issue -> validate returns the subject and embeds the expiry
    #[test]
    fn access_roundtrip(
        subject in "[a-zA-Z0-9_-]{1,40}",
        secret in arb_valid_secret(),
        ttl_secs in 1i64..86_400,
    ) {
        let (codec, clock) = access_codec();
        let exp = clock.now() + Duration::seconds(ttl_secs);

        let token = codec.issue(&subject, &secret, exp).unwrap();
        let claims = codec.validate(&token, &secret).unwrap();

        prop_assert_eq!(claims.sub, subject);
        prop_assert_eq!(claims.exp, exp.timestamp());
    }

    /// Property: flipping any signature character makes validation fail
    #[test]
    fn access_signature_tamper_detected(
        secret in arb_valid_secret(),
        position in any::<prop::sample::Index>(),
    ) {
        let (codec, clock) = access_codec();
        let token = codec
            .issue("user", &secret, clock.now() + Duration::minutes(5))
            .unwrap();

        let sig_start = token.rfind('.').unwrap() + 1;
        let sig_len = token.len() - sig_start;
        let idx = sig_start + position.index(sig_len);

        let mut bytes = token.into_bytes();
        bytes[idx] = if bytes[idx] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        let result = codec.validate(&tampered, &secret);
        prop_assert!(matches!(result, Err(Error::Token(TokenError::Malformed(_)))));
    }

    /// Property: arbitrary strings never panic the access validator
    #[test]
    fn access_garbage_never_panics(input in ".{0,200}") {
        let (codec, _) = access_codec();
        let secret = "thisisaverylongsecretkeythatexceedslimit";
        prop_assert!(codec.validate(&input, secret).is_err());
    }
}

// ============================================================================
// Refresh Token Properties
// ============================================================================

proptest! {
    /// Property: issue -> validate returns the same user id
    #[test]
    fn refresh_roundtrip(user_id in arb_user_id(), secret in arb_valid_secret()) {
        let codec = refresh_codec(&secret);
        let token = codec.issue(&user_id).unwrap();
        prop_assert_eq!(codec.validate(&token).unwrap(), user_id);
    }

    /// Property: changing any single signature hex digit is detected
    #[test]
    fn refresh_signature_tamper_detected(
        user_id in arb_user_id(),
        position in 0usize..64,
    ) {
        let codec = refresh_codec("thisisaverylongsecretkeythatexceedslimit");
        let token = codec.issue(&user_id).unwrap();

        let sig_start = token.rfind(':').unwrap() + 1;
        let idx = sig_start + position;
        let mut bytes = token.into_bytes();
        bytes[idx] = if bytes[idx] == b'0' { b'1' } else { b'0' };
        let tampered = String::from_utf8(bytes).unwrap();

        let result = codec.validate(&tampered);
        prop_assert!(matches!(result, Err(Error::Token(TokenError::InvalidSignature))));
    }

    /// Property: malformed tokens fail with a format error and never panic
    #[test]
    fn refresh_malformed_rejected(input in arb_malformed_refresh()) {
        let codec = refresh_codec("thisisaverylongsecretkeythatexceedslimit");
        let result = codec.validate(&input);
        prop_assert!(matches!(result, Err(Error::Token(TokenError::InvalidFormat(_)))));
    }

    /// Property: arbitrary strings never panic the refresh validator
    #[test]
    fn refresh_garbage_never_panics(input in ".{0,200}") {
        let codec = refresh_codec("thisisaverylongsecretkeythatexceedslimit");
        let _ = codec.validate(&input);
    }
}
