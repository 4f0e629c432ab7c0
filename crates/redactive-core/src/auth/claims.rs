use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::Deserialize;

use super::AuthError;

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    email: Option<String>,
}

/// Read the `email` claim from an id token's payload segment.
///
/// The signature is not verified and expiry is not checked: the result is a local,
/// best-effort read and never proof of a valid session.
pub fn email_from_id_token(id_token: &str) -> Result<Option<String>, AuthError> {
    let payload = id_token
        .split('.')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| AuthError::MalformedIdToken("missing payload segment".into()))?;

    let bytes = URL_SAFE_LENIENT
        .decode(payload)
        .or_else(|_| STANDARD_LENIENT.decode(payload))
        .map_err(|err| AuthError::MalformedIdToken(err.to_string()))?;

    let claims: IdTokenClaims = serde_json::from_slice(&bytes)?;
    Ok(claims.email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

    fn token_with_payload(payload: &str, engine: &GeneralPurpose) -> String {
        format!("header.{}.signature", engine.encode(payload))
    }

    #[test]
    fn reads_email_from_url_safe_payload() {
        let token = token_with_payload(r#"{"email":"user@example.com"}"#, &URL_SAFE_NO_PAD);
        assert_eq!(
            email_from_id_token(&token).unwrap().as_deref(),
            Some("user@example.com")
        );
    }

    #[test]
    fn reads_email_from_padded_standard_payload() {
        let token = token_with_payload(r#"{"email":"a@b.io","sub":"1"}"#, &STANDARD);
        assert_eq!(email_from_id_token(&token).unwrap().as_deref(), Some("a@b.io"));
    }

    #[test]
    fn missing_email_claim_is_none() {
        let token = token_with_payload(r#"{"sub":"user-1"}"#, &URL_SAFE_NO_PAD);
        assert_eq!(email_from_id_token(&token).unwrap(), None);
    }

    #[test]
    fn token_without_payload_is_malformed() {
        let err = email_from_id_token("not-a-jwt").unwrap_err();
        assert!(matches!(err, AuthError::MalformedIdToken(_)));
    }
}
