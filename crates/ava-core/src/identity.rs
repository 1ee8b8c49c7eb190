//! Claimed-identity extraction from bearer tokens.
//!
//! [`extract_email`] only *reads* the payload segment of a token. It performs no
//! signature, expiry or audience checks. Anything that needs an authorization
//! guarantee must have the token re-validated by the record store's own auth
//! layer (see `AuthContext`), which is what happens when the token is forwarded
//! with a lookup. Inside this crate the extracted email is used for best-effort
//! personalisation only.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use serde_json::Value;
use tracing::debug;

/// Read the `email` claim from a `header.payload.signature` token.
///
/// Every malformed input (segment count, base64, JSON, missing or non-string
/// claim) yields `None`.
pub fn extract_email(token: &str) -> Option<String> {
    let claims = decode_claims(token)?;
    let email = claims
        .get("email")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())?;
    Some(email.to_string())
}

/// Strip an optional `Bearer ` scheme from an `Authorization` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let trimmed = header_value.trim();
    let token = match trimmed.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        Some(_) => return None,
        None if trimmed.eq_ignore_ascii_case("bearer") => return None,
        None => trimmed,
    };
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn decode_claims(token: &str) -> Option<Value> {
    let mut parts = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        debug!(
            target: "ava::identity",
            token_len = token.len(),
            "token does not have three segments"
        );
        return None;
    };
    let bytes = match decode_segment(payload) {
        Some(bytes) => bytes,
        None => {
            debug!(target: "ava::identity", "token payload is not base64");
            return None;
        }
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(value @ Value::Object(_)) => Some(value),
        Ok(_) => None,
        Err(err) => {
            debug!(target: "ava::identity", error = %err, "token payload is not JSON");
            None
        }
    }
}

/// Accepts both the url-safe and standard alphabets, padded or not.
fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    let normalized: String = segment
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    if normalized.is_empty() {
        return None;
    }
    STANDARD_NO_PAD.decode(normalized.as_bytes()).ok()
}

/// Mask an email for logs: `jane.doe@x.com` becomes `j***@x.com`.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{first}***@{domain}")
        }
        None => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn token_with(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(payload.as_bytes())
        )
    }

    #[test]
    fn reads_email_claim() {
        let token = token_with(r#"{"email":"x@y.com","sub":"123"}"#);
        assert_eq!(extract_email(&token).as_deref(), Some("x@y.com"));
    }

    #[test]
    fn accepts_padded_standard_base64() {
        let payload = base64::engine::general_purpose::STANDARD.encode(r#"{"email":"x@y.com"}"#);
        let token = format!("a.{payload}.c");
        assert_eq!(extract_email(&token).as_deref(), Some("x@y.com"));
    }

    #[test]
    fn decodes_url_safe_alphabet() {
        assert_eq!(decode_segment("-_8"), Some(vec![0xfb, 0xff]));
        assert_eq!(decode_segment("+/8="), Some(vec![0xfb, 0xff]));
        assert_eq!(decode_segment(""), None);
    }

    #[test]
    fn malformed_tokens_yield_none() {
        assert_eq!(extract_email("not-a-token"), None);
        assert_eq!(extract_email("a.b"), None);
        assert_eq!(extract_email("a.b.c.d"), None);
        assert_eq!(extract_email("a.!!!.c"), None);
        assert_eq!(extract_email(&token_with("not json")), None);
        assert_eq!(extract_email(&token_with(r#"{"sub":"1"}"#)), None);
        assert_eq!(extract_email(&token_with(r#"{"email":42}"#)), None);
        assert_eq!(extract_email(&token_with(r#"{"email":"  "}"#)), None);
        assert_eq!(extract_email(&token_with(r#"["x@y.com"]"#)), None);
    }

    #[test]
    fn bearer_prefix_is_optional() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer   abc"), Some("abc"));
        assert_eq!(bearer_token("abc"), Some("abc"));
        assert_eq!(bearer_token("Basic dXNlcg=="), None);
        assert_eq!(bearer_token("Bearer "), None);
    }

    #[test]
    fn masks_local_part() {
        assert_eq!(mask_email("jane.doe@x.com"), "j***@x.com");
        assert_eq!(mask_email("nobody"), "***");
    }
}
