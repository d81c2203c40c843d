use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;

pub const TOKEN_PARAM: &str = "token";
pub const EXPIRES_PARAM: &str = "expires";

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature")] Missing,
    #[error("invalid signature")] Invalid,
    #[error("expired")] Expired,
}

// Path plus sorted parameters, excluding the token itself.
fn canonical_string(path: &str, params: &BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = params
        .iter()
        .filter(|(k, _)| k.as_str() != TOKEN_PARAM)
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    format!("/{}?{}", path.trim_start_matches('/'), pairs.join("&"))
}

fn mac_for(path: &str, params: &BTreeMap<String, String>, secret: &str) -> Result<Hmac<Sha256>, SignatureError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Invalid)?;
    mac.update(canonical_string(path, params).as_bytes());
    Ok(mac)
}

/// Adds `expires` and `token` to `params` so the URL stays valid until
/// `expires_at` (unix seconds).
pub fn sign_params(
    path: &str,
    params: &mut BTreeMap<String, String>,
    secret: &str,
    expires_at: i64,
) -> Result<(), SignatureError> {
    params.insert(EXPIRES_PARAM.to_string(), expires_at.to_string());
    let mac = mac_for(path, params, secret)?;
    params.insert(TOKEN_PARAM.to_string(), hex::encode(mac.finalize().into_bytes()));
    Ok(())
}

/// Checks a signed URL's token and expiry.
pub fn verify_url_token(
    path: &str,
    params: &BTreeMap<String, String>,
    secret: &str,
) -> Result<(), SignatureError> {
    let token = params.get(TOKEN_PARAM).filter(|t| !t.is_empty()).ok_or(SignatureError::Missing)?;

    if let Some(ts) = params.get(EXPIRES_PARAM) {
        let epoch = ts.parse::<i64>().map_err(|_| SignatureError::Invalid)?;
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        if epoch < now { return Err(SignatureError::Expired); }
    }

    let expected = hex::decode(token).map_err(|_| SignatureError::Invalid)?;
    mac_for(path, params, secret)?
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn future() -> i64 {
        time::OffsetDateTime::now_utc().unix_timestamp() + 600
    }

    #[test]
    fn signed_params_verify() {
        let mut params = BTreeMap::new();
        params.insert("width".to_string(), "400".to_string());
        sign_params("logos/a.png", &mut params, "s", future()).unwrap();
        assert_eq!(params[TOKEN_PARAM].len(), 64);
        assert!(verify_url_token("logos/a.png", &params, "s").is_ok());
        // Leading slash is not significant.
        assert!(verify_url_token("/logos/a.png", &params, "s").is_ok());
    }

    #[test]
    fn tampered_params_are_rejected() {
        let mut params = BTreeMap::new();
        params.insert("width".to_string(), "400".to_string());
        sign_params("logos/a.png", &mut params, "s", future()).unwrap();

        let mut tampered = params.clone();
        tampered.insert("width".to_string(), "4000".to_string());
        assert!(matches!(verify_url_token("logos/a.png", &tampered, "s"), Err(SignatureError::Invalid)));
        assert!(matches!(verify_url_token("logos/b.png", &params, "s"), Err(SignatureError::Invalid)));
        assert!(matches!(verify_url_token("logos/a.png", &params, "other"), Err(SignatureError::Invalid)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut params = BTreeMap::new();
        sign_params("a.png", &mut params, "s", 1_000_000_000).unwrap();
        assert!(matches!(verify_url_token("a.png", &params, "s"), Err(SignatureError::Expired)));
    }

    #[test]
    fn missing_token_is_rejected() {
        let params = BTreeMap::new();
        assert!(matches!(verify_url_token("a.png", &params, "s"), Err(SignatureError::Missing)));
    }
}
