use actix_web::dev::ServiceRequest;
use actix_web::web::Data;
use actix_web_httpauth::extractors::AuthenticationError;
use actix_web_httpauth::extractors::bearer::{BearerAuth, Config as BearerConfig};
use constant_time_eq::constant_time_eq;
use conveyor_config::SerializableSecretString;
use tracing::warn;

use crate::config::ApiConfig;

/// Validates the bearer token of a request against the configured API keys.
///
/// Every key in `api_keys` is accepted, which allows keys to be rotated
/// without downtime. Comparison is constant-time to avoid leaking key
/// material through response timing.
pub async fn auth_validator(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (actix_web::Error, ServiceRequest)> {
    let Some(config) = req.app_data::<Data<ApiConfig>>() else {
        warn!("api configuration missing from app data, rejecting request");
        return Err((AuthenticationError::from(BearerConfig::default()).into(), req));
    };

    if is_valid_key(&config.api_keys, credentials.token()) {
        Ok(req)
    } else {
        Err((AuthenticationError::from(BearerConfig::default()).into(), req))
    }
}

fn is_valid_key(api_keys: &[SerializableSecretString], token: &str) -> bool {
    api_keys
        .iter()
        .any(|key| constant_time_eq(key.expose_secret().as_bytes(), token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_configured_key_is_accepted() {
        let keys: Vec<SerializableSecretString> =
            vec!["old-key".to_owned().into(), "new-key".to_owned().into()];
        assert!(is_valid_key(&keys, "old-key"));
        assert!(is_valid_key(&keys, "new-key"));
        assert!(!is_valid_key(&keys, "unknown-key"));
    }

    #[test]
    fn empty_key_list_rejects_everything() {
        assert!(!is_valid_key(&[], ""));
        assert!(!is_valid_key(&[], "anything"));
    }
}
