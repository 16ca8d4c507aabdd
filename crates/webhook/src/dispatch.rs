//! Verification rules and envelope construction.

use std::collections::HashMap;

use serde_json::Value;

use crate::provider::{Provider, ProviderConfig};

/// What a GET verification request should receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyAction {
    /// Echo this body with status 200 (the WhatsApp challenge).
    Challenge(String),
    /// Plain 200 OK.
    Ok,
    /// 403 Forbidden (handshake token mismatch).
    Forbidden,
}

/// Apply provider verification to a GET request's query params.
///
/// WhatsApp requires `hub.mode=subscribe` with a matching
/// `hub.verify_token`, answered by echoing `hub.challenge` verbatim. Every
/// other provider answers 200 on GET.
#[must_use]
pub fn verify_get(
    provider: Provider,
    config: &ProviderConfig,
    query: &HashMap<String, String>,
) -> VerifyAction {
    match provider {
        Provider::Whatsapp => {
            let mode = query.get("hub.mode").map(String::as_str);
            let token = query.get("hub.verify_token");
            let challenge = query.get("hub.challenge");
            match (mode, token, challenge) {
                (Some("subscribe"), Some(token), Some(challenge))
                    if Some(token) == config.verification_token.as_ref() =>
                {
                    VerifyAction::Challenge(challenge.clone())
                }
                _ => VerifyAction::Forbidden,
            }
        }
        Provider::Github | Provider::Stripe | Provider::Generic => VerifyAction::Ok,
    }
}

/// Does a generic delivery's `Authorization` header pass the configured
/// bearer token? Bindings without a token accept everything.
#[must_use]
pub fn bearer_authorized(config: &ProviderConfig, authorization: Option<&str>) -> bool {
    let Some(expected) = &config.token else {
        return true;
    };
    authorization
        .and_then(|header| header.strip_prefix("Bearer "))
        .is_some_and(|presented| presented == expected)
}

/// Build the initial envelope a webhook delivery seeds the starter with.
#[must_use]
pub fn build_envelope(
    path: &str,
    provider: Provider,
    config: &ProviderConfig,
    payload: Value,
    headers: &HashMap<String, String>,
    method: &str,
) -> Value {
    serde_json::json!({
        "webhook": {
            "data": {
                "path": path,
                "provider": provider,
                "providerConfig": config,
                "payload": payload,
                "headers": headers,
                "method": method,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn whatsapp_config() -> ProviderConfig {
        ProviderConfig {
            verification_token: Some("secret".into()),
            token: None,
        }
    }

    fn subscribe_query(token: &str) -> HashMap<String, String> {
        HashMap::from([
            ("hub.mode".to_owned(), "subscribe".to_owned()),
            ("hub.verify_token".to_owned(), token.to_owned()),
            ("hub.challenge".to_owned(), "challenge-123".to_owned()),
        ])
    }

    #[test]
    fn whatsapp_handshake_echoes_challenge() {
        let action = verify_get(
            Provider::Whatsapp,
            &whatsapp_config(),
            &subscribe_query("secret"),
        );
        assert_eq!(action, VerifyAction::Challenge("challenge-123".into()));
    }

    #[test]
    fn whatsapp_wrong_token_is_forbidden() {
        let action = verify_get(
            Provider::Whatsapp,
            &whatsapp_config(),
            &subscribe_query("wrong"),
        );
        assert_eq!(action, VerifyAction::Forbidden);
    }

    #[test]
    fn whatsapp_missing_mode_is_forbidden() {
        let mut query = subscribe_query("secret");
        query.remove("hub.mode");
        let action = verify_get(Provider::Whatsapp, &whatsapp_config(), &query);
        assert_eq!(action, VerifyAction::Forbidden);
    }

    #[test]
    fn other_providers_answer_ok_on_get() {
        for provider in [Provider::Github, Provider::Stripe, Provider::Generic] {
            let action = verify_get(provider, &ProviderConfig::default(), &HashMap::new());
            assert_eq!(action, VerifyAction::Ok, "provider {provider}");
        }
    }

    #[test]
    fn bearer_check() {
        let config = ProviderConfig {
            verification_token: None,
            token: Some("tok".into()),
        };
        assert!(bearer_authorized(&config, Some("Bearer tok")));
        assert!(!bearer_authorized(&config, Some("Bearer other")));
        assert!(!bearer_authorized(&config, Some("tok")));
        assert!(!bearer_authorized(&config, None));
        // No configured token accepts everything.
        assert!(bearer_authorized(&ProviderConfig::default(), None));
    }

    #[test]
    fn envelope_shape() {
        let headers = HashMap::from([("x-event".to_owned(), "push".to_owned())]);
        let envelope = build_envelope(
            "hooks/gh",
            Provider::Github,
            &ProviderConfig::default(),
            serde_json::json!({"action": "opened"}),
            &headers,
            "POST",
        );
        let data = &envelope["webhook"]["data"];
        assert_eq!(data["path"], "hooks/gh");
        assert_eq!(data["provider"], "github");
        assert_eq!(data["payload"]["action"], "opened");
        assert_eq!(data["headers"]["x-event"], "push");
        assert_eq!(data["method"], "POST");
    }
}
