//! Webhook providers and their configuration.

use serde::{Deserialize, Serialize};

/// The webhook providers with dedicated semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Meta's WhatsApp Business API; GET subscribe handshake.
    Whatsapp,
    /// GitHub; no pre-verification.
    Github,
    /// Stripe; no pre-verification.
    Stripe,
    /// Anything else; optional bearer-token check on delivery.
    Generic,
}

impl Provider {
    /// The provider's wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Whatsapp => "whatsapp",
            Self::Github => "github",
            Self::Stripe => "stripe",
            Self::Generic => "generic",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-binding provider settings, carried verbatim into the envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// The token the WhatsApp handshake must echo-match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_token: Option<String>,
    /// The bearer token generic deliveries must present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}
