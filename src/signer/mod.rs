//! Request authentication strategies.
//!
//! Two mutually exclusive paths: generic header injection for
//! Bearer/Basic/API-key credentials, and canonical-request HMAC-SHA256
//! signing for the one provider family that requires it. The strategy is
//! selected once per call from the credentials shape.

pub mod canonical;
pub mod headers;

use tracing::warn;

use crate::config::Credentials;
pub use canonical::HmacConfig;

/// How one request authenticates.
#[derive(Debug, Clone)]
pub enum SignerStrategy {
    /// Generic header injection (Bearer, Basic, custom API-key header).
    Headers,
    /// Canonical HMAC-SHA256 request signing.
    Canonical(HmacConfig),
    /// Credentials declared HMAC signing but the config was incomplete;
    /// the request proceeds unsigned and the provider rejects it with an
    /// ordinary auth error.
    Unsigned,
}

impl SignerStrategy {
    /// Inspect the credentials shape once and pick the strategy.
    pub fn select(credentials: &Credentials) -> Self {
        if !canonical::declares_hmac(credentials) {
            return Self::Headers;
        }
        match HmacConfig::from_credentials(credentials) {
            Some(config) => Self::Canonical(config),
            None => {
                warn!("credentials declare HMAC signing but are incomplete; sending unsigned");
                Self::Unsigned
            }
        }
    }
}
