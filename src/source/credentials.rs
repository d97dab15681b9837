use crate::config::SourceConfig;
use reqwest::RequestBuilder;
use std::fmt;

/// Credential attached to source and download requests
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { user: String, token: String },
    Bearer { token: String },
}

impl Credentials {
    /// Basic with a non-empty `email`, Bearer otherwise
    pub fn from_config(config: &SourceConfig) -> Self {
        if config.email.trim().is_empty() {
            Self::Bearer {
                token: config.api_token.clone(),
            }
        } else {
            Self::Basic {
                user: config.email.trim().to_string(),
                token: config.api_token.clone(),
            }
        }
    }

    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Basic { user, token } => request.basic_auth(user, Some(token)),
            Self::Bearer { token } => request.bearer_auth(token),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { user, .. } => f
                .debug_struct("Basic")
                .field("user", user)
                .field("token", &"<redacted>")
                .finish(),
            Self::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}
