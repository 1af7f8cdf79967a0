// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Actor URIs: `streamlib://host/ClassName/instance_id`.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

pub const ACTOR_SCHEME: &str = "streamlib";

/// Host used for actors living in this process.
pub const LOCAL_HOST: &str = "local";

/// Which part of an actor URI failed to parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UriError {
    #[error("'{0}': missing '://' after scheme")]
    MissingScheme(String),

    #[error("'{uri}': scheme must be '{expected}', got '{found}'")]
    InvalidScheme {
        uri: String,
        expected: &'static str,
        found: String,
    },

    #[error("'{0}': host is empty or contains whitespace")]
    InvalidHost(String),

    #[error("'{uri}': class name '{class_name}' must match [A-Za-z][A-Za-z0-9]*")]
    InvalidClassName { uri: String, class_name: String },

    #[error("'{uri}': instance id '{instance_id}' must match [A-Za-z0-9_-]+")]
    InvalidInstanceId { uri: String, instance_id: String },

    #[error("'{0}': expected scheme://host/ClassName/instance_id")]
    InvalidShape(String),
}

pub(crate) fn is_valid_class_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

pub(crate) fn is_valid_instance_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorUri {
    host: String,
    class_name: String,
    instance_id: String,
}

impl ActorUri {
    pub fn new(
        host: impl Into<String>,
        class_name: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> std::result::Result<Self, UriError> {
        let uri = Self {
            host: host.into(),
            class_name: class_name.into(),
            instance_id: instance_id.into(),
        };
        uri.validate()?;
        Ok(uri)
    }

    /// URI for an actor in this process.
    pub fn local(
        class_name: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> std::result::Result<Self, UriError> {
        Self::new(LOCAL_HOST, class_name, instance_id)
    }

    fn validate(&self) -> std::result::Result<(), UriError> {
        if self.host.is_empty() || self.host.chars().any(char::is_whitespace) {
            return Err(UriError::InvalidHost(self.to_string()));
        }
        if !is_valid_class_name(&self.class_name) {
            return Err(UriError::InvalidClassName {
                uri: self.to_string(),
                class_name: self.class_name.clone(),
            });
        }
        if !is_valid_instance_id(&self.instance_id) {
            return Err(UriError::InvalidInstanceId {
                uri: self.to_string(),
                instance_id: self.instance_id.clone(),
            });
        }
        Ok(())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// `local`, `localhost` or a loopback address.
    pub fn is_local(&self) -> bool {
        if self.host.eq_ignore_ascii_case(LOCAL_HOST)
            || self.host.eq_ignore_ascii_case("localhost")
        {
            return true;
        }
        // Bracketed IPv6 literals: [::1]
        let host = self
            .host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host);
        host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
    }

    /// Same actor named with the canonical local host.
    pub fn to_local(&self) -> Self {
        Self {
            host: LOCAL_HOST.to_string(),
            class_name: self.class_name.clone(),
            instance_id: self.instance_id.clone(),
        }
    }
}

impl fmt::Display for ActorUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}/{}/{}",
            ACTOR_SCHEME, self.host, self.class_name, self.instance_id
        )
    }
}

impl FromStr for ActorUri {
    type Err = UriError;

    fn from_str(s: &str) -> std::result::Result<Self, UriError> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| UriError::MissingScheme(s.to_string()))?;

        if scheme != ACTOR_SCHEME {
            return Err(UriError::InvalidScheme {
                uri: s.to_string(),
                expected: ACTOR_SCHEME,
                found: scheme.to_string(),
            });
        }

        let segments: Vec<&str> = rest.split('/').collect();
        let [host, class_name, instance_id] = segments.as_slice() else {
            return Err(UriError::InvalidShape(s.to_string()));
        };

        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(UriError::InvalidHost(s.to_string()));
        }
        if !is_valid_class_name(class_name) {
            return Err(UriError::InvalidClassName {
                uri: s.to_string(),
                class_name: class_name.to_string(),
            });
        }
        if !is_valid_instance_id(instance_id) {
            return Err(UriError::InvalidInstanceId {
                uri: s.to_string(),
                instance_id: instance_id.to_string(),
            });
        }

        Ok(Self {
            host: host.to_string(),
            class_name: class_name.to_string(),
            instance_id: instance_id.to_string(),
        })
    }
}
