//! Attacker-accumulated identity facts.
//!
//! A profile serializes to `&`-joined `key.value` tokens, for example
//! `username.Alice&id.123&roles.Doctor&ip.local`. The same dotted form is what
//! preconditions use as profile symbols.

use crate::error::ProfileParseError;
use crate::precondition::Truth;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Username of the anonymous profile every episode starts with.
pub const ANONYMOUS_USERNAME: &str = "NoAuth";

/// Locality marker value unlocked by `ip.local` leaks.
pub const LOCAL_IP: &str = "local";

static PROFILE_SYMBOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(username|id|roles|ip)\.([^.&\s]+)$").unwrap());

/// Field of a profile addressable from a dotted symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileField {
    Username,
    Id,
    Roles,
    Ip,
}

impl ProfileField {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "username" => Some(ProfileField::Username),
            "id" => Some(ProfileField::Id),
            "roles" => Some(ProfileField::Roles),
            "ip" => Some(ProfileField::Ip),
            _ => None,
        }
    }
}

/// Split a `field.value` symbol when it addresses a profile field.
pub fn split_profile_symbol(symbol: &str) -> Option<(ProfileField, &str)> {
    let caps = PROFILE_SYMBOL_RE.captures(symbol)?;
    let field = ProfileField::from_key(caps.get(1)?.as_str())?;
    Some((field, caps.get(2)?.as_str()))
}

pub fn is_profile_symbol(symbol: &str) -> bool {
    split_profile_symbol(symbol).is_some()
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub roles: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

impl Profile {
    pub fn anonymous() -> Self {
        Profile {
            username: Some(ANONYMOUS_USERNAME.to_string()),
            ..Default::default()
        }
    }

    pub fn with_username(username: impl Into<String>) -> Self {
        Profile {
            username: Some(username.into()),
            ..Default::default()
        }
    }

    pub fn is_local(&self) -> bool {
        self.ip.as_deref() == Some(LOCAL_IP)
    }

    /// The same profile with its locality marker replaced.
    pub fn with_locality(&self, local: bool) -> Self {
        Profile {
            ip: local.then(|| LOCAL_IP.to_string()),
            ..self.clone()
        }
    }

    /// Number of facts held: scalar fields set plus roles.
    pub fn fact_count(&self) -> usize {
        [&self.username, &self.id, &self.ip]
            .iter()
            .filter(|f| f.is_some())
            .count()
            + self.roles.len()
    }

    /// Fill blank fields and union roles from `other`.
    ///
    /// Known fields are never overwritten. Returns how many facts were new,
    /// so merging the same facts twice returns zero the second time.
    pub fn merge(&mut self, other: &Profile) -> usize {
        let mut added = 0;
        for (mine, theirs) in [
            (&mut self.username, &other.username),
            (&mut self.id, &other.id),
            (&mut self.ip, &other.ip),
        ] {
            if mine.is_none()
                && let Some(value) = theirs
            {
                *mine = Some(value.clone());
                added += 1;
            }
        }
        for role in &other.roles {
            if self.roles.insert(role.clone()) {
                added += 1;
            }
        }
        added
    }

    /// Resolve a dotted profile symbol against this profile.
    ///
    /// Returns `Unknown` for symbols that do not address a profile field.
    pub fn resolve(&self, symbol: &str) -> Truth {
        match split_profile_symbol(symbol) {
            Some((ProfileField::Username, v)) => (self.username.as_deref() == Some(v)).into(),
            Some((ProfileField::Id, v)) => (self.id.as_deref() == Some(v)).into(),
            Some((ProfileField::Roles, v)) => self.roles.contains(v).into(),
            Some((ProfileField::Ip, v)) => (self.ip.as_deref() == Some(v)).into(),
            None => Truth::Unknown,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens = Vec::new();
        if let Some(u) = &self.username {
            tokens.push(format!("username.{}", u));
        }
        if let Some(id) = &self.id {
            tokens.push(format!("id.{}", id));
        }
        for role in &self.roles {
            tokens.push(format!("roles.{}", role));
        }
        if let Some(ip) = &self.ip {
            tokens.push(format!("ip.{}", ip));
        }
        f.write_str(&tokens.join("&"))
    }
}

impl FromStr for Profile {
    type Err = ProfileParseError;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        let err = |message: String| ProfileParseError {
            descriptor: descriptor.to_string(),
            message,
        };

        let mut profile = Profile::default();
        for token in descriptor.split('&').map(str::trim) {
            let (field, value) = split_profile_symbol(token)
                .ok_or_else(|| err(format!("'{}' is not a field.value token", token)))?;
            let slot = match field {
                ProfileField::Roles => {
                    profile.roles.insert(value.to_string());
                    continue;
                }
                ProfileField::Username => &mut profile.username,
                ProfileField::Id => &mut profile.id,
                ProfileField::Ip => &mut profile.ip,
            };
            if slot.as_deref().is_some_and(|existing| existing != value) {
                return Err(err(format!("conflicting values for '{}'", token)));
            }
            *slot = Some(value.to_string());
        }
        Ok(profile)
    }
}
