//! Actor identification and permission rules.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::Error;

/// The authenticated caller, as a free-form object such as `{"id": "user"}`.
pub(crate) type Actor = serde_json::Map<String, Value>;

/// A permission rule.
///
/// In configuration, `true` and `false` allow or deny everyone, and a table is
/// an allow block matched against the actor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawPermission")]
pub(crate) enum Permission {
    AllowAll,
    DenyAll,
    AllowIf(AllowRule),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPermission {
    Flag(bool),
    Rule(AllowRule),
}

impl From<RawPermission> for Permission {
    fn from(raw: RawPermission) -> Self {
        match raw {
            RawPermission::Flag(true) => Self::AllowAll,
            RawPermission::Flag(false) => Self::DenyAll,
            RawPermission::Rule(rule) => Self::AllowIf(rule),
        }
    }
}

impl Permission {
    pub(crate) fn allows(&self, actor: Option<&Actor>) -> bool {
        match self {
            Self::AllowAll => true,
            Self::DenyAll => false,
            Self::AllowIf(rule) => rule.matches(actor),
        }
    }
}

/// An allow block: `key -> value | [values]`.
///
/// The actor matches when, for any key, one of its values for that key is
/// listed. `"*"` matches any actor carrying the key, and
/// `unauthenticated = true` matches the absence of an actor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub(crate) struct AllowRule(BTreeMap<String, Value>);

impl AllowRule {
    pub(crate) fn matches(&self, actor: Option<&Actor>) -> bool {
        let Some(actor) = actor else {
            return self.0.get("unauthenticated") == Some(&Value::Bool(true));
        };
        self.0.iter().any(|(key, allowed)| {
            let Some(actual) = actor.get(key) else {
                return false;
            };
            if allowed.as_str() == Some("*") {
                return true;
            }
            let allowed = as_list(allowed);
            as_list(actual).iter().any(|value| allowed.contains(value))
        })
    }
}

fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(values) => values.iter().collect(),
        other => vec![other],
    }
}

/// Outcome of a rule that may be absent; `None` means no opinion.
fn evaluate(rule: Option<&Permission>, actor: Option<&Actor>) -> Option<bool> {
    rule.map(|rule| rule.allows(actor))
}

/// Instance-wide permission rules.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Permissions {
    /// Governs `view-instance`.
    pub(crate) allow: Option<Permission>,
    /// Governs `execute-sql` on databases without their own rule.
    pub(crate) allow_sql: Option<Permission>,
}

impl Permissions {
    /// Fails only on an explicit denial; no rule means allowed.
    pub(crate) fn check_view_instance(&self, actor: Option<&Actor>) -> Result<(), Error> {
        if evaluate(self.allow.as_ref(), actor) == Some(false) {
            warn!("view-instance denied for {}", describe(actor));
            return Err(Error::Forbidden("view-instance denied".to_string()));
        }
        Ok(())
    }

    /// Checks `execute-sql` on a database, consulting the database's own rule
    /// before the instance-wide one.
    pub(crate) fn check_execute_sql(
        &self,
        database: &str,
        database_rule: Option<&Permission>,
        actor: Option<&Actor>,
    ) -> Result<(), Error> {
        let decision = evaluate(database_rule, actor)
            .or_else(|| evaluate(self.allow_sql.as_ref(), actor));
        if decision == Some(false) {
            warn!("execute-sql on {} denied for {}", database, describe(actor));
            return Err(Error::Forbidden("execute-sql denied".to_string()));
        }
        Ok(())
    }
}

fn describe(actor: Option<&Actor>) -> String {
    actor.map_or_else(|| "anonymous".to_string(), |a| Value::Object(a.clone()).to_string())
}

/// Bearer tokens and the actors they stand for.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub(crate) struct Actors(HashMap<String, Actor>);

impl Actors {
    /// Looks up the actor of an `Authorization: Bearer <token>` header.
    pub(crate) fn authenticate(&self, authorization: Option<&str>) -> Option<&Actor> {
        let token = authorization?.strip_prefix("Bearer ")?.trim();
        self.0.get(token)
    }
}
