use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::ChildId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Parent,
    Child,
}

/// Who is asking. Supplied by the caller; the ledger trusts it and only
/// checks that the role is allowed to perform the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub role: Role,
    pub child_id: Option<ChildId>, // required when role == child
}

impl Actor {
    pub fn parent() -> Self {
        Actor {
            role: Role::Parent,
            child_id: None,
        }
    }

    pub fn child(id: impl Into<ChildId>) -> Self {
        Actor {
            role: Role::Child,
            child_id: Some(id.into()),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.role, &self.child_id) {
            (Role::Parent, _) => f.write_str("parent"),
            (Role::Child, Some(id)) => write!(f, "child:{id}"),
            (Role::Child, None) => f.write_str("child"),
        }
    }
}

/// Parses `parent` or `child:<id>`.
impl FromStr for Actor {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("parent") {
            return Ok(Actor::parent());
        }
        match s.split_once(':') {
            Some((role, id)) if role.eq_ignore_ascii_case("child") && !id.trim().is_empty() => {
                Ok(Actor::child(ChildId(id.trim().to_string())))
            }
            _ => Err(format!(
                "invalid actor '{s}': expected 'parent' or 'child:<id>'"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_actors() {
        assert_eq!("parent".parse::<Actor>().unwrap(), Actor::parent());
        let kid: Actor = "child:alex".parse().unwrap();
        assert_eq!(kid.role, Role::Child);
        assert_eq!(kid.child_id, Some(ChildId::from("alex")));
        assert_eq!(kid.to_string(), "child:alex");
    }

    #[test]
    fn rejects_child_without_id() {
        assert!("child".parse::<Actor>().is_err());
        assert!("child:".parse::<Actor>().is_err());
        assert!("grandma".parse::<Actor>().is_err());
    }
}
