//! Strongly-typed identifiers for tracker entities
//!
//! Tracker entities carry integer ids assigned by the remote system. Activity
//! ids are opaque strings because the two feed generations format them
//! differently.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a tracker project
    ProjectId,
    "project"
);

numeric_id!(
    /// Identifier of a story
    StoryId,
    "story"
);

numeric_id!(
    /// Identifier of a task within a story
    TaskId,
    "task"
);

numeric_id!(
    /// Identifier of a note; comment references share this id space
    NoteId,
    "note"
);

/// Identifier of a remote activity event
///
/// Decodes from either a JSON string or a JSON integer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "RawActivityId")]
#[serde(into = "String")]
pub struct ActivityId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawActivityId {
    Text(String),
    Number(u64),
}

impl From<RawActivityId> for ActivityId {
    fn from(raw: RawActivityId) -> Self {
        match raw {
            RawActivityId::Text(id) => Self(id),
            RawActivityId::Number(id) => Self(id.to_string()),
        }
    }
}

impl From<ActivityId> for String {
    fn from(id: ActivityId) -> Self {
        id.0
    }
}

impl ActivityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "activity:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        assert_eq!(StoryId::new(15).to_string(), "story:15");
        assert_eq!(ProjectId::new(2).to_string(), "project:2");
        assert_eq!(ActivityId::new("77_3").to_string(), "activity:77_3");
    }

    #[test]
    fn test_transparent_serde() {
        let id: StoryId = serde_json::from_str("42").unwrap();
        assert_eq!(id, StoryId::new(42));
        assert_eq!(serde_json::to_string(&TaskId::new(7)).unwrap(), "7");

        let activity: ActivityId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(activity.as_str(), "abc");
        let activity: ActivityId = serde_json::from_str("1234").unwrap();
        assert_eq!(activity.as_str(), "1234");
        assert_eq!(serde_json::to_string(&activity).unwrap(), "\"1234\"");
    }
}
