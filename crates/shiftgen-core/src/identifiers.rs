use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }
    };
}

string_id!(WorkspaceId);
string_id!(ItemId);
string_id!(ListId);

/// Prefix that turns an instance id into the address of its week group.
pub const WEEK_TOKEN_PREFIX: &str = "week:";

/// How a caller addressed a shift: a single list item or the week group
/// anchored on one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShiftAddress {
    Item(ItemId),
    Week(ItemId),
}

impl ShiftAddress {
    /// Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        match trimmed.strip_prefix(WEEK_TOKEN_PREFIX) {
            Some(anchor) => {
                let anchor = anchor.trim();
                if anchor.is_empty() {
                    None
                } else {
                    Some(Self::Week(ItemId::new(anchor)))
                }
            }
            None => Some(Self::Item(ItemId::new(trimmed))),
        }
    }

    pub fn token(&self) -> String {
        match self {
            Self::Item(id) => id.as_str().to_owned(),
            Self::Week(anchor) => format!("{WEEK_TOKEN_PREFIX}{anchor}"),
        }
    }
}
