use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Identifies a production simulator owned by the game.
    pub struct GeneratorKey;
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifies a node type (production archetype) in the catalog.
    NodeTypeId
);
string_id!(
    /// Identifies a placed node instance. One generator simulator per instance.
    InstanceId
);
string_id!(
    /// Identifies a modifier entry.
    ModifierId
);
string_id!(
    /// Identifies an upgrade entry.
    UpgradeId
);
string_id!(
    /// Identifies a milestone entry.
    MilestoneId
);
string_id!(
    /// Identifies a buff definition.
    BuffId
);
string_id!(
    /// Identifies a currency / resource.
    ResourceId
);
