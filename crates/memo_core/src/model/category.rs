//! Note category taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Fixed category set assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Speculative, exploratory thought.
    Idea,
    /// Actionable item.
    Todo,
    /// Fact, link or documentation pointer.
    Reference,
    /// Dated or sequential record of what happened.
    Log,
}

impl Category {
    /// All categories in classifier tie-break order.
    pub const ALL: [Category; 4] = [
        Category::Idea,
        Category::Todo,
        Category::Reference,
        Category::Log,
    ];

    /// Stable wire name (`idea|todo|reference|log`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idea => "idea",
            Self::Todo => "todo",
            Self::Reference => "reference",
            Self::Log => "log",
        }
    }

    /// Vault directory holding entries of this category.
    pub fn folder(self) -> &'static str {
        match self {
            Self::Idea => "ideas",
            Self::Todo => "todos",
            Self::Reference => "references",
            Self::Log => "logs",
        }
    }

    /// Parses the wire name; returns `None` for unknown values.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "idea" => Some(Self::Idea),
            "todo" => Some(Self::Todo),
            "reference" => Some(Self::Reference),
            "log" => Some(Self::Log),
            _ => None,
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
