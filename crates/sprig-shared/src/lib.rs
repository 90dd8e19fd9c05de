use std::fmt;
use std::str::FromStr;

use serde::{
  Deserialize,
  Serialize
};

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
  Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
  High,
  #[default]
  Medium,
  Low
}

impl Priority {
  /// Sort rank: lower ranks list
  /// first.
  #[must_use]
  pub fn rank(self) -> u8 {
    match self {
      | Priority::High => 0,
      | Priority::Medium => 1,
      | Priority::Low => 2
    }
  }

  #[must_use]
  pub fn as_str(self) -> &'static str {
    match self {
      | Priority::High => "high",
      | Priority::Medium => "medium",
      | Priority::Low => "low"
    }
  }
}

impl fmt::Display for Priority {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Priority {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "high" | "h" => Ok(Priority::High),
      | "medium" | "med" | "m" => {
        Ok(Priority::Medium)
      }
      | "low" | "l" => Ok(Priority::Low),
      | other => Err(format!(
        "unknown priority: {other}"
      ))
    }
  }
}

/// Display group of a task. Clients
/// draft new tasks as `Work`; the
/// server files tasks that arrive
/// without a tag under `General`.
#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
  Default,
)]
pub enum Tag {
  #[default]
  Work,
  Personal,
  Shopping,
  General
}

impl Tag {
  pub const ALL: [Tag; 4] = [
    Tag::Work,
    Tag::Personal,
    Tag::Shopping,
    Tag::General
  ];

  #[must_use]
  pub fn as_str(self) -> &'static str {
    match self {
      | Tag::Work => "Work",
      | Tag::Personal => "Personal",
      | Tag::Shopping => "Shopping",
      | Tag::General => "General"
    }
  }
}

impl fmt::Display for Tag {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Tag {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let wanted = s.trim();
    Tag::ALL
      .into_iter()
      .find(|tag| {
        tag
          .as_str()
          .eq_ignore_ascii_case(wanted)
      })
      .ok_or_else(|| {
        format!("unknown tag: {wanted}")
      })
  }
}

/// A stored to-do record as it
/// travels over HTTP.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct TodoDto {
  pub id:         String,
  pub text:       String,
  #[serde(default)]
  pub completed:  bool,
  #[serde(default)]
  pub priority:   Priority,
  #[serde(default = "general_tag")]
  pub tag:        Tag,
  #[serde(default)]
  pub due_date:   Option<String>,
  pub created_at: String
}

fn general_tag() -> Tag {
  Tag::General
}

/// Body of `POST /todos`.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct TodoCreate {
  pub text:     String,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub priority: Option<Priority>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub tag:      Option<Tag>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub due_date: Option<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct ErrorBody {
  pub error: String
}
