use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  DateTime,
  FixedOffset,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  SecondsFormat,
  TimeZone,
  Timelike,
  Utc
};
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Deserializer,
  Serialize,
  Serializer
};

const DAY_FORMAT: &str = "%Y-%m-%d";
const LOCAL_FORMATS: [&str; 4] = [
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M"
];

/// When a task is due. Keeps the
/// granularity it was entered with so
/// that it round-trips unchanged.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum DueDate {
  /// A whole day; due at local
  /// midnight.
  Day(NaiveDate),
  /// Wall-clock time in the
  /// configured timezone.
  Local(NaiveDateTime),
  Instant(DateTime<FixedOffset>)
}

impl DueDate {
  /// The absolute moment this due
  /// date refers to. `None` when a
  /// local time falls into a DST gap.
  #[must_use]
  pub fn instant_in(
    &self,
    tz: &Tz
  ) -> Option<DateTime<Utc>> {
    match self {
      | DueDate::Day(day) => {
        resolve_local(
          tz,
          day.and_hms_opt(0, 0, 0)?
        )
      }
      | DueDate::Local(naive) => {
        resolve_local(tz, *naive)
      }
      | DueDate::Instant(at) => {
        Some(at.with_timezone(&Utc))
      }
    }
  }

  /// Short human label in `tz`.
  #[must_use]
  pub fn label_in(
    &self,
    tz: &Tz
  ) -> String {
    match self {
      | DueDate::Day(day) => {
        day.format(DAY_FORMAT).to_string()
      }
      | DueDate::Local(naive) => {
        naive
          .format("%Y-%m-%d %H:%M")
          .to_string()
      }
      | DueDate::Instant(at) => {
        at.with_timezone(tz)
          .format("%Y-%m-%d %H:%M")
          .to_string()
      }
    }
  }
}

fn resolve_local(
  tz: &Tz,
  naive: NaiveDateTime
) -> Option<DateTime<Utc>> {
  match tz.from_local_datetime(&naive) {
    | LocalResult::Single(at) => {
      Some(at.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      earliest,
      _
    ) => {
      Some(earliest.with_timezone(&Utc))
    }
    | LocalResult::None => None
  }
}

impl FromStr for DueDate {
  type Err = anyhow::Error;

  fn from_str(
    raw: &str
  ) -> Result<Self, Self::Err> {
    let s = raw.trim();
    if s.is_empty() {
      return Err(anyhow!(
        "due date cannot be empty"
      ));
    }

    if let Ok(at) =
      DateTime::parse_from_rfc3339(s)
    {
      return Ok(DueDate::Instant(at));
    }

    for format in LOCAL_FORMATS {
      if let Ok(naive) =
        NaiveDateTime::parse_from_str(
          s, format
        )
      {
        return Ok(DueDate::Local(
          naive
        ));
      }
    }

    NaiveDate::parse_from_str(
      s, DAY_FORMAT
    )
    .map(DueDate::Day)
    .map_err(|_| {
      anyhow!(
        "unrecognized due date '{s}'; \
         expected YYYY-MM-DD, \
         YYYY-MM-DDTHH:MM or RFC 3339"
      )
    })
  }
}

impl fmt::Display for DueDate {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | DueDate::Day(day) => {
        write!(
          f,
          "{}",
          day.format(DAY_FORMAT)
        )
      }
      | DueDate::Local(naive) => {
        let format =
          if naive.second() == 0 {
            "%Y-%m-%dT%H:%M"
          } else {
            "%Y-%m-%dT%H:%M:%S"
          };
        write!(
          f,
          "{}",
          naive.format(format)
        )
      }
      | DueDate::Instant(at) => {
        f.write_str(
          &at.to_rfc3339_opts(
            SecondsFormat::AutoSi,
            true
          )
        )
      }
    }
  }
}

impl Serialize for DueDate {
  fn serialize<S>(
    &self,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for DueDate {
  fn deserialize<D>(
    deserializer: D
  ) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw =
      String::deserialize(deserializer)?;
    raw
      .parse()
      .map_err(serde::de::Error::custom)
  }
}

pub fn parse_timezone(
  raw: &str
) -> anyhow::Result<Tz> {
  raw.trim().parse::<Tz>().map_err(
    |err| {
      anyhow!(
        "invalid timezone '{raw}': \
         {err}"
      )
    }
  )
}
