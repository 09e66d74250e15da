use chrono::{
  DateTime,
  NaiveDate,
  Utc
};
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
)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
  Pending,
  Completed
}

impl TaskStatus {
  pub fn flip(self) -> Self {
    match self {
      | Self::Pending => Self::Completed,
      | Self::Completed => Self::Pending
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Pending => "pending",
      | Self::Completed => "completed"
    }
  }
}

impl std::str::FromStr for TaskStatus {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "pending" => Ok(Self::Pending),
      | "completed" => {
        Ok(Self::Completed)
      }
      | other => {
        Err(format!(
          "unknown status: {other}"
        ))
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
  Low,
  Medium,
  High
}

impl std::str::FromStr for TaskPriority {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "low" | "l" => Ok(Self::Low),
      | "medium" | "m" => {
        Ok(Self::Medium)
      }
      | "high" | "h" => Ok(Self::High),
      | other => {
        Err(format!(
          "unknown priority: {other}"
        ))
      }
    }
  }
}

/// A task as returned by the API.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskDto {
  #[serde(rename = "_id", alias = "id")]
  pub id:          String,
  pub title:       String,
  #[serde(default)]
  pub description: Option<String>,
  pub status:      TaskStatus,
  #[serde(
    default,
    with = "due_date_serde",
    skip_serializing_if = "Option::is_none"
  )]
  pub due_date:    Option<NaiveDate>,
  #[serde(default)]
  pub priority:    Option<TaskPriority>,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>
}

impl TaskDto {
  pub fn is_completed(&self) -> bool {
    self.status == TaskStatus::Completed
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreate {
  pub title:       String,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub description: Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub status:      Option<TaskStatus>,
  #[serde(
    default,
    with = "due_date_serde",
    skip_serializing_if = "Option::is_none"
  )]
  pub due_date:    Option<NaiveDate>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub priority:    Option<TaskPriority>
}

impl TaskCreate {
  pub fn titled(
    title: impl Into<String>
  ) -> Self {
    Self {
      title:       title.into(),
      description: None,
      status:      None,
      due_date:    None,
      priority:    None
    }
  }
}

/// Partial update; only present fields go over the wire.
///
/// `description` and `due_date` are three-state: `None` leaves the field
/// alone, `Some(None)` clears it and `Some(Some(v))` sets it.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub title:       Option<String>,
  #[serde(
    default,
    with = "patch_description_serde",
    skip_serializing_if = "Option::is_none"
  )]
  pub description: Option<Option<String>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub status:      Option<TaskStatus>,
  #[serde(
    default,
    with = "patch_due_date_serde",
    skip_serializing_if = "Option::is_none"
  )]
  pub due_date:    Option<Option<NaiveDate>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub priority:    Option<TaskPriority>
}

impl TaskPatch {
  pub fn status(
    status: TaskStatus
  ) -> Self {
    Self {
      status: Some(status),
      ..Self::default()
    }
  }

  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub email:     String,
  pub user_name: String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct LoginRequest {
  pub email:    String,
  pub password: String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
  pub email:     String,
  pub password:  String,
  pub user_name: String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct AuthResponse {
  pub token: String,
  #[serde(default)]
  pub user:  Option<User>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct RefreshResponse {
  pub token: String
}

/// `{"data": ...}` wrapper used by the task endpoints.
#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct Envelope<T> {
  pub data: T
}

/// Same as [`Envelope`] but tolerates a missing or null `data`.
#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct ListEnvelope<T> {
  pub data: Option<Vec<T>>
}

impl<T> ListEnvelope<T> {
  pub fn into_items(self) -> Vec<T> {
    self.data.unwrap_or_default()
  }
}

#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
)]
pub struct ErrorBody {
  #[serde(default)]
  pub error:   Option<String>,
  #[serde(default)]
  pub message: Option<String>
}

impl ErrorBody {
  pub fn text(&self) -> Option<&str> {
    self
      .error
      .as_deref()
      .or(self.message.as_deref())
      .filter(|s| !s.trim().is_empty())
  }
}

/// Due dates travel as `YYYY-MM-DD`; the server may also echo a full
/// RFC 3339 timestamp, of which only the date is kept.
pub mod due_date_serde {
  use chrono::{
    DateTime,
    NaiveDate
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    date: &Option<NaiveDate>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match date {
      | Some(value) => {
        serializer.serialize_str(
          &value
            .format("%Y-%m-%d")
            .to_string()
        )
      }
      | None => serializer.serialize_none()
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Option<NaiveDate>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw =
      Option::<String>::deserialize(
        deserializer
      )?;
    match raw.as_deref().map(str::trim)
    {
      | None | Some("") => Ok(None),
      | Some(text) => {
        parse_due_date(text)
          .map(Some)
          .ok_or_else(|| {
            serde::de::Error::custom(
              format!(
                "invalid due date: \
                 {text}"
              )
            )
          })
      }
    }
  }

  pub fn parse_due_date(
    text: &str
  ) -> Option<NaiveDate> {
    if let Ok(date) =
      NaiveDate::parse_from_str(
        text, "%Y-%m-%d"
      )
    {
      return Some(date);
    }
    DateTime::parse_from_rfc3339(text)
      .ok()
      .map(|dt| dt.date_naive())
  }
}

/// A cleared description is sent as an empty string.
mod patch_description_serde {
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    value: &Option<Option<String>>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    let text = value
      .as_ref()
      .and_then(|inner| inner.as_deref())
      .unwrap_or("");
    serializer.serialize_str(text)
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Option<Option<String>>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw =
      Option::<String>::deserialize(
        deserializer
      )?;
    Ok(Some(
      raw.filter(|s| !s.is_empty())
    ))
  }
}

/// A cleared due date is sent as `null`.
mod patch_due_date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    value: &Option<Option<NaiveDate>>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    super::due_date_serde::serialize(
      &value.flatten(),
      serializer
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Option<Option<NaiveDate>>, D::Error>
  where
    D: Deserializer<'de>
  {
    super::due_date_serde::deserialize(
      deserializer
    )
    .map(Some)
  }
}
