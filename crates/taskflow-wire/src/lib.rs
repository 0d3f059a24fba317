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
)]
pub enum TaskPriority {
  High,
  Medium,
  Low
}

/// A task as the remote API stores it.
///
/// The server's native identifier is `_id`; plain `id` is
/// accepted too, and `_id` wins when a record carries both.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(
  rename_all = "camelCase",
  try_from = "RawTask"
)]
pub struct TaskDto {
  #[serde(rename = "_id")]
  pub id:           String,
  pub title:        String,
  pub priority:     TaskPriority,
  #[serde(default)]
  pub due_date:     Option<String>,
  pub list_id:      String,
  #[serde(default)]
  pub is_completed: bool
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(try_from = "RawList")]
pub struct ListDto {
  #[serde(rename = "_id")]
  pub id:   String,
  pub name: String
}

/// Incoming shape with both identifier spellings kept
/// apart, so a record carrying `_id` and `id` decodes.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTask {
  #[serde(default, rename = "_id")]
  native_id:    Option<String>,
  #[serde(default)]
  id:           Option<String>,
  title:        String,
  priority:     TaskPriority,
  #[serde(default)]
  due_date:     Option<String>,
  list_id:      String,
  #[serde(default)]
  is_completed: bool
}

#[derive(Deserialize)]
struct RawList {
  #[serde(default, rename = "_id")]
  native_id: Option<String>,
  #[serde(default)]
  id:        Option<String>,
  name:      String
}

fn pick_id(
  native_id: Option<String>,
  id: Option<String>
) -> Result<String, &'static str> {
  native_id
    .or(id)
    .ok_or("missing field `_id`")
}

impl TryFrom<RawTask> for TaskDto {
  type Error = &'static str;

  fn try_from(
    raw: RawTask
  ) -> Result<Self, Self::Error> {
    Ok(Self {
      id:           pick_id(
        raw.native_id,
        raw.id
      )?,
      title:        raw.title,
      priority:     raw.priority,
      due_date:     raw.due_date,
      list_id:      raw.list_id,
      is_completed: raw.is_completed
    })
  }
}

impl TryFrom<RawList> for ListDto {
  type Error = &'static str;

  fn try_from(
    raw: RawList
  ) -> Result<Self, Self::Error> {
    Ok(Self {
      id:   pick_id(raw.native_id, raw.id)?,
      name: raw.name
    })
  }
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreate {
  pub title:    String,
  pub priority: TaskPriority,
  pub due_date: String,
  pub list_id:  String
}

/// Body of `PUT /api/tasks/:id`: every mutable field, always
/// sent in full.
#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskReplace {
  pub title:        String,
  pub priority:     TaskPriority,
  pub due_date:     Option<String>,
  pub list_id:      String,
  pub is_completed: bool
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct ListCreate {
  pub name: String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct LoginArgs {
  pub email:    String,
  pub password: String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct SignupArgs {
  pub name:     String,
  pub email:    String,
  pub password: String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordArgs {
  pub old_password: String,
  pub new_password: String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(from = "RawUser")]
pub struct UserDto {
  #[serde(rename = "_id")]
  pub id:    Option<String>,
  pub name:  String,
  pub email: String
}

#[derive(Deserialize)]
struct RawUser {
  #[serde(default, rename = "_id")]
  native_id: Option<String>,
  #[serde(default)]
  id:        Option<String>,
  #[serde(default)]
  name:      String,
  #[serde(default)]
  email:     String
}

impl From<RawUser> for UserDto {
  fn from(raw: RawUser) -> Self {
    Self {
      id:    raw.native_id.or(raw.id),
      name:  raw.name,
      email: raw.email
    }
  }
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct AuthResponse {
  pub token: String,
  pub user:  UserDto
}

/// Optional payload of a non-2xx response.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
pub struct ErrorBody {
  #[serde(default)]
  pub message: Option<String>
}
