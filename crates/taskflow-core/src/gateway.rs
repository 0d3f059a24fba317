use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use taskflow_wire::{
    AuthResponse, ChangePasswordArgs, ErrorBody, ListCreate, ListDto, LoginArgs, SignupArgs,
    TaskDto,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::SyncError;
use crate::session::Session;
use crate::task::{Category, Credentials, NewTask, PasswordChange, Registration, Task, User};
use crate::transport::{ApiRequest, ApiResponse, Method, Transport};

pub const DEFAULT_API_URL: &str = "https://taskflowback.netlify.app/.netlify/functions/api";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Bearer,
    Anonymous,
}

/// Every call to the remote API goes through here.
#[derive(Debug, Clone)]
pub struct Gateway<T> {
    transport: T,
    session: Session,
    base_url: String,
}

impl<T: Transport> Gateway<T> {
    pub fn new(transport: T, session: Session, base_url: &str) -> Self {
        Self {
            transport,
            session,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Authenticated request. Resolves to `None` for a 2xx response that
    /// does not declare a JSON body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Option<Value>, SyncError> {
        self.dispatch(method, path, body, Auth::Bearer).await
    }

    /// Same as [`Self::request`] without a bearer token. A 401 here is a
    /// rejected sign-in, not an expired session.
    pub async fn request_anonymous(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Option<Value>, SyncError> {
        self.dispatch(method, path, body, Auth::Anonymous).await
    }

    #[instrument(skip(self, body), fields(request_id = %Uuid::new_v4()))]
    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        auth: Auth,
    ) -> Result<Option<Value>, SyncError> {
        let bearer = match auth {
            Auth::Bearer => match self.session.get() {
                Some(token) => Some(token),
                None => {
                    debug!("no session token; not contacting the server");
                    return Err(SyncError::AuthExpired);
                }
            },
            Auth::Anonymous => None,
        };

        let request = ApiRequest {
            method,
            url: format!("{}{}", self.base_url, path),
            bearer,
            body,
        };

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "request failed before a response arrived");
                return Err(SyncError::Network(err.0));
            }
        };

        debug!(status = response.status, "received response");
        self.classify(response, auth)
    }

    fn classify(&self, response: ApiResponse, auth: Auth) -> Result<Option<Value>, SyncError> {
        let status = response.status;
        if (200..300).contains(&status) {
            if !response.is_json() || response.body.iter().all(u8::is_ascii_whitespace) {
                return Ok(None);
            }
            return serde_json::from_slice(&response.body)
                .map(Some)
                .map_err(|err| SyncError::Decode(err.to_string()));
        }

        if status == 401 && auth == Auth::Bearer {
            self.session.invalidate();
            return Err(SyncError::AuthExpired);
        }

        let message = if response.is_json() {
            serde_json::from_slice::<ErrorBody>(&response.body)
                .ok()
                .and_then(|body| body.message)
        } else {
            None
        };
        warn!(status, message = ?message, "remote API rejected request");
        Err(SyncError::Remote { status, message })
    }

    async fn fetch<R: DeserializeOwned>(&self, path: &str) -> Result<R, SyncError> {
        let value = self
            .request(Method::Get, path, None)
            .await?
            .ok_or_else(|| SyncError::Decode(format!("GET {path} returned no JSON body")))?;
        decode(value)
    }

    #[instrument(skip(self))]
    pub async fn fetch_tasks(&self) -> Result<Vec<Task>, SyncError> {
        let dtos: Vec<TaskDto> = self.fetch("/api/tasks").await?;
        let tasks = dtos
            .into_iter()
            .map(Task::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = tasks.len(), "fetched tasks");
        Ok(tasks)
    }

    #[instrument(skip(self))]
    pub async fn fetch_categories(&self) -> Result<Vec<Category>, SyncError> {
        let dtos: Vec<ListDto> = self.fetch("/api/lists").await?;
        let categories: Vec<Category> = dtos.into_iter().map(Category::from).collect();
        debug!(count = categories.len(), "fetched categories");
        Ok(categories)
    }

    #[instrument(skip(self, task), fields(category_id = %task.category_id))]
    pub async fn create_task(&self, task: &NewTask) -> Result<(), SyncError> {
        self.request(Method::Post, "/api/tasks", Some(encode(&task.to_create())?))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn replace_task(&self, task: &Task) -> Result<(), SyncError> {
        let path = format!("/api/tasks/{}", task.id);
        self.request(Method::Put, &path, Some(encode(&task.to_replace())?))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_task(&self, id: &str) -> Result<(), SyncError> {
        self.request(Method::Delete, &format!("/api/tasks/{id}"), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn create_category(&self, name: &str) -> Result<(), SyncError> {
        let body = ListCreate {
            name: name.to_string(),
        };
        self.request(Method::Post, "/api/lists", Some(encode(&body)?))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_category(&self, id: &str) -> Result<(), SyncError> {
        self.request(Method::Delete, &format!("/api/lists/{id}"), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &Credentials) -> Result<(String, User), SyncError> {
        let body = LoginArgs {
            email: credentials.email.clone(),
            password: credentials.password.clone(),
        };
        self.authenticate("/auth/login", encode(&body)?).await
    }

    #[instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn signup(&self, registration: &Registration) -> Result<(String, User), SyncError> {
        let body = SignupArgs {
            name: registration.name.clone(),
            email: registration.email.clone(),
            password: registration.password.clone(),
        };
        self.authenticate("/auth/signup", encode(&body)?).await
    }

    #[instrument(skip_all)]
    pub async fn change_password(&self, change: &PasswordChange) -> Result<(), SyncError> {
        let body = ChangePasswordArgs {
            old_password: change.old_password.clone(),
            new_password: change.new_password.clone(),
        };
        self.request(Method::Post, "/auth/changepassword", Some(encode(&body)?))
            .await?;
        info!("password changed");
        Ok(())
    }

    async fn authenticate(&self, path: &str, body: Value) -> Result<(String, User), SyncError> {
        let value = self
            .request_anonymous(Method::Post, path, Some(body))
            .await?
            .ok_or_else(|| SyncError::Decode(format!("POST {path} returned no JSON body")))?;
        let response: AuthResponse = decode(value)?;
        if response.token.is_empty() {
            return Err(SyncError::Decode(format!("POST {path} returned an empty token")));
        }
        Ok((response.token, User::from(response.user)))
    }
}

fn encode<B: Serialize>(body: &B) -> Result<Value, SyncError> {
    serde_json::to_value(body).map_err(|err| SyncError::Decode(err.to_string()))
}

fn decode<R: DeserializeOwned>(value: Value) -> Result<R, SyncError> {
    serde_json::from_value(value).map_err(|err| SyncError::Decode(err.to_string()))
}
