use tracing::info;

use crate::error::SyncError;
use crate::gateway::Gateway;
use crate::session::Session;
use crate::task::{Credentials, PasswordChange, Registration, User};
use crate::transport::Transport;

/// Signs in and persists the returned session.
#[tracing::instrument(skip_all, fields(email = %credentials.email))]
pub async fn login<T: Transport>(
    gateway: &Gateway<T>,
    credentials: &Credentials,
) -> Result<User, SyncError> {
    let (token, user) = gateway.login(credentials).await?;
    gateway.session().set(token, user.clone())?;
    info!("signed in");
    Ok(user)
}

#[tracing::instrument(skip_all, fields(email = %registration.email))]
pub async fn signup<T: Transport>(
    gateway: &Gateway<T>,
    registration: &Registration,
) -> Result<User, SyncError> {
    let (token, user) = gateway.signup(registration).await?;
    gateway.session().set(token, user.clone())?;
    info!("account created");
    Ok(user)
}

/// Clears the session in memory and on disk. No request is made.
pub fn logout(session: &Session) -> Result<(), SyncError> {
    session.clear()
}

pub async fn change_password<T: Transport>(
    gateway: &Gateway<T>,
    change: &PasswordChange,
) -> Result<(), SyncError> {
    gateway.change_password(change).await
}
