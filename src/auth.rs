use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;

use crate::model::{Actor, Role};

/// Shared-secret password check. Who the caller *is* comes from the
/// startup `user` parameter, see [`parse_identity`].
#[derive(Debug)]
pub struct RoombookAuthSource {
    password: String,
}

impl RoombookAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for RoombookAuthSource {
    async fn get_password(&self, _login: &LoginInfo) -> PgWireResult<Password> {
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}

/// Parse `role:user_id`. A bare role is only accepted for service accounts,
/// which act without a user id.
pub fn parse_identity(user: &str) -> Result<Actor, String> {
    match user.split_once(':') {
        Some((role, id)) => {
            let role: Role = role.parse()?;
            let id = id
                .parse()
                .map_err(|_| format!("invalid user id in {user:?}"))?;
            Ok(Actor::user(id, role))
        }
        None => match user.parse()? {
            Role::ServiceAccount => Ok(Actor {
                user_id: None,
                role: Role::ServiceAccount,
            }),
            role => Err(format!("role {role} requires a user id (expected {role}:<id>)")),
        },
    }
}
