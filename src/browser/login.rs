//! Authentication gate

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use tracing::debug;

use super::Browser;
use crate::Result;

/// Login and password of a site account
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// A site module that can authenticate its browser
#[async_trait]
pub trait LoginBrowser: Send + Sync {
    fn browser(&self) -> &Browser;

    /// Leave the session authenticated, or fail with
    /// [`Error::IncorrectCredentials`](crate::Error::IncorrectCredentials)
    async fn do_login(&self) -> Result<()>;

    async fn do_logout(&self) -> Result<()> {
        self.browser().session().clear_cookies()
    }
}

/// Run `op` after making sure `module` is logged in
///
/// Logs in once when there is no current page or the current page does not
/// report a logged-in session; otherwise goes straight to `op`.
pub async fn need_login<M, F, Fut, T>(module: &M, op: F) -> Result<T>
where
    M: LoginBrowser + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let logged = module
        .browser()
        .page()?
        .map(|page| page.logged())
        .unwrap_or(false);

    if !logged {
        debug!("Not logged in, calling do_login");
        module.do_login().await?;
    }
    op().await
}
