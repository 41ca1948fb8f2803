use super::LoginError;
use crate::{
    profile::{md5_hex, UserProfile},
    xmlrpc::{MethodCall, Value},
};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Length of the `$1$` scheme tag in front of the client's password digest.
const SCHEME_TAG_LENGTH: usize = 3;

/// Credentials carried by a login call. The password material is the
/// scheme tag followed by the hex MD5 of the plain password.
pub struct LoginCredential {
    pub first: String,
    pub last: String,
    passwd: SecretString,
}

impl fmt::Debug for LoginCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredential")
            .field("first", &self.first)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

impl LoginCredential {
    #[must_use]
    pub fn new(first: impl Into<String>, last: impl Into<String>, passwd: SecretString) -> Self {
        Self {
            first: first.into(),
            last: last.into(),
            passwd,
        }
    }

    /// Read `first`, `last` and `passwd` from the call's struct parameter.
    ///
    /// # Errors
    ///
    /// [`LoginError::InvalidRequest`] if any member is missing or not a string.
    pub fn from_call(call: &MethodCall) -> Result<Self, LoginError> {
        let request = call.first_param().ok_or(LoginError::InvalidRequest)?;
        let member = |name: &str| {
            request
                .get(name)
                .and_then(Value::as_str)
                .ok_or(LoginError::InvalidRequest)
        };

        Ok(Self::new(
            member("first")?,
            member("last")?,
            SecretString::from(member("passwd")?.to_string()),
        ))
    }

    /// Key used to serialize concurrent logins for one avatar.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{} {}", self.first.to_lowercase(), self.last.to_lowercase())
    }

    /// Compare against the profile's salted hash, ignoring hex case.
    #[must_use]
    pub fn verify(&self, profile: &UserProfile) -> bool {
        let Some(digest) = self.passwd.expose_secret().get(SCHEME_TAG_LENGTH..) else {
            return false;
        };

        let computed = md5_hex(&format!("{digest}:{}", profile.password_salt));
        profile.password_hash.eq_ignore_ascii_case(&computed)
    }
}
