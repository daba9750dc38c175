use anyhow::{Context, Result};
use nix::unistd::{Gid, Uid, User, getgid, getuid};

/// The identity of the user that started us. Before privileges are raised
/// these are the host ids; after [`crate::privilege::become_root`] they are
/// the ids that user has inside the new user namespace, which is what chown
/// and run-as operations inside the namespace need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokingUser {
    pub uid: Uid,
    pub gid: Gid,
    pub name: Option<String>,
}

impl InvokingUser {
    pub fn current() -> Result<InvokingUser> {
        let uid = getuid();
        let gid = getgid();
        let name = User::from_uid(uid)
            .context(format!("failed to look up user {}", uid))?
            .map(|user| user.name);

        Ok(InvokingUser { uid, gid, name })
    }

    pub fn is_root(&self) -> bool {
        self.uid.is_root()
    }

    /// Name to use in messages, falling back to the numeric uid.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.uid.to_string(),
        }
    }

    /// The same user, seen through a namespace that maps it to `uid`/`gid`.
    pub fn remapped(&self, uid: Uid, gid: Gid) -> InvokingUser {
        InvokingUser {
            uid,
            gid,
            name: self.name.clone(),
        }
    }
}
