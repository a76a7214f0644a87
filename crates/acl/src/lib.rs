//! ACL / user manager: users, role assignments, sessions, and the
//! permission predicate by command class.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use common::{DbError, DbResult};
use sha2::{Digest, Sha256};

pub const MAX_USERNAME: usize = 64;
pub const PWHASH_SIZE: usize = 256;
pub const MAX_USERS: usize = 100;
pub const MAX_SESSIONS: usize = 64;

/// The one username permitted to hold the admin role even after another
/// admin exists: the bootstrap username reserved as the primary
/// administrator.
pub const BOOTSTRAP_ADMIN: &str = "admin";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Admin,
    Developer,
    User,
}

impl Role {
    fn tag(self) -> u32 {
        match self {
            Role::Admin => 0,
            Role::Developer => 1,
            Role::User => 2,
        }
    }

    fn from_tag(tag: u32) -> DbResult<Self> {
        match tag {
            0 => Ok(Role::Admin),
            1 => Ok(Role::Developer),
            2 => Ok(Role::User),
            _ => Err(DbError::Parse(format!("corrupt role tag {tag}"))),
        }
    }
}

/// Command classes checked by `Acl::check_permission`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandClass {
    Read,
    Write,
    Create,
    Drop,
    Delete,
    Grant,
    Revoke,
}

/// The role/command-class permission matrix.
fn allows(role: Role, class: CommandClass) -> bool {
    use CommandClass::*;
    use Role::*;
    match role {
        Admin => true,
        Developer => matches!(class, Read | Write | Create),
        User => matches!(class, Read),
    }
}

#[derive(Clone, Debug)]
pub struct User {
    pub username: String,
    pub password_hash: String,
    pub active: bool,
}

#[derive(Clone, Debug)]
pub struct Session {
    pub username: String,
    pub login_at: u64,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    hex::encode(digest)
}

fn write_fixed(w: &mut impl Write, s: &str, len: usize) -> io::Result<()> {
    let mut buf = vec![0u8; len];
    let bytes = s.as_bytes();
    let n = bytes.len().min(len);
    buf[..n].copy_from_slice(&bytes[..n]);
    w.write_all(&buf)
}

fn read_fixed(r: &mut impl Read, len: usize) -> io::Result<String> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(len);
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

/// Users, role assignments, and sessions for one database.
pub struct Acl {
    users: Vec<User>,
    roles: Vec<(String, Role)>,
    sessions: Vec<Session>,
    current_user: Option<String>,
    enabled: bool,
}

impl Acl {
    pub fn new() -> Self {
        Self {
            users: Vec::new(),
            roles: Vec::new(),
            sessions: Vec::new(),
            current_user: None,
            enabled: true,
        }
    }

    /// A fresh ACL with the bootstrap administrator already created.
    pub fn with_bootstrap_admin(password: &str) -> Self {
        let mut acl = Self::new();
        acl.users.push(User {
            username: BOOTSTRAP_ADMIN.to_string(),
            password_hash: hash_password(password),
            active: true,
        });
        acl.roles.push((BOOTSTRAP_ADMIN.to_string(), Role::Admin));
        acl
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn current_user(&self) -> Option<&str> {
        self.current_user.as_deref()
    }

    fn find_user(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|u| u.username == username)
    }

    pub fn role_of(&self, username: &str) -> Role {
        self.roles
            .iter()
            .find(|(name, _)| name == username)
            .map(|(_, role)| *role)
            .unwrap_or(Role::User)
    }

    /// Only one non-bootstrap user may hold the admin role at a time.
    pub fn assign_role(&mut self, username: &str, role: Role) -> DbResult<()> {
        if self.find_user(username).is_none() {
            return Err(DbError::UnknownUser(username.to_string()));
        }
        if role == Role::Admin && username != BOOTSTRAP_ADMIN {
            let other_admin_exists = self
                .roles
                .iter()
                .any(|(name, r)| *r == Role::Admin && name != BOOTSTRAP_ADMIN && name != username);
            if other_admin_exists {
                return Err(DbError::AdminExists);
            }
        }
        if let Some(entry) = self.roles.iter_mut().find(|(name, _)| name == username) {
            entry.1 = role;
        } else {
            self.roles.push((username.to_string(), role));
        }
        Ok(())
    }

    pub fn create_user(&mut self, username: &str, password: &str, role: Role) -> DbResult<()> {
        if self.users.len() >= MAX_USERS {
            return Err(DbError::CapacityExceeded);
        }
        if self.find_user(username).is_some() {
            return Err(DbError::DuplicateUser(username.to_string()));
        }
        self.users.push(User {
            username: username.to_string(),
            password_hash: hash_password(password),
            active: true,
        });
        self.assign_role(username, role)?;
        Ok(())
    }

    pub fn drop_user(&mut self, username: &str) -> DbResult<()> {
        let idx = self
            .users
            .iter()
            .position(|u| u.username == username)
            .ok_or_else(|| DbError::UnknownUser(username.to_string()))?;
        self.users.remove(idx);
        self.roles.retain(|(name, _)| name != username);
        self.sessions.retain(|s| s.username != username);
        if self.current_user.as_deref() == Some(username) {
            self.current_user = None;
        }
        Ok(())
    }

    /// Checks the password, opens (or refreshes) a session, and marks the
    /// user as current. Mirrors `login`; kept distinct from `login` only in
    /// name, since session bookkeeping is the same either way.
    pub fn authenticate(&mut self, username: &str, password: &str) -> DbResult<()> {
        let hash = hash_password(password);
        let user = self
            .find_user(username)
            .filter(|u| u.active)
            .ok_or(DbError::AuthFailed)?;
        if user.password_hash != hash {
            return Err(DbError::AuthFailed);
        }
        if let Some(session) = self.sessions.iter_mut().find(|s| s.username == username) {
            session.login_at = now();
        } else {
            if self.sessions.len() >= MAX_SESSIONS {
                return Err(DbError::CapacityExceeded);
            }
            self.sessions.push(Session {
                username: username.to_string(),
                login_at: now(),
            });
        }
        self.current_user = Some(username.to_string());
        log::info!("user '{username}' authenticated");
        Ok(())
    }

    pub fn login(&mut self, username: &str, password: &str) -> DbResult<()> {
        self.authenticate(username, password)
    }

    /// Removes `name`'s session if given; with no name, clears only the
    /// current-user pointer. Idempotent: logging out when not logged in is
    /// a no-op success.
    pub fn logout(&mut self, username: Option<&str>) {
        match username {
            Some(name) => {
                self.sessions.retain(|s| s.username != name);
                if self.current_user.as_deref() == Some(name) {
                    self.current_user = None;
                }
            }
            None => self.current_user = None,
        }
    }

    pub fn active_sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn check_permission(&self, username: Option<&str>, class: CommandClass) -> DbResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let username = username.ok_or(DbError::NotLoggedIn)?;
        let role = self.role_of(username);
        if allows(role, class) {
            Ok(())
        } else {
            Err(DbError::PermissionDenied)
        }
    }

    pub fn load(path: &Path) -> DbResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let mut file = File::open(path)?;
        let num_users = file.read_u32::<LittleEndian>()?;
        let mut users = Vec::with_capacity(num_users as usize);
        for _ in 0..num_users {
            let username = read_fixed(&mut file, MAX_USERNAME)?;
            let password_hash = read_fixed(&mut file, PWHASH_SIZE)?;
            let mut active_byte = [0u8; 1];
            file.read_exact(&mut active_byte)?;
            users.push(User {
                username,
                password_hash,
                active: active_byte[0] != 0,
            });
        }
        let num_roles = file.read_u32::<LittleEndian>()?;
        let mut roles = Vec::with_capacity(num_roles as usize);
        for _ in 0..num_roles {
            let username = read_fixed(&mut file, MAX_USERNAME)?;
            let tag = file.read_u32::<LittleEndian>()?;
            roles.push((username, Role::from_tag(tag)?));
        }
        Ok(Self {
            users,
            roles,
            sessions: Vec::new(),
            current_user: None,
            enabled: true,
        })
    }

    pub fn save(&self, path: &Path) -> DbResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_u32::<LittleEndian>(self.users.len() as u32)?;
        for user in &self.users {
            write_fixed(&mut file, &user.username, MAX_USERNAME)?;
            write_fixed(&mut file, &user.password_hash, PWHASH_SIZE)?;
            file.write_all(&[user.active as u8])?;
        }
        file.write_u32::<LittleEndian>(self.roles.len() as u32)?;
        for (username, role) in &self.roles {
            write_fixed(&mut file, username, MAX_USERNAME)?;
            file.write_u32::<LittleEndian>(role.tag())?;
        }
        file.sync_all()?;
        Ok(())
    }
}

impl Default for Acl {
    fn default() -> Self {
        Self::new()
    }
}
