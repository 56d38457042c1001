//! GitHub OAuth authentication and the authorization gate
//!
//! Handles:
//! - GitHub OAuth flow
//! - Session management
//! - Gate decisions and the middleware enforcing them

pub mod gate;
mod middleware;
mod oauth;
pub mod session;

pub use gate::{Decision, Gate, IdentityProvider, RepoRef, RepoWhitelist};
pub use middleware::{CurrentUser, RepoParams, require_repo_access, require_user};
pub use oauth::{CALLBACK_PATH, LOGIN_START_PATH, auth_router};
pub use session::{Session, create_session_token, verify_session_token};
