//! Client side of the Ory Network the proxy talks to.
//!
//! The proxy needs only two things from the platform: a way to turn a
//! browser's session cookie into a session record, and the location of the
//! active project's API. Both live here, together with the credential
//! sources that distinguish `ory proxy` from `ory tunnel`.
//!
//! # Example
//!
//! ```no_run
//! use ory_client::{FrontendClient, ProjectRef, SessionResolver};
//!
//! # async fn example() -> ory_client::Result<()> {
//! let project = ProjectRef::from_slug("playground")?;
//! let client = FrontendClient::builder().project(&project).build()?;
//!
//! match client.whoami("ory_session_playground=abc").await? {
//!     Some(session) => println!("signed in as {}", session.identity.id),
//!     None => println!("anonymous"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod credentials;
pub mod error;
pub mod frontend;
pub mod project;
pub mod types;

pub use credentials::{
    Anonymous, ApiKeyCredentials, CredentialSource, Credentials, PROJECT_API_KEY_ENV,
};
pub use error::{Error, Result};
pub use frontend::{ClientBuilder, FrontendClient, SessionResolver};
pub use project::ProjectRef;
pub use types::{IdentityRecord, SessionRecord};
