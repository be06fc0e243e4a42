//! Lakeapps Core: credentials, dual-path invoker, and result model
//!
//! Every platform call is made under one of two identities: the app's
//! service principal or the end user's forwarded token. This crate holds the
//! pieces that do not touch the network.

pub mod config;
pub mod context;
pub mod credential;
pub mod data_model;
pub mod error;
pub mod identity;
pub mod invoker;
pub mod locator;

pub use config::{PollPolicy, Settings, SpSecret};
pub use context::RequestContext;
pub use credential::{
    AuthMode, Credential, CredentialResolver, SecretToken, DEFAULT_TOKEN_HEADER,
    DEFAULT_USERNAME_HEADER,
};
pub use data_model::{row, DualResult, QueryResult, QueryStatus, Row, Tabular};
pub use error::{AppError, ErrorKind};
pub use identity::{IdentityReport, OboReadiness};
pub use invoker::{ClientFactory, DualPathInvoker, Operation, PathState};
pub use locator::{ResourceLocator, WarehouseRef};

pub const LAKEAPPS_VERSION: &str = env!("CARGO_PKG_VERSION");
