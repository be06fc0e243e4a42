//! Lakeapps Client - platform REST bindings
//!
//! Implements [`ClientFactory`](lakeapps_core::ClientFactory) over the
//! workspace REST API and provides the SQL, warehouse, Genie and identity
//! operations run by the dual-path invoker.

pub mod auth;
pub mod factory;
pub mod genie;
pub mod http;
pub mod identity;
pub mod sql;
pub mod warehouses;

pub use factory::PlatformConnector;
pub use genie::{
    default_message_routes, ListConversations, ListMessages, ListSpaces, MessageRoute,
    StartConversation,
};
pub use http::PlatformClient;
pub use identity::{describe_identity, WhoAmI};
pub use sql::{StatementQuery, TableQuery};
pub use warehouses::{ListWarehouses, StartWarehouse, WarehouseState, WarehouseStatus};

/// Invoker wired to the platform connector.
pub type Invoker = lakeapps_core::DualPathInvoker<PlatformConnector>;
