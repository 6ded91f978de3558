//! Client side of the hosted data service.
//!
//! [`DataService`] is the seam the marketplace talks to: row queries, stored
//! procedures, change subscriptions and auth. [`RestDataService`] speaks to a
//! hosted backend over HTTP and websockets, [`MemoryDataService`] keeps
//! everything in-process. [`LiveView`] keeps a view's rows current from
//! either of them.

pub mod error;
pub mod live;
pub mod memory;
pub mod query;
pub mod rest;
pub mod service;

pub use error::{RemoteError, RemoteResult};
pub use live::{LiveView, RealtimeStatus, ViewState};
pub use memory::{ColumnDefault, MemoryDataService, Procedure, TableSet};
pub use query::{compare_values, Embed, Filter, FilterOp, Order, Query, Row};
pub use rest::{decode_change, RestDataService};
pub use service::{
    decode_row, decode_rows, encode_row, AuthUser, ChangeEvent, ChangeKind, DataService,
    EventFilter, Session, Subscription, SubscriptionId, SubscriptionRequest,
};
