//! beacon-service — the status service on top of the Beacon store.
//!
//! | Operation | Caller tier | Effect |
//! |---|---|---|
//! | `check_auth` | any | verify an id/secret pair |
//! | `provision` | owner for admins, else admin or owner | issue a credential |
//! | `bootstrap_owner` | none, first credential only | issue the owner credential |
//! | `record_heartbeat` | system | queue a heartbeat timestamp |
//! | `update_value` | system | queue a telemetry key update |
//! | `fetch_value` | client, admin or owner | read one telemetry key |
//! | `fetch_heartbeat` | client, admin or owner | read the last heartbeat |

pub mod beacon;
pub mod error;
pub mod service;

pub use beacon::Beacon;
pub use error::{ServiceError, ServiceResult};
pub use service::{IssuedCredential, StatusService};
