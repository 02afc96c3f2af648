//! Session layer: the fetch capability and its lifecycle
//!
//! # Components
//!
//! - `Session` / `SessionFactory`: the opaque page-retrieval capability
//! - `SessionManager`: creation, health check and forced restart for one slot
//! - `HttpSession`: default reqwest-backed capability

mod http;
mod manager;
mod traits;

pub use http::{build_http_client, HttpSession, HttpSessionFactory};
pub use manager::{SessionError, SessionHandle, SessionManager};
pub use traits::{FetchError, Session, SessionFactory, SessionOptions};
