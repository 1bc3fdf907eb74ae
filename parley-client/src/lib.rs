//! Networking and state for the parley chat client.
//!
//! The UI owns an [`AppState`] and a [`Driver`]. User actions call into the state, which
//! answers with [`Effect`]s; the driver runs them and feeds the results back as [`Update`]s.

pub mod api;
pub mod config;
mod driver;
pub mod error;
pub mod http;
pub mod media;
pub mod session;
pub mod socket;
pub mod state;

pub use api::ChatApi;
pub use config::Config;
pub use driver::{execute, Driver};
pub use error::{ClientError, Result};
pub use http::HttpApi;
pub use media::{MediaHost, UploadHost};
pub use session::SessionStore;
pub use socket::{EventChannel, EventConnector, InboundEvent, OutboundEvent, SocketIoConnector};
pub use state::{AppState, Effect, Picture, Toast, ToastLevel, Update};
