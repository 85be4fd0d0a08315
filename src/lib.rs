pub mod backend;
pub mod city;
pub mod config;
pub mod error;
pub mod geometry;
pub mod poller;
pub mod segments;
pub mod session;
pub mod traffic;
pub mod view;

pub use backend::{HttpBackend, RouteBackend};
pub use error::RouteError;
pub use poller::{AutoReroutePoller, PollerConfig, PollerHandle};
pub use session::{RerouteEvent, RouteSession, Routes, SessionSnapshot};
pub use traffic::Band;
