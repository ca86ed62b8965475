pub mod cache;
pub mod model;
pub mod resolve;
pub mod service;

pub use cache::*;
pub use model::*;
pub use resolve::{resolve_latest, resolve_long_id, resolve_long_id_strict};
pub use service::*;
