pub mod delivery;
pub mod error;
pub mod hash;
pub mod node;
pub mod session;

// Re-export public types
pub use delivery::{DeliveryRecord, DeliveryStore, ValidDelivery};
pub use error::{CredentialKind, GateError};
pub use hash::Salt;
pub use node::NodePool;
pub use session::{SessionRecord, SessionStore};
