//! Client side of the session protocol: encrypted session storage and an
//! HTTP client that refreshes transparently.

pub mod interceptor;
pub mod secure_storage;
pub mod session;
pub mod storage;

pub use interceptor::{ApiClient, ClientError, LoginNavigator};
pub use secure_storage::SecureStorage;
pub use session::{SessionStore, SessionUser};
pub use storage::{FileStorage, MemoryStorage, StorageBackend, StorageError};
