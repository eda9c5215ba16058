// Application layer: use cases over the repository.
// Clients go through `LedgerService`, never the repository directly.

pub mod error;
pub mod reporting;
pub mod service;

pub use error::*;
pub use reporting::*;
pub use service::*;
