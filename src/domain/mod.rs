mod account;
mod business;
mod ledger;
mod money;
mod posting;
mod round_up;
mod transaction;

pub use account::*;
pub use business::*;
pub use ledger::*;
pub use money::*;
pub use posting::*;
pub use round_up::*;
pub use transaction::*;
