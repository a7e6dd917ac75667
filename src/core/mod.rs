pub mod ledger;
pub mod reconstructor;
pub mod store;
pub mod synchronizer;
pub mod view;

pub use ledger::{ApplyOutcome, LedgerSnapshot};
pub use reconstructor::{LedgerOrigin, LedgerReconstructor, Reconstruction};
pub use store::{LedgerStore, ReloadTicket};
pub use synchronizer::{AccountSession, LiveSynchronizer, SyncExit, SyncMessage};
pub use view::{HolderPage, HolderView, filter_holders, shorten_address};
