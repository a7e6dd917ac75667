//! Domain types shared by the reconstructor, synchronizer and view.

pub mod events;
pub mod holder;

pub use events::{LogPosition, TransferDelta, transfer_topic};
pub use holder::{HolderRecord, format_address, format_percent, format_units};
