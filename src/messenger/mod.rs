//! The direct-messaging channel between a user and their trainer.

pub mod alert;
pub mod membership;
pub mod reconciler;
pub mod session;
pub mod store;
pub mod view;

pub use alert::NewMessageAlert;
pub use session::{Messenger, MessengerHandle};
pub use view::{NoticeKind, ViewError, ViewState};
