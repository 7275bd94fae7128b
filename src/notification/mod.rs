pub mod store;
pub mod toast;

pub use store::NotificationStore;
pub use toast::{ChannelToastPresenter, Toast, ToastPresenter, TracingToastPresenter};
