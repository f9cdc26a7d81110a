pub mod live_view;
pub mod presenter;

pub use live_view::{LivePresenter, LiveWindow};
pub use presenter::{HeadlessPresenter, Presenter};
