pub mod image_input;
pub mod inference;
pub mod notifier;
pub mod storage;
pub mod store;
