pub mod generation;
pub mod model_config;
pub mod notification;
pub mod work_item;
