pub mod assignment;
pub mod demo;
pub mod demo_media;
pub mod feedback;
pub mod lead;
pub mod product;
pub mod share_link;
pub mod storage_usage;
pub mod user;

pub use assignment::DemoAssignment;
pub use demo::Demo;
pub use demo_media::DemoMedia;
pub use feedback::Feedback;
pub use lead::Lead;
pub use product::Product;
pub use share_link::ShareLink;
pub use storage_usage::StorageUsage;
pub use user::User;
