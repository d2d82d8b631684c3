//! Domain services between the handlers and the repositories

pub mod expansion;
pub mod tag;
pub mod user;

pub use expansion::{ExpansionService, Statistic};
pub use tag::TagService;
pub use user::UserService;
