mod models;
mod notifications;
mod resources;

pub use self::models::*;
pub use self::notifications::NotificationFeed;
pub use self::resources::*;
