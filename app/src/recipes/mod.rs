//! Portion controls: recipes attached to a product or one of its variants.

pub mod grouping;
pub mod guard;
mod models;
mod resources;
pub mod targets;

pub use self::grouping::group_by_category;
pub use self::models::*;
pub use self::resources::*;
pub use self::targets::recipe_targets;
