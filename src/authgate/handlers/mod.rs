pub mod health;
pub use self::health::health;

pub mod proxy;
pub use self::proxy::{proxy, Upstream};
