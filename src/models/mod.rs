pub mod user;
pub mod device;
pub mod reminder;
pub mod now_playing;

pub use user::*;
pub use device::*;
pub use reminder::*;
pub use now_playing::*;
