pub mod handlers;
pub mod middleware;
pub mod realtime;
pub mod router;
