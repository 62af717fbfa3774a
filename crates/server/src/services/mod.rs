//! Business rules shared by the WebSocket dispatcher and the REST routes.
//!
//! Every mutation persists first and broadcasts second, whichever path it
//! arrives on.

pub mod delivery;
pub mod direct;
pub mod media;
pub mod messages;
pub mod notifications;
pub mod presence;
