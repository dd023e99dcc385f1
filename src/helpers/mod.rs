pub mod email;
pub mod firebase;
pub mod geocode;
pub mod pdf;
pub mod store;
pub mod timers;
