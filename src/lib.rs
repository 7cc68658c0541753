//! Moodify search backend: proxies Spotify catalog search for the web
//! front-end, with a shared cached client-credentials token.

pub mod config;
pub mod error;
pub mod handlers;
pub mod retry;
pub mod spotify;
