pub mod auth;
pub mod bookings;
pub mod cli;
pub mod config;
pub mod error;
pub mod feed;
pub mod gate;
pub mod handlers;
pub mod lifecycle;
pub mod mailbox;
pub mod metrics;
pub mod routes;
pub mod service;
pub mod state;
pub mod telemetry;
pub mod websocket;
