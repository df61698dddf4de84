//! HTTP intake
//!
//! Notifications are delivered to `POST /events`; `GET /health` reports
//! service status. There is no query API.

pub mod events;
pub mod health;

pub use events::{event_routes, receive_event};
pub use health::{health_check, health_routes, HealthResponse};
