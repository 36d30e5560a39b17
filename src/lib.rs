//! Flyer Chef: reads a supermarket sales flyer with a multimodal model and
//! suggests three budget recipes built around its discounted items.

pub mod analysis;
pub mod config;
pub mod gemini;
pub mod models;
pub mod request;
pub mod routes;
pub mod session;
pub mod views;
