//! HTTP handlers.

pub mod auth;
pub(crate) mod health;
pub(crate) mod notice;
pub(crate) mod pages;
pub(crate) mod uploads;
