//! burnbox - disposable-mailbox relay core
//!
//! This crate provides the core functionality for a disposable-email
//! relay surfaced through a chat interface: mailbox lifecycle with
//! seen-message dedup, a resilient mail-provider client, dual-channel
//! access gating, and a background new-mail poller.

pub mod app;
pub mod config;
pub mod domain;
pub mod providers;
pub mod services;
pub mod storage;

pub use app::App;
