#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Webhook
//!
//! The thin HTTP boundary that turns inbound webhook events into engine
//! runs.
//!
//! A [`TriggerLookup`] resolves a request path to a deployed workflow plus
//! its provider configuration. GET requests go through provider-specific
//! verification (the WhatsApp subscribe handshake, a plain 200 for the
//! rest); POST requests are wrapped into the webhook envelope and drive one
//! execution. Everything mounts as an axum [`Router`](axum::Router) via
//! [`webhook_router`], so the embedding service decides where it lives.

pub mod dispatch;
pub mod lookup;
pub mod provider;
pub mod server;

pub use dispatch::{VerifyAction, build_envelope, verify_get};
pub use lookup::{StaticLookup, TriggerBinding, TriggerLookup};
pub use provider::{Provider, ProviderConfig};
pub use server::{WebhookState, webhook_router};
