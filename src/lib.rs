//! # rso-bridge (local client sign-on)
//!
//! `rso-bridge` drives the sign-on flow of a locally running game client
//! through the client's own loopback HTTPS API, without the client UI.
//!
//! ## Flow
//!
//! 1. **Credential discovery:** the client's port and per-session secret are
//!    read from its lockfile, or pulled from its process command line.
//! 2. **Session:** one HTTP client bound to `https://127.0.0.1:<port>` with
//!    Basic auth. The local API uses a self-signed certificate, so validation
//!    is disabled for this client only.
//! 3. **Sign-on:** start authentication, solve the hCaptcha challenge, submit
//!    credentials, exchange the login token and grant the authorization.
//! 4. **Restrictions:** after sign-on the identity endpoint is polled until a
//!    ban verdict is known. Permanent bans are recorded before failing.
//!
//! ## Captcha Bridge
//!
//! The challenge has to be solved by a human. A small loopback server on port
//! `6969` serves the widget page, hands it the challenge and receives the
//! solved token, which is passed back to the waiting sign-on flow.
//!
//! ## Monitor
//!
//! A background loop periodically checks the client session and logs out any
//! identity other than the expected one.

pub mod auth;
pub mod captcha;
pub mod cli;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod monitor;
pub mod restriction;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub const GIT_COMMIT_HASH: &str = env!("RSO_BRIDGE_GIT_SHA");

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
