//! Permissioned relay
//!
//! Accepts transactions built by untrusted clients and adds the marketplace
//! admin's signature, but only to envelopes whose every marketplace
//! instruction is on the whitelist. Split into:
//! - **validator**: decoding, structural checks, tag recomputation
//! - **envelope**: stage types from `Received` to `Submitted`
//! - **pipeline**: co-signing, submission with retry, confirmation
//! - **server**: axum routes
//! - **errors**: rejection reasons and their HTTP mapping

pub mod envelope;
pub mod errors;
pub mod pipeline;
pub mod server;
pub mod validator;

pub use envelope::{CoSigned, Decoded, Received, RelayStage, Submitted, Validated};
pub use errors::{RejectReason, RelayError, COARSE_REJECTION};
pub use pipeline::{PermissionedRelay, RelaySettings};
pub use server::{router, serve, RelayRequest, RelayResponse};
pub use validator::{decode_envelope, validate, InstructionWhitelist, Validation};
