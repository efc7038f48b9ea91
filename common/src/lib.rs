// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Types shared by the gangway crates
//!
//! The main export is [`Error`], the transport-agnostic error type used
//! throughout the control plane.  Components construct `Error`s (usually via
//! `From` impls on their own error enums) and the HTTP layer converts them to
//! Dropshot errors as one of the last steps in handling a request.

pub mod cmd;
pub mod error;

pub use error::Error;
pub use error::InternalContext;
pub use error::LookupType;
pub use error::ResourceType;
