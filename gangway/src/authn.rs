// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bearer-token authentication that trusts the asserted actor id
//!
//! Requests carry `Authorization: Bearer gangway-spoof-<uuid>` and the
//! server takes the uuid at face value.  This is a development and test
//! scheme; in a real deployment an identity provider sits in front of
//! this server and asserts actor identity some other way.
//!
//! All parse failures map to the same external 401.  The internal
//! message says what actually went wrong.

use gangway_common::Error;
use http::header;
use http::HeaderMap;
use uuid::Uuid;

/// Token prefix marking a spoofed actor id.
pub const SPOOF_PREFIX: &str = "gangway-spoof-";

/// Who is making this request
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Actor {
    pub id: Uuid,
}

/// Extracts the [`Actor`] asserted by the request's credentials.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Error> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Err(unauthenticated("no authorization header"));
    };
    let Ok(value) = value.to_str() else {
        return Err(unauthenticated("authorization header is not valid UTF-8"));
    };
    let Some(token) = value.strip_prefix("Bearer ") else {
        return Err(unauthenticated("authorization header is not a bearer token"));
    };
    let Some(asserted_id) = token.strip_prefix(SPOOF_PREFIX) else {
        return Err(unauthenticated("unrecognized credential format"));
    };
    match Uuid::parse_str(asserted_id) {
        Ok(id) => Ok(Actor { id }),
        Err(_) => Err(unauthenticated("credential does not contain a valid id")),
    }
}

/// Returns the `Authorization` header value asserting `id`.  Intended
/// for clients and tests.
pub fn make_header_value(id: Uuid) -> String {
    format!("Bearer {}{}", SPOOF_PREFIX, id)
}

fn unauthenticated(internal_message: &str) -> Error {
    Error::Unauthenticated { internal_message: internal_message.to_string() }
}
