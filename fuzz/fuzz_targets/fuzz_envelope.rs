// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use libfuzzer_sys::fuzz_target;
use lilith_stream::rpc::envelope;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bodies must classify or reject, never panic, and every
    // rejection must still render as a JSON-RPC error response.
    if let Err(rejected) = envelope::parse(data) {
        let response = rejected.into_response();
        let _ = serde_json::to_vec(&response);
    }
});
