// Copyright 2025 itscheems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Crucible SDK - Wire protocol and client library
//!
//! This crate defines the line-delimited JSON protocol spoken by the
//! Crucible exchange simulator, plus a thin typed client for traders
//! and market-data observers.
//!
//! The SDK is designed to be lightweight and embeddable:
//! - No background threads
//! - No runtime initialization
//! - No environment or configuration loading

pub mod client;
pub mod protocol;
pub mod types;

pub use client::{ClientError, ObserverClient, TraderClient};
pub use protocol::{Envelope, Request, ServerMessage, decode};
pub use types::*;
