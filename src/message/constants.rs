// Copyright 2025 jonefeewang@gmail.com
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

//! Frame Format Constants
//!
//! Offsets and lengths of the chat frame fields.
//!
//! # Frame Format
//!
//! Every frame consists of:
//! - 1-byte kind (0 = New, 1 = Acknowledge)
//! - 8-byte identifier (little endian)
//! - 8-byte timestamp, nanoseconds since the Unix epoch (little endian)
//! - Variable-length content, terminated by the delimiter byte
//!
//! The fixed header is never escaped, so the delimiter is only searched for
//! after `HEADER_LENGTH`.

pub const KIND_OFFSET: usize = 0;
pub const KIND_LENGTH: usize = 1;
pub const IDENTIFIER_OFFSET: usize = KIND_OFFSET + KIND_LENGTH;
pub const IDENTIFIER_LENGTH: usize = 8;
pub const TIMESTAMP_OFFSET: usize = IDENTIFIER_OFFSET + IDENTIFIER_LENGTH;
pub const TIMESTAMP_LENGTH: usize = 8;
pub const CONTENT_OFFSET: usize = TIMESTAMP_OFFSET + TIMESTAMP_LENGTH;
pub const HEADER_LENGTH: usize = CONTENT_OFFSET;

pub const DELIMITER: u8 = b'\n';

pub const KIND_NEW: u8 = 0;
pub const KIND_ACKNOWLEDGE: u8 = 1;
