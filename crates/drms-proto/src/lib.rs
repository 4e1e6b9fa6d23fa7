//! Client-server wire protocol (spec §6): opcodes, the typed key-value
//! argument codec, request/response framing, the `Records.txt` manifest
//! grammar, and the HELLO/OPEN capability handshake.

pub mod error;
pub mod frame;
pub mod handshake;
pub mod kv;
pub mod manifest;
pub mod opcode;

pub use error::{ProtoError, Result};
pub use frame::{read_request, read_rinfo, write_request, write_rinfo, RequestFrame};
pub use handshake::{require_offline_read, Capabilities, HelloReply, HelloRequest};
pub use kv::{decode_kv_list, encode_kv_list};
pub use manifest::{format_manifest, parse_manifest, Manifest};
pub use opcode::{Opcode, RINFO_PENDING, RINFO_SUCCESS};
