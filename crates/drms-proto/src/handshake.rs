//! Capability handshake (spec §9 Open Question / REDESIGN FLAG): the
//! original gates offline-tape-read behavior on an undocumented `newflg`
//! bit inherited from a half-removed "old DRMS version that has a bug with
//! tape reads" code path. This replaces it with an explicit `HELLO`
//! exchange ahead of `OPEN`: the client advertises a capability set: the
//! server refuses any call that needs a capability the client never
//! advertised, with a named error instead of an internal status code.

/// A capability set advertised at `HELLO`. Plain `u32` bitmask rather than
/// the `bitflags` crate: two bits don't earn a new dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities(u32);

impl Capabilities {
    /// Client can handle a `PENDING` reply and wait for the asynchronous
    /// responder callback that an offline (tape) fetch requires (spec §4.7
    /// opcode GET).
    pub const OFFLINE_READ: Capabilities = Capabilities(1 << 0);
    /// Client can issue `_followall` dynamic link resolution.
    pub const LINK_FOLLOW_ALL: Capabilities = Capabilities(1 << 1);

    pub const fn empty() -> Self {
        Capabilities(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits_truncate(bits: u32) -> Self {
        Capabilities(bits & (Self::OFFLINE_READ.0 | Self::LINK_FOLLOW_ALL.0))
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for Capabilities {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Capabilities(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone)]
pub struct HelloRequest {
    pub client_version: String,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone)]
pub struct HelloReply {
    pub server_version: String,
    pub accepted: Capabilities,
}

/// Checked on the server before a GET that would need an offline (tape)
/// fetch (spec §4.7): callers that never advertised `OFFLINE_READ` at
/// `HELLO` get `OfflineReadUnsupported` instead of silently blocking.
pub fn require_offline_read(capabilities: Capabilities) -> crate::error::Result<()> {
    if capabilities.contains(Capabilities::OFFLINE_READ) {
        Ok(())
    } else {
        Err(crate::error::ProtoError::OfflineReadUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_read_requires_advertised_capability() {
        assert!(require_offline_read(Capabilities::empty()).is_err());
        assert!(require_offline_read(Capabilities::OFFLINE_READ).is_ok());
    }

    #[test]
    fn capability_union_contains_both() {
        let both = Capabilities::OFFLINE_READ | Capabilities::LINK_FOLLOW_ALL;
        assert!(both.contains(Capabilities::OFFLINE_READ));
        assert!(both.contains(Capabilities::LINK_FOLLOW_ALL));
    }
}
