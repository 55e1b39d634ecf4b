//! OS network mirror contract.
//!
//! Reflects bridge membership into the local kernel network stack.
//! OS-layer changes are applied before hardware programming because they
//! are cheaper to detect and undo, and downstream consumers of OS
//! topology must never observe a member the hardware rejected.

use crate::error::MembershipResult;
use crate::types::PortMode;

/// Kernel-visible bridge topology mutations.
pub trait OsMirror: Send + Sync {
    /// Adds `member` to `bridge` in the kernel.
    fn add_member(&self, bridge: &str, member: &str, mode: PortMode) -> MembershipResult<()>;

    /// Removes `member` from `bridge` in the kernel.
    fn remove_member(&self, bridge: &str, member: &str, mode: PortMode) -> MembershipResult<()>;
}

/// Applies an add or remove against the mirror based on `add`.
pub fn add_or_remove(
    os: &dyn OsMirror,
    bridge: &str,
    member: &str,
    mode: PortMode,
    add: bool,
) -> MembershipResult<()> {
    if add {
        os.add_member(bridge, member, mode)
    } else {
        os.remove_member(bridge, member, mode)
    }
}
