//! Interface registry contract.
//!
//! The registry maps interface names and indexes to their type,
//! operational attributes, and current L2/L3 mode, and tracks which
//! masters (bridge domains, LAGs) claim each member interface.

use crate::error::MembershipResult;
use crate::types::{IfIndex, InterfaceInfo, MasterInfo, ModeTransition, RegistryEntry};

/// Interface identity and mode-master bookkeeping.
///
/// `register`/`deregister` are idempotent. `set_master`/`clear_master`
/// report whether the member's effective mode changed so the caller can
/// fan out the advisory mode notification.
pub trait InterfaceRegistry: Send + Sync {
    /// Resolves an interface by OS-visible name.
    fn resolve(&self, name: &str) -> MembershipResult<InterfaceInfo>;

    /// Resolves an interface by OS interface index.
    fn resolve_index(&self, if_index: IfIndex) -> MembershipResult<InterfaceInfo>;

    /// Registers an interface owned by this core (a bridge domain).
    fn register(&self, entry: &RegistryEntry) -> MembershipResult<()>;

    /// Removes a registration added by [`InterfaceRegistry::register`].
    fn deregister(&self, name: &str) -> MembershipResult<()>;

    /// Records a master claim against `member`, pushing its mode toward
    /// L2-bridged.
    fn set_master(&self, member: IfIndex, master: MasterInfo)
        -> MembershipResult<ModeTransition>;

    /// Removes a master claim; the member's mode falls back once no
    /// other master claims it.
    fn clear_master(
        &self,
        member: IfIndex,
        master: MasterInfo,
    ) -> MembershipResult<ModeTransition>;
}
