//! Hardware forwarding driver contract.
//!
//! Programs VLAN existence and per-port/per-LAG membership into the
//! switch ASIC. Every call is synchronous and either succeeds or fails
//! as a whole; there is no partial-success state.

use tracing::warn;

use crate::error::MembershipResult;
use crate::types::{HwPort, LagHandle, NpuId, PortMode, VlanId};

/// Forwarding-plane programming surface consumed by the membership core.
pub trait ForwardingDriver: Send + Sync {
    /// Creates a VLAN on the given forwarding unit.
    fn create_vlan(&self, npu: NpuId, vlan_id: VlanId) -> MembershipResult<()>;

    /// Deletes a VLAN. Member programming calls are only valid while the
    /// VLAN exists.
    fn delete_vlan(&self, npu: NpuId, vlan_id: VlanId) -> MembershipResult<()>;

    /// Adds a physical port to a VLAN in the given mode.
    fn add_port_to_vlan(
        &self,
        port: &HwPort,
        vlan_id: VlanId,
        mode: PortMode,
    ) -> MembershipResult<()>;

    /// Removes a physical port from a VLAN.
    fn remove_port_from_vlan(
        &self,
        port: &HwPort,
        vlan_id: VlanId,
        mode: PortMode,
    ) -> MembershipResult<()>;

    /// Adds a LAG object to a VLAN in the given mode.
    fn add_lag_to_vlan(
        &self,
        lag: LagHandle,
        vlan_id: VlanId,
        mode: PortMode,
    ) -> MembershipResult<()>;

    /// Removes a LAG object from a VLAN.
    fn remove_lag_from_vlan(
        &self,
        lag: LagHandle,
        vlan_id: VlanId,
        mode: PortMode,
    ) -> MembershipResult<()>;

    /// Sets the port's default VLAN id for untagged ingress.
    fn set_port_pvid(&self, port: &HwPort, vlan_id: VlanId) -> MembershipResult<()>;

    /// Sets the LAG's default VLAN id for untagged ingress.
    fn set_lag_pvid(&self, lag: LagHandle, vlan_id: VlanId) -> MembershipResult<()>;

    /// Enables or disables MAC learning on a VLAN.
    fn set_vlan_learning(
        &self,
        npu: NpuId,
        vlan_id: VlanId,
        disabled: bool,
    ) -> MembershipResult<()>;
}

/// Adds or removes a physical port to/from a VLAN.
///
/// On an untagged add the port's PVID follows the VLAN; a PVID update
/// failure does not fail the membership change.
pub fn add_remove_port(
    driver: &dyn ForwardingDriver,
    port: &HwPort,
    vlan_id: VlanId,
    mode: PortMode,
    add: bool,
) -> MembershipResult<()> {
    if add {
        driver.add_port_to_vlan(port, vlan_id, mode)?;
        if mode == PortMode::Untagged {
            if let Err(e) = driver.set_port_pvid(port, vlan_id) {
                warn!(npu = port.npu, port = port.port, vlan_id, %e, "failed to update port PVID");
            }
        }
        Ok(())
    } else {
        driver.remove_port_from_vlan(port, vlan_id, mode)
    }
}

/// Adds or removes a LAG object to/from a VLAN, mirroring
/// [`add_remove_port`] at LAG granularity.
pub fn add_remove_lag(
    driver: &dyn ForwardingDriver,
    lag: LagHandle,
    vlan_id: VlanId,
    mode: PortMode,
    add: bool,
) -> MembershipResult<()> {
    if add {
        driver.add_lag_to_vlan(lag, vlan_id, mode)?;
        if mode == PortMode::Untagged {
            if let Err(e) = driver.set_lag_pvid(lag, vlan_id) {
                warn!(lag, vlan_id, %e, "failed to update LAG PVID");
            }
        }
        Ok(())
    } else {
        driver.remove_lag_from_vlan(lag, vlan_id, mode)
    }
}
