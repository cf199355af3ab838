use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::types::PowerState;

/// Power control of one virtual machine.
///
/// One handle exists per node; the IPMI and Redfish front ends of that node
/// share it.
pub trait Machine: Send + Sync {
    /// Whether the guest is currently running.
    fn is_running(&self) -> bool;

    /// Start the guest.
    fn power_on(&self) -> Result<()>;

    /// Stop the guest.
    fn power_off(&self) -> Result<()>;

    /// Current power state.
    fn power_status(&self) -> PowerState;
}

/// Power on, refusing when the machine is already on (or powering on).
pub(crate) fn power_on(machine: &dyn Machine) -> Result<()> {
    if machine.power_status().is_on() {
        return Err(Error::StateConflict("server already powered on"));
    }
    machine.power_on()
}

/// Power off, refusing when the machine is already off (or powering off).
pub(crate) fn power_off(machine: &dyn Machine) -> Result<()> {
    if machine.power_status().is_off() {
        return Err(Error::StateConflict("server already powered off"));
    }
    machine.power_off()
}

/// Power off then on again; the machine has to be on to begin with.
pub(crate) fn power_cycle(machine: &dyn Machine) -> Result<()> {
    power_off(machine)?;
    machine.power_on()
}

/// Power on when off, power off when on.
pub(crate) fn toggle(machine: &dyn Machine) -> Result<()> {
    if machine.power_status().is_on() {
        machine.power_off()
    } else {
        machine.power_on()
    }
}

/// An in-memory [`Machine`] whose power state flips instantly.
///
/// Useful for demos and tests where no hypervisor is available.
#[derive(Debug)]
pub struct SimulatedMachine {
    state: Mutex<PowerState>,
}

impl SimulatedMachine {
    /// Create a machine in the given power state.
    pub fn new(state: PowerState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

impl Default for SimulatedMachine {
    fn default() -> Self {
        Self::new(PowerState::Off)
    }
}

impl Machine for SimulatedMachine {
    fn is_running(&self) -> bool {
        *self.state.lock() == PowerState::On
    }

    fn power_on(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == PowerState::On {
            return Err(Error::StateConflict("server already powered on"));
        }
        *state = PowerState::On;
        tracing::info!("simulated machine powered on");
        Ok(())
    }

    fn power_off(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == PowerState::Off {
            return Err(Error::StateConflict("server already powered off"));
        }
        *state = PowerState::Off;
        tracing::info!("simulated machine powered off");
        Ok(())
    }

    fn power_status(&self) -> PowerState {
        *self.state.lock()
    }
}
