//! Interrupt and halt state.

use crate::error::ConfigError;

/// Maskable interrupt response mode, selected by `IM 0/1/2`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InterruptMode {
    /// Execute the instruction the device places on the data bus.
    #[default]
    Im0,
    /// Restart at 0x0038.
    Im1,
    /// Vectored through the table at `I:byte`.
    Im2,
}

impl TryFrom<u8> for InterruptMode {
    type Error = ConfigError;

    fn try_from(mode: u8) -> Result<Self, Self::Error> {
        match mode {
            0 => Ok(Self::Im0),
            1 => Ok(Self::Im1),
            2 => Ok(Self::Im2),
            _ => Err(ConfigError::InvalidInterruptMode(mode)),
        }
    }
}

impl From<InterruptMode> for u8 {
    fn from(mode: InterruptMode) -> Self {
        match mode {
            InterruptMode::Im0 => 0,
            InterruptMode::Im1 => 1,
            InterruptMode::Im2 => 2,
        }
    }
}

/// What the CPU does at the next instruction boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Service {
    Reset,
    Nmi,
    Interrupt,
    HaltCycle,
    Fetch,
}

/// IFF1/IFF2, interrupt mode, HALT state and the pending input lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct InterruptState {
    pub iff1: bool,
    pub iff2: bool,
    pub mode: InterruptMode,
    pub halted: bool,
    /// INT line asserted.
    pub int_line: bool,
    pub nmi_pending: bool,
    pub reset_pending: bool,
    /// The last instruction was `EI`; INT is not sampled until after the next.
    pub ei_delay: bool,
    /// The last instruction was `LD A,I` or `LD A,R`.
    pub after_ld_a_ir: bool,
}

impl InterruptState {
    /// Decide what happens at an instruction boundary. Reset outranks NMI,
    /// NMI outranks INT, and INT is masked by IFF1 and the `EI` delay.
    pub fn resolve(&self) -> Service {
        if self.reset_pending {
            Service::Reset
        } else if self.nmi_pending {
            Service::Nmi
        } else if self.int_line && self.iff1 && !self.ei_delay {
            Service::Interrupt
        } else if self.halted {
            Service::HaltCycle
        } else {
            Service::Fetch
        }
    }

    /// State after a reset: interrupts disabled, IM 0, running.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_three_is_rejected() {
        assert_eq!(InterruptMode::try_from(2), Ok(InterruptMode::Im2));
        assert_eq!(
            InterruptMode::try_from(3),
            Err(ConfigError::InvalidInterruptMode(3))
        );
    }

    #[test]
    fn priority_order() {
        let mut state = InterruptState {
            int_line: true,
            iff1: true,
            halted: true,
            ..InterruptState::default()
        };
        assert_eq!(state.resolve(), Service::Interrupt);
        state.nmi_pending = true;
        assert_eq!(state.resolve(), Service::Nmi);
        state.reset_pending = true;
        assert_eq!(state.resolve(), Service::Reset);
    }

    #[test]
    fn int_is_masked_by_iff1_and_ei_delay() {
        let mut state = InterruptState {
            int_line: true,
            halted: true,
            ..InterruptState::default()
        };
        assert_eq!(state.resolve(), Service::HaltCycle);
        state.iff1 = true;
        state.ei_delay = true;
        assert_eq!(state.resolve(), Service::HaltCycle);
        state.ei_delay = false;
        state.halted = false;
        assert_eq!(state.resolve(), Service::Interrupt);
    }
}
