//! Step-debugging notifications.
//!
//! A debugger that wants to implement step-over or a call-stack view
//! registers a [`StepObserver`]. The CPU reports control transfers as they
//! happen; observers see events but cannot alter execution.

/// A control transfer worth telling a debugger about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    /// `CALL`, taken `CALL cc` or `RST` at `address` pushed
    /// `return_address` and jumps to `target`.
    Call {
        address: u16,
        target: u16,
        return_address: u16,
    },
    /// `RET`, taken `RET cc`, `RETI` or `RETN` at `address` popped
    /// `return_address`.
    Return { address: u16, return_address: u16 },
    /// Taken `JP`, `JR` or `DJNZ` at `address`.
    Branch { address: u16, target: u16 },
    /// Maskable interrupt accepted while PC was `pc`.
    Interrupt { pc: u16, target: u16 },
    /// NMI accepted while PC was `pc`.
    Nmi { pc: u16 },
}

/// Receiver for [`StepEvent`]s.
pub trait StepObserver {
    fn on_step_event(&mut self, event: &StepEvent);
}

/// Forwards events to a channel. A dropped receiver silences the observer.
impl StepObserver for std::sync::mpsc::Sender<StepEvent> {
    fn on_step_event(&mut self, event: &StepEvent) {
        let _ = self.send(*event);
    }
}
