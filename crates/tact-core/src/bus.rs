//! Memory and I/O bus interface.

use std::collections::HashMap;

/// Result of a bus read: the data byte plus wait states.
///
/// Wait states are extra T-states the host inserts for the access, which is
/// how memory and I/O contention reach the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadResult {
    pub data: u8,
    pub wait: u8,
}

impl ReadResult {
    /// A read that completes without wait states.
    #[must_use]
    pub const fn new(data: u8) -> Self {
        Self { data, wait: 0 }
    }

    #[must_use]
    pub const fn with_wait(data: u8, wait: u8) -> Self {
        Self { data, wait }
    }
}

/// Memory and I/O bus interface.
///
/// The CPU reaches memory, ports and the interrupting device only through
/// this trait. Writes return the number of wait states they incurred.
pub trait Bus {
    /// Read a byte from memory. `opcode_fetch` is true for M1 cycles
    /// (opcode and prefix fetches).
    fn read(&mut self, address: u16, opcode_fetch: bool) -> ReadResult;

    /// Write a byte to memory.
    fn write(&mut self, address: u16, value: u8) -> u8;

    /// Read a byte from an I/O port. The full 16-bit port address is passed.
    fn io_read(&mut self, port: u16) -> ReadResult;

    /// Write a byte to an I/O port.
    fn io_write(&mut self, port: u16, value: u8) -> u8;

    /// Byte the interrupting device places on the data bus during an
    /// interrupt acknowledge cycle. Floating bus reads as `0xFF`.
    fn interrupt_data(&mut self) -> u8 {
        0xFF
    }

    /// Read memory without side effects, for debugger tooling.
    fn peek(&self, address: u16) -> u8;
}

/// Flat 64 KiB RAM bus with preset port values.
///
/// Port writes are logged in order so tests can assert on them.
pub struct SimpleBus {
    ram: Vec<u8>,
    ports: HashMap<u16, u8>,
    port_writes: Vec<(u16, u8)>,
    interrupt_data: u8,
}

impl SimpleBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ram: vec![0; 0x1_0000],
            ports: HashMap::new(),
            port_writes: Vec::new(),
            interrupt_data: 0xFF,
        }
    }

    /// Copy `data` into memory starting at `address`, wrapping at 64K.
    pub fn load(&mut self, address: u16, data: &[u8]) {
        let mut addr = address;
        for &byte in data {
            self.ram[addr as usize] = byte;
            addr = addr.wrapping_add(1);
        }
    }

    /// Value returned by `io_read` for `port`. Unset ports read `0xFF`.
    pub fn set_port(&mut self, port: u16, value: u8) {
        self.ports.insert(port, value);
    }

    /// Byte supplied during the next interrupt acknowledge.
    pub fn set_interrupt_data(&mut self, value: u8) {
        self.interrupt_data = value;
    }

    #[must_use]
    pub fn port_writes(&self) -> &[(u16, u8)] {
        &self.port_writes
    }

    /// Dump of memory `start..start+len`, wrapping at 64K.
    #[must_use]
    pub fn dump(&self, start: u16, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| self.ram[usize::from(start.wrapping_add(i as u16))])
            .collect()
    }
}

impl Default for SimpleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SimpleBus {
    fn read(&mut self, address: u16, _opcode_fetch: bool) -> ReadResult {
        ReadResult::new(self.ram[address as usize])
    }

    fn write(&mut self, address: u16, value: u8) -> u8 {
        self.ram[address as usize] = value;
        0
    }

    fn io_read(&mut self, port: u16) -> ReadResult {
        ReadResult::new(self.ports.get(&port).copied().unwrap_or(0xFF))
    }

    fn io_write(&mut self, port: u16, value: u8) -> u8 {
        self.port_writes.push((port, value));
        0
    }

    fn interrupt_data(&mut self) -> u8 {
        self.interrupt_data
    }

    fn peek(&self, address: u16) -> u8 {
        self.ram[address as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_wraps_at_top_of_memory() {
        let mut bus = SimpleBus::new();
        bus.load(0xFFFF, &[0x11, 0x22]);
        assert_eq!(bus.peek(0xFFFF), 0x11);
        assert_eq!(bus.peek(0x0000), 0x22);
    }

    #[test]
    fn unset_ports_float_high() {
        let mut bus = SimpleBus::new();
        bus.set_port(0x00FE, 0x1F);
        assert_eq!(bus.io_read(0x00FE).data, 0x1F);
        assert_eq!(bus.io_read(0x12FE).data, 0xFF);
    }

    #[test]
    fn port_writes_are_logged_in_order() {
        let mut bus = SimpleBus::new();
        bus.io_write(0x00FE, 7);
        bus.io_write(0x7FFD, 0x10);
        assert_eq!(bus.port_writes(), &[(0x00FE, 7), (0x7FFD, 0x10)]);
    }
}
