//! Power-on and reset configuration.

/// Register values applied by `new` and `reset`.
///
/// Real silicon leaves SP and AF undefined at power-on; most emulators and
/// test suites assume all bits set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Z80Config {
    pub reset_sp: u16,
    pub reset_af: u16,
}

impl Default for Z80Config {
    fn default() -> Self {
        Self {
            reset_sp: 0xFFFF,
            reset_af: 0xFFFF,
        }
    }
}
