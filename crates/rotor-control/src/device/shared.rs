//! State shared by the control tick and the device task.
//!
//! Every field is read and written under the one mutex that wraps the
//! record. The tick side only ever uses `try_lock`.

use crate::AzEl;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeviceRecord {
    /// Position to command, already clamped to the rotator limits
    pub commanded: AzEl,
    /// `commanded` has not been acknowledged by the daemon yet
    pub new_target: bool,
    /// Last position read back, `None` until the first good read
    pub actual: Option<AzEl>,
    /// Last exchange cycle failed
    pub io_error: bool,
    pub running: bool,
    /// Read the rotator without commanding it
    pub monitor: bool,
    /// Send a stop before closing the session
    pub stop_motion: bool,
    /// Completed exchange cycles
    pub cycles: u64,
}

impl DeviceRecord {
    pub fn new(monitor: bool) -> Self {
        Self {
            running: true,
            monitor,
            ..Self::default()
        }
    }
}
