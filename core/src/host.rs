//! The host interface.
//!
//! The sound board talks back to the main game controller through a
//! one-byte status port, and relies on the host for the 250 ms hard-boot
//! timer. Hosts that don't care implement nothing and use [`MinHost`].

pub trait Host {
    /// Receive a status byte from the decoder.
    fn receive_data_port(&mut self, data: u8);

    /// Drop any pending status bytes. Called on a hard boot.
    fn clear_data_port(&mut self);

    /// `set` = true: start (or restart) a 250 ms timer that calls the
    /// decoder's [`start_self_tests`](crate::decoder::Decoder::start_self_tests)
    /// on expiry. `set` = false: cancel any pending timer.
    ///
    /// The decoder also counts samples during the boot window, so a host
    /// without a timing system can leave this unimplemented and the boot
    /// will still complete after 7812 pulled samples.
    fn boot_timer_control(&mut self, set: bool);
}

/// A host that ignores everything.
pub struct MinHost;

impl Host for MinHost {
    fn receive_data_port(&mut self, _data: u8) {}
    fn clear_data_port(&mut self) {}
    fn boot_timer_control(&mut self, _set: bool) {}
}
