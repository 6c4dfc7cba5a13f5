use winit::event::WindowEvent;

use crate::probe::Measurement;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract implemented by the binary.
pub trait App {
    /// Called once, after the timed draw has been read back.
    fn on_measurement(&mut self, measurement: &Measurement) -> AppControl;

    /// Called for window events while idling.
    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let _ = event;
        AppControl::Continue
    }
}
