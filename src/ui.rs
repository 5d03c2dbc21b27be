// UI ingress/egress (§6). The core only consumes `UiEvent` and produces
// `Status` on every state change; the display/touch UI itself is an
// external collaborator and stays out of this crate.

use crate::session::AssistantState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    RecordStart,
    RecordStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub state: AssistantState,
    pub wifi_connected: bool,
    pub proxy_connected: bool,
}

/// Callback invoked whenever `Status` changes. Boxed so `SessionController`
/// can be constructed with either a closure or a channel sender.
pub type StatusSink = Box<dyn Fn(Status) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_comparable_for_change_detection() {
        let a = Status {
            state: AssistantState::Idle,
            wifi_connected: false,
            proxy_connected: false,
        };
        let b = a;
        assert_eq!(a, b);
    }
}
