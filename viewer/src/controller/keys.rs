use super::state::ControlEvent;
use crate::input::KeyCode;

/// Key bindings. Unbound keys yield `None`.
pub fn event_for(key: KeyCode) -> Option<ControlEvent> {
    match key {
        KeyCode::Char(' ') => Some(ControlEvent::AdvanceMode),
        KeyCode::Char('m') => Some(ControlEvent::ClearAccumulator),
        KeyCode::Char('t') => Some(ControlEvent::ToggleSource),
        KeyCode::Char('y') => Some(ControlEvent::NextFile),
        KeyCode::Char('q') | KeyCode::Escape => Some(ControlEvent::Quit),
        KeyCode::Char(_) => None,
    }
}
