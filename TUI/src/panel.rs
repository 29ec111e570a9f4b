use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanelState {
    #[default]
    Closed,
    Open,
}

/// Open/closed state of the chat popup and the delayed input focus that follows opening.
#[derive(Debug, Default)]
pub struct Panel {
    state: PanelState,
    focus_delay: Duration,
    focus_due: Option<Instant>,
    input_focused: bool,
}

impl Panel {
    pub fn new(focus_delay: Duration) -> Self {
        Self {
            focus_delay,
            ..Self::default()
        }
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == PanelState::Open
    }

    pub fn input_focused(&self) -> bool {
        self.input_focused
    }

    pub fn toggle(&mut self, now: Instant) -> PanelState {
        match self.state {
            PanelState::Closed => {
                self.state = PanelState::Open;
                // Let the open transition settle before the input takes focus
                self.focus_due = Some(now + self.focus_delay);
                self.tick(now);
            }
            PanelState::Open => {
                self.state = PanelState::Closed;
                self.focus_due = None;
                self.input_focused = false;
            }
        }
        self.state
    }

    pub fn close(&mut self, now: Instant) {
        if self.is_open() {
            self.toggle(now);
        }
    }

    /// Land a scheduled focus transfer once its delay has elapsed.
    pub fn tick(&mut self, now: Instant) {
        if let Some(due) = self.focus_due {
            if now >= due {
                self.focus_due = None;
                self.input_focused = true;
            }
        }
    }

    pub fn focus_input(&mut self) {
        if self.is_open() {
            self.focus_due = None;
            self.input_focused = true;
        }
    }
}
