//! Keyboard input for the sample overlay
//!
//! Each key press becomes one pending [`OverlayAction`]. The next overlay pass
//! applies it to the widget it targets; widgets are matched by caption or by
//! their position within the overlay.

use filterlab::ui::Drawer;

/// An edit requested from the keyboard
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlayAction {
    /// Press the kernel button at this index
    Kernel(usize),
    /// Select the next strategy
    NextStrategy,
    /// Select the next sampler
    NextSampler,
    /// Change the draw count by this amount
    DrawCount(i32),
    /// Move the parameter slider at `index` by `steps` twentieths of its range
    Parameter { index: usize, steps: f32 },
}

/// [`Drawer`] fed by key presses that collects the overlay text
#[derive(Debug, Default)]
pub struct KeyboardDrawer {
    pending: Option<OverlayAction>,
    buttons_seen: usize,
    float_sliders_seen: usize,
    lines: Vec<String>,
}

impl KeyboardDrawer {
    pub fn queue(&mut self, action: OverlayAction) {
        self.pending = Some(action);
    }

    /// Resets per-pass widget counters and text
    pub fn begin_pass(&mut self) {
        self.buttons_seen = 0;
        self.float_sliders_seen = 0;
        self.lines.clear();
    }

    /// Drops an action no widget of the last pass accepted
    pub fn end_pass(&mut self) {
        if let Some(action) = self.pending.take() {
            tracing::debug!("Nothing in the overlay accepts {action:?}");
        }
    }

    /// Text drawn by the last pass, headers included
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    fn take_if(&mut self, matches: impl Fn(OverlayAction) -> bool) -> Option<OverlayAction> {
        match self.pending {
            Some(action) if matches(action) => self.pending.take(),
            _ => None,
        }
    }
}

impl Drawer for KeyboardDrawer {
    fn header(&mut self, caption: &str) -> bool {
        self.lines.push(format!("[{caption}]"));
        true
    }

    fn button(&mut self, _caption: &str) -> bool {
        let index = self.buttons_seen;
        self.buttons_seen += 1;
        self.take_if(|action| action == OverlayAction::Kernel(index)).is_some()
    }

    fn combo_box(&mut self, caption: &str, selected: &mut usize, items: &[&str]) -> bool {
        let wanted = match caption {
            "type" => OverlayAction::NextStrategy,
            "sampler" => OverlayAction::NextSampler,
            _ => return false,
        };
        if items.len() < 2 || self.take_if(|action| action == wanted).is_none() {
            return false;
        }
        *selected = (*selected + 1) % items.len();
        self.lines.push(format!("{caption}: {}", items[*selected]));
        true
    }

    fn slider_float(&mut self, caption: &str, value: &mut f32, min: f32, max: f32) -> bool {
        let index = self.float_sliders_seen;
        self.float_sliders_seen += 1;
        let Some(OverlayAction::Parameter { steps, .. }) = self.take_if(|action| matches!(action, OverlayAction::Parameter { index: i, .. } if i == index)) else {
            return false;
        };
        let updated = (*value + steps * (max - min) / 20.0).clamp(min, max);
        if updated == *value {
            return false;
        }
        *value = updated;
        tracing::info!("{caption} = {updated:.3}");
        true
    }

    fn slider_int(&mut self, caption: &str, value: &mut i32, min: i32, max: i32) -> bool {
        let Some(OverlayAction::DrawCount(delta)) = self.take_if(|action| matches!(action, OverlayAction::DrawCount(_))) else {
            return false;
        };
        let updated = value.saturating_add(delta).clamp(min, max);
        if updated == *value {
            return false;
        }
        *value = updated;
        tracing::info!("{caption} = {updated}");
        true
    }

    fn text(&mut self, text: &str) {
        self.lines.push(format!("  {text}"));
    }
}
