//! Overlay widget interface
//!
//! Samples describe their overlay through [`Drawer`] calls. Each call draws one
//! widget and reports whether the user changed it this frame, in the immediate-mode
//! style of typical GUI overlays. Layout and rendering belong to the host.

pub trait Drawer {
    /// Draws a collapsible section header and returns whether it is expanded
    fn header(&mut self, caption: &str) -> bool;

    /// Draws a button and returns whether it was pressed
    fn button(&mut self, caption: &str) -> bool;

    /// Draws a combo box over `items` and returns whether `selected` changed
    fn combo_box(&mut self, caption: &str, selected: &mut usize, items: &[&str]) -> bool;

    fn slider_float(&mut self, caption: &str, value: &mut f32, min: f32, max: f32) -> bool;

    fn slider_int(&mut self, caption: &str, value: &mut i32, min: i32, max: i32) -> bool;

    fn text(&mut self, text: &str);

    /// Places the next widget on the current line
    fn same_line(&mut self) {}
}
