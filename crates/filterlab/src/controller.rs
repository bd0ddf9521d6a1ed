//! Overlay controls
//!
//! Draws the sample overlay and applies the user's edits to [`FilterState`]. The
//! caller decides what an edit costs; the controller only reports which kind of
//! state changed.

use crate::params::FilterState;
use crate::strategy::KernelSize;
use crate::timing::TimingCollector;
use crate::ui::Drawer;
use filterlab_manifest::SampleManifest;

/// What the overlay changed this frame
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UiChanges {
    /// Strategy, kernel, sampler or draw count changed; statistics are no longer comparable
    pub selection: bool,
    /// The filter sampler changed; binding sets must be rewritten
    pub sampler: bool,
    /// A parameter slider moved
    pub parameters: bool,
}

impl UiChanges {
    /// Whether recorded commands are out of date
    pub fn any(&self) -> bool {
        self.selection || self.sampler || self.parameters
    }
}

/// Draws the overlay widgets of a sample
#[derive(Debug, Default, Clone, Copy)]
pub struct ParameterController;

impl ParameterController {
    /// Draws every overlay section and applies the edits to `state`
    ///
    /// # Arguments
    /// * `drawer` - Widget backend
    /// * `state` - Current selection and parameter values
    /// * `manifest` - Sample description providing labels and ranges
    /// * `timing` - Statistics to show, if timestamps are available
    ///
    /// # Returns
    /// The kinds of state that changed
    pub fn record_ui(drawer: &mut dyn Drawer, state: &mut FilterState, manifest: &SampleManifest, timing: Option<&TimingCollector>) -> UiChanges {
        let mut changes = UiChanges::default();

        if drawer.header("Select shader") {
            Self::selection_controls(drawer, state, manifest, &mut changes);
        }

        if !state.parameters.is_empty() && drawer.header("Parameters") {
            for parameter in &mut state.parameters {
                let (min, max) = (parameter.spec.min, parameter.spec.max);
                if drawer.slider_float(&parameter.spec.name, &mut parameter.value, min, max) {
                    changes.parameters = true;
                }
            }
        }

        if let Some(timing) = timing {
            Self::timing_sections(drawer, timing);
        }

        if changes.any() {
            tracing::info!(
                "Overlay changed selection to {} {} ({} sampler, {} draws)",
                state.strategy,
                state.kernel.label(),
                state.sampler.name(),
                state.draw_count
            );
        }
        changes
    }

    fn selection_controls(drawer: &mut dyn Drawer, state: &mut FilterState, manifest: &SampleManifest, changes: &mut UiChanges) {
        for index in 0..manifest.kernel_count() {
            if index > 0 {
                drawer.same_line();
            }
            let label = manifest.kernel_label(index).unwrap_or_else(|| KernelSize(index).label());
            // A press re-selects even the current kernel
            if drawer.button(&label) {
                state.kernel = KernelSize(index);
                changes.selection = true;
            }
        }

        let names = manifest.strategy_names();
        let mut selected = manifest.strategies.iter().position(|spec| spec.kind == state.strategy).unwrap_or(0);
        if drawer.combo_box("type", &mut selected, &names) {
            if let Some(spec) = manifest.strategies.get(selected) {
                state.strategy = spec.kind;
                changes.selection = true;
            }
        }

        if manifest.samplers.len() > 1 {
            let names: Vec<&str> = manifest.samplers.iter().map(|sampler| sampler.name()).collect();
            let mut selected = manifest.samplers.iter().position(|&sampler| sampler == state.sampler).unwrap_or(0);
            if drawer.combo_box("sampler", &mut selected, &names) {
                if let Some(&sampler) = manifest.samplers.get(selected) {
                    state.sampler = sampler;
                    changes.sampler = true;
                    changes.selection = true;
                }
            }
        }

        if manifest.max_draw_count > 1 {
            let max = i32::try_from(manifest.max_draw_count).unwrap_or(i32::MAX);
            let mut count = i32::try_from(state.draw_count).unwrap_or(max);
            if drawer.slider_int("draw calls count", &mut count, 1, max) {
                state.draw_count = count.clamp(1, max) as u32;
                changes.selection = true;
            }
        }
    }

    fn timing_sections(drawer: &mut dyn Drawer, timing: &TimingCollector) {
        if drawer.header("Frametime") {
            match timing.last() {
                Some(sample) => {
                    if sample.regions.len() > 1 {
                        for region in &sample.regions {
                            drawer.text(&format!("{}: {:.4} ms", region.label, region.elapsed_ms));
                        }
                    }
                    drawer.text(&format!("total: {:.4} ms", sample.total_ms));
                }
                None => drawer.text("total: - ms"),
            }
        }

        if drawer.header("Average frametime") {
            drawer.text(&format!("{} frames", timing.frames()));
            if let Some(sample) = timing.last().filter(|sample| sample.regions.len() > 1) {
                for (region, mean) in sample.regions.iter().zip(timing.region_means()) {
                    drawer.text(&format!("{}: {:.4} ms", region.label, mean.mean()));
                }
            }
            drawer.text(&format!("total: {:.4} ms", timing.total_mean().mean()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SharedDevice;
    use crate::orchestrator::StrategyTable;
    use crate::strategy::Strategy;
    use crate::testing::{RecordingDevice, ScriptedDrawer, manifest};
    use filterlab_manifest::SamplerChoice;
    use std::sync::Arc;

    #[test]
    fn test_layout_without_input() {
        let manifest = manifest("bilateral_filter");
        let mut state = FilterState::from_manifest(&manifest);
        let mut drawer = ScriptedDrawer::default();

        let changes = ParameterController::record_ui(&mut drawer, &mut state, &manifest, None);
        assert_eq!(changes, UiChanges::default());
        assert_eq!(drawer.headers, vec!["Select shader", "Parameters"]);
        assert_eq!(drawer.buttons, vec!["3x3", "5x5", "7x7"]);
        assert_eq!(drawer.combos["type"], vec!["default", "optimized", "compute"]);
        assert_eq!(drawer.combos["sampler"], vec!["nearest", "linear"]);
        assert_eq!(drawer.sliders, vec!["draw calls count", "sigma_d", "sigma_r"]);
    }

    #[test]
    fn test_optional_widgets_hidden() {
        let manifest = manifest("taa_stats");
        let mut state = FilterState::from_manifest(&manifest);
        let mut drawer = ScriptedDrawer::default();
        ParameterController::record_ui(&mut drawer, &mut state, &manifest, None);

        assert!(!drawer.combos.contains_key("sampler"));
        assert!(!drawer.sliders.iter().any(|s| s == "draw calls count"));
    }

    /// Pressing the button of the current kernel still counts as a selection
    #[test]
    fn test_kernel_button_always_selects() {
        let manifest = manifest("gaussian_filter");
        let mut state = FilterState::from_manifest(&manifest);

        let changes = ParameterController::record_ui(&mut ScriptedDrawer::pressing("3x3"), &mut state, &manifest, None);
        assert!(changes.selection);
        assert_eq!(state.kernel, KernelSize(0));

        let changes = ParameterController::record_ui(&mut ScriptedDrawer::pressing("7x7"), &mut state, &manifest, None);
        assert!(changes.selection && !changes.sampler);
        assert_eq!(state.kernel, KernelSize(2));
    }

    #[test]
    fn test_strategy_combo() {
        let manifest = manifest("gaussian_filter");
        let mut state = FilterState::from_manifest(&manifest);

        let changes = ParameterController::record_ui(&mut ScriptedDrawer::choosing("type", 2), &mut state, &manifest, None);
        assert!(changes.selection);
        assert_eq!(state.strategy, Strategy::Linear);
    }

    #[test]
    fn test_sampler_combo_requests_rebind() {
        let manifest = manifest("bilateral_filter");
        let mut state = FilterState::from_manifest(&manifest);

        assert_eq!(state.sampler, SamplerChoice::Nearest);
        let changes = ParameterController::record_ui(&mut ScriptedDrawer::choosing("sampler", 1), &mut state, &manifest, None);
        assert!(changes.sampler && changes.selection);
        assert_eq!(state.sampler, SamplerChoice::Linear);
    }

    /// Parameter edits re-record without counting as a selection
    #[test]
    fn test_parameter_slider() {
        let manifest = manifest("gaussian_filter");
        let mut state = FilterState::from_manifest(&manifest);
        let mut drawer = ScriptedDrawer::default();
        drawer.float_values.insert("sigma".into(), 1.5);

        let changes = ParameterController::record_ui(&mut drawer, &mut state, &manifest, None);
        assert_eq!(
            changes,
            UiChanges {
                parameters: true,
                ..Default::default()
            }
        );
        assert_eq!(state.parameter("sigma"), Some(1.5));
    }

    #[test]
    fn test_draw_count_slider_clamped() {
        let manifest = manifest("bilateral_filter");
        let mut state = FilterState::from_manifest(&manifest);
        let mut drawer = ScriptedDrawer::default();
        drawer.int_values.insert("draw calls count".into(), 1000);

        let changes = ParameterController::record_ui(&mut drawer, &mut state, &manifest, None);
        assert!(changes.selection);
        assert_eq!(state.draw_count, 256);
    }

    #[test]
    fn test_collapsed_header_hides_widgets() {
        let manifest = manifest("bilateral_filter");
        let mut state = FilterState::from_manifest(&manifest);
        let mut drawer = ScriptedDrawer::pressing("5x5");
        drawer.collapsed.insert("Select shader".into());

        let changes = ParameterController::record_ui(&mut drawer, &mut state, &manifest, None);
        assert!(!changes.any());
        assert!(drawer.buttons.is_empty());
    }

    #[test]
    fn test_timing_sections() {
        let manifest = manifest("gaussian_filter");
        let device = Arc::new(RecordingDevice::new());
        let shared: SharedDevice = device.clone();
        device.set_timestamps(vec![0, 1_000_000, 1_000_000, 3_000_000]);

        let table = StrategyTable::for_manifest(&manifest);
        let mut timing = TimingCollector::new(&shared).unwrap();
        timing.mark_submitted();
        timing.collect(table.entry(Strategy::Linear).unwrap()).unwrap();

        let mut state = FilterState::from_manifest(&manifest);
        let mut drawer = ScriptedDrawer::default();
        ParameterController::record_ui(&mut drawer, &mut state, &manifest, Some(&timing));

        assert!(drawer.headers.iter().any(|h| h == "Frametime"));
        assert_eq!(
            drawer.texts,
            vec![
                "first pass: 1.0000 ms",
                "second pass: 2.0000 ms",
                "total: 3.0000 ms",
                "1 frames",
                "first pass: 1.0000 ms",
                "second pass: 2.0000 ms",
                "total: 3.0000 ms",
            ]
        );
    }
}
