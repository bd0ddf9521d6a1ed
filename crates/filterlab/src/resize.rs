//! Resize decisions
//!
//! The coordinator only decides what a resize means for the sample; the sample
//! carries out the work. Keeping the decision separate lets the lifecycle rules be
//! tested without any device.

use crate::device::Extent;

/// Where a sample is in its lifecycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// `prepare` has not completed
    #[default]
    Unprepared,
    /// Resources, bindings and commands match the current extent
    Ready,
    /// The surface is empty; resources are released until a positive extent arrives
    AwaitingExtent,
}

/// Outcome of a resize request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeDecision {
    /// Nothing to do
    Skip,
    /// Release size-dependent resources and stop rendering
    Suspend,
    /// Rebuild everything for the extent
    Rebuild(Extent),
}

/// Tracks the prepared extent and decides how to react to resizes
#[derive(Debug, Default, Clone)]
pub struct ResizeCoordinator {
    lifecycle: Lifecycle,
    extent: Option<Extent>,
}

impl ResizeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether frames may be recorded and submitted
    pub fn is_prepared(&self) -> bool {
        self.lifecycle == Lifecycle::Ready
    }

    /// Decides what a resize to `width` x `height` requires
    pub fn decide(&self, width: u32, height: u32) -> ResizeDecision {
        let extent = Extent::new(width, height);
        match self.lifecycle {
            Lifecycle::Unprepared => ResizeDecision::Skip,
            Lifecycle::Ready if extent.is_empty() => ResizeDecision::Suspend,
            Lifecycle::Ready if self.extent == Some(extent) => ResizeDecision::Skip,
            Lifecycle::AwaitingExtent if extent.is_empty() => ResizeDecision::Skip,
            Lifecycle::Ready | Lifecycle::AwaitingExtent => ResizeDecision::Rebuild(extent),
        }
    }

    /// Marks the start of a rebuild; the sample stays unprepared until [`Self::mark_ready`]
    pub fn begin_rebuild(&mut self) {
        if self.lifecycle == Lifecycle::Ready {
            self.lifecycle = Lifecycle::AwaitingExtent;
        }
    }

    pub fn mark_ready(&mut self, extent: Extent) {
        self.lifecycle = Lifecycle::Ready;
        self.extent = Some(extent);
    }

    /// Releases the prepared extent and waits for a positive one
    pub fn suspend(&mut self) {
        self.lifecycle = Lifecycle::AwaitingExtent;
        self.extent = None;
    }
}
