//! Strategy and kernel selection types

pub use filterlab_manifest::{ComputeDispatch, Strategy};

/// Index into a sample's kernel list
///
/// Kernel `i` has radius `i + 1` and edge length `2 * (i + 1) + 1`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelSize(pub usize);

impl KernelSize {
    pub fn index(self) -> usize {
        self.0
    }

    /// Radius pushed to shaders as a specialization constant
    pub fn radius(self) -> u32 {
        self.0 as u32 + 1
    }

    /// Edge length of the square kernel
    pub fn edge(self) -> u32 {
        2 * self.radius() + 1
    }

    /// Overlay label, e.g. `5x5`
    pub fn label(self) -> String {
        let edge = self.edge();
        format!("{edge}x{edge}")
    }
}
