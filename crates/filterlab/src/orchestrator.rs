//! Frame command recording
//!
//! A frame is recorded once per frame slot and replayed until something changes.
//! Every frame has the same outer shape: reset the query pool, composite the source
//! texture into the main target, run the selected strategy's passes, then draw the
//! overlay. The strategy-specific middle is looked up in a [`StrategyTable`].

use crate::bindings::{BindingSlot, DescriptorBindingTable};
use crate::device::*;
use crate::params::{FilterState, PushConstants};
use crate::pipelines::{PassRole, PipelineVariantRegistry};
use crate::resources::{RenderPasses, ResourceSet};
use crate::strategy::{ComputeDispatch, Strategy};
use crate::timing::QUERY_POOL_SIZE;
use crate::{Error, Result};
use filterlab_manifest::SampleManifest;

/// Position of the recorder within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameStage {
    Idle,
    MainComposite,
    ComputeFirstPass,
    LinearFirstPass,
    FilterPass,
    UiPass,
    Submitted,
}

impl FrameStage {
    /// Whether a frame may move from `self` to `next`
    pub fn can_advance_to(self, next: FrameStage) -> bool {
        use FrameStage::*;
        matches!(
            (self, next),
            (Idle, MainComposite)
                | (MainComposite, ComputeFirstPass | LinearFirstPass | FilterPass)
                | (ComputeFirstPass | LinearFirstPass, FilterPass)
                | (FilterPass, UiPass)
                | (UiPass, Submitted)
        )
    }
}

/// Records the strategy-specific passes of a frame
pub type PassSequencer = fn(&mut FrameRecorder<'_>) -> Result<()>;

/// How one strategy records and times its passes
#[derive(Debug, Clone, Copy)]
pub struct StrategyEntry {
    pub strategy: Strategy,
    /// Number of timestamp pairs the sequencer writes
    pub timed_regions: u32,
    /// Pipeline roles the frame binds
    pub roles: &'static [PassRole],
    pub sequence: PassSequencer,
}

impl StrategyEntry {
    /// Timestamp slots written and read back per frame
    pub fn query_slots(&self) -> u32 {
        2 * self.timed_regions
    }

    /// Statistic labels, one per timed region
    pub fn region_labels(&self) -> &'static [&'static str] {
        match self.timed_regions {
            1 => &["filter pass"],
            _ => &["first pass", "second pass"],
        }
    }
}

/// Strategy dispatch table of a sample
#[derive(Debug, Clone)]
pub struct StrategyTable {
    entries: Vec<StrategyEntry>,
}

impl StrategyTable {
    /// Builds entries for the strategies a manifest declares
    ///
    /// Region counts come from the manifest, so the slots a frame writes and the
    /// slots read back stay in step.
    pub fn for_manifest(manifest: &SampleManifest) -> Self {
        let entries = manifest
            .strategies
            .iter()
            .map(|spec| {
                let (roles, sequence): (&'static [PassRole], PassSequencer) = match (spec.kind, spec.dispatch) {
                    (Strategy::Default | Strategy::Optimized, _) => (&[PassRole::Composite, PassRole::Filter], single_pass_filter),
                    (Strategy::Linear, _) => (&[PassRole::Composite, PassRole::LinearFirst, PassRole::LinearSecond], linear_separable),
                    (Strategy::Compute, Some(ComputeDispatch::Separable)) => (
                        &[PassRole::Composite, PassRole::ComputeFirst, PassRole::ComputeSecond, PassRole::Resolve],
                        separable_compute,
                    ),
                    (Strategy::Compute, _) => (&[PassRole::Composite, PassRole::ComputeFirst, PassRole::Resolve], tiled_compute),
                };
                StrategyEntry {
                    strategy: spec.kind,
                    timed_regions: spec.timed_regions(),
                    roles,
                    sequence,
                }
            })
            .collect();
        Self { entries }
    }

    /// Returns the entry of a strategy
    pub fn entry(&self, strategy: Strategy) -> Result<&StrategyEntry> {
        self.entries.iter().find(|entry| entry.strategy == strategy).ok_or_else(|| {
            tracing::error!("Strategy '{strategy}' has no entry in the strategy table");
            Error::UnsupportedStrategy(strategy)
        })
    }

}

/// Everything a frame reads while it is recorded
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    pub registry: &'a PipelineVariantRegistry,
    pub bindings: &'a DescriptorBindingTable,
    pub resources: &'a ResourceSet,
    pub passes: &'a RenderPasses,
    pub state: &'a FilterState,
    pub push_constants: &'a PushConstants,
    pub query_pool: QueryPoolHandle,
    /// Workgroup extent along the tiled axis of compute strategies
    pub workgroup_axis: u32,
    /// Frame slot the stream is recorded for
    pub slot: usize,
}

/// Builds one frame's command stream while enforcing stage order
#[derive(Debug)]
pub struct FrameRecorder<'a> {
    ctx: FrameContext<'a>,
    stream: CommandStream,
    stage: FrameStage,
    next_query: u32,
}

impl<'a> FrameRecorder<'a> {
    pub fn new(ctx: FrameContext<'a>) -> Self {
        Self {
            ctx,
            stream: CommandStream::new(),
            stage: FrameStage::Idle,
            next_query: 0,
        }
    }

    pub fn context(&self) -> &FrameContext<'a> {
        &self.ctx
    }

    /// Moves to the next stage, rejecting illegal transitions
    pub fn advance(&mut self, next: FrameStage) -> Result<()> {
        if !self.stage.can_advance_to(next) {
            return Err(Error::InvalidStageTransition { from: self.stage, to: next });
        }
        self.stage = next;
        Ok(())
    }

    fn reset_queries(&mut self, count: u32) {
        self.stream.push(Command::ResetQueries {
            pool: self.ctx.query_pool,
            first: 0,
            count,
        });
    }

    /// Writes the next timestamp slot
    pub fn timestamp(&mut self, stage: PipelineStage) -> Result<()> {
        if self.next_query >= QUERY_POOL_SIZE {
            return Err(Error::QuerySlotMismatch {
                written: self.next_query + 1,
                expected: QUERY_POOL_SIZE,
            });
        }
        self.stream.push(Command::WriteTimestamp {
            pool: self.ctx.query_pool,
            slot: self.next_query,
            stage,
        });
        self.next_query += 1;
        Ok(())
    }

    pub fn begin_render_pass(&mut self, render_pass: RenderPassHandle, framebuffer: FramebufferHandle) {
        self.stream.push(Command::BeginRenderPass {
            render_pass,
            framebuffer,
            extent: self.ctx.resources.extent(),
        });
    }

    pub fn end_render_pass(&mut self) {
        self.stream.push(Command::EndRenderPass);
    }

    /// Binds the role's pipeline, binding set and push constants
    fn bind(&mut self, role: PassRole) -> Result<()> {
        let state = self.ctx.state;
        let variant = self.ctx.registry.variant(state.strategy, state.kernel, role)?;
        let set = self.ctx.bindings.set(BindingSlot::for_role(role)).ok_or(Error::MissingVariant {
            strategy: Some(state.strategy),
            kernel: Some(state.kernel.index()),
            role,
        })?;
        let bind_point = variant.bind_point();
        let (stage, data) = match bind_point {
            BindPoint::Graphics => (ShaderStage::Fragment, self.ctx.push_constants.graphics_bytes()),
            BindPoint::Compute => (ShaderStage::Compute, self.ctx.push_constants.compute_bytes()),
        };

        self.stream.push(Command::BindPipeline {
            bind_point,
            pipeline: variant.pipeline(),
        });
        self.stream.push(Command::BindSet {
            bind_point,
            layout: variant.layout(),
            set,
        });
        self.stream.push(Command::PushConstants {
            layout: variant.layout(),
            stage,
            data,
        });
        Ok(())
    }

    /// Draws a full-screen triangle with the role's pipeline
    pub fn draw_fullscreen(&mut self, role: PassRole, instance_count: u32) -> Result<()> {
        self.bind(role)?;
        self.stream.push(Command::Draw {
            vertex_count: 3,
            instance_count,
        });
        Ok(())
    }

    pub fn dispatch(&mut self, role: PassRole, x: u32, y: u32) -> Result<()> {
        self.bind(role)?;
        self.stream.push(Command::Dispatch { x, y, z: 1 });
        Ok(())
    }

    pub fn barrier(&mut self, image: ImageHandle, old_layout: ImageLayout, new_layout: ImageLayout, src_stage: PipelineStage, dst_stage: PipelineStage) {
        self.stream.push(Command::ImageBarrier {
            image,
            old_layout,
            new_layout,
            src_stage,
            dst_stage,
        });
    }

    fn filter_framebuffer(&self) -> Result<FramebufferHandle> {
        self.ctx.resources.filter_framebuffer(self.ctx.slot).ok_or(Error::MissingResource("filter framebuffer"))
    }

    fn main_composite(&mut self) -> Result<()> {
        self.advance(FrameStage::MainComposite)?;
        self.begin_render_pass(self.ctx.passes.main(), self.ctx.resources.main_framebuffer());
        self.draw_fullscreen(PassRole::Composite, 1)?;
        self.end_render_pass();
        Ok(())
    }

    /// Opens the filter pass on the presentation image
    pub fn begin_filter_pass(&mut self) -> Result<()> {
        self.advance(FrameStage::FilterPass)?;
        let framebuffer = self.filter_framebuffer()?;
        self.begin_render_pass(self.ctx.passes.filter(), framebuffer);
        Ok(())
    }

    fn ui_pass(&mut self) -> Result<()> {
        self.advance(FrameStage::UiPass)?;
        let framebuffer = self.ctx.resources.ui_framebuffer(self.ctx.slot).ok_or(Error::MissingResource("ui framebuffer"))?;
        self.begin_render_pass(self.ctx.passes.ui(), framebuffer);
        self.stream.push(Command::DrawOverlay);
        self.end_render_pass();
        Ok(())
    }

    fn finish(mut self, entry: &StrategyEntry) -> Result<CommandStream> {
        self.advance(FrameStage::Submitted)?;
        let written = self.stream.timestamp_writes();
        if written != entry.query_slots() {
            return Err(Error::QuerySlotMismatch {
                written,
                expected: entry.query_slots(),
            });
        }
        Ok(self.stream)
    }
}

/// Records one complete frame for a strategy
///
/// Every pipeline and binding the strategy needs is validated before the first
/// command is recorded.
///
/// # Arguments
/// * `ctx` - Resources, pipelines and state the frame reads
/// * `entry` - Strategy table entry of the selected strategy
///
/// # Returns
/// A stream that writes exactly `entry.query_slots()` timestamps
pub fn record_frame(ctx: FrameContext<'_>, entry: &StrategyEntry) -> Result<CommandStream> {
    ctx.bindings.ensure_current(ctx.resources.epoch())?;
    for &role in entry.roles {
        ctx.registry.variant(ctx.state.strategy, ctx.state.kernel, role)?;
    }

    let mut recorder = FrameRecorder::new(ctx);
    recorder.reset_queries(entry.query_slots());
    recorder.main_composite()?;
    (entry.sequence)(&mut recorder)?;
    recorder.ui_pass()?;

    tracing::trace!("Recorded {} commands for {} in slot {}", recorder.stream.len(), entry.strategy, ctx.slot);
    recorder.finish(entry)
}

/// Default and optimized strategies: one timed filter pass
pub fn single_pass_filter(recorder: &mut FrameRecorder<'_>) -> Result<()> {
    let draw_count = recorder.context().state.draw_count.max(1);
    recorder.timestamp(PipelineStage::TopOfPipe)?;
    recorder.begin_filter_pass()?;
    recorder.draw_fullscreen(PassRole::Filter, draw_count)?;
    recorder.end_render_pass();
    recorder.timestamp(PipelineStage::BottomOfPipe)?;
    Ok(())
}

/// Linear strategy: horizontal pass into the intermediate target, vertical pass in the filter pass
///
/// Both render passes are timed as a whole.
pub fn linear_separable(recorder: &mut FrameRecorder<'_>) -> Result<()> {
    let ctx = *recorder.context();
    let framebuffer = ctx.resources.intermediate_framebuffer().ok_or(Error::MissingResource("intermediate framebuffer"))?;

    recorder.advance(FrameStage::LinearFirstPass)?;
    recorder.timestamp(PipelineStage::TopOfPipe)?;
    recorder.begin_render_pass(ctx.passes.intermediate(), framebuffer);
    recorder.draw_fullscreen(PassRole::LinearFirst, 1)?;
    recorder.end_render_pass();
    recorder.timestamp(PipelineStage::BottomOfPipe)?;

    recorder.timestamp(PipelineStage::TopOfPipe)?;
    recorder.begin_filter_pass()?;
    recorder.draw_fullscreen(PassRole::LinearSecond, 1)?;
    recorder.end_render_pass();
    recorder.timestamp(PipelineStage::BottomOfPipe)?;
    Ok(())
}

/// Separable compute: a row dispatch and a column dispatch, each timed, then an untimed resolve
pub fn separable_compute(recorder: &mut FrameRecorder<'_>) -> Result<()> {
    let ctx = *recorder.context();
    let intermediate = ctx.resources.storage_intermediate().ok_or(Error::MissingResource("storage intermediate"))?;
    let output = ctx.resources.storage_output().ok_or(Error::MissingResource("storage output"))?;
    let Extent { width, height } = ctx.resources.extent();
    let axis = ctx.workgroup_axis;

    recorder.advance(FrameStage::ComputeFirstPass)?;
    for image in [intermediate, output] {
        recorder.barrier(image, ImageLayout::Undefined, ImageLayout::General, PipelineStage::TopOfPipe, PipelineStage::ComputeShader);
    }

    recorder.timestamp(PipelineStage::TopOfPipe)?;
    recorder.dispatch(PassRole::ComputeFirst, width.div_ceil(axis), height)?;
    recorder.timestamp(PipelineStage::BottomOfPipe)?;

    recorder.barrier(intermediate, ImageLayout::General, ImageLayout::General, PipelineStage::ComputeShader, PipelineStage::ComputeShader);

    recorder.timestamp(PipelineStage::TopOfPipe)?;
    recorder.dispatch(PassRole::ComputeSecond, width, height.div_ceil(axis))?;
    recorder.timestamp(PipelineStage::BottomOfPipe)?;

    recorder.barrier(output, ImageLayout::General, ImageLayout::ShaderReadOnly, PipelineStage::ComputeShader, PipelineStage::FragmentShader);
    resolve(recorder)
}

/// Tiled compute: one timed dispatch over square tiles, then an untimed resolve
pub fn tiled_compute(recorder: &mut FrameRecorder<'_>) -> Result<()> {
    let ctx = *recorder.context();
    let output = ctx.resources.storage_output().ok_or(Error::MissingResource("storage output"))?;
    let Extent { width, height } = ctx.resources.extent();
    let axis = ctx.workgroup_axis;

    recorder.advance(FrameStage::ComputeFirstPass)?;
    recorder.barrier(output, ImageLayout::Undefined, ImageLayout::General, PipelineStage::TopOfPipe, PipelineStage::ComputeShader);

    recorder.timestamp(PipelineStage::TopOfPipe)?;
    recorder.dispatch(PassRole::ComputeFirst, width.div_ceil(axis), height.div_ceil(axis))?;
    recorder.timestamp(PipelineStage::BottomOfPipe)?;

    recorder.barrier(output, ImageLayout::General, ImageLayout::ShaderReadOnly, PipelineStage::ComputeShader, PipelineStage::FragmentShader);
    resolve(recorder)
}

fn resolve(recorder: &mut FrameRecorder<'_>) -> Result<()> {
    recorder.begin_filter_pass()?;
    recorder.draw_fullscreen(PassRole::Resolve, 1)?;
    recorder.end_render_pass();
    Ok(())
}
