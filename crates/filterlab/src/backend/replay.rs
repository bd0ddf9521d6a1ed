//! Replays a [`CommandStream`] into a wgpu command encoder
//!
//! wgpu tracks image layouts itself, so barriers only end the open compute pass:
//! work after a barrier runs in a new pass and sees the writes before it.
//!
//! Timestamps in a stream bracket passes from outside. They are replayed as the
//! pass's own beginning and end writes, which needs nothing beyond
//! `Features::TIMESTAMP_QUERY`.

use super::context::GpuContext;
use super::{Pipeline, Registry, lookup, shader_stages};
use crate::device::{AttachmentTarget, BindPoint, Command, CommandStream, LoadAction, QueryPoolHandle};
use crate::{Error, Result};
use std::collections::BTreeMap;

enum OpenPass {
    None,
    Render(wgpu::RenderPass<'static>),
    Compute(wgpu::ComputePass<'static>),
}

fn invalid(reason: impl std::fmt::Display) -> Error {
    Error::Device(format!("Invalid command stream: {reason}"))
}

/// Timestamp slots written at the boundaries of one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PassTimestamps {
    pub pool: QueryPoolHandle,
    pub begin: Option<u32>,
    pub end: Option<u32>,
}

/// Index of the command that opened the pass being walked
#[derive(Debug, Clone, Copy)]
enum Scope {
    Outside,
    Render(usize),
    Compute(usize),
}

fn attach(plan: &mut BTreeMap<usize, PassTimestamps>, opener: usize, pool: QueryPoolHandle, begin: Option<u32>, end: Option<u32>) -> Result<()> {
    let writes = plan.entry(opener).or_insert(PassTimestamps { pool, begin: None, end: None });
    if writes.pool != pool {
        return Err(invalid("pass timestamps use two query pools"));
    }
    writes.begin = begin.or(writes.begin);
    writes.end = end.or(writes.end);
    Ok(())
}

/// Assigns every timestamp of a stream to the pass it brackets
///
/// A stamp directly before a `BeginRenderPass`, or before the compute pipeline
/// bind that opens a compute pass, becomes that pass's beginning write. A stamp
/// directly after an `EndRenderPass`, or after compute work, becomes the end
/// write and closes the compute pass.
///
/// # Returns
/// Writes keyed by the index of the command that opens each timed pass
pub(crate) fn pass_timestamps(commands: &[Command]) -> Result<BTreeMap<usize, PassTimestamps>> {
    let mut plan = BTreeMap::new();
    let mut scope = Scope::Outside;
    let mut pending: Option<(QueryPoolHandle, u32)> = None;
    let mut just_closed: Option<usize> = None;

    for (index, command) in commands.iter().enumerate() {
        if let Command::WriteTimestamp { pool, slot, .. } = *command {
            let closing = match scope {
                Scope::Render(_) => return Err(invalid(format!("timestamp {slot} inside a render pass"))),
                Scope::Compute(opener) => {
                    scope = Scope::Outside;
                    Some(opener)
                }
                Scope::Outside => just_closed.take(),
            };
            match (closing, pending) {
                (Some(opener), _) => attach(&mut plan, opener, pool, None, Some(slot))?,
                (None, None) => pending = Some((pool, slot)),
                (None, Some(_)) => return Err(invalid(format!("timestamp {slot} does not bracket a pass"))),
            }
            continue;
        }
        just_closed = None;

        let opens = match (command, scope) {
            (Command::BeginRenderPass { .. }, Scope::Render(_)) => return Err(invalid("nested render pass")),
            (Command::BeginRenderPass { .. }, _) => {
                scope = Scope::Render(index);
                true
            }
            (Command::EndRenderPass, Scope::Render(opener)) => {
                just_closed = Some(opener);
                scope = Scope::Outside;
                false
            }
            (Command::ImageBarrier { .. }, Scope::Compute(_)) => {
                scope = Scope::Outside;
                false
            }
            (Command::BindPipeline { bind_point: BindPoint::Compute, .. }, Scope::Outside) => {
                scope = Scope::Compute(index);
                true
            }
            _ => false,
        };

        if let Some((pool, slot)) = pending.take() {
            if !opens {
                return Err(invalid(format!("timestamp {slot} does not bracket a pass")));
            }
            attach(&mut plan, index, pool, Some(slot), None)?;
        }
    }

    match pending {
        Some((_, slot)) => Err(invalid(format!("timestamp {slot} does not bracket a pass"))),
        None => Ok(plan),
    }
}

struct Replay<'a> {
    context: &'a GpuContext,
    registry: &'a Registry,
    /// Presentation image of the submitted frame slot
    target: &'a wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
    pass: OpenPass,
    /// Pass-level timestamp writes keyed by the opening command
    timestamps: BTreeMap<usize, PassTimestamps>,
    /// Timestamp slots written per query pool
    written: BTreeMap<QueryPoolHandle, u32>,
}

impl<'a> Replay<'a> {
    fn end_pass(&mut self) {
        self.pass = OpenPass::None;
    }

    /// Query set and slots the pass opened by command `index` writes
    fn pass_writes(&self, index: usize) -> Result<Option<(&'a wgpu::QuerySet, PassTimestamps)>> {
        let registry = self.registry;
        match self.timestamps.get(&index) {
            Some(writes) if self.context.supports_timestamps() => Ok(Some((&lookup(&registry.query_pools, writes.pool)?.set, *writes))),
            _ => Ok(None),
        }
    }

    fn compute_pass(&mut self, index: usize) -> Result<&mut wgpu::ComputePass<'static>> {
        if let OpenPass::Render(_) = self.pass {
            return Err(invalid("compute work inside a render pass"));
        }
        if let OpenPass::None = self.pass {
            let writes = self.pass_writes(index)?;
            let pass = self.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("compute pass"),
                timestamp_writes: writes.map(|(query_set, writes)| wgpu::ComputePassTimestampWrites {
                    query_set,
                    beginning_of_pass_write_index: writes.begin,
                    end_of_pass_write_index: writes.end,
                }),
            });
            self.pass = OpenPass::Compute(pass.forget_lifetime());
        }
        match &mut self.pass {
            OpenPass::Compute(pass) => Ok(pass),
            _ => Err(invalid("no compute pass")),
        }
    }

    fn apply(&mut self, index: usize, command: &Command) -> Result<()> {
        let registry = self.registry;
        match command {
            Command::ResetQueries { pool, .. } => {
                lookup(&registry.query_pools, *pool)?;
                self.written.entry(*pool).or_insert(0);
            }
            // Written by the pass it brackets; an end stamp closes compute work
            Command::WriteTimestamp { pool, slot, .. } => {
                lookup(&registry.query_pools, *pool)?;
                if let OpenPass::Compute(_) = self.pass {
                    self.end_pass();
                }
                let written = self.written.entry(*pool).or_insert(0);
                *written = (*written).max(slot + 1);
            }
            Command::BeginRenderPass { render_pass, framebuffer, .. } => {
                self.end_pass();
                let desc = lookup(&registry.render_passes, *render_pass)?;
                let framebuffer = lookup(&registry.framebuffers, *framebuffer)?;
                if framebuffer.render_pass != *render_pass {
                    return Err(invalid(format!("framebuffer '{}' belongs to another render pass", framebuffer.label)));
                }
                let view = match framebuffer.target {
                    AttachmentTarget::Image(image) => &lookup(&registry.images, image)?.view,
                    AttachmentTarget::Swapchain(_) => self.target,
                };
                let writes = self.pass_writes(index)?;
                let load = match desc.load {
                    LoadAction::Clear([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    LoadAction::Load => wgpu::LoadOp::Load,
                };
                let pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some(desc.label),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    timestamp_writes: writes.map(|(query_set, writes)| wgpu::RenderPassTimestampWrites {
                        query_set,
                        beginning_of_pass_write_index: writes.begin,
                        end_of_pass_write_index: writes.end,
                    }),
                    ..Default::default()
                });
                self.pass = OpenPass::Render(pass.forget_lifetime());
            }
            Command::EndRenderPass => match self.pass {
                OpenPass::Render(_) => self.end_pass(),
                _ => return Err(invalid("render pass ended outside a render pass")),
            },
            Command::BindPipeline { bind_point, pipeline } => match (bind_point, lookup(&registry.pipelines, *pipeline)?) {
                (BindPoint::Graphics, Pipeline::Render(pipeline)) => match &mut self.pass {
                    OpenPass::Render(pass) => pass.set_pipeline(pipeline),
                    _ => return Err(invalid("graphics pipeline bound outside a render pass")),
                },
                (BindPoint::Compute, Pipeline::Compute(pipeline)) => self.compute_pass(index)?.set_pipeline(pipeline),
                (bind_point, _) => return Err(invalid(format!("pipeline {pipeline:?} does not match bind point {bind_point:?}"))),
            },
            Command::BindSet { set, .. } => {
                let group = lookup(&registry.binding_sets, *set)?
                    .group
                    .as_ref()
                    .ok_or_else(|| invalid(format!("binding set {set:?} was never written")))?;
                match &mut self.pass {
                    OpenPass::Render(pass) => pass.set_bind_group(0, group, &[]),
                    OpenPass::Compute(pass) => pass.set_bind_group(0, group, &[]),
                    OpenPass::None => return Err(invalid("binding set bound outside a pass")),
                }
            }
            Command::PushConstants { stage, data, .. } => match &mut self.pass {
                OpenPass::Render(pass) => pass.set_push_constants(shader_stages(*stage), 0, data),
                OpenPass::Compute(pass) => pass.set_push_constants(0, data),
                OpenPass::None => return Err(invalid("push constants outside a pass")),
            },
            Command::Draw { vertex_count, instance_count } => match &mut self.pass {
                OpenPass::Render(pass) => pass.draw(0..*vertex_count, 0..*instance_count),
                _ => return Err(invalid("draw outside a render pass")),
            },
            Command::Dispatch { x, y, z } => match &mut self.pass {
                OpenPass::Compute(pass) => pass.dispatch_workgroups(*x, *y, *z),
                _ => return Err(invalid("dispatch without a compute pipeline")),
            },
            Command::ImageBarrier { image, .. } => {
                lookup(&registry.images, *image)?;
                if let OpenPass::Compute(_) = self.pass {
                    self.end_pass();
                }
            }
            // The overlay is drawn by the host application
            Command::DrawOverlay => {
                if !matches!(self.pass, OpenPass::Render(_)) {
                    return Err(invalid("overlay drawn outside a render pass"));
                }
            }
        }
        Ok(())
    }
}

/// Encodes `commands` and the timestamp resolves they need
///
/// # Arguments
/// * `context` - Device the command buffer is created on
/// * `registry` - Objects referenced by the stream's handles
/// * `target` - Presentation image swapchain framebuffers render into
/// * `commands` - Recorded frame
pub(super) fn encode(context: &GpuContext, registry: &mut Registry, target: &wgpu::TextureView, commands: &CommandStream) -> Result<wgpu::CommandBuffer> {
    let timestamps = pass_timestamps(commands.commands())?;
    let encoder = context.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("frame encoder") });

    let mut replay = Replay {
        context,
        registry,
        target,
        encoder,
        pass: OpenPass::None,
        timestamps,
        written: BTreeMap::new(),
    };
    for (index, command) in commands.commands().iter().enumerate() {
        replay.apply(index, command)?;
    }
    replay.end_pass();
    let Replay { mut encoder, written, .. } = replay;

    for (pool, count) in written {
        if let Some(pool) = registry.query_pools.get_mut(&pool) {
            pool.encode_resolve(&mut encoder, count);
        }
    }
    Ok(encoder.finish())
}
